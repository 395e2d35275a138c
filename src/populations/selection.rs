//! Survivor selection: a pluggable strategy plus the elitism wrapper
//! that composes over it.

use log::trace;
use rand::Rng;
use rand_pcg::Pcg64;

use crate::genome::Genome;
use crate::identity::GenomeId;
use crate::populations::errors::SpeciesError;
use crate::populations::species::Species;

/// A survivor-selection policy over one generation's candidate pool.
///
/// Candidates accumulate through [`add_candidate`] until one
/// [`select_survivors`] call; [`empty`] resets the pool for the next
/// generation.
///
/// [`add_candidate`]: SelectionStrategy::add_candidate
/// [`select_survivors`]: SelectionStrategy::select_survivors
/// [`empty`]: SelectionStrategy::empty
pub trait SelectionStrategy {
    fn add_candidate(&mut self, id: GenomeId, fitness: f64);

    /// Picks up to `count` distinct survivors from the pool, consuming
    /// them from it.
    fn select_survivors(&mut self, count: usize, rng: &mut Pcg64) -> Vec<GenomeId>;

    fn empty(&mut self);
}

/// Fitness-proportionate ("roulette wheel") selection without
/// replacement. When the pool's fitness mass is zero the wheel
/// degenerates to a uniform draw.
#[derive(Debug, Default)]
pub struct RouletteSelection {
    candidates: Vec<(GenomeId, f64)>,
}

impl RouletteSelection {
    pub fn new() -> RouletteSelection {
        RouletteSelection::default()
    }
}

impl SelectionStrategy for RouletteSelection {
    fn add_candidate(&mut self, id: GenomeId, fitness: f64) {
        self.candidates.push((id, fitness));
    }

    fn select_survivors(&mut self, count: usize, rng: &mut Pcg64) -> Vec<GenomeId> {
        let mut survivors = Vec::with_capacity(count.min(self.candidates.len()));
        while survivors.len() < count && !self.candidates.is_empty() {
            let total: f64 = self.candidates.iter().map(|(_, f)| f).sum();
            let chosen = if total > 0.0 {
                let mut spin = rng.gen_range(0.0..total);
                let mut index = self.candidates.len() - 1;
                for (i, (_, fitness)) in self.candidates.iter().enumerate() {
                    if spin < *fitness {
                        index = i;
                        break;
                    }
                    spin -= fitness;
                }
                index
            } else {
                rng.gen_range(0..self.candidates.len())
            };
            survivors.push(self.candidates.swap_remove(chosen).0);
        }
        survivors
    }

    fn empty(&mut self) {
        self.candidates.clear();
    }
}

/// The natural selector: elitism composed over any selection strategy.
///
/// Candidates judged elite — their species has at least
/// `elitism_min_species_size` members and they are that species'
/// fittest — are banked for guaranteed survival, bypassing the wrapped
/// strategy. Everyone else competes in the strategy's pool.
pub struct ElitistSelector {
    strategy: Box<dyn SelectionStrategy>,
    survival_rate: f64,
    elitism: bool,
    elitism_min_species_size: usize,
    elites: Vec<(GenomeId, f64)>,
    candidates_added: usize,
}

impl ElitistSelector {
    pub fn new(
        strategy: Box<dyn SelectionStrategy>,
        survival_rate: f64,
        elitism: bool,
        elitism_min_species_size: usize,
    ) -> ElitistSelector {
        ElitistSelector {
            strategy,
            survival_rate,
            elitism,
            elitism_min_species_size,
            elites: Vec::new(),
            candidates_added: 0,
        }
    }

    /// Returns the configured survival-rate fraction.
    pub fn survival_rate(&self) -> f64 {
        self.survival_rate
    }

    /// Offers one genome as a survival candidate. The membership-size
    /// check reads the species as it stands right now; the fittest
    /// lookup comes second.
    ///
    /// # Errors
    /// Fails if the genome (or any niche-mate consulted for the elite
    /// check) has no evaluated fitness yet.
    pub fn add(
        &mut self,
        genome: &Genome,
        species: Option<&Species>,
        genomes: &[Genome],
    ) -> Result<(), SpeciesError> {
        let fitness = genome
            .fitness()
            .ok_or(SpeciesError::Unevaluated(genome.id()))?;
        self.candidates_added += 1;
        if self.elitism {
            if let Some(species) = species {
                if species.len() >= self.elitism_min_species_size
                    && species.fittest(genomes)?.id() == genome.id()
                {
                    trace!("genome {} banked as elite of species {}", genome.id(), species.id());
                    self.elites.push((genome.id(), fitness));
                    return Ok(());
                }
            }
        }
        self.strategy.add_candidate(genome.id(), fitness);
        Ok(())
    }

    /// Returns the survivor set for this generation:
    /// `min(candidates, round(candidates * survival_rate))` genomes,
    /// elites first.
    ///
    /// When the elites alone cover the required count, the lowest-
    /// fitness elites are trimmed until the count matches exactly;
    /// otherwise the wrapped strategy fills the remainder from its pool.
    pub fn select(&mut self, rng: &mut Pcg64) -> Vec<GenomeId> {
        let required = (self.candidates_added as f64 * self.survival_rate).round() as usize;
        if self.elites.len() >= required {
            self.elites.sort_by(|a, b| {
                a.1.partial_cmp(&b.1)
                    .unwrap_or_else(|| panic!("uncomparable fitness value detected"))
            });
            let excess = self.elites.len() - required;
            self.elites[excess..].iter().map(|(id, _)| *id).collect()
        } else {
            let mut survivors: Vec<GenomeId> = self.elites.iter().map(|(id, _)| *id).collect();
            let remainder = required - survivors.len();
            survivors.extend(self.strategy.select_survivors(remainder, rng));
            survivors
        }
    }

    /// Clears the candidate pool and the elite accumulator. Must run
    /// once per generation before the next `add` cycle.
    pub fn empty(&mut self) {
        self.strategy.empty();
        self.elites.clear();
        self.candidates_added = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genome::{Gene, GenomeMaterial, SpeciationParms};
    use crate::identity::IdFactory;
    use crate::populations::species::SpeciesId;
    use rand::SeedableRng;

    fn rng() -> Pcg64 {
        Pcg64::seed_from_u64(11)
    }

    fn scored_genomes(fitnesses: &[f64]) -> Vec<Genome> {
        let mut ids = IdFactory::new();
        fitnesses
            .iter()
            .map(|fitness| {
                let mut g = Genome::new(
                    ids.next_id(),
                    GenomeMaterial::new(vec![Gene::new(1, 0.0)]),
                );
                g.set_fitness(*fitness);
                g
            })
            .collect()
    }

    fn selector(survival_rate: f64, elitism: bool, min_size: usize) -> ElitistSelector {
        ElitistSelector::new(
            Box::new(RouletteSelection::new()),
            survival_rate,
            elitism,
            min_size,
        )
    }

    #[test]
    fn survivor_count_follows_the_survival_rate() {
        for (count, rate, expected) in [(10, 0.3, 3), (10, 1.0, 10), (3, 0.5, 2), (7, 0.2, 1)] {
            let genomes = scored_genomes(&vec![1.0; count]);
            let mut selector = selector(rate, false, 0);
            for genome in &genomes {
                selector.add(genome, None, &genomes).unwrap();
            }
            assert_eq!(selector.select(&mut rng()).len(), expected);
        }
    }

    #[test]
    fn unevaluated_candidates_are_refused() {
        let mut ids = IdFactory::new();
        let genome = Genome::new(ids.next_id(), GenomeMaterial::new(vec![Gene::new(1, 0.0)]));
        let mut selector = selector(0.5, false, 0);
        let err = selector.add(&genome, None, &[]).unwrap_err();
        assert_eq!(err, SpeciesError::Unevaluated(genome.id()));
    }

    #[test]
    fn species_fittest_of_a_large_enough_species_is_banked_elite() {
        let mut genomes = scored_genomes(&[1.0, 2.0, 50.0]);
        let mut species = Species::new(
            SpeciesId::new(0),
            genomes[0].material().clone(),
            SpeciationParms::default(),
        );
        for genome in genomes.iter_mut() {
            species.add(genome).unwrap();
        }

        let mut selector = selector(0.34, true, 3);
        for genome in &genomes {
            selector.add(genome, Some(&species), &genomes).unwrap();
        }
        let survivors = selector.select(&mut rng());
        assert!(survivors.contains(&genomes[2].id()));
    }

    #[test]
    fn small_species_get_no_elite_protection() {
        let mut genomes = scored_genomes(&[1.0, 50.0]);
        let mut species = Species::new(
            SpeciesId::new(0),
            genomes[0].material().clone(),
            SpeciationParms::default(),
        );
        for genome in genomes.iter_mut() {
            species.add(genome).unwrap();
        }

        let mut selector = selector(0.5, true, 3);
        for genome in &genomes {
            selector.add(genome, Some(&species), &genomes).unwrap();
        }
        // Nothing was banked, so the single survivor came off the wheel.
        let survivors = selector.select(&mut rng());
        assert_eq!(survivors.len(), 1);
    }

    #[test]
    fn excess_elites_are_trimmed_from_the_bottom() {
        // Three one-genome species, all elite-eligible, but the rate
        // only allows two survivors: the weakest elite must go.
        let mut genomes = scored_genomes(&[10.0, 30.0, 20.0]);
        let mut all_species = Vec::new();
        for (i, genome) in genomes.iter_mut().enumerate() {
            let mut species = Species::new(
                SpeciesId::new(i as u64),
                genome.material().clone(),
                SpeciationParms::default(),
            );
            species.add(genome).unwrap();
            all_species.push(species);
        }

        let mut selector = selector(0.67, true, 1);
        for (genome, species) in genomes.iter().zip(&all_species) {
            selector.add(genome, Some(species), &genomes).unwrap();
        }
        let mut survivors = selector.select(&mut rng());
        survivors.sort();
        assert_eq!(survivors, vec![genomes[1].id(), genomes[2].id()]);
    }

    #[test]
    fn empty_resets_the_selector_for_reuse() {
        let genomes = scored_genomes(&[1.0, 2.0, 3.0, 4.0]);
        let mut selector = selector(0.5, false, 0);
        for genome in &genomes {
            selector.add(genome, None, &genomes).unwrap();
        }
        selector.select(&mut rng());
        selector.empty();

        for genome in &genomes[..2] {
            selector.add(genome, None, &genomes).unwrap();
        }
        assert_eq!(selector.select(&mut rng()).len(), 1);
    }
}
