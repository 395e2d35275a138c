//! Variation operators: reproduction over surviving species, and
//! mutation over the freshly produced offspring material.
//!
//! Operators run in configured order over one shared offspring list, so
//! a later operator may see what an earlier one produced. All randomness
//! comes from the context's shared source, which keeps runs with equal
//! seeds bit-for-bit repeatable.

use log::trace;
use rand::seq::SliceRandom;
use rand::Rng;
use rand_pcg::Pcg64;

use crate::genome::{Gene, Genome, GenomeMaterial};
use crate::populations::errors::OperatorError;
use crate::populations::species::Species;

/// Shared state handed to every operator invocation.
pub struct OperatorContext<'a> {
    pub rng: &'a mut Pcg64,
    pub population_size: usize,
}

/// Produces new genome material from the surviving species.
///
/// Each operator owns a `slice` fraction of the population size and is
/// responsible for honoring it; the orchestrator only balances the
/// total afterwards. Operators must not mutate the species they read.
pub trait ReproductionOperator {
    /// The fraction of the population size this operator produces.
    fn slice(&self) -> f64;

    /// Appends offspring material to the shared output list.
    fn reproduce(
        &self,
        ctx: &mut OperatorContext<'_>,
        species: &[Species],
        genomes: &[Genome],
        offspring: &mut Vec<GenomeMaterial>,
    ) -> Result<(), OperatorError>;
}

/// Perturbs freshly produced offspring material, rebuilding each entry
/// in place in the shared list. The list length never changes here;
/// individual materials may gain or lose genes.
pub trait MutationOperator {
    fn mutate(
        &self,
        ctx: &mut OperatorContext<'_>,
        offspring: &mut [GenomeMaterial],
    ) -> Result<(), OperatorError>;
}

/// Resolves each species' members, fittest first. Species with no
/// resolvable members are dropped.
fn ranked_pools<'a>(species: &[Species], genomes: &'a [Genome]) -> Vec<Vec<&'a Genome>> {
    species
        .iter()
        .map(|s| {
            let mut members = s.members_in(genomes);
            members.sort_by(|a, b| {
                b.fitness()
                    .partial_cmp(&a.fitness())
                    .unwrap_or_else(|| panic!("uncomparable fitness value detected"))
            });
            members
        })
        .filter(|members| !members.is_empty())
        .collect()
}

/// Asexual reproduction: clones surviving members, cycling round-robin
/// across species and walking each species from its fittest member
/// down.
#[derive(Clone, Debug)]
pub struct CloneReproduction {
    slice: f64,
}

impl CloneReproduction {
    pub fn new(slice: f64) -> CloneReproduction {
        assert!((0.0..=1.0).contains(&slice), "operator slice must be in [0,1]");
        CloneReproduction { slice }
    }
}

impl ReproductionOperator for CloneReproduction {
    fn slice(&self) -> f64 {
        self.slice
    }

    fn reproduce(
        &self,
        ctx: &mut OperatorContext<'_>,
        species: &[Species],
        genomes: &[Genome],
        offspring: &mut Vec<GenomeMaterial>,
    ) -> Result<(), OperatorError> {
        let target = (self.slice * ctx.population_size as f64).round() as usize;
        if target == 0 {
            return Ok(());
        }
        let pools = ranked_pools(species, genomes);
        if pools.is_empty() {
            return Err(OperatorError::NoParents);
        }
        let mut cursors = vec![0usize; pools.len()];
        for turn in 0..target {
            let which = turn % pools.len();
            let pool = &pools[which];
            let parent = pool[cursors[which] % pool.len()];
            cursors[which] += 1;
            offspring.push(parent.material().child_of(parent.id()));
        }
        trace!("cloned {} offspring from {} species", target, pools.len());
        Ok(())
    }
}

/// Sexual reproduction: recombines two parents drawn from the same
/// species, chosen with probability proportional to species size.
///
/// The child keeps the fitter parent's disjoint and excess genes and
/// coin-flips values at common loci; the fitter parent is recorded as
/// primary.
#[derive(Clone, Debug)]
pub struct CrossoverReproduction {
    slice: f64,
}

impl CrossoverReproduction {
    pub fn new(slice: f64) -> CrossoverReproduction {
        assert!((0.0..=1.0).contains(&slice), "operator slice must be in [0,1]");
        CrossoverReproduction { slice }
    }
}

impl ReproductionOperator for CrossoverReproduction {
    fn slice(&self) -> f64 {
        self.slice
    }

    fn reproduce(
        &self,
        ctx: &mut OperatorContext<'_>,
        species: &[Species],
        genomes: &[Genome],
        offspring: &mut Vec<GenomeMaterial>,
    ) -> Result<(), OperatorError> {
        let target = (self.slice * ctx.population_size as f64).round() as usize;
        if target == 0 {
            return Ok(());
        }
        let pools = ranked_pools(species, genomes);
        if pools.is_empty() {
            return Err(OperatorError::NoParents);
        }
        let total_members: usize = pools.iter().map(Vec::len).sum();
        for _ in 0..target {
            let mut pick = ctx.rng.gen_range(0..total_members);
            let mut which = pools.len() - 1;
            for (i, pool) in pools.iter().enumerate() {
                if pick < pool.len() {
                    which = i;
                    break;
                }
                pick -= pool.len();
            }
            let pool = &pools[which];
            let first = *pool
                .choose(ctx.rng)
                .unwrap_or_else(|| panic!("no eligible parents in pool {}", which));
            let second = *pool
                .choose(ctx.rng)
                .unwrap_or_else(|| panic!("no eligible parents in pool {}", which));
            offspring.push(recombine(first, second, ctx.rng));
        }
        Ok(())
    }
}

/// Merges two parents into child material.
fn recombine(a: &Genome, b: &Genome, rng: &mut Pcg64) -> GenomeMaterial {
    let (fitter, weaker) = if b.fitness() > a.fitness() { (b, a) } else { (a, b) };
    let weaker_genes = weaker.material().genes();
    let mut genes = Vec::with_capacity(fitter.material().len());
    let mut j = 0;
    for gene in fitter.material().genes() {
        while j < weaker_genes.len() && weaker_genes[j].locus() < gene.locus() {
            j += 1;
        }
        let matched = weaker_genes.get(j).filter(|w| w.locus() == gene.locus());
        match matched {
            Some(other) if rng.gen_bool(0.5) => genes.push(*other),
            _ => genes.push(*gene),
        }
    }
    let secondary = (weaker.id() != fitter.id()).then(|| weaker.id());
    GenomeMaterial::with_parents(genes, Some(fitter.id()), secondary)
}

/// Nudges gene values by a bounded random amount at a per-gene rate,
/// clamping the result into `[-bound, bound]`.
#[derive(Clone, Debug)]
pub struct ValueMutation {
    rate: f64,
    power: f64,
    bound: f64,
}

impl ValueMutation {
    pub fn new(rate: f64, power: f64, bound: f64) -> ValueMutation {
        assert!((0.0..=1.0).contains(&rate), "mutation rate must be in [0,1]");
        assert!(power >= 0.0, "mutation power must be non-negative");
        assert!(bound > 0.0, "value bound must be positive");
        ValueMutation { rate, power, bound }
    }
}

impl MutationOperator for ValueMutation {
    fn mutate(
        &self,
        ctx: &mut OperatorContext<'_>,
        offspring: &mut [GenomeMaterial],
    ) -> Result<(), OperatorError> {
        for material in offspring.iter_mut() {
            let genes: Vec<Gene> = material
                .genes()
                .iter()
                .map(|gene| {
                    if ctx.rng.gen_bool(self.rate) {
                        let nudge = ctx.rng.gen_range(-self.power..=self.power);
                        gene.with_value((gene.value() + nudge).clamp(-self.bound, self.bound))
                    } else {
                        *gene
                    }
                })
                .collect();
            *material = GenomeMaterial::with_parents(
                genes,
                material.primary_parent(),
                material.secondary_parent(),
            );
        }
        Ok(())
    }
}

/// Inserts one gene at a fresh random locus at a per-material rate.
/// Locus collisions are retried a bounded number of times and then
/// given up on for that material.
#[derive(Clone, Debug)]
pub struct AugmentMutation {
    rate: f64,
    value_bound: f64,
    max_attempts: usize,
}

impl AugmentMutation {
    pub fn new(rate: f64, value_bound: f64, max_attempts: usize) -> AugmentMutation {
        assert!((0.0..=1.0).contains(&rate), "mutation rate must be in [0,1]");
        assert!(value_bound > 0.0, "value bound must be positive");
        AugmentMutation {
            rate,
            value_bound,
            max_attempts,
        }
    }
}

impl MutationOperator for AugmentMutation {
    fn mutate(
        &self,
        ctx: &mut OperatorContext<'_>,
        offspring: &mut [GenomeMaterial],
    ) -> Result<(), OperatorError> {
        for material in offspring.iter_mut() {
            if !ctx.rng.gen_bool(self.rate) {
                continue;
            }
            for _ in 0..self.max_attempts {
                let locus = ctx.rng.gen::<u32>() as u64;
                if material.genes().iter().any(|g| g.locus() == locus) {
                    continue;
                }
                let value = ctx.rng.gen_range(-self.value_bound..=self.value_bound);
                let mut genes = material.genes().to_vec();
                genes.push(Gene::new(locus, value));
                *material = GenomeMaterial::with_parents(
                    genes,
                    material.primary_parent(),
                    material.secondary_parent(),
                );
                break;
            }
        }
        Ok(())
    }
}

/// Drops one random gene at a per-material rate. Never empties a
/// material.
#[derive(Clone, Debug)]
pub struct PruneMutation {
    rate: f64,
}

impl PruneMutation {
    pub fn new(rate: f64) -> PruneMutation {
        assert!((0.0..=1.0).contains(&rate), "mutation rate must be in [0,1]");
        PruneMutation { rate }
    }
}

impl MutationOperator for PruneMutation {
    fn mutate(
        &self,
        ctx: &mut OperatorContext<'_>,
        offspring: &mut [GenomeMaterial],
    ) -> Result<(), OperatorError> {
        for material in offspring.iter_mut() {
            if material.len() <= 1 || !ctx.rng.gen_bool(self.rate) {
                continue;
            }
            let doomed = ctx.rng.gen_range(0..material.len());
            let mut genes = material.genes().to_vec();
            genes.remove(doomed);
            *material = GenomeMaterial::with_parents(
                genes,
                material.primary_parent(),
                material.secondary_parent(),
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genome::SpeciationParms;
    use crate::identity::IdFactory;
    use crate::populations::species::SpeciesId;
    use rand::SeedableRng;

    fn context(rng: &mut Pcg64, population_size: usize) -> OperatorContext<'_> {
        OperatorContext {
            rng,
            population_size,
        }
    }

    fn flat_material(values: &[f64]) -> GenomeMaterial {
        GenomeMaterial::new(
            values
                .iter()
                .enumerate()
                .map(|(i, v)| Gene::new(i as u64 + 1, *v))
                .collect(),
        )
    }

    fn one_species(values_and_fitness: &[(f64, f64)]) -> (Vec<Species>, Vec<Genome>) {
        let mut ids = IdFactory::new();
        let mut species = Species::new(
            SpeciesId::new(0),
            flat_material(&[values_and_fitness[0].0, 0.0]),
            SpeciationParms::default(),
        );
        let mut genomes = Vec::new();
        for (value, fitness) in values_and_fitness {
            let mut genome = Genome::new(ids.next_id(), flat_material(&[*value, 0.0]));
            genome.set_fitness(*fitness);
            species.add(&mut genome).unwrap();
            genomes.push(genome);
        }
        (vec![species], genomes)
    }

    #[test]
    fn cloning_honors_its_slice_and_records_parents() {
        let (species, genomes) = one_species(&[(0.0, 5.0), (0.2, 1.0)]);
        let mut rng = Pcg64::seed_from_u64(3);
        let mut offspring = Vec::new();
        CloneReproduction::new(0.5)
            .reproduce(&mut context(&mut rng, 10), &species, &genomes, &mut offspring)
            .unwrap();
        assert_eq!(offspring.len(), 5);
        let parent_ids: Vec<_> = genomes.iter().map(Genome::id).collect();
        for child in &offspring {
            assert!(parent_ids.contains(&child.primary_parent().unwrap()));
            assert_eq!(child.secondary_parent(), None);
        }
        // The fittest member is cloned first.
        assert_eq!(offspring[0].primary_parent(), Some(genomes[0].id()));
    }

    #[test]
    fn cloning_with_no_species_reports_no_parents() {
        let mut rng = Pcg64::seed_from_u64(3);
        let mut offspring = Vec::new();
        let err = CloneReproduction::new(0.5)
            .reproduce(&mut context(&mut rng, 10), &[], &[], &mut offspring)
            .unwrap_err();
        assert_eq!(err, OperatorError::NoParents);
    }

    #[test]
    fn crossover_children_stay_within_the_parents_loci() {
        let (species, genomes) = one_species(&[(0.0, 5.0), (0.4, 1.0)]);
        let mut rng = Pcg64::seed_from_u64(9);
        let mut offspring = Vec::new();
        CrossoverReproduction::new(1.0)
            .reproduce(&mut context(&mut rng, 12), &species, &genomes, &mut offspring)
            .unwrap();
        assert_eq!(offspring.len(), 12);
        for child in &offspring {
            for gene in child.genes() {
                assert!(genomes
                    .iter()
                    .any(|g| g.material().genes().iter().any(|p| p.locus() == gene.locus())));
            }
            assert!(child.primary_parent().is_some());
        }
    }

    #[test]
    fn recombination_prefers_the_fitter_parent() {
        let mut ids = IdFactory::new();
        let mut weak = Genome::new(
            ids.next_id(),
            GenomeMaterial::new(vec![Gene::new(1, 0.0), Gene::new(9, 0.0)]),
        );
        weak.set_fitness(1.0);
        let mut strong = Genome::new(
            ids.next_id(),
            GenomeMaterial::new(vec![Gene::new(1, 1.0), Gene::new(2, 1.0), Gene::new(3, 1.0)]),
        );
        strong.set_fitness(10.0);

        let mut rng = Pcg64::seed_from_u64(1);
        let child = recombine(&weak, &strong, &mut rng);
        let loci: Vec<u64> = child.genes().iter().map(Gene::locus).collect();
        // Disjoint and excess genes come from the fitter parent only.
        assert_eq!(loci, vec![1, 2, 3]);
        assert_eq!(child.primary_parent(), Some(strong.id()));
        assert_eq!(child.secondary_parent(), Some(weak.id()));
    }

    #[test]
    fn value_mutation_respects_the_bound() {
        let mut rng = Pcg64::seed_from_u64(5);
        let mut offspring = vec![flat_material(&[3.9, -3.9, 0.0])];
        ValueMutation::new(1.0, 1.0, 4.0)
            .mutate(&mut context(&mut rng, 10), &mut offspring)
            .unwrap();
        assert_eq!(offspring[0].len(), 3);
        for gene in offspring[0].genes() {
            assert!(gene.value().abs() <= 4.0);
        }
    }

    #[test]
    fn augmentation_adds_at_most_one_gene_per_material() {
        let mut rng = Pcg64::seed_from_u64(5);
        let mut offspring = vec![flat_material(&[0.0]), flat_material(&[0.0])];
        AugmentMutation::new(1.0, 1.0, 20)
            .mutate(&mut context(&mut rng, 10), &mut offspring)
            .unwrap();
        for material in &offspring {
            assert_eq!(material.len(), 2);
        }
    }

    #[test]
    fn pruning_never_empties_a_material() {
        let mut rng = Pcg64::seed_from_u64(5);
        let mut offspring = vec![flat_material(&[1.0]), flat_material(&[1.0, 2.0])];
        let prune = PruneMutation::new(1.0);
        for _ in 0..4 {
            prune
                .mutate(&mut context(&mut rng, 10), &mut offspring)
                .unwrap();
        }
        assert_eq!(offspring[0].len(), 1);
        assert_eq!(offspring[1].len(), 1);
    }
}
