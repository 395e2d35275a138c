//! A population is the unit of evolution: it owns the live genomes,
//! clusters them into species, and drives the per-generation cycle of
//! evaluation, selection, culling, reproduction, mutation and
//! repopulation.

mod config;
mod errors;
mod events;
mod operators;
mod selection;
mod species;

pub use config::{Configuration, ConfigurationBuilder, FitnessStrategy};
pub use errors::{ConfigError, EvolutionError, OperatorError, SpeciesError};
pub use events::{EventKind, EventListener, EventManager, GenerationEvent};
pub use operators::{
    AugmentMutation, CloneReproduction, CrossoverReproduction, MutationOperator, OperatorContext,
    PruneMutation, ReproductionOperator, ValueMutation,
};
pub use selection::{ElitistSelector, RouletteSelection, SelectionStrategy};
pub use species::{Species, SpeciesId};

use ahash::AHashSet;
use log::{debug, trace};
use rand::seq::SliceRandom;

use crate::genome::{Genome, GenomeMaterial, SpeciationParms};
use crate::identity::GenomeId;
use config::Configuration as Config;
use operators::OperatorContext as Ctx;

/// A population of genomes, grouped into species and evolved one
/// generation at a time under a locked [`Configuration`].
///
/// The genome list always holds exactly the configured population size
/// at generation boundaries; [`evolve`](Population::evolve) conserves it
/// by construction.
pub struct Population {
    config: Configuration,
    genomes: Vec<Genome>,
    species: Vec<Species>,
    species_counter: u64,
    generation: usize,
}

impl Population {
    /// Creates a randomly initialized population: one genome per slot,
    /// each drawn from the configuration's sample material with
    /// randomized gene values, speciated on insertion.
    pub fn new(mut config: Configuration) -> Population {
        let size = config.population_size.get();
        let mut genomes = Vec::with_capacity(size);
        let mut species = Vec::new();
        let mut species_counter = 0;
        for _ in 0..size {
            let material = config.sample_material.randomized(&mut config.rng);
            let mut genome = Genome::new(config.ids.next_id(), material);
            speciate(
                &mut species,
                &mut species_counter,
                &mut genome,
                &config.speciation,
            );
            genomes.push(genome);
        }
        debug!(
            "initialized {} random genomes across {} species",
            genomes.len(),
            species.len()
        );
        Population {
            config,
            genomes,
            species,
            species_counter,
            generation: 0,
        }
    }

    /// Creates a population from an explicit list of seed materials.
    ///
    /// A seed list longer than the configured population size is
    /// truncated from the end, preserving the relative order of the
    /// kept entries. A shorter list is padded by cloning cyclically
    /// from the front, each clone getting a fresh id with the cloned
    /// genome recorded as its primary parent.
    ///
    /// # Errors
    /// Fails if the seed list is empty.
    pub fn from_seed(
        mut config: Configuration,
        seed: Vec<GenomeMaterial>,
    ) -> Result<Population, EvolutionError> {
        if seed.is_empty() {
            return Err(EvolutionError::EmptySeed);
        }
        let size = config.population_size.get();
        let mut genomes: Vec<Genome> = seed
            .into_iter()
            .take(size)
            .map(|material| Genome::new(config.ids.next_id(), material))
            .collect();
        let original = genomes.len();
        let mut next_clone = 0;
        while genomes.len() < size {
            let id = config.ids.next_id();
            let material = {
                let source = &genomes[next_clone % original];
                source.material().child_of(source.id())
            };
            genomes.push(Genome::new(id, material));
            next_clone += 1;
        }

        let mut species = Vec::new();
        let mut species_counter = 0;
        for genome in genomes.iter_mut() {
            speciate(
                &mut species,
                &mut species_counter,
                genome,
                &config.speciation,
            );
        }
        debug!(
            "seeded {} genomes ({} given) across {} species",
            genomes.len(),
            original,
            species.len()
        );
        Ok(Population {
            config,
            genomes,
            species,
            species_counter,
            generation: 0,
        })
    }

    /// Runs one full generation cycle: evaluate, select, cull,
    /// reproduce, mutate, repopulate, firing lifecycle events along the
    /// way.
    ///
    /// # Errors
    /// Any failure is fatal to the run: the in-progress generation is
    /// abandoned and no further `evolve` call should be made. Steps
    /// already applied (selection, culling) are not rolled back; the
    /// caller owns the decision to retry from persisted state or abort.
    pub fn evolve(&mut self) -> Result<(), EvolutionError> {
        self.evaluate()?;
        self.fire(EventKind::Evaluated);

        let survivors = self.select()?;
        self.cull(&survivors);
        self.fire(EventKind::StartOperators);

        let mut offspring = self.reproduce()?;
        self.mutate_offspring(&mut offspring)?;
        self.balance(&mut offspring)?;
        self.repopulate(offspring);

        self.fire(EventKind::FinishOperators);
        self.generation += 1;
        self.fire(EventKind::Evolved);

        debug_assert_eq!(self.genomes.len(), self.config.population_size.get());
        Ok(())
    }

    /// Writes every genome's fitness through the configured strategy,
    /// then enforces the synchronization barrier: selection never sees
    /// a partially evaluated population.
    fn evaluate(&mut self) -> Result<(), EvolutionError> {
        match &mut self.config.fitness {
            FitnessStrategy::PerGenome(evaluator) => {
                for genome in self.genomes.iter_mut() {
                    let fitness = evaluator(genome);
                    genome.set_fitness(fitness);
                }
            }
            FitnessStrategy::Bulk(evaluator) => evaluator(&mut self.genomes),
        }
        for genome in &self.genomes {
            match genome.fitness() {
                None => return Err(EvolutionError::IncompleteEvaluation(genome.id())),
                Some(fitness) if fitness < 0.0 => {
                    return Err(EvolutionError::NegativeFitness {
                        genome: genome.id(),
                        fitness,
                    })
                }
                Some(_) => {}
            }
        }
        debug!(
            "generation {}: evaluated {} genomes",
            self.generation,
            self.genomes.len()
        );
        Ok(())
    }

    /// Feeds the whole population through the selector and returns the
    /// survivor set, marking survivors on the way out.
    fn select(&mut self) -> Result<AHashSet<GenomeId>, EvolutionError> {
        let Population {
            config,
            genomes,
            species,
            generation,
            ..
        } = self;
        for genome in genomes.iter_mut() {
            genome.set_selected(false);
        }
        let selector = &mut config.selector;
        for genome in genomes.iter() {
            let home = genome
                .species()
                .and_then(|id| species.iter().find(|s| s.id() == id));
            selector.add(genome, home, genomes)?;
        }
        let survivors: AHashSet<GenomeId> = selector.select(&mut config.rng).into_iter().collect();
        selector.empty();
        for genome in genomes.iter_mut() {
            if survivors.contains(&genome.id()) {
                genome.set_selected(true);
            }
        }
        debug!(
            "generation {}: selected {} of {} genomes",
            generation,
            survivors.len(),
            genomes.len()
        );
        Ok(survivors)
    }

    /// Cuts species membership and the genome list down to the
    /// survivors; species that end up empty are discarded for good.
    fn cull(&mut self, survivors: &AHashSet<GenomeId>) {
        for species in self.species.iter_mut() {
            species.cull(survivors);
        }
        let before = self.species.len();
        self.species.retain(|s| !s.is_empty());
        if before != self.species.len() {
            debug!("dropped {} empty species", before - self.species.len());
        }
        self.genomes.retain(|g| survivors.contains(&g.id()));
    }

    /// Runs the reproduction operators in configured order, collecting
    /// all offspring material into one shared list.
    fn reproduce(&mut self) -> Result<Vec<GenomeMaterial>, EvolutionError> {
        let Population {
            config,
            genomes,
            species,
            ..
        } = self;
        let Config {
            rng,
            reproducers,
            population_size,
            ..
        } = config;
        let mut ctx = Ctx {
            rng,
            population_size: population_size.get(),
        };
        let mut offspring = Vec::new();
        for operator in reproducers.iter() {
            operator.reproduce(&mut ctx, species, genomes, &mut offspring)?;
        }
        Ok(offspring)
    }

    /// Runs the mutation operators in configured order over the shared
    /// offspring list.
    fn mutate_offspring(
        &mut self,
        offspring: &mut Vec<GenomeMaterial>,
    ) -> Result<(), EvolutionError> {
        let Config {
            rng,
            mutators,
            population_size,
            ..
        } = &mut self.config;
        let mut ctx = Ctx {
            rng,
            population_size: population_size.get(),
        };
        for operator in mutators.iter() {
            operator.mutate(&mut ctx, offspring)?;
        }
        Ok(())
    }

    /// Shuffles the offspring to erase operator-order bias, then trims
    /// or pads so survivors + offspring hit the population size exactly.
    fn balance(&mut self, offspring: &mut Vec<GenomeMaterial>) -> Result<(), EvolutionError> {
        let target = self.config.population_size.get() - self.genomes.len();
        offspring.shuffle(&mut self.config.rng);
        if offspring.len() > target {
            offspring.truncate(target);
        } else if offspring.len() < target {
            if offspring.is_empty() {
                return Err(EvolutionError::DegeneratePopulation);
            }
            let front = offspring.len();
            let mut next_clone = 0;
            while offspring.len() < target {
                let clone = offspring[next_clone % front].clone();
                offspring.push(clone);
                next_clone += 1;
            }
        }
        Ok(())
    }

    /// Wraps each offspring material in a fresh genome and inserts it,
    /// joining the first compatible species or founding a new one.
    fn repopulate(&mut self, offspring: Vec<GenomeMaterial>) {
        let count = offspring.len();
        for material in offspring {
            let mut genome = Genome::new(self.config.ids.next_id(), material);
            speciate(
                &mut self.species,
                &mut self.species_counter,
                &mut genome,
                &self.config.speciation,
            );
            self.genomes.push(genome);
        }
        debug!(
            "generation {}: repopulated with {} offspring, {} species alive",
            self.generation,
            count,
            self.species.len()
        );
    }

    fn fire(&mut self, kind: EventKind) {
        let event = GenerationEvent {
            kind,
            generation: self.generation,
            population_size: self.genomes.len(),
            species_count: self.species.len(),
        };
        self.config.events.fire(&event);
    }

    /// Returns the live genomes, in population order.
    pub fn genomes(&self) -> &[Genome] {
        &self.genomes
    }

    /// Returns an iterator over the current species.
    pub fn species(&self) -> impl Iterator<Item = &Species> {
        self.species.iter()
    }

    /// Resolves a genome's species back-reference.
    pub fn species_of(&self, genome: &Genome) -> Option<&Species> {
        genome
            .species()
            .and_then(|id| self.species.iter().find(|s| s.id() == id))
    }

    /// Returns the currently best-performing genome.
    pub fn champion(&self) -> &Genome {
        self.genomes
            .iter()
            .max_by(|a, b| {
                a.fitness()
                    .partial_cmp(&b.fitness())
                    .unwrap_or_else(|| panic!("uncomparable fitness value detected"))
            })
            .expect("empty population has no champion")
    }

    /// Returns the number of completed generations.
    pub fn generation(&self) -> usize {
        self.generation
    }

    /// Returns the locked configuration.
    pub fn config(&self) -> &Configuration {
        &self.config
    }

    /// Returns the event manager for listener registration.
    pub fn events_mut(&mut self) -> &mut EventManager {
        self.config.events_mut()
    }
}

/// Assigns a genome to the first species it matches, in current list
/// order, or founds a new species around its material.
fn speciate(
    species: &mut Vec<Species>,
    species_counter: &mut u64,
    genome: &mut Genome,
    parms: &SpeciationParms,
) {
    for candidate in species.iter_mut() {
        if candidate.matches(genome) {
            candidate
                .add(genome)
                .expect("matching genome rejected by its species");
            return;
        }
    }
    let id = SpeciesId::new(*species_counter);
    *species_counter += 1;
    let mut founded = Species::new(id, genome.material().clone(), *parms);
    founded
        .add(genome)
        .expect("representative incompatible with its own species");
    trace!("genome {} founded species {}", genome.id(), id);
    species.push(founded);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genome::Gene;

    fn sample(len: usize) -> GenomeMaterial {
        GenomeMaterial::new((0..len).map(|i| Gene::new(i as u64 + 1, 0.0)).collect())
    }

    fn base_builder(size: usize) -> ConfigurationBuilder {
        Configuration::builder()
            .population_size(size)
            .random_seed(17)
            .sample_material(sample(3))
            .selector(ElitistSelector::new(
                Box::new(RouletteSelection::new()),
                0.4,
                true,
                4,
            ))
            .reproduction(CloneReproduction::new(0.4))
            .reproduction(CrossoverReproduction::new(0.6))
            .mutation(ValueMutation::new(0.2, 0.5, 4.0))
            .fitness(|genome| {
                genome
                    .material()
                    .genes()
                    .iter()
                    .map(|g| g.value())
                    .sum::<f64>()
                    .abs()
            })
    }

    #[test]
    fn random_initialization_fills_every_slot() {
        let population = Population::new(base_builder(20).lock().unwrap());
        assert_eq!(population.genomes().len(), 20);
        assert!(population.species().count() >= 1);
        for genome in population.genomes() {
            assert!(genome.species().is_some());
            assert_eq!(genome.fitness(), None);
        }
    }

    #[test]
    fn every_member_is_within_threshold_of_its_representative() {
        let mut population = Population::new(base_builder(30).lock().unwrap());
        population.evolve().unwrap();
        for species in population.species() {
            for member in species.members_in(population.genomes()) {
                let distance = species
                    .representative()
                    .distance(member.material(), species.parms());
                assert!(distance < species.parms().threshold);
            }
        }
    }

    #[test]
    fn evolve_conserves_the_population_size() {
        let mut population = Population::new(base_builder(25).lock().unwrap());
        for _ in 0..8 {
            population.evolve().unwrap();
            assert_eq!(population.genomes().len(), 25);
        }
        assert_eq!(population.generation(), 8);
    }

    #[test]
    fn bulk_evaluation_must_cover_every_genome() {
        let config = base_builder(10)
            .bulk_fitness(|genomes| {
                // Skips one genome, violating the evaluation barrier.
                for genome in genomes.iter_mut().skip(1) {
                    genome.set_fitness(1.0);
                }
            })
            .lock()
            .unwrap();
        let mut population = Population::new(config);
        let id = population.genomes()[0].id();
        assert_eq!(
            population.evolve().unwrap_err(),
            EvolutionError::IncompleteEvaluation(id)
        );
    }

    #[test]
    fn negative_fitness_aborts_the_generation() {
        let config = base_builder(10).fitness(|_| -1.0).lock().unwrap();
        let mut population = Population::new(config);
        assert!(matches!(
            population.evolve().unwrap_err(),
            EvolutionError::NegativeFitness { .. }
        ));
    }

    #[test]
    fn survivors_are_marked_selected() {
        let mut population = Population::new(base_builder(20).lock().unwrap());
        population.evolve().unwrap();
        let selected = population
            .genomes()
            .iter()
            .filter(|g| g.is_selected())
            .count();
        // round(20 * 0.4) survivors carried over, the rest are offspring.
        assert_eq!(selected, 8);
    }
}
