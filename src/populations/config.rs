//! Write-once configuration for a population.
//!
//! Settings are gathered through a consuming [`ConfigurationBuilder`]
//! and frozen by [`lock`](ConfigurationBuilder::lock), which validates
//! required fields and yields the [`Configuration`] value the population
//! takes ownership of. Because the builder is consumed, "set after lock"
//! is not a runtime error here; it is unrepresentable.

use std::num::NonZeroUsize;

use rand::SeedableRng;
use rand_pcg::Pcg64;

use crate::genome::{Genome, GenomeMaterial, SpeciationParms};
use crate::identity::{GenomeId, IdFactory};
use crate::populations::errors::ConfigError;
use crate::populations::events::EventManager;
use crate::populations::operators::{MutationOperator, ReproductionOperator};
use crate::populations::selection::ElitistSelector;

/// How genomes get their fitness written. Exactly one variant is
/// configured per run.
pub enum FitnessStrategy {
    /// Called once per genome; the engine writes the returned score.
    PerGenome(Box<dyn FnMut(&Genome) -> f64>),
    /// Called once with the whole population; assigns fitness to each
    /// genome as a side effect. May parallelize internally, but must
    /// not return before every fitness is written.
    Bulk(Box<dyn FnMut(&mut [Genome])>),
}

/// The locked, fully-validated configuration a [`Population`] runs
/// under. Built via [`Configuration::builder`].
///
/// The genome-id counter and the event manager are deliberately *not*
/// settings: both stay reachable (and mutable) for the lifetime of the
/// run.
///
/// [`Population`]: crate::Population
pub struct Configuration {
    pub(super) population_size: NonZeroUsize,
    pub(super) speciation: SpeciationParms,
    pub(super) rng: Pcg64,
    pub(super) selector: ElitistSelector,
    pub(super) reproducers: Vec<Box<dyn ReproductionOperator>>,
    pub(super) mutators: Vec<Box<dyn MutationOperator>>,
    pub(super) fitness: FitnessStrategy,
    pub(super) sample_material: GenomeMaterial,
    pub(super) events: EventManager,
    pub(super) ids: IdFactory,
}

impl std::fmt::Debug for Configuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Configuration")
            .field("population_size", &self.population_size)
            .field("speciation", &self.speciation)
            .field("reproducers", &self.reproducers.len())
            .field("mutators", &self.mutators.len())
            .finish_non_exhaustive()
    }
}

impl Configuration {
    /// Starts collecting settings.
    pub fn builder() -> ConfigurationBuilder {
        ConfigurationBuilder::default()
    }

    /// Returns the configured population size.
    pub fn population_size(&self) -> usize {
        self.population_size.get()
    }

    /// Returns the speciation parameters.
    pub fn speciation(&self) -> &SpeciationParms {
        &self.speciation
    }

    /// Returns the sample material random populations are seeded from.
    pub fn sample_material(&self) -> &GenomeMaterial {
        &self.sample_material
    }

    /// Mints the next unique genome id.
    pub fn next_genome_id(&mut self) -> GenomeId {
        self.ids.next_id()
    }

    /// Captures the id counter for external persistence.
    pub fn id_snapshot(&self) -> crate::identity::IdSnapshot {
        self.ids.snapshot()
    }

    /// Returns the event manager.
    pub fn events(&self) -> &EventManager {
        &self.events
    }

    /// Returns the event manager for listener registration.
    pub fn events_mut(&mut self) -> &mut EventManager {
        &mut self.events
    }
}

/// Collects settings for a [`Configuration`].
///
/// Every setter may be called any number of times before
/// [`lock`](ConfigurationBuilder::lock); the last call wins. Operator
/// setters append instead, preserving the configured execution order.
///
/// # Examples
/// ```
/// use oxevo::{
///     CloneReproduction, Configuration, ElitistSelector, Gene, GenomeMaterial,
///     RouletteSelection,
/// };
///
/// let config = Configuration::builder()
///     .population_size(100)
///     .random_seed(7)
///     .sample_material(GenomeMaterial::new(vec![Gene::new(1, 0.0)]))
///     .selector(ElitistSelector::new(Box::new(RouletteSelection::new()), 0.25, true, 4))
///     .reproduction(CloneReproduction::new(1.0))
///     .fitness(|genome| genome.material().len() as f64)
///     .lock()
///     .unwrap();
/// assert_eq!(config.population_size(), 100);
/// ```
#[derive(Default)]
pub struct ConfigurationBuilder {
    population_size: Option<usize>,
    speciation: Option<SpeciationParms>,
    seed: Option<u64>,
    selector: Option<ElitistSelector>,
    reproducers: Vec<Box<dyn ReproductionOperator>>,
    mutators: Vec<Box<dyn MutationOperator>>,
    fitness: Option<FitnessStrategy>,
    sample_material: Option<GenomeMaterial>,
    events: Option<EventManager>,
    ids: Option<IdFactory>,
}

impl ConfigurationBuilder {
    /// Sets the (constant) number of genomes per generation.
    pub fn population_size(mut self, size: usize) -> Self {
        self.population_size = Some(size);
        self
    }

    /// Sets the speciation parameters.
    pub fn speciation(mut self, parms: SpeciationParms) -> Self {
        self.speciation = Some(parms);
        self
    }

    /// Seeds the shared random source. Runs with equal seeds and a
    /// deterministic fitness strategy are bit-for-bit identical.
    pub fn random_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Sets the natural selector.
    pub fn selector(mut self, selector: ElitistSelector) -> Self {
        self.selector = Some(selector);
        self
    }

    /// Appends a reproduction operator. Operators run in the order they
    /// were appended.
    pub fn reproduction(mut self, operator: impl ReproductionOperator + 'static) -> Self {
        self.reproducers.push(Box::new(operator));
        self
    }

    /// Appends a mutation operator. Operators run in the order they
    /// were appended.
    pub fn mutation(mut self, operator: impl MutationOperator + 'static) -> Self {
        self.mutators.push(Box::new(operator));
        self
    }

    /// Sets a per-genome fitness strategy, replacing any previously set
    /// strategy of either flavor.
    pub fn fitness(mut self, evaluator: impl FnMut(&Genome) -> f64 + 'static) -> Self {
        self.fitness = Some(FitnessStrategy::PerGenome(Box::new(evaluator)));
        self
    }

    /// Sets a whole-population fitness strategy, replacing any
    /// previously set strategy of either flavor.
    pub fn bulk_fitness(mut self, evaluator: impl FnMut(&mut [Genome]) + 'static) -> Self {
        self.fitness = Some(FitnessStrategy::Bulk(Box::new(evaluator)));
        self
    }

    /// Sets the sample material random initial populations draw from.
    pub fn sample_material(mut self, material: GenomeMaterial) -> Self {
        self.sample_material = Some(material);
        self
    }

    /// Installs a pre-populated event manager.
    pub fn events(mut self, events: EventManager) -> Self {
        self.events = Some(events);
        self
    }

    /// Installs an id factory, typically restored from a snapshot so a
    /// resumed run never re-issues ids.
    pub fn id_factory(mut self, ids: IdFactory) -> Self {
        self.ids = Some(ids);
        self
    }

    /// Validates the collected settings and freezes them.
    ///
    /// # Errors
    /// Fails when the population size is missing or zero, when no
    /// fitness strategy, sample material or selector was set, when the
    /// reproduction-operator list is empty, or when the survival rate
    /// or speciation threshold is out of range.
    pub fn lock(self) -> Result<Configuration, ConfigError> {
        let population_size = NonZeroUsize::new(self.population_size.unwrap_or(0))
            .ok_or(ConfigError::ZeroPopulationSize)?;
        let selector = self.selector.ok_or(ConfigError::MissingSelector)?;
        let rate = selector.survival_rate();
        if !(rate > 0.0 && rate <= 1.0) {
            return Err(ConfigError::InvalidSurvivalRate(rate));
        }
        let fitness = self.fitness.ok_or(ConfigError::MissingFitnessStrategy)?;
        let sample_material = self
            .sample_material
            .ok_or(ConfigError::MissingSampleMaterial)?;
        if self.reproducers.is_empty() {
            return Err(ConfigError::NoReproductionOperators);
        }
        let speciation = self.speciation.unwrap_or_default();
        if !(speciation.threshold > 0.0) {
            return Err(ConfigError::InvalidSpeciationThreshold(speciation.threshold));
        }
        Ok(Configuration {
            population_size,
            speciation,
            rng: Pcg64::seed_from_u64(self.seed.unwrap_or(0)),
            selector,
            reproducers: self.reproducers,
            mutators: self.mutators,
            fitness,
            sample_material,
            events: self.events.unwrap_or_default(),
            ids: self.ids.unwrap_or_default(),
        })
    }
}
