//! A generational evolutionary optimization engine with speciation.
//!
//! The engine manages a fixed-size population of genomes across
//! generations: it clusters them into reproductively isolated species by
//! genetic distance, selects survivors under a fitness-biased policy
//! with elitism, and regenerates the population through pluggable
//! reproduction and mutation operators. What a genome *means* — and how
//! its fitness is computed — is the business of external collaborators:
//! the fitness strategy is configured as a closure, and persistence,
//! logging and run tracking observe the engine through its event bus.
//!
//! Configuration is write-once: settings are collected on a builder and
//! frozen by [`ConfigurationBuilder::lock`] before the population is
//! created.
//!
//! # Example: evolving gene values toward a target sum
//! ```
//! use oxevo::{
//!     CloneReproduction, Configuration, CrossoverReproduction, ElitistSelector, Gene,
//!     GenomeMaterial, Population, RouletteSelection, ValueMutation,
//! };
//!
//! let sample = GenomeMaterial::new(vec![
//!     Gene::new(1, 0.0),
//!     Gene::new(2, 0.0),
//!     Gene::new(3, 0.0),
//! ]);
//!
//! let config = Configuration::builder()
//!     .population_size(50)
//!     .random_seed(42)
//!     .sample_material(sample)
//!     .selector(ElitistSelector::new(Box::new(RouletteSelection::new()), 0.3, true, 3))
//!     .reproduction(CloneReproduction::new(0.3))
//!     .reproduction(CrossoverReproduction::new(0.7))
//!     .mutation(ValueMutation::new(0.25, 0.5, 4.0))
//!     // Genomes whose values sum close to 6 score the highest.
//!     .fitness(|genome| {
//!         let sum: f64 = genome.material().genes().iter().map(Gene::value).sum();
//!         (12.0 - (sum - 6.0).abs()).max(0.0)
//!     })
//!     .lock()
//!     .unwrap();
//!
//! let mut population = Population::new(config);
//! for _ in 0..10 {
//!     population.evolve().unwrap();
//! }
//!
//! assert_eq!(population.genomes().len(), 50);
//! println!("best after 10 generations: {}", population.champion());
//! ```

mod genome;
mod identity;
mod populations;

pub use genome::{Gene, Genome, GenomeMaterial, SpeciationParms};
pub use identity::{GenomeId, IdFactory, IdSnapshot};
pub use populations::*;
