use thiserror::Error;

use crate::identity::GenomeId;
use crate::populations::species::SpeciesId;

/// Configuration-validation failures, raised by
/// [`ConfigurationBuilder::lock`](crate::ConfigurationBuilder::lock).
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("population size must be at least 1")]
    ZeroPopulationSize,
    #[error("no fitness strategy configured")]
    MissingFitnessStrategy,
    #[error("no sample genome material configured")]
    MissingSampleMaterial,
    #[error("no natural selector configured")]
    MissingSelector,
    #[error("at least one reproduction operator is required")]
    NoReproductionOperators,
    #[error("survival rate {0} is outside (0, 1]")]
    InvalidSurvivalRate(f64),
    #[error("speciation threshold {0} must be positive")]
    InvalidSpeciationThreshold(f64),
}

/// Misuse of a species' membership operations.
#[derive(Debug, Error, PartialEq)]
pub enum SpeciesError {
    #[error("genome {genome} is incompatible with species {species}")]
    Incompatible {
        genome: GenomeId,
        species: SpeciesId,
    },
    #[error("genome {genome} is not a member of species {species}")]
    NotAMember {
        genome: GenomeId,
        species: SpeciesId,
    },
    #[error("fitness of genome {0} has not been evaluated")]
    Unevaluated(GenomeId),
    #[error("species {0} has no members")]
    Empty(SpeciesId),
    #[error("member {genome} of species {species} is missing from the population")]
    MissingMember {
        genome: GenomeId,
        species: SpeciesId,
    },
}

/// Failures inside a variation operator.
#[derive(Debug, Error, PartialEq)]
pub enum OperatorError {
    #[error("no eligible parents among surviving species")]
    NoParents,
}

/// Fatal error raised by [`Population::evolve`](crate::Population::evolve).
///
/// None of these are recoverable mid-generation: the in-progress
/// generation is abandoned and the caller decides whether to retry or
/// abort the run.
#[derive(Debug, Error, PartialEq)]
pub enum EvolutionError {
    #[error("fitness of genome {0} was not written during evaluation")]
    IncompleteEvaluation(GenomeId),
    #[error("fitness strategy returned negative value {fitness} for genome {genome}")]
    NegativeFitness { genome: GenomeId, fitness: f64 },
    #[error("population degenerated: no offspring could be produced")]
    DegeneratePopulation,
    #[error("seeded population requires at least one genome")]
    EmptySeed,
    #[error(transparent)]
    Species(#[from] SpeciesError),
    #[error(transparent)]
    Operator(#[from] OperatorError),
}
