//! Species: clusters of reproductively compatible genomes.

use std::cell::Cell;
use std::fmt;

use ahash::AHashSet;
use serde::{Deserialize, Serialize};

use crate::genome::{Genome, GenomeMaterial, SpeciationParms};
use crate::identity::GenomeId;
use crate::populations::errors::SpeciesError;

/// Species identifier, unique within one population.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SpeciesId(u64);

impl SpeciesId {
    pub(crate) fn new(raw: u64) -> SpeciesId {
        SpeciesId(raw)
    }

    /// Returns the raw numeric value of the id.
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SpeciesId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A cluster of genomes within a genetic-distance threshold of a fixed
/// representative.
///
/// The representative is the material of the genome that founded the
/// species, cloned at creation time and never swapped afterwards, even
/// if the founder itself is later culled. Every member satisfies
/// `distance(representative, member) < threshold`.
///
/// A species does not own its members; it records their ids, and the
/// owning population resolves them. Membership is revised every
/// generation by [`Species::cull`]; a species that ends a generation
/// empty is discarded and never resurrected.
#[derive(Debug, Serialize, Deserialize)]
pub struct Species {
    id: SpeciesId,
    representative: GenomeMaterial,
    parms: SpeciationParms,
    members: Vec<GenomeId>,
    #[serde(skip)]
    fittest: Cell<Option<GenomeId>>,
}

impl Species {
    /// Creates an empty species around a representative material. The
    /// founder is added by the caller like any other member.
    pub(crate) fn new(
        id: SpeciesId,
        representative: GenomeMaterial,
        parms: SpeciationParms,
    ) -> Species {
        Species {
            id,
            representative,
            parms,
            members: Vec::new(),
            fittest: Cell::new(None),
        }
    }

    /// Returns the species' id.
    pub fn id(&self) -> SpeciesId {
        self.id
    }

    /// Returns the species' representative material.
    pub fn representative(&self) -> &GenomeMaterial {
        &self.representative
    }

    /// Returns the speciation parameters the species clusters under.
    pub fn parms(&self) -> &SpeciationParms {
        &self.parms
    }

    /// Returns `true` iff the genome is within the speciation threshold
    /// of the representative. Pure; never mutates.
    pub fn matches(&self, genome: &Genome) -> bool {
        self.representative.distance(genome.material(), &self.parms) < self.parms.threshold
    }

    /// Adds a genome to the species and points its species key here.
    ///
    /// Returns `Ok(false)` without mutating anything if the genome is
    /// already a member.
    ///
    /// # Errors
    /// Fails if the genome does not match the representative.
    pub fn add(&mut self, genome: &mut Genome) -> Result<bool, SpeciesError> {
        if !self.matches(genome) {
            return Err(SpeciesError::Incompatible {
                genome: genome.id(),
                species: self.id,
            });
        }
        if self.members.contains(&genome.id()) {
            return Ok(false);
        }
        genome.set_species(self.id);
        self.members.push(genome.id());
        self.fittest.set(None);
        Ok(true)
    }

    /// Retains only the members present in `keep`. The representative's
    /// identity is untouched whether or not the founder survives.
    pub fn cull(&mut self, keep: &AHashSet<GenomeId>) {
        self.members.retain(|id| keep.contains(id));
        self.fittest.set(None);
    }

    /// Returns `true` if the species has no members.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Returns the member count.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Returns the member ids, in insertion order.
    pub fn members(&self) -> &[GenomeId] {
        &self.members
    }

    /// Returns `true` if the genome id is a member.
    pub fn contains(&self, id: GenomeId) -> bool {
        self.members.contains(&id)
    }

    /// Resolves the member genomes against a population view, in
    /// membership order. Members absent from the view are skipped.
    pub fn members_in<'a>(&self, genomes: &'a [Genome]) -> Vec<&'a Genome> {
        self.members
            .iter()
            .filter_map(|id| genomes.iter().find(|g| g.id() == *id))
            .collect()
    }

    /// Returns the mean raw fitness across current members.
    ///
    /// # Errors
    /// Fails if the species is empty, or any member's fitness is still
    /// unevaluated.
    pub fn fitness_value(&self, genomes: &[Genome]) -> Result<f64, SpeciesError> {
        if self.members.is_empty() {
            return Err(SpeciesError::Empty(self.id));
        }
        let mut sum = 0.0;
        for id in &self.members {
            let genome = self.resolve(genomes, *id)?;
            sum += genome
                .fitness()
                .ok_or(SpeciesError::Unevaluated(genome.id()))?;
        }
        Ok(sum / self.members.len() as f64)
    }

    /// Returns the genome's fitness shared among its niche-mates: raw
    /// fitness divided by the species' member count, so larger species
    /// dilute individual credit.
    ///
    /// # Errors
    /// Fails if the genome is not currently a member, or its fitness is
    /// unevaluated.
    pub fn member_fitness(&self, genome: &Genome) -> Result<f64, SpeciesError> {
        if !self.contains(genome.id()) {
            return Err(SpeciesError::NotAMember {
                genome: genome.id(),
                species: self.id,
            });
        }
        let fitness = genome
            .fitness()
            .ok_or(SpeciesError::Unevaluated(genome.id()))?;
        Ok(fitness / self.members.len() as f64)
    }

    /// Returns the currently best-performing member. Linear scan, cached
    /// until the membership changes through `add` or `cull`.
    ///
    /// # Errors
    /// Fails if the species is empty or any member is unevaluated.
    pub fn fittest<'a>(&self, genomes: &'a [Genome]) -> Result<&'a Genome, SpeciesError> {
        if let Some(id) = self.fittest.get() {
            return self.resolve(genomes, id);
        }
        let mut best: Option<(&Genome, f64)> = None;
        for id in &self.members {
            let genome = self.resolve(genomes, *id)?;
            let fitness = genome
                .fitness()
                .ok_or(SpeciesError::Unevaluated(genome.id()))?;
            if best.map_or(true, |(_, top)| fitness > top) {
                best = Some((genome, fitness));
            }
        }
        let (best, _) = best.ok_or(SpeciesError::Empty(self.id))?;
        self.fittest.set(Some(best.id()));
        Ok(best)
    }

    fn resolve<'a>(&self, genomes: &'a [Genome], id: GenomeId) -> Result<&'a Genome, SpeciesError> {
        genomes
            .iter()
            .find(|g| g.id() == id)
            .ok_or(SpeciesError::MissingMember {
                genome: id,
                species: self.id,
            })
    }
}
