//! Genomes and their genetic material.
//!
//! A [`Genome`] is one candidate solution: a unique id, a fitness slot
//! written by the evaluation collaborator, and an owned, immutable
//! [`GenomeMaterial`]. Material is the actual gene sequence; everything
//! that "mutates" material does so by constructing a fresh value, so a
//! material assigned to a genome is never modified in place.

use std::cmp::Ordering;
use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::identity::GenomeId;
use crate::populations::SpeciesId;

/// Value bound used when drawing randomized initial gene values.
const RANDOM_VALUE_BOUND: f64 = 1.0;

/// A single gene: an opaque locus paired with a real value.
///
/// The engine never interprets the value beyond distance arithmetic and
/// operator perturbation; what a locus *means* is the business of the
/// transcription collaborator. Genes order by locus within a material.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Gene {
    locus: u64,
    value: f64,
}

impl Gene {
    /// Returns a new gene at the given locus.
    ///
    /// # Examples
    /// ```
    /// use oxevo::Gene;
    ///
    /// let gene = Gene::new(42, 2.0);
    /// assert_eq!(gene.locus(), 42);
    /// assert_eq!(gene.value(), 2.0);
    /// ```
    pub fn new(locus: u64, value: f64) -> Gene {
        Gene { locus, value }
    }

    /// Returns the gene's locus.
    pub fn locus(&self) -> u64 {
        self.locus
    }

    /// Returns the gene's value.
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Returns a copy of the gene carrying a different value.
    pub fn with_value(self, value: f64) -> Gene {
        Gene { value, ..self }
    }
}

impl PartialOrd for Gene {
    fn partial_cmp(&self, other: &Gene) -> Option<Ordering> {
        match self.locus.cmp(&other.locus) {
            Ordering::Equal => self.value.partial_cmp(&other.value),
            ordering => Some(ordering),
        }
    }
}

/// Distance-weighting coefficients and the speciation threshold.
///
/// Two genomes belong to the same species when their material distance
/// is below `threshold`. The distance between two materials is
///
/// ```text
/// (excess_factor * E + disjoint_factor * D) / N  +  common_value_factor * W
/// ```
///
/// where `E` and `D` count excess and disjoint genes, `N` is the larger
/// gene count and `W` is the mean absolute value difference over genes
/// at common loci.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpeciationParms {
    pub excess_factor: f64,
    pub disjoint_factor: f64,
    pub common_value_factor: f64,
    pub threshold: f64,
}

impl Default for SpeciationParms {
    fn default() -> SpeciationParms {
        SpeciationParms {
            excess_factor: 1.0,
            disjoint_factor: 1.0,
            common_value_factor: 0.4,
            threshold: 1.0,
        }
    }
}

/// An immutable, ordered gene sequence plus optional parent genome ids.
///
/// Exactly one genome owns a material at a time; producing offspring
/// always clones into a fresh, independently owned value. Genes are kept
/// sorted by locus with unique loci.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenomeMaterial {
    genes: Vec<Gene>,
    primary_parent: Option<GenomeId>,
    secondary_parent: Option<GenomeId>,
}

impl GenomeMaterial {
    /// Returns a parentless material from the given genes.
    ///
    /// Genes are sorted by locus; on duplicate loci the first gene wins.
    ///
    /// # Examples
    /// ```
    /// use oxevo::{Gene, GenomeMaterial};
    ///
    /// let material = GenomeMaterial::new(vec![Gene::new(3, 0.5), Gene::new(1, -0.5)]);
    /// assert_eq!(material.genes()[0].locus(), 1);
    /// ```
    pub fn new(genes: Vec<Gene>) -> GenomeMaterial {
        GenomeMaterial::with_parents(genes, None, None)
    }

    /// Returns a material recording up to two parent genomes.
    pub fn with_parents(
        mut genes: Vec<Gene>,
        primary_parent: Option<GenomeId>,
        secondary_parent: Option<GenomeId>,
    ) -> GenomeMaterial {
        genes.sort_by_key(Gene::locus);
        genes.dedup_by_key(|g| g.locus());
        GenomeMaterial {
            genes,
            primary_parent,
            secondary_parent,
        }
    }

    /// Returns the genes, sorted by locus.
    pub fn genes(&self) -> &[Gene] {
        &self.genes
    }

    /// Returns the gene count.
    pub fn len(&self) -> usize {
        self.genes.len()
    }

    /// Returns `true` if the material carries no genes.
    pub fn is_empty(&self) -> bool {
        self.genes.is_empty()
    }

    /// Returns the id of the primary parent genome, if any.
    pub fn primary_parent(&self) -> Option<GenomeId> {
        self.primary_parent
    }

    /// Returns the id of the secondary parent genome, if any.
    pub fn secondary_parent(&self) -> Option<GenomeId> {
        self.secondary_parent
    }

    /// Clones the material for an offspring of `parent`.
    pub fn child_of(&self, parent: GenomeId) -> GenomeMaterial {
        GenomeMaterial {
            genes: self.genes.clone(),
            primary_parent: Some(parent),
            secondary_parent: None,
        }
    }

    /// Returns a parentless copy with every gene value redrawn uniformly
    /// from [-1, 1]. Used to seed random initial populations from one
    /// sample material.
    pub fn randomized<R: Rng>(&self, rng: &mut R) -> GenomeMaterial {
        let genes = self
            .genes
            .iter()
            .map(|g| g.with_value(rng.gen_range(-RANDOM_VALUE_BOUND..=RANDOM_VALUE_BOUND)))
            .collect();
        GenomeMaterial {
            genes,
            primary_parent: None,
            secondary_parent: None,
        }
    }

    /// Returns the genetic distance between two materials.
    ///
    /// The distance is symmetric: `a.distance(b, p) == b.distance(a, p)`.
    ///
    /// # Examples
    /// ```
    /// use oxevo::{Gene, GenomeMaterial, SpeciationParms};
    ///
    /// let parms = SpeciationParms::default();
    /// let a = GenomeMaterial::new(vec![Gene::new(1, 1.0), Gene::new(2, 2.0)]);
    /// let b = GenomeMaterial::new(vec![Gene::new(1, 1.0), Gene::new(2, 2.0)]);
    /// assert_eq!(a.distance(&b, &parms), 0.0);
    /// ```
    pub fn distance(&self, other: &GenomeMaterial, parms: &SpeciationParms) -> f64 {
        let n = self.genes.len().max(other.genes.len());
        if n == 0 {
            return 0.0;
        }

        let mut disjoint = 0usize;
        let mut common = 0usize;
        let mut value_delta = 0.0;
        let (mut i, mut j) = (0, 0);
        while i < self.genes.len() && j < other.genes.len() {
            let (a, b) = (&self.genes[i], &other.genes[j]);
            match a.locus.cmp(&b.locus) {
                Ordering::Equal => {
                    common += 1;
                    value_delta += (a.value - b.value).abs();
                    i += 1;
                    j += 1;
                }
                Ordering::Less => {
                    disjoint += 1;
                    i += 1;
                }
                Ordering::Greater => {
                    disjoint += 1;
                    j += 1;
                }
            }
        }
        // Whatever is left on either side lies beyond the other's range.
        let excess = (self.genes.len() - i) + (other.genes.len() - j);

        let mismatch = (parms.excess_factor * excess as f64
            + parms.disjoint_factor * disjoint as f64)
            / n as f64;
        let divergence = if common > 0 {
            parms.common_value_factor * value_delta / common as f64
        } else {
            0.0
        };
        mismatch + divergence
    }
}

/// Material equality considers the gene sequence only, not parentage.
impl PartialEq for GenomeMaterial {
    fn eq(&self, other: &GenomeMaterial) -> bool {
        self.genes == other.genes
    }
}

/// One candidate solution in a population.
///
/// The fitness slot starts unevaluated (`None`) and is written only by
/// the configured fitness strategy. The species back-reference is a key,
/// resolved through the population that owns the species, so a genome can
/// outlive its species without dangling.
#[derive(Debug, Serialize, Deserialize)]
pub struct Genome {
    id: GenomeId,
    material: GenomeMaterial,
    fitness: Option<f64>,
    species: Option<SpeciesId>,
    selected: bool,
}

impl Genome {
    /// Wraps material in a new genome under the given id.
    pub fn new(id: GenomeId, material: GenomeMaterial) -> Genome {
        Genome {
            id,
            material,
            fitness: None,
            species: None,
            selected: false,
        }
    }

    /// Returns the genome's unique id.
    pub fn id(&self) -> GenomeId {
        self.id
    }

    /// Returns the genome's material.
    pub fn material(&self) -> &GenomeMaterial {
        &self.material
    }

    /// Returns the genome's raw fitness, or `None` while unevaluated.
    pub fn fitness(&self) -> Option<f64> {
        self.fitness
    }

    /// Writes the genome's fitness. Called by the evaluation
    /// collaborator; the engine itself never invents fitness values.
    pub fn set_fitness(&mut self, fitness: f64) {
        self.fitness = Some(fitness);
    }

    /// Returns the id of the species the genome currently belongs to.
    pub fn species(&self) -> Option<SpeciesId> {
        self.species
    }

    pub(crate) fn set_species(&mut self, species: SpeciesId) {
        self.species = Some(species);
    }

    /// Returns `true` if the genome was picked as a survivor by the most
    /// recent selection round.
    pub fn is_selected(&self) -> bool {
        self.selected
    }

    pub(crate) fn set_selected(&mut self, selected: bool) {
        self.selected = selected;
    }

    /// Returns the genetic distance to another genome.
    pub fn distance(&self, other: &Genome, parms: &SpeciationParms) -> f64 {
        self.material.distance(&other.material, parms)
    }
}

/// Genome equality is id equality.
impl PartialEq for Genome {
    fn eq(&self, other: &Genome) -> bool {
        self.id == other.id
    }
}

impl fmt::Display for Genome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.fitness {
            Some(fitness) => write!(f, "genome {} (fitness {})", self.id, fitness),
            None => write!(f, "genome {} (unevaluated)", self.id),
        }
    }
}
