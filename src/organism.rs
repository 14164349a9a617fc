//! An organism: a genome, its cached phenotype, and the bookkeeping the
//! reproduction epoch hangs off it.

use crate::error::Result;
use crate::genome::Genome;
use crate::network::Network;
use core::cmp::Ordering;

#[derive(Debug, Clone)]
pub struct Organism {
    pub genome: Genome,
    phenotype: Option<Network>,

    /// raw fitness assigned by the evaluator
    pub fitness: f64,
    /// fitness after sharing and age adjustments
    pub adjusted_fitness: f64,
    pub error: f64,
    pub expected_offspring: f64,
    /// extra clones granted by the delta-coding rescue
    pub super_champ_offspring: usize,

    pub generation: usize,
    /// non-owning back-reference to the species this organism sits in
    pub species_id: usize,

    pub winner: bool,
    pub champion: bool,
    pub eliminate: bool,
    pub pop_champion_child: bool,
    pub mut_struct_baby: bool,
    pub mate_baby: bool,

    /// human-readable origin, for debugging dumps
    pub provenance: String,
}

impl Organism {
    pub fn new(genome: Genome, generation: usize) -> Self {
        Self {
            genome,
            phenotype: None,
            fitness: 0.,
            adjusted_fitness: 0.,
            error: 0.,
            expected_offspring: 0.,
            super_champ_offspring: 0,
            generation,
            species_id: 0,
            winner: false,
            champion: false,
            eliminate: false,
            pop_champion_child: false,
            mut_struct_baby: false,
            mate_baby: false,
            provenance: String::new(),
        }
    }

    pub fn with_provenance(mut self, provenance: String) -> Self {
        self.provenance = provenance;
        self
    }

    /// The cached phenotype, built on first use. Callers that mutate the
    /// genome must [invalidate](Self::invalidate_phenotype) it.
    pub fn phenotype(&mut self) -> Result<&mut Network> {
        if self.phenotype.is_none() {
            self.phenotype = Some(Network::from_genome(&self.genome)?);
        }
        match self.phenotype.as_mut() {
            Some(net) => Ok(net),
            None => unreachable!(),
        }
    }

    pub fn invalidate_phenotype(&mut self) {
        self.phenotype = None;
    }

    /// Total order used to pick generation champions: fitness descending,
    /// genome id ascending as the deterministic tiebreak.
    pub fn fitness_order(&self, other: &Self) -> Ordering {
        other
            .fitness
            .partial_cmp(&self.fitness)
            .unwrap_or(Ordering::Equal)
            .then(self.genome.id.cmp(&other.genome.id))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_phenotype_is_cached_and_invalidated() {
        let mut org = Organism::new(Genome::fully_connected(1, 2, 1), 0);
        let sensors = org.phenotype().unwrap().sensor_indices().len();
        assert_eq!(sensors, 2);

        org.genome.nodes.push(crate::genome::NodeGene::new(
            9,
            crate::genome::NodeRole::Sensor,
            crate::activation::Activation::Linear,
        ));
        // stale until invalidated
        assert_eq!(org.phenotype().unwrap().sensor_indices().len(), 2);
        org.invalidate_phenotype();
        assert_eq!(org.phenotype().unwrap().sensor_indices().len(), 3);
    }

    #[test]
    fn test_fitness_order_tiebreak() {
        let mut a = Organism::new(Genome::fully_connected(1, 1, 1), 0);
        let mut b = Organism::new(Genome::fully_connected(2, 1, 1), 0);
        a.fitness = 1.;
        b.fitness = 2.;
        assert_eq!(a.fitness_order(&b), Ordering::Greater);
        b.fitness = 1.;
        // equal fitness: lower genome id wins
        assert_eq!(a.fitness_order(&b), Ordering::Less);
    }
}
