//! The population of one trial: every organism and species of the current
//! generation, the innovation registry, and the reproduction epoch that
//! turns one generation into the next.
//!
//! Organisms live in a flat arena; species refer to them by index and
//! organisms refer back to species by id, so there are no ownership cycles
//! anywhere in the generation graph.

use crate::crossover::compatibility;
use crate::error::{Error, Result};
use crate::genome::Genome;
use crate::innovation::InnovationTracker;
use crate::mutation::mutate_link_weights;
use crate::options::Options;
use crate::organism::Organism;
use crate::specie::{reproduce_species, Species};
use rand::Rng;
use tracing::{debug, info};

pub struct Population {
    pub organisms: Vec<Organism>,
    pub species: Vec<Species>,
    pub tracker: InnovationTracker,
    /// best raw fitness ever observed in this trial
    pub highest_fitness: f64,
    pub epochs_since_improvement: usize,
    next_species_id: usize,
    next_genome_id: usize,
}

impl Population {
    /// Spawn a fresh population: `pop_size` clones of the seed genome, each
    /// shaken by one mild weight mutation, then speciated.
    pub fn spawn(seed: &Genome, opts: &Options, rng: &mut impl Rng) -> Result<Self> {
        seed.verify()?;
        let mut organisms = Vec::with_capacity(opts.pop_size);
        for i in 0..opts.pop_size {
            let mut genome = seed.duplicate(i + 1);
            mutate_link_weights(&mut genome, 1., 1., false, opts.weight_bound, rng);
            organisms.push(
                Organism::new(genome, 0).with_provenance(format!("seed-clone({})", seed.id)),
            );
        }

        let tracker =
            InnovationTracker::new(seed.last_node_id() + 1, seed.last_innovation() + 1);
        let mut pop = Self {
            organisms,
            species: vec![],
            tracker,
            highest_fitness: f64::MIN,
            epochs_since_improvement: 0,
            next_species_id: 1,
            next_genome_id: opts.pop_size + 1,
        };
        pop.speciate(opts);
        pop.verify()?;
        Ok(pop)
    }

    /// Place every organism into the first species whose representative is
    /// within the compatibility threshold, creating species for outliers.
    fn speciate(&mut self, opts: &Options) {
        for sp in self.species.iter_mut() {
            sp.members.clear();
        }
        for (idx, org) in self.organisms.iter_mut().enumerate() {
            match self
                .species
                .iter_mut()
                .find(|sp| compatibility(&org.genome, &sp.repr, opts) < opts.compat_threshold)
            {
                Some(sp) => {
                    sp.members.push(idx);
                    org.species_id = sp.id;
                }
                None => {
                    let mut sp = Species::new(self.next_species_id, org.genome.clone());
                    self.next_species_id += 1;
                    sp.members.push(idx);
                    org.species_id = sp.id;
                    self.species.push(sp);
                }
            }
        }
        let before = self.species.len();
        self.species.retain(|sp| !sp.members.is_empty());
        if before != self.species.len() {
            debug!(pruned = before - self.species.len(), "pruned empty species");
        }
    }

    /// The trial champion of the current generation, ordered by fitness
    /// with the genome id as the deterministic tiebreak.
    pub fn best_organism(&self) -> Option<&Organism> {
        self.organisms.iter().min_by(|l, r| l.fitness_order(r))
    }

    /// Every organism belongs to exactly one non-empty species, and every
    /// genome is structurally sound.
    pub fn verify(&self) -> Result<()> {
        for org in self.organisms.iter() {
            org.genome.verify()?;
        }
        let mut seen = vec![false; self.organisms.len()];
        for sp in self.species.iter() {
            if sp.members.is_empty() {
                return Err(Error::Invariant(format!("species {} is empty", sp.id)));
            }
            for &i in sp.members.iter() {
                if seen[i] {
                    return Err(Error::Invariant(format!(
                        "organism {i} sits in more than one species"
                    )));
                }
                seen[i] = true;
            }
        }
        if seen.iter().any(|&s| !s) {
            return Err(Error::Invariant(
                "an organism belongs to no species".to_string(),
            ));
        }
        Ok(())
    }

    /// One reproduction epoch: share fitness, allot offspring, rescue a
    /// stagnant population, reproduce, re-speciate, purge, and flush the
    /// generation's innovations.
    pub fn epoch(&mut self, generation: usize, opts: &Options, rng: &mut impl Rng) -> Result<()> {
        if self.organisms.is_empty() {
            return Err(Error::Invariant("epoch over an empty population".into()));
        }

        // 1. sort members, share fitness, flag non-survivors
        for sp in self.species.iter_mut() {
            sp.adjust_fitness(&mut self.organisms, opts);
        }

        // 2. expected offspring from the population-wide adjusted mean
        let total_adjusted: f64 = self.organisms.iter().map(|o| o.adjusted_fitness).sum();
        let mean = total_adjusted / opts.pop_size as f64;
        if mean > 0. {
            for org in self.organisms.iter_mut() {
                org.expected_offspring = org.adjusted_fitness / mean;
            }
        } else {
            // degenerate generation: nobody scored, share evenly
            let share = opts.pop_size as f64 / self.organisms.len() as f64;
            for org in self.organisms.iter_mut() {
                org.expected_offspring = share;
            }
        }

        let mut skim = 0.;
        let mut total_expected = 0usize;
        for sp in self.species.iter_mut() {
            skim = sp.count_offspring(skim, &self.organisms);
            total_expected += sp.expected_offspring;
        }
        let diff = opts.pop_size as isize - total_expected as isize;
        if diff != 0 {
            // hand the rounding remainder to the biggest allotment
            if let Some(best) = self.species.iter_mut().max_by_key(|sp| sp.expected_offspring) {
                best.expected_offspring =
                    (best.expected_offspring as isize + diff).max(0) as usize;
            }
        }
        for sp in self.species.iter() {
            debug!(
                species = sp.id,
                size = sp.len(),
                avg_adjusted = sp.average_adjusted(&self.organisms),
                expected = sp.expected_offspring,
                "allotment"
            );
        }

        // 3. population-level stagnation and the delta-coding rescue
        let mut order: Vec<usize> = (0..self.species.len()).collect();
        order.sort_by(|&l, &r| {
            self.organisms[self.species[l].members[0]]
                .fitness_order(&self.organisms[self.species[r].members[0]])
        });

        let best_fitness = self.organisms[self.species[order[0]].members[0]].fitness;
        if best_fitness > self.highest_fitness {
            self.highest_fitness = best_fitness;
            self.epochs_since_improvement = 0;
        } else {
            self.epochs_since_improvement += 1;
        }

        if self.epochs_since_improvement >= opts.dropoff_age {
            info!(
                generation,
                best = self.highest_fitness,
                "population stagnant, delta-coding the two best species"
            );
            self.epochs_since_improvement = 0;
            for sp in self.species.iter_mut() {
                sp.expected_offspring = 0;
            }
            let half = opts.pop_size / 2;
            if order.len() < 2 || half == 0 {
                self.assign_rescue(order[0], opts.pop_size);
            } else {
                self.assign_rescue(order[0], half);
                self.assign_rescue(order[1], opts.pop_size - half);
            }
        }

        // 4. reproduce every species' allotment
        let mut babies: Vec<Organism> = Vec::with_capacity(opts.pop_size);
        for sp_idx in 0..self.species.len() {
            babies.extend(reproduce_species(
                sp_idx,
                &self.species,
                &self.organisms,
                opts,
                &mut self.tracker,
                generation + 1,
                &mut self.next_genome_id,
                rng,
            )?);
        }
        if babies.len() != opts.pop_size {
            return Err(Error::Invariant(format!(
                "reproduced {} offspring for a population of {}",
                babies.len(),
                opts.pop_size
            )));
        }

        // 5 + 6. the old generation dies; newborns are re-speciated against
        // the retained representatives
        self.organisms = babies;
        for sp in self.species.iter_mut() {
            sp.age += 1;
            sp.novel = false;
        }
        self.speciate(opts);
        for sp in self.species.iter_mut() {
            if let Some(&first) = sp.members.first() {
                sp.repr = self.organisms[first].genome.clone();
            }
        }

        // innovations live for exactly one generation
        self.tracker.flush();
        self.verify()
    }

    fn assign_rescue(&mut self, sp_idx: usize, offspring: usize) {
        let sp = &mut self.species[sp_idx];
        sp.expected_offspring = offspring;
        sp.age_of_last_improvement = sp.age;
        if let Some(champ) = sp.champion() {
            self.organisms[champ].super_champ_offspring = offspring;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};
    use std::collections::HashSet;

    fn opts_small() -> Options {
        let mut opts = Options::default();
        opts.pop_size = 30;
        opts.mutate_add_node_prob = 0.05;
        opts.mutate_add_link_prob = 0.1;
        opts
    }

    #[test]
    fn test_spawn_exact_size_and_partition() {
        let seed = Genome::fully_connected(1, 3, 1);
        let opts = opts_small();
        let mut rng = StdRng::seed_from_u64(100);
        let pop = Population::spawn(&seed, &opts, &mut rng).unwrap();
        assert_eq!(pop.organisms.len(), opts.pop_size);
        assert!(!pop.species.is_empty());
        pop.verify().unwrap();
    }

    #[test]
    fn test_epoch_preserves_population_size() {
        let seed = Genome::fully_connected(1, 3, 1);
        let opts = opts_small();
        let mut rng = StdRng::seed_from_u64(101);
        let mut pop = Population::spawn(&seed, &opts, &mut rng).unwrap();

        for generation in 0..8 {
            for (i, org) in pop.organisms.iter_mut().enumerate() {
                org.fitness = (i % 7) as f64 + 0.5;
            }
            pop.epoch(generation, &opts, &mut rng).unwrap();
            assert_eq!(pop.organisms.len(), opts.pop_size);
            pop.verify().unwrap();
            for org in pop.organisms.iter() {
                assert_eq!(org.generation, generation + 1);
            }
        }
    }

    #[test]
    fn test_epoch_innovation_ids_stay_unique() {
        let seed = Genome::fully_connected(1, 3, 1);
        let mut opts = opts_small();
        opts.mutate_add_node_prob = 0.3;
        opts.mutate_add_link_prob = 0.3;
        let mut rng = StdRng::seed_from_u64(102);
        let mut pop = Population::spawn(&seed, &opts, &mut rng).unwrap();

        for generation in 0..6 {
            for org in pop.organisms.iter_mut() {
                org.fitness = org.genome.complexity() as f64;
            }
            pop.epoch(generation, &opts, &mut rng).unwrap();
            for org in pop.organisms.iter() {
                let innos: HashSet<_> = org.genome.genes.iter().map(|g| g.innovation).collect();
                assert_eq!(innos.len(), org.genome.genes.len());
            }
        }
    }

    #[test]
    fn test_delta_coding_rescue_keeps_size() {
        let seed = Genome::fully_connected(1, 3, 1);
        let mut opts = opts_small();
        opts.dropoff_age = 2;
        let mut rng = StdRng::seed_from_u64(103);
        let mut pop = Population::spawn(&seed, &opts, &mut rng).unwrap();

        // constant fitness: no improvement, so the rescue must fire
        for generation in 0..6 {
            for org in pop.organisms.iter_mut() {
                org.fitness = 1.;
            }
            pop.epoch(generation, &opts, &mut rng).unwrap();
            assert_eq!(pop.organisms.len(), opts.pop_size);
        }
    }

    #[test]
    fn test_tight_threshold_many_species_still_exact() {
        let seed = Genome::fully_connected(1, 3, 1);
        let mut opts = opts_small();
        opts.compat_threshold = 0.05;
        let mut rng = StdRng::seed_from_u64(104);
        let mut pop = Population::spawn(&seed, &opts, &mut rng).unwrap();
        assert!(pop.species.len() > 1);

        for generation in 0..4 {
            for (i, org) in pop.organisms.iter_mut().enumerate() {
                org.fitness = 1. + (i % 3) as f64;
            }
            pop.epoch(generation, &opts, &mut rng).unwrap();
            assert_eq!(pop.organisms.len(), opts.pop_size);
            pop.verify().unwrap();
        }
    }

    #[test]
    fn test_best_organism_deterministic_tiebreak() {
        let seed = Genome::fully_connected(1, 2, 1);
        let opts = opts_small();
        let mut rng = StdRng::seed_from_u64(105);
        let mut pop = Population::spawn(&seed, &opts, &mut rng).unwrap();
        for org in pop.organisms.iter_mut() {
            org.fitness = 5.;
        }
        // all tied: the lowest genome id wins
        assert_eq!(pop.best_organism().unwrap().genome.id, 1);
    }
}
