//! Species: compatibility clusters of organisms, their stagnation
//! bookkeeping, and per-species reproduction.
//!
//! A species holds indices into the population's organism arena rather than
//! the organisms themselves, and its representative is a clone of its first
//! (fittest) member's genome, retained across the generation boundary so
//! newborns have something stable to be compared against.

use crate::crossover::{mate_multipoint, mate_multipoint_avg, mate_singlepoint};
use crate::error::{Error, Result};
use crate::genome::Genome;
use crate::innovation::InnovationTracker;
use crate::mutation::{mutate, mutate_link_weights};
use crate::options::Options;
use crate::organism::Organism;
use core::cmp::Ordering;
use rand::seq::IndexedRandom;
use rand::Rng;
use tracing::trace;

/// fitness boost applied to species young enough to deserve protection
const YOUNG_AGE_LIMIT: usize = 10;
/// penalty multiplier once a species has stagnated past the dropoff age
const STAGNANT_PENALTY: f64 = 0.01;

#[derive(Debug, Clone)]
pub struct Species {
    pub id: usize,
    pub age: usize,
    pub age_of_last_improvement: usize,
    pub max_fitness_ever: f64,
    pub expected_offspring: usize,
    pub novel: bool,
    /// generalization-tested flag used by the non-Markov champion sweep
    pub checked: bool,
    /// clone of the first member's genome
    pub repr: Genome,
    /// indices into the population's organism list
    pub members: Vec<usize>,
}

impl Species {
    pub fn new(id: usize, repr: Genome) -> Self {
        Self {
            id,
            age: 0,
            age_of_last_improvement: 0,
            max_fitness_ever: f64::MIN,
            expected_offspring: 0,
            novel: true,
            checked: false,
            repr,
            members: vec![],
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Index of the species champion; valid after
    /// [adjust_fitness](Self::adjust_fitness) sorted the members.
    pub fn champion(&self) -> Option<usize> {
        self.members.first().copied()
    }

    /// Sort members fittest-first, mark the champion, apply explicit
    /// fitness sharing with age adjustments, and flag the non-survivors.
    pub fn adjust_fitness(&mut self, orgs: &mut [Organism], opts: &Options) {
        if self.members.is_empty() {
            return;
        }
        let size = self.members.len() as f64;
        let age_debt = (self.age + 1).saturating_sub(self.age_of_last_improvement + opts.dropoff_age);

        for &i in self.members.iter() {
            let org = &mut orgs[i];
            let mut adjusted = org.fitness;
            if age_debt >= 1 {
                adjusted *= STAGNANT_PENALTY;
            }
            if self.age <= YOUNG_AGE_LIMIT {
                adjusted *= opts.age_significance;
            }
            if adjusted <= 0. {
                adjusted = 0.0001;
            }
            org.adjusted_fitness = adjusted / size;
            org.champion = false;
            org.eliminate = false;
        }

        self.members
            .sort_by(|&l, &r| orgs[l].fitness_order(&orgs[r]));

        let best = &mut orgs[self.members[0]];
        if best.fitness > self.max_fitness_ever {
            self.max_fitness_ever = best.fitness;
            self.age_of_last_improvement = self.age;
        }
        best.champion = true;

        // survivors: the top survival_thresh fraction, champion always in
        let parents = ((opts.survival_thresh * size).floor() as usize + 1).min(self.members.len());
        for &i in self.members.iter().skip(parents) {
            orgs[i].eliminate = true;
        }
    }

    /// Fold the members' fractional expected-offspring into an integer
    /// allotment, carrying the remainder (`skim`) across species so the
    /// population total stays exact.
    pub fn count_offspring(&mut self, mut skim: f64, orgs: &[Organism]) -> f64 {
        let mut expected = 0usize;
        for &i in self.members.iter() {
            let e = orgs[i].expected_offspring;
            expected += e.trunc() as usize;
            skim += e.fract();
            if skim >= 1. {
                expected += skim.trunc() as usize;
                skim -= skim.trunc();
            }
        }
        self.expected_offspring = expected;
        skim
    }

    /// Mean adjusted fitness of the members.
    pub fn average_adjusted(&self, orgs: &[Organism]) -> f64 {
        if self.members.is_empty() {
            return 0.;
        }
        self.members
            .iter()
            .map(|&i| orgs[i].adjusted_fitness)
            .sum::<f64>()
            / self.members.len() as f64
    }
}

fn fitness_ordering(l: f64, r: f64) -> Ordering {
    l.partial_cmp(&r).unwrap_or(Ordering::Equal)
}

/// Produce one species' allotment of offspring. The champion goes through
/// cloned and unchanged; the rest come from mutation of a surviving parent
/// or from mating, possibly across species.
#[allow(clippy::too_many_arguments)]
pub fn reproduce_species(
    sp_idx: usize,
    species: &[Species],
    orgs: &[Organism],
    opts: &Options,
    tracker: &mut InnovationTracker,
    generation: usize,
    next_genome_id: &mut usize,
    rng: &mut impl Rng,
) -> Result<Vec<Organism>> {
    let sp = &species[sp_idx];
    let allotment = sp.expected_offspring;
    if allotment == 0 || sp.members.is_empty() {
        return Ok(vec![]);
    }

    let pool = sp
        .members
        .iter()
        .copied()
        .filter(|&i| !orgs[i].eliminate)
        .collect::<Vec<_>>();
    if pool.is_empty() {
        return Err(Error::Invariant(format!(
            "species {} has an allotment but no surviving parents",
            sp.id
        )));
    }
    let champ = &orgs[pool[0]];
    let mut super_left = champ.super_champ_offspring;
    let mut champ_done = false;

    let mut babies = Vec::with_capacity(allotment);
    for _ in 0..allotment {
        let id = *next_genome_id;
        *next_genome_id += 1;

        let baby = if super_left > 0 {
            // delta-coding clone of the population champion; the first stays
            // pristine, the rest get a weight shake
            let mut genome = champ.genome.duplicate(id);
            if super_left < champ.super_champ_offspring {
                mutate_link_weights(
                    &mut genome,
                    opts.weight_mut_power,
                    1.,
                    false,
                    opts.weight_bound,
                    rng,
                );
            }
            super_left -= 1;
            let mut baby = Organism::new(genome, generation)
                .with_provenance(format!("delta-clone({})", champ.genome.id));
            baby.pop_champion_child = true;
            baby
        } else if !champ_done {
            champ_done = true;
            Organism::new(champ.genome.duplicate(id), generation)
                .with_provenance(format!("champion-clone({})", champ.genome.id))
        } else if pool.len() == 1 || rng.random::<f64>() < opts.mutate_only_prob {
            let parent = &orgs[*pool.choose(rng).expect("pool checked non-empty")];
            let mut genome = parent.genome.duplicate(id);
            let structural = mutate(&mut genome, tracker, opts, rng)?;
            let mut baby = Organism::new(genome, generation)
                .with_provenance(format!("mutate({})", parent.genome.id));
            baby.mut_struct_baby = structural;
            baby
        } else {
            let mom = &orgs[*pool.choose(rng).expect("pool checked non-empty")];
            let others = (0..species.len())
                .filter(|&i| i != sp_idx && !species[i].members.is_empty())
                .collect::<Vec<_>>();
            let dad = match others.choose(rng) {
                Some(&other) if rng.random::<f64>() < opts.interspecies_mate_rate => {
                    // cross-species partner: the other species' champion
                    &orgs[species[other].members[0]]
                }
                _ => &orgs[*pool.choose(rng).expect("pool checked non-empty")],
            };

            let mom_fit = fitness_ordering(mom.fitness, dad.fitness);
            let total = opts.mate_multipoint_prob
                + opts.mate_multipoint_avg_prob
                + opts.mate_singlepoint_prob;
            let roll = if total > 0. {
                rng.random::<f64>() * total
            } else {
                0.
            };
            let (mut genome, how) = if roll < opts.mate_multipoint_prob || total <= 0. {
                (
                    mate_multipoint(&mom.genome, &dad.genome, id, mom_fit, opts, rng)?,
                    "multipoint",
                )
            } else if roll < opts.mate_multipoint_prob + opts.mate_multipoint_avg_prob {
                (
                    mate_multipoint_avg(&mom.genome, &dad.genome, id, mom_fit, opts, rng)?,
                    "multipoint-avg",
                )
            } else {
                (
                    mate_singlepoint(&mom.genome, &dad.genome, id, opts, rng)?,
                    "singlepoint",
                )
            };

            let mut structural = false;
            if rng.random::<f64>() >= opts.mate_only_prob || mom.genome.id == dad.genome.id {
                structural = mutate(&mut genome, tracker, opts, rng)?;
            }
            let mut baby = Organism::new(genome, generation).with_provenance(format!(
                "mate-{how}({}x{})",
                mom.genome.id, dad.genome.id
            ));
            baby.mate_baby = true;
            baby.mut_struct_baby = structural;
            baby
        };

        babies.push(baby);
    }

    trace!(
        species = sp.id,
        allotment,
        "reproduced a species' allotment"
    );
    Ok(babies)
}
