//! Single pole balancing, Markov variant: the network sees cart position,
//! cart velocity, pole angle and pole angular velocity, and pushes the
//! cart left or right each tick.

use crate::error::Result;
use crate::experiment::{evaluate_population, Generation, GenerationEvaluator, OrganismEvaluator};
use crate::options::Options;
use crate::organism::Organism;
use crate::population::Population;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::sync::atomic::{AtomicU64, Ordering};

const GRAVITY: f64 = 9.8;
const MASS_CART: f64 = 1.0;
const MASS_POLE: f64 = 0.1;
const TOTAL_MASS: f64 = MASS_CART + MASS_POLE;
/// half the pole's length
const LENGTH: f64 = 0.5;
const POLE_MASS_LENGTH: f64 = MASS_POLE * LENGTH;
const FORCE_MAG: f64 = 10.0;
const TAU: f64 = 0.02;
const TRACK_LIMIT: f64 = 2.4;
const TWELVE_DEGREES: f64 = 0.2094384;

/// One cart-pole, owned by the worker evaluating an organism.
#[derive(Debug, Clone, Copy, Default)]
struct CartPole {
    x: f64,
    x_dot: f64,
    theta: f64,
    theta_dot: f64,
}

impl CartPole {
    fn randomized(rng: &mut impl Rng) -> Self {
        Self {
            x: rng.random_range(-2.4..2.4),
            x_dot: rng.random_range(-1.0..1.0),
            theta: rng.random_range(-0.2..0.2),
            theta_dot: rng.random_range(-1.5..1.5),
        }
    }

    fn sensor_values(&self) -> [f64; 4] {
        [
            (self.x + TRACK_LIMIT) / (2. * TRACK_LIMIT),
            (self.x_dot + 0.75) / 1.5,
            (self.theta + TWELVE_DEGREES) / 0.41,
            (self.theta_dot + 1.0) / 2.0,
        ]
    }

    /// One Euler step under a bang-bang force.
    fn step(&mut self, push_right: bool) {
        let force = if push_right { FORCE_MAG } else { -FORCE_MAG };
        let cos = self.theta.cos();
        let sin = self.theta.sin();
        let temp =
            (force + POLE_MASS_LENGTH * self.theta_dot * self.theta_dot * sin) / TOTAL_MASS;
        let theta_acc = (GRAVITY * sin - cos * temp)
            / (LENGTH * (4. / 3. - MASS_POLE * cos * cos / TOTAL_MASS));
        let x_acc = temp - POLE_MASS_LENGTH * theta_acc * cos / TOTAL_MASS;

        self.x += TAU * self.x_dot;
        self.x_dot += TAU * x_acc;
        self.theta += TAU * self.theta_dot;
        self.theta_dot += TAU * theta_acc;
    }

    fn failed(&self) -> bool {
        self.x.abs() > TRACK_LIMIT || self.theta.abs() > TWELVE_DEGREES
    }
}

/// Evaluator for the Markov single pole. Each organism balances from a
/// start state drawn from a per-organism RNG seeded by the trial seed and
/// the genome id, so results cannot depend on evaluation order or worker
/// count.
#[derive(Debug)]
pub struct CartPoleEvaluator {
    pub max_steps: usize,
    base_seed: u64,
    trial: AtomicU64,
}

impl CartPoleEvaluator {
    pub fn new(base_seed: u64) -> Self {
        Self {
            max_steps: 500_000,
            base_seed,
            trial: AtomicU64::new(0),
        }
    }

    fn organism_seed(&self, genome_id: usize) -> u64 {
        let trial = self.trial.load(Ordering::Relaxed);
        self.base_seed
            .wrapping_add(trial.wrapping_mul(0x9e37_79b9_7f4a_7c15))
            ^ (genome_id as u64).wrapping_mul(0x2545_f491_4f6c_dd1d)
    }
}

impl OrganismEvaluator for CartPoleEvaluator {
    fn evaluate(&self, organism: &mut Organism) -> Result<bool> {
        let seed = self.organism_seed(organism.genome.id);
        let net = organism.phenotype()?;
        if net.max_depth(None) == 0 {
            // disconnected output: one step of balance, floor fitness
            organism.fitness = 1.;
            organism.winner = false;
            return Ok(false);
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let mut cart = CartPole::randomized(&mut rng);
        net.flush();

        let mut steps = 0;
        while steps < self.max_steps {
            net.load_sensors(&cart.sensor_values())?;
            net.activate()?;
            let out = net.output_values();
            cart.step(out[0] > out[1]);
            if cart.failed() {
                break;
            }
            steps += 1;
        }

        organism.fitness = steps as f64;
        organism.winner = steps >= self.max_steps;
        Ok(organism.winner)
    }
}

impl GenerationEvaluator for CartPoleEvaluator {
    fn generation_evaluate(
        &self,
        opts: &Options,
        pop: &mut Population,
        generation: &mut Generation,
    ) -> Result<()> {
        generation.solved = evaluate_population(pop, self, opts)?;
        Ok(())
    }

    fn trial_run_started(&self, trial: usize) {
        self.trial.store(trial as u64, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::genome::Genome;

    #[test]
    fn test_physics_fails_without_control() {
        let mut cart = CartPole {
            theta: 0.1,
            ..Default::default()
        };
        let mut steps = 0;
        while !cart.failed() && steps < 10_000 {
            cart.step(true);
            steps += 1;
        }
        assert!(steps < 10_000, "an uncontrolled cart should fall over");
    }

    #[test]
    fn test_sensor_values_are_normalized_near_origin() {
        let cart = CartPole::default();
        for v in cart.sensor_values() {
            assert!((0. ..=1.).contains(&v), "unscaled sensor value {v}");
        }
    }

    #[test]
    fn test_organism_seed_depends_on_genome_and_trial() {
        let eval = CartPoleEvaluator::new(423);
        let a = eval.organism_seed(1);
        let b = eval.organism_seed(2);
        assert_ne!(a, b);
        eval.trial.store(1, Ordering::Relaxed);
        assert_ne!(a, eval.organism_seed(1));
    }

    #[test]
    fn test_evaluation_is_deterministic() {
        let eval = CartPoleEvaluator::new(7);
        let seed = Genome::fully_connected(3, 4, 2);
        let mut a = Organism::new(seed.clone(), 0);
        let mut b = Organism::new(seed, 0);
        eval.evaluate(&mut a).unwrap();
        eval.evaluate(&mut b).unwrap();
        assert_eq!(a.fitness.to_bits(), b.fitness.to_bits());
    }

    #[test]
    fn test_degenerate_phenotype_floor() {
        let eval = CartPoleEvaluator::new(7);
        let mut genome = Genome::fully_connected(3, 4, 2);
        genome.genes.clear();
        let mut org = Organism::new(genome, 0);
        assert!(!eval.evaluate(&mut org).unwrap());
        assert_eq!(org.fitness, 1.);
    }
}
