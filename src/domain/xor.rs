//! The XOR task: the smallest problem that still needs a hidden node.

use super::DEGENERATE_FITNESS;
use crate::error::Result;
use crate::experiment::{evaluate_population, Generation, GenerationEvaluator, OrganismEvaluator};
use crate::options::Options;
use crate::organism::Organism;
use crate::population::Population;

const PATTERNS: [([f64; 2], f64); 4] = [
    ([0., 0.], 0.),
    ([0., 1.], 1.),
    ([1., 0.], 1.),
    ([1., 1.], 0.),
];

#[derive(Debug, Default)]
pub struct XorEvaluator;

impl XorEvaluator {
    pub fn new() -> Self {
        Self
    }
}

impl OrganismEvaluator for XorEvaluator {
    fn evaluate(&self, organism: &mut Organism) -> Result<bool> {
        let net = organism.phenotype()?;
        let depth = net.max_depth(None);
        if depth == 0 {
            organism.fitness = DEGENERATE_FITNESS;
            organism.error = 4.;
            organism.winner = false;
            return Ok(false);
        }

        let mut error_sum = 0.;
        let mut correct = true;
        for (input, want) in PATTERNS.iter() {
            net.flush();
            net.load_sensors(input)?;
            net.forward_steps(depth)?;
            let got = net.output_values()[0];
            error_sum += (want - got).abs();
            if (got >= 0.5) != (*want >= 0.5) {
                correct = false;
            }
        }

        organism.fitness = (4. - error_sum).powi(2);
        organism.error = error_sum;
        organism.winner = correct;
        Ok(correct)
    }
}

impl GenerationEvaluator for XorEvaluator {
    fn generation_evaluate(
        &self,
        opts: &Options,
        pop: &mut Population,
        generation: &mut Generation,
    ) -> Result<()> {
        generation.solved = evaluate_population(pop, self, opts)?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::activation::Activation;
    use crate::genome::{Gene, Genome, NodeGene, NodeRole};

    /// The textbook 2-2-1 XOR solution, wired by hand with saturating
    /// weights so the steep sigmoid acts as a gate.
    fn solved_genome() -> Genome {
        let mut g = Genome::new(1);
        g.nodes = vec![
            NodeGene::new(1, NodeRole::Sensor, Activation::Linear),
            NodeGene::new(2, NodeRole::Sensor, Activation::Linear),
            NodeGene::new(3, NodeRole::Bias, Activation::Linear),
            NodeGene::new(4, NodeRole::Hidden, Activation::SigmoidSteepened),
            NodeGene::new(5, NodeRole::Hidden, Activation::SigmoidSteepened),
            NodeGene::new(6, NodeRole::Output, Activation::SigmoidSteepened),
        ];
        g.genes = vec![
            // OR gate
            Gene::new(1, 1, 4, 10., false),
            Gene::new(2, 2, 4, 10., false),
            Gene::new(3, 3, 4, -5., false),
            // AND gate
            Gene::new(4, 1, 5, 10., false),
            Gene::new(5, 2, 5, 10., false),
            Gene::new(6, 3, 5, -15., false),
            // OR and not AND
            Gene::new(7, 4, 6, 10., false),
            Gene::new(8, 5, 6, -10., false),
            Gene::new(9, 3, 6, -5., false),
        ];
        g
    }

    #[test]
    fn test_hand_built_solution_wins() {
        let mut org = Organism::new(solved_genome(), 0);
        let won = XorEvaluator::new().evaluate(&mut org).unwrap();
        assert!(won);
        assert!(org.fitness > 9., "fitness {} too low", org.fitness);
        assert!(org.error < 1.);
    }

    #[test]
    fn test_unsolved_seed_scores_low() {
        let mut org = Organism::new(Genome::fully_connected(1, 2, 1), 0);
        let won = XorEvaluator::new().evaluate(&mut org).unwrap();
        assert!(!won);
        assert!(org.fitness < 16.);
    }

    #[test]
    fn test_small_experiment_improves() {
        use crate::experiment::{run_experiment, CancelToken};

        let seed = Genome::fully_connected(1, 2, 1);
        let mut opts = Options::default();
        opts.pop_size = 60;
        opts.num_generations = 12;
        opts.num_runs = 1;
        opts.mutate_add_node_prob = 0.03;
        opts.mutate_add_link_prob = 0.08;

        let experiment = run_experiment(
            "xor-smoke",
            &seed,
            &opts,
            &XorEvaluator::new(),
            None,
            &CancelToken::new(),
        )
        .unwrap();

        let trial = &experiment.trials[0];
        assert!(!trial.generations.is_empty());
        assert!(trial.best_fitness() > 0.);
        for g in trial.generations.iter() {
            assert!(g.diversity > 0);
            assert!(g.champion.is_some());
        }
    }

    #[test]
    fn test_degenerate_phenotype_gets_floor_fitness() {
        let mut genome = Genome::fully_connected(1, 2, 1);
        genome.genes.clear();
        let mut org = Organism::new(genome, 0);
        let won = XorEvaluator::new().evaluate(&mut org).unwrap();
        assert!(!won);
        assert_eq!(org.fitness, DEGENERATE_FITNESS);
    }
}
