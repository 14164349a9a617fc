//! A flattened evaluator for hot loops.
//!
//! Nodes are packed into contiguous arrays, biases first, then sensors,
//! hidden and outputs, with incoming links in one CSR-style vector. The
//! propagation math is the same synchronous pass as [Network](super::Network)
//! performs, with per-node link order preserved, so outputs are
//! bitwise-identical to the canonical activator on any deterministic input.

use super::Network;
use crate::activation::Activation;
use crate::error::{Error, Result};
use crate::genome::NodeRole;

#[derive(Debug, Clone, Copy)]
struct FlatLink {
    from: usize,
    weight: f64,
    recurrent: bool,
}

#[derive(Debug, Clone)]
pub struct FastSolver {
    pub genome_id: usize,
    bias_count: usize,
    sensor_count: usize,
    total: usize,
    activations: Vec<Activation>,
    values: Vec<f64>,
    last_values: Vec<f64>,
    sums: Vec<f64>,
    counts: Vec<u32>,
    starts: Vec<usize>,
    links: Vec<FlatLink>,
    output_start: usize,
}

impl FastSolver {
    pub fn from_network(net: &Network) -> Self {
        let nodes = net.nodes();
        let by_role = |role: NodeRole| {
            nodes
                .iter()
                .enumerate()
                .filter_map(move |(i, n)| (n.role == role).then_some(i))
        };
        let order = by_role(NodeRole::Bias)
            .chain(by_role(NodeRole::Sensor))
            .chain(by_role(NodeRole::Hidden))
            .chain(by_role(NodeRole::Output))
            .collect::<Vec<_>>();

        let mut flat_of = vec![0; nodes.len()];
        for (flat, &arena) in order.iter().enumerate() {
            flat_of[arena] = flat;
        }

        let bias_count = by_role(NodeRole::Bias).count();
        let sensor_count = by_role(NodeRole::Sensor).count();
        let hidden_count = by_role(NodeRole::Hidden).count();
        let total = order.len();

        let mut starts = Vec::with_capacity(total + 1);
        let mut links = vec![];
        let mut activations = Vec::with_capacity(total);
        for &arena in order.iter() {
            starts.push(links.len());
            activations.push(nodes[arena].activation);
            for link in nodes[arena].incoming.iter() {
                links.push(FlatLink {
                    from: flat_of[link.from],
                    weight: link.weight,
                    recurrent: link.recurrent,
                });
            }
        }
        starts.push(links.len());

        Self {
            genome_id: net.genome_id,
            bias_count,
            sensor_count,
            total,
            activations,
            values: vec![0.; total],
            last_values: vec![0.; total],
            sums: vec![0.; total],
            counts: vec![0; total],
            starts,
            links,
            output_start: bias_count + sensor_count + hidden_count,
        }
    }

    pub fn load_sensors(&mut self, values: &[f64]) -> Result<()> {
        if values.len() != self.sensor_count {
            return Err(Error::InvalidInput(format!(
                "loaded {} sensor values into a solver with {} sensors",
                values.len(),
                self.sensor_count
            )));
        }
        for flat in 0..self.bias_count {
            self.last_values[flat] = self.values[flat];
            self.values[flat] = 1.;
            self.counts[flat] += 1;
        }
        for (i, &v) in values.iter().enumerate() {
            let flat = self.bias_count + i;
            self.last_values[flat] = self.values[flat];
            self.values[flat] = v;
            self.counts[flat] += 1;
        }
        Ok(())
    }

    pub fn flush(&mut self) {
        self.values.fill(0.);
        self.last_values.fill(0.);
        self.sums.fill(0.);
        self.counts.fill(0);
    }

    pub fn activate(&mut self) -> Result<bool> {
        if self.total == 0 {
            return Err(Error::Invariant("activating an empty solver".into()));
        }
        if self.output_start == self.total {
            return Err(Error::Invariant(format!(
                "solver of genome {} has no outputs",
                self.genome_id
            )));
        }

        let first = self.bias_count + self.sensor_count;
        let mut next = vec![(0., 0.); self.total - first];
        let mut fan_in = vec![];
        for flat in first..self.total {
            let span = self.starts[flat]..self.starts[flat + 1];
            if self.activations[flat].is_module() {
                fan_in.clear();
                for link in self.links[span].iter() {
                    let v = if link.recurrent {
                        self.last_values[link.from]
                    } else {
                        self.values[link.from]
                    };
                    fan_in.push(link.weight * v);
                }
                next[flat - first] = (0., self.activations[flat].apply_module(&fan_in));
            } else {
                let mut sum = 0.;
                for link in self.links[span].iter() {
                    let v = if link.recurrent {
                        self.last_values[link.from]
                    } else {
                        self.values[link.from]
                    };
                    sum += link.weight * v;
                }
                next[flat - first] = (sum, self.activations[flat].apply(sum));
            }
        }

        for (offset, (sum, value)) in next.into_iter().enumerate() {
            let flat = first + offset;
            self.sums[flat] = sum;
            self.last_values[flat] = self.values[flat];
            self.values[flat] = value;
            self.counts[flat] += 1;
        }

        Ok(self.counts[self.output_start..].iter().all(|&c| c > 0))
    }

    pub fn forward_steps(&mut self, steps: usize) -> Result<bool> {
        if steps == 0 {
            return Err(Error::InvalidInput(
                "forward_steps needs at least one step".into(),
            ));
        }
        let mut on = false;
        for _ in 0..steps {
            on = self.activate()?;
        }
        Ok(on)
    }

    pub fn output_values(&self) -> Vec<f64> {
        self.values[self.output_start..].to_vec()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::genome::{Gene, Genome, NodeGene};

    fn tangled_genome() -> Genome {
        let mut g = Genome::new(5);
        g.nodes = vec![
            NodeGene::new(1, NodeRole::Sensor, Activation::Linear),
            NodeGene::new(2, NodeRole::Sensor, Activation::Linear),
            NodeGene::new(3, NodeRole::Bias, Activation::Linear),
            NodeGene::new(4, NodeRole::Hidden, Activation::SigmoidSteepened),
            NodeGene::new(5, NodeRole::Hidden, Activation::Tanh),
            NodeGene::new(6, NodeRole::Output, Activation::SigmoidSteepened),
            NodeGene::new(7, NodeRole::Output, Activation::Linear),
        ];
        g.genes = vec![
            Gene::new(1, 1, 4, 0.83, false),
            Gene::new(2, 2, 4, -1.25, false),
            Gene::new(3, 3, 5, 0.4, false),
            Gene::new(4, 4, 5, 1.1, false),
            Gene::new(5, 5, 6, -0.6, false),
            Gene::new(6, 5, 7, 2.0, false),
            Gene::new(7, 6, 4, 0.7, true),
            Gene::new(8, 1, 7, -0.3, false),
        ];
        g
    }

    #[test]
    fn test_matches_canonical_network_bitwise() {
        let genome = tangled_genome();
        let mut net = Network::from_genome(&genome).unwrap();
        let mut fast = FastSolver::from_network(&net);

        for step in 0..7 {
            let input = [0.1 * step as f64, -0.4 + 0.2 * step as f64];
            net.load_sensors(&input).unwrap();
            fast.load_sensors(&input).unwrap();
            net.activate().unwrap();
            fast.activate().unwrap();
            // bitwise, not approximate
            assert_eq!(net.output_values(), fast.output_values());
        }

        net.flush();
        fast.flush();
        net.load_sensors(&[0.5, 0.5]).unwrap();
        fast.load_sensors(&[0.5, 0.5]).unwrap();
        net.forward_steps(4).unwrap();
        fast.forward_steps(4).unwrap();
        assert_eq!(net.output_values(), fast.output_values());
    }

    #[test]
    fn test_module_nodes_match() {
        let mut genome = tangled_genome();
        genome.nodes[4] = NodeGene::new(5, NodeRole::Hidden, Activation::MaxModule);
        let mut net = Network::from_genome(&genome).unwrap();
        let mut fast = FastSolver::from_network(&net);
        net.load_sensors(&[1., -1.]).unwrap();
        fast.load_sensors(&[1., -1.]).unwrap();
        for _ in 0..4 {
            net.activate().unwrap();
            fast.activate().unwrap();
            assert_eq!(net.output_values(), fast.output_values());
        }
    }

    #[test]
    fn test_sensor_cardinality() {
        let net = Network::from_genome(&tangled_genome()).unwrap();
        let mut fast = FastSolver::from_network(&net);
        assert!(fast.load_sensors(&[1.]).is_err());
    }
}
