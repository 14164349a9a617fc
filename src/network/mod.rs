//! The phenotype: an activation-evaluable graph derived from a genome's
//! enabled genes.
//!
//! Nodes live in a flat arena and refer to each other by index, so the
//! graph carries no ownership cycles. Sensor and output nodes keep their
//! genome order as indexable sequences; that ordering is the contract with
//! fitness evaluators. Activation is synchronous: all input sums are
//! gathered against the previous pass before any node updates, and a link
//! flagged recurrent reads its source's prior activation instead of the
//! current one.

pub mod solver;

pub use solver::FastSolver;

use crate::activation::Activation;
use crate::error::{Error, Result};
use crate::genome::{Genome, NodeRole};
use fxhash::FxHashMap;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Link {
    /// arena index of the source node
    pub from: usize,
    pub weight: f64,
    pub recurrent: bool,
}

#[derive(Debug, Clone)]
pub struct NetworkNode {
    /// genome node id
    pub id: usize,
    pub role: NodeRole,
    pub activation: Activation,
    pub sum: f64,
    pub value: f64,
    pub last_value: f64,
    pub activations: u32,
    pub incoming: Vec<Link>,
    /// arena indices of nodes this one feeds
    pub outgoing: Vec<usize>,
}

#[derive(Debug, Clone)]
pub struct Network {
    pub genome_id: usize,
    nodes: Vec<NetworkNode>,
    sensors: Vec<usize>,
    biases: Vec<usize>,
    outputs: Vec<usize>,
}

impl Network {
    /// Build the phenotype from a genome's enabled genes. Nodes keep genome
    /// order; per-node incoming links keep gene order.
    pub fn from_genome(genome: &Genome) -> Result<Self> {
        let mut index: FxHashMap<usize, usize> = FxHashMap::default();
        let mut nodes = Vec::with_capacity(genome.nodes.len());
        let mut sensors = vec![];
        let mut biases = vec![];
        let mut outputs = vec![];

        for (idx, n) in genome.nodes.iter().enumerate() {
            index.insert(n.id, idx);
            match n.role {
                NodeRole::Sensor => sensors.push(idx),
                NodeRole::Bias => biases.push(idx),
                NodeRole::Output => outputs.push(idx),
                NodeRole::Hidden => {}
            }
            nodes.push(NetworkNode {
                id: n.id,
                role: n.role,
                activation: n.activation,
                sum: 0.,
                value: 0.,
                last_value: 0.,
                activations: 0,
                incoming: vec![],
                outgoing: vec![],
            });
        }

        for gene in genome.genes.iter().filter(|g| g.enabled) {
            let (from, to) = match (index.get(&gene.from), index.get(&gene.to)) {
                (Some(f), Some(t)) => (*f, *t),
                _ => {
                    return Err(Error::Invariant(format!(
                        "genome {}: gene {} references a missing node",
                        genome.id, gene.innovation
                    )))
                }
            };
            nodes[to].incoming.push(Link {
                from,
                weight: gene.weight,
                recurrent: gene.recurrent,
            });
            nodes[from].outgoing.push(to);
        }

        Ok(Self {
            genome_id: genome.id,
            nodes,
            sensors,
            biases,
            outputs,
        })
    }

    pub fn nodes(&self) -> &[NetworkNode] {
        &self.nodes
    }

    pub fn sensor_indices(&self) -> &[usize] {
        &self.sensors
    }

    pub fn output_indices(&self) -> &[usize] {
        &self.outputs
    }

    pub fn node_index(&self, id: usize) -> Option<usize> {
        self.nodes.iter().position(|n| n.id == id)
    }

    pub fn output_values(&self) -> Vec<f64> {
        self.outputs.iter().map(|&i| self.nodes[i].value).collect()
    }

    /// Assign `values[i]` to the i-th sensor; bias nodes receive 1.0.
    pub fn load_sensors(&mut self, values: &[f64]) -> Result<()> {
        if values.len() != self.sensors.len() {
            return Err(Error::InvalidInput(format!(
                "loaded {} sensor values into a network with {} sensors",
                values.len(),
                self.sensors.len()
            )));
        }
        for (&idx, &v) in self.sensors.iter().zip(values.iter()) {
            let node = &mut self.nodes[idx];
            node.last_value = node.value;
            node.value = v;
            node.activations += 1;
        }
        for &idx in self.biases.iter() {
            let node = &mut self.nodes[idx];
            node.last_value = node.value;
            node.value = 1.;
            node.activations += 1;
        }
        Ok(())
    }

    /// Zero every node's state so the network can be reused on fresh input.
    pub fn flush(&mut self) {
        for node in self.nodes.iter_mut() {
            node.sum = 0.;
            node.value = 0.;
            node.last_value = 0.;
            node.activations = 0;
        }
    }

    /// Confirm an earlier flush actually cleared the network.
    pub fn flush_check(&self) -> Result<()> {
        for node in self.nodes.iter() {
            if node.value != 0. || node.last_value != 0. || node.sum != 0. || node.activations != 0
            {
                return Err(Error::Invariant(format!(
                    "node {} still carries activation after flush",
                    node.id
                )));
            }
        }
        Ok(())
    }

    /// One synchronous propagation pass. Returns whether the outputs are on
    /// (every output has activated at least once).
    pub fn activate(&mut self) -> Result<bool> {
        if self.nodes.is_empty() {
            return Err(Error::Invariant("activating an empty network".into()));
        }
        if self.outputs.is_empty() {
            return Err(Error::Invariant(format!(
                "network of genome {} has no outputs",
                self.genome_id
            )));
        }

        let mut next = Vec::with_capacity(self.nodes.len());
        let mut fan_in = vec![];
        for node in self.nodes.iter() {
            if node.role.is_input() {
                next.push(None);
                continue;
            }
            if node.activation.is_module() {
                fan_in.clear();
                for link in node.incoming.iter() {
                    let src = &self.nodes[link.from];
                    let v = if link.recurrent {
                        src.last_value
                    } else {
                        src.value
                    };
                    fan_in.push(link.weight * v);
                }
                next.push(Some((0., node.activation.apply_module(&fan_in))));
            } else {
                let mut sum = 0.;
                for link in node.incoming.iter() {
                    let src = &self.nodes[link.from];
                    let v = if link.recurrent {
                        src.last_value
                    } else {
                        src.value
                    };
                    sum += link.weight * v;
                }
                next.push(Some((sum, node.activation.apply(sum))));
            }
        }

        for (node, new) in self.nodes.iter_mut().zip(next) {
            if let Some((sum, value)) = new {
                node.sum = sum;
                node.last_value = node.value;
                node.value = value;
                node.activations += 1;
            }
        }

        Ok(self.outputs.iter().all(|&i| self.nodes[i].activations > 0))
    }

    /// Repeat [activate](Self::activate) `steps` times; enough passes for a
    /// feed-forward graph of that depth to settle.
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

    /// Activate until the outputs stabilize within `tol`, or `max_steps` is
    /// exhausted. Returns whether the network relaxed.
    pub fn relax(&mut self, max_steps: usize, tol: f64) -> Result<bool> {
        let mut prev = self.output_values();
        for _ in 0..max_steps {
            self.activate()?;
            let cur = self.output_values();
            let settled = prev
                .iter()
                .zip(cur.iter())
                .all(|(p, c)| (p - c).abs() <= tol);
            if settled {
                return Ok(true);
            }
            prev = cur;
        }
        Ok(false)
    }

    fn depth_from(&self, idx: usize, on_path: &mut [bool], cap: Option<usize>) -> usize {
        if self.nodes[idx].role.is_input() {
            return 0;
        }
        on_path[idx] = true;
        let mut best = 0;
        for link in self.nodes[idx].incoming.iter() {
            if on_path[link.from] {
                continue;
            }
            let d = 1 + self.depth_from(link.from, on_path, cap);
            if d > best {
                best = d;
            }
            if cap.is_some_and(|c| best >= c) {
                break;
            }
        }
        on_path[idx] = false;
        best
    }

    /// Longest directed path from any sensor to any output, cycles cut by a
    /// visited guard. Zero means no output is reachable from a sensor. With
    /// `cap`, the search short-circuits once the cap is reached.
    pub fn max_depth(&self, cap: Option<usize>) -> usize {
        let mut on_path = vec![false; self.nodes.len()];
        let mut best = 0;
        for &out in self.outputs.iter() {
            let d = self.depth_from(out, &mut on_path, cap);
            if d > best {
                best = d;
            }
            if cap.is_some_and(|c| best >= c) {
                return capped(best, cap);
            }
        }
        capped(best, cap)
    }

    /// Would a new link `src -> dst` close a cycle? True when a directed
    /// path already leads from `dst` back to `src` (self-loops included).
    /// `count` accrues visited nodes; past `thresh` the search gives up and
    /// reports non-recurrent.
    pub fn is_recurrent(
        &self,
        src: usize,
        dst: usize,
        count: &mut usize,
        thresh: usize,
    ) -> bool {
        if src == dst {
            return true;
        }
        let mut visited = vec![false; self.nodes.len()];
        let mut stack = vec![dst];
        while let Some(at) = stack.pop() {
            *count += 1;
            if *count > thresh {
                debug!(
                    genome = self.genome_id,
                    thresh, "recurrence search hit its node threshold"
                );
                return false;
            }
            if at == src {
                return true;
            }
            if visited[at] {
                continue;
            }
            visited[at] = true;
            for &next in self.nodes[at].outgoing.iter() {
                if !visited[next] {
                    stack.push(next);
                }
            }
        }
        false
    }
}

fn capped(depth: usize, cap: Option<usize>) -> usize {
    match cap {
        Some(c) if depth > c => c,
        _ => depth,
    }
}
