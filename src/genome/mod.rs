//! The variable-length structural genome and its invariants.
//!
//! A genome is an ordered list of trait parameter groups, node genes and
//! connection genes. Connection genes stay sorted by innovation id, which is
//! what lets crossover and the compatibility measure walk two genomes
//! jointly. The phenotype lives in [crate::network]; reproduction operators
//! live in [crate::mutation] and [crate::crossover].

pub mod gene;
pub mod io;
pub mod node;
pub mod trait_gene;

pub use gene::Gene;
pub use node::{NodeGene, NodePlacement, NodeRole};
pub use trait_gene::{TraitGene, TRAIT_PARAMS};

use crate::activation::Activation;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Genome {
    pub id: usize,
    pub traits: Vec<TraitGene>,
    pub nodes: Vec<NodeGene>,
    /// kept sorted by innovation id
    pub genes: Vec<Gene>,
}

impl Genome {
    pub fn new(id: usize) -> Self {
        Self {
            id,
            traits: vec![],
            nodes: vec![],
            genes: vec![],
        }
    }

    /// A seed genome with `sensors` sensor nodes, one bias, and `outputs`
    /// output nodes, every input wired to every output. Node ids start at 1,
    /// innovation ids at 1, matching the genome file convention.
    pub fn fully_connected(id: usize, sensors: usize, outputs: usize) -> Self {
        let mut genome = Self::new(id);
        for n in 0..sensors {
            genome
                .nodes
                .push(NodeGene::new(n + 1, NodeRole::Sensor, Activation::Linear));
        }
        genome.nodes.push(NodeGene::new(
            sensors + 1,
            NodeRole::Bias,
            Activation::Linear,
        ));
        for n in 0..outputs {
            genome.nodes.push(NodeGene::new(
                sensors + 2 + n,
                NodeRole::Output,
                Activation::default(),
            ));
        }

        let mut innovation = 1;
        for from in 1..=sensors + 1 {
            for out in 0..outputs {
                genome
                    .genes
                    .push(Gene::new(innovation, from, sensors + 2 + out, 1., false));
                innovation += 1;
            }
        }
        genome
    }

    pub fn duplicate(&self, new_id: usize) -> Self {
        let mut copy = self.clone();
        copy.id = new_id;
        copy
    }

    pub fn node(&self, id: usize) -> Option<&NodeGene> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn trait_gene(&self, id: usize) -> Option<&TraitGene> {
        self.traits.iter().find(|t| t.id == id)
    }

    pub fn sensors(&self) -> impl Iterator<Item = &NodeGene> {
        self.nodes.iter().filter(|n| n.role == NodeRole::Sensor)
    }

    pub fn outputs(&self) -> impl Iterator<Item = &NodeGene> {
        self.nodes.iter().filter(|n| n.role == NodeRole::Output)
    }

    pub fn sensor_count(&self) -> usize {
        self.sensors().count()
    }

    pub fn output_count(&self) -> usize {
        self.outputs().count()
    }

    /// Node and gene count together; the complexity statistic reported per
    /// generation.
    pub fn complexity(&self) -> usize {
        self.nodes.len() + self.genes.len()
    }

    pub fn has_link(&self, from: usize, to: usize, recurrent: bool) -> bool {
        self.genes
            .iter()
            .any(|g| g.from == from && g.to == to && g.recurrent == recurrent)
    }

    /// Insert keeping the genes sorted by innovation id.
    pub fn insert_gene(&mut self, gene: Gene) {
        let at = self
            .genes
            .partition_point(|g| g.innovation < gene.innovation);
        self.genes.insert(at, gene);
    }

    pub fn last_node_id(&self) -> usize {
        self.nodes.iter().map(|n| n.id).max().unwrap_or(0)
    }

    pub fn last_innovation(&self) -> usize {
        self.genes.last().map(|g| g.innovation).unwrap_or(0)
    }

    /// Check every structural invariant a genome must satisfy. Violations
    /// here are fatal for the trial that produced the genome.
    pub fn verify(&self) -> Result<()> {
        let mut seen_innovations = HashSet::new();
        let mut last = None;
        for gene in self.genes.iter() {
            if !seen_innovations.insert(gene.innovation) {
                return Err(Error::Invariant(format!(
                    "genome {}: duplicate innovation {}",
                    self.id, gene.innovation
                )));
            }
            if let Some(prev) = last {
                if prev > gene.innovation {
                    return Err(Error::Invariant(format!(
                        "genome {}: genes out of innovation order at {}",
                        self.id, gene.innovation
                    )));
                }
            }
            last = Some(gene.innovation);

            for end in [gene.from, gene.to] {
                if self.node(end).is_none() {
                    return Err(Error::Invariant(format!(
                        "genome {}: gene {} references missing node {end}",
                        self.id, gene.innovation
                    )));
                }
            }
            if self.node(gene.to).is_some_and(|n| n.role.is_input()) {
                return Err(Error::Invariant(format!(
                    "genome {}: gene {} feeds into input node {}",
                    self.id, gene.innovation, gene.to
                )));
            }
            if let Some(trait_id) = gene.trait_id {
                if self.trait_gene(trait_id).is_none() {
                    return Err(Error::Invariant(format!(
                        "genome {}: gene {} references missing trait {trait_id}",
                        self.id, gene.innovation
                    )));
                }
            }
        }

        let mut seen_paths = HashSet::new();
        for gene in self.genes.iter() {
            if !seen_paths.insert((gene.from, gene.to, gene.recurrent)) {
                return Err(Error::Invariant(format!(
                    "genome {}: duplicate link {} -> {}",
                    self.id, gene.from, gene.to
                )));
            }
        }

        let mut seen_nodes = HashSet::new();
        for node in self.nodes.iter() {
            if !seen_nodes.insert(node.id) {
                return Err(Error::Invariant(format!(
                    "genome {}: duplicate node id {}",
                    self.id, node.id
                )));
            }
            if let Some(trait_id) = node.trait_id {
                if self.trait_gene(trait_id).is_none() {
                    return Err(Error::Invariant(format!(
                        "genome {}: node {} references missing trait {trait_id}",
                        self.id, node.id
                    )));
                }
            }
        }

        Ok(())
    }
}
