//! Reading and writing genomes: the plain-text seed/dump format, the binary
//! stream, and the Cytoscape JSON graph export.
//!
//! The text form is line oriented: a `genomestart <id>` header, one
//! `trait` / `node` / `gene` line per element, and a `genomeend <id>`
//! footer. `#` lines are comments. The same syntax reads seed genomes and
//! dumps evolved ones.

use super::{Gene, Genome, NodeGene, NodePlacement, NodeRole, TraitGene, TRAIT_PARAMS};
use crate::activation::Activation;
use crate::error::{Error, Result};
use serde_json::json;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use std::str::FromStr;

fn field<T: FromStr>(tokens: &[&str], idx: usize, line: &str) -> Result<T> {
    tokens
        .get(idx)
        .and_then(|t| t.parse::<T>().ok())
        .ok_or_else(|| Error::InvalidInput(format!("malformed genome line: {line}")))
}

fn trait_ref(raw: usize) -> Option<usize> {
    (raw != 0).then_some(raw)
}

pub fn parse_genome(text: &str) -> Result<Genome> {
    let mut genome: Option<Genome> = None;
    let mut closed = false;

    for raw_line in text.lines() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let tokens = line.split_whitespace().collect::<Vec<_>>();

        match tokens[0] {
            "genomestart" => {
                if genome.is_some() {
                    return Err(Error::InvalidInput("nested genomestart".to_string()));
                }
                genome = Some(Genome::new(field(&tokens, 1, line)?));
            }
            "genomeend" => {
                let id: usize = field(&tokens, 1, line)?;
                match genome.as_ref() {
                    Some(g) if g.id == id => closed = true,
                    Some(g) => {
                        return Err(Error::InvalidInput(format!(
                            "genomeend {id} does not match genomestart {}",
                            g.id
                        )))
                    }
                    None => return Err(Error::InvalidInput("genomeend before genomestart".into())),
                }
            }
            "trait" => {
                let g = genome
                    .as_mut()
                    .ok_or_else(|| Error::InvalidInput("trait before genomestart".into()))?;
                let id = field(&tokens, 1, line)?;
                let mut params = [0.; TRAIT_PARAMS];
                for (i, p) in params.iter_mut().enumerate() {
                    *p = field(&tokens, 2 + i, line)?;
                }
                g.traits.push(TraitGene::new(id, params));
            }
            "node" => {
                let g = genome
                    .as_mut()
                    .ok_or_else(|| Error::InvalidInput("node before genomestart".into()))?;
                let id = field(&tokens, 1, line)?;
                let trait_id = trait_ref(field(&tokens, 2, line)?);
                let role = NodeRole::from_token(tokens.get(3).copied().unwrap_or_default())?;
                let placement =
                    NodePlacement::from_token(tokens.get(4).copied().unwrap_or_default())?;
                let activation =
                    Activation::from_name(tokens.get(5).copied().unwrap_or_default())?;
                let mut node = NodeGene::new(id, role, activation).with_trait(trait_id);
                node.placement = placement;
                g.nodes.push(node);
            }
            "gene" => {
                let g = genome
                    .as_mut()
                    .ok_or_else(|| Error::InvalidInput("gene before genomestart".into()))?;
                let trait_id = trait_ref(field(&tokens, 1, line)?);
                let from = field(&tokens, 2, line)?;
                let to = field(&tokens, 3, line)?;
                let weight: f64 = field(&tokens, 4, line)?;
                let recurrent = field::<u8>(&tokens, 5, line)? != 0;
                let innovation = field(&tokens, 6, line)?;
                let mutation_num: f64 = field(&tokens, 7, line)?;
                let enabled = field::<u8>(&tokens, 8, line)? != 0;

                let mut gene = Gene::new(innovation, from, to, weight, recurrent);
                gene.mutation_num = mutation_num;
                gene.enabled = enabled;
                gene.trait_id = trait_id;
                g.insert_gene(gene);
            }
            other => {
                return Err(Error::InvalidInput(format!(
                    "unknown genome line tag: {other}"
                )))
            }
        }
    }

    let genome = genome.ok_or_else(|| Error::InvalidInput("no genomestart found".into()))?;
    if !closed {
        return Err(Error::InvalidInput(format!(
            "genome {} missing genomeend",
            genome.id
        )));
    }
    genome.verify()?;
    Ok(genome)
}

pub fn format_genome(genome: &Genome) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "genomestart {}", genome.id);
    for t in genome.traits.iter() {
        let _ = write!(out, "trait {}", t.id);
        for p in t.params.iter() {
            let _ = write!(out, " {p}");
        }
        let _ = writeln!(out);
    }
    for n in genome.nodes.iter() {
        let _ = writeln!(
            out,
            "node {} {} {} {} {}",
            n.id,
            n.trait_id.unwrap_or(0),
            n.role.token(),
            n.placement.token(),
            n.activation.name()
        );
    }
    for g in genome.genes.iter() {
        let _ = writeln!(
            out,
            "gene {} {} {} {} {} {} {} {}",
            g.trait_id.unwrap_or(0),
            g.from,
            g.to,
            g.weight,
            g.recurrent as u8,
            g.innovation,
            g.mutation_num,
            g.enabled as u8
        );
    }
    let _ = writeln!(out, "genomeend {}", genome.id);
    out
}

pub fn read_genome_file<P: AsRef<Path>>(path: P) -> Result<Genome> {
    parse_genome(&fs::read_to_string(path)?)
}

pub fn write_genome_file<P: AsRef<Path>>(genome: &Genome, path: P) -> Result<()> {
    fs::write(path, format_genome(genome))?;
    Ok(())
}

/// Binary stream form of a genome.
pub fn to_binary(genome: &Genome) -> Result<Vec<u8>> {
    Ok(bincode::serde::encode_to_vec(
        genome,
        bincode::config::standard(),
    )?)
}

pub fn from_binary(bytes: &[u8]) -> Result<Genome> {
    let (genome, _): (Genome, usize) =
        bincode::serde::decode_from_slice(bytes, bincode::config::standard())?;
    genome.verify()?;
    Ok(genome)
}

/// Cytoscape-JSON graph of the genome, used for winner dumps.
pub fn to_cytoscape(genome: &Genome) -> serde_json::Value {
    let nodes = genome
        .nodes
        .iter()
        .map(|n| {
            json!({
                "data": {
                    "id": n.id.to_string(),
                    "role": n.role.token(),
                    "placement": n.placement.token(),
                    "activation": n.activation.name(),
                }
            })
        })
        .collect::<Vec<_>>();
    let edges = genome
        .genes
        .iter()
        .map(|g| {
            json!({
                "data": {
                    "id": format!("e{}", g.innovation),
                    "source": g.from.to_string(),
                    "target": g.to.to_string(),
                    "weight": g.weight,
                    "recurrent": g.recurrent,
                    "enabled": g.enabled,
                    "innovation": g.innovation,
                }
            })
        })
        .collect::<Vec<_>>();

    json!({ "elements": { "nodes": nodes, "edges": edges } })
}
