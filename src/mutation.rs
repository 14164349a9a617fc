//! Mutation operators over genomes.
//!
//! Structural operators (add-node, add-link, connect-sensors) consult the
//! [InnovationTracker] before minting anything, so identical structural
//! mutations within one generation share ids. Parametric operators only
//! touch weights and traits. Everything takes its randomness and rates
//! explicitly; nothing here owns an RNG or reads global state.

use crate::genome::{Gene, Genome, NodeGene, NodeRole};
use crate::innovation::InnovationTracker;
use crate::network::Network;
use crate::options::Options;
use crate::error::Result;
use rand::seq::IndexedRandom;
use rand::Rng;
use rand_distr::StandardNormal;

/// chance a weight mutation replaces the weight outright instead of
/// perturbing it
const COLD_REPLACE_PROB: f64 = 0.1;

fn uniform_signed(rng: &mut impl Rng) -> f64 {
    rng.random::<f64>() * 2. - 1.
}

/// Perturb or replace enabled-gene weights. With `severe` every gene is
/// touched regardless of `rate`. Weights stay clamped to `bound`.
pub fn mutate_link_weights(
    genome: &mut Genome,
    power: f64,
    rate: f64,
    severe: bool,
    bound: f64,
    rng: &mut impl Rng,
) {
    for gene in genome.genes.iter_mut().filter(|g| g.enabled) {
        if !severe && rng.random::<f64>() >= rate {
            continue;
        }
        if rng.random::<f64>() < COLD_REPLACE_PROB {
            gene.weight = uniform_signed(rng) * power;
            gene.mutation_num = gene.weight;
        } else {
            let delta = power * rng.sample::<f64, _>(StandardNormal);
            gene.weight += delta;
            gene.mutation_num += delta;
        }
        gene.weight = gene.weight.clamp(-bound, bound);
    }
}

/// Split an enabled gene with a new hidden node. The pick is biased toward
/// older genes (lower innovation ids), which disturbs settled structure
/// less. Returns false when the genome has nothing to split.
pub fn mutate_add_node(
    genome: &mut Genome,
    tracker: &mut InnovationTracker,
    rng: &mut impl Rng,
) -> bool {
    let enabled = genome
        .genes
        .iter()
        .enumerate()
        .filter_map(|(i, g)| g.enabled.then_some(i))
        .collect::<Vec<_>>();
    if enabled.is_empty() {
        return false;
    }

    // squared draw skews the index toward the front of the sorted list
    let skewed = rng.random::<f64>().powi(2);
    let at = enabled[((skewed * enabled.len() as f64) as usize).min(enabled.len() - 1)];

    let (split_innovation, from, to, weight, recurrent, trait_id) = {
        let g = &genome.genes[at];
        (g.innovation, g.from, g.to, g.weight, g.recurrent, g.trait_id)
    };
    genome.genes[at].enabled = false;

    let novel = tracker.node_innovation(split_innovation);
    genome.nodes.push(
        NodeGene::new(novel.node_id, NodeRole::Hidden, Default::default()).with_trait(trait_id),
    );
    genome.insert_gene(
        Gene::new(novel.in_innovation, from, novel.node_id, 1., false).with_trait(trait_id),
    );
    genome.insert_gene(
        Gene::new(novel.out_innovation, novel.node_id, to, weight, recurrent)
            .with_trait(trait_id),
    );
    true
}

/// Try up to `newlink_tries` random (from, to) pairs for a new link. The
/// target pool excludes sensors and bias nodes; the recurrence of a found
/// pair is decided against the phenotype, and a pass only accepts pairs
/// matching the recurrence it went looking for.
pub fn mutate_add_link(
    genome: &mut Genome,
    tracker: &mut InnovationTracker,
    opts: &Options,
    rng: &mut impl Rng,
) -> Result<bool> {
    let net = Network::from_genome(genome)?;
    let do_recur = rng.random::<f64>() < opts.recur_only_prob;
    let thresh = genome.nodes.len() * genome.nodes.len();

    let sources = genome.nodes.iter().map(|n| n.id).collect::<Vec<_>>();
    let targets = genome
        .nodes
        .iter()
        .filter(|n| !n.role.is_input())
        .map(|n| n.id)
        .collect::<Vec<_>>();
    if sources.is_empty() || targets.is_empty() {
        return Ok(false);
    }

    for _ in 0..opts.newlink_tries {
        let from = *sources.choose(rng).expect("sources checked non-empty");
        let to = *targets.choose(rng).expect("targets checked non-empty");
        if from == to && !(do_recur && opts.allow_self_loops) {
            continue;
        }
        if genome.has_link(from, to, true) || genome.has_link(from, to, false) {
            continue;
        }

        let (from_idx, to_idx) = match (net.node_index(from), net.node_index(to)) {
            (Some(f), Some(t)) => (f, t),
            _ => continue,
        };
        let mut count = 0;
        let recurrent = net.is_recurrent(from_idx, to_idx, &mut count, thresh);
        if recurrent != do_recur {
            continue;
        }

        let novel = tracker.link_innovation(from, to, recurrent, uniform_signed(rng));
        let trait_id = genome.traits.choose(rng).map(|t| t.id);
        genome.insert_gene(
            Gene::new(novel.innovation, from, to, novel.weight, recurrent).with_trait(trait_id),
        );
        return Ok(true);
    }
    Ok(false)
}

/// Wire one fully-disconnected sensor to every output it does not reach
/// yet. Biases exploration toward giving inputs influence early.
pub fn mutate_connect_sensors(
    genome: &mut Genome,
    tracker: &mut InnovationTracker,
    rng: &mut impl Rng,
) -> bool {
    let disconnected = genome
        .nodes
        .iter()
        .filter(|n| n.role.is_input())
        .filter(|n| !genome.genes.iter().any(|g| g.from == n.id))
        .map(|n| n.id)
        .collect::<Vec<_>>();
    let Some(&sensor) = disconnected.choose(rng) else {
        return false;
    };

    let outputs = genome.outputs().map(|n| n.id).collect::<Vec<_>>();
    let mut connected = false;
    for out in outputs {
        if genome.has_link(sensor, out, false) {
            continue;
        }
        let novel = tracker.link_innovation(sensor, out, false, uniform_signed(rng));
        genome.insert_gene(Gene::new(novel.innovation, sensor, out, novel.weight, false));
        connected = true;
    }
    connected
}

/// Perturb the parameters of one randomly chosen trait.
pub fn mutate_random_trait(genome: &mut Genome, opts: &Options, rng: &mut impl Rng) -> bool {
    if genome.traits.is_empty() {
        return false;
    }
    let at = rng.random_range(0..genome.traits.len());
    genome.traits[at].perturb(opts.trait_mut_power, opts.trait_param_mut_prob, rng);
    true
}

/// Rebind a random gene to a random trait.
pub fn mutate_link_trait(genome: &mut Genome, rng: &mut impl Rng) -> bool {
    if genome.traits.is_empty() || genome.genes.is_empty() {
        return false;
    }
    let trait_id = genome.traits[rng.random_range(0..genome.traits.len())].id;
    let at = rng.random_range(0..genome.genes.len());
    genome.genes[at].trait_id = Some(trait_id);
    true
}

/// Rebind a random non-input node to a random trait.
pub fn mutate_node_trait(genome: &mut Genome, rng: &mut impl Rng) -> bool {
    if genome.traits.is_empty() {
        return false;
    }
    let candidates = genome
        .nodes
        .iter()
        .enumerate()
        .filter_map(|(i, n)| (!n.role.is_input()).then_some(i))
        .collect::<Vec<_>>();
    let Some(&at) = candidates.choose(rng) else {
        return false;
    };
    let trait_id = genome.traits[rng.random_range(0..genome.traits.len())].id;
    genome.nodes[at].trait_id = Some(trait_id);
    true
}

/// Flip the enabled flag of a random gene. A gene is only disabled when its
/// source still feeds something else, so no section of the network breaks
/// off silently.
pub fn mutate_toggle_enable(genome: &mut Genome, rng: &mut impl Rng) -> bool {
    if genome.genes.is_empty() {
        return false;
    }
    let at = rng.random_range(0..genome.genes.len());
    if genome.genes[at].enabled {
        let from = genome.genes[at].from;
        let safe = genome
            .genes
            .iter()
            .enumerate()
            .any(|(i, g)| i != at && g.enabled && g.from == from);
        if !safe {
            return false;
        }
        genome.genes[at].enabled = false;
    } else {
        genome.genes[at].enabled = true;
    }
    true
}

/// Re-enable the first disabled gene, if any.
pub fn mutate_gene_reenable(genome: &mut Genome) -> bool {
    match genome.genes.iter_mut().find(|g| !g.enabled) {
        Some(g) => {
            g.enabled = true;
            true
        }
        None => false,
    }
}

/// The composite mutation applied to offspring: at most one structural
/// mutation, otherwise the parametric ones at their configured rates.
/// Returns whether a structural mutation happened.
pub fn mutate(
    genome: &mut Genome,
    tracker: &mut InnovationTracker,
    opts: &Options,
    rng: &mut impl Rng,
) -> Result<bool> {
    if rng.random::<f64>() < opts.mutate_add_node_prob && mutate_add_node(genome, tracker, rng) {
        return Ok(true);
    }
    if rng.random::<f64>() < opts.mutate_add_link_prob
        && mutate_add_link(genome, tracker, opts, rng)?
    {
        return Ok(true);
    }
    if rng.random::<f64>() < opts.mutate_connect_sensors_prob
        && mutate_connect_sensors(genome, tracker, rng)
    {
        return Ok(true);
    }

    if rng.random::<f64>() < opts.mutate_link_weights_prob {
        mutate_link_weights(
            genome,
            opts.weight_mut_power,
            1.,
            false,
            opts.weight_bound,
            rng,
        );
    }
    if rng.random::<f64>() < opts.mutate_random_trait_prob {
        mutate_random_trait(genome, opts, rng);
    }
    if rng.random::<f64>() < opts.mutate_link_trait_prob {
        mutate_link_trait(genome, rng);
    }
    if rng.random::<f64>() < opts.mutate_node_trait_prob {
        mutate_node_trait(genome, rng);
    }
    if rng.random::<f64>() < opts.mutate_toggle_enable_prob {
        mutate_toggle_enable(genome, rng);
    }
    if rng.random::<f64>() < opts.mutate_gene_reenable_prob {
        mutate_gene_reenable(genome);
    }
    Ok(false)
}
