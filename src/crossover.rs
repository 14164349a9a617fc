//! Compatibility measurement and crossover reproduction.
//!
//! Both walk the parents' gene lists jointly in innovation-id order. A
//! position is *matching* when the same innovation appears in both lists,
//! *disjoint* when it appears in one and lies inside the other's innovation
//! range, and *excess* when it lies beyond the other's maximum innovation.

use crate::error::Result;
use crate::genome::{Gene, Genome, NodeGene, NodeRole, TraitGene};
use crate::options::Options;
use core::cmp::Ordering;
use rand::Rng;
use std::collections::BTreeMap;

/// Count misaligned genes between two innovation-sorted slices.
fn disjoint_excess_count(l: &[Gene], r: &[Gene]) -> (f64, f64) {
    let mut l_iter = l.iter();
    let mut r_iter = r.iter();

    let mut l_gene = match l_iter.next() {
        Some(g) => g,
        None => return (0., r_iter.count() as f64),
    };

    let mut r_gene = match r_iter.next() {
        Some(g) => g,
        None => return (0., l_iter.count() as f64 + 1.),
    };

    let mut disjoint = 0.;
    let excess_passed = loop {
        match l_gene.innovation.cmp(&r_gene.innovation) {
            Ordering::Equal => {
                l_gene = match l_iter.next() {
                    Some(g) => g,
                    None => break 0.,
                };
                r_gene = match r_iter.next() {
                    Some(g) => g,
                    None => break 1.,
                };
            }
            Ordering::Greater => {
                disjoint += 1.;
                r_gene = match r_iter.next() {
                    Some(g) => g,
                    None => break 1.,
                }
            }
            Ordering::Less => {
                disjoint += 1.;
                l_gene = match l_iter.next() {
                    Some(g) => g,
                    None => break 1.,
                }
            }
        }
    };

    (
        disjoint,
        l_iter.count() as f64 + r_iter.count() as f64 + excess_passed,
    )
}

/// Mean absolute weight difference over matching genes.
fn avg_weight_diff(l: &[Gene], r: &[Gene]) -> f64 {
    let mut diff = 0.;
    let mut count = 0.;
    let mut l_iter = l.iter().peekable();
    let mut r_iter = r.iter().peekable();

    while let (Some(l_gene), Some(r_gene)) = (l_iter.peek(), r_iter.peek()) {
        match l_gene.innovation.cmp(&r_gene.innovation) {
            Ordering::Equal => {
                diff += (l_gene.weight - r_gene.weight).abs();
                count += 1.;
                l_iter.next();
                r_iter.next();
            }
            Ordering::Greater => {
                r_iter.next();
            }
            Ordering::Less => {
                l_iter.next();
            }
        }
    }

    if count == 0. {
        0.
    } else {
        diff / count
    }
}

/// Compatibility distance between two genomes:
/// `excess_coeff * E + disjoint_coeff * D + mutdiff_coeff * avg_weight_diff`.
/// Symmetric, and zero between a genome and itself.
pub fn compatibility(l: &Genome, r: &Genome, opts: &Options) -> f64 {
    let (disjoint, excess) = disjoint_excess_count(&l.genes, &r.genes);
    opts.excess_coeff * excess
        + opts.disjoint_coeff * disjoint
        + opts.mutdiff_coeff * avg_weight_diff(&l.genes, &r.genes)
}

/// A chosen gene conflicts when the child already carries the same path.
fn conflicts(picked: &[Gene], gene: &Gene) -> bool {
    picked
        .iter()
        .any(|g| g.from == gene.from && g.to == gene.to && g.recurrent == gene.recurrent)
}

fn inherit_enabled(child: &mut Gene, l: &Gene, r: Option<&Gene>, opts: &Options, rng: &mut impl Rng) {
    if !l.enabled || r.is_some_and(|g| !g.enabled) {
        child.enabled = rng.random::<f64>() >= opts.mate_keep_disabled_prob;
    }
}

/// Traits are inherited by index, parametrically averaged where both
/// parents carry one.
fn mate_traits(mom: &Genome, dad: &Genome) -> Vec<TraitGene> {
    let longest = mom.traits.len().max(dad.traits.len());
    (0..longest)
        .map(
            |i| match (mom.traits.get(i), dad.traits.get(i)) {
                (Some(l), Some(r)) => TraitGene::averaged(l.id, l, r),
                (Some(l), None) => l.clone(),
                (None, Some(r)) => r.clone(),
                (None, None) => unreachable!(),
            },
        )
        .collect()
}

/// Assemble a verified child from chosen genes: IO nodes always carry over,
/// hidden nodes come along with the genes that reference them.
fn assemble(
    child_id: usize,
    mom: &Genome,
    dad: &Genome,
    genes: Vec<Gene>,
) -> Result<Genome> {
    let mut nodes: BTreeMap<usize, NodeGene> = BTreeMap::new();
    for n in mom.nodes.iter().chain(dad.nodes.iter()) {
        if n.role != NodeRole::Hidden {
            nodes.entry(n.id).or_insert_with(|| n.clone());
        }
    }
    for gene in genes.iter() {
        for end in [gene.from, gene.to] {
            if !nodes.contains_key(&end) {
                let node = mom
                    .node(end)
                    .or_else(|| dad.node(end))
                    .expect("chosen gene references a node neither parent has");
                nodes.insert(end, node.clone());
            }
        }
    }

    let mut child = Genome::new(child_id);
    child.traits = mate_traits(mom, dad);
    child.nodes = nodes.into_values().collect();
    child.genes = genes;
    child.verify()?;
    Ok(child)
}

/// Multipoint crossover: matching genes picked uniformly from either
/// parent, disjoint and excess taken from the fitter one (coin-flipped on
/// equal fitness).
pub fn mate_multipoint(
    mom: &Genome,
    dad: &Genome,
    child_id: usize,
    mom_fit: Ordering,
    opts: &Options,
    rng: &mut impl Rng,
) -> Result<Genome> {
    mate_multipoint_inner(mom, dad, child_id, mom_fit, opts, rng, false)
}

/// Like multipoint, but matching genes receive the average of the parents'
/// weights.
pub fn mate_multipoint_avg(
    mom: &Genome,
    dad: &Genome,
    child_id: usize,
    mom_fit: Ordering,
    opts: &Options,
    rng: &mut impl Rng,
) -> Result<Genome> {
    mate_multipoint_inner(mom, dad, child_id, mom_fit, opts, rng, true)
}

/// Whether an unmatched (disjoint or excess) gene of the parent whose
/// fitness ordering is `fit` makes it into the child.
fn take_unmatched(fit: Ordering, rng: &mut impl Rng) -> bool {
    match fit {
        Ordering::Greater => true,
        Ordering::Equal => rng.random::<f64>() < 0.5,
        Ordering::Less => false,
    }
}

#[allow(clippy::too_many_arguments)]
fn mate_multipoint_inner(
    mom: &Genome,
    dad: &Genome,
    child_id: usize,
    mom_fit: Ordering,
    opts: &Options,
    rng: &mut impl Rng,
    average: bool,
) -> Result<Genome> {
    let mut picked: Vec<Gene> = vec![];
    let mut l_idx = 0;
    let mut r_idx = 0;
    loop {
        match (mom.genes.get(l_idx), dad.genes.get(r_idx)) {
            (None, None) => break,
            (Some(lg), None) => {
                if take_unmatched(mom_fit, rng) && !conflicts(&picked, lg) {
                    let mut child = lg.clone();
                    inherit_enabled(&mut child, lg, None, opts, rng);
                    picked.push(child);
                }
                l_idx += 1;
            }
            (None, Some(rg)) => {
                if take_unmatched(mom_fit.reverse(), rng) && !conflicts(&picked, rg) {
                    let mut child = rg.clone();
                    inherit_enabled(&mut child, rg, None, opts, rng);
                    picked.push(child);
                }
                r_idx += 1;
            }
            (Some(lg), Some(rg)) => match lg.innovation.cmp(&rg.innovation) {
                Ordering::Equal => {
                    let mut child = if average {
                        let mut avg = lg.clone();
                        avg.weight = (lg.weight + rg.weight) / 2.;
                        avg
                    } else if rng.random::<f64>() < 0.5 {
                        lg.clone()
                    } else {
                        rg.clone()
                    };
                    inherit_enabled(&mut child, lg, Some(rg), opts, rng);
                    if !conflicts(&picked, &child) {
                        picked.push(child);
                    }
                    l_idx += 1;
                    r_idx += 1;
                }
                Ordering::Less => {
                    if take_unmatched(mom_fit, rng) && !conflicts(&picked, lg) {
                        let mut child = lg.clone();
                        inherit_enabled(&mut child, lg, None, opts, rng);
                        picked.push(child);
                    }
                    l_idx += 1;
                }
                Ordering::Greater => {
                    if take_unmatched(mom_fit.reverse(), rng) && !conflicts(&picked, rg) {
                        let mut child = rg.clone();
                        inherit_enabled(&mut child, rg, None, opts, rng);
                        picked.push(child);
                    }
                    r_idx += 1;
                }
            },
        }
    }

    assemble(child_id, mom, dad, picked)
}

/// Single-point crossover. The cut index is drawn from `0..=shorter.len()`
/// counted in shorter-parent gene positions; positions strictly before the
/// cut take the shorter parent's gene, positions strictly after it the
/// longer parent's, and a matching pair at the cut averages weights. A cut
/// of `shorter.len()` reproduces the shorter parent outright.
pub fn mate_singlepoint(
    mom: &Genome,
    dad: &Genome,
    child_id: usize,
    opts: &Options,
    rng: &mut impl Rng,
) -> Result<Genome> {
    let (short, long) = if mom.genes.len() <= dad.genes.len() {
        (mom, dad)
    } else {
        (dad, mom)
    };
    let cut = rng.random_range(0..=short.genes.len());

    let mut picked: Vec<Gene> = vec![];
    let mut s_idx = 0;
    let mut l_idx = 0;
    let mut consumed = 0usize;
    loop {
        match (short.genes.get(s_idx), long.genes.get(l_idx)) {
            (None, None) => break,
            (Some(sg), None) => {
                if consumed < cut && !conflicts(&picked, sg) {
                    let mut child = sg.clone();
                    inherit_enabled(&mut child, sg, None, opts, rng);
                    picked.push(child);
                }
                s_idx += 1;
                consumed += 1;
            }
            (None, Some(lg)) => {
                if consumed > cut && !conflicts(&picked, lg) {
                    let mut child = lg.clone();
                    inherit_enabled(&mut child, lg, None, opts, rng);
                    picked.push(child);
                }
                l_idx += 1;
            }
            (Some(sg), Some(lg)) => match sg.innovation.cmp(&lg.innovation) {
                Ordering::Equal => {
                    let mut child = match consumed.cmp(&cut) {
                        Ordering::Less => sg.clone(),
                        Ordering::Equal => {
                            let mut avg = sg.clone();
                            avg.weight = (sg.weight + lg.weight) / 2.;
                            avg
                        }
                        Ordering::Greater => lg.clone(),
                    };
                    inherit_enabled(&mut child, sg, Some(lg), opts, rng);
                    if !conflicts(&picked, &child) {
                        picked.push(child);
                    }
                    s_idx += 1;
                    l_idx += 1;
                    consumed += 1;
                }
                Ordering::Less => {
                    if consumed < cut && !conflicts(&picked, sg) {
                        let mut child = sg.clone();
                        inherit_enabled(&mut child, sg, None, opts, rng);
                        picked.push(child);
                    }
                    s_idx += 1;
                    consumed += 1;
                }
                Ordering::Greater => {
                    if consumed > cut && !conflicts(&picked, lg) {
                        let mut child = lg.clone();
                        inherit_enabled(&mut child, lg, None, opts, rng);
                        picked.push(child);
                    }
                    l_idx += 1;
                }
            },
        }
    }

    assemble(child_id, mom, dad, picked)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::assert_f64_approx;
    use crate::genome::NodeGene;
    use rand::{rngs::StdRng, SeedableRng};
    use std::collections::HashSet;

    fn gene(innovation: usize, from: usize, to: usize, weight: f64) -> Gene {
        Gene::new(innovation, from, to, weight, false)
    }

    /// Two parents over the same 3-sensor/1-output frame with divergent
    /// hidden structure.
    fn parents() -> (Genome, Genome) {
        let mut mom = Genome::fully_connected(1, 3, 1);
        let mut dad = mom.duplicate(2);

        mom.nodes
            .push(NodeGene::new(6, NodeRole::Hidden, Default::default()));
        mom.insert_gene(gene(6, 1, 6, 0.5));
        mom.insert_gene(gene(7, 6, 5, -0.5));

        dad.nodes
            .push(NodeGene::new(7, NodeRole::Hidden, Default::default()));
        dad.insert_gene(gene(8, 2, 7, 1.5));
        dad.insert_gene(gene(9, 7, 5, 0.75));
        dad.genes[0].weight = 2.;

        (mom, dad)
    }

    #[test]
    fn test_disjoint_excess_count() {
        let l = vec![gene(1, 1, 5, 0.), gene(2, 2, 5, 0.), gene(6, 3, 5, 0.)];
        let r = vec![
            gene(1, 1, 5, 0.),
            gene(3, 2, 5, 0.),
            gene(4, 3, 5, 0.),
            gene(8, 3, 5, 0.),
            gene(10, 3, 5, 0.),
        ];
        assert_eq!((4.0, 2.0), disjoint_excess_count(&l, &r));
        assert_eq!(disjoint_excess_count(&l, &r), disjoint_excess_count(&r, &l));
    }

    #[test]
    fn test_disjoint_excess_count_empty() {
        let full = vec![gene(1, 1, 5, 0.), gene(2, 2, 5, 0.)];
        assert_eq!((0.0, 2.0), disjoint_excess_count(&full, &[]));
        assert_eq!((0.0, 2.0), disjoint_excess_count(&[], &full));
        assert_eq!((0.0, 0.0), disjoint_excess_count(&[], &[]));
    }

    #[test]
    fn test_avg_weight_diff() {
        let l = vec![gene(1, 1, 5, 0.5), gene(2, 2, 5, -0.5), gene(3, 3, 5, 1.)];
        let r = vec![gene(1, 1, 5, 0.), gene(2, 2, 5, -1.), gene(4, 3, 5, 2.)];
        assert_f64_approx!(avg_weight_diff(&l, &r), 0.5);
        assert_f64_approx!(avg_weight_diff(&l, &[]), 0.);
    }

    #[test]
    fn test_compatibility_symmetry_and_zero_self() {
        let (mom, dad) = parents();
        let opts = Options::default();
        assert_f64_approx!(
            compatibility(&mom, &dad, &opts),
            compatibility(&dad, &mom, &opts)
        );
        assert_f64_approx!(compatibility(&mom, &mom, &opts), 0.);
        assert!(compatibility(&mom, &dad, &opts) > 0.);
    }

    #[test]
    fn test_compatibility_uses_coefficients() {
        let (mom, dad) = parents();
        let mut opts = Options::default();
        opts.disjoint_coeff = 0.;
        opts.excess_coeff = 0.;
        opts.mutdiff_coeff = 0.;
        assert_f64_approx!(compatibility(&mom, &dad, &opts), 0.);

        opts.excess_coeff = 2.;
        // dad's genes 8 and 9 lie beyond mom's max innovation 7
        assert_f64_approx!(compatibility(&mom, &dad, &opts), 4.);
    }

    #[test]
    fn test_multipoint_fitter_mom_keeps_her_structure() {
        let (mom, dad) = parents();
        let opts = Options::default();
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..50 {
            let child =
                mate_multipoint(&mom, &dad, 100, Ordering::Greater, &opts, &mut rng).unwrap();
            child.verify().unwrap();
            let innos: HashSet<_> = child.genes.iter().map(|g| g.innovation).collect();
            let mom_innos: HashSet<_> = mom.genes.iter().map(|g| g.innovation).collect();
            assert_eq!(innos, mom_innos);
        }
    }

    #[test]
    fn test_multipoint_equal_fitness_union_bound() {
        let (mom, dad) = parents();
        let opts = Options::default();
        let mut rng = StdRng::seed_from_u64(13);
        let union: HashSet<_> = mom
            .genes
            .iter()
            .chain(dad.genes.iter())
            .map(|g| g.innovation)
            .collect();
        for _ in 0..50 {
            let child = mate_multipoint(&mom, &dad, 100, Ordering::Equal, &opts, &mut rng).unwrap();
            child.verify().unwrap();
            for g in child.genes.iter() {
                assert!(union.contains(&g.innovation));
            }
        }
    }

    #[test]
    fn test_multipoint_avg_averages_matching_weights() {
        let (mom, dad) = parents();
        let opts = Options::default();
        let mut rng = StdRng::seed_from_u64(17);
        let child =
            mate_multipoint_avg(&mom, &dad, 100, Ordering::Greater, &opts, &mut rng).unwrap();
        // innovation 1 differs between parents: mom 1.0, dad 2.0
        let g1 = child.genes.iter().find(|g| g.innovation == 1).unwrap();
        assert_f64_approx!(g1.weight, 1.5);
    }

    #[test]
    fn test_singlepoint_child_is_well_formed() {
        let (mom, dad) = parents();
        let opts = Options::default();
        let mut rng = StdRng::seed_from_u64(19);
        for _ in 0..50 {
            let child = mate_singlepoint(&mom, &dad, 100, &opts, &mut rng).unwrap();
            child.verify().unwrap();
            assert!(!child.genes.is_empty());
        }
    }

    #[test]
    fn test_singlepoint_boundary_cut() {
        // shorter parent: a single matching gene with a distinct weight, so
        // the two possible cuts produce recognizably different children
        let mom = Genome::fully_connected(1, 2, 1);
        let mut dad = mom.duplicate(2);
        dad.genes.retain(|g| g.innovation == 1);
        dad.genes[0].weight = 3.;

        let opts = Options::default();
        let mut rng = StdRng::seed_from_u64(29);
        let mut seen_short_only = false;
        let mut seen_after_cut = false;
        for _ in 0..200 {
            let child = mate_singlepoint(&mom, &dad, 100, &opts, &mut rng).unwrap();
            child.verify().unwrap();
            match child.genes.len() {
                // cut past the last position: the shorter parent verbatim
                1 => {
                    assert_f64_approx!(child.genes[0].weight, 3.);
                    seen_short_only = true;
                }
                // cut at zero: the match averages, the longer tail follows
                3 => {
                    assert_f64_approx!(child.genes[0].weight, 2.);
                    seen_after_cut = true;
                }
                n => panic!("unexpected child size {n}"),
            }
        }
        assert!(seen_short_only && seen_after_cut);
    }

    #[test]
    fn test_traits_average_by_index() {
        let (mut mom, mut dad) = parents();
        mom.traits = vec![TraitGene::new(1, [1.; 8])];
        dad.traits = vec![TraitGene::new(1, [3.; 8])];
        let opts = Options::default();
        let mut rng = StdRng::seed_from_u64(23);
        let child = mate_multipoint(&mom, &dad, 100, Ordering::Greater, &opts, &mut rng).unwrap();
        assert_eq!(child.traits.len(), 1);
        assert_f64_approx!(child.traits[0].params[0], 2.);
    }
}
