//! The historical-innovation registry.
//!
//! Every structural mutation consults the registry before minting ids: if a
//! structurally identical mutation already happened this generation, the
//! same innovation id(s) and node id come back, which is what keeps the
//! compatibility measure well-defined across the population. The registry
//! belongs to one population of one trial and is passed explicitly into
//! every mutation call; nothing here is process-global.

use fxhash::FxHashMap;

/// Record of a link first formed this generation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkInnovation {
    pub innovation: usize,
    /// the weight drawn when the innovation first occurred; reused so that
    /// identical mutations stay structurally identical
    pub weight: f64,
}

/// Record of a node first introduced by splitting a gene this generation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeInnovation {
    pub node_id: usize,
    /// innovation of the (split source -> new node) gene
    pub in_innovation: usize,
    /// innovation of the (new node -> split target) gene
    pub out_innovation: usize,
}

pub struct InnovationTracker {
    next_innovation: usize,
    next_node_id: usize,
    link_novel: FxHashMap<(usize, usize, bool), LinkInnovation>,
    node_novel: FxHashMap<usize, NodeInnovation>,
}

impl InnovationTracker {
    pub fn new(next_node_id: usize, next_innovation: usize) -> Self {
        Self {
            next_innovation,
            next_node_id,
            link_novel: FxHashMap::default(),
            node_novel: FxHashMap::default(),
        }
    }

    pub fn next_innovation(&self) -> usize {
        self.next_innovation
    }

    pub fn next_node_id(&self) -> usize {
        self.next_node_id
    }

    /// Innovation for a new link along `(from, to)`. `fresh_weight` is only
    /// consumed when the path is genuinely novel this generation; otherwise
    /// the original draw is returned.
    pub fn link_innovation(
        &mut self,
        from: usize,
        to: usize,
        recurrent: bool,
        fresh_weight: f64,
    ) -> LinkInnovation {
        match self.link_novel.get(&(from, to, recurrent)) {
            Some(found) => *found,
            None => {
                let novel = LinkInnovation {
                    innovation: self.next_innovation,
                    weight: fresh_weight,
                };
                self.next_innovation += 1;
                self.link_novel.insert((from, to, recurrent), novel);
                novel
            }
        }
    }

    /// Node id plus the two link innovations for splitting the gene whose
    /// innovation is `split_innovation`.
    pub fn node_innovation(&mut self, split_innovation: usize) -> NodeInnovation {
        match self.node_novel.get(&split_innovation) {
            Some(found) => *found,
            None => {
                let novel = NodeInnovation {
                    node_id: self.next_node_id,
                    in_innovation: self.next_innovation,
                    out_innovation: self.next_innovation + 1,
                };
                self.next_node_id += 1;
                self.next_innovation += 2;
                self.node_novel.insert(split_innovation, novel);
                novel
            }
        }
    }

    /// Drop the novel-innovation lists at the generation boundary. Counters
    /// keep running for the life of the trial.
    pub fn flush(&mut self) {
        self.link_novel.clear();
        self.node_novel.clear();
    }
}
