use serde::{Deserialize, Serialize};

/// A connection gene. The structural identity `(from, to, recurrent)` and
/// the innovation id are fixed at creation; only the weight, trait binding
/// and enabled flag may change afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gene {
    pub innovation: usize,
    pub from: usize,
    pub to: usize,
    pub weight: f64,
    /// accumulated weight drift, kept alongside the weight in dumps
    pub mutation_num: f64,
    pub enabled: bool,
    pub recurrent: bool,
    pub trait_id: Option<usize>,
}

impl Gene {
    pub fn new(innovation: usize, from: usize, to: usize, weight: f64, recurrent: bool) -> Self {
        Self {
            innovation,
            from,
            to,
            weight,
            mutation_num: weight,
            enabled: true,
            recurrent,
            trait_id: None,
        }
    }

    pub fn with_trait(mut self, trait_id: Option<usize>) -> Self {
        self.trait_id = trait_id;
        self
    }

    pub fn path(&self) -> (usize, usize) {
        (self.from, self.to)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_new_gene_mirrors_weight() {
        let g = Gene::new(3, 0, 4, -1.25, false);
        assert_eq!(g.mutation_num, -1.25);
        assert!(g.enabled);
        assert_eq!(g.path(), (0, 4));
    }
}
