use rand::Rng;
use serde::{Deserialize, Serialize};

pub const TRAIT_PARAMS: usize = 8;

/// A named group of eight real-valued parameters that genes and nodes may
/// reference. Traits let several genes share tunable behavior and are mixed
/// parametrically during crossover.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraitGene {
    pub id: usize,
    pub params: [f64; TRAIT_PARAMS],
}

impl TraitGene {
    pub fn new(id: usize, params: [f64; TRAIT_PARAMS]) -> Self {
        Self { id, params }
    }

    /// Parametric crossover: the offspring trait averages its parents.
    pub fn averaged(id: usize, l: &TraitGene, r: &TraitGene) -> Self {
        let mut params = [0.; TRAIT_PARAMS];
        for (i, p) in params.iter_mut().enumerate() {
            *p = (l.params[i] + r.params[i]) / 2.;
        }
        Self { id, params }
    }

    /// Perturb each parameter with probability `rate` by a uniform draw
    /// scaled to `power`.
    pub fn perturb(&mut self, power: f64, rate: f64, rng: &mut impl Rng) {
        for p in self.params.iter_mut() {
            if rng.random::<f64>() < rate {
                *p += rng.random_range(-1.0..1.0) * power;
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::assert_f64_approx;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn test_averaged() {
        let l = TraitGene::new(1, [0., 1., 2., 3., 4., 5., 6., 7.]);
        let r = TraitGene::new(2, [8., 7., 6., 5., 4., 3., 2., 1.]);
        let avg = TraitGene::averaged(3, &l, &r);
        assert_eq!(avg.id, 3);
        assert_f64_approx!(avg.params[0], 4.);
        assert_f64_approx!(avg.params[7], 4.);
    }

    #[test]
    fn test_perturb_bounded() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut t = TraitGene::new(1, [0.; TRAIT_PARAMS]);
        t.perturb(0.5, 1.0, &mut rng);
        for p in t.params {
            assert!(p.abs() <= 0.5);
        }
    }

    #[test]
    fn test_perturb_zero_rate_is_identity() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut t = TraitGene::new(1, [1.; TRAIT_PARAMS]);
        t.perturb(10., 0.0, &mut rng);
        assert_eq!(t.params, [1.; TRAIT_PARAMS]);
    }
}
