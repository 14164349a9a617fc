//! The closed catalog of activation functions a node may carry.
//!
//! Scalar activations squash a node's accumulated input sum; module
//! activations compose the whole fan-in of a control node into a single
//! signal. Every variant has a stable text identifier used by the genome
//! file format, so evolved genomes stay readable across versions.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Activation {
    SigmoidPlain,
    SigmoidSteepened,
    SigmoidBipolar,
    Tanh,
    Gauss,
    Sine,
    Linear,
    Step,
    Relu,
    // module activations, legal only on control nodes
    MultiplyModule,
    MaxModule,
    MinModule,
}

impl Activation {
    /// Stable identifier, also the token used in genome dumps.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SigmoidPlain => "sigmoid",
            Self::SigmoidSteepened => "sigmoid_steep",
            Self::SigmoidBipolar => "sigmoid_bipolar",
            Self::Tanh => "tanh",
            Self::Gauss => "gauss",
            Self::Sine => "sine",
            Self::Linear => "linear",
            Self::Step => "step",
            Self::Relu => "relu",
            Self::MultiplyModule => "multiply_module",
            Self::MaxModule => "max_module",
            Self::MinModule => "min_module",
        }
    }

    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "sigmoid" => Ok(Self::SigmoidPlain),
            "sigmoid_steep" => Ok(Self::SigmoidSteepened),
            "sigmoid_bipolar" => Ok(Self::SigmoidBipolar),
            "tanh" => Ok(Self::Tanh),
            "gauss" => Ok(Self::Gauss),
            "sine" => Ok(Self::Sine),
            "linear" => Ok(Self::Linear),
            "step" => Ok(Self::Step),
            "relu" => Ok(Self::Relu),
            "multiply_module" => Ok(Self::MultiplyModule),
            "max_module" => Ok(Self::MaxModule),
            "min_module" => Ok(Self::MinModule),
            other => Err(Error::InvalidInput(format!(
                "unknown activation identifier: {other}"
            ))),
        }
    }

    /// Whether this is a module activation, which consumes the whole fan-in
    /// of a control node rather than a scalar sum.
    pub fn is_module(&self) -> bool {
        matches!(
            self,
            Self::MultiplyModule | Self::MaxModule | Self::MinModule
        )
    }

    pub fn apply(&self, x: f64) -> f64 {
        match self {
            Self::SigmoidPlain => 1. / (1. + (-x).exp()),
            Self::SigmoidSteepened => 1. / (1. + (-4.924273 * x).exp()),
            Self::SigmoidBipolar => 2. / (1. + (-4.5 * x).exp()) - 1.,
            Self::Tanh => x.tanh(),
            Self::Gauss => (-x * x).exp(),
            Self::Sine => x.sin(),
            Self::Linear => x,
            Self::Step => {
                if x > 0. {
                    1.
                } else {
                    0.
                }
            }
            Self::Relu => {
                if x < 0. {
                    0.
                } else {
                    x
                }
            }
            module => unreachable!("module activation {} applied to a scalar", module.name()),
        }
    }

    /// Compose a control node's weighted inputs into one signal.
    pub fn apply_module(&self, inputs: &[f64]) -> f64 {
        match self {
            Self::MultiplyModule => inputs.iter().product(),
            Self::MaxModule => inputs.iter().fold(f64::MIN, |acc, v| acc.max(*v)),
            Self::MinModule => inputs.iter().fold(f64::MAX, |acc, v| acc.min(*v)),
            scalar => unreachable!("scalar activation {} applied to a fan-in", scalar.name()),
        }
    }
}

impl Default for Activation {
    fn default() -> Self {
        Self::SigmoidSteepened
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::assert_f64_approx;

    #[test]
    fn test_name_round_trip() {
        for act in [
            Activation::SigmoidPlain,
            Activation::SigmoidSteepened,
            Activation::SigmoidBipolar,
            Activation::Tanh,
            Activation::Gauss,
            Activation::Sine,
            Activation::Linear,
            Activation::Step,
            Activation::Relu,
            Activation::MultiplyModule,
            Activation::MaxModule,
            Activation::MinModule,
        ] {
            assert_eq!(act, Activation::from_name(act.name()).unwrap());
        }
    }

    #[test]
    fn test_unknown_name() {
        assert!(Activation::from_name("softmax").is_err());
    }

    #[test]
    fn test_scalar_shapes() {
        assert_f64_approx!(Activation::SigmoidPlain.apply(0.), 0.5);
        assert_f64_approx!(Activation::SigmoidSteepened.apply(0.), 0.5);
        assert!(Activation::SigmoidSteepened.apply(1.) > 0.99);
        assert_f64_approx!(Activation::SigmoidBipolar.apply(0.), 0.);
        assert_f64_approx!(Activation::Tanh.apply(0.), 0.);
        assert_f64_approx!(Activation::Gauss.apply(0.), 1.);
        assert_f64_approx!(Activation::Linear.apply(-3.25), -3.25);
        assert_f64_approx!(Activation::Step.apply(-0.1), 0.);
        assert_f64_approx!(Activation::Step.apply(0.1), 1.);
        assert_f64_approx!(Activation::Relu.apply(-2.), 0.);
        assert_f64_approx!(Activation::Relu.apply(2.), 2.);
    }

    #[test]
    fn test_module_shapes() {
        assert_f64_approx!(Activation::MultiplyModule.apply_module(&[2., 3., 0.5]), 3.);
        assert_f64_approx!(Activation::MaxModule.apply_module(&[-1., 4., 2.]), 4.);
        assert_f64_approx!(Activation::MinModule.apply_module(&[-1., 4., 2.]), -1.);
    }

    #[test]
    fn test_module_marker() {
        assert!(Activation::MultiplyModule.is_module());
        assert!(!Activation::Tanh.is_module());
    }
}
