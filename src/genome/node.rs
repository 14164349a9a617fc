use crate::activation::Activation;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeRole {
    Sensor,
    Bias,
    Hidden,
    Output,
}

impl NodeRole {
    pub fn token(&self) -> &'static str {
        match self {
            Self::Sensor => "sensor",
            Self::Bias => "bias",
            Self::Hidden => "hidden",
            Self::Output => "output",
        }
    }

    pub fn from_token(token: &str) -> Result<Self> {
        match token {
            "sensor" => Ok(Self::Sensor),
            "bias" => Ok(Self::Bias),
            "hidden" => Ok(Self::Hidden),
            "output" => Ok(Self::Output),
            other => Err(Error::InvalidInput(format!("unknown node role: {other}"))),
        }
    }

    /// Sensors and bias nodes may not have incoming links.
    pub fn is_input(&self) -> bool {
        matches!(self, Self::Sensor | Self::Bias)
    }
}

/// Structural placement hint, retained from the genome file so dumps keep
/// the author's layering even when roles would imply it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodePlacement {
    Input,
    Hidden,
    Output,
}

impl NodePlacement {
    pub fn token(&self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Hidden => "hidden",
            Self::Output => "output",
        }
    }

    pub fn from_token(token: &str) -> Result<Self> {
        match token {
            "input" => Ok(Self::Input),
            "hidden" => Ok(Self::Hidden),
            "output" => Ok(Self::Output),
            other => Err(Error::InvalidInput(format!(
                "unknown node placement: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeGene {
    pub id: usize,
    pub role: NodeRole,
    pub activation: Activation,
    pub trait_id: Option<usize>,
    pub placement: NodePlacement,
}

impl NodeGene {
    pub fn new(id: usize, role: NodeRole, activation: Activation) -> Self {
        let placement = match role {
            NodeRole::Sensor | NodeRole::Bias => NodePlacement::Input,
            NodeRole::Hidden => NodePlacement::Hidden,
            NodeRole::Output => NodePlacement::Output,
        };
        Self {
            id,
            role,
            activation,
            trait_id: None,
            placement,
        }
    }

    pub fn with_trait(mut self, trait_id: Option<usize>) -> Self {
        self.trait_id = trait_id;
        self
    }

    /// Whether this node composes its fan-in with a module activation.
    pub fn is_control(&self) -> bool {
        self.activation.is_module()
    }
}
