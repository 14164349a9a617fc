pub mod activation;
pub mod crossover;
pub mod domain;
pub mod error;
pub mod experiment;
pub mod genome;
pub mod innovation;
pub mod macros;
pub mod mutation;
pub mod network;
pub mod options;
pub mod organism;
pub mod population;
pub mod specie;

pub use activation::Activation;
pub use error::{Error, Result};
pub use experiment::{
    run_experiment, CancelToken, Experiment, Generation, GenerationEvaluator, OrganismEvaluator,
    Trial,
};
pub use genome::Genome;
pub use innovation::InnovationTracker;
pub use network::{FastSolver, Network};
pub use options::Options;
pub use organism::Organism;
pub use population::Population;
pub use specie::Species;
