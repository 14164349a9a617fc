//! The options loader: a plain-text `key=value` file with a fixed key set.
//!
//! Unknown keys are warnings, not errors; missing keys fall back to the
//! defaults below, which are tuned for the XOR task. `key value` (space
//! separated) is accepted too, since hand-edited option files tend to drift
//! that way.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Options {
    pub pop_size: usize,
    pub num_runs: usize,
    pub num_generations: usize,
    pub seed: u64,

    // speciation
    pub compat_threshold: f64,
    pub disjoint_coeff: f64,
    pub excess_coeff: f64,
    pub mutdiff_coeff: f64,
    pub age_significance: f64,
    pub dropoff_age: usize,
    pub survival_thresh: f64,

    // mating
    pub mutate_only_prob: f64,
    pub mate_only_prob: f64,
    pub mate_multipoint_prob: f64,
    pub mate_multipoint_avg_prob: f64,
    pub mate_singlepoint_prob: f64,
    pub interspecies_mate_rate: f64,
    /// chance a gene disabled in either parent stays disabled in the child
    pub mate_keep_disabled_prob: f64,

    // mutation
    pub mutate_link_weights_prob: f64,
    pub mutate_add_node_prob: f64,
    pub mutate_add_link_prob: f64,
    pub mutate_connect_sensors_prob: f64,
    pub mutate_random_trait_prob: f64,
    pub mutate_link_trait_prob: f64,
    pub mutate_node_trait_prob: f64,
    pub mutate_toggle_enable_prob: f64,
    pub mutate_gene_reenable_prob: f64,
    pub weight_mut_power: f64,
    pub weight_bound: f64,
    pub trait_mut_power: f64,
    pub trait_param_mut_prob: f64,

    // structure search
    pub recur_only_prob: f64,
    pub allow_self_loops: bool,
    pub newlink_tries: usize,

    // orchestration
    pub print_every: usize,
    pub log_level: String,
    pub parallel: bool,
    pub max_workers: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            pop_size: 150,
            num_runs: 1,
            num_generations: 100,
            seed: 42,
            compat_threshold: 3.0,
            disjoint_coeff: 1.0,
            excess_coeff: 1.0,
            mutdiff_coeff: 0.4,
            age_significance: 1.0,
            dropoff_age: 15,
            survival_thresh: 0.2,
            mutate_only_prob: 0.25,
            mate_only_prob: 0.2,
            mate_multipoint_prob: 0.6,
            mate_multipoint_avg_prob: 0.4,
            mate_singlepoint_prob: 0.0,
            interspecies_mate_rate: 0.001,
            mate_keep_disabled_prob: 0.75,
            mutate_link_weights_prob: 0.9,
            mutate_add_node_prob: 0.003,
            mutate_add_link_prob: 0.005,
            mutate_connect_sensors_prob: 0.0,
            mutate_random_trait_prob: 0.1,
            mutate_link_trait_prob: 0.1,
            mutate_node_trait_prob: 0.1,
            mutate_toggle_enable_prob: 0.0,
            mutate_gene_reenable_prob: 0.05,
            weight_mut_power: 2.5,
            weight_bound: 8.0,
            trait_mut_power: 1.0,
            trait_param_mut_prob: 0.5,
            recur_only_prob: 0.0,
            allow_self_loops: false,
            newlink_tries: 20,
            print_every: 10,
            log_level: "info".to_string(),
            parallel: false,
            max_workers: 0,
        }
    }
}

macro_rules! set_keys {
    ($opts:ident, $key:ident, $value:ident; [$($field:ident),+ $(,)?]) => {
        $(if $key == stringify!($field) {
            $opts.$field = $value.parse().map_err(|_| {
                Error::InvalidInput(format!(
                    "bad value for {}: {}", stringify!($field), $value
                ))
            })?;
        } else)+ {
            warn!(key = $key, "ignoring unknown options key");
        }
    };
}

impl Options {
    pub fn parse(text: &str) -> Result<Self> {
        let mut opts = Self::default();
        for raw in text.lines() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, value) = match line.split_once('=') {
                Some((k, v)) => (k.trim(), v.trim()),
                None => match line.split_once(char::is_whitespace) {
                    Some((k, v)) => (k.trim(), v.trim()),
                    None => {
                        return Err(Error::InvalidInput(format!(
                            "options line has no value: {line}"
                        )))
                    }
                },
            };
            set_keys!(opts, key, value; [
                pop_size, num_runs, num_generations, seed,
                compat_threshold, disjoint_coeff, excess_coeff, mutdiff_coeff,
                age_significance, dropoff_age, survival_thresh,
                mutate_only_prob, mate_only_prob, mate_multipoint_prob,
                mate_multipoint_avg_prob, mate_singlepoint_prob,
                interspecies_mate_rate, mate_keep_disabled_prob,
                mutate_link_weights_prob, mutate_add_node_prob,
                mutate_add_link_prob, mutate_connect_sensors_prob,
                mutate_random_trait_prob, mutate_link_trait_prob,
                mutate_node_trait_prob, mutate_toggle_enable_prob,
                mutate_gene_reenable_prob, weight_mut_power, weight_bound,
                trait_mut_power, trait_param_mut_prob,
                recur_only_prob, allow_self_loops, newlink_tries,
                print_every, log_level, parallel, max_workers,
            ]);
        }
        opts.validate()?;
        Ok(opts)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::parse(&fs::read_to_string(path)?)
    }

    fn validate(&self) -> Result<()> {
        if self.pop_size == 0 {
            return Err(Error::InvalidInput("pop_size must be positive".into()));
        }
        for (name, p) in [
            ("survival_thresh", self.survival_thresh),
            ("mutate_only_prob", self.mutate_only_prob),
            ("mate_only_prob", self.mate_only_prob),
            ("interspecies_mate_rate", self.interspecies_mate_rate),
            ("mutate_link_weights_prob", self.mutate_link_weights_prob),
            ("mutate_add_node_prob", self.mutate_add_node_prob),
            ("mutate_add_link_prob", self.mutate_add_link_prob),
            ("recur_only_prob", self.recur_only_prob),
        ] {
            if !(0. ..=1.).contains(&p) {
                return Err(Error::InvalidInput(format!(
                    "{name} must lie in [0, 1], got {p}"
                )));
            }
        }
        Ok(())
    }

    /// Worker count for the parallel evaluation pool.
    pub fn workers(&self) -> usize {
        if self.max_workers == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        } else {
            self.max_workers
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::assert_f64_approx;

    #[test]
    fn test_defaults_validate() {
        Options::default().validate().unwrap();
    }

    #[test]
    fn test_parse_both_separators() {
        let opts = Options::parse(
            "# tuned for a quick smoke run\n\
             pop_size = 40\n\
             compat_threshold 4.5\n\
             parallel=true\n\
             log_level debug\n",
        )
        .unwrap();
        assert_eq!(opts.pop_size, 40);
        assert_f64_approx!(opts.compat_threshold, 4.5);
        assert!(opts.parallel);
        assert_eq!(opts.log_level, "debug");
        // untouched keys keep defaults
        assert_eq!(opts.num_generations, 100);
    }

    #[test]
    fn test_unknown_key_is_not_an_error() {
        let opts = Options::parse("no_such_knob = 12\npop_size = 10\n").unwrap();
        assert_eq!(opts.pop_size, 10);
    }

    #[test]
    fn test_malformed_value_is_an_error() {
        assert!(Options::parse("pop_size = many\n").is_err());
        assert!(Options::parse("pop_size\n").is_err());
    }

    #[test]
    fn test_out_of_range_probability() {
        assert!(Options::parse("mutate_only_prob = 1.5\n").is_err());
        assert!(Options::parse("pop_size = 0\n").is_err());
    }
}
