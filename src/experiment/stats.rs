//! Per-generation, per-trial and per-experiment statistics, plus the dump
//! formats the orchestrator writes: population snapshots grouped by
//! species, winner artifacts, a binary trial history, and a multi-array
//! JSON archive.

use crate::error::Result;
use crate::genome::{io, Genome};
use crate::population::Population;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct FloatStats {
    pub max: f64,
    pub mean: f64,
    pub min: f64,
}

impl FloatStats {
    pub fn over(values: impl Iterator<Item = f64>) -> Self {
        let mut max = f64::MIN;
        let mut min = f64::MAX;
        let mut sum = 0.;
        let mut count = 0usize;
        for v in values {
            max = max.max(v);
            min = min.min(v);
            sum += v;
            count += 1;
        }
        if count == 0 {
            Self::default()
        } else {
            Self {
                max,
                min,
                mean: sum / count as f64,
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Generation {
    pub id: usize,
    pub trial_id: usize,
    pub solved: bool,
    pub best_fitness: f64,
    pub fitness: FloatStats,
    pub complexity: FloatStats,
    /// number of species alive this generation
    pub diversity: usize,
    pub champion: Option<Genome>,
    pub duration_ms: u64,
}

impl Generation {
    pub fn new(id: usize, trial_id: usize) -> Self {
        Self {
            id,
            trial_id,
            solved: false,
            best_fitness: 0.,
            fitness: FloatStats::default(),
            complexity: FloatStats::default(),
            diversity: 0,
            champion: None,
            duration_ms: 0,
        }
    }

    /// Snapshot the fully-evaluated population into this record.
    pub fn fill_from(&mut self, pop: &Population) {
        self.fitness = FloatStats::over(pop.organisms.iter().map(|o| o.fitness));
        self.complexity =
            FloatStats::over(pop.organisms.iter().map(|o| o.genome.complexity() as f64));
        self.diversity = pop.species.len();
        if let Some(best) = pop.best_organism() {
            self.best_fitness = best.fitness;
            self.champion = Some(best.genome.clone());
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Trial {
    pub id: usize,
    pub generations: Vec<Generation>,
    pub solved: bool,
    pub winner: Option<Genome>,
}

impl Trial {
    pub fn new(id: usize) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    pub fn best_fitness(&self) -> f64 {
        self.generations
            .iter()
            .fold(f64::MIN, |acc, g| acc.max(g.best_fitness))
    }

    /// Generation index that solved the task, if any.
    pub fn solved_at(&self) -> Option<usize> {
        self.generations.iter().find(|g| g.solved).map(|g| g.id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Experiment {
    pub name: String,
    pub trials: Vec<Trial>,
}

impl Experiment {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            trials: vec![],
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.trials.is_empty() {
            return 0.;
        }
        self.trials.iter().filter(|t| t.solved).count() as f64 / self.trials.len() as f64
    }

    pub fn avg_generations_to_solve(&self) -> Option<f64> {
        let solved = self
            .trials
            .iter()
            .filter_map(|t| t.solved_at())
            .collect::<Vec<_>>();
        if solved.is_empty() {
            None
        } else {
            Some(solved.iter().map(|&g| g as f64 + 1.).sum::<f64>() / solved.len() as f64)
        }
    }

    /// Mean winner complexity over solved trials: (nodes, genes).
    pub fn avg_winner_complexity(&self) -> Option<(f64, f64)> {
        let winners = self
            .trials
            .iter()
            .filter_map(|t| t.winner.as_ref())
            .collect::<Vec<_>>();
        if winners.is_empty() {
            return None;
        }
        let n = winners.len() as f64;
        Some((
            winners.iter().map(|g| g.nodes.len() as f64).sum::<f64>() / n,
            winners.iter().map(|g| g.genes.len() as f64).sum::<f64>() / n,
        ))
    }

    /// Binary trial-history dump.
    pub fn write_binary<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let bytes = bincode::serde::encode_to_vec(self, bincode::config::standard())?;
        fs::write(path, bytes)?;
        Ok(())
    }

    pub fn read_binary<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = fs::read(path)?;
        let (experiment, _): (Self, usize) =
            bincode::serde::decode_from_slice(&bytes, bincode::config::standard())?;
        Ok(experiment)
    }

    /// Multi-array archive: one array per statistic, one entry per
    /// generation, grouped by trial.
    pub fn write_arrays<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let per_trial = |f: &dyn Fn(&Generation) -> f64| {
            self.trials
                .iter()
                .map(|t| t.generations.iter().map(|g| f(g)).collect::<Vec<_>>())
                .collect::<Vec<_>>()
        };
        let archive = json!({
            "name": self.name,
            "best_fitness": per_trial(&|g| g.best_fitness),
            "mean_fitness": per_trial(&|g| g.fitness.mean),
            "mean_complexity": per_trial(&|g| g.complexity.mean),
            "diversity": per_trial(&|g| g.diversity as f64),
            "solved": self.trials.iter().map(|t| t.solved).collect::<Vec<_>>(),
        });
        fs::write(path, serde_json::to_string_pretty(&archive)?)?;
        Ok(())
    }
}

/// Plain-text population snapshot grouped by species.
pub fn dump_population<P: AsRef<Path>>(pop: &Population, path: P) -> Result<()> {
    let mut out = String::new();
    for sp in pop.species.iter() {
        let _ = writeln!(
            out,
            "# species {} age {} expected_offspring {} members {}",
            sp.id,
            sp.age,
            sp.expected_offspring,
            sp.members.len()
        );
        for &i in sp.members.iter() {
            let org = &pop.organisms[i];
            let _ = writeln!(
                out,
                "# organism fitness {} winner {} provenance \"{}\"",
                org.fitness, org.winner, org.provenance
            );
            out.push_str(&io::format_genome(&org.genome));
        }
    }
    fs::write(path, out)?;
    Ok(())
}

/// Winner artifacts: the genome in plain text and as a Cytoscape graph.
pub fn dump_winner<P: AsRef<Path>>(genome: &Genome, dir: P) -> Result<()> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)?;
    io::write_genome_file(genome, dir.join("winner_genome.txt"))?;
    fs::write(
        dir.join("winner_cytoscape.json"),
        serde_json::to_string_pretty(&io::to_cytoscape(genome))?,
    )?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::assert_f64_approx;

    #[test]
    fn test_float_stats() {
        let s = FloatStats::over([1., 5., 3.].into_iter());
        assert_f64_approx!(s.max, 5.);
        assert_f64_approx!(s.min, 1.);
        assert_f64_approx!(s.mean, 3.);

        let empty = FloatStats::over([].into_iter());
        assert_f64_approx!(empty.mean, 0.);
    }

    #[test]
    fn test_experiment_aggregates() {
        let mut experiment = Experiment::new("t");
        let mut solved = Trial::new(0);
        let mut g = Generation::new(4, 0);
        g.solved = true;
        g.best_fitness = 16.;
        solved.generations.push(g);
        solved.solved = true;
        solved.winner = Some(Genome::fully_connected(1, 2, 1));
        experiment.trials.push(solved);
        experiment.trials.push(Trial::new(1));

        assert_f64_approx!(experiment.success_rate(), 0.5);
        assert_f64_approx!(experiment.avg_generations_to_solve().unwrap(), 5.);
        let (nodes, genes) = experiment.avg_winner_complexity().unwrap();
        assert_f64_approx!(nodes, 4.);
        assert_f64_approx!(genes, 3.);
    }

    #[test]
    fn test_binary_round_trip() {
        let dir = std::env::temp_dir().join("neatron-stats-test");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("experiment.bin");

        let mut experiment = Experiment::new("round-trip");
        let mut trial = Trial::new(0);
        let mut g = Generation::new(0, 0);
        g.fill_from(
            &crate::population::Population::spawn(
                &Genome::fully_connected(1, 2, 1),
                &crate::options::Options {
                    pop_size: 5,
                    ..Default::default()
                },
                &mut <rand::rngs::StdRng as rand::SeedableRng>::seed_from_u64(1),
            )
            .unwrap(),
        );
        trial.generations.push(g);
        experiment.trials.push(trial);

        experiment.write_binary(&path).unwrap();
        let back = Experiment::read_binary(&path).unwrap();
        assert_eq!(back.name, "round-trip");
        assert_eq!(back.trials[0].generations.len(), 1);
    }
}
