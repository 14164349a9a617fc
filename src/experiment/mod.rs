//! The experiment orchestrator: N independent trials, each up to M
//! generations of evaluate-then-epoch, with statistics and artifact dumps
//! along the way.
//!
//! The genetic algorithm itself stays single-threaded per trial; the only
//! parallel region is the per-organism fitness evaluation inside one
//! generation, which fans out over a sized thread pool. Trials honor an
//! external cancellation token checked between generations.

pub mod stats;

pub use stats::{Experiment, FloatStats, Generation, Trial};

use crate::error::{Error, Result};
use crate::genome::Genome;
use crate::options::Options;
use crate::organism::Organism;
use crate::population::Population;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::iter::{IntoParallelRefMutIterator, ParallelIterator};
use rayon::ThreadPoolBuilder;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Cooperative cancellation shared between the orchestrator and whatever
/// installs signal handlers.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Scores a single organism: writes fitness, error, and the winner flag,
/// and returns whether this organism solved the task. Implementations own
/// whatever simulator state they need per call, so evaluation can fan out
/// across workers.
pub trait OrganismEvaluator: Sync {
    fn evaluate(&self, organism: &mut Organism) -> Result<bool>;
}

/// The caller-supplied generation evaluator: scores a whole population and
/// records the outcome on the [Generation] statistics.
pub trait GenerationEvaluator {
    fn generation_evaluate(
        &self,
        opts: &Options,
        pop: &mut Population,
        generation: &mut Generation,
    ) -> Result<()>;

    fn trial_run_started(&self, _trial: usize) {}
}

/// Evaluate every organism, sequentially or on a worker pool of
/// `max_workers` threads. Organisms are independent, so results cannot
/// depend on worker count. The first error wins; remaining jobs drain
/// before it is reported. Returns whether any organism won.
pub fn evaluate_population(
    pop: &mut Population,
    evaluator: &(impl OrganismEvaluator + Sync),
    opts: &Options,
) -> Result<bool> {
    let results: Vec<Result<bool>> = if opts.parallel {
        let pool = ThreadPoolBuilder::new()
            .num_threads(opts.workers())
            .build()
            .map_err(|e| Error::InvalidInput(format!("cannot build worker pool: {e}")))?;
        pool.install(|| {
            pop.organisms
                .par_iter_mut()
                .map(|org| evaluator.evaluate(org))
                .collect()
        })
    } else {
        pop.organisms
            .iter_mut()
            .map(|org| evaluator.evaluate(org))
            .collect()
    };

    let mut solved = false;
    let mut first_err = None;
    for r in results {
        match r {
            Ok(winner) => solved |= winner,
            Err(e) => {
                if first_err.is_none() {
                    first_err = Some(e);
                }
            }
        }
    }
    match first_err {
        Some(e) => Err(e),
        None => Ok(solved),
    }
}

fn trial_dir(out_dir: &Path, trial_id: usize) -> PathBuf {
    out_dir.join(format!("trial_{trial_id}"))
}

/// Run `num_runs` independent trials of up to `num_generations` each.
/// Trial `t` seeds its RNG with `opts.seed + t`, so runs are reproducible
/// regardless of worker count. An invariant violation aborts only the
/// trial that observed it; cancellation flushes statistics and unwinds.
pub fn run_experiment<E: GenerationEvaluator>(
    name: &str,
    seed_genome: &Genome,
    opts: &Options,
    evaluator: &E,
    out_dir: Option<&Path>,
    cancel: &CancelToken,
) -> Result<Experiment> {
    let mut experiment = Experiment::new(name);

    'trials: for trial_id in 0..opts.num_runs {
        evaluator.trial_run_started(trial_id);
        let mut rng = StdRng::seed_from_u64(opts.seed + trial_id as u64);
        let mut pop = match Population::spawn(seed_genome, opts, &mut rng) {
            Ok(pop) => pop,
            Err(e) => {
                error!(trial = trial_id, %e, "could not spawn population, aborting trial");
                experiment.trials.push(Trial::new(trial_id));
                continue;
            }
        };
        let mut trial = Trial::new(trial_id);
        info!(trial = trial_id, "trial started");

        for gen_id in 0..opts.num_generations {
            if cancel.is_cancelled() {
                experiment.trials.push(trial);
                flush_experiment(&experiment, out_dir);
                info!("cancellation observed, statistics flushed");
                return Err(Error::Cancelled);
            }

            let started = Instant::now();
            let mut generation = Generation::new(gen_id, trial_id);
            if let Err(e) = evaluator.generation_evaluate(opts, &mut pop, &mut generation) {
                error!(trial = trial_id, generation = gen_id, %e, "aborting trial");
                experiment.trials.push(trial);
                continue 'trials;
            }
            generation.fill_from(&pop);
            generation.duration_ms = started.elapsed().as_millis() as u64;

            if let Some(dir) = out_dir {
                dump_generation(&pop, &generation, &trial_dir(dir, trial_id), opts);
            }

            let solved = generation.solved;
            trial.generations.push(generation);
            if solved {
                trial.solved = true;
                trial.winner = pop
                    .organisms
                    .iter()
                    .filter(|o| o.winner)
                    .min_by(|l, r| l.fitness_order(r))
                    .map(|o| o.genome.clone());
                info!(trial = trial_id, generation = gen_id, "task solved");
                break;
            }

            if let Err(e) = pop.epoch(gen_id, opts, &mut rng) {
                error!(trial = trial_id, generation = gen_id, %e, "epoch failed, aborting trial");
                break;
            }
        }

        experiment.trials.push(trial);
    }

    flush_experiment(&experiment, out_dir);
    Ok(experiment)
}

/// Per-generation artifacts. Dump failures are logged and swallowed;
/// evolution goes on without them.
fn dump_generation(pop: &Population, generation: &Generation, dir: &Path, opts: &Options) {
    let due = generation.solved
        || (opts.print_every > 0 && generation.id % opts.print_every == 0);
    if !due {
        return;
    }
    if let Err(e) = std::fs::create_dir_all(dir) {
        warn!(%e, "cannot create dump directory");
        return;
    }
    let snapshot = dir.join(format!("gen_{}_population.txt", generation.id));
    if let Err(e) = stats::dump_population(pop, snapshot) {
        warn!(%e, "population dump failed");
    }
    if generation.solved {
        if let Some(champion) = &generation.champion {
            if let Err(e) = stats::dump_winner(champion, dir) {
                warn!(%e, "winner dump failed");
            }
        }
    }
}

fn flush_experiment(experiment: &Experiment, out_dir: Option<&Path>) {
    let Some(dir) = out_dir else { return };
    if let Err(e) = std::fs::create_dir_all(dir) {
        warn!(%e, "cannot create output directory");
        return;
    }
    if let Err(e) = experiment.write_binary(dir.join("experiment.bin")) {
        warn!(%e, "binary history dump failed");
    }
    if let Err(e) = experiment.write_arrays(dir.join("experiment_arrays.json")) {
        warn!(%e, "array archive dump failed");
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::network::Network;

    /// Toy evaluator: fitness is the number of enabled genes; "solves" once
    /// an organism carries at least `target` of them.
    struct GeneCount {
        target: usize,
    }

    impl OrganismEvaluator for GeneCount {
        fn evaluate(&self, organism: &mut Organism) -> Result<bool> {
            // exercise the phenotype path the way a real evaluator would
            let net = organism.phenotype()?;
            let _ = net.max_depth(None);
            organism.fitness =
                organism.genome.genes.iter().filter(|g| g.enabled).count() as f64;
            organism.winner = organism.fitness >= self.target as f64;
            Ok(organism.winner)
        }
    }

    impl GenerationEvaluator for GeneCount {
        fn generation_evaluate(
            &self,
            opts: &Options,
            pop: &mut Population,
            generation: &mut Generation,
        ) -> Result<()> {
            generation.solved = evaluate_population(pop, self, opts)?;
            Ok(())
        }
    }

    fn small_opts() -> Options {
        let mut opts = Options::default();
        opts.pop_size = 20;
        opts.num_generations = 25;
        opts.num_runs = 2;
        opts.mutate_add_link_prob = 0.4;
        opts.mutate_add_node_prob = 0.2;
        opts
    }

    #[test]
    fn test_experiment_runs_all_trials() {
        let seed = Genome::fully_connected(1, 2, 1);
        let opts = small_opts();
        let experiment = run_experiment(
            "gene-count",
            &seed,
            &opts,
            &GeneCount { target: 5 },
            None,
            &CancelToken::new(),
        )
        .unwrap();
        assert_eq!(experiment.trials.len(), 2);
        for trial in experiment.trials.iter() {
            assert!(!trial.generations.is_empty());
            if trial.solved {
                assert!(trial.winner.is_some());
            }
        }
    }

    #[test]
    fn test_sequential_matches_parallel() {
        let seed = Genome::fully_connected(1, 2, 1);
        let mut seq = small_opts();
        seq.num_runs = 1;
        let mut par = seq.clone();
        par.parallel = true;
        par.max_workers = 4;

        let a = run_experiment(
            "seq",
            &seed,
            &seq,
            &GeneCount { target: 5 },
            None,
            &CancelToken::new(),
        )
        .unwrap();
        let b = run_experiment(
            "par",
            &seed,
            &par,
            &GeneCount { target: 5 },
            None,
            &CancelToken::new(),
        )
        .unwrap();

        // worker count must not change the evolution trajectory
        let best = |e: &Experiment| {
            e.trials[0]
                .generations
                .iter()
                .map(|g| g.best_fitness.to_bits())
                .collect::<Vec<_>>()
        };
        assert_eq!(best(&a), best(&b));
        let champs = |e: &Experiment| {
            e.trials[0]
                .generations
                .iter()
                .map(|g| g.champion.as_ref().map(|c| c.genes.len()))
                .collect::<Vec<_>>()
        };
        assert_eq!(champs(&a), champs(&b));
    }

    #[test]
    fn test_pre_cancelled_token_flushes_and_unwinds() {
        let seed = Genome::fully_connected(1, 2, 1);
        let opts = small_opts();
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = run_experiment("c", &seed, &opts, &GeneCount { target: 5 }, None, &cancel)
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[test]
    fn test_degenerate_phenotype_is_not_fatal() {
        // a seed whose output is disconnected still evaluates
        let mut seed = Genome::fully_connected(1, 2, 1);
        seed.genes.clear();
        let mut org = Organism::new(seed, 0);
        let net: &mut Network = org.phenotype().unwrap();
        assert_eq!(net.max_depth(None), 0);
    }
}
