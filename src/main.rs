use clap::Parser;
use neatron::domain::{Cart2PoleEvaluator, CartPoleEvaluator, XorEvaluator};
use neatron::error::{Error, Result};
use neatron::experiment::{run_experiment, CancelToken, Experiment, GenerationEvaluator};
use neatron::genome::io;
use neatron::options::Options;
use signal_hook::consts::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use signal_hook::iterator::Signals;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "neatron", about = "NEAT neuroevolution experiments", version)]
struct Cli {
    /// output directory for dumps and statistics
    #[arg(long, default_value = "out")]
    out: PathBuf,

    /// options (context) file, key=value
    #[arg(long)]
    context: Option<PathBuf>,

    /// seed genome file
    #[arg(long)]
    genome: PathBuf,

    /// experiment: xor | cart_pole | cart_2pole_markov | cart_2pole_non-markov,
    /// with an optional _parallel suffix
    #[arg(long, default_value = "xor")]
    experiment: String,

    /// number of trials; overrides the options file
    #[arg(long)]
    trials: Option<usize>,

    /// log level; overrides the options file
    #[arg(long)]
    log_level: Option<String>,
}

fn init_logging(level: &str) -> Result<()> {
    let level = match level {
        "error" => tracing::Level::ERROR,
        "warn" => tracing::Level::WARN,
        "info" => tracing::Level::INFO,
        "debug" => tracing::Level::DEBUG,
        "trace" => tracing::Level::TRACE,
        other => {
            return Err(Error::InvalidInput(format!("unknown log level: {other}")));
        }
    };
    tracing_subscriber::fmt().with_max_level(level).init();
    Ok(())
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let mut opts = match &cli.context {
        Some(path) => Options::from_file(path)?,
        None => Options::default(),
    };
    if let Some(trials) = cli.trials {
        opts.num_runs = trials;
    }
    if let Some(level) = &cli.log_level {
        opts.log_level = level.clone();
    }
    init_logging(&opts.log_level)?;

    let seed = io::read_genome_file(&cli.genome)?;
    info!(
        genome = %cli.genome.display(),
        nodes = seed.nodes.len(),
        genes = seed.genes.len(),
        "seed genome loaded"
    );

    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        let mut signals = Signals::new([SIGINT, SIGHUP, SIGQUIT, SIGTERM])
            .map_err(|e| Error::InvalidInput(format!("cannot install signal handlers: {e}")))?;
        std::thread::spawn(move || {
            for signal in signals.forever() {
                warn!(signal, "termination signal received, cancelling after this generation");
                cancel.cancel();
            }
        });
    }

    let name = cli.experiment.as_str();
    let base = name.strip_suffix("_parallel").unwrap_or(name);
    if base.len() != name.len() {
        opts.parallel = true;
    }

    let outcome = match base {
        "xor" => dispatch(base, &seed, &opts, &XorEvaluator::new(), &cli, &cancel),
        "cart_pole" => dispatch(
            base,
            &seed,
            &opts,
            &CartPoleEvaluator::new(opts.seed),
            &cli,
            &cancel,
        ),
        "cart_2pole_markov" => dispatch(
            base,
            &seed,
            &opts,
            &Cart2PoleEvaluator::markov(),
            &cli,
            &cancel,
        ),
        "cart_2pole_non-markov" => dispatch(
            base,
            &seed,
            &opts,
            &Cart2PoleEvaluator::non_markov(),
            &cli,
            &cancel,
        ),
        other => Err(Error::InvalidInput(format!("unknown experiment: {other}"))),
    };

    match outcome {
        Ok(experiment) => {
            summarize(&experiment);
            Ok(())
        }
        Err(Error::Cancelled) => {
            info!("experiment cancelled; statistics written through the last generation");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

fn dispatch<E: GenerationEvaluator>(
    name: &str,
    seed: &neatron::Genome,
    opts: &Options,
    evaluator: &E,
    cli: &Cli,
    cancel: &CancelToken,
) -> Result<Experiment> {
    run_experiment(name, seed, opts, evaluator, Some(&cli.out), cancel)
}

fn summarize(experiment: &Experiment) {
    info!(
        experiment = %experiment.name,
        trials = experiment.trials.len(),
        success_rate = experiment.success_rate(),
        "experiment complete"
    );
    if let Some(avg) = experiment.avg_generations_to_solve() {
        info!(avg_generations = avg, "solved trials");
    }
    if let Some((nodes, genes)) = experiment.avg_winner_complexity() {
        info!(avg_winner_nodes = nodes, avg_winner_genes = genes, "winner complexity");
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            // logging may not be initialized yet when startup fails
            error!(%e, "fatal");
            eprintln!("neatron: {e}");
            ExitCode::FAILURE
        }
    }
}
