//! Command-line driver: load a JSON configuration and run one job.

use std::path::PathBuf;
use std::process::ExitCode;

use basis_optimizer::{Config, JobType, Outcome, Study};
use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

/// Gaussian-process surrogate optimization of basis-set exponents
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the JSON configuration file
    #[arg(short, long, default_value = "basis-opt.json")]
    config: PathBuf,

    /// Override the job type of the configuration
    #[arg(short, long, value_enum)]
    job: Option<Job>,

    /// Override the work directory
    #[arg(short, long)]
    work_dir: Option<PathBuf>,

    /// Override the iteration cap
    #[arg(long)]
    max_iterations: Option<usize>,

    /// Override the convergence tolerance
    #[arg(long)]
    tolerance: Option<f64>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Job {
    GenerateTraining,
    GenerateTesting,
    RunOptimization,
    All,
}

impl From<Job> for JobType {
    fn from(job: Job) -> Self {
        match job {
            Job::GenerateTraining => JobType::GenerateTraining,
            Job::GenerateTesting => JobType::GenerateTesting,
            Job::RunOptimization => JobType::RunOptimization,
            Job::All => JobType::All,
        }
    }
}

fn run(args: Args) -> basis_optimizer::Result<Outcome> {
    let mut config = Config::from_file(&args.config)?;
    if let Some(job) = args.job {
        config.job_type = job.into();
    }
    if let Some(dir) = args.work_dir {
        config.work_dir = dir;
    }
    if let Some(n) = args.max_iterations {
        config.max_iterations = n;
    }
    if let Some(tol) = args.tolerance {
        config.tolerance = tol;
    }
    Study::from_config(config)?.run()
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = Args::parse();
    match run(args) {
        Ok(Outcome::Converged {
            parameters,
            value,
            predicted,
            iterations,
        }) => {
            println!("converged after {iterations} iterations");
            println!("penalty {value:.8} (predicted {predicted:.8})");
            for (i, p) in parameters.iter().enumerate() {
                println!("  x[{i}] = {p:.5}");
            }
            ExitCode::SUCCESS
        }
        Ok(Outcome::NeedMorePoints { best, iterations }) => {
            println!("not converged after {iterations} iterations, more points needed");
            if let Some(best) = best {
                println!("best training sample {:.8} at {:?}", best.value, best.parameters);
            }
            ExitCode::from(2)
        }
        Ok(Outcome::DatasetReady { role, samples }) => {
            println!("{role} set ready with {samples} samples");
            ExitCode::SUCCESS
        }
        Ok(Outcome::InputsWritten { count }) => {
            println!("wrote {count} job input set(s)");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
