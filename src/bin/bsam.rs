//! `bsam` binary: fit a movement model to a CSV of tracking data with JAGS.
//!
//! # Usage
//!
//! ```bash
//! bsam tracks.csv --model DCRWS --tstep 0.25 --output summary.csv
//! bsam tracks.csv --model hDCRW --config fit.json --workers 4 --timeout 3600
//! ```
use camino::Utf8PathBuf;
use clap::Parser;
use tracing::{error, info, warn};

use bsam::{
    bsam::fit_ssm,
    error_models::ErrorParameterization,
    fit::FitParams,
    observations::csv_reader::read_observations_file,
    sampler::jags::JagsSampler,
    BsamError,
};

/// Command-line arguments of the `bsam` binary.
#[derive(Parser, Debug)]
#[command(
    name = "bsam",
    version,
    about = "Bayesian state-space movement models fitted with JAGS",
    long_about = None
)]
struct Args {
    /// Tracking data: CSV with `id,date,lc,lon,lat[,lonerr,laterr]` columns.
    #[arg(value_name = "CSV")]
    input: Utf8PathBuf,

    /// Model variant: DCRW, DCRWS, hDCRW or hDCRWS.
    #[arg(short, long, default_value = "DCRW")]
    model: String,

    /// JSON file with fit parameters; command-line flags override it.
    #[arg(short, long, value_name = "FILE")]
    config: Option<Utf8PathBuf>,

    /// Grid step in days.
    #[arg(long)]
    tstep: Option<f64>,

    /// Sampler adaptation iterations.
    #[arg(long)]
    adapt: Option<usize>,

    /// Sampler burn-in and monitored iterations.
    #[arg(long)]
    samples: Option<usize>,

    /// Thinning factor.
    #[arg(long)]
    thin: Option<usize>,

    /// Number of chains.
    #[arg(long)]
    chains: Option<usize>,

    /// Loess span of the initial locations.
    #[arg(long)]
    span: Option<f64>,

    /// Error parameterization: `location_class` or `explicit`.
    #[arg(long)]
    errors: Option<ErrorParameterization>,

    /// Concurrent sampler runs (single-series models).
    #[arg(short, long)]
    workers: Option<usize>,

    /// Wall-clock limit of each sampler run, in seconds.
    #[arg(long)]
    timeout: Option<f64>,

    /// Base seed of the sampler.
    #[arg(long)]
    seed: Option<u64>,

    /// JAGS executable.
    #[arg(long, default_value = "jags")]
    jags: Utf8PathBuf,

    /// Write the combined summary table here instead of stdout.
    #[arg(short, long, value_name = "FILE")]
    output: Option<Utf8PathBuf>,

    /// Hide the progress display.
    #[arg(short, long, default_value_t = false)]
    quiet: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn fit_params(args: &Args) -> Result<FitParams, BsamError> {
    let mut params = match args.config.as_deref() {
        Some(path) => {
            info!("loading fit parameters from {path}");
            FitParams::from_json(path)?
        }
        None => FitParams::default(),
    };

    if let Some(v) = args.tstep {
        params.tstep = v;
    }
    if let Some(v) = args.adapt {
        params.adapt = v;
    }
    if let Some(v) = args.samples {
        params.samples = v;
    }
    if let Some(v) = args.thin {
        params.thin = v;
    }
    if let Some(v) = args.chains {
        params.chains = v;
    }
    if let Some(v) = args.span {
        params.span = v;
    }
    if let Some(v) = args.errors {
        params.errors = v;
    }
    if let Some(v) = args.workers {
        params.workers = v;
    }
    if let Some(v) = args.timeout {
        params.timeout_secs = Some(v);
    }
    if let Some(v) = args.seed {
        params.seed = Some(v);
    }
    params.quiet |= args.quiet;

    params.validate()?;
    Ok(params)
}

fn run(args: &Args) -> Result<(), BsamError> {
    let params = fit_params(args)?;
    let table = read_observations_file(&args.input)?;
    info!("read {} observations from {}", table.len(), args.input);

    let sampler = JagsSampler::new().with_program(args.jags.as_std_path());
    let fit = fit_ssm(&table, &args.model, &params, &sampler)?;

    for (id, err) in fit.failures() {
        warn!("individual {id} was not fitted: {err}");
    }

    match &args.output {
        Some(path) => {
            let file = std::fs::File::create(path)?;
            fit.bundle.write_summary_csv(file)?;
            info!("summary written to {path}");
        }
        None => fit.bundle.write_summary_csv(std::io::stdout().lock())?,
    }

    info!(
        "{} fit done in {:.1} s",
        fit.model,
        fit.elapsed.as_secs_f64()
    );
    Ok(())
}

fn main() {
    let args = Args::parse();

    let log_level_filter = args
        .log_level
        .parse::<tracing_subscriber::filter::LevelFilter>()
        .unwrap_or(tracing_subscriber::filter::LevelFilter::INFO);

    tracing_subscriber::fmt()
        .with_max_level(log_level_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(&args) {
        error!("{e}");
        std::process::exit(1);
    }
}
