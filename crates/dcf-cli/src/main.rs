//! Deconfounder study CLI

mod report;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use dcf_inference::{StudyConfig, StudyModel, run_study};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "deconfound")]
#[command(about = "Deconfounder study - latent-trait recovery on a synthetic panel")]
#[command(version)]
struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: tracing::Level,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate the panel, fit every model and report
    Run {
        #[command(flatten)]
        study: StudyArgs,

        /// Report format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Output file for the report. Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the effective configuration (pretty JSON)
    PrintConfig {
        #[command(flatten)]
        study: StudyArgs,

        /// Output file. Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print version information
    Version,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// Regression tables and bias comparison
    Text,
    /// Full report as pretty JSON
    Json,
}

/// Configuration file plus per-field overrides.
#[derive(Args, Debug, Default)]
struct StudyArgs {
    /// Configuration file (`.json` for JSON, anything else is read as YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Random seed
    #[arg(long)]
    seed: Option<u64>,

    /// Number of entities
    #[arg(long)]
    entities: Option<usize>,

    /// Number of periods
    #[arg(long)]
    periods: Option<usize>,

    /// Mean of the exponential latent-trait distribution
    #[arg(long)]
    latent_scale: Option<f64>,

    /// Standard deviation of the outcome noise (0 = noise-free)
    #[arg(long)]
    noise_sd: Option<f64>,

    /// Ground-truth intercept
    #[arg(long, allow_hyphen_values = true)]
    intercept: Option<f64>,

    /// Ground-truth coefficient of the observed trait
    #[arg(long, allow_hyphen_values = true)]
    coefficient: Option<f64>,

    /// Fit the random-intercept model by ML instead of REML
    #[arg(long)]
    ml: bool,

    /// Scale period columns to unit variance before PCA (correlation matrix)
    #[arg(long)]
    standardize: bool,
}

impl StudyArgs {
    /// File values (or defaults), then flags on top.
    fn resolve(&self) -> Result<StudyConfig> {
        let mut cfg = match &self.config {
            Some(path) => StudyConfig::from_path(path)
                .with_context(|| format!("reading config {}", path.display()))?,
            None => StudyConfig::default(),
        };
        if let Some(v) = self.seed {
            cfg.seed = v;
        }
        if let Some(v) = self.entities {
            cfg.panel.n_entities = v;
        }
        if let Some(v) = self.periods {
            cfg.panel.n_periods = v;
        }
        if let Some(v) = self.latent_scale {
            cfg.panel.latent_scale = v;
        }
        if let Some(v) = self.noise_sd {
            cfg.outcome.noise_sd = v;
        }
        if let Some(v) = self.intercept {
            cfg.outcome.intercept = v;
        }
        if let Some(v) = self.coefficient {
            cfg.outcome.coefficient = v;
        }
        if self.ml {
            cfg.reml = false;
        }
        if self.standardize {
            cfg.pca_standardize = true;
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run { study, format, output } => cmd_run(&study, format, output.as_ref()),
        Commands::PrintConfig { study, output } => cmd_print_config(&study, output.as_ref()),
        Commands::Version => {
            println!("deconfound {}", dcf_core::VERSION);
            Ok(())
        }
    }
}

fn cmd_run(args: &StudyArgs, format: OutputFormat, output: Option<&PathBuf>) -> Result<()> {
    let cfg = args.resolve()?;
    tracing::info!(
        seed = cfg.seed,
        entities = cfg.panel.n_entities,
        periods = cfg.panel.n_periods,
        noise_sd = cfg.outcome.noise_sd,
        "running study"
    );

    let outcome = run_study(&cfg).context("study failed")?;
    let study = &outcome.report;
    for rec in &study.reconstructions {
        tracing::info!(
            method = %rec.method,
            converged = rec.converged,
            iterations = rec.n_iter,
            "latent trait reconstructed"
        );
    }
    if let Some(naive) = study.observed_estimate(StudyModel::Naive) {
        tracing::info!(naive, truth = cfg.outcome.coefficient, "models fitted");
    }

    match format {
        OutputFormat::Json => write_json(output, serde_json::to_value(study)?),
        OutputFormat::Text => write_text(output, &report::render(study)),
    }
}

fn cmd_print_config(args: &StudyArgs, output: Option<&PathBuf>) -> Result<()> {
    let cfg = args.resolve()?;
    write_json(output, serde_json::to_value(&cfg)?)
}

fn write_json(output: Option<&PathBuf>, value: serde_json::Value) -> Result<()> {
    write_text(output, &serde_json::to_string_pretty(&value)?)
}

fn write_text(output: Option<&PathBuf>, text: &str) -> Result<()> {
    if let Some(path) = output {
        std::fs::write(path, format!("{text}\n"))
            .with_context(|| format!("writing {}", path.display()))?;
        tracing::info!(path = %path.display(), "report written");
    } else {
        println!("{text}");
    }
    Ok(())
}
