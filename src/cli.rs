use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use rayon::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use crate::{
    Calculation, Model, PredictionReport, Prs, Settings,
    pedigree_file::PedigreeFile,
    runner::Engine,
    submission::{self, Permissions, Submission},
    validate::{current_year, validate},
};

#[derive(Debug, Parser)]
#[command(author, version, about = "Cancer risk prediction from family pedigrees", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Settings file (JSON); built-in defaults are used when omitted
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Logging verbosity (e.g. error, warn, info, debug)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the model on one or more pedigree files
    Predict(PredictArgs),
    /// Parse and validate pedigree files without running the model
    Validate(ValidateArgs),
    /// Print the engine version
    Version(ModelArgs),
}

#[derive(Debug, Args)]
struct ModelArgs {
    #[arg(long, value_enum)]
    model: Model,

    /// Directory holding the engine executable and its data
    #[arg(long, value_name = "DIR")]
    engine_home: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct PredictArgs {
    #[command(flatten)]
    model: ModelArgs,

    /// Pedigree file; repeat for independent submissions
    #[arg(long, value_name = "FILE", required = true)]
    pedigree: Vec<PathBuf>,

    #[arg(long, default_value = "UK")]
    population: String,

    #[arg(long, default_value = "UK")]
    cancer_rates: String,

    /// Calculation to run; repeatable. All the model offers when omitted.
    #[arg(long = "calc", value_enum, value_name = "NAME")]
    calculations: Vec<Calculation>,

    /// Risk-factor code, overriding the pedigree file header
    #[arg(long)]
    rfcode: Option<u64>,

    /// PRS alpha, overriding the pedigree file header
    #[arg(long, requires = "prs_zscore")]
    prs_alpha: Option<f64>,

    #[arg(long, requires = "prs_alpha")]
    prs_zscore: Option<f64>,

    /// Engine time limit in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Keep the engine input and output files
    #[arg(long)]
    keep_work_files: bool,

    /// Report path; a directory when several pedigrees are given. Reports go
    /// to stdout when omitted.
    #[arg(long, value_name = "PATH")]
    output: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct ValidateArgs {
    #[arg(long, value_enum)]
    model: Model,

    #[arg(long, value_name = "FILE", required = true)]
    pedigree: Vec<PathBuf>,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    let mut settings = match &cli.config {
        Some(path) => Settings::from_path(path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?,
        None => Settings::default(),
    };

    match cli.command {
        Command::Predict(args) => {
            args.model.apply(&mut settings);
            if let Some(seconds) = args.timeout {
                settings.model_mut(args.model.model).timeout_secs = seconds;
            }
            predict(&settings, &args)
        }
        Command::Validate(args) => validate_files(&settings, &args),
        Command::Version(args) => {
            args.apply(&mut settings);
            let version = Engine::new(settings.model(args.model))
                .version()
                .context("failed to query engine version")?;
            println!("{} engine {version}", args.model);
            println!("canrisk {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

impl ModelArgs {
    fn apply(&self, settings: &mut Settings) {
        if let Some(home) = &self.engine_home {
            settings.model_mut(self.model).home = home.clone();
        }
    }
}

fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .ok();
    Ok(())
}

fn submission_for(args: &PredictArgs, text: String) -> Submission {
    let mut submission = Submission::new(args.model.model, text);
    submission.user = whoami();
    submission.population = args.population.clone();
    submission.cancer_rates = args.cancer_rates.clone();
    submission.calculations = args.calculations.clone();
    submission.risk_factor_code = args.rfcode;
    submission.prs = args.prs_alpha.zip(args.prs_zscore).map(|(a, z)| Prs::new(a, z));
    submission.permissions = Permissions {
        risk_factors: true,
        prs: true,
        retain_working_files: args.keep_work_files,
    };
    submission
}

fn whoami() -> String {
    std::env::var("USER").unwrap_or_else(|_| "cli".to_string())
}

fn predict(settings: &Settings, args: &PredictArgs) -> Result<()> {
    let reports: Vec<(PathBuf, PredictionReport)> = args
        .pedigree
        .par_iter()
        .map(|path| -> Result<(PathBuf, PredictionReport)> {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read pedigree file {}", path.display()))?;
            let report = submission::process(settings, submission_for(args, text))
                .with_context(|| format!("prediction failed for {}", path.display()))?;
            Ok((path.clone(), report))
        })
        .collect::<Result<_>>()?;

    match &args.output {
        None => {
            for (_, report) in &reports {
                println!("{}", report.to_json()?);
            }
        }
        Some(output) if reports.len() == 1 => {
            reports[0].1.write_json(output)?;
        }
        Some(dir) => {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create output directory: {}", dir.display()))?;
            for (path, report) in &reports {
                report.write_json(&report_path(dir, path))?;
            }
        }
    }
    Ok(())
}

fn report_path(dir: &Path, pedigree: &Path) -> PathBuf {
    let stem = pedigree
        .file_stem()
        .map(|s| s.to_string_lossy().replace('.', "_"))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| String::from("pedigree"));
    dir.join(format!("{stem}.json"))
}

fn validate_files(settings: &Settings, args: &ValidateArgs) -> Result<()> {
    let year = current_year();
    for path in &args.pedigree {
        let mut file = PedigreeFile::from_path(path)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        let mut warnings = std::mem::take(&mut file.warnings);
        warnings.extend(
            validate(&mut file.pedigrees, args.model, settings, year)
                .with_context(|| format!("{} is invalid", path.display()))?,
        );
        println!(
            "{}: {} families valid for the {} model",
            path.display(),
            file.pedigrees.len(),
            args.model
        );
        for warning in warnings {
            println!("  warning: {warning}");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn parses_predict_options() {
        let cli = Cli::parse_from([
            "canrisk",
            "predict",
            "--model",
            "bc",
            "--pedigree",
            "a.txt",
            "--pedigree",
            "b.txt",
            "--calc",
            "carrier_probs",
            "--calc",
            "ten_year",
            "--prs-alpha",
            "0.45",
            "--prs-zscore",
            "0.982",
        ]);
        let Command::Predict(args) = cli.command else {
            panic!("expected predict");
        };
        assert_eq!(args.model.model, Model::Bc);
        assert_eq!(args.pedigree.len(), 2);
        assert_eq!(
            args.calculations,
            vec![Calculation::CarrierProbs, Calculation::TenYear]
        );
        let submission = submission_for(&args, String::new());
        assert_eq!(submission.prs, Some(Prs::new(0.45, 0.982)));
        assert_eq!(submission.population, "UK");
        assert!(!submission.permissions.retain_working_files);
    }

    #[test]
    fn prs_needs_both_values() {
        let result = Cli::try_parse_from([
            "canrisk",
            "predict",
            "--model",
            "oc",
            "--pedigree",
            "a.txt",
            "--prs-alpha",
            "0.45",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn global_options_follow_subcommand() {
        let cli = Cli::parse_from([
            "canrisk",
            "validate",
            "--model",
            "pc",
            "--pedigree",
            "a.txt",
            "--log-level",
            "debug",
        ]);
        assert_eq!(cli.log_level, "debug");
        assert!(matches!(cli.command, Command::Validate(_)));
    }

    #[test]
    fn report_names_follow_pedigree_files() {
        assert_eq!(
            report_path(Path::new("out"), Path::new("data/fam.v2.txt")),
            PathBuf::from("out/fam_v2.json")
        );
    }
}
