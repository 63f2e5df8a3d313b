use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use lincheck_core::{
    observability::init_tracing, LincheckError, LincheckResult, ValidationReport, Validator,
    ValidatorConfig, Verdict,
};

const EXIT_LINEARIZABLE: u8 = 0;
const EXIT_NOT_LINEARIZABLE: u8 = 1;
const EXIT_RESOURCE_LIMIT: u8 = 2;
const EXIT_NO_OPERATIONS: u8 = 3;
const EXIT_ERROR: u8 = 4;

#[derive(Parser)]
#[command(name = "lincheck")]
#[command(about = "Check a key-value operations log for linearizability", long_about = None)]
struct Cli {
    /// Operations log to validate (defaults to the configured path)
    log_path: Option<PathBuf>,

    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Refuse to search subsets when there are more ambiguous operations than this
    #[arg(long)]
    max_ambiguous: Option<usize>,

    /// Worker threads for parallel checking
    #[arg(long)]
    workers: Option<usize>,

    /// Check everything on a single thread
    #[arg(long)]
    sequential: bool,

    /// Print the validation report as JSON
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn load_config(&self) -> LincheckResult<ValidatorConfig> {
        let mut config = match &self.config {
            Some(path) => ValidatorConfig::from_file(path)?,
            None => ValidatorConfig::from_env()?,
        };

        if let Some(path) = &self.log_path {
            config.log_path = path.clone();
        }
        if let Some(limit) = self.max_ambiguous {
            config.max_ambiguous_operations = limit;
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if self.sequential {
            config.parallel = false;
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match cli.load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("lincheck: {}", e);
            return ExitCode::from(EXIT_ERROR);
        }
    };
    init_tracing(&config.log_level);

    tracing::info!(path = %config.log_path.display(), "Starting validation");
    let validator = Validator::new(config);
    match validator.validate_configured_log().await {
        Ok(report) => match print_report(&report, cli.json) {
            Ok(()) => ExitCode::from(exit_code(&report.verdict)),
            Err(e) => {
                eprintln!("lincheck: {}", e);
                ExitCode::from(EXIT_ERROR)
            }
        },
        Err(e @ LincheckError::NoOperations { .. }) => {
            eprintln!("lincheck: {}", e);
            ExitCode::from(EXIT_NO_OPERATIONS)
        }
        Err(e) => {
            eprintln!("lincheck: {}", e);
            ExitCode::from(EXIT_ERROR)
        }
    }
}

fn exit_code(verdict: &Verdict) -> u8 {
    match verdict {
        Verdict::Linearizable { .. } => EXIT_LINEARIZABLE,
        Verdict::NotLinearizable => EXIT_NOT_LINEARIZABLE,
        Verdict::ResourceLimitExceeded { .. } => EXIT_RESOURCE_LIMIT,
    }
}

fn print_report(report: &ValidationReport, json: bool) -> LincheckResult<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    if let Some(source) = &report.source {
        println!("Log:                {}", source.display());
    }
    println!("Confirmed ops:      {}", report.confirmed);
    println!("Ambiguous ops:      {}", report.ambiguous);
    println!("Keys:               {}", report.keys);
    if !report.failing_keys.is_empty() {
        println!("Failing keys:       {}", report.failing_keys.join(", "));
        println!("Subsets checked:    {}", report.candidates_checked);
    }

    match &report.verdict {
        Verdict::Linearizable { witness: None } => println!("Result:             linearizable"),
        Verdict::Linearizable {
            witness: Some(witness),
        } => {
            println!(
                "Result:             linearizable with {} ambiguous operation(s) applied",
                witness.len()
            );
            for record in witness {
                println!("  line {}: {}", record.line, record);
            }
        }
        Verdict::NotLinearizable => println!("Result:             NOT linearizable"),
        Verdict::ResourceLimitExceeded { ambiguous, limit } => println!(
            "Result:             not checked, {} ambiguous operations exceed the limit of {}",
            ambiguous, limit
        ),
    }
    Ok(())
}
