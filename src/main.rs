//! `breaker`: operate circuits stored in a shared state store.
//!
//! ```text
//! breaker --config breaker.toml status payments
//! breaker --config breaker.toml permit payments
//! breaker --config breaker.toml record payments failure --cause "HTTP 503"
//! breaker --config breaker.toml invoke payments fail
//! ```
//!
//! Each run behaves like one stateless invocation: it builds the engine,
//! talks to the store, and exits. Use the sqlite backend so state survives
//! between runs.

use clap::{Parser, Subcommand, ValueEnum};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;

use stateless_breaker::clock::SystemClock;
use stateless_breaker::config::loader::{apply_env_overrides, load_config};
use stateless_breaker::config::schema::StoreBackend;
use stateless_breaker::config::BreakerConfig;
use stateless_breaker::observability::logging::init_logging;
use stateless_breaker::resilience::{CircuitBreaker, GuardError, Outcome, Safeguarded};
use stateless_breaker::store;

#[derive(Parser)]
#[command(name = "breaker")]
#[command(about = "Inspect and drive store-backed circuit breakers", long_about = None)]
struct Cli {
    /// TOML configuration file; defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the stored record of a circuit
    Status { key: String },
    /// Ask whether a call may proceed
    Permit { key: String },
    /// Report the outcome of a call
    Record {
        key: String,
        outcome: OutcomeArg,
        /// Description of the failure
        #[arg(long)]
        cause: Option<String>,
    },
    /// Run the sample operation through the breaker ("fail" makes it fail)
    Invoke { key: String, value: String },
}

#[derive(Clone, Copy, ValueEnum)]
enum OutcomeArg {
    Success,
    Failure,
}

impl From<OutcomeArg> for Outcome {
    fn from(arg: OutcomeArg) -> Self {
        match arg {
            OutcomeArg::Success => Outcome::Success,
            OutcomeArg::Failure => Outcome::Failure,
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct SampleError(String);

async fn sample_operation(value: &str) -> Result<String, SampleError> {
    if value == "fail" {
        return Err(SampleError("Badaboom".to_string()));
    }
    Ok(value.to_string())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => {
            let mut config = BreakerConfig::default();
            apply_env_overrides(&mut config, |name| std::env::var(name).ok());
            config
        }
    };
    init_logging(&config.observability);

    if config.store.backend == StoreBackend::Memory {
        tracing::warn!("In-memory store selected; circuit state ends with this process");
    }

    let store = store::connect(&config.store, Arc::new(SystemClock)).await?;
    let breaker = CircuitBreaker::new(store, &config)?;

    match cli.command {
        Commands::Status { key } => match breaker.status(&key).await? {
            Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
            None => println!("no record for circuit '{}'", key),
        },
        Commands::Permit { key } => {
            let permit = breaker.permit(&key).await;
            let output = json!({
                "circuit": key,
                "decision": permit.decision,
                "degraded": permit.degraded.map(|d| d.to_string()),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Commands::Record { key, outcome, cause } => {
            match (Outcome::from(outcome), cause) {
                (Outcome::Failure, Some(cause)) => breaker.record_failure(&key, &cause).await?,
                (outcome, _) => breaker.record_outcome(&key, outcome).await?,
            }
            println!("recorded");
        }
        Commands::Invoke { key, value } => {
            let guard = Safeguarded::new(breaker, key);
            match guard.call(|| sample_operation(&value)).await {
                Ok(output) => println!("{}", json!({ "value": output })),
                Err(GuardError::Inner(e)) => {
                    eprintln!("operation failed: {}", e);
                    std::process::exit(1);
                }
                Err(rejected) => {
                    eprintln!("{}", rejected);
                    std::process::exit(2);
                }
            }
        }
    }

    Ok(())
}
