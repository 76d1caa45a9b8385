use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use gatekeeper::config::{load_config, ConfigError};
use gatekeeper::security::classifier::{normalize_path, EndpointClassifier};
use gatekeeper::security::vault;

#[derive(Parser)]
#[command(name = "gatekeeper-cli")]
#[command(about = "Operator tooling for the gatekeeper service", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a random secret suitable for an API key or webhook secret
    Keygen {
        /// Number of random bytes before encoding
        #[arg(short, long, default_value_t = vault::MIN_TOKEN_BYTES)]
        bytes: usize,
    },
    /// Show how the configured classifier treats each path
    Classify {
        #[arg(short, long, env = "GATEKEEPER_CONFIG")]
        config: PathBuf,
        #[arg(required = true)]
        paths: Vec<String>,
    },
    /// Load and validate a configuration file
    CheckConfig { path: PathBuf },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Keygen { bytes } => {
            let secret = vault::generate(bytes).context("generating secret")?;
            println!("{secret}");
        }
        Commands::Classify { config, paths } => {
            let config = load_config(&config)
                .with_context(|| format!("loading {}", config.display()))?;
            let classifier = EndpointClassifier::new(&config.endpoints);
            for path in paths {
                let normalized = normalize_path(&path).unwrap_or_else(|| "<malformed>".to_string());
                println!(
                    "{:<40} {:<30} {}",
                    path,
                    normalized,
                    classifier.classify(&path).as_str()
                );
            }
        }
        Commands::CheckConfig { path } => match load_config(&path) {
            Ok(config) => {
                println!(
                    "{}: ok ({} endpoint rules, {} rate limit scopes)",
                    path.display(),
                    config.endpoints.rules.len(),
                    config.rate_limit.scopes.len()
                );
            }
            Err(ConfigError::Validation(errors)) => {
                eprintln!("{}: {} problem(s)", path.display(), errors.len());
                for error in &errors {
                    eprintln!("  - {error}");
                }
                std::process::exit(1);
            }
            Err(e) => return Err(e).with_context(|| format!("loading {}", path.display())),
        },
    }

    Ok(())
}
