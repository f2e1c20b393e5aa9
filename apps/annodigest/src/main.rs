//! # annodigest
//!
//! Command-line front end for the annotation-digest engine.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────┐
//! │                apps/annodigest (THE BINARY)           │
//! │                                                       │
//! │  ┌─────────────┐   ┌──────────────┐   ┌────────────┐  │
//! │  │    CLI      │   │    Config    │   │  Reports   │  │
//! │  │   (clap)    │   │    (toml)    │   │   (json)   │  │
//! │  └──────┬──────┘   └──────┬───────┘   └─────┬──────┘  │
//! │         └─────────────────┼─────────────────┘         │
//! │                           ▼                           │
//! │                  ┌─────────────────┐                  │
//! │                  │ annodigest-core │                  │
//! │                  │   (THE LOGIC)   │                  │
//! │                  └─────────────────┘                  │
//! └───────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Records stored in one class file
//! annodigest records target/classes/com/example/Api.class
//!
//! # Digest of a type over a classpath
//! annodigest -c target/classes,lib/api.jar digest com.example.Api
//!
//! # Nearest @Route on a type, read through Route's own shape
//! annodigest -c target/classes view com.example.Api com.example.Route
//!
//! # Canonical export and verification
//! annodigest -c target/classes export com.example.Api -o api.adgx
//! annodigest -c target/classes verify api.adgx --against com.example.Api
//! ```

use annodigest::cli;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

fn main() {
    // ANNODIGEST_LOG_FORMAT=json enables machine-parseable logs.
    let log_format =
        std::env::var("ANNODIGEST_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "annodigest=info".into());

    // Logs go to stderr so stdout stays clean for reports.
    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(std::io::stderr),
                )
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    let cli = cli::Cli::parse();

    if let Err(e) = cli::execute(cli) {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}
