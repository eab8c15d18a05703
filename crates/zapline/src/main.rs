// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Zapline - per-tenant WhatsApp connection-session orchestrator.
//!
//! This is the binary entry point.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod pair;
mod serve;
mod shutdown;
mod stack;

use clap::{Parser, Subcommand};
use zapline_config::ZaplineConfig;

/// Zapline - per-tenant WhatsApp connection-session orchestrator.
#[derive(Parser, Debug)]
#[command(name = "zapline", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the session orchestrator and its HTTP API.
    Serve,
    /// Pair a tenant interactively by rendering its QR code in the terminal.
    Pair {
        /// Tenant to pair.
        tenant: String,
    },
    /// Print the effective configuration with secrets redacted.
    Config,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match zapline_config::load_and_validate() {
        Ok(config) => config,
        Err(errors) => {
            zapline_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Some(Commands::Serve) => serve::run_serve(config).await,
        Some(Commands::Pair { tenant }) => pair::run_pair(config, &tenant).await,
        Some(Commands::Config) => print_config(&config),
        None => {
            println!("zapline: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn print_config(config: &ZaplineConfig) -> Result<(), zapline_core::ZaplineError> {
    let rendered = toml::to_string_pretty(&redacted(config))
        .map_err(|e| zapline_core::ZaplineError::Config(format!("cannot render config: {e}")))?;
    print!("{rendered}");
    Ok(())
}

fn redacted(config: &ZaplineConfig) -> ZaplineConfig {
    let mut config = config.clone();
    let hide = |token: &mut Option<String>| {
        if token.is_some() {
            *token = Some("<redacted>".to_string());
        }
    };
    hide(&mut config.server.bearer_token);
    hide(&mut config.handler.bearer_token);
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(not(target_env = "msvc"))]
    fn jemalloc_is_active() {
        // Only jemalloc answers epoch and stats queries.
        use tikv_jemalloc_ctl::{epoch, stats};
        epoch::advance().unwrap();
        let allocated = stats::allocated::read().unwrap();
        assert!(allocated > 0, "jemalloc should report non-zero allocation");
    }

    #[test]
    fn inline_config_with_defaults_is_valid() {
        let config = zapline_config::load_and_validate_str("").unwrap();
        assert_eq!(config.service.name, "zapline");
    }

    #[test]
    fn secrets_are_redacted() {
        let mut config = ZaplineConfig::default();
        config.server.bearer_token = Some("s3cret".into());
        let rendered = toml::to_string_pretty(&redacted(&config)).unwrap();
        assert!(!rendered.contains("s3cret"));
        assert!(rendered.contains("<redacted>"));
        assert!(redacted(&ZaplineConfig::default()).handler.bearer_token.is_none());
    }

    #[test]
    fn cli_parses_pair() {
        let cli = Cli::try_parse_from(["zapline", "pair", "acme"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Pair { tenant }) if tenant == "acme"));
    }
}
