use clap::{Parser, Subcommand};
use std::sync::Arc;

mod api;
mod auth;
mod config;
mod dispatch;
mod handler;
mod http;
mod logger;
mod providers;
mod server;

use dispatch::{AllowList, Registry};

#[derive(Parser, Debug)]
#[command(name = "kadi-apps", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server (default)
    Serve {
        /// Main configuration file; overlays and environment apply on top
        #[arg(short, long, default_value = "config.toml")]
        config: String,
    },

    /// Print a password hash for the password file
    HashPassword {
        password: String,

        #[arg(long, default_value_t = auth::password::DEFAULT_PBKDF2_ITERATIONS,
              value_parser = clap::value_parser!(u32).range(1..))]
        iterations: u32,
    },

    /// Load the configuration and allow-list, print a summary and exit
    CheckConfig {
        #[arg(short, long, default_value = "config.toml")]
        config: String,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Serve {
        config: "config.toml".to_string(),
    }) {
        Command::Serve { config } => serve(&config),
        Command::HashPassword {
            password,
            iterations,
        } => {
            println!("{}", auth::generate_password_hash(&password, iterations));
            Ok(())
        }
        Command::CheckConfig { config } => check_config(&config),
    }
}

/// Registry filled from the configured providers
fn build_registry(cfg: &config::Config) -> Result<Registry, Box<dyn std::error::Error>> {
    let mut registry = Registry::new();
    if let Some(ref dir) = cfg.api.fixtures_dir {
        let allow_list = AllowList::new(&cfg.api.allow_rules())?;
        let count = providers::register_fixtures(&mut registry, dir, &allow_list)?;
        logger::log_info(&format!(
            "Registered {count} recorded functions from {}",
            dir.display()
        ));
    }
    if registry.is_empty() {
        logger::log_warning("No functions registered; every API call will fail to import");
    }
    Ok(registry)
}

fn serve(config_path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let cfg = config::Config::load_from(config_path)?;
    logger::init(&cfg)?;

    let mut runtime_builder = tokio::runtime::Builder::new_multi_thread();
    runtime_builder.enable_all();
    if let Some(workers) = cfg.server.workers {
        runtime_builder.worker_threads(workers);
    }
    let runtime = runtime_builder.build()?;

    runtime.block_on(async_main(cfg))
}

async fn async_main(cfg: config::Config) -> Result<(), Box<dyn std::error::Error>> {
    let addr = cfg.get_socket_addr()?;
    let registry = build_registry(&cfg)?;
    let functions = registry.len();
    let state = Arc::new(config::AppState::new(cfg, registry)?);
    if state.dispatcher.allow_list().is_empty() {
        logger::log_warning("Allow-list is empty; every API call will return 404");
    }

    let listener = server::create_reusable_listener(addr)?;
    logger::log_server_start(&addr, &state.config, functions);

    server::run(listener, state).await;
    Ok(())
}

fn check_config(config_path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let cfg = config::Config::load_from(config_path)?;
    let addr = cfg.get_socket_addr()?;
    let registry = build_registry(&cfg)?;
    let state = config::AppState::new(cfg, registry)?;

    println!("Listen address: {addr}");
    println!("API prefix: {}", state.config.api.prefix);
    println!("Minimum token version: {}", state.tokens.min_version());
    println!("Registered functions: {}", state.dispatcher.registry().len());
    println!("Allow-list ({} modules):", state.dispatcher.allow_list().len());
    let mut entries: Vec<_> = state.dispatcher.allow_list().entries().collect();
    entries.sort_by(|a, b| a.module().cmp(b.module()));
    for entry in entries {
        println!("  {}: {}", entry.module(), entry.patterns().join(", "));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses() {
        let cli = Cli::try_parse_from(["kadi-apps", "hash-password", "pw", "--iterations", "10"])
            .unwrap();
        assert!(matches!(
            cli.command,
            Some(Command::HashPassword { iterations: 10, .. })
        ));

        let cli = Cli::try_parse_from(["kadi-apps"]).unwrap();
        assert!(cli.command.is_none());

        assert!(Cli::try_parse_from(["kadi-apps", "hash-password", "pw", "--iterations", "0"])
            .is_err());
    }
}
