// Grid Bracket Bot - command line entry point

use clap::{Parser, Subcommand};
use grid_bracket_bot::{Config, ConfigError, TradingError};
use std::path::Path;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

// Load command modules from cli directory
#[path = "../cli/account_commands.rs"]
mod account_commands;
#[path = "../cli/trade_commands.rs"]
mod trade_commands;

#[derive(Parser)]
#[command(name = "grid-bot")]
#[command(version)]
#[command(about = "Logarithmic grid bracket trading for Binance spot", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init,

    /// Check configuration, symbols and account before trading
    Validate,

    /// Trade every enabled symbol until Ctrl-C
    Run {
        /// Only trade these symbols (repeatable, e.g. --symbol BTCUSDT)
        #[arg(short, long = "symbol")]
        symbols: Vec<String>,
    },

    /// Show balances and open orders for the configured symbols
    Status,
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    info!("🚀 Grid Bracket Bot v{}", env!("CARGO_PKG_VERSION"));
    info!("📁 Config: {}", cli.config);

    let result = match cli.command {
        // Init doesn't require config (it creates it)
        Commands::Init => init_config(&cli.config),
        Commands::Validate => {
            let config = load_config_or_exit(&cli.config);
            account_commands::validate(config).await
        }
        Commands::Status => {
            let config = load_config_or_exit(&cli.config);
            account_commands::show_status(config).await
        }
        Commands::Run { symbols } => {
            let config = load_config_or_exit(&cli.config);
            trade_commands::run_trading(&cli.config, config, &symbols).await
        }
    };

    if let Err(e) = result {
        error!("❌ {}", e.user_message());
        return Err(e.into());
    }

    info!("👋 Done");
    Ok(())
}

/// Load config or exit with helpful error message
fn load_config_or_exit(path: &str) -> Config {
    match Config::from_file(path) {
        Ok(config) => config,
        Err(e) => {
            error!("❌ Configuration Error");
            error!("{}", e);

            if matches!(e, ConfigError::FileNotFound(_)) {
                error!("");
                error!("💡 Quick fix:");
                error!("   1. Run: grid-bot init");
                error!("   2. Edit {} with your API keys and symbols", path);
                error!("   3. Try again");
            }

            std::process::exit(1);
        }
    }
}

fn init_config(path: &str) -> Result<(), TradingError> {
    info!("🔧 Initializing configuration...");

    if Path::new(path).exists() {
        warn!("⚠️  {} already exists, skipping", path);
        return Ok(());
    }

    Config::load_or_create(path)?;

    info!("✅ Configuration written to {}", path);
    info!("💡 Next steps:");
    info!("   1. Set BINANCE_API_KEY / BINANCE_API_SECRET or edit [api] in {}", path);
    info!("   2. Adjust the [[symbols]] grids");
    info!("   3. Run: grid-bot validate");
    info!("   4. Run: grid-bot run");

    Ok(())
}
