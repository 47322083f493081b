//! # Baar - Per-Display Status Bar Shell
//!
//! Process entry point: parses the command line, sets up logging, loads the
//! configuration and hands control to `BaarShell`.

use anyhow::Result;
use clap::Parser;
use log::info;

use baar::logging::{self, LogLevel};
use baar::outcome::AnyhowOutcomeExt;
use baar::{BaarConfig, BaarShell};

#[derive(Parser)]
#[command(name = "baar")]
#[command(about = "A status bar shell that keeps one bar per display across hot-plug and reloads")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "~/.config/baar/baar.toml")]
    config: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Bootstrap, print the surfaces, tear down and exit
    #[arg(long)]
    once: bool,

    /// Validate the configuration file and exit
    #[arg(long)]
    check_config: bool,
}

fn build_info() -> String {
    format!(
        "{} ({}, {}, built {})",
        env!("CARGO_PKG_VERSION"),
        option_env!("GIT_COMMIT").map(|c| &c[..c.len().min(8)]).unwrap_or("unknown"),
        env!("TARGET_TRIPLE"),
        env!("BUILD_DATE")
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded = BaarConfig::load(&cli.config);

    // Initialize logging
    let level = if cli.debug {
        LogLevel::Debug
    } else {
        loaded.as_ref().map(|config| config.logging.level).unwrap_or_default()
    };
    logging::init(level);

    if cli.check_config {
        loaded?;
        println!("{}: configuration OK", cli.config);
        return Ok(());
    }

    info!("🚀 Starting Baar - Status Bar Shell");
    info!("📄 Version: {}", build_info());

    // Load configuration
    let config = match loaded.inspect_failure("❌ Failed to load configuration") {
        Ok(config) => {
            info!("✅ Configuration loaded from: {}", cli.config);
            config
        }
        Err(_) => {
            info!("📝 Using default configuration");
            BaarConfig::default()
        }
    };

    let shell = BaarShell::new(&cli.config, config)?;

    if cli.once {
        for cached in shell.bootstrap().await {
            println!("{}\t{}\t{}", cached.id, cached.kind, cached.display);
        }
        if let Ok(theme) = shell.current_theme().await {
            println!("theme\t{}", theme.display());
        }
        shell.shutdown();
        return Ok(());
    }

    info!("✨ Baar is ready!");
    shell.run().await?;

    info!("👋 Baar shutting down");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from(["baar"]).unwrap();
        assert_eq!(cli.config, "~/.config/baar/baar.toml");
        assert!(!cli.debug);
        assert!(!cli.once);
        assert!(!cli.check_config);
    }

    #[test]
    fn test_cli_flags() {
        let cli = Cli::try_parse_from(["baar", "--debug", "--once", "-c", "/etc/baar.toml"]).unwrap();
        assert!(cli.debug);
        assert!(cli.once);
        assert_eq!(cli.config, "/etc/baar.toml");
    }

    #[test]
    fn test_check_config_flag() {
        let cli = Cli::try_parse_from(["baar", "--check-config"]).unwrap();
        assert!(cli.check_config);
    }

    #[test]
    fn test_build_info_mentions_version() {
        assert!(build_info().starts_with(env!("CARGO_PKG_VERSION")));
    }
}
