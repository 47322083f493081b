//! Configuration management for Baar
//!
//! This module handles loading, parsing, and validating configuration
//! from TOML files. It combines reload timing, logging, theme sources,
//! and the static output list used by the headless backend.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::logging::LogLevel;

pub mod loader;

pub use loader::LockedLoader;

/// Main configuration struct containing all Baar settings
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct BaarConfig {
    /// Reload and watch timing
    #[serde(default)]
    pub general: GeneralConfig,

    /// Logger settings
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Stylesheet sources and compiled output
    #[serde(default)]
    pub theme: ThemeConfig,

    /// Outputs reported by the headless backend
    #[serde(default)]
    pub outputs: Vec<OutputConfig>,
}

/// Reload timing configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GeneralConfig {
    /// Upper bound for a single reload in milliseconds (0 = unbounded)
    pub reload_timeout_ms: i64,

    /// How long callers wait for a theme to finish applying (milliseconds)
    pub theme_wait_timeout_ms: u64,

    /// Poll files for changes and reload automatically
    pub watch: bool,

    /// File watch poll interval (milliseconds)
    pub watch_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct LoggingConfig {
    /// Minimum level ("trace", "debug", "info", "warn", "error")
    pub level: LogLevel,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ThemeConfig {
    /// Stylesheets combined in order into the output
    pub stylesheets: Vec<PathBuf>,

    /// Compiled stylesheet applied to every surface
    pub output: PathBuf,
}

/// One physical output of the headless backend
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutputConfig {
    /// Connector name ("DP-1", "eDP-1")
    pub connector: String,

    /// Manufacturer as reported by EDID
    pub make: String,

    /// Model as reported by EDID
    pub model: String,

    /// Mode width (pixels)
    pub width: u32,

    /// Mode height (pixels)
    pub height: u32,

    /// Whether the compositor also lists this output
    #[serde(default = "OutputConfig::default_compositor")]
    pub compositor: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            reload_timeout_ms: 10_000,
            theme_wait_timeout_ms: 5_000,
            watch: true,
            watch_interval_ms: Self::default_watch_interval(),
        }
    }
}

impl GeneralConfig {
    fn default_watch_interval() -> u64 {
        500
    }
}

impl Default for ThemeConfig {
    fn default() -> Self {
        Self {
            stylesheets: vec![PathBuf::from("~/.config/baar/style.css")],
            output: PathBuf::from("/tmp/baar/baar.css"),
        }
    }
}

impl OutputConfig {
    fn default_compositor() -> bool {
        true
    }
}

/// Expand a leading `~` to the home directory
pub fn expand_home<P: AsRef<Path>>(path: P) -> Result<PathBuf> {
    let path = path.as_ref();
    match path.strip_prefix("~") {
        Ok(rest) => {
            let home = std::env::var("HOME").context("Failed to get HOME environment variable")?;
            Ok(Path::new(&home).join(rest))
        }
        Err(_) => Ok(path.to_path_buf()),
    }
}

impl BaarConfig {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let expanded_path = expand_home(path)?;

        let contents = fs::read_to_string(&expanded_path)
            .with_context(|| format!("Failed to read config file: {}", expanded_path.display()))?;

        Self::parse(&contents)
            .with_context(|| format!("Failed to parse config file: {}", expanded_path.display()))
    }

    /// Parse and validate configuration text
    pub fn parse(contents: &str) -> Result<Self> {
        let config: BaarConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.general.reload_timeout_ms < 0 {
            anyhow::bail!(
                "Invalid reload_timeout_ms {}: must be 0 (unbounded) or positive",
                self.general.reload_timeout_ms
            );
        }

        if self.general.theme_wait_timeout_ms == 0 {
            anyhow::bail!("Invalid theme_wait_timeout_ms: must be greater than 0");
        }

        if self.general.watch_interval_ms == 0 {
            anyhow::bail!("Invalid watch_interval_ms: must be greater than 0");
        }

        let mut connectors = std::collections::HashSet::new();
        for output in &self.outputs {
            if output.width == 0 || output.height == 0 {
                anyhow::bail!("Invalid mode for output {}: {}x{}", output.connector, output.width, output.height);
            }
            if !connectors.insert(output.connector.as_str()) {
                anyhow::bail!("Duplicate output connector: {}", output.connector);
            }
        }

        Ok(())
    }

    /// Save configuration to a TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        fs::write(path, contents).context("Failed to write configuration file")?;

        Ok(())
    }
}
