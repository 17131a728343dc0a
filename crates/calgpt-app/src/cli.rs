//! CLI argument definitions for the CalGPT server.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::Parser;
use std::path::PathBuf;

use calgpt_core::config::CalgptConfig;
use calgpt_core::error::CalgptError;

/// Configuration resolved at startup.
///
/// Loading happens before tracing is installed, so a load failure is kept
/// here and reported once the subscriber exists.
#[derive(Debug)]
pub struct LoadedConfig {
    pub path: PathBuf,
    pub config: CalgptConfig,
    pub load_error: Option<CalgptError>,
}

/// CalGPT - answers course questions by running a query process per request.
#[derive(Parser, Debug, Default)]
#[command(name = "calgpt", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// API server port.
    #[arg(short = 'p', long = "port")]
    pub port: Option<u16>,

    /// Address to bind the API server to.
    #[arg(short = 'b', long = "bind")]
    pub bind: Option<String>,

    /// Executable that answers queries (e.g. a specific python interpreter).
    #[arg(long = "program")]
    pub program: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > CALGPT_CONFIG env var > ~/.calgpt/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("CALGPT_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the API server port.
    ///
    /// Priority: --port flag > CALGPT_PORT env var > config file value.
    pub fn resolve_port(&self, config_port: u16) -> u16 {
        self.resolve_port_from(std::env::var("CALGPT_PORT").ok(), config_port)
    }

    fn resolve_port_from(&self, env_port: Option<String>, config_port: u16) -> u16 {
        if let Some(p) = self.port {
            return p;
        }
        if let Some(p) = env_port.and_then(|v| v.parse::<u16>().ok()) {
            return p;
        }
        config_port
    }

    /// Resolve the query program.
    ///
    /// Priority: --program flag > CALGPT_PROGRAM env var > config file value.
    pub fn resolve_program(&self, config_program: &str) -> String {
        self.resolve_program_from(std::env::var("CALGPT_PROGRAM").ok(), config_program)
    }

    fn resolve_program_from(&self, env_program: Option<String>, config_program: &str) -> String {
        self.program
            .clone()
            .or_else(|| env_program.filter(|p| !p.trim().is_empty()))
            .unwrap_or_else(|| config_program.to_string())
    }

    /// Load the config file (defaults if it cannot be read or parsed) and
    /// apply the overrides.
    pub fn load_config(&self) -> LoadedConfig {
        let path = self.resolve_config_path();
        let (mut config, load_error) = match CalgptConfig::load(&path) {
            Ok(config) => (config, None),
            Err(e) => (CalgptConfig::default(), Some(e)),
        };
        self.apply(&mut config);
        LoadedConfig {
            path,
            config,
            load_error,
        }
    }

    /// Apply every override to a loaded configuration.
    pub fn apply(&self, config: &mut CalgptConfig) {
        config.general.port = self.resolve_port(config.general.port);
        config.bridge.program = self.resolve_program(&config.bridge.program);
        if let Some(ref bind) = self.bind {
            config.general.bind_address = bind.clone();
        }
        if let Some(ref level) = self.log_level {
            config.general.log_level = level.clone();
        }
    }
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".calgpt").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".calgpt").join("config.toml");
    }
    PathBuf::from("config.toml")
}
