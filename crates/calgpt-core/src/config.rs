use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CalgptError, Result};

/// Top-level configuration for the CalGPT query bridge.
///
/// Loaded from `~/.calgpt/config.toml` by default. Every section falls back
/// to its defaults when omitted, so an empty file is a valid configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CalgptConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub parser: ParserConfig,
    #[serde(default)]
    pub sessions: SessionConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

impl CalgptConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: CalgptConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Check values that deserialize fine but cannot work at runtime.
    pub fn validate(&self) -> Result<()> {
        if self.bridge.program.trim().is_empty() {
            return Err(CalgptError::Config(
                "bridge.program must not be empty".to_string(),
            ));
        }
        if self.bridge.timeout_secs == 0 {
            return Err(CalgptError::Config(
                "bridge.timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.bridge.max_concurrent == 0 {
            return Err(CalgptError::Config(
                "bridge.max_concurrent must be at least 1".to_string(),
            ));
        }
        if let Some(sentinel) = &self.parser.sentinel {
            if sentinel.trim().is_empty() {
                return Err(CalgptError::Config(
                    "parser.sentinel must not be blank when set".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
    /// Address the HTTP server binds to.
    pub bind_address: String,
    /// HTTP server port.
    pub port: u16,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            bind_address: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

/// How the question is written to the subprocess's stdin.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputMode {
    /// The bare question text.
    #[default]
    Raw,
    /// A JSON object `{"question": ..., "chatHistory": [...]}`.
    Json,
}

/// Answering-process invocation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Executable to spawn (e.g. `python3`).
    pub program: String,
    /// Arguments passed to the executable (e.g. the script path).
    pub args: Vec<String>,
    /// Working directory for the subprocess. Inherits the server's when unset.
    pub working_dir: Option<String>,
    /// Stdin encoding.
    pub input_mode: InputMode,
    /// Hard limit on a single invocation, in seconds.
    pub timeout_secs: u64,
    /// Maximum number of subprocesses running at once.
    pub max_concurrent: usize,
    /// How long a request may wait for a free slot, in seconds.
    pub queue_timeout_secs: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            program: "python3".to_string(),
            args: vec!["query.py".to_string()],
            working_dir: None,
            input_mode: InputMode::Raw,
            timeout_secs: 60,
            max_concurrent: 4,
            queue_timeout_secs: 30,
        }
    }
}

impl BridgeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn queue_timeout(&self) -> Duration {
        Duration::from_secs(self.queue_timeout_secs)
    }
}

/// Output parser settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Line that separates diagnostics from the answer object. When the
    /// process prints it, everything after the last occurrence is the answer.
    pub sentinel: Option<String>,
    /// Fall back to searching for the last `{"text":` marker.
    pub marker_fallback: bool,
    /// Number of characters of output included in log previews.
    pub preview_chars: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            sentinel: None,
            marker_fallback: true,
            preview_chars: 200,
        }
    }
}

/// Conversation session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Idle minutes after which a session is purged.
    pub timeout_minutes: u32,
    /// Maximum number of live sessions.
    pub max_sessions: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout_minutes: 30,
            max_sessions: 1000,
        }
    }
}

/// HTTP server limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Maximum accepted request body size in bytes.
    pub max_body_bytes: usize,
    /// Allowed CORS origins. Empty allows localhost on the configured port.
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: 64 * 1024,
            cors_origins: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = CalgptConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.general.port, 3000);
        assert_eq!(config.bridge.program, "python3");
        assert_eq!(config.bridge.args, vec!["query.py"]);
        assert_eq!(config.bridge.input_mode, InputMode::Raw);
        assert_eq!(config.bridge.timeout_secs, 60);
        assert_eq!(config.bridge.max_concurrent, 4);
        assert!(config.parser.sentinel.is_none());
        assert!(config.parser.marker_fallback);
        assert_eq!(config.parser.preview_chars, 200);
        assert_eq!(config.sessions.timeout_minutes, 30);
        assert_eq!(config.server.max_body_bytes, 65536);
    }

    #[test]
    fn test_load_valid_config() {
        let content = r#"
[general]
log_level = "debug"
port = 8080

[bridge]
program = "/app/.heroku/python/bin/python"
args = ["/app/query.py"]
working_dir = "/app"
input_mode = "json"
timeout_secs = 15
max_concurrent = 2

[parser]
sentinel = "@@ANSWER@@"
marker_fallback = false
"#;
        let file = create_temp_config(content);
        let config = CalgptConfig::load(file.path()).unwrap();
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.general.port, 8080);
        assert_eq!(config.bridge.program, "/app/.heroku/python/bin/python");
        assert_eq!(config.bridge.working_dir.as_deref(), Some("/app"));
        assert_eq!(config.bridge.input_mode, InputMode::Json);
        assert_eq!(config.bridge.timeout(), Duration::from_secs(15));
        assert_eq!(config.bridge.max_concurrent, 2);
        // Unspecified field in a present section keeps its default.
        assert_eq!(config.bridge.queue_timeout_secs, 30);
        assert_eq!(config.parser.sentinel.as_deref(), Some("@@ANSWER@@"));
        assert!(!config.parser.marker_fallback);
    }

    #[test]
    fn test_load_partial_config_uses_defaults() {
        let file = create_temp_config("[general]\nlog_level = \"warn\"\n");
        let config = CalgptConfig::load(file.path()).unwrap();
        assert_eq!(config.general.log_level, "warn");
        assert_eq!(config.bridge.program, "python3");
        assert_eq!(config.sessions.max_sessions, 1000);
    }

    #[test]
    fn test_config_empty_toml_uses_all_defaults() {
        let file = create_temp_config("");
        let config = CalgptConfig::load(file.path()).unwrap();
        assert_eq!(config.general.bind_address, "127.0.0.1");
        assert_eq!(config.bridge.timeout_secs, 60);
    }

    #[test]
    fn test_load_invalid_toml() {
        let file = create_temp_config("this is {{ not valid TOML");
        assert!(matches!(
            CalgptConfig::load(file.path()),
            Err(CalgptError::Config(_))
        ));
    }

    #[test]
    fn test_unknown_input_mode_rejected() {
        let file = create_temp_config("[bridge]\ninput_mode = \"msgpack\"\n");
        assert!(CalgptConfig::load(file.path()).is_err());
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        assert!(matches!(
            CalgptConfig::load(Path::new("/nonexistent/config.toml")),
            Err(CalgptError::Io(_))
        ));
    }

    #[test]
    fn test_validate_defaults_ok() {
        assert!(CalgptConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = CalgptConfig::default();
        config.bridge.program = "  ".to_string();
        assert!(config.validate().is_err());

        let mut config = CalgptConfig::default();
        config.bridge.timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = CalgptConfig::default();
        config.bridge.max_concurrent = 0;
        assert!(config.validate().is_err());

        let mut config = CalgptConfig::default();
        config.parser.sentinel = Some(String::new());
        assert!(config.validate().is_err());
    }
}
