use std::env;
use std::time::Duration;

/// Process-wide pipeline configuration, loaded once at startup and passed
/// by injection into each component. No ambient env lookups happen inside
/// business logic.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// When false the report generator never performs a network call.
    pub use_external_report_generator: bool,
    /// Hard deadline for the analysis backend subprocess.
    pub model_timeout: Duration,
    /// Hard deadline for the external report call. Must stay below the
    /// HTTP client's own patience so the endpoint always answers first.
    pub report_timeout: Duration,
    /// Argv of the analysis backend; the image path, x-ray type and
    /// patient JSON are appended at invocation time.
    pub model_command: Vec<String>,
    pub report_api_url: String,
    /// Bearer credential for the report API. Never logged.
    pub report_api_key: Option<String>,
    pub report_model: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, String),
    #[error("MODEL_BACKEND_CMD must not be empty")]
    EmptyBackendCommand,
}

const DEFAULT_MODEL_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_REPORT_TIMEOUT_MS: u64 = 20_000;
const DEFAULT_MODEL_COMMAND: &str = "python3 scripts/analyze_xray.py";
const DEFAULT_REPORT_API_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
const DEFAULT_REPORT_MODEL: &str = "deepseek/deepseek-chat";

impl PipelineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let use_external_report_generator =
            env_bool("USE_EXTERNAL_REPORT_GENERATOR", true)?;
        let model_timeout =
            Duration::from_millis(env_ms("MODEL_TIMEOUT_MS", DEFAULT_MODEL_TIMEOUT_MS)?);
        let report_timeout =
            Duration::from_millis(env_ms("REPORT_TIMEOUT_MS", DEFAULT_REPORT_TIMEOUT_MS)?);

        let command_line =
            env::var("MODEL_BACKEND_CMD").unwrap_or_else(|_| DEFAULT_MODEL_COMMAND.to_string());
        let model_command: Vec<String> =
            command_line.split_whitespace().map(str::to_string).collect();
        if model_command.is_empty() {
            return Err(ConfigError::EmptyBackendCommand);
        }

        let report_api_key = env::var("REPORT_API_KEY").ok().filter(|k| !k.is_empty());

        Ok(Self {
            use_external_report_generator,
            model_timeout,
            report_timeout,
            model_command,
            report_api_url: env::var("REPORT_API_URL")
                .unwrap_or_else(|_| DEFAULT_REPORT_API_URL.to_string()),
            report_api_key,
            report_model: env::var("REPORT_MODEL")
                .unwrap_or_else(|_| DEFAULT_REPORT_MODEL.to_string()),
        })
    }
}

fn env_bool(key: &'static str, default: bool) -> Result<bool, ConfigError> {
    match env::var(key) {
        Err(_) => Ok(default),
        Ok(raw) => match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::Invalid(key, raw)),
        },
    }
}

fn env_ms(key: &'static str, default: u64) -> Result<u64, ConfigError> {
    match env::var(key) {
        Err(_) => Ok(default),
        Ok(raw) => match raw.parse::<u64>() {
            Ok(ms) if ms > 0 => Ok(ms),
            _ => Err(ConfigError::Invalid(key, raw)),
        },
    }
}
