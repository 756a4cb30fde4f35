use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::domain::{DomainError, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};

pub const DEFAULT_MODEL_NAME: &str = "gemini-1.5-pro";
pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";
pub const DEFAULT_PROMPTS_PATH: &str = "prompts.yaml";
pub const DEFAULT_CREDENTIALS_PATH: &str = "credentials.yaml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub cors: CorsConfig,
    pub llm: LlmConfig,
    pub embedding: EmbeddingConfig,
    pub chunking: ChunkingConfig,
    pub rag: RagConfig,
    pub upload: UploadConfig,
    pub sessions: SessionsConfig,
}

impl Config {
    pub fn from_yaml(yaml: &str) -> Result<Self, DomainError> {
        serde_yaml::from_str(yaml)
            .map_err(|e| DomainError::configuration(format!("invalid config: {e}")))
    }

    /// Reads `path` when it exists, defaults otherwise.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, DomainError> {
        match read_optional(path.as_ref())? {
            Some(yaml) => Self::from_yaml(&yaml),
            None => Ok(Self::default()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub temperature: f32,
    pub top_p: f32,
    /// 0 leaves top-k sampling to the service default.
    pub top_k: u32,
    pub timeout_seconds: u64,
    /// Send the instruction as `systemInstruction` instead of a leading exchange.
    pub native_system_instruction: bool,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            temperature: 0.7,
            top_p: 0.95,
            top_k: 0,
            timeout_seconds: 60,
            native_system_instruction: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Empty means `https://{location}-aiplatform.googleapis.com`.
    pub base_url: String,
    pub location: String,
    pub model: String,
    pub dimension: usize,
    pub batch_size: usize,
    pub timeout_seconds: u64,
}

impl EmbeddingConfig {
    pub fn endpoint_base(&self) -> String {
        if self.base_url.is_empty() {
            format!("https://{}-aiplatform.googleapis.com", self.location)
        } else {
            self.base_url.trim_end_matches('/').to_string()
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            location: "us-central1".to_string(),
            model: "textembedding-gecko@latest".to_string(),
            dimension: 768,
            batch_size: 5,
            timeout_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    pub top_k: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self { top_k: 5 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub max_body_bytes: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: 50 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionsConfig {
    /// Sessions unused this long are dropped. 0 keeps them until deleted.
    pub idle_ttl_seconds: u64,
    pub sweep_interval_seconds: u64,
}

impl SessionsConfig {
    pub fn idle_ttl(&self) -> Option<Duration> {
        (self.idle_ttl_seconds > 0).then(|| Duration::from_secs(self.idle_ttl_seconds))
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds.max(1))
    }
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            idle_ttl_seconds: 60 * 60,
            sweep_interval_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PromptsConfig {
    pub agent: AgentPrompts,
    pub rag: RagPrompts,
}

impl PromptsConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, DomainError> {
        let prompts: Self = serde_yaml::from_str(yaml)
            .map_err(|e| DomainError::configuration(format!("invalid prompts: {e}")))?;
        prompts.rag.validate()?;
        Ok(prompts)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, DomainError> {
        match read_optional(path.as_ref())? {
            Some(yaml) => Self::from_yaml(&yaml),
            None => Ok(Self::default()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentPrompts {
    pub system: String,
    pub acknowledgement: String,
}

impl Default for AgentPrompts {
    fn default() -> Self {
        Self {
            system: "You are a helpful AI assistant. Please remember this in your responses."
                .to_string(),
            acknowledgement:
                "I understand. I'm a helpful AI assistant and will respond accordingly."
                    .to_string(),
        }
    }
}

pub const CONTEXT_PLACEHOLDER: &str = "{context}";

/// `system` must contain a `{context}` placeholder.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RagPrompts {
    pub system: String,
    pub acknowledgement: String,
    pub context_separator: String,
}

impl RagPrompts {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.system.contains(CONTEXT_PLACEHOLDER) {
            Ok(())
        } else {
            Err(DomainError::configuration(format!(
                "rag.system prompt must contain {CONTEXT_PLACEHOLDER}"
            )))
        }
    }

    /// Without a placeholder the context is appended after the template.
    pub fn render(&self, context: &[&str]) -> String {
        let context = context.join(&self.context_separator);
        if self.system.contains(CONTEXT_PLACEHOLDER) {
            self.system.replace(CONTEXT_PLACEHOLDER, &context)
        } else {
            format!("{}\n----------------\n{}", self.system.trim_end(), context)
        }
    }
}

impl Default for RagPrompts {
    fn default() -> Self {
        Self {
            system: "Use the following pieces of context to answer the user's question. \
                     If you don't know the answer, just say that you don't know, \
                     don't try to make up an answer.\n----------------\n{context}"
                .to_string(),
            acknowledgement: "Understood. I will answer using the provided context.".to_string(),
            context_separator: "\n\n".to_string(),
        }
    }
}

/// Static key-value credentials read from `credentials.yaml`.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    values: HashMap<String, String>,
}

impl Credentials {
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, DomainError> {
        let parsed: Option<HashMap<String, serde_yaml::Value>> = serde_yaml::from_str(yaml)
            .map_err(|e| DomainError::configuration(format!("invalid credentials: {e}")))?;

        let values = parsed
            .unwrap_or_default()
            .into_iter()
            .filter_map(|(key, value)| scalar_to_string(value).map(|v| (key, v)))
            .collect();
        Ok(Self { values })
    }

    /// Never fails: a missing or broken file yields empty credentials.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let loaded = std::fs::read_to_string(path)
            .map_err(|e| DomainError::configuration(format!("{}: {e}", path.display())))
            .and_then(|yaml| Self::from_yaml(&yaml));

        match loaded {
            Ok(credentials) => credentials,
            Err(e) => {
                tracing::error!(error = %e, "failed to load credentials");
                Self::default()
            }
        }
    }

    fn non_empty(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn api_key(&self) -> Option<&str> {
        self.non_empty("API_KEY")
    }

    pub fn project_id(&self) -> Option<&str> {
        self.non_empty("PROJECT_ID")
    }

    pub fn model_name(&self) -> &str {
        self.non_empty("AGENT_MODEL_NAME")
            .unwrap_or(DEFAULT_MODEL_NAME)
    }

    pub fn require_api_key(&self) -> Result<&str, DomainError> {
        self.api_key()
            .ok_or_else(|| DomainError::configuration("API Key not found in credentials.yaml"))
    }

    pub fn require_project_id(&self) -> Result<&str, DomainError> {
        self.project_id()
            .ok_or_else(|| DomainError::configuration("PROJECT_ID not found in credentials.yaml"))
    }
}

fn scalar_to_string(value: serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn read_optional(path: &Path) -> Result<Option<String>, DomainError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => Ok(Some(contents)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(DomainError::configuration(format!(
            "{}: {e}",
            path.display()
        ))),
    }
}

#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub config: Config,
    pub prompts: PromptsConfig,
    pub credentials: Credentials,
}

impl AppConfig {
    pub fn new(config: Config, prompts: PromptsConfig, credentials: Credentials) -> Self {
        Self {
            config,
            prompts,
            credentials,
        }
    }

    /// Loads config, prompts and credentials from the paths named by
    /// `CONFIG_PATH`, `PROMPTS_PATH` and `CREDENTIALS_PATH`.
    pub fn load() -> Result<Self, DomainError> {
        let env_or = |key: &str, default: &str| std::env::var(key).unwrap_or_else(|_| default.into());

        let mut config = Config::from_file(env_or("CONFIG_PATH", DEFAULT_CONFIG_PATH))?;
        let prompts = PromptsConfig::from_file(env_or("PROMPTS_PATH", DEFAULT_PROMPTS_PATH))?;
        let credentials = Credentials::load(env_or("CREDENTIALS_PATH", DEFAULT_CREDENTIALS_PATH));

        if let Ok(host) = std::env::var("SERVER_HOST") {
            config.server.host = host;
        }
        if let Ok(port) = std::env::var("SERVER_PORT") {
            config.server.port = port
                .parse()
                .map_err(|_| DomainError::configuration(format!("invalid SERVER_PORT: {port}")))?;
        }

        Ok(Self::new(config, prompts, credentials))
    }
}
