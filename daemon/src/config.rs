use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct DaemonConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub suggest: SuggestConfig,
    #[serde(default)]
    pub generator: GeneratorConfig,
    #[serde(default)]
    pub images: ImageConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

impl DaemonConfig {
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path();
        let mut config = if config_path.exists() {
            let raw = fs::read_to_string(&config_path)
                .with_context(|| format!("failed to read config file {}", config_path.display()))?;
            toml::from_str::<DaemonConfig>(&raw)
                .with_context(|| format!("failed to parse TOML from {}", config_path.display()))?
        } else {
            DaemonConfig::default()
        };

        config.apply_env_overrides(|name| env::var(name).ok());
        Ok(config)
    }

    // env wins over the file
    fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        if let Some(key) = non_empty("GEMINI_API_KEY") {
            self.generator.api_key = key;
        }
        if let Some(url) = non_empty("DATABASE_URL") {
            self.store.database_path = database_path_from_url(&url);
        }
        if let Some(addr) = non_empty("AUTONOMY_BIND") {
            self.server.bind_addr = addr;
        }
        if let Some(secret) = non_empty("AUTONOMY_AUTH_SECRET") {
            self.auth.secret = secret;
        }
    }

    pub fn effective_backend(&self) -> GeneratorBackend {
        match self.generator.backend {
            GeneratorBackend::Auto if self.generator.api_key.trim().is_empty() => {
                GeneratorBackend::None
            }
            GeneratorBackend::Auto => GeneratorBackend::Gemini,
            other => other,
        }
    }
}

fn resolve_config_path() -> PathBuf {
    if let Ok(path) = env::var("AUTONOMY_CONFIG") {
        return Path::new(&path).to_path_buf();
    }

    if let Some(base) = dirs::config_dir() {
        return base.join("autonomy").join("config.toml");
    }

    Path::new("/tmp/autonomy.toml").to_path_buf()
}

fn database_path_from_url(url: &str) -> PathBuf {
    let trimmed = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .unwrap_or(url);
    PathBuf::from(trimmed)
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_allowed_origin")]
    pub allowed_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            allowed_origin: default_allowed_origin(),
        }
    }
}

fn default_bind_addr() -> String {
    "127.0.0.1:8000".to_string()
}

fn default_allowed_origin() -> String {
    "*".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct SuggestConfig {
    #[serde(default = "default_count")]
    pub count: usize,
    #[serde(default = "default_static_base")]
    pub static_base: i64,
    #[serde(default = "default_generated_base")]
    pub generated_base: i64,
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    #[serde(default)]
    pub seed: Option<u64>,
}

impl SuggestConfig {
    pub fn validate(&self, table_len: usize) -> Result<()> {
        if table_len == 0 {
            bail!("static suggestion table is empty");
        }
        if self.count == 0 {
            bail!("suggest.count must be at least 1");
        }
        if self.count > table_len {
            bail!(
                "suggest.count is {} but the static table only has {table_len} entries",
                self.count
            );
        }
        if self.static_base.saturating_add(self.count as i64) > self.generated_base {
            bail!(
                "suggest.static_base ({}) + count ({}) overlaps suggest.generated_base ({})",
                self.static_base,
                self.count,
                self.generated_base
            );
        }
        Ok(())
    }
}

impl Default for SuggestConfig {
    fn default() -> Self {
        Self {
            count: default_count(),
            static_base: default_static_base(),
            generated_base: default_generated_base(),
            history_limit: default_history_limit(),
            seed: None,
        }
    }
}

fn default_count() -> usize {
    5
}

fn default_static_base() -> i64 {
    1000
}

fn default_generated_base() -> i64 {
    9000
}

fn default_history_limit() -> usize {
    3
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneratorConfig {
    #[serde(default)]
    pub backend: GeneratorBackend,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_gemini_host")]
    pub gemini_host: String,
    #[serde(default = "default_gemini_model")]
    pub gemini_model: String,
    #[serde(default = "default_ollama_host")]
    pub ollama_host: String,
    #[serde(default)]
    pub ollama_model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            backend: GeneratorBackend::default(),
            api_key: String::new(),
            gemini_host: default_gemini_host(),
            gemini_model: default_gemini_model(),
            ollama_host: default_ollama_host(),
            ollama_model: String::new(),
            temperature: default_temperature(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GeneratorBackend {
    #[default]
    Auto,
    None,
    Gemini,
    Ollama,
}

fn default_gemini_host() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_gemini_model() -> String {
    "gemini-1.5-flash".to_string()
}

fn default_ollama_host() -> String {
    "http://127.0.0.1:11434".to_string()
}

fn default_temperature() -> f32 {
    0.9
}

fn default_timeout_ms() -> u64 {
    5000
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImageConfig {
    #[serde(default = "default_generated_endpoint")]
    pub generated_endpoint: String,
    #[serde(default = "default_placeholder_endpoint")]
    pub placeholder_endpoint: String,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            generated_endpoint: default_generated_endpoint(),
            placeholder_endpoint: default_placeholder_endpoint(),
        }
    }
}

fn default_generated_endpoint() -> String {
    "https://image.pollinations.ai/prompt".to_string()
}

fn default_placeholder_endpoint() -> String {
    "https://loremflickr.com/640/480".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

fn default_database_path() -> PathBuf {
    PathBuf::from("autonomy.sqlite3")
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AuthConfig {
    #[serde(default)]
    pub secret: String,
}
