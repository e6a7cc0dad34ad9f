//! Layered configuration and path helpers.
//!
//! Uses Figment to merge built-in defaults + `config.toml` + `config.<env>.toml`
//! + `APP_*` env vars (nested keys split on `__`, e.g. `APP_LOCAL__API_KEY`).
//! Provides helpers to expand `~` and `${VAR}` and to resolve relative paths
//! against a known base directory.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment, Provider as FigmentProvider,
};
use serde::{Deserialize, Deserializer, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::types::SearchMode;

/// Which AI stack serves embeddings and generation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Any OpenAI-compatible HTTP API (OpenAI, Ollama, LM Studio, vLLM).
    #[default]
    Local,
    /// Google Vertex AI.
    Managed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RankingMode {
    Similarity,
    #[default]
    Mmr,
}

/// Kind of data store behind the remote search service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    #[default]
    Unstructured,
    Structured,
    Website,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalBackendSettings {
    pub base_url: String,
    pub api_key: Option<String>,
    pub embedding_model: String,
    pub chat_model: String,
    pub temperature: f32,
}

impl Default for LocalBackendSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            embedding_model: "text-embedding-3-small".to_string(),
            chat_model: "gpt-3.5-turbo".to_string(),
            temperature: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagedBackendSettings {
    /// Overrides `https://<location>-aiplatform.googleapis.com/v1`.
    pub endpoint: Option<String>,
    pub project_id: Option<String>,
    pub location: String,
    pub access_token: Option<String>,
    pub embedding_model: String,
    pub chat_model: String,
    pub temperature: f32,
}

impl Default for ManagedBackendSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            project_id: None,
            location: "us-central1".to_string(),
            access_token: None,
            embedding_model: "text-embedding-004".to_string(),
            chat_model: "gemini-1.5-pro".to_string(),
            temperature: 0.0,
        }
    }
}

impl ManagedBackendSettings {
    pub fn base_url(&self) -> String {
        match &self.endpoint {
            Some(e) => e.trim_end_matches('/').to_string(),
            None => format!("https://{}-aiplatform.googleapis.com/v1", self.location),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteSearchSettings {
    pub endpoint: String,
    pub project_id: Option<String>,
    pub location: String,
    pub data_store_id: Option<String>,
    pub serving_config: String,
    pub access_token: Option<String>,
    pub content_type: ContentType,
}

impl Default for RemoteSearchSettings {
    fn default() -> Self {
        Self {
            endpoint: "https://discoveryengine.googleapis.com/v1".to_string(),
            project_id: None,
            location: "global".to_string(),
            data_store_id: None,
            serving_config: "default_search".to_string(),
            access_token: None,
            content_type: ContentType::Unstructured,
        }
    }
}

impl RemoteSearchSettings {
    /// The remote path is selected only when a data store is named.
    pub fn is_enabled(&self) -> bool {
        self.data_store_id.as_deref().is_some_and(|s| !s.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self { timeout_secs: 30, max_retries: 3, initial_backoff_ms: 500, max_backoff_ms: 8_000 }
    }
}

/// Typed view of every recognised option.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub provider: Provider,
    pub persist_location: String,
    pub data_directory: String,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
    pub ranking_mode: RankingMode,
    pub mmr_lambda: f32,
    pub mmr_fetch_k: usize,
    #[serde(deserialize_with = "lenient_bool")]
    pub use_fake_embeddings: bool,
    pub embedding_batch_size: usize,
    pub local: LocalBackendSettings,
    pub managed: ManagedBackendSettings,
    pub remote_search: RemoteSearchSettings,
    pub http: HttpSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            provider: Provider::Local,
            persist_location: "./index_db".to_string(),
            data_directory: "./data/docs".to_string(),
            chunk_size: 1000,
            chunk_overlap: 200,
            top_k: 5,
            ranking_mode: RankingMode::Mmr,
            mmr_lambda: 0.5,
            mmr_fetch_k: 20,
            use_fake_embeddings: false,
            embedding_batch_size: 64,
            local: LocalBackendSettings::default(),
            managed: ManagedBackendSettings::default(),
            remote_search: RemoteSearchSettings::default(),
            http: HttpSettings::default(),
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::InvalidConfig("chunk_size must be greater than 0".into()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(Error::InvalidConfig(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.top_k == 0 {
            return Err(Error::InvalidConfig("top_k must be greater than 0".into()));
        }
        if !(0.0..=1.0).contains(&self.mmr_lambda) {
            return Err(Error::InvalidConfig(format!("mmr_lambda must be within [0, 1], got {}", self.mmr_lambda)));
        }
        if self.mmr_fetch_k == 0 || self.embedding_batch_size == 0 {
            return Err(Error::InvalidConfig("mmr_fetch_k and embedding_batch_size must be greater than 0".into()));
        }
        if self.http.timeout_secs == 0 {
            return Err(Error::InvalidConfig("http.timeout_secs must be greater than 0".into()));
        }
        Ok(())
    }

    pub fn search_mode(&self) -> SearchMode {
        match self.ranking_mode {
            RankingMode::Similarity => SearchMode::Similarity,
            RankingMode::Mmr => SearchMode::Mmr { lambda: self.mmr_lambda, fetch_k: self.mmr_fetch_k },
        }
    }

    /// Index location, resolved against the working directory.
    pub fn persist_path(&self) -> PathBuf {
        resolve_with_base(&working_dir(), &self.persist_location)
    }

    /// Loader input directory, resolved against the working directory.
    pub fn data_path(&self) -> PathBuf {
        resolve_with_base(&working_dir(), &self.data_directory)
    }
}

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
        let config = Self::for_env(&env_name);
        config.settings()?;
        Ok(config)
    }

    pub fn for_env(env_name: &str) -> Self {
        let mut figment = Figment::from(Serialized::defaults(Settings::default())).merge(Toml::file("config.toml"));
        match env_name {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));
        Self { figment }
    }

    /// Layer another provider (e.g. command-line overrides) on top.
    #[must_use]
    pub fn merge(self, provider: impl FigmentProvider) -> Self {
        Self { figment: self.figment.merge(provider) }
    }

    pub fn get<T>(&self, key: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| Error::InvalidConfig(format!("Failed to get '{key}': {e}")))
    }

    pub fn settings(&self) -> Result<Settings> {
        let settings: Settings = self
            .figment
            .extract()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }
}

fn working_dir() -> PathBuf {
    env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

/// Accepts `true`/`false`, `1`/`0` and their string forms.
fn lenient_bool<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
        Str(String),
    }
    match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => Ok(b),
        Flag::Int(i) => Ok(i != 0),
        Flag::Str(s) => match s.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" | "" => Ok(false),
            other => Err(serde::de::Error::custom(format!("invalid boolean '{other}'"))),
        },
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let s = Settings::default();
        s.validate().expect("defaults validate");
        assert_eq!(s.search_mode(), SearchMode::Mmr { lambda: 0.5, fetch_k: 20 });
        assert!(!s.remote_search.is_enabled());
    }

    #[test]
    fn overlap_must_be_smaller_than_size() {
        let s = Settings { chunk_size: 100, chunk_overlap: 100, ..Settings::default() };
        assert!(matches!(s.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn resolve_keeps_absolute_paths() {
        let base = Path::new("/base");
        assert_eq!(resolve_with_base(base, "/abs/dir"), PathBuf::from("/abs/dir"));
        assert_eq!(resolve_with_base(base, "rel"), PathBuf::from("/base/rel"));
    }
}
