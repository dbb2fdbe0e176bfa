// Configuration management module
// TOML settings for the embedding server, completion endpoint, chunking and retrieval

pub mod settings;


pub use settings::{
    CompletionConfig, Config, ConfigError, OllamaConfig, RetrievalConfig, StoreConfig,
};

/// Get the application directory path
#[inline]
pub fn get_config_dir() -> Result<std::path::PathBuf, ConfigError> {
    Config::config_dir()
}
