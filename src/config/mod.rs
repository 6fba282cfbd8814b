// Configuration management module
// TOML settings stored in the data directory, plus the interactive setup wizard

pub mod interactive;
pub mod settings;

#[cfg(test)]
mod tests;

pub use interactive::{run_interactive_config, show_config};
pub use settings::{
    Config, ConfigError, EmbeddingConfig, EmbeddingProvider, EmptyContextPolicy,
    GenerationConfig, IngestionConfig, OllamaConfig, RetrievalConfig, VectorBackend,
    VectorStoreConfig,
};

/// Get the configuration directory path
#[inline]
pub fn get_config_dir() -> Result<std::path::PathBuf, ConfigError> {
    Config::config_dir()
}
