//! Shared plumbing for the command line tools
//!
//! Every tool reads the same optional TOML file:
//!
//! ```toml
//! threads = 8
//!
//! [engine]
//! hash_mb = 256
//! "Move Overhead" = 50
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use rsearch_core::options::CoreOptions;
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    /// Search threads to map onto nodes; 0 means one per core
    pub threads: usize,
    pub engine: CoreOptions,
}

impl ToolConfig {
    pub fn parse(text: &str) -> Result<Self> {
        toml::from_str(text).context("invalid tool config")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("in {}", path.display()))
    }

    /// `load` when a path is given, defaults otherwise
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        path.map_or_else(|| Ok(Self::default()), Self::load)
    }
}

pub fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_engine_table() {
        let config = ToolConfig::parse("threads = 6\n[engine]\nhash_mb = 64\n\"Move Overhead\" = 10\n").unwrap();
        assert_eq!(config.threads, 6);
        assert_eq!(config.engine.hash_mb, 64);
        assert_eq!(config.engine.move_overhead, 10);
        assert!(!config.engine.ponder);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ToolConfig::load(&dir.path().join("absent.toml")).unwrap_err();
        assert!(err.to_string().contains("absent.toml"));
    }

    #[test]
    fn test_default_without_path() {
        let config = ToolConfig::load_or_default(None).unwrap();
        assert_eq!(config.threads, 0);
        assert_eq!(config.engine, CoreOptions::default());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tools.toml");
        std::fs::write(&path, "[engine]\nPonder = true\n").unwrap();
        let config = ToolConfig::load_or_default(Some(&path)).unwrap();
        assert!(config.engine.ponder);
    }

    #[test]
    fn test_rejects_bad_types() {
        assert!(ToolConfig::parse("threads = \"many\"").is_err());
    }
}
