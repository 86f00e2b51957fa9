//! Application configuration
//!
//! Central location for collection and field names used on the wire,
//! plus the JSON-backed `AppConfig` loaded at startup.

use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

// ===== Collections =====

/// Top-level collection holding every deck
pub const DECKS_COLLECTION: &str = "decks";
/// Sub-collection of a deck holding its cards
pub const CARDS_COLLECTION: &str = "cards";
/// Top-level collection of quick memos
pub const MEMOS_COLLECTION: &str = "memos";

// ===== Document fields =====

pub const FIELD_NAME: &str = "name";
pub const FIELD_SLUG: &str = "slug";
/// Owner of a deck. Stored as `userId` for compatibility with existing data.
pub const FIELD_OWNER: &str = "userId";
pub const FIELD_FAVORITE: &str = "favorite";
pub const FIELD_CREATED_AT: &str = "createdAt";
pub const FIELD_UPDATED_AT: &str = "updatedAt";
pub const FIELD_TITLE: &str = "title";
pub const FIELD_DATE: &str = "date";
pub const FIELD_CONTENT: &str = "content";
pub const FIELD_TEXT: &str = "text";

/// Calendar date format for card dates
pub const CARD_DATE_FORMAT: &str = "%Y-%m-%d";

/// Log filter used when neither RUST_LOG nor the config file sets one
pub const DEFAULT_LOG_FILTER: &str = "memomingle=debug,info";

/// Which document store backs the application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Sqlite,
    Memory,
}

/// Application configuration, persisted as JSON
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_backend")]
    pub backend: StoreBackend,
    #[serde(default = "default_database_file")]
    pub database_file: String,
    /// Overrides the built-in log filter when RUST_LOG is unset
    #[serde(default)]
    pub log_filter: Option<String>,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_backend() -> StoreBackend {
    StoreBackend::Sqlite
}

fn default_database_file() -> String {
    "memomingle.db".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            backend: default_backend(),
            database_file: default_database_file(),
            log_filter: None,
        }
    }
}

impl AppConfig {
    /// Load config from disk or write the defaults if it does not exist
    pub async fn load(path: &Path) -> Result<AppConfig> {
        if !path.exists() {
            tracing::info!("Config file not found, writing defaults to {:?}", path);
            let default = AppConfig::default();
            default.save(path).await?;
            return Ok(default);
        }

        let content = fs::read_to_string(path).await?;
        let config: AppConfig = serde_json::from_str(&content)
            .map_err(|e| AppError::Generic(format!("Failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Save config to disk
    pub async fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| AppError::Generic(format!("Failed to serialize config: {}", e)))?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        fs::write(path, content).await?;
        tracing::info!("Config saved to {:?}", path);

        Ok(())
    }

    /// Full path of the SQLite database file
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_file)
    }

    pub fn log_filter(&self) -> &str {
        self.log_filter.as_deref().unwrap_or(DEFAULT_LOG_FILTER)
    }
}
