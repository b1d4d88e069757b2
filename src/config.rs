use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

const CONFIG_DIR_NAME: &str = "diffwizard";
const CONFIG_FILE_NAME: &str = "config.json";

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 500;
pub const DEFAULT_MAX_CHUNK_LENGTH: usize = 2000;
pub const DEFAULT_MIN_DIFF_LENGTH: usize = 30;
pub const HISTORY_FILE_NAME: &str = "changelog.json";
pub const SUMMARY_FILE_NAME: &str = "changelog.md";

/// Fully resolved settings for one run, passed explicitly to every client.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub model: String,
    pub max_output_tokens: u32,
    pub max_chunk_length: usize,
    /// Chunks shorter than this skip the model call. Zero disables the shortcut.
    pub min_diff_length: usize,
    pub workspace_root: PathBuf,
    pub history_file: PathBuf,
    pub summary_file: PathBuf,
}

/// Values persisted by `diffwizard config init`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoredConfig {
    pub openai_api_key: Option<String>,
    pub openai_base_url: Option<String>,
    pub model: Option<String>,
    pub max_output_tokens: Option<u32>,
    pub max_chunk_length: Option<usize>,
    pub min_diff_length: Option<usize>,
}

impl StoredConfig {
    pub fn load() -> AppResult<Self> {
        Self::load_from(&config_file_path()?)
    }

    pub fn load_from(path: &Path) -> AppResult<Self> {
        match fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str(&contents)
                .map_err(|err| AppError::Configuration(format!("invalid config file: {err}"))),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(AppError::Io(err)),
        }
    }

    pub fn save(&self) -> AppResult<()> {
        self.save_to(&config_file_path()?)
    }

    pub fn save_to(&self, path: &Path) -> AppResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string_pretty(self)
            .map_err(|err| AppError::Configuration(format!("failed to write config: {err}")))?;
        fs::write(path, data)?;
        Ok(())
    }
}

/// Environment values that override the stored configuration.
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    pub openai_api_key: Option<String>,
    pub openai_base_url: Option<String>,
    pub model: Option<String>,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        let read = |key: &str| env::var(key).ok().filter(|value| !value.trim().is_empty());
        Self {
            openai_api_key: read("OPENAI_API_KEY"),
            openai_base_url: read("DIFFWIZARD_BASE_URL"),
            model: read("DIFFWIZARD_MODEL"),
        }
    }
}

impl AppConfig {
    pub fn load(workspace_root: &Path) -> AppResult<Self> {
        let stored = StoredConfig::load()?;
        Self::resolve(workspace_root, stored, EnvOverrides::from_env())
    }

    pub fn resolve(
        workspace_root: &Path,
        stored: StoredConfig,
        env: EnvOverrides,
    ) -> AppResult<Self> {
        let max_chunk_length = stored
            .max_chunk_length
            .unwrap_or(DEFAULT_MAX_CHUNK_LENGTH);
        if max_chunk_length == 0 {
            return Err(AppError::Configuration(
                "max_chunk_length must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            openai_api_key: env.openai_api_key.or(stored.openai_api_key),
            openai_base_url: env
                .openai_base_url
                .or(stored.openai_base_url)
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: env
                .model
                .or(stored.model)
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            max_output_tokens: stored
                .max_output_tokens
                .unwrap_or(DEFAULT_MAX_OUTPUT_TOKENS),
            max_chunk_length,
            min_diff_length: stored.min_diff_length.unwrap_or(DEFAULT_MIN_DIFF_LENGTH),
            workspace_root: workspace_root.to_path_buf(),
            history_file: workspace_root.join(HISTORY_FILE_NAME),
            summary_file: workspace_root.join(SUMMARY_FILE_NAME),
        })
    }
}

pub fn config_directory() -> AppResult<PathBuf> {
    dirs::config_dir()
        .map(|dir| dir.join(CONFIG_DIR_NAME))
        .ok_or_else(|| {
            AppError::Configuration("unable to locate a configuration directory".to_string())
        })
}

pub fn config_file_path() -> AppResult<PathBuf> {
    Ok(config_directory()?.join(CONFIG_FILE_NAME))
}
