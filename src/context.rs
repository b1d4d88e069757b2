use std::sync::Arc;

use crate::config::AppConfig;
use crate::services::{ChangelogStore, LanguageModelService, VersionControlService};

#[derive(Clone)]
pub struct AppContext {
    pub config: AppConfig,
    pub version_control: Arc<dyn VersionControlService>,
    pub language_model: Arc<dyn LanguageModelService>,
    pub changelog_store: Arc<dyn ChangelogStore>,
}

impl AppContext {
    pub fn new(
        config: AppConfig,
        version_control: Arc<dyn VersionControlService>,
        language_model: Arc<dyn LanguageModelService>,
        changelog_store: Arc<dyn ChangelogStore>,
    ) -> Self {
        Self {
            config,
            version_control,
            language_model,
            changelog_store,
        }
    }
}
