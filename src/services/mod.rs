pub mod changelog_store;
pub mod language_model;
pub mod version_control;

pub use changelog_store::ChangelogStore;
pub use language_model::{Completion, LanguageModelService};
pub use version_control::VersionControlService;
