pub mod changelog;
pub mod diff;
pub mod prompt;
