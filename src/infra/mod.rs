pub mod git;
pub mod history;
pub mod llm;
