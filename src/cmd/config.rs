use std::io::{self, Write};
use std::str::FromStr;

use clap::{Args, Subcommand};

use crate::config::{
    DEFAULT_BASE_URL, DEFAULT_MAX_CHUNK_LENGTH, DEFAULT_MAX_OUTPUT_TOKENS, DEFAULT_MIN_DIFF_LENGTH,
    DEFAULT_MODEL, StoredConfig, config_file_path,
};
use crate::error::{AppError, AppResult};

#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigCommand {
    /// Run the interactive configuration wizard.
    Init,
    /// Show the stored configuration (secrets masked).
    Show,
}

pub fn run(command: ConfigCommand) -> AppResult<()> {
    match command {
        ConfigCommand::Init => run_init(),
        ConfigCommand::Show => run_show(),
    }
}

fn run_init() -> AppResult<()> {
    let mut cfg = StoredConfig::load()?;

    println!("Configuring diffwizard.");
    println!("Press Enter to keep the current value, '-' to clear it.");
    println!("Secrets are stored in the local config file; protect your filesystem accordingly.");
    println!();

    apply_prompt("OpenAI API key", &mut cfg.openai_api_key, true)?;
    apply_prompt(
        "Completion endpoint base URL",
        &mut cfg.openai_base_url,
        false,
    )?;
    apply_prompt("Model", &mut cfg.model, false)?;
    apply_number_prompt("Max output tokens per call", &mut cfg.max_output_tokens)?;
    apply_number_prompt("Max chunk length (bytes)", &mut cfg.max_chunk_length)?;
    apply_number_prompt(
        "Skip model calls for chunks shorter than (0 disables)",
        &mut cfg.min_diff_length,
    )?;

    if cfg.max_chunk_length == Some(0) {
        return Err(AppError::Configuration(
            "max chunk length must be greater than zero".to_string(),
        ));
    }

    cfg.save()?;

    let path = config_file_path()?;
    println!("\nConfiguration saved to {}", path.display());
    Ok(())
}

fn run_show() -> AppResult<()> {
    let cfg = StoredConfig::load()?;
    let path = config_file_path()?;

    println!("Configuration file: {}", path.display());
    println!("OpenAI API key: {}", mask_secret(&cfg.openai_api_key));
    println!(
        "Base URL: {}",
        display_value(&cfg.openai_base_url, DEFAULT_BASE_URL)
    );
    println!("Model: {}", display_value(&cfg.model, DEFAULT_MODEL));
    println!(
        "Max output tokens: {}",
        display_number(cfg.max_output_tokens, DEFAULT_MAX_OUTPUT_TOKENS)
    );
    println!(
        "Max chunk length: {}",
        display_number(cfg.max_chunk_length, DEFAULT_MAX_CHUNK_LENGTH)
    );
    println!(
        "Min diff length: {}",
        display_number(cfg.min_diff_length, DEFAULT_MIN_DIFF_LENGTH)
    );

    Ok(())
}

fn apply_prompt(field: &str, target: &mut Option<String>, secret: bool) -> AppResult<()> {
    match prompt(field, target.as_deref(), secret)? {
        PromptAction::Keep => {}
        PromptAction::Clear => *target = None,
        PromptAction::Set(value) => *target = Some(value),
    }
    Ok(())
}

fn apply_number_prompt<T>(field: &str, target: &mut Option<T>) -> AppResult<()>
where
    T: FromStr + ToString,
{
    let current = target.as_ref().map(ToString::to_string);
    match prompt(field, current.as_deref(), false)? {
        PromptAction::Keep => {}
        PromptAction::Clear => *target = None,
        PromptAction::Set(value) => {
            let parsed = value.parse::<T>().map_err(|_| {
                AppError::Configuration(format!("'{value}' is not a valid number for {field}"))
            })?;
            *target = Some(parsed);
        }
    }
    Ok(())
}

fn prompt(field: &str, current: Option<&str>, secret: bool) -> AppResult<PromptAction> {
    let mut stdout = io::stdout();

    match (current, secret) {
        (Some(_), true) => write!(stdout, "{field} [****] (Enter to keep, '-' to clear): ")?,
        (Some(value), false) => {
            write!(stdout, "{field} [{value}] (Enter to keep, '-' to clear): ")?
        }
        (None, _) => write!(stdout, "{field} (Enter to skip): ")?,
    }
    stdout.flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(parse_input(&input))
}

fn parse_input(input: &str) -> PromptAction {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        PromptAction::Keep
    } else if trimmed == "-" {
        PromptAction::Clear
    } else {
        PromptAction::Set(trimmed.to_string())
    }
}

fn display_value(value: &Option<String>, default: &str) -> String {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .map(|v| v.to_string())
        .unwrap_or_else(|| format!("{default} (default)"))
}

fn display_number<T: ToString>(value: Option<T>, default: T) -> String {
    match value {
        Some(value) => value.to_string(),
        None => format!("{} (default)", default.to_string()),
    }
}

fn mask_secret(value: &Option<String>) -> String {
    match value {
        Some(token) if token.len() > 6 && token.is_ascii() => {
            let prefix = &token[..3];
            let suffix = &token[token.len() - 3..];
            format!("{prefix}***{suffix}")
        }
        Some(token) if !token.is_empty() => "***".to_string(),
        _ => "<not set>".to_string(),
    }
}

#[derive(Debug, PartialEq, Eq)]
enum PromptAction {
    Keep,
    Clear,
    Set(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_secrets() {
        assert_eq!(mask_secret(&Some("sk-abcdef123".to_string())), "sk-***123");
        assert_eq!(mask_secret(&Some("short".to_string())), "***");
        assert_eq!(mask_secret(&None), "<not set>");
    }

    #[test]
    fn interprets_prompt_input() {
        assert_eq!(parse_input("\n"), PromptAction::Keep);
        assert_eq!(parse_input(" - \n"), PromptAction::Clear);
        assert_eq!(
            parse_input("gpt-4o\n"),
            PromptAction::Set("gpt-4o".to_string())
        );
    }

    #[test]
    fn shows_defaults_for_unset_values() {
        assert_eq!(display_value(&None, "gpt-4o-mini"), "gpt-4o-mini (default)");
        assert_eq!(display_number(Some(10usize), 2000), "10");
        assert_eq!(display_number(None, 2000usize), "2000 (default)");
    }
}
