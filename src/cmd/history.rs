use crate::config::AppConfig;
use crate::error::AppResult;
use crate::infra::history::FileChangelogStore;

pub fn run(config: &AppConfig, limit: Option<usize>) -> AppResult<()> {
    let store = FileChangelogStore::new(config.history_file.clone(), config.summary_file.clone());
    let history = store.history()?;

    if history.is_empty() {
        println!("No changelog history in {}", config.history_file.display());
        return Ok(());
    }

    let skip = limit.map_or(0, |limit| history.len().saturating_sub(limit));
    for (timestamp, record) in history.iter().skip(skip) {
        println!("## {timestamp}\n");
        println!("{}", record.to_markdown());
    }
    Ok(())
}
