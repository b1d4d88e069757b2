use crate::domain::changelog::ChangeRecord;

const CHANGELOG_INSTRUCTIONS: &str = "---
The above diff is a diff of a commit.
You are a developer and you need to write a concise changelog for this commit.
Write the changelog as valid JSON using exactly this template:
{ \"added\": [], \"changed\": [], \"removed\": [] }
Put each change in the appropriate list as a quoted string.
Include the file name in the change description where applicable. Stay to the point.
If the commit does not contain meaningful changes, leave the lists empty.
";

const SUMMARY_INSTRUCTIONS: &str = "---
The above is a changelog in JSON format.
Write a summary of the changelog as markdown bullet points, one per line.
";

pub fn changelog_prompt(chunk: &str) -> String {
    format!("{chunk}\n{CHANGELOG_INSTRUCTIONS}")
}

pub fn summary_prompt(record: &ChangeRecord) -> String {
    // Serializing a struct of string lists cannot fail.
    let json = serde_json::to_string(record).unwrap_or_default();
    format!("{json}\n{SUMMARY_INSTRUCTIONS}")
}
