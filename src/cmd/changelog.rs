use crate::context::AppContext;
use crate::error::AppResult;
use crate::services::version_control::RevisionRange;
use crate::workflow::changelog::{
    CancellationFlag, ChangelogRequest, ChangelogRun, generate_changelog,
};

#[derive(Debug, Clone)]
pub struct ChangelogCommandArgs {
    pub from: String,
    pub to: String,
    pub persist: bool,
    pub local_summary: bool,
}

pub async fn run(
    ctx: &AppContext,
    args: ChangelogCommandArgs,
    cancel: &CancellationFlag,
) -> AppResult<ChangelogRun> {
    let request = ChangelogRequest {
        range: RevisionRange::new(args.from, args.to),
        persist: args.persist,
        model_summary: !args.local_summary,
    };
    generate_changelog(ctx, request, cancel).await
}
