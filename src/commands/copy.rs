use crate::cli::CopyArgs;
use crate::commands::Context;
use crate::error::{ErrorKind, Result};
use crate::prompt::TerminalPrompt;
use crate::shutdown::cancel_on_signal;
use exn::ResultExt;
use mediashift_catalog::batch;
use mediashift_transfer::copy::{TransferOptions, TransferSummary, prepare, run_transfer};
use std::sync::Arc;
use std::time::Duration;

pub async fn run(ctx: &Context, args: CopyArgs) -> Result<()> {
    let batch = batch::find(args.batch_id).or_raise(|| ErrorKind::Command("copy"))?;
    let (source, target) =
        prepare(&ctx.registry, args.source, args.target, Arc::new(TerminalPrompt)).await.or_raise(|| ErrorKind::Command("copy"))?;

    let options = TransferOptions {
        skip_existing: args.skip_existing,
        commit_threshold: ctx.config.transfer.commit_threshold,
        commit_interval: Duration::from_secs(ctx.config.transfer.commit_interval_secs),
        dry_run: args.dry_run,
        ..TransferOptions::default()
    };
    cancel_on_signal(options.cancel.clone());

    let summary =
        run_transfer(&ctx.db, &source, &target, batch, &options).await.or_raise(|| ErrorKind::Command("copy"))?;
    println!("{}", summary_line(&summary));
    Ok(())
}

fn summary_line(summary: &TransferSummary) -> String {
    let mut line = format!(
        "{} of {} objects transferred ({} bytes), {} skipped, {} failed, {} placements committed",
        summary.transferred, summary.discovered, summary.bytes, summary.skipped, summary.failed, summary.committed,
    );
    if summary.interrupted {
        line.push_str("; interrupted, run again to resume");
    }
    line
}
