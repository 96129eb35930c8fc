use crate::cli::RescaleArgs;
use crate::commands::Context;
use crate::error::{ErrorKind, Result};
use crate::prompt::TerminalPrompt;
use crate::shutdown::cancel_on_signal;
use exn::ResultExt;
use mediashift_transfer::rescale::{RescaleOptions, RescaleProfile, run_rescale};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub async fn run(ctx: &Context, args: RescaleArgs) -> Result<()> {
    let source_id = args.source.unwrap_or(args.target);
    let target = ctx.registry.resolve(args.target, Arc::new(TerminalPrompt)).await.or_raise(|| ErrorKind::Command("rescale"))?;
    let source = match source_id == args.target {
        true => target.clone(),
        false => ctx.registry.resolve(source_id, Arc::new(TerminalPrompt)).await.or_raise(|| ErrorKind::Command("rescale"))?,
    };

    let config = &ctx.config;
    let options = RescaleOptions {
        profile: RescaleProfile {
            max_width: config.rescale.max_width,
            max_height: config.rescale.max_height,
            quality: config.rescale.quality,
        },
        workers: config.rescale.workers,
        remove_original: args.remove,
        commit_threshold: config.transfer.commit_threshold,
        commit_interval: Duration::from_secs(config.transfer.commit_interval_secs),
        ..RescaleOptions::default()
    };
    cancel_on_signal(options.cancel.clone());

    let summary = run_rescale(&ctx.db, &source, &target, args.deployment_id, &options)
        .await
        .or_raise(|| ErrorKind::Command("rescale"))?;
    if args.remove {
        write_deletion_list(&summary.deletions, args.deletion_list.as_deref())?;
    }
    eprintln!(
        "{} of {} images rescaled ({} -> {} bytes), {} failed, {} placements committed{}",
        summary.rescaled,
        summary.discovered,
        summary.bytes_in,
        summary.bytes_out,
        summary.failed,
        summary.committed,
        if summary.interrupted { "; interrupted, run again to resume" } else { "" },
    );
    Ok(())
}

/// One location per line, to a file or standard output.
fn write_deletion_list(deletions: &[String], path: Option<&Path>) -> Result<()> {
    let mut contents = deletions.join("\n");
    if !contents.is_empty() {
        contents.push('\n');
    }
    match path {
        Some(path) => {
            std::fs::write(path, contents).or_raise(|| ErrorKind::Output)?;
            tracing::info!(path = %path.display(), entries = deletions.len(), "deletion list written");
        },
        None => std::io::stdout().write_all(contents.as_bytes()).or_raise(|| ErrorKind::Output)?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_deletion_list() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("deletions.txt");
        let deletions = vec!["s3://s3.example.org/traps/a.png".to_string(), "/mnt/archive/b.png".to_string()];
        write_deletion_list(&deletions, Some(&path)).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "s3://s3.example.org/traps/a.png\n/mnt/archive/b.png\n");

        write_deletion_list(&[], Some(&path)).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");
    }
}
