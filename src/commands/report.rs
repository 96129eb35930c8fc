use crate::cli::ReportCommand;
use crate::commands::Context;
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use mediashift_catalog::report::archive_report;

pub async fn run(ctx: &Context, command: ReportCommand) -> Result<()> {
    match command {
        ReportCommand::Archive { backend_id } => {
            let backend = ctx.registry.get(backend_id).await.or_raise(|| ErrorKind::Command("report archive"))?;
            let report = archive_report(&ctx.db, backend).await.or_raise(|| ErrorKind::Command("report archive"))?;
            print!("{report}");
        },
    }
    Ok(())
}
