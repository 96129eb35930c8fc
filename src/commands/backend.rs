use crate::cli::{CreateBackendCommand, ListCommand};
use crate::commands::Context;
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use mediashift_catalog::BackendRecord;
use mediashift_catalog::batch::BATCHES;
use mediashift_catalog::report::truncate;

pub async fn list(ctx: &Context, command: ListCommand) -> Result<()> {
    match command {
        ListCommand::Backends => {
            let backends = ctx.registry.list().await.or_raise(|| ErrorKind::Command("list backends"))?;
            print!("{}", backend_table(&backends));
        },
        ListCommand::Batches => {
            println!("{:>4}  {:<6} {:<14} DESCRIPTION", "ID", "MEDIA", "TARGET");
            for batch in BATCHES {
                println!("{:>4}  {:<6} {:<14} {}", batch.id, batch.media_type.to_string(), batch.target_label, batch.description);
            }
        },
    }
    Ok(())
}

fn backend_table(backends: &[BackendRecord]) -> String {
    let mut table = format!("{:>4}  {:<16} {:>8}  {:<40} {:<14} NOTES\n", "ID", "KIND", "PRIORITY", "LOCATION", "LABEL");
    for backend in backends {
        table.push_str(&format!(
            "{:>4}  {:<16} {:>8}  {:<40} {:<14} {}\n",
            backend.storage_id,
            backend.kind.as_str(),
            backend.priority,
            truncate(&backend.location, 40),
            truncate(backend.device_label.as_deref().unwrap_or("-"), 14),
            backend.notes,
        ));
    }
    table
}

pub async fn create(ctx: &Context, command: CreateBackendCommand) -> Result<()> {
    let record = match command {
        CreateBackendCommand::Local { priority, notes, path, label } => ctx
            .registry
            .provision_local(&path, priority, &notes, label.as_deref())
            .await
            .or_raise(|| ErrorKind::Command("create-backend local"))?,
        CreateBackendCommand::ObjectStore { priority, notes, url } => ctx
            .registry
            .provision_object_store(&url, priority, &notes)
            .await
            .or_raise(|| ErrorKind::Command("create-backend object-store"))?,
    };
    println!("{}", record.storage_id);
    Ok(())
}

pub async fn set_notes(ctx: &Context, backend_id: i64, notes: &str) -> Result<()> {
    ctx.registry.set_notes(backend_id, notes).await.or_raise(|| ErrorKind::Command("set-notes"))
}
