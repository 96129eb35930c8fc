mod cli;
mod commands;
mod error;
mod prompt;
mod shutdown;

use crate::cli::{Cli, Command};
use crate::commands::Context;
use crate::error::report;
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> miette::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let ctx = Context::open(cli.config.as_deref(), cli.database.as_deref()).await.map_err(report)?;
    let result = match cli.command {
        Command::List(command) => commands::backend::list(&ctx, command).await,
        Command::CreateBackend(command) => commands::backend::create(&ctx, command).await,
        Command::SetNotes { backend_id, notes } => commands::backend::set_notes(&ctx, backend_id, &notes).await,
        Command::Copy(args) => commands::copy::run(&ctx, args).await,
        Command::Rescale(args) => commands::rescale::run(&ctx, args).await,
        Command::Report(command) => commands::report::run(&ctx, command).await,
    };
    ctx.close().await;
    result.map_err(report)
}

/// Logs go to stderr; stdout is reserved for command output.
fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let directives = format!(
        "warn,mediashift={level},mediashift_catalog={level},mediashift_storage={level},mediashift_transfer={level}"
    );
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives)))
        .with_writer(std::io::stderr)
        .init();
}
