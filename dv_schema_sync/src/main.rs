//! Command-line entry point

use anyhow::Context;
use clap::Parser;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;

use dv_schema_sync::config::{environment_allows_drop_from_env, load_from_file};
use dv_schema_sync::remote::webapi::NOT_CONFIGURED;
use dv_schema_sync::utils::init_logging;
use dv_schema_sync::{client_from_args, Error, RunArgs, SyncConfig, WebApiClient};

async fn run(args: RunArgs, cancel: CancellationToken) -> anyhow::Result<()> {
    let config = match &args.config {
        Some(path) => load_from_file(path)?,
        None => SyncConfig::default(),
    };
    init_logging(config.logging.as_ref(), args.verbose)?;

    let client = client_from_args(&args, &config, environment_allows_drop_from_env())?;
    let connection = client.options().connection.clone();
    if client.options().apply && !connection.is_configured() {
        return Err(Error::RemoteUnavailable(NOT_CONFIGURED.to_string()).into());
    }

    let store = WebApiClient::new(connection).context("Failed to build the Dataverse client")?;
    let outcome = client.run(&store, &cancel).await?;

    tracing::debug!(
        tables = outcome.analysis.tables.len(),
        has_changes = outcome.plan.has_changes(),
        "Run complete"
    );
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = RunArgs::parse();

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    let result = tokio::select! {
        result = run(args, cancel.clone()) => result,
        _ = cancel.cancelled() => Err(Error::Cancelled.into()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if matches!(e.downcast_ref::<Error>(), Some(Error::Cancelled)) => {
            eprintln!("Operation cancelled.");
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
