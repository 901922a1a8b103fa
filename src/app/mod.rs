//! Command orchestration for the `timeshift` binary.

mod context;
mod download;
mod reserve;

use anyhow::Result;
use timeshift_core::NotificationEvent;
use tokio_util::sync::CancellationToken;

use crate::ProcessExit;
use crate::cli::{Args, Command};
use context::RunContext;

/// Runs the selected command, reporting any unhandled error to the webhook.
pub(crate) async fn run(args: Args, cancel: CancellationToken) -> Result<ProcessExit> {
    let ctx = RunContext::build(&args, cancel)?;
    let outcome = match args.command {
        Command::Reserve => reserve::run(&ctx).await,
        Command::Download => download::run(&ctx).await,
    };
    if let Err(err) = &outcome {
        ctx.notifier
            .send(&NotificationEvent::UnhandledError {
                message: format!("{err:#}"),
            })
            .await;
    }
    outcome
}
