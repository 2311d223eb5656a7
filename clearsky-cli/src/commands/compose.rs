//! Compose command - run one composite job locally, without a queue.

use std::path::PathBuf;

use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::info;

use clearsky::grid::Window;
use clearsky::job::{destination_for, CompositeJob};

use super::common::{build_worker, WorkerArgs};
use crate::error::CliError;
use crate::runner::CliRunner;

/// Arguments for the compose command.
#[derive(Debug, Clone, Default, Args)]
pub struct ComposeArgs {
    /// Job record (JSON) to run; replaces the other job flags
    #[arg(long, conflicts_with_all = ["datasets", "window", "destination"])]
    pub job: Option<PathBuf>,

    /// Source dataset, oldest first (repeatable)
    #[arg(long = "dataset")]
    pub datasets: Vec<String>,

    /// Pixel window as x,y,width,height
    #[arg(long, value_delimiter = ',', num_args = 4)]
    pub window: Vec<u32>,

    /// Output object; defaults to the tile's name under the configured prefix
    #[arg(long)]
    pub destination: Option<String>,

    #[command(flatten)]
    pub worker: WorkerArgs,
}

impl ComposeArgs {
    /// Build the job from a record file or the individual flags.
    fn job(&self, destination_prefix: Option<&str>) -> Result<CompositeJob, CliError> {
        if let Some(path) = &self.job {
            let payload = std::fs::read(path).map_err(|error| CliError::FileRead {
                path: path.display().to_string(),
                error,
            })?;
            return Ok(CompositeJob::decode(&payload)?);
        }

        let window = match self.window.as_slice() {
            [x, y, width, height] => Window::new(*x, *y, *width, *height),
            _ => {
                return Err(CliError::Usage(
                    "--window x,y,width,height is required without --job".to_string(),
                ))
            }
        };
        let destination = match (&self.destination, destination_prefix) {
            (Some(destination), _) => destination.clone(),
            (None, Some(prefix)) => destination_for(prefix, &window),
            (None, None) => {
                return Err(CliError::Usage(
                    "--destination is required when no destination_prefix is configured"
                        .to_string(),
                ))
            }
        };
        Ok(CompositeJob::new(self.datasets.clone(), window, destination)?)
    }
}

/// Run the compose command.
pub fn run(config_path: Option<PathBuf>, args: ComposeArgs) -> Result<(), CliError> {
    let mut runner = CliRunner::new(config_path.as_deref())?;
    runner.log_startup("compose");
    args.worker.apply(runner.config_mut())?;

    let config = runner.config();
    let job = args.job(config.dispatch.destination_prefix.as_deref())?;
    let worker = build_worker(config)?;

    let report = runner.block_on(async {
        let cancel = CancellationToken::new();
        let on_interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Ctrl-C received; cancelling job");
                on_interrupt.cancel();
            }
        });
        worker.process(&job, &cancel).await
    })?;

    println!("Wrote {}", report.object);
    println!(
        "  {} sources, {:.2}s (fetch {:.2}s, composite {:.2}s, write {:.2}s, upload {:.2}s)",
        report.sources,
        report.total_time().as_secs_f64(),
        report.fetch_time.as_secs_f64(),
        report.composite_time.as_secs_f64(),
        report.write_time.as_secs_f64(),
        report.upload_time.as_secs_f64()
    );
    Ok(())
}
