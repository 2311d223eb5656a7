//! Serve command - run the worker behind an HTTP push endpoint.
//!
//! The queue POSTs one envelope per request. The response code is the
//! acknowledgement: 2xx acknowledges, anything else triggers redelivery.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use clearsky::worker::{CompositeWorker, Delivery};

use super::common::{build_worker, WorkerArgs};
use crate::error::CliError;
use crate::runner::CliRunner;

/// Arguments for the serve command.
#[derive(Debug, Clone, Default, Args)]
pub struct ServeArgs {
    /// Listen address (overrides PORT and the config file)
    #[arg(long)]
    pub listen: Option<SocketAddr>,

    #[command(flatten)]
    pub worker: WorkerArgs,
}

struct ServeState {
    worker: CompositeWorker,
    shutdown: CancellationToken,
}

/// Run the serve command.
pub fn run(config_path: Option<PathBuf>, args: ServeArgs) -> Result<(), CliError> {
    let mut runner = CliRunner::new(config_path.as_deref())?;
    runner.log_startup("serve");
    args.worker.apply(runner.config_mut())?;

    let config = runner.config();
    let addr = match args.listen {
        Some(addr) => addr,
        None => config.listen_addr(std::env::var("PORT").ok().as_deref())?,
    };
    let worker = build_worker(config)?;

    runner.block_on(serve(addr, worker))
}

async fn serve(addr: SocketAddr, worker: CompositeWorker) -> Result<(), CliError> {
    let shutdown = CancellationToken::new();
    let state = Arc::new(ServeState {
        worker,
        shutdown: shutdown.clone(),
    });

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(CliError::Serve)?;
    info!(addr = %addr, "Listening for push deliveries");
    println!("Listening on http://{}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            if tokio::signal::ctrl_c().await.is_err() {
                warn!("Failed to listen for Ctrl-C; shutting down");
            }
            info!("Ctrl-C received; shutting down");
            // In-flight jobs fail unacknowledged and are redelivered.
            shutdown.cancel();
        })
        .await
        .map_err(CliError::Serve)?;

    info!("Server stopped");
    Ok(())
}

fn router(state: Arc<ServeState>) -> Router {
    Router::new()
        .route("/", post(receive))
        .route("/median", post(receive))
        .route("/healthz", get(healthz))
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn receive(State(state): State<Arc<ServeState>>, body: Bytes) -> StatusCode {
    let outcome = state.worker.handle_delivery(&body, &state.shutdown).await;
    let status = status_for(&outcome);
    debug!(status = status.as_u16(), "Delivery handled");
    status
}

fn status_for(outcome: &Delivery) -> StatusCode {
    match outcome {
        Delivery::Completed { .. } | Delivery::Dropped { .. } => StatusCode::NO_CONTENT,
        Delivery::Rejected { .. } => StatusCode::BAD_REQUEST,
        Delivery::Failed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clearsky::worker::WorkerError;

    #[test]
    fn test_status_mapping() {
        let dropped = Delivery::Dropped {
            delivery_id: "1".into(),
            reason: "bad payload".into(),
        };
        assert_eq!(status_for(&dropped), StatusCode::NO_CONTENT);

        let rejected = Delivery::Rejected {
            reason: "not json".into(),
        };
        assert_eq!(status_for(&rejected), StatusCode::BAD_REQUEST);

        let failed = Delivery::Failed {
            delivery_id: "2".into(),
            error: WorkerError::Cancelled,
        };
        assert_eq!(status_for(&failed), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
