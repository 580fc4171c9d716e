use std::net::SocketAddr;
use std::sync::Arc;

use clap::Args;

use common::prelude::FsResourceStore;
use warden_daemon::state::AppState;
use warden_daemon::{run_service, ServiceConfig};

#[derive(Args, Debug, Clone)]
pub struct Daemon {
    /// Override the listen address from config
    #[arg(long)]
    pub listen: Option<SocketAddr>,
}

#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("state error: {0}")]
    State(#[from] warden_daemon::StateError),

    #[error("service error: {0}")]
    Service(#[from] warden_daemon::ServiceError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Daemon {
    type Error = DaemonError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = AppState::load(ctx.config_path.clone())?;
        let store = Arc::new(state.open_store()?);
        tracing::info!(
            principals = store.principals().len(),
            resources = store.resources().len(),
            "tables loaded"
        );

        let config = ServiceConfig {
            listen_addr: self.listen.unwrap_or(state.config.listen_addr),
            tls: state.tls_paths(),
            store: store.clone(),
            storage: Arc::new(FsResourceStore::new(state.payload_root())),
        };

        // Serve until interrupted, then persist the tables
        tokio::select! {
            result = run_service(config) => {
                result?;
                Ok("listener exited".to_string())
            }
            _ = tokio::signal::ctrl_c() => {
                state.save_store(&store)?;
                Ok("shutdown, tables saved".to_string())
            }
        }
    }
}
