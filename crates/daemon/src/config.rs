use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use common::prelude::{ResourceStore, Store};

/// Runtime configuration handed to [`run_service`](crate::run_service)
pub struct ServiceConfig {
    /// address to listen on
    pub listen_addr: SocketAddr,
    /// certificate chain and private key for the listener,
    ///  if not set connections are plain TCP and the deployment
    ///  must provide its own secure channel
    pub tls: Option<(PathBuf, PathBuf)>,
    /// the process-wide principal/resource store
    pub store: Arc<Store>,
    /// backing store for resource payloads
    pub storage: Arc<dyn ResourceStore>,
}

impl std::fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("listen_addr", &self.listen_addr)
            .field("tls", &self.tls)
            .finish_non_exhaustive()
    }
}
