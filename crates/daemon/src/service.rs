use std::io::BufReader;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;

use common::prelude::{ChannelGuard, ResourceStore, ServerDispatch, Store, StreamTransport};

use crate::config::ServiceConfig;

/// Errors starting or running the listener
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("tls configuration error: {0}")]
    Tls(#[from] rustls::Error),

    #[error("no private key found in {0}")]
    NoPrivateKey(String),
}

fn build_acceptor(cert_path: &Path, key_path: &Path) -> Result<TlsAcceptor, ServiceError> {
    let certs = rustls_pemfile::certs(&mut BufReader::new(std::fs::File::open(cert_path)?))
        .collect::<Result<Vec<_>, _>>()?;
    let key = rustls_pemfile::private_key(&mut BufReader::new(std::fs::File::open(key_path)?))?
        .ok_or_else(|| ServiceError::NoPrivateKey(key_path.display().to_string()))?;

    let config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)?;
    Ok(TlsAcceptor::from(Arc::new(config)))
}

/// Accept connections forever, one dispatch loop per connection.
///
/// Each accepted connection gets a fresh [`ChannelGuard`] over the shared
/// store; dropping the connection drops the guard and with it every open
/// descriptor. Runs until the listener itself fails; the caller races it
/// against a shutdown signal.
pub async fn run_service(config: ServiceConfig) -> Result<(), ServiceError> {
    let acceptor = match &config.tls {
        Some((cert, key)) => Some(build_acceptor(cert, key)?),
        None => {
            tracing::warn!("no TLS configured, serving plain TCP");
            None
        }
    };

    let listener = TcpListener::bind(config.listen_addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "warden listening");

    loop {
        let (stream, peer) = listener.accept().await?;
        let acceptor = acceptor.clone();
        let store = config.store.clone();
        let storage = config.storage.clone();
        tokio::spawn(async move {
            handle_connection(stream, peer, acceptor, store, storage).await;
        });
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    acceptor: Option<TlsAcceptor>,
    store: Arc<Store>,
    storage: Arc<dyn ResourceStore>,
) {
    tracing::debug!(%peer, "connection accepted");
    let guard = ChannelGuard::new(store, storage);
    match acceptor {
        Some(acceptor) => match acceptor.accept(stream).await {
            Ok(tls_stream) => {
                ServerDispatch::new(StreamTransport::new(tls_stream), guard)
                    .serve()
                    .await;
            }
            Err(e) => tracing::warn!(%peer, "tls handshake failed: {e}"),
        },
        None => {
            ServerDispatch::new(StreamTransport::new(stream), guard)
                .serve()
                .await;
        }
    }
    tracing::debug!(%peer, "connection closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::acl::PrincipalRecord;
    use common::crypto::{self, SecretKey};
    use common::prelude::{ClientDispatch, MemoryResourceStore};

    #[tokio::test]
    async fn test_tcp_session_over_listener() {
        let key = SecretKey::generate();
        let store = Arc::new(Store::new());
        store
            .principals()
            .add(PrincipalRecord::new(
                "alice",
                "ed25519",
                key.public().to_bytes().to_vec(),
            ))
            .unwrap();

        let storage: Arc<dyn ResourceStore> = Arc::new(MemoryResourceStore::new());

        // Bind by hand so the test can learn the ephemeral port
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let (stream, peer) = listener.accept().await.unwrap();
                tokio::spawn(handle_connection(
                    stream,
                    peer,
                    None,
                    store.clone(),
                    storage.clone(),
                ));
            }
        });

        let stream = TcpStream::connect(addr).await.unwrap();
        let mut client = ClientDispatch::new(StreamTransport::new(stream));

        let credential = key.public().to_bytes().to_vec();
        let nonce = client.authenticate_me("alice", &credential).await.unwrap();
        client
            .verify_me("alice", &crypto::sign_nonce(&key, &nonce))
            .await
            .unwrap();
    }
}
