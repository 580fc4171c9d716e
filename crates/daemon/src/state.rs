use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use common::acl::DEFAULT_TABLE_CAPACITY;
use common::prelude::{PrincipalRecord, SecretKey, Store};

/// Errors loading or initializing the state directory
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("config encode error: {0}")]
    ConfigEncode(#[from] toml::ser::Error),

    #[error("key error: {0}")]
    Key(#[from] common::crypto::KeyError),

    #[error("table error: {0}")]
    Table(#[from] common::acl::TableError),

    #[error("persistence error: {0}")]
    Persist(#[from] common::acl::PersistError),

    #[error("state directory not initialized at {} (run `warden init`)", .0.display())]
    NotInitialized(PathBuf),
}

/// Contents of `config.toml` in the state directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// address the service listens on
    pub listen_addr: SocketAddr,
    /// maximum number of principals
    pub principal_capacity: usize,
    /// maximum number of resources
    pub resource_capacity: usize,
    /// PEM certificate chain for the listener,
    ///  plain TCP (for deployment behind a TLS terminator) if not set
    pub tls_cert: Option<PathBuf>,
    /// PEM private key matching `tls_cert`
    pub tls_key: Option<PathBuf>,
    /// default log filter, overridden by RUST_LOG
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)), 5150),
            principal_capacity: DEFAULT_TABLE_CAPACITY,
            resource_capacity: DEFAULT_TABLE_CAPACITY,
            tls_cert: None,
            tls_key: None,
            log_level: "info".to_string(),
        }
    }
}

/// The on-disk state of a warden deployment
///
/// Everything lives under one root directory (default `~/.warden`):
/// `config.toml`, the persisted principal and resource tables, and the
/// resource payload tree. The listener's TLS material lives wherever the
/// config points.
#[derive(Debug, Clone)]
pub struct AppState {
    pub root: PathBuf,
    pub config: AppConfig,
}

impl AppState {
    pub fn default_root() -> PathBuf {
        dirs::home_dir()
            .map(|home| home.join(".warden"))
            .unwrap_or_else(|| PathBuf::from(".warden"))
    }

    fn resolve_root(root: Option<PathBuf>) -> PathBuf {
        root.unwrap_or_else(Self::default_root)
    }

    /// Load an initialized state directory.
    pub fn load(root: Option<PathBuf>) -> Result<Self, StateError> {
        let root = Self::resolve_root(root);
        let config_path = root.join("config.toml");
        if !config_path.exists() {
            return Err(StateError::NotInitialized(root));
        }
        let config: AppConfig = toml::from_str(&std::fs::read_to_string(config_path)?)?;
        Ok(Self { root, config })
    }

    /// Create the state directory: default config, and optionally a
    /// bootstrap manager principal whose secret key is written beside the
    /// config so an administrator can authenticate.
    ///
    /// Idempotent on an existing directory except that a requested
    /// manager is only seeded into a freshly created principal table.
    pub fn init(root: Option<PathBuf>, manager: Option<&str>) -> Result<Self, StateError> {
        let root = Self::resolve_root(root);
        std::fs::create_dir_all(&root)?;

        let config_path = root.join("config.toml");
        let config = if config_path.exists() {
            toml::from_str(&std::fs::read_to_string(&config_path)?)?
        } else {
            let config = AppConfig::default();
            std::fs::write(&config_path, toml::to_string_pretty(&config)?)?;
            config
        };

        let state = Self { root, config };

        if let Some(name) = manager {
            if state.principals_path().exists() {
                tracing::warn!(
                    "principal table already exists, not seeding manager {name}"
                );
            } else {
                state.seed_manager(name)?;
            }
        }

        Ok(state)
    }

    fn seed_manager(&self, name: &str) -> Result<(), StateError> {
        let key = SecretKey::generate();
        std::fs::write(self.root.join(format!("{name}.pem")), key.to_pem())?;

        let store = Store::with_capacity(
            self.config.principal_capacity,
            self.config.resource_capacity,
        );
        {
            let mut principals = store.principals();
            principals.add(PrincipalRecord::new(
                name,
                common::crypto::AuthAlgorithm::ED25519_TAG,
                key.public().to_bytes().to_vec(),
            ))?;
            principals.add_manager(name)?;
        }
        store.save_to_files(self.principals_path(), self.resources_path())?;
        Ok(())
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join("config.toml")
    }

    pub fn principals_path(&self) -> PathBuf {
        self.root.join("principals.bin")
    }

    pub fn resources_path(&self) -> PathBuf {
        self.root.join("resources.bin")
    }

    /// Root of the resource payload tree.
    pub fn payload_root(&self) -> PathBuf {
        self.root.join("payloads")
    }

    /// Build the store and populate it from the persisted tables.
    pub fn open_store(&self) -> Result<Store, StateError> {
        let store = Store::with_capacity(
            self.config.principal_capacity,
            self.config.resource_capacity,
        );
        store.load_from_files(self.principals_path(), self.resources_path())?;
        Ok(store)
    }

    /// Persist the store's tables back into the state directory.
    pub fn save_store(&self, store: &Store) -> Result<(), StateError> {
        store.save_to_files(self.principals_path(), self.resources_path())?;
        Ok(())
    }

    /// Resolved TLS certificate/key paths, if TLS is configured.
    pub fn tls_paths(&self) -> Option<(PathBuf, PathBuf)> {
        match (&self.config.tls_cert, &self.config.tls_key) {
            (Some(cert), Some(key)) => {
                Some((self.resolve_path(cert), self.resolve_path(key)))
            }
            _ => None,
        }
    }

    fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}
