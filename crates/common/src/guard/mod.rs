//! Per-connection session state and authorization enforcement
//!
//! A [`ChannelGuard`] is created for each accepted connection and lives as
//! long as the channel. It owns everything session-scoped: the
//! authentication state machine, the single-use challenge nonce, the open
//! descriptor arena, and an optional trust anchor. The process-wide
//! [`Store`] is threaded in at construction; the guard re-checks
//! authorization against it on every operation, so a right granted or a
//! resource deleted on another connection is honored on the next call
//! here.
//!
//! Nothing in a guard is shared between connections and no method is
//! reachable before the channel's own dispatch loop calls it, so the guard
//! needs no locking of its own.

mod descriptor;

pub use descriptor::{DescriptorEntry, DescriptorError, DescriptorTable, MAX_LOCAL_DESCRIPTORS};

use std::sync::Arc;

use rustls::RootCertStore;

use crate::acl::{Action, ResourceRecord, Right, Store, TableError};
use crate::crypto::{self, CryptoError, NONCE_LEN};
use crate::storage::{ResourceStore, StorageError};

/// Errors from guard operations
///
/// Every failure crosses the wire as a bare `status=false`; the variants
/// exist for the server's own logs and audit trail.
#[derive(Debug, thiserror::Error)]
pub enum GuardError {
    #[error("session is not authenticated")]
    NotAuthenticated,

    #[error("unknown principal: {0}")]
    UnknownPrincipal(String),

    #[error("unknown resource: {0}")]
    UnknownResource(String),

    #[error("presented credentials do not match stored credentials for {0}")]
    CredentialMismatch(String),

    #[error("no challenge outstanding")]
    NoChallengeOutstanding,

    #[error("verify_me name does not match the challenged principal")]
    ChallengeMismatch,

    #[error("signature verification failed for {0}")]
    VerificationFailed(String),

    #[error("{principal} may not {action} {resource}")]
    Unauthorized {
        principal: String,
        action: String,
        resource: String,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Table(#[from] TableError),

    #[error(transparent)]
    Descriptor(#[from] DescriptorError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// Challenge issued by `authenticate_me`, consumed by `verify_me`
///
/// The credential and algorithm are captured at challenge time so the
/// verifying credential is exactly the one that was checked against the
/// table when the challenge was issued.
#[derive(Debug)]
struct PendingChallenge {
    name: String,
    algorithm: String,
    credential: Vec<u8>,
    nonce: [u8; NONCE_LEN],
}

/// The per-session guard
pub struct ChannelGuard {
    store: Arc<Store>,
    storage: Arc<dyn ResourceStore>,

    principal_name: String,
    authentication_algorithm: String,
    credential: Vec<u8>,
    channel_principal_authenticated: bool,

    challenge: Option<PendingChallenge>,
    root_certs: Option<RootCertStore>,
    descriptors: DescriptorTable,
}

impl ChannelGuard {
    pub fn new(store: Arc<Store>, storage: Arc<dyn ResourceStore>) -> Self {
        Self {
            store,
            storage,
            principal_name: String::new(),
            authentication_algorithm: String::new(),
            credential: Vec::new(),
            channel_principal_authenticated: false,
            challenge: None,
            root_certs: None,
            descriptors: DescriptorTable::new(),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.channel_principal_authenticated
    }

    /// The authenticated principal, if any.
    pub fn principal_name(&self) -> Option<&str> {
        self.channel_principal_authenticated
            .then_some(self.principal_name.as_str())
    }

    /// The algorithm tag the session authenticated under, if any.
    pub fn authentication_algorithm(&self) -> Option<&str> {
        self.channel_principal_authenticated
            .then_some(self.authentication_algorithm.as_str())
    }

    /// The credential the session authenticated with, if any.
    pub fn credential(&self) -> Option<&[u8]> {
        self.channel_principal_authenticated
            .then_some(self.credential.as_slice())
    }

    /// Whether a trust anchor has been installed for this session.
    pub fn has_root_cert(&self) -> bool {
        self.root_certs.is_some()
    }

    pub fn open_descriptor_count(&self) -> usize {
        self.descriptors.open_count()
    }

    /// Install a DER-encoded X.509 trust anchor for this session. Used
    /// when principal credentials are certificate chains; has no effect on
    /// raw-key credentials.
    pub fn init_root_cert(&mut self, der: &[u8]) -> Result<(), GuardError> {
        self.root_certs = Some(crypto::parse_root_cert(der)?);
        Ok(())
    }

    fn audit(&self, operation: &str, resource: Option<&str>, outcome: bool) {
        let principal = if self.channel_principal_authenticated {
            self.principal_name.as_str()
        } else {
            "-"
        };
        self.store.audit().record(principal, operation, resource, outcome);
    }

    fn ensure_authenticated(&self) -> Result<(), GuardError> {
        if !self.channel_principal_authenticated {
            return Err(GuardError::NotAuthenticated);
        }
        Ok(())
    }

    fn session_is_manager(&self) -> bool {
        self.channel_principal_authenticated
            && self.store.principals().is_manager(&self.principal_name)
    }

    // ---- authentication ----

    /// First authentication step: check the claimed identity's credentials
    /// bit-for-bit against the principal table and answer with a fresh
    /// challenge nonce. The session stays unauthenticated until
    /// [`verify_me`](Self::verify_me) proves possession of the matching
    /// private key. Issuing a new challenge replaces any outstanding one.
    pub fn authenticate_me(
        &mut self,
        name: &str,
        credentials: &[u8],
    ) -> Result<[u8; NONCE_LEN], GuardError> {
        let result = self.authenticate_me_inner(name, credentials);
        self.store
            .audit()
            .record(name, "authenticate_me", None, result.is_ok());
        result
    }

    fn authenticate_me_inner(
        &mut self,
        name: &str,
        credentials: &[u8],
    ) -> Result<[u8; NONCE_LEN], GuardError> {
        let (algorithm, stored_credential) = {
            let principals = self.store.principals();
            let record = principals
                .find(name)
                .ok_or_else(|| GuardError::UnknownPrincipal(name.to_string()))?;
            (record.algorithm.clone(), record.credential.clone())
        };
        if stored_credential != credentials {
            return Err(GuardError::CredentialMismatch(name.to_string()));
        }

        let nonce = crypto::generate_nonce()?;
        self.challenge = Some(PendingChallenge {
            name: name.to_string(),
            algorithm,
            credential: stored_credential,
            nonce,
        });
        Ok(nonce)
    }

    /// Second authentication step: verify the signed challenge and mark
    /// the session authenticated. The challenge is consumed whatever the
    /// outcome, so a second `verify_me` without a fresh `authenticate_me`
    /// always fails.
    pub fn verify_me(&mut self, name: &str, signed_nonce: &[u8]) -> Result<(), GuardError> {
        let result = self.verify_me_inner(name, signed_nonce);
        self.store
            .audit()
            .record(name, "verify_me", None, result.is_ok());
        result
    }

    fn verify_me_inner(&mut self, name: &str, signed_nonce: &[u8]) -> Result<(), GuardError> {
        let challenge = self
            .challenge
            .take()
            .ok_or(GuardError::NoChallengeOutstanding)?;
        if challenge.name != name {
            return Err(GuardError::ChallengeMismatch);
        }

        if !crypto::verify_signed_nonce(
            &challenge.algorithm,
            &challenge.credential,
            &challenge.nonce,
            signed_nonce,
        ) {
            return Err(GuardError::VerificationFailed(name.to_string()));
        }

        self.principal_name = challenge.name;
        self.authentication_algorithm = challenge.algorithm;
        self.credential = challenge.credential;
        self.channel_principal_authenticated = true;
        tracing::info!(principal = %self.principal_name, "channel principal authenticated");
        Ok(())
    }

    // ---- authorization predicates ----

    pub fn can_read(&self, record: &ResourceRecord) -> bool {
        record.on_reader_list(&self.principal_name) || record.on_owner_list(&self.principal_name)
    }

    pub fn can_write(&self, record: &ResourceRecord) -> bool {
        record.on_writer_list(&self.principal_name) || record.on_owner_list(&self.principal_name)
    }

    pub fn can_delete(&self, record: &ResourceRecord) -> bool {
        record.on_deleter_list(&self.principal_name) || record.on_owner_list(&self.principal_name)
    }

    pub fn is_owner(&self, record: &ResourceRecord) -> bool {
        record.on_owner_list(&self.principal_name)
    }

    pub fn access_check(&self, record: &ResourceRecord, action: Action) -> bool {
        match action {
            Action::Read => self.can_read(record),
            Action::Write => self.can_write(record),
            Action::Delete => self.can_delete(record),
            Action::Own => self.is_owner(record),
        }
    }

    fn deny(&self, action: impl Into<String>, resource: &str) -> GuardError {
        GuardError::Unauthorized {
            principal: self.principal_name.clone(),
            action: action.into(),
            resource: resource.to_string(),
        }
    }

    // ---- resource operations ----

    /// Open a resource for a declared access mode, allocating a session
    /// descriptor.
    pub fn open_resource(&mut self, resource: &str, access_mode: &str) -> Result<i64, GuardError> {
        let result = self.open_resource_inner(resource, access_mode);
        self.audit("open_resource", Some(resource), result.is_ok());
        result
    }

    fn open_resource_inner(&mut self, resource: &str, access_mode: &str) -> Result<i64, GuardError> {
        self.ensure_authenticated()?;
        let action: Action = access_mode
            .parse()
            .map_err(|_| GuardError::InvalidArgument(format!("access mode {access_mode}")))?;

        {
            let resources = self.store.resources();
            let record = resources
                .find(resource)
                .ok_or_else(|| GuardError::UnknownResource(resource.to_string()))?;
            if !self.access_check(record, action) {
                return Err(self.deny(action.as_str(), resource));
            }
        }

        let slot = self.descriptors.open(resource)?;
        Ok(slot as i64)
    }

    /// Read up to `count` bytes at the descriptor's cursor. Read rights
    /// are re-checked on every call, so a resource deleted or a right
    /// lost since `open_resource` is caught here.
    pub async fn read_resource(
        &mut self,
        resource: &str,
        descriptor: i64,
        count: i64,
    ) -> Result<Vec<u8>, GuardError> {
        let result = self.read_resource_inner(resource, descriptor, count).await;
        self.audit("read_resource", Some(resource), result.is_ok());
        result
    }

    async fn read_resource_inner(
        &mut self,
        resource: &str,
        descriptor: i64,
        count: i64,
    ) -> Result<Vec<u8>, GuardError> {
        self.ensure_authenticated()?;
        let count = usize::try_from(count)
            .map_err(|_| GuardError::InvalidArgument(format!("byte count {count}")))?;

        let offset = self.descriptors.entry_mut(descriptor, resource)?.offset;

        let location = {
            let resources = self.store.resources();
            let record = resources
                .find(resource)
                .ok_or_else(|| GuardError::UnknownResource(resource.to_string()))?;
            if !self.can_read(record) {
                return Err(self.deny("read", resource));
            }
            record.location.clone()
        };

        let bytes = self.storage.read_at(&location, offset, count).await?;
        self.descriptors.entry_mut(descriptor, resource)?.offset += bytes.len() as u64;
        Ok(bytes)
    }

    /// Write `bytes` at the descriptor's cursor. The declared count must
    /// match the buffer length exactly. A successful write advances
    /// `time_last_written`; a failed one leaves it alone.
    pub async fn write_resource(
        &mut self,
        resource: &str,
        descriptor: i64,
        count: i64,
        bytes: &[u8],
    ) -> Result<(), GuardError> {
        let result = self
            .write_resource_inner(resource, descriptor, count, bytes)
            .await;
        self.audit("write_resource", Some(resource), result.is_ok());
        result
    }

    async fn write_resource_inner(
        &mut self,
        resource: &str,
        descriptor: i64,
        count: i64,
        bytes: &[u8],
    ) -> Result<(), GuardError> {
        self.ensure_authenticated()?;
        if count != bytes.len() as i64 {
            return Err(GuardError::InvalidArgument(format!(
                "declared {count} bytes but buffer holds {}",
                bytes.len()
            )));
        }

        let offset = self.descriptors.entry_mut(descriptor, resource)?.offset;

        let location = {
            let resources = self.store.resources();
            let record = resources
                .find(resource)
                .ok_or_else(|| GuardError::UnknownResource(resource.to_string()))?;
            if !self.can_write(record) {
                return Err(self.deny("write", resource));
            }
            record.location.clone()
        };

        self.storage.write_at(&location, offset, bytes).await?;
        self.descriptors.entry_mut(descriptor, resource)?.offset += bytes.len() as u64;

        // The write landed; stamp the record if it is still in the table.
        if let Some(record) = self.store.resources().find_mut(resource) {
            record.time_last_written = crate::acl::now_rfc3339();
        }
        Ok(())
    }

    /// Close an open descriptor. Closing an invalid descriptor fails.
    pub fn close_resource(&mut self, resource: &str, descriptor: i64) -> Result<(), GuardError> {
        let result = self.close_resource_inner(resource, descriptor);
        self.audit("close_resource", Some(resource), result.is_ok());
        result
    }

    fn close_resource_inner(&mut self, resource: &str, descriptor: i64) -> Result<(), GuardError> {
        self.ensure_authenticated()?;
        self.descriptors.close(descriptor, resource)?;
        Ok(())
    }

    /// Create a resource from a fully populated record. Manager only.
    pub fn create_resource(&mut self, record: ResourceRecord) -> Result<(), GuardError> {
        let identifier = record.identifier.clone();
        let result = self.create_resource_inner(record);
        self.audit("create_resource", Some(&identifier), result.is_ok());
        result
    }

    fn create_resource_inner(&mut self, record: ResourceRecord) -> Result<(), GuardError> {
        self.ensure_authenticated()?;
        if !self.session_is_manager() {
            return Err(self.deny("create", &record.identifier));
        }
        self.store.resources().add(record)?;
        Ok(())
    }

    /// Delete a resource. Allowed for the resource's deleters, its owners,
    /// and managers.
    pub fn delete_resource(&mut self, resource: &str, resource_type: &str) -> Result<(), GuardError> {
        let result = self.delete_resource_inner(resource, resource_type);
        self.audit("delete_resource", Some(resource), result.is_ok());
        result
    }

    fn delete_resource_inner(
        &mut self,
        resource: &str,
        resource_type: &str,
    ) -> Result<(), GuardError> {
        self.ensure_authenticated()?;
        let is_manager = self.session_is_manager();

        let mut resources = self.store.resources();
        let record = resources
            .find(resource)
            .ok_or_else(|| GuardError::UnknownResource(resource.to_string()))?;
        if !(is_manager || self.can_delete(record)) {
            return Err(self.deny("delete", resource));
        }
        resources.delete(resource, resource_type)?;
        Ok(())
    }

    /// Append a principal to one of a resource's access lists. Allowed for
    /// the resource's owners and for managers. The delegated principal
    /// need not exist in the principal table yet: the grant becomes
    /// exercisable once it does.
    pub fn add_access_rights(
        &mut self,
        resource: &str,
        right: &str,
        new_principal: &str,
    ) -> Result<(), GuardError> {
        let result = self.add_access_rights_inner(resource, right, new_principal);
        self.audit("add_access_right", Some(resource), result.is_ok());
        result
    }

    fn add_access_rights_inner(
        &mut self,
        resource: &str,
        right: &str,
        new_principal: &str,
    ) -> Result<(), GuardError> {
        self.ensure_authenticated()?;
        let right: Right = right.parse()?;
        if new_principal.is_empty() {
            return Err(GuardError::InvalidArgument("empty principal name".into()));
        }
        let is_manager = self.session_is_manager();

        let mut resources = self.store.resources();
        let record = resources
            .find_mut(resource)
            .ok_or_else(|| GuardError::UnknownResource(resource.to_string()))?;
        if !(is_manager || record.on_owner_list(&self.principal_name)) {
            return Err(GuardError::Unauthorized {
                principal: self.principal_name.clone(),
                action: format!("grant {right}"),
                resource: resource.to_string(),
            });
        }
        record.add_right(right, new_principal);
        Ok(())
    }

    // ---- principal administration ----

    /// Add a principal to the table. Manager only.
    pub fn add_principal(&mut self, record: crate::acl::PrincipalRecord) -> Result<(), GuardError> {
        let name = record.name.clone();
        let result = self.add_principal_inner(record);
        self.audit("add_principal", Some(&name), result.is_ok());
        result
    }

    fn add_principal_inner(&mut self, record: crate::acl::PrincipalRecord) -> Result<(), GuardError> {
        self.ensure_authenticated()?;
        if !self.session_is_manager() {
            return Err(self.deny("add principal", &record.name));
        }
        self.store.principals().add(record)?;
        Ok(())
    }

    /// Delete a principal. Manager only. ACL entries naming the principal
    /// are left in place and become inert.
    pub fn delete_principal(&mut self, name: &str) -> Result<(), GuardError> {
        let result = self.delete_principal_inner(name);
        self.audit("delete_principal", Some(name), result.is_ok());
        result
    }

    fn delete_principal_inner(&mut self, name: &str) -> Result<(), GuardError> {
        self.ensure_authenticated()?;
        if !self.session_is_manager() {
            return Err(self.deny("delete principal", name));
        }
        self.store.principals().delete(name)?;
        Ok(())
    }
}
