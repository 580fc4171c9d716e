/**
 * Principal and resource registries with per-resource
 *  access lists, the process-wide store that owns them,
 *  and the audit log of guard decisions.
 */
pub mod acl;
/**
 * Client dispatch: one method per server operation,
 *  request/reply over a transport with tag echo and
 *  status checking.
 */
pub mod client;
/**
 * Cryptographic types and operations.
 *  - Ed25519 keypair wrappers for principals
 *  - Challenge nonces and signed-nonce verification
 *  - Trust anchor parsing for certificate credentials
 */
pub mod crypto;
/**
 * The channel guard: per-connection authentication state,
 *  the open-descriptor arena, and authorization enforcement
 *  on every operation.
 */
pub mod guard;
/**
 * The wire protocol: the tagged call envelope, typed
 *  per-operation requests, and size-prefixed framing.
 */
pub mod protocol;
/**
 * Server dispatch: the one-request-one-reply loop that
 *  drives a guard from a channel.
 */
pub mod server;
/**
 * Resource payload storage behind a byte-blob interface,
 *  with filesystem and in-memory implementations.
 */
pub mod storage;
/**
 * The transport seam: framed messages over any reliable
 *  ordered byte stream. TLS in production, an in-process
 *  duplex pipe in tests.
 */
pub mod transport;

pub use client::{ClientDispatch, ClientError};
pub use guard::{ChannelGuard, GuardError};
pub use server::ServerDispatch;

pub mod prelude {
    pub use crate::acl::{
        PrincipalRecord, PrincipalTable, ResourceRecord, ResourceTable, Right, Store,
    };
    pub use crate::client::ClientDispatch;
    pub use crate::crypto::{PublicKey, SecretKey};
    pub use crate::guard::ChannelGuard;
    pub use crate::server::ServerDispatch;
    pub use crate::storage::{FsResourceStore, MemoryResourceStore, ResourceStore};
    pub use crate::transport::{memory_pair, StreamTransport, Transport};
}
