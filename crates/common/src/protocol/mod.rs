//! The Warden wire protocol
//!
//! Every request and every reply on a channel is one [`CallEnvelope`]: a
//! function tag, three typed input vectors (strings, byte buffers,
//! integers), a status bit, and three typed output vectors. The envelope
//! layout is the compatibility surface; inside the process each operation
//! has a typed request struct ([`request`]) converted to and from the
//! envelope at the decode boundary, where argument arity is checked once.
//!
//! Envelopes travel length-prefix framed ([`framing`]) on a
//! [`Transport`](crate::transport::Transport).

mod envelope;
pub mod framing;
mod request;

pub use envelope::{tags, CallEnvelope, EnvelopeError};
pub use request::{
    AddAccessRight, AddPrincipal, AuthenticateMe, CloseResource, CreateResource, DecodeError,
    DeletePrincipal, DeleteResource, OpenResource, ReadResource, Request, VerifyMe, WriteResource,
};
