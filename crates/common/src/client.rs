//! Client dispatch.
//!
//! One method per server operation. Each call packs a typed request into
//! its envelope, writes one framed message, reads one framed reply,
//! checks that the reply tag echoes the tag sent, checks the status bit,
//! and unpacks the outputs. Anything else — framing trouble, a parse
//! failure, a tag mismatch, `status=false` — surfaces as [`ClientError`].

use crate::acl::{PrincipalRecord, ResourceRecord};
use crate::protocol::{
    AddAccessRight, AddPrincipal, AuthenticateMe, CallEnvelope, CloseResource, CreateResource,
    DeletePrincipal, DeleteResource, EnvelopeError, OpenResource, ReadResource, Request, VerifyMe,
    WriteResource,
};
use crate::transport::{Transport, TransportError};

/// Errors surfaced to a caller of the client dispatch
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    #[error("reply tag {received} does not match request tag {sent}")]
    TagMismatch { sent: String, received: String },

    #[error("{function} refused by server")]
    Refused { function: String },

    #[error("{function} reply is missing {what}")]
    MissingOutput {
        function: String,
        what: &'static str,
    },
}

/// The client end of one channel
pub struct ClientDispatch<T: Transport> {
    transport: T,
}

impl<T: Transport> ClientDispatch<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Send one request and return its reply, after validating the tag
    /// echo and the status bit.
    async fn call(&mut self, request: Request) -> Result<CallEnvelope, ClientError> {
        let envelope = request.to_envelope()?;
        let sent_tag = envelope.function_name.clone();

        self.transport.send_frame(&envelope.encode()?).await?;
        let reply = CallEnvelope::decode(&self.transport.recv_frame().await?)?;

        if reply.function_name != sent_tag {
            return Err(ClientError::TagMismatch {
                sent: sent_tag,
                received: reply.function_name,
            });
        }
        if !reply.status {
            return Err(ClientError::Refused { function: sent_tag });
        }
        Ok(reply)
    }

    /// First authentication step. Returns the server's challenge nonce.
    pub async fn authenticate_me(
        &mut self,
        name: &str,
        credential: &[u8],
    ) -> Result<Vec<u8>, ClientError> {
        let reply = self
            .call(Request::AuthenticateMe(AuthenticateMe {
                name: name.to_string(),
                credential: credential.to_vec(),
            }))
            .await?;
        reply
            .buf_outputs
            .first()
            .cloned()
            .ok_or(ClientError::MissingOutput {
                function: reply.function_name,
                what: "nonce",
            })
    }

    /// Second authentication step: present the signed nonce.
    pub async fn verify_me(&mut self, name: &str, signed_nonce: &[u8]) -> Result<(), ClientError> {
        self.call(Request::VerifyMe(VerifyMe {
            name: name.to_string(),
            signed_nonce: signed_nonce.to_vec(),
        }))
        .await?;
        Ok(())
    }

    /// Open a resource for `access_mode`, returning the local descriptor.
    pub async fn open_resource(
        &mut self,
        resource: &str,
        access_mode: &str,
    ) -> Result<i64, ClientError> {
        let reply = self
            .call(Request::OpenResource(OpenResource {
                resource: resource.to_string(),
                access_mode: access_mode.to_string(),
            }))
            .await?;
        reply
            .int_outputs
            .first()
            .copied()
            .ok_or(ClientError::MissingOutput {
                function: reply.function_name,
                what: "local descriptor",
            })
    }

    /// Read up to `count` bytes from an open resource.
    pub async fn read_resource(
        &mut self,
        resource: &str,
        descriptor: i64,
        count: i64,
    ) -> Result<Vec<u8>, ClientError> {
        let reply = self
            .call(Request::ReadResource(ReadResource {
                resource: resource.to_string(),
                descriptor,
                count,
            }))
            .await?;
        reply
            .buf_outputs
            .first()
            .cloned()
            .ok_or(ClientError::MissingOutput {
                function: reply.function_name,
                what: "bytes",
            })
    }

    /// Write `bytes` to an open resource.
    pub async fn write_resource(
        &mut self,
        resource: &str,
        descriptor: i64,
        bytes: &[u8],
    ) -> Result<(), ClientError> {
        self.call(Request::WriteResource(WriteResource {
            resource: resource.to_string(),
            descriptor,
            count: bytes.len() as i64,
            bytes: bytes.to_vec(),
        }))
        .await?;
        Ok(())
    }

    /// Close an open descriptor.
    pub async fn close_resource(
        &mut self,
        resource: &str,
        descriptor: i64,
    ) -> Result<(), ClientError> {
        self.call(Request::CloseResource(CloseResource {
            resource: resource.to_string(),
            descriptor,
        }))
        .await?;
        Ok(())
    }

    /// Grant `right` on `resource` to `principal`.
    pub async fn add_access_right(
        &mut self,
        resource: &str,
        right: &str,
        principal: &str,
    ) -> Result<(), ClientError> {
        self.call(Request::AddAccessRight(AddAccessRight {
            resource: resource.to_string(),
            right: right.to_string(),
            principal: principal.to_string(),
        }))
        .await?;
        Ok(())
    }

    /// Create a resource from a fully populated record.
    pub async fn create_resource(&mut self, resource: &ResourceRecord) -> Result<(), ClientError> {
        self.call(Request::CreateResource(CreateResource {
            resource: resource.clone(),
        }))
        .await?;
        Ok(())
    }

    /// Delete a resource by name and type.
    pub async fn delete_resource(
        &mut self,
        resource: &str,
        resource_type: &str,
    ) -> Result<(), ClientError> {
        self.call(Request::DeleteResource(DeleteResource {
            resource: resource.to_string(),
            resource_type: resource_type.to_string(),
        }))
        .await?;
        Ok(())
    }

    /// Register a new principal.
    pub async fn add_principal(&mut self, principal: &PrincipalRecord) -> Result<(), ClientError> {
        self.call(Request::AddPrincipal(AddPrincipal {
            principal: principal.clone(),
        }))
        .await?;
        Ok(())
    }

    /// Remove a principal by name.
    pub async fn delete_principal(&mut self, name: &str) -> Result<(), ClientError> {
        self.call(Request::DeletePrincipal(DeletePrincipal {
            name: name.to_string(),
        }))
        .await?;
        Ok(())
    }
}
