//! Server dispatch.
//!
//! One loop per connection: read one framed request, decode it, route by
//! function tag to the guard, write one framed reply. Exactly one reply
//! per well-formed request. A channel read error ends the loop (and the
//! session, dropping any open descriptors with it); an envelope that does
//! not parse or carries an unknown tag is logged and skipped with no
//! reply; a request with missing arguments is answered `status=false`
//! under its own tag.

use crate::protocol::{CallEnvelope, DecodeError, Request};
use crate::transport::Transport;
use crate::ChannelGuard;

/// The server end of one channel
pub struct ServerDispatch<T: Transport> {
    transport: T,
    guard: ChannelGuard,
}

impl<T: Transport> ServerDispatch<T> {
    pub fn new(transport: T, guard: ChannelGuard) -> Self {
        Self { transport, guard }
    }

    pub fn guard(&self) -> &ChannelGuard {
        &self.guard
    }

    /// Serve requests until the channel closes.
    pub async fn serve(mut self) {
        while self.service_request().await {}
        tracing::debug!(
            open_descriptors = self.guard.open_descriptor_count(),
            "session ended"
        );
    }

    /// Handle at most one request. Returns false once the channel is
    /// unusable and the loop should exit.
    pub async fn service_request(&mut self) -> bool {
        let frame = match self.transport.recv_frame().await {
            Ok(frame) => frame,
            Err(e) => {
                tracing::info!("channel closed: {e}");
                return false;
            }
        };

        let envelope = match CallEnvelope::decode(&frame) {
            Ok(envelope) => envelope,
            Err(e) => {
                // No tag to echo, so no reply is feasible
                tracing::warn!("dropping unparseable request: {e}");
                return true;
            }
        };

        let reply = match Request::from_envelope(&envelope) {
            Ok(request) => self.dispatch(request).await,
            Err(DecodeError::UnknownFunction(name)) => {
                tracing::warn!(function = %name, "unknown function tag");
                return true;
            }
            Err(e) => {
                tracing::warn!("malformed request: {e}");
                match e.reply_tag() {
                    Some(tag) => CallEnvelope::reply(tag, false),
                    None => return true,
                }
            }
        };

        match reply.encode() {
            Ok(bytes) => {
                if let Err(e) = self.transport.send_frame(&bytes).await {
                    // The caller never learns; it will time out
                    tracing::warn!("failed to write reply: {e}");
                }
            }
            Err(e) => {
                tracing::warn!("failed to encode reply: {e}");
            }
        }
        true
    }

    /// Route one typed request to the guard and build its reply. The reply
    /// tag always echoes the request tag.
    async fn dispatch(&mut self, request: Request) -> CallEnvelope {
        let tag = request.tag();
        match request {
            Request::AuthenticateMe(r) => {
                match self.guard.authenticate_me(&r.name, &r.credential) {
                    Ok(nonce) => {
                        let mut reply = CallEnvelope::reply(tag, true);
                        reply.buf_outputs.push(nonce.to_vec());
                        reply
                    }
                    Err(e) => self.refuse(tag, e),
                }
            }
            Request::VerifyMe(r) => match self.guard.verify_me(&r.name, &r.signed_nonce) {
                Ok(()) => CallEnvelope::reply(tag, true),
                Err(e) => self.refuse(tag, e),
            },
            Request::OpenResource(r) => {
                match self.guard.open_resource(&r.resource, &r.access_mode) {
                    Ok(descriptor) => {
                        let mut reply = CallEnvelope::reply(tag, true);
                        reply.int_outputs.push(descriptor);
                        reply
                    }
                    Err(e) => self.refuse(tag, e),
                }
            }
            Request::ReadResource(r) => {
                match self
                    .guard
                    .read_resource(&r.resource, r.descriptor, r.count)
                    .await
                {
                    Ok(bytes) => {
                        let mut reply = CallEnvelope::reply(tag, true);
                        reply.buf_outputs.push(bytes);
                        reply
                    }
                    Err(e) => self.refuse(tag, e),
                }
            }
            Request::WriteResource(r) => {
                match self
                    .guard
                    .write_resource(&r.resource, r.descriptor, r.count, &r.bytes)
                    .await
                {
                    Ok(()) => CallEnvelope::reply(tag, true),
                    Err(e) => self.refuse(tag, e),
                }
            }
            Request::CloseResource(r) => {
                match self.guard.close_resource(&r.resource, r.descriptor) {
                    Ok(()) => CallEnvelope::reply(tag, true),
                    Err(e) => self.refuse(tag, e),
                }
            }
            Request::AddAccessRight(r) => {
                match self
                    .guard
                    .add_access_rights(&r.resource, &r.right, &r.principal)
                {
                    Ok(()) => CallEnvelope::reply(tag, true),
                    Err(e) => self.refuse(tag, e),
                }
            }
            Request::CreateResource(r) => match self.guard.create_resource(r.resource) {
                Ok(()) => CallEnvelope::reply(tag, true),
                Err(e) => self.refuse(tag, e),
            },
            Request::DeleteResource(r) => {
                match self.guard.delete_resource(&r.resource, &r.resource_type) {
                    Ok(()) => CallEnvelope::reply(tag, true),
                    Err(e) => self.refuse(tag, e),
                }
            }
            Request::AddPrincipal(r) => match self.guard.add_principal(r.principal) {
                Ok(()) => CallEnvelope::reply(tag, true),
                Err(e) => self.refuse(tag, e),
            },
            Request::DeletePrincipal(r) => match self.guard.delete_principal(&r.name) {
                Ok(()) => CallEnvelope::reply(tag, true),
                Err(e) => self.refuse(tag, e),
            },
        }
    }

    fn refuse(&self, tag: &str, error: crate::guard::GuardError) -> CallEnvelope {
        tracing::debug!(function = tag, %error, "request refused");
        CallEnvelope::reply(tag, false)
    }
}
