use crate::acl::{PrincipalRecord, ResourceRecord};

use super::envelope::{tags, CallEnvelope, EnvelopeError};

/// Errors turning an envelope into a typed request
///
/// `UnknownFunction` means no reply can be formed (there is no tag to
/// echo); the other variants carry the tag so the server can answer
/// `status=false` under the right name.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("unknown function: {0}")]
    UnknownFunction(String),

    #[error("{function}: missing argument: {what}")]
    MissingArgument {
        function: &'static str,
        what: &'static str,
    },

    #[error("{function}: malformed payload: {detail}")]
    BadPayload {
        function: &'static str,
        detail: String,
    },
}

impl DecodeError {
    /// The tag to echo in a failure reply, when one exists.
    pub fn reply_tag(&self) -> Option<&'static str> {
        match self {
            DecodeError::UnknownFunction(_) => None,
            DecodeError::MissingArgument { function, .. } => Some(function),
            DecodeError::BadPayload { function, .. } => Some(function),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticateMe {
    pub name: String,
    pub credential: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyMe {
    pub name: String,
    pub signed_nonce: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenResource {
    pub resource: String,
    pub access_mode: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadResource {
    pub resource: String,
    pub descriptor: i64,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteResource {
    pub resource: String,
    pub descriptor: i64,
    pub count: i64,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseResource {
    pub resource: String,
    pub descriptor: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddAccessRight {
    pub resource: String,
    pub right: String,
    pub principal: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateResource {
    pub resource: ResourceRecord,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteResource {
    pub resource: String,
    pub resource_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddPrincipal {
    pub principal: PrincipalRecord,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletePrincipal {
    pub name: String,
}

/// One typed request per wire operation
///
/// The positional argument conventions of the envelope live entirely in
/// `to_envelope`/`from_envelope`; dispatch and the guard only ever see
/// named fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    AuthenticateMe(AuthenticateMe),
    VerifyMe(VerifyMe),
    OpenResource(OpenResource),
    ReadResource(ReadResource),
    WriteResource(WriteResource),
    CloseResource(CloseResource),
    AddAccessRight(AddAccessRight),
    CreateResource(CreateResource),
    DeleteResource(DeleteResource),
    AddPrincipal(AddPrincipal),
    DeletePrincipal(DeletePrincipal),
}

fn str_arg(
    env: &CallEnvelope,
    idx: usize,
    function: &'static str,
    what: &'static str,
) -> Result<String, DecodeError> {
    env.str_inputs
        .get(idx)
        .cloned()
        .ok_or(DecodeError::MissingArgument { function, what })
}

fn buf_arg(
    env: &CallEnvelope,
    idx: usize,
    function: &'static str,
    what: &'static str,
) -> Result<Vec<u8>, DecodeError> {
    env.buf_inputs
        .get(idx)
        .cloned()
        .ok_or(DecodeError::MissingArgument { function, what })
}

fn int_arg(
    env: &CallEnvelope,
    idx: usize,
    function: &'static str,
    what: &'static str,
) -> Result<i64, DecodeError> {
    env.int_inputs
        .get(idx)
        .copied()
        .ok_or(DecodeError::MissingArgument { function, what })
}

impl Request {
    /// The wire tag this request travels under.
    pub fn tag(&self) -> &'static str {
        match self {
            Request::AuthenticateMe(_) => tags::AUTHENTICATE_ME,
            Request::VerifyMe(_) => tags::VERIFY_ME,
            Request::OpenResource(_) => tags::OPEN_RESOURCE,
            Request::ReadResource(_) => tags::READ_RESOURCE,
            Request::WriteResource(_) => tags::WRITE_RESOURCE,
            Request::CloseResource(_) => tags::CLOSE_RESOURCE,
            Request::AddAccessRight(_) => tags::ADD_ACCESS_RIGHT,
            Request::CreateResource(_) => tags::CREATE_RESOURCE,
            Request::DeleteResource(_) => tags::DELETE_RESOURCE,
            Request::AddPrincipal(_) => tags::ADD_PRINCIPAL,
            Request::DeletePrincipal(_) => tags::DELETE_PRINCIPAL,
        }
    }

    /// Pack this request into its wire envelope.
    pub fn to_envelope(&self) -> Result<CallEnvelope, EnvelopeError> {
        let envelope = match self {
            Request::AuthenticateMe(r) => CallEnvelope::request(tags::AUTHENTICATE_ME)
                .push_str(&r.name)
                .push_buf(r.credential.clone()),
            Request::VerifyMe(r) => CallEnvelope::request(tags::VERIFY_ME)
                .push_str(&r.name)
                .push_buf(r.signed_nonce.clone()),
            Request::OpenResource(r) => CallEnvelope::request(tags::OPEN_RESOURCE)
                .push_str(&r.resource)
                .push_str(&r.access_mode),
            Request::ReadResource(r) => CallEnvelope::request(tags::READ_RESOURCE)
                .push_str(&r.resource)
                .push_int(r.descriptor)
                .push_int(r.count),
            Request::WriteResource(r) => CallEnvelope::request(tags::WRITE_RESOURCE)
                .push_str(&r.resource)
                .push_buf(r.bytes.clone())
                .push_int(r.descriptor)
                .push_int(r.count),
            Request::CloseResource(r) => CallEnvelope::request(tags::CLOSE_RESOURCE)
                .push_str(&r.resource)
                .push_int(r.descriptor),
            Request::AddAccessRight(r) => CallEnvelope::request(tags::ADD_ACCESS_RIGHT)
                .push_str(&r.resource)
                .push_str(&r.right)
                .push_str(&r.principal),
            Request::CreateResource(r) => CallEnvelope::request(tags::CREATE_RESOURCE)
                .push_buf(bincode::serialize(&r.resource).map_err(EnvelopeError::from)?),
            Request::DeleteResource(r) => CallEnvelope::request(tags::DELETE_RESOURCE)
                .push_str(&r.resource)
                .push_str(&r.resource_type),
            Request::AddPrincipal(r) => CallEnvelope::request(tags::ADD_PRINCIPAL)
                .push_buf(bincode::serialize(&r.principal).map_err(EnvelopeError::from)?),
            Request::DeletePrincipal(r) => {
                CallEnvelope::request(tags::DELETE_PRINCIPAL).push_str(&r.name)
            }
        };
        Ok(envelope)
    }

    /// Unpack a wire envelope into a typed request, checking argument
    /// arity. This is the only place request arguments are indexed by
    /// position.
    pub fn from_envelope(env: &CallEnvelope) -> Result<Self, DecodeError> {
        match env.function_name.as_str() {
            tags::AUTHENTICATE_ME => Ok(Request::AuthenticateMe(AuthenticateMe {
                name: str_arg(env, 0, tags::AUTHENTICATE_ME, "principal name")?,
                credential: buf_arg(env, 0, tags::AUTHENTICATE_ME, "credentials")?,
            })),
            tags::VERIFY_ME => Ok(Request::VerifyMe(VerifyMe {
                name: str_arg(env, 0, tags::VERIFY_ME, "principal name")?,
                signed_nonce: buf_arg(env, 0, tags::VERIFY_ME, "signed nonce")?,
            })),
            tags::OPEN_RESOURCE => Ok(Request::OpenResource(OpenResource {
                resource: str_arg(env, 0, tags::OPEN_RESOURCE, "resource name")?,
                access_mode: str_arg(env, 1, tags::OPEN_RESOURCE, "access mode")?,
            })),
            tags::READ_RESOURCE => Ok(Request::ReadResource(ReadResource {
                resource: str_arg(env, 0, tags::READ_RESOURCE, "resource name")?,
                descriptor: int_arg(env, 0, tags::READ_RESOURCE, "local descriptor")?,
                count: int_arg(env, 1, tags::READ_RESOURCE, "byte count")?,
            })),
            tags::WRITE_RESOURCE => Ok(Request::WriteResource(WriteResource {
                resource: str_arg(env, 0, tags::WRITE_RESOURCE, "resource name")?,
                bytes: buf_arg(env, 0, tags::WRITE_RESOURCE, "bytes")?,
                descriptor: int_arg(env, 0, tags::WRITE_RESOURCE, "local descriptor")?,
                count: int_arg(env, 1, tags::WRITE_RESOURCE, "byte count")?,
            })),
            tags::CLOSE_RESOURCE => Ok(Request::CloseResource(CloseResource {
                resource: str_arg(env, 0, tags::CLOSE_RESOURCE, "resource name")?,
                descriptor: int_arg(env, 0, tags::CLOSE_RESOURCE, "local descriptor")?,
            })),
            tags::ADD_ACCESS_RIGHT => Ok(Request::AddAccessRight(AddAccessRight {
                resource: str_arg(env, 0, tags::ADD_ACCESS_RIGHT, "resource name")?,
                right: str_arg(env, 1, tags::ADD_ACCESS_RIGHT, "right")?,
                principal: str_arg(env, 2, tags::ADD_ACCESS_RIGHT, "new principal")?,
            })),
            tags::CREATE_RESOURCE => {
                let bytes = buf_arg(env, 0, tags::CREATE_RESOURCE, "serialized resource")?;
                let resource =
                    bincode::deserialize(&bytes).map_err(|e| DecodeError::BadPayload {
                        function: tags::CREATE_RESOURCE,
                        detail: e.to_string(),
                    })?;
                Ok(Request::CreateResource(CreateResource { resource }))
            }
            tags::DELETE_RESOURCE => Ok(Request::DeleteResource(DeleteResource {
                resource: str_arg(env, 0, tags::DELETE_RESOURCE, "resource name")?,
                resource_type: str_arg(env, 1, tags::DELETE_RESOURCE, "resource type")?,
            })),
            tags::ADD_PRINCIPAL => {
                let bytes = buf_arg(env, 0, tags::ADD_PRINCIPAL, "serialized principal")?;
                let principal =
                    bincode::deserialize(&bytes).map_err(|e| DecodeError::BadPayload {
                        function: tags::ADD_PRINCIPAL,
                        detail: e.to_string(),
                    })?;
                Ok(Request::AddPrincipal(AddPrincipal { principal }))
            }
            tags::DELETE_PRINCIPAL => Ok(Request::DeletePrincipal(DeletePrincipal {
                name: str_arg(env, 0, tags::DELETE_PRINCIPAL, "principal name")?,
            })),
            other => Err(DecodeError::UnknownFunction(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_every_operation() {
        let mut resource = ResourceRecord::new("doc1", "file", "docs/doc1");
        resource.add_owner("alice");
        let principal = PrincipalRecord::new("bob", "ed25519", vec![9; 32]);

        let requests = vec![
            Request::AuthenticateMe(AuthenticateMe {
                name: "alice".into(),
                credential: vec![1; 32],
            }),
            Request::VerifyMe(VerifyMe {
                name: "alice".into(),
                signed_nonce: vec![2; 64],
            }),
            Request::OpenResource(OpenResource {
                resource: "doc1".into(),
                access_mode: "write".into(),
            }),
            Request::ReadResource(ReadResource {
                resource: "doc1".into(),
                descriptor: 3,
                count: 128,
            }),
            Request::WriteResource(WriteResource {
                resource: "doc1".into(),
                descriptor: 3,
                count: 5,
                bytes: b"hello".to_vec(),
            }),
            Request::CloseResource(CloseResource {
                resource: "doc1".into(),
                descriptor: 3,
            }),
            Request::AddAccessRight(AddAccessRight {
                resource: "doc1".into(),
                right: "reader".into(),
                principal: "carol".into(),
            }),
            Request::CreateResource(CreateResource { resource }),
            Request::DeleteResource(DeleteResource {
                resource: "doc1".into(),
                resource_type: "file".into(),
            }),
            Request::AddPrincipal(AddPrincipal { principal }),
            Request::DeletePrincipal(DeletePrincipal {
                name: "bob".into(),
            }),
        ];

        for request in requests {
            let envelope = request.to_envelope().unwrap();
            assert_eq!(envelope.function_name, request.tag());
            let decoded = Request::from_envelope(&envelope).unwrap();
            assert_eq!(decoded, request);
        }
    }

    #[test]
    fn test_unknown_function_has_no_reply_tag() {
        let envelope = CallEnvelope::request("frobnicate");
        let err = Request::from_envelope(&envelope).unwrap_err();
        assert!(matches!(err, DecodeError::UnknownFunction(_)));
        assert_eq!(err.reply_tag(), None);
    }

    #[test]
    fn test_missing_argument_keeps_reply_tag() {
        let envelope = CallEnvelope::request(tags::OPEN_RESOURCE).push_str("doc1");
        let err = Request::from_envelope(&envelope).unwrap_err();
        assert!(matches!(err, DecodeError::MissingArgument { .. }));
        assert_eq!(err.reply_tag(), Some(tags::OPEN_RESOURCE));
    }

    #[test]
    fn test_bad_payload_keeps_reply_tag() {
        let envelope = CallEnvelope::request(tags::ADD_PRINCIPAL).push_buf(b"garbage".to_vec());
        let err = Request::from_envelope(&envelope).unwrap_err();
        assert!(matches!(err, DecodeError::BadPayload { .. }));
        assert_eq!(err.reply_tag(), Some(tags::ADD_PRINCIPAL));
    }
}
