use serde::{Deserialize, Serialize};

/// Function tags, the closed set of operations a channel understands
///
/// A reply always echoes the tag of the request it answers.
pub mod tags {
    pub const AUTHENTICATE_ME: &str = "authenticate_me";
    pub const VERIFY_ME: &str = "verify_me";
    pub const OPEN_RESOURCE: &str = "open_resource";
    pub const READ_RESOURCE: &str = "read_resource";
    pub const WRITE_RESOURCE: &str = "write_resource";
    pub const CLOSE_RESOURCE: &str = "close_resource";
    pub const ADD_ACCESS_RIGHT: &str = "add_access_right";
    pub const CREATE_RESOURCE: &str = "create_resource";
    pub const DELETE_RESOURCE: &str = "delete_resource";
    pub const ADD_PRINCIPAL: &str = "add_principal";
    pub const DELETE_PRINCIPAL: &str = "delete_principal";
}

/// Errors encoding or decoding an envelope
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("envelope codec error: {0}")]
    Codec(String),
}

impl From<bincode::Error> for EnvelopeError {
    fn from(e: bincode::Error) -> Self {
        EnvelopeError::Codec(e.to_string())
    }
}

/// The uniform tagged wire message carrying one request or one reply
///
/// Inputs are meaningful on requests, `status` and the outputs on replies.
/// Argument positions within each typed vector are fixed per operation;
/// [`Request`](super::Request) owns those conventions so nothing else in
/// the codebase indexes into these vectors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallEnvelope {
    pub function_name: String,
    pub status: bool,
    pub str_inputs: Vec<String>,
    pub buf_inputs: Vec<Vec<u8>>,
    pub int_inputs: Vec<i64>,
    pub str_outputs: Vec<String>,
    pub buf_outputs: Vec<Vec<u8>>,
    pub int_outputs: Vec<i64>,
}

impl CallEnvelope {
    /// An empty request envelope for `function_name`.
    pub fn request(function_name: impl Into<String>) -> Self {
        Self {
            function_name: function_name.into(),
            ..Default::default()
        }
    }

    /// An empty reply envelope echoing `function_name`.
    pub fn reply(function_name: impl Into<String>, status: bool) -> Self {
        Self {
            function_name: function_name.into(),
            status,
            ..Default::default()
        }
    }

    pub fn push_str(mut self, s: impl Into<String>) -> Self {
        self.str_inputs.push(s.into());
        self
    }

    pub fn push_buf(mut self, b: Vec<u8>) -> Self {
        self.buf_inputs.push(b);
        self
    }

    pub fn push_int(mut self, i: i64) -> Self {
        self.int_inputs.push(i);
        self
    }

    pub fn encode(&self) -> Result<Vec<u8>, EnvelopeError> {
        Ok(bincode::serialize(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        Ok(bincode::deserialize(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_roundtrip() {
        let envelope = CallEnvelope::request(tags::OPEN_RESOURCE)
            .push_str("doc1")
            .push_str("read")
            .push_int(7);

        let bytes = envelope.encode().unwrap();
        let decoded = CallEnvelope::decode(&bytes).unwrap();
        assert_eq!(decoded, envelope);
    }

    #[test]
    fn test_truncated_input_fails() {
        let bytes = CallEnvelope::request(tags::VERIFY_ME).encode().unwrap();
        assert!(CallEnvelope::decode(&bytes[..bytes.len() - 1]).is_err());
    }

    #[test]
    fn test_reply_defaults_empty() {
        let reply = CallEnvelope::reply(tags::VERIFY_ME, false);
        assert_eq!(reply.function_name, tags::VERIFY_ME);
        assert!(!reply.status);
        assert!(reply.buf_outputs.is_empty());
    }
}
