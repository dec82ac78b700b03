//! Wire frames exchanged by two ends of an RPC connection.

use bytes::Bytes;
use hiveot_kernel::{HubError, HubResult, MethodKey};
use serde::{Deserialize, Serialize};

/// Capability table entry as it travels on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CapDescriptor {
    None,
    /// Export id in the sender's export table.
    SenderHosted(u32),
}

/// Payload as it travels on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WirePayload {
    pub content: Vec<u8>,
    pub caps: Vec<CapDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    /// Invoke `key` on the capability the receiver exported as `target`.
    Call {
        question_id: u32,
        target: u32,
        key: MethodKey,
        params: WirePayload,
    },
    Return {
        question_id: u32,
        result: Result<WirePayload, HubError>,
    },
    /// The caller is no longer interested in the answer.
    Finish { question_id: u32 },
    /// The receiver's export is no longer referenced by the sender.
    Release { export_id: u32 },
    Abort { reason: String },
}

pub fn encode_message(msg: &Message) -> HubResult<Bytes> {
    bincode::serialize(msg)
        .map(Bytes::from)
        .map_err(|e| HubError::internal(format!("cannot encode frame: {e}")))
}

pub fn decode_message(frame: &[u8]) -> HubResult<Message> {
    bincode::deserialize(frame).map_err(|e| HubError::invalid_input(format!("malformed frame: {e}")))
}
