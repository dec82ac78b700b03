//! Call parameters and results.
//!
//! A [`Payload`] is an opaque content buffer plus an ordered table of capability
//! handles. Content that refers to a capability stores a [`CapRef`] index into
//! that table. Proxies move payloads between connections without decoding the
//! content; the connection layer re-exports the table entries on the way out.

use std::fmt;

use bytes::Bytes;
use hiveot_kernel::{HubError, HubResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::client::Client;

/// Index of a capability in the payload's capability table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CapRef(pub u32);

/// Encoded content plus embedded capabilities.
#[derive(Clone, Default)]
pub struct Payload {
    content: Bytes,
    caps: Vec<Option<Client>>,
}

impl Payload {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_parts(content: Bytes, caps: Vec<Option<Client>>) -> Self {
        Self { content, caps }
    }

    /// Encode a value with no embedded capabilities.
    pub fn encode<T: Serialize + ?Sized>(value: &T) -> HubResult<Self> {
        Ok(Self {
            content: encode_content(value)?,
            caps: Vec::new(),
        })
    }

    /// Encode a value whose [`CapRef`] fields index into `caps`.
    pub fn encode_with_caps<T: Serialize + ?Sized>(value: &T, caps: Vec<Client>) -> HubResult<Self> {
        Ok(Self {
            content: encode_content(value)?,
            caps: caps.into_iter().map(Some).collect(),
        })
    }

    /// A payload carrying a single capability as `CapRef(0)`.
    pub fn from_cap(cap: Client) -> HubResult<Self> {
        Self::encode_with_caps(&CapRef(0), vec![cap])
    }

    pub fn decode<T: DeserializeOwned>(&self) -> HubResult<T> {
        bincode::deserialize(&self.content)
            .map_err(|e| HubError::invalid_input(format!("malformed payload: {e}")))
    }

    /// Resolve a capability reference from the decoded content.
    pub fn cap(&self, cap_ref: CapRef) -> HubResult<Client> {
        self.caps
            .get(cap_ref.0 as usize)
            .and_then(|cap| cap.clone())
            .ok_or_else(|| {
                HubError::invalid_input(format!("payload has no capability at index {}", cap_ref.0))
            })
    }

    /// Decode a payload produced by [`Payload::from_cap`].
    pub fn into_cap(self) -> HubResult<Client> {
        let cap_ref: CapRef = self.decode()?;
        self.cap(cap_ref)
    }

    pub fn content(&self) -> &Bytes {
        &self.content
    }

    pub fn caps(&self) -> &[Option<Client>] {
        &self.caps
    }

    pub fn into_parts(self) -> (Bytes, Vec<Option<Client>>) {
        (self.content, self.caps)
    }

    /// Replace every embedded capability, keeping the content untouched.
    pub fn map_caps(self, mut f: impl FnMut(Client) -> Client) -> Self {
        Self {
            content: self.content,
            caps: self.caps.into_iter().map(|c| c.map(&mut f)).collect(),
        }
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Payload")
            .field("content_len", &self.content.len())
            .field("caps", &self.caps.len())
            .finish()
    }
}

fn encode_content<T: Serialize + ?Sized>(value: &T) -> HubResult<Bytes> {
    bincode::serialize(value)
        .map(Bytes::from)
        .map_err(|e| HubError::invalid_input(format!("cannot encode payload: {e}")))
}
