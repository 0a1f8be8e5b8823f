use crate::error::{ReduceError, Result};
use crate::types::Rank;

/// Control messages exchanged between ranks outside the data path.
///
/// Partial results never flow through this enum; they travel as raw
/// little-endian element payloads behind a [`FrameHeader`](super::FrameHeader).
#[derive(rkyv::Archive, rkyv::Serialize, rkyv::Deserialize, Debug, Clone, PartialEq)]
pub enum ControlMessage {
    /// The sender's collective failed. `origin` is the rank held
    /// responsible (the peer that failed, not the sender), `step` the step
    /// at which the failure was first observed. A rank whose own message
    /// was rejected receives a notice naming itself.
    Abort {
        origin: Rank,
        step: u32,
        reason: String,
    },
}

impl ControlMessage {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        rkyv::to_bytes::<rkyv::rancor::Error>(self)
            .map(|bytes| bytes.to_vec())
            .map_err(|e| ReduceError::EncodeFailed(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        // The payload sits at an arbitrary offset inside a frame; rkyv needs
        // it aligned.
        let mut aligned = rkyv::util::AlignedVec::<16>::with_capacity(bytes.len());
        aligned.extend_from_slice(bytes);
        rkyv::from_bytes::<ControlMessage, rkyv::rancor::Error>(&aligned)
            .map_err(|e| ReduceError::DecodeFailed(e.to_string()))
    }
}
