use crate::types::{DataType, Rank, ReduceOp};

pub type Result<T> = std::result::Result<T, ReduceError>;

#[derive(Debug, thiserror::Error)]
pub enum ReduceError {
    #[error("invalid process group: rank {rank}, size {size}")]
    InvalidGroup { rank: Rank, size: u32 },

    #[error("collective failed at step {step} (peer rank {peer}): {reason}")]
    CollectiveCommunicationFailure {
        peer: Rank,
        step: u32,
        reason: String,
    },

    #[error("reduce op {op} is not defined for element type {dtype}")]
    UnsupportedOperation { op: ReduceOp, dtype: DataType },

    #[error("peer {rank} disconnected unexpectedly")]
    PeerDisconnected { rank: Rank },

    #[error("rank {rank} is not reachable through this channel")]
    UnknownPeer { rank: Rank },

    #[error("transport error: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("message encode failed: {0}")]
    EncodeFailed(String),

    #[error("message decode failed: {0}")]
    DecodeFailed(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("internal lock poisoned: {0}")]
    LockPoisoned(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ReduceError {
    /// Create a `Transport` error with just a message.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport {
            message: msg.into(),
            source: None,
        }
    }

    /// Create a `Transport` error with a message and a source error.
    pub fn transport_with_source(
        msg: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Transport {
            message: msg.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Shorthand for a `CollectiveCommunicationFailure`.
    pub fn collective(peer: Rank, step: u32, reason: impl Into<String>) -> Self {
        Self::CollectiveCommunicationFailure {
            peer,
            step,
            reason: reason.into(),
        }
    }

    /// The `(peer, step)` pair for a collective failure, if this is one.
    pub fn failed_peer(&self) -> Option<(Rank, u32)> {
        match self {
            Self::CollectiveCommunicationFailure { peer, step, .. } => Some((*peer, *step)),
            _ => None,
        }
    }
}
