use crate::error::{ReduceError, Result};
use crate::types::DataType;

/// Size of the frame header in bytes.
pub const HEADER_SIZE: usize = 24;

/// Type tag for the payload that follows the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameKind {
    /// Raw little-endian elements of a partial result.
    Data = 0,
    /// rkyv-encoded [`ControlMessage`](super::ControlMessage).
    Control = 1,
}

impl FrameKind {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(FrameKind::Data),
            1 => Some(FrameKind::Control),
            _ => None,
        }
    }
}

/// 24-byte header prepended to every exchange message.
///
/// ```text
/// [0]      kind: u8
/// [1]      dtype: u8 (Data frames; 0 otherwise)
/// [2..4]   reserved (must be 0)
/// [4..8]   step: u32 LE
/// [8..16]  epoch: u64 LE
/// [16..20] count: u32 LE (elements for Data, payload bytes for Control)
/// [20..24] reserved (must be 0)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub kind: FrameKind,
    pub dtype: u8,
    pub step: u32,
    pub epoch: u64,
    pub count: u32,
}

impl FrameHeader {
    pub fn data(dtype: DataType, epoch: u64, step: u32, count: u32) -> Self {
        Self {
            kind: FrameKind::Data,
            dtype: dtype as u8,
            step,
            epoch,
            count,
        }
    }

    pub fn control(epoch: u64, step: u32, len: u32) -> Self {
        Self {
            kind: FrameKind::Control,
            dtype: 0,
            step,
            epoch,
            count: len,
        }
    }

    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0] = self.kind as u8;
        buf[1] = self.dtype;
        buf[4..8].copy_from_slice(&self.step.to_le_bytes());
        buf[8..16].copy_from_slice(&self.epoch.to_le_bytes());
        buf[16..20].copy_from_slice(&self.count.to_le_bytes());
        buf
    }

    /// Decode a header. Returns `None` if the kind byte is invalid.
    pub fn decode(buf: &[u8; HEADER_SIZE]) -> Option<Self> {
        let kind = FrameKind::from_u8(buf[0])?;
        Some(Self {
            kind,
            dtype: buf[1],
            step: u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]),
            epoch: u64::from_le_bytes([
                buf[8], buf[9], buf[10], buf[11], buf[12], buf[13], buf[14], buf[15],
            ]),
            count: u32::from_le_bytes([buf[16], buf[17], buf[18], buf[19]]),
        })
    }

    /// Payload size implied by this header.
    pub fn payload_len(&self) -> Result<usize> {
        match self.kind {
            FrameKind::Control => Ok(self.count as usize),
            FrameKind::Data => {
                let dtype = DataType::from_u8(self.dtype).ok_or_else(|| {
                    ReduceError::DecodeFailed(format!("unknown dtype tag {}", self.dtype))
                })?;
                Ok(self.count as usize * dtype.size_in_bytes())
            }
        }
    }
}
