//! Wire format of the messages ranks exchange during a collective.

mod header;
mod message;

pub use header::{FrameHeader, FrameKind, HEADER_SIZE};
pub use message::ControlMessage;

use crate::error::{ReduceError, Result};
use crate::reduce::{Element, encode_elements};

/// A decoded frame borrowing its payload from the received buffer.
#[derive(Debug)]
pub enum Frame<'a> {
    Data {
        header: FrameHeader,
        payload: &'a [u8],
    },
    Control {
        header: FrameHeader,
        message: ControlMessage,
    },
}

/// Element count of a `len`-element buffer as carried in the frame header.
pub fn element_count(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| {
        ReduceError::EncodeFailed(format!(
            "{len} elements exceed the per-frame limit of {}",
            u32::MAX
        ))
    })
}

/// Encode a partial result as a data frame.
pub fn encode_data<T: Element>(epoch: u64, step: u32, values: &[T]) -> Result<Vec<u8>> {
    let count = element_count(values.len())?;
    let header = FrameHeader::data(T::DTYPE, epoch, step, count);
    let mut out = Vec::with_capacity(HEADER_SIZE + values.len() * T::DTYPE.size_in_bytes());
    out.extend_from_slice(&header.encode());
    out.extend_from_slice(&encode_elements(values));
    Ok(out)
}

/// Encode a control message frame.
pub fn encode_control(epoch: u64, step: u32, message: &ControlMessage) -> Result<Vec<u8>> {
    let body = message.to_bytes()?;
    let len = u32::try_from(body.len())
        .map_err(|_| ReduceError::EncodeFailed("control message too large".into()))?;
    let mut out = Vec::with_capacity(HEADER_SIZE + body.len());
    out.extend_from_slice(&FrameHeader::control(epoch, step, len).encode());
    out.extend_from_slice(&body);
    Ok(out)
}

/// Decode a frame, checking that the payload length matches the header.
pub fn decode_frame(bytes: &[u8]) -> Result<Frame<'_>> {
    let Some((head, payload)) = bytes.split_first_chunk::<HEADER_SIZE>() else {
        return Err(ReduceError::DecodeFailed(format!(
            "frame of {} bytes is shorter than the {HEADER_SIZE}-byte header",
            bytes.len()
        )));
    };
    let header = FrameHeader::decode(head)
        .ok_or_else(|| ReduceError::DecodeFailed(format!("invalid frame kind {}", head[0])))?;
    let expected = header.payload_len()?;
    if payload.len() != expected {
        return Err(ReduceError::DecodeFailed(format!(
            "payload is {} bytes, header announces {expected}",
            payload.len()
        )));
    }
    match header.kind {
        FrameKind::Data => Ok(Frame::Data { header, payload }),
        FrameKind::Control => Ok(Frame::Control {
            header,
            message: ControlMessage::from_bytes(payload)?,
        }),
    }
}
