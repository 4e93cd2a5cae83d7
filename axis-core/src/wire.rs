//! Framing: 1 tag byte + payload. Control frames are the tag byte alone.

use crate::protocol::{Control, Payload, Tag};

const TAG_SIZE: usize = 1;
/// Largest UDP payload over IPv4 (65535 - 8 byte UDP header - 20 byte IP header).
pub const MAX_DATAGRAM_LEN: usize = 65_507;

/// A decoded datagram.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Control(Control),
    Payload(Payload),
}

/// Encode an application payload: tag byte followed by its bytes.
pub fn encode_frame(payload: &Payload) -> Result<Vec<u8>, FrameEncodeError> {
    let body: std::borrow::Cow<'_, [u8]> = match payload {
        Payload::Text(s) => s.as_bytes().into(),
        Payload::Binary(b) => b.as_slice().into(),
        Payload::Object(v) => serde_json::to_vec(v)?.into(),
    };
    let len = TAG_SIZE + body.len();
    if len > MAX_DATAGRAM_LEN {
        return Err(FrameEncodeError::TooLarge(len));
    }
    let mut out = Vec::with_capacity(len);
    out.push(payload.tag().as_byte());
    out.extend_from_slice(&body);
    Ok(out)
}

/// Encode a control datagram. Always exactly one byte.
pub fn encode_control(control: Control) -> [u8; TAG_SIZE] {
    [control.tag().as_byte()]
}

/// Error encoding a payload into a datagram.
#[derive(Debug, thiserror::Error)]
pub enum FrameEncodeError {
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("frame of {0} bytes exceeds the datagram limit")]
    TooLarge(usize),
}

/// Decode one datagram. Bytes after a control tag are ignored.
pub fn decode_frame(bytes: &[u8]) -> Result<Frame, FrameDecodeError> {
    let (&first, body) = bytes.split_first().ok_or(FrameDecodeError::Empty)?;
    let tag = Tag::try_from(first).map_err(FrameDecodeError::UnknownTag)?;
    let frame = match tag {
        Tag::Connect => Frame::Control(Control::Connect),
        Tag::Disconnect => Frame::Control(Control::Disconnect),
        Tag::String => {
            let text = std::str::from_utf8(body).map_err(FrameDecodeError::Text)?;
            Frame::Payload(Payload::Text(text.to_string()))
        }
        Tag::Buffer => Frame::Payload(Payload::Binary(body.to_vec())),
        Tag::Object => Frame::Payload(Payload::Object(serde_json::from_slice(body)?)),
    };
    Ok(frame)
}

/// Error decoding a datagram (empty, unknown tag, or malformed payload).
#[derive(Debug, thiserror::Error)]
pub enum FrameDecodeError {
    #[error("empty datagram")]
    Empty,
    #[error("unknown tag {0}")]
    UnknownTag(u8),
    #[error("text payload is not UTF-8: {0}")]
    Text(#[from] std::str::Utf8Error),
    #[error("object payload is not JSON: {0}")]
    Object(#[from] serde_json::Error),
}
