//! Axis wire protocol: tag byte values, control kinds and application payloads.

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Leading byte of every datagram. Closed set; values are fixed on the wire.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
#[repr(u8)]
pub enum Tag {
    Connect = 0,
    Disconnect = 1,
    String = 2,
    Buffer = 3,
    Object = 4,
}

impl Tag {
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    pub fn is_control(self) -> bool {
        matches!(self, Tag::Connect | Tag::Disconnect)
    }
}

impl TryFrom<u8> for Tag {
    type Error = u8;

    fn try_from(b: u8) -> Result<Self, u8> {
        match b {
            0 => Ok(Tag::Connect),
            1 => Ok(Tag::Disconnect),
            2 => Ok(Tag::String),
            3 => Ok(Tag::Buffer),
            4 => Ok(Tag::Object),
            other => Err(other),
        }
    }
}

/// Membership control carried by a tag-only datagram.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum Control {
    /// Sender joins the receiver's peer list.
    Connect,
    /// Sender leaves the receiver's peer list.
    Disconnect,
}

impl Control {
    pub fn tag(self) -> Tag {
        match self {
            Control::Connect => Tag::Connect,
            Control::Disconnect => Tag::Disconnect,
        }
    }
}

/// Application payload. The variant decides the tag it travels under.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// UTF-8 text (`STRING`).
    Text(String),
    /// Raw bytes (`BUFFER`), delivered unchanged.
    Binary(Vec<u8>),
    /// Structured value (`OBJECT`), JSON on the wire.
    Object(serde_json::Value),
}

impl Payload {
    /// Structured payload from any serializable value.
    pub fn object<T: Serialize + ?Sized>(value: &T) -> Result<Self, serde_json::Error> {
        serde_json::to_value(value).map(Payload::Object)
    }

    pub fn tag(&self) -> Tag {
        match self {
            Payload::Text(_) => Tag::String,
            Payload::Binary(_) => Tag::Buffer,
            Payload::Object(_) => Tag::Object,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_binary(&self) -> Option<&[u8]> {
        match self {
            Payload::Binary(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&serde_json::Value> {
        match self {
            Payload::Object(v) => Some(v),
            _ => None,
        }
    }

    /// Deserialize an `Object` payload into `T`. `None` for text and binary payloads.
    pub fn deserialize_object<T: DeserializeOwned>(&self) -> Option<Result<T, serde_json::Error>> {
        self.as_object().map(|v| serde_json::from_value(v.clone()))
    }
}

impl From<String> for Payload {
    fn from(s: String) -> Self {
        Payload::Text(s)
    }
}

impl From<&str> for Payload {
    fn from(s: &str) -> Self {
        Payload::Text(s.to_string())
    }
}

impl From<Vec<u8>> for Payload {
    fn from(b: Vec<u8>) -> Self {
        Payload::Binary(b)
    }
}

impl From<&[u8]> for Payload {
    fn from(b: &[u8]) -> Self {
        Payload::Binary(b.to_vec())
    }
}

impl From<serde_json::Value> for Payload {
    fn from(v: serde_json::Value) -> Self {
        Payload::Object(v)
    }
}
