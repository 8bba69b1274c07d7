//! Values carried by triggers and bindings.

use serde_json::Value;
use thiserror::Error;

use crate::{DataShape, HttpRequest};

/// A bound value handed to, or produced by, a function.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Binary(Vec<u8>),
    Text(String),
    Structured(Value),
    /// The request that fired an HTTP trigger.
    Http(HttpRequest),
}

/// Raised when raw bytes cannot be read as the declared shape.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PayloadShapeError {
    #[error("payload is not valid UTF-8 text: {reason}")]
    InvalidText { reason: String },

    #[error("payload is not a valid JSON document: {reason}")]
    InvalidJson { reason: String },

    #[error("an HTTP request cannot be bound as {shape}")]
    NotConvertible { shape: DataShape },
}

impl Payload {
    /// Decode raw bytes according to `shape`.
    pub fn from_bytes(bytes: Vec<u8>, shape: DataShape) -> Result<Self, PayloadShapeError> {
        match shape {
            DataShape::Binary => Ok(Payload::Binary(bytes)),
            DataShape::Text => String::from_utf8(bytes)
                .map(Payload::Text)
                .map_err(|error| PayloadShapeError::InvalidText { reason: error.to_string() }),
            DataShape::Structured => serde_json::from_slice(&bytes)
                .map(Payload::Structured)
                .map_err(|error| PayloadShapeError::InvalidJson { reason: error.to_string() }),
        }
    }

    /// Re-read this payload as `shape`, going through its byte representation.
    pub fn coerce(self, shape: DataShape) -> Result<Self, PayloadShapeError> {
        match (self, shape) {
            (Payload::Binary(bytes), shape) => Payload::from_bytes(bytes, shape),
            (Payload::Text(text), DataShape::Text) => Ok(Payload::Text(text)),
            (Payload::Text(text), shape) => Payload::from_bytes(text.into_bytes(), shape),
            (Payload::Structured(value), DataShape::Structured) => Ok(Payload::Structured(value)),
            (Payload::Structured(value), shape) => Payload::from_bytes(value.to_string().into_bytes(), shape),
            (Payload::Http(_), shape) => Err(PayloadShapeError::NotConvertible { shape }),
        }
    }

    /// Serialised bytes for storage. HTTP requests are not storable.
    pub fn to_bytes(&self) -> Option<Vec<u8>> {
        match self {
            Payload::Binary(bytes) => Some(bytes.clone()),
            Payload::Text(text) => Some(text.as_bytes().to_vec()),
            Payload::Structured(value) => serde_json::to_vec(value).ok(),
            Payload::Http(_) => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Payload::Binary(bytes) => Some(bytes),
            Payload::Text(text) => Some(text.as_bytes()),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Payload::Structured(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_http(&self) -> Option<&HttpRequest> {
        match self {
            Payload::Http(request) => Some(request),
            _ => None,
        }
    }

    /// Size in bytes of the stored representation.
    pub fn len(&self) -> usize {
        match self {
            Payload::Binary(bytes) => bytes.len(),
            Payload::Text(text) => text.len(),
            Payload::Structured(value) => value.to_string().len(),
            Payload::Http(request) => request.body.as_ref().map(String::len).unwrap_or(0),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
