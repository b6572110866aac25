//! Request payload codecs.
//!
//! The work queue stores serialized records; each adapter instantiation
//! supplies a pure mapping between its domain request type and the stored
//! record. Encode and decode are independent functions rather than a single
//! reflective mechanism, so a queue entry written by one process can be
//! interpreted by another that only shares the codec.

use std::marker::PhantomData;

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Failure to map between a domain request and its stored record.
#[derive(Debug, Error)]
#[error("codec error: {0}")]
pub struct CodecError(#[from] pub serde_json::Error);

/// A pure two-way mapping between a domain request type and the JSON record
/// the queue stores.
pub trait RequestCodec<R>: Send + Sync {
    fn encode(&self, request: &R) -> Result<serde_json::Value, CodecError>;
    fn decode(&self, record: &serde_json::Value) -> Result<R, CodecError>;
}

/// Serde-backed codec for request types that serialize directly.
pub struct JsonCodec<R>(PhantomData<fn() -> R>);

impl<R> JsonCodec<R> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<R> Default for JsonCodec<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> RequestCodec<R> for JsonCodec<R>
where
    R: Serialize + DeserializeOwned + Send + Sync,
{
    fn encode(&self, request: &R) -> Result<serde_json::Value, CodecError> {
        Ok(serde_json::to_value(request)?)
    }

    fn decode(&self, record: &serde_json::Value) -> Result<R, CodecError> {
        Ok(serde_json::from_value(record.clone())?)
    }
}
