//! Record codecs.

use std::marker::PhantomData;

use tessera_core::{Record, StoreError, TesseraError, TesseraResult};

/// Moves a typed record to and from blob bytes.
pub trait RecordCodec<T: Record>: Send + Sync {
    fn encode(&self, record: &T) -> TesseraResult<Vec<u8>>;

    /// Decode the blob stored at `key`. Failures are `CorruptRecord`.
    fn decode(&self, key: &str, bytes: &[u8]) -> TesseraResult<T>;
}

/// JSON codec via `serde_json`.
#[derive(Debug)]
pub struct JsonCodec<T> {
    _record: PhantomData<fn() -> T>,
}

impl<T> JsonCodec<T> {
    pub fn new() -> Self {
        Self {
            _record: PhantomData,
        }
    }
}

impl<T> Default for JsonCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Record> RecordCodec<T> for JsonCodec<T> {
    fn encode(&self, record: &T) -> TesseraResult<Vec<u8>> {
        serde_json::to_vec(record).map_err(|e| {
            TesseraError::Store(StoreError::SerializationFailed {
                reason: e.to_string(),
            })
        })
    }

    fn decode(&self, key: &str, bytes: &[u8]) -> TesseraResult<T> {
        serde_json::from_slice(bytes).map_err(|e| TesseraError::corrupt(key, e.to_string()))
    }
}
