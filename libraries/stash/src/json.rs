//! JSON values on top of a [`KeyValueStore`].
//!
//! Reads are lenient: a missing key, an unreadable store or a value that no
//! longer matches the expected shape all come back as `None`, with anything
//! other than a missing key logged. [`try_read_json`] is the variant for
//! read-modify-write: it still forgives a malformed value but hands a store
//! failure back, so the caller never rebuilds a value from nothing and
//! overwrites what was there. Writes serialize fully before touching the store.

use serde::{Serialize, de::DeserializeOwned};

use crate::{KeyValueStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("Could not serialize value for {key}: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub fn read_json<T: DeserializeOwned>(store: &(impl KeyValueStore + ?Sized), key: &str) -> Option<T> {
    let raw = match store.get(key) {
        Ok(raw) => raw?,
        Err(e) => {
            log::error!("Failed to read {key}: {e}");
            return None;
        }
    };
    serde_json::from_str(&raw)
        .inspect_err(|e| log::warn!("Ignoring malformed value stored at {key}: {e}"))
        .ok()
}

/// Like [`read_json`], but an unreadable store is an error rather than `None`.
pub fn try_read_json<T: DeserializeOwned>(
    store: &(impl KeyValueStore + ?Sized),
    key: &str,
) -> Result<Option<T>, StoreError> {
    let Some(raw) = store.get(key)? else {
        return Ok(None);
    };
    Ok(serde_json::from_str(&raw)
        .inspect_err(|e| log::warn!("Ignoring malformed value stored at {key}: {e}"))
        .ok())
}

pub fn encode_json<T: Serialize + ?Sized>(key: &str, value: &T) -> Result<String, WriteError> {
    serde_json::to_string(value).map_err(|source| WriteError::Encode {
        key: key.to_string(),
        source,
    })
}

pub fn write_json<T: Serialize + ?Sized>(
    store: &(impl KeyValueStore + ?Sized),
    key: &str,
    value: &T,
) -> Result<(), WriteError> {
    let encoded = encode_json(key, value)?;
    store.set(key, &encoded)?;
    Ok(())
}
