//! Versioned cache payloads.
//!
//! Every cached value is wrapped as `{"kind": .., "v": .., "data": ..}`.
//! Reading back a different kind or version, or anything unparsable, yields
//! `None` so the caller treats it as a miss and refetches from the store.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::models::ContentItem;

/// A type with a stable cache representation.
///
/// Bump `VERSION` whenever the serialized shape changes; entries written by
/// the old shape then read as misses until their TTL runs out.
pub trait Cacheable: Serialize + DeserializeOwned {
    const KIND: &'static str;
    const VERSION: u32;
}

impl Cacheable for ContentItem {
    const KIND: &'static str = "content_item";
    const VERSION: u32 = 1;
}

/// Lists share the element's kind and version; the shape check is serde's.
impl<T: Cacheable> Cacheable for Vec<T> {
    const KIND: &'static str = T::KIND;
    const VERSION: u32 = T::VERSION;
}

#[derive(Serialize)]
struct EnvelopeRef<'a, T> {
    kind: &'a str,
    v: u32,
    data: &'a T,
}

#[derive(Deserialize)]
struct Header {
    kind: String,
    v: u32,
}

#[derive(Deserialize)]
struct Envelope<T> {
    data: T,
}

/// Serialize `value` into its envelope.
pub fn encode<T: Cacheable>(value: &T) -> serde_json::Result<String> {
    serde_json::to_string(&EnvelopeRef {
        kind: T::KIND,
        v: T::VERSION,
        data: value,
    })
}

/// Deserialize an envelope written by [`encode`], or `None` on any mismatch.
pub fn decode<T: Cacheable>(key: &str, raw: &str) -> Option<T> {
    let header: Header = match serde_json::from_str(raw) {
        Ok(header) => header,
        Err(e) => {
            warn!("cache: unreadable entry {}: {}", key, e);
            return None;
        }
    };

    if header.kind != T::KIND || header.v != T::VERSION {
        warn!(
            "cache: entry {} is {} v{}, expected {} v{}",
            key,
            header.kind,
            header.v,
            T::KIND,
            T::VERSION
        );
        return None;
    }

    match serde_json::from_str::<Envelope<T>>(raw) {
        Ok(envelope) => Some(envelope.data),
        Err(e) => {
            warn!("cache: failed to deserialize {}: {}", key, e);
            None
        }
    }
}
