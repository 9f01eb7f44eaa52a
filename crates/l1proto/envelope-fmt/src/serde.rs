//! Serde support.
//!
//! [`ExtensionKey`] serializes as a string in human-readable formats and as
//! raw bytes otherwise, and is validated again on deserialize.
//!
//! [`Envelope`] serializes to the indexer record shape.  The body itself is
//! left out; it is described by its digest, size and media type.  Byte fields
//! are hex strings and empty fields are omitted:
//!
//! ```text
//! {
//!   "file": { "hash": "2cf2...", "size": 5, "type": "text/plain" },
//!   "parent": "<txid>:<vout>",
//!   "bitcom": { "1PuQa7K62MiKCtssSLKy1kh56WWU7MtUR5": "534554" },
//!   "prefix": "51",
//!   "suffix": "75"
//! }
//! ```

use std::collections::BTreeMap;

use bitcoin::{OutPoint, hashes::sha256};
use serde::de;
use serde::{Deserialize, Serialize};

use crate::envelope::Envelope;
use crate::key::ExtensionKey;

impl Serialize for ExtensionKey {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        if s.is_human_readable() {
            s.serialize_str(self.as_str())
        } else {
            s.serialize_bytes(self.as_bytes())
        }
    }
}

impl<'de> Deserialize<'de> for ExtensionKey {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        struct KeyVisitor;

        impl de::Visitor<'_> for KeyVisitor {
            type Value = ExtensionKey;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "an address string")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<ExtensionKey, E> {
                ExtensionKey::parse(v).map_err(E::custom)
            }

            fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<ExtensionKey, E> {
                ExtensionKey::from_tag_bytes(v, None).map_err(E::custom)
            }
        }

        if d.is_human_readable() {
            d.deserialize_str(KeyVisitor)
        } else {
            d.deserialize_bytes(KeyVisitor)
        }
    }
}

/// Byte slice written as a hex string.
struct HexRef<'a>(&'a [u8]);

impl Serialize for HexRef<'_> {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        hex::serde::serialize(self.0, s)
    }
}

fn is_empty(bytes: &HexRef<'_>) -> bool {
    bytes.0.is_empty()
}

#[derive(Serialize)]
struct FileRecord<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    hash: Option<sha256::Hash>,
    size: usize,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    content_type: Option<&'a str>,
}

#[derive(Serialize)]
struct EnvelopeRecord<'a> {
    file: FileRecord<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parent: Option<OutPoint>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    bitcom: BTreeMap<&'a ExtensionKey, HexRef<'a>>,
    #[serde(skip_serializing_if = "is_empty")]
    prefix: HexRef<'a>,
    #[serde(skip_serializing_if = "is_empty")]
    suffix: HexRef<'a>,
}

impl<'a> From<&'a Envelope> for EnvelopeRecord<'a> {
    fn from(envelope: &'a Envelope) -> Self {
        let content = envelope.content();
        Self {
            file: FileRecord {
                hash: content.map(|c| c.hash()),
                size: content.map_or(0, |c| c.size()),
                content_type: envelope.content_type(),
            },
            parent: envelope.parent(),
            bitcom: envelope
                .extensions()
                .iter()
                .map(|(k, v)| (k, HexRef(v)))
                .collect(),
            prefix: HexRef(envelope.prefix()),
            suffix: HexRef(envelope.suffix()),
        }
    }
}

impl Serialize for Envelope {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        EnvelopeRecord::from(self).serialize(s)
    }
}
