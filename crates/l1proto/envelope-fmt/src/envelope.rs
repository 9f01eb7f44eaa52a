use std::collections::BTreeMap;

use bitcoin::{
    OutPoint,
    hashes::{Hash, sha256},
};

use crate::key::ExtensionKey;

/// Payload of the push that directly follows `OP_FALSE OP_IF`.
pub const PROTOCOL_ID: [u8; 3] = *b"ord";

/// Maximum length (exclusive) of a content type string.
pub const MAX_CONTENT_TYPE_LEN: usize = 256;

/// Length of an encoded parent outpoint (32-byte txid + 4-byte vout).
pub const PARENT_LEN: usize = 36;

/// File body carried by an envelope, along with its digest and size.
///
/// The only way to build one is from the body, so `hash` and `size` always
/// describe `body`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Content {
    body: Vec<u8>,
    hash: sha256::Hash,
    size: usize,
}

impl Content {
    /// Wraps a body, computing its digest.
    pub fn new(body: Vec<u8>) -> Self {
        let hash = sha256::Hash::hash(&body);
        let size = body.len();
        Self { body, hash, size }
    }

    /// Gets the body bytes.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Gets the SHA-256 digest of the body.
    pub fn hash(&self) -> sha256::Hash {
        self.hash
    }

    /// Gets the body length in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Converts into the body bytes.
    pub fn into_body(self) -> Vec<u8> {
        self.body
    }
}

/// Decoded envelope record.
///
/// Produced by decoding a script or assembled field by field with the `with_*`
/// methods before being handed to the encoder.  Every byte field is an owned
/// copy, independent of the buffer it was decoded from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Envelope {
    content: Option<Content>,
    content_type: Option<String>,
    parent: Option<OutPoint>,
    extensions: BTreeMap<ExtensionKey, Vec<u8>>,
    prefix: Vec<u8>,
    suffix: Vec<u8>,
}

impl Envelope {
    /// Creates an envelope carrying `body` and nothing else.
    pub fn new(body: Vec<u8>) -> Self {
        Self::default().with_content(body)
    }

    /// Sets the content body.
    pub fn with_content(mut self, body: Vec<u8>) -> Self {
        self.content = Some(Content::new(body));
        self
    }

    /// Sets the content type.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Sets the parent outpoint.
    pub fn with_parent(mut self, parent: OutPoint) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Adds an extension record, replacing any previous value under `key`.
    pub fn with_extension(mut self, key: ExtensionKey, value: Vec<u8>) -> Self {
        self.extensions.insert(key, value);
        self
    }

    /// Sets the script bytes emitted before the envelope.
    pub fn with_prefix(mut self, prefix: Vec<u8>) -> Self {
        self.prefix = prefix;
        self
    }

    /// Sets the script bytes emitted after the envelope.
    pub fn with_suffix(mut self, suffix: Vec<u8>) -> Self {
        self.suffix = suffix;
        self
    }

    /// Gets the content, if the envelope carried one.
    pub fn content(&self) -> Option<&Content> {
        self.content.as_ref()
    }

    /// Gets the content body, if any.
    pub fn body(&self) -> Option<&[u8]> {
        self.content.as_ref().map(Content::body)
    }

    /// Gets the content type, if any.
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Gets the parent outpoint, if any.
    pub fn parent(&self) -> Option<OutPoint> {
        self.parent
    }

    /// Gets the extension records.
    pub fn extensions(&self) -> &BTreeMap<ExtensionKey, Vec<u8>> {
        &self.extensions
    }

    /// Gets a single extension value.
    pub fn extension(&self, key: &ExtensionKey) -> Option<&[u8]> {
        self.extensions.get(key).map(Vec::as_slice)
    }

    /// Gets the bytes preceding the envelope marker.
    pub fn prefix(&self) -> &[u8] {
        &self.prefix
    }

    /// Gets the bytes following the envelope.
    ///
    /// Empty when the envelope was closed by `OP_ENDIF`.
    pub fn suffix(&self) -> &[u8] {
        &self.suffix
    }

    pub(crate) fn set_content(&mut self, body: &[u8]) {
        self.content = Some(Content::new(body.to_vec()));
    }

    pub(crate) fn set_content_type(&mut self, content_type: String) {
        self.content_type = Some(content_type);
    }

    pub(crate) fn set_parent(&mut self, parent: OutPoint) {
        self.parent = Some(parent);
    }

    pub(crate) fn insert_extension(&mut self, key: ExtensionKey, value: &[u8]) {
        self.extensions.insert(key, value.to_vec());
    }

    pub(crate) fn set_suffix(&mut self, suffix: &[u8]) {
        self.suffix = suffix.to_vec();
    }
}
