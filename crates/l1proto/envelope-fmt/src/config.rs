use bitcoin::{Network, ScriptBuf};

use crate::{
    builder::build_envelope,
    envelope::Envelope,
    errors::EnvelopeBuildError,
    parser::{DecodedEnvelope, Envelopes, decode_at},
};

/// Config for decoding and encoding envelopes.
///
/// The default config accepts extension keys for any network.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ParseConfig {
    /// If set, extension keys must be addresses for this network.
    extension_network: Option<Network>,
}

impl ParseConfig {
    /// Requires extension keys to be addresses for `network`.
    pub fn with_extension_network(mut self, network: Network) -> Self {
        self.extension_network = Some(network);
        self
    }

    /// Gets the network extension keys are checked against, if any.
    pub fn extension_network(&self) -> Option<Network> {
        self.extension_network
    }

    /// Decodes the first envelope in `script`.
    pub fn decode(&self, script: &[u8]) -> Option<Envelope> {
        self.decode_at(script, 0).map(DecodedEnvelope::into_envelope)
    }

    /// Decodes the first envelope found at or after byte offset `start`.
    ///
    /// The envelope prefix holds the bytes from `start` up to the marker.
    pub fn decode_at(&self, script: &[u8], start: usize) -> Option<DecodedEnvelope> {
        decode_at(self, script, start)
    }

    /// Iterates over every envelope in `script`.
    pub fn decode_all<'a>(&self, script: &'a [u8]) -> Envelopes<'a> {
        Envelopes::new(self.clone(), script)
    }

    /// Encodes `envelope` into a script.
    ///
    /// Extension keys are written as they are; the network requirement only
    /// applies when decoding.
    pub fn encode(&self, envelope: &Envelope) -> Result<ScriptBuf, EnvelopeBuildError> {
        build_envelope(envelope)
    }
}
