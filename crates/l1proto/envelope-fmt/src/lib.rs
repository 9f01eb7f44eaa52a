//! Codec for ord envelopes embedded in Bitcoin-style scripts.
//!
//! An envelope is a tagged-field container placed inside an unexecuted
//! `OP_FALSE OP_IF ... OP_ENDIF` branch.  It carries a file body plus
//! metadata: a content type, a parent outpoint and extension records keyed by
//! address strings for protocols layered on top.
//!
//! # Envelope Structure
//!
//! ```text
//! <prefix>
//! OP_FALSE
//! OP_IF
//! OP_PUSHBYTES_3 "ord"
//! <tag> <value>      (zero or more)
//! OP_0 <content>
//! OP_ENDIF
//! <suffix>
//! ```
//!
//! Tags are small integer opcodes or data pushes.  Field code 0 is the
//! content and ends the field loop, 1 is the content type and 3 is the parent
//! outpoint.  A multi-byte tag that parses as an address is an extension key;
//! any other tag is skipped.
//!
//! Decoding is best effort and never fails: a script without the marker
//! decodes to `None`, and a damaged envelope decodes to whatever was read
//! before the damage.
//!
//! # Examples
//!
//! ```
//! use ord_envelope_fmt::{Envelope, build_envelope_script, decode_envelope};
//!
//! let envelope = Envelope::new(b"hello".to_vec()).with_content_type("text/plain");
//! let script = build_envelope_script(&envelope).unwrap();
//!
//! let decoded = decode_envelope(script.as_bytes()).unwrap();
//! assert_eq!(decoded.body(), Some(&b"hello"[..]));
//! assert_eq!(decoded.content_type(), Some("text/plain"));
//! ```
//!
//! Walking every envelope in a script:
//! ```
//! use ord_envelope_fmt::{Envelope, Termination, build_envelope_script, decode_envelopes};
//!
//! let mut script = build_envelope_script(&Envelope::new(b"a".to_vec())).unwrap().into_bytes();
//! script.extend(build_envelope_script(&Envelope::new(b"b".to_vec())).unwrap().into_bytes());
//!
//! let bodies: Vec<_> = decode_envelopes(&script)
//!     .filter(|d| d.termination() == Termination::Closed)
//!     .map(|d| d.into_envelope().body().unwrap().to_vec())
//!     .collect();
//! assert_eq!(bodies, vec![b"a".to_vec(), b"b".to_vec()]);
//! ```

#[cfg(feature = "arbitrary")]
mod arbitrary;
#[cfg(feature = "serde")]
mod serde;

/// Envelope script builder utilities.
pub mod builder;

/// Decoding and encoding configuration.
pub mod config;

/// Envelope record types.
pub mod envelope;

/// Error types for envelope operations.
pub mod errors;

pub mod field;
pub mod key;
pub mod parser;
pub mod reader;

// Only the serde tests use these.
#[cfg(all(test, not(feature = "serde")))]
use {bincode as _, serde_json as _};

pub use builder::build_envelope_script;
pub use config::ParseConfig;
pub use envelope::{Content, Envelope, PROTOCOL_ID};
pub use errors::{EnvelopeBuildError, InvalidExtensionKey};
pub use field::FieldCode;
pub use key::ExtensionKey;
pub use parser::{DecodedEnvelope, Envelopes, Termination};

/// Decodes the first `"ord"` envelope in `script`.
///
/// Returns `None` if the script holds no envelope marker.
pub fn decode_envelope(script: &[u8]) -> Option<Envelope> {
    ParseConfig::default().decode(script)
}

/// Iterates over every `"ord"` envelope in `script`.
pub fn decode_envelopes(script: &[u8]) -> Envelopes<'_> {
    ParseConfig::default().decode_all(script)
}
