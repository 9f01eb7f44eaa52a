//! Marker scanning and field decoding.
//!
//! Decoding never fails.  A script without the marker decodes to `None`; a
//! malformed envelope decodes to whatever was accumulated before the problem,
//! with [`Termination`] recording how the field loop ended.

use std::ops::Range;

use bitcoin::{
    OutPoint, consensus,
    opcodes::{
        OP_FALSE,
        all::{OP_ENDIF, OP_IF, OP_PUSHBYTES_3},
    },
    script::Instruction,
};
use tracing::debug;

use crate::{
    config::ParseConfig,
    envelope::{Envelope, MAX_CONTENT_TYPE_LEN, PARENT_LEN, PROTOCOL_ID},
    field::{FieldCode, Operand, Tag},
    key::ExtensionKey,
    reader::InstructionReader,
};

/// How the field loop of a decoded envelope ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Termination {
    /// Content was read and followed by `OP_ENDIF`.
    Closed,

    /// Content was read but not followed by `OP_ENDIF`.  The bytes after the
    /// instruction found in its place, or after the content if the script
    /// ends there, are kept as the envelope suffix.
    Unclosed,

    /// The field loop hit end of script or an instruction that cannot be a
    /// tag or value before any content was read.
    Truncated,
}

/// An envelope together with where and how it was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedEnvelope {
    envelope: Envelope,
    termination: Termination,
    span: Range<usize>,
}

impl DecodedEnvelope {
    /// Gets the decoded envelope.
    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    /// Converts into the decoded envelope.
    pub fn into_envelope(self) -> Envelope {
        self.envelope
    }

    /// Gets how the field loop ended.
    pub fn termination(&self) -> Termination {
        self.termination
    }

    /// Byte range of the script occupied by the envelope, from the opening
    /// `OP_FALSE` to the last byte consumed by the decoder.
    pub fn span(&self) -> Range<usize> {
        self.span.clone()
    }
}

/// Decodes the first envelope found at or after byte offset `start`.
pub(crate) fn decode_at(
    config: &ParseConfig,
    script: &[u8],
    start: usize,
) -> Option<DecodedEnvelope> {
    let mut reader = InstructionReader::at(script, start);
    let marker_start = find_marker(&mut reader, start)?;

    let mut envelope = Envelope::default().with_prefix(script[start..marker_start].to_vec());
    let termination = decode_fields(config, &mut reader, &mut envelope);

    Some(DecodedEnvelope {
        envelope,
        termination,
        span: marker_start..reader.offset(),
    })
}

/// Advances `reader` past the next envelope marker, returning the offset of
/// its `OP_FALSE`.
fn find_marker(reader: &mut InstructionReader<'_>, start: usize) -> Option<usize> {
    let script = reader.buf();
    loop {
        let pos = reader.offset();
        let ins = reader.next_instruction()?;

        if pos < start + 2 || script[pos] != OP_PUSHBYTES_3.to_u8() {
            continue;
        }

        let is_protocol_push = matches!(
            ins,
            Instruction::PushBytes(bytes) if bytes.as_bytes() == PROTOCOL_ID
        );
        if is_protocol_push && script[pos - 2..pos] == [OP_FALSE.to_u8(), OP_IF.to_u8()] {
            return Some(pos - 2);
        }
    }
}

/// Runs the field loop and the closing check, filling in `envelope`.
fn decode_fields(
    config: &ParseConfig,
    reader: &mut InstructionReader<'_>,
    envelope: &mut Envelope,
) -> Termination {
    loop {
        let Some(tag) = next_operand(reader) else {
            debug!(position = reader.offset(), "envelope truncated at tag");
            return Termination::Truncated;
        };
        let Some(value) = next_operand(reader) else {
            debug!(position = reader.offset(), "envelope truncated at value");
            return Termination::Truncated;
        };

        let code = match tag.to_tag() {
            Tag::Field(code) => code,
            Tag::Extension(key) => {
                match ExtensionKey::from_tag_bytes(key, config.extension_network()) {
                    Ok(key) => envelope.insert_extension(key, value.data()),
                    Err(err) => debug!(%err, len = key.len(), "discarding extension tag"),
                }
                continue;
            }
        };

        let data = value.data();
        match code {
            FieldCode::Content => {
                envelope.set_content(data);
                break;
            }
            FieldCode::ContentType => match std::str::from_utf8(data) {
                Ok(s) if data.len() < MAX_CONTENT_TYPE_LEN => {
                    envelope.set_content_type(s.to_owned())
                }
                _ => debug!(len = data.len(), "ignoring invalid content type"),
            },
            FieldCode::Parent => match decode_parent(data) {
                Some(parent) => envelope.set_parent(parent),
                None => debug!(len = data.len(), "ignoring invalid parent"),
            },
            FieldCode::Unknown(code) => {
                debug!(code, len = data.len(), "ignoring unknown field");
            }
        }
    }

    let close_pos = reader.offset();
    let suffix_start = match reader.next_instruction() {
        Some(Instruction::Op(OP_ENDIF)) => return Termination::Closed,
        // A mismatched closing instruction is consumed and dropped.
        Some(_) => reader.offset(),
        None => close_pos,
    };

    debug!(position = close_pos, "envelope not closed by OP_ENDIF");
    envelope.set_suffix(&reader.buf()[suffix_start..]);
    // The suffix takes the rest of the script.
    while reader.next_instruction().is_some() {}
    Termination::Unclosed
}

fn next_operand<'a>(reader: &mut InstructionReader<'a>) -> Option<Operand<'a>> {
    reader
        .next_instruction()
        .and_then(|ins| Operand::from_instruction(&ins))
}

fn decode_parent(data: &[u8]) -> Option<OutPoint> {
    if data.len() != PARENT_LEN {
        return None;
    }
    consensus::deserialize(data).ok()
}

/// Iterator over every envelope in a script.
///
/// Each step resumes scanning where the previous envelope ended, so the prefix
/// of each envelope holds only the bytes between it and its predecessor.
#[derive(Debug, Clone)]
pub struct Envelopes<'a> {
    config: ParseConfig,
    script: &'a [u8],
    pos: usize,
}

impl<'a> Envelopes<'a> {
    pub(crate) fn new(config: ParseConfig, script: &'a [u8]) -> Self {
        Self {
            config,
            script,
            pos: 0,
        }
    }
}

impl Iterator for Envelopes<'_> {
    type Item = DecodedEnvelope;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.script.len() {
            return None;
        }

        match decode_at(&self.config, self.script, self.pos) {
            Some(decoded) => {
                self.pos = decoded.span.end;
                Some(decoded)
            }
            None => {
                self.pos = self.script.len();
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use bitcoin::{Network, Txid, hashes::Hash};
    use proptest::prelude::*;

    use super::*;
    use crate::builder::build_envelope_script;

    const MAP_KEY: &str = "1PuQa7K62MiKCtssSLKy1kh56WWU7MtUR5";

    /// `OP_FALSE OP_IF "ord" 1 "text" 0 "hello" OP_ENDIF`
    const HELLO: &[u8] = &[
        0x00, 0x63, 0x03, 0x6f, 0x72, 0x64, 0x51, 0x04, 0x74, 0x65, 0x78, 0x74, 0x00, 0x05, 0x68,
        0x65, 0x6c, 0x6c, 0x6f, 0x68,
    ];

    fn decode(script: &[u8]) -> Option<DecodedEnvelope> {
        decode_at(&ParseConfig::default(), script, 0)
    }

    fn marker() -> Vec<u8> {
        vec![0x00, 0x63, 0x03, b'o', b'r', b'd']
    }

    fn push(buf: &mut Vec<u8>, data: &[u8]) {
        assert!(data.len() <= 75);
        buf.push(data.len() as u8);
        buf.extend_from_slice(data);
    }

    #[test]
    fn test_decode_hello() {
        let decoded = decode(HELLO).expect("test: should find envelope");
        let envelope = decoded.envelope();
        assert_eq!(envelope.body(), Some(&b"hello"[..]));
        assert_eq!(envelope.content_type(), Some("text"));
        assert_eq!(envelope.content().unwrap().size(), 5);
        assert!(envelope.prefix().is_empty());
        assert!(envelope.suffix().is_empty());
        assert_eq!(decoded.termination(), Termination::Closed);
        assert_eq!(decoded.span(), 0..HELLO.len());
    }

    #[test]
    fn test_decode_hello_without_close() {
        let script = &HELLO[..HELLO.len() - 1];
        let decoded = decode(script).unwrap();
        assert_eq!(decoded.envelope().body(), Some(&b"hello"[..]));
        assert_eq!(decoded.envelope().content_type(), Some("text"));
        assert!(decoded.envelope().suffix().is_empty());
        assert_eq!(decoded.termination(), Termination::Unclosed);
    }

    #[test]
    fn test_mismatched_close_becomes_suffix() {
        let mut script = HELLO[..HELLO.len() - 1].to_vec();
        script.extend_from_slice(&[0x75, 0x51, 0x68]);
        let decoded = decode(&script).unwrap();
        assert_eq!(decoded.envelope().body(), Some(&b"hello"[..]));
        // OP_DROP stood where OP_ENDIF belongs and is not part of the suffix.
        assert_eq!(decoded.envelope().suffix(), &[0x51, 0x68]);
        assert_eq!(decoded.termination(), Termination::Unclosed);
        assert_eq!(decoded.span().end, script.len());
    }

    #[test]
    fn test_mismatched_close_push_is_dropped() {
        let mut script = HELLO[..HELLO.len() - 1].to_vec();
        script.extend_from_slice(&[0x02, 0xab, 0xcd, 0x76]);
        let decoded = decode(&script).unwrap();
        assert_eq!(decoded.envelope().suffix(), &[0x76]);
        assert_eq!(decoded.termination(), Termination::Unclosed);
    }

    #[test]
    fn test_truncated_close_keeps_remaining_bytes() {
        // The closing read fails on a short push, so nothing is consumed.
        let mut script = HELLO[..HELLO.len() - 1].to_vec();
        script.extend_from_slice(&[0x4c, 0x09, 0x01]);
        let decoded = decode(&script).unwrap();
        assert_eq!(decoded.envelope().suffix(), &[0x4c, 0x09, 0x01]);
        assert_eq!(decoded.termination(), Termination::Unclosed);
        assert_eq!(decoded.span().end, script.len());
    }

    #[test]
    fn test_prefix_is_copied() {
        let mut script = vec![0x76, 0xa9, 0x02, 0xab, 0xcd];
        script.extend_from_slice(HELLO);
        let decoded = decode(&script).unwrap();
        assert_eq!(decoded.envelope().prefix(), &[0x76, 0xa9, 0x02, 0xab, 0xcd]);
        assert_eq!(decoded.span(), 5..script.len());
    }

    #[test]
    fn test_absent_without_marker() {
        assert!(decode(&[]).is_none());
        assert!(decode(&[0x00, 0x63]).is_none());
        assert!(decode(&[0x03, b'o', b'r', b'd']).is_none());
        // Marker not preceded by OP_FALSE OP_IF.
        assert!(decode(&[0x51, 0x63, 0x03, b'o', b'r', b'd', 0x00, 0x00, 0x68]).is_none());
        // Wrong protocol id.
        assert!(decode(&[0x00, 0x63, 0x03, b'o', b'r', b'x', 0x00, 0x00, 0x68]).is_none());
        // Non-minimal push of the protocol id.
        assert!(decode(&[0x00, 0x63, 0x4c, 0x03, b'o', b'r', b'd', 0x00, 0x00, 0x68]).is_none());
    }

    #[test]
    fn test_marker_inside_truncated_push_is_absent() {
        let mut script = vec![0x4c, 0xff];
        script.extend_from_slice(HELLO);
        assert!(decode(&script).is_none());
    }

    #[test]
    fn test_truncated_fields_keep_accumulated_state() {
        let mut script = marker();
        push(&mut script, &[1]);
        push(&mut script, b"text/plain");
        // Tag with no value.
        script.push(0x53);

        let decoded = decode(&script).unwrap();
        assert_eq!(decoded.termination(), Termination::Truncated);
        assert_eq!(decoded.envelope().content_type(), Some("text/plain"));
        assert!(decoded.envelope().content().is_none());
        assert!(decoded.envelope().suffix().is_empty());
    }

    #[test]
    fn test_invalid_tag_opcode_truncates() {
        // An empty envelope closes straight away, which is an invalid tag.
        let mut script = marker();
        script.push(0x68);
        let decoded = decode(&script).unwrap();
        assert_eq!(decoded.termination(), Termination::Truncated);
        assert_eq!(decoded.envelope(), &Envelope::default());

        // OP_RESERVED is not a small integer.
        let mut script = marker();
        script.extend_from_slice(&[0x50, 0x00, 0x68]);
        assert_eq!(decode(&script).unwrap().termination(), Termination::Truncated);

        // Invalid opcode in value position.
        let mut script = marker();
        script.extend_from_slice(&[0x51, 0x76]);
        let decoded = decode(&script).unwrap();
        assert_eq!(decoded.termination(), Termination::Truncated);
        assert!(decoded.envelope().content_type().is_none());
    }

    #[test]
    fn test_content_type_length_boundary() {
        for (len, accepted) in [(255, true), (256, false)] {
            let content_type = vec![b'a'; len];
            let envelope = Envelope::new(b"x".to_vec())
                .with_content_type(String::from_utf8(content_type.clone()).unwrap());
            let script = build_envelope_script(&envelope).unwrap();

            let decoded = decode(script.as_bytes()).unwrap();
            assert_eq!(decoded.termination(), Termination::Closed);
            assert_eq!(decoded.envelope().body(), Some(&b"x"[..]));
            let expected = accepted.then(|| String::from_utf8(content_type).unwrap());
            assert_eq!(
                decoded.envelope().content_type(),
                expected.as_deref(),
                "len {len}"
            );
        }
    }

    #[test]
    fn test_invalid_utf8_content_type_ignored() {
        let mut script = marker();
        push(&mut script, &[1]);
        push(&mut script, &[0xff, 0xfe]);
        push(&mut script, &[]);
        push(&mut script, b"body");
        script.push(0x68);

        let decoded = decode(&script).unwrap();
        assert!(decoded.envelope().content_type().is_none());
        assert_eq!(decoded.envelope().body(), Some(&b"body"[..]));
    }

    #[test]
    fn test_parent_length_boundary() {
        let txid = Txid::from_byte_array([7; 32]);
        let parent = OutPoint::new(txid, 0x0102_0304);
        let encoded = consensus::serialize(&parent);
        assert_eq!(encoded.len(), PARENT_LEN);

        let mut short = encoded.clone();
        short.pop();
        let mut long = encoded.clone();
        long.push(0);

        for (data, expected) in [(encoded, Some(parent)), (short, None), (long, None)] {
            let mut script = marker();
            script.push(0x53);
            push(&mut script, &data);
            push(&mut script, &[]);
            push(&mut script, b"child");
            script.push(0x68);

            let decoded = decode(&script).unwrap();
            assert_eq!(decoded.envelope().parent(), expected, "len {}", data.len());
            assert_eq!(decoded.envelope().body(), Some(&b"child"[..]));
        }
    }

    #[test]
    fn test_parent_encoding_is_txid_then_le_index() {
        let txid = Txid::from_byte_array([0xaa; 32]);
        let mut data = [0xaa; PARENT_LEN].to_vec();
        data[32..].copy_from_slice(&5u32.to_le_bytes());
        assert_eq!(decode_parent(&data), Some(OutPoint::new(txid, 5)));
    }

    #[test]
    fn test_one_byte_tags() {
        let mut script = marker();
        // One-byte push of 1 is the content type field.
        push(&mut script, &[1]);
        push(&mut script, b"image/png");
        // Unknown one-byte tag.
        push(&mut script, &[200]);
        push(&mut script, b"ignored");
        // One-byte push of 0 is the content field.
        push(&mut script, &[0]);
        push(&mut script, b"png");
        script.push(0x68);

        let decoded = decode(&script).unwrap();
        assert_eq!(decoded.envelope().content_type(), Some("image/png"));
        assert_eq!(decoded.envelope().body(), Some(&b"png"[..]));
        assert_eq!(decoded.termination(), Termination::Closed);
    }

    #[test]
    fn test_small_int_tags_and_values() {
        let mut script = marker();
        // -1 and 16 are unknown fields.
        script.extend_from_slice(&[0x4f, 0x51, 0x60, 0x60]);
        // Content given as a small integer value carries no bytes.
        script.extend_from_slice(&[0x00, 0x55, 0x68]);

        let decoded = decode(&script).unwrap();
        assert_eq!(decoded.termination(), Termination::Closed);
        assert_eq!(decoded.envelope().body(), Some(&[][..]));
    }

    #[test]
    fn test_extensions() {
        let mut script = marker();
        push(&mut script, MAP_KEY.as_bytes());
        push(&mut script, b"SET app bsocial");
        // Not an address: discarded, loop continues.
        push(&mut script, b"not-an-address");
        push(&mut script, b"junk");
        push(&mut script, &[]);
        push(&mut script, b"post");
        script.push(0x68);

        let decoded = decode(&script).unwrap();
        let envelope = decoded.envelope();
        let key = ExtensionKey::parse(MAP_KEY).unwrap();
        assert_eq!(envelope.extensions().len(), 1);
        assert_eq!(envelope.extension(&key), Some(&b"SET app bsocial"[..]));
        assert_eq!(envelope.body(), Some(&b"post"[..]));
        assert_eq!(decoded.termination(), Termination::Closed);
    }

    #[test]
    fn test_repeated_extension_key_keeps_last() {
        let mut script = marker();
        push(&mut script, MAP_KEY.as_bytes());
        push(&mut script, b"one");
        push(&mut script, MAP_KEY.as_bytes());
        push(&mut script, b"two");
        push(&mut script, &[]);
        push(&mut script, &[]);
        script.push(0x68);

        let decoded = decode(&script).unwrap();
        let key = ExtensionKey::parse(MAP_KEY).unwrap();
        assert_eq!(decoded.envelope().extension(&key), Some(&b"two"[..]));
    }

    #[test]
    fn test_extension_network_policy() {
        let mut script = marker();
        push(&mut script, MAP_KEY.as_bytes());
        push(&mut script, b"v");
        push(&mut script, &[]);
        push(&mut script, &[]);
        script.push(0x68);

        let mainnet = ParseConfig::default().with_extension_network(Network::Bitcoin);
        let decoded = decode_at(&mainnet, &script, 0).unwrap();
        assert_eq!(decoded.envelope().extensions().len(), 1);

        let testnet = ParseConfig::default().with_extension_network(Network::Testnet);
        let decoded = decode_at(&testnet, &script, 0).unwrap();
        assert!(decoded.envelope().extensions().is_empty());
        assert_eq!(decoded.termination(), Termination::Closed);
    }

    #[test]
    fn test_only_first_envelope_decoded() {
        let mut script = HELLO.to_vec();
        let second = build_envelope_script(&Envelope::new(b"second".to_vec())).unwrap();
        script.extend_from_slice(second.as_bytes());

        let decoded = decode(&script).unwrap();
        assert_eq!(decoded.envelope().body(), Some(&b"hello"[..]));
        assert!(decoded.envelope().suffix().is_empty());
        assert_eq!(decoded.span(), 0..HELLO.len());
    }

    #[test]
    fn test_envelopes_iterator() {
        let first = Envelope::new(b"first".to_vec()).with_content_type("text/plain");
        let second = Envelope::new(b"second".to_vec()).with_prefix(vec![0x75]);

        let mut script = vec![0x51];
        script.extend_from_slice(build_envelope_script(&first).unwrap().as_bytes());
        script.extend_from_slice(build_envelope_script(&second).unwrap().as_bytes());
        script.push(0x52);

        let all: Vec<_> = Envelopes::new(ParseConfig::default(), &script).collect();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].envelope(), &first.clone().with_prefix(vec![0x51]));
        assert_eq!(all[1].envelope(), &second);
        assert_eq!(all[0].span().end, all[1].span().start - 1);
        assert_eq!(all[1].span().end, script.len() - 1);
    }

    #[test]
    fn test_envelopes_iterator_stops_after_unclosed() {
        let mut script = HELLO[..HELLO.len() - 1].to_vec();
        script.extend_from_slice(HELLO);

        let all: Vec<_> = Envelopes::new(ParseConfig::default(), &script).collect();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].termination(), Termination::Unclosed);
        // The second envelope's OP_FALSE is read as the closing instruction.
        assert_eq!(all[0].envelope().suffix(), &HELLO[1..]);
    }

    proptest! {
        #[test]
        fn proptest_arbitrary_scripts_never_panic(
            script in prop::collection::vec(any::<u8>(), 0..512),
        ) {
            let mut last_end = 0;
            for decoded in Envelopes::new(ParseConfig::default(), &script) {
                let span = decoded.span();
                prop_assert!(span.start >= last_end);
                prop_assert!(span.start + 6 <= span.end);
                prop_assert!(span.end <= script.len());
                last_end = span.end;
            }
        }

        #[test]
        fn proptest_arbitrary_fields_after_marker(
            tail in prop::collection::vec(any::<u8>(), 0..256),
        ) {
            let mut script = marker();
            script.extend_from_slice(&tail);

            let decoded = decode(&script).expect("test: marker at start");
            let envelope = decoded.envelope();
            if decoded.termination() != Termination::Unclosed {
                prop_assert!(envelope.suffix().is_empty());
            }
            if let Some(content) = envelope.content() {
                prop_assert_eq!(content.size(), content.body().len());
            }
            if let Some(content_type) = envelope.content_type() {
                prop_assert!(content_type.len() < MAX_CONTENT_TYPE_LEN);
            }
        }
    }
}
