use bitcoin::{
    Opcode, ScriptBuf, consensus,
    opcodes::{
        OP_0, OP_FALSE,
        all::{OP_ENDIF, OP_IF, OP_PUSHNUM_1, OP_PUSHNUM_3},
    },
    script::{self, PushBytesBuf},
};

use crate::{
    config::ParseConfig,
    envelope::{Envelope, PROTOCOL_ID},
    errors::EnvelopeBuildError,
};

/// Builds a script containing `envelope`.
///
/// Creates a script with the structure:
/// ```text
/// <prefix>
/// OP_FALSE OP_IF "ord"
/// [OP_1 <content_type>]
/// [OP_3 <parent>]
/// [<extension_key> <extension_value>]...
/// OP_0 <content>
/// OP_ENDIF
/// <suffix>
/// ```
///
/// Extension records are emitted in key order, so equal envelopes always
/// produce identical scripts.
///
/// # Errors
///
/// Returns [`EnvelopeBuildError`] if a field value cannot be converted to a
/// `PushBytesBuf`.
pub fn build_envelope_script(envelope: &Envelope) -> Result<ScriptBuf, EnvelopeBuildError> {
    ParseConfig::default().encode(envelope)
}

pub(crate) fn build_envelope(envelope: &Envelope) -> Result<ScriptBuf, EnvelopeBuildError> {
    let mut builder = script::Builder::from(envelope.prefix().to_vec())
        .push_opcode(OP_FALSE)
        .push_opcode(OP_IF)
        .push_slice(PROTOCOL_ID);

    if let Some(content_type) = envelope.content_type() {
        builder = push_field(
            builder,
            OP_PUSHNUM_1,
            "content type",
            content_type.as_bytes(),
        )?;
    }

    if let Some(parent) = envelope.parent() {
        builder = push_field(
            builder,
            OP_PUSHNUM_3,
            "parent",
            &consensus::serialize(&parent),
        )?;
    }

    for (key, value) in envelope.extensions() {
        builder = builder
            .push_slice(to_push_bytes("extension key", key.as_bytes())?)
            .push_slice(to_push_bytes("extension value", value)?);
    }

    builder = push_field(
        builder,
        OP_0,
        "content",
        envelope.body().unwrap_or_default(),
    )?;
    builder = builder.push_opcode(OP_ENDIF);

    let mut bytes = builder.into_script().into_bytes();
    bytes.extend_from_slice(envelope.suffix());
    Ok(ScriptBuf::from_bytes(bytes))
}

/// Pushes a field value behind its tag opcode.
fn push_field(
    builder: script::Builder,
    tag: Opcode,
    field: &'static str,
    value: &[u8],
) -> Result<script::Builder, EnvelopeBuildError> {
    Ok(builder
        .push_opcode(tag)
        .push_slice(to_push_bytes(field, value)?))
}

fn to_push_bytes(field: &'static str, data: &[u8]) -> Result<PushBytesBuf, EnvelopeBuildError> {
    PushBytesBuf::try_from(data.to_vec()).map_err(|_| EnvelopeBuildError::PushConversion {
        field,
        len: data.len(),
    })
}
