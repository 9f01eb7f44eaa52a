use arbitrary::{Arbitrary, Unstructured};
use bitcoin::{Address, NetworkKind, OutPoint, PubkeyHash, Txid, hashes::Hash};

use crate::envelope::{Envelope, MAX_CONTENT_TYPE_LEN};
use crate::key::ExtensionKey;

impl<'a> Arbitrary<'a> for ExtensionKey {
    fn arbitrary(u: &mut Unstructured<'a>) -> arbitrary::Result<Self> {
        let hash = PubkeyHash::from_byte_array(<[u8; 20]>::arbitrary(u)?);
        Ok(Address::p2pkh(hash, NetworkKind::Main).into())
    }
}

impl<'a> Arbitrary<'a> for Envelope {
    fn arbitrary(u: &mut Unstructured<'a>) -> arbitrary::Result<Self> {
        let mut envelope = Envelope::default()
            .with_prefix(Vec::arbitrary(u)?)
            .with_suffix(Vec::arbitrary(u)?);

        if let Some(body) = Option::<Vec<u8>>::arbitrary(u)? {
            envelope = envelope.with_content(body);
        }

        if let Some(mut content_type) = Option::<String>::arbitrary(u)? {
            while content_type.len() >= MAX_CONTENT_TYPE_LEN {
                content_type.pop();
            }
            envelope = envelope.with_content_type(content_type);
        }

        if let Some((txid, vout)) = Option::<([u8; 32], u32)>::arbitrary(u)? {
            envelope = envelope.with_parent(OutPoint::new(Txid::from_byte_array(txid), vout));
        }

        for _ in 0..u.int_in_range(0..=4)? {
            envelope = envelope.with_extension(ExtensionKey::arbitrary(u)?, Vec::arbitrary(u)?);
        }

        Ok(envelope)
    }
}
