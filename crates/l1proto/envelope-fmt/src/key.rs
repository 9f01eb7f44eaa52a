//! Extension keys: address strings used as tags by protocols layered on top of
//! the envelope.

use std::fmt;
use std::str;

use bitcoin::{Address, Network, address::NetworkUnchecked};

use crate::errors::InvalidExtensionKey;

/// Key of an extension record carried inside an envelope.
///
/// Third-party protocols tag their records with an address string instead of
/// a numeric field code.  An `ExtensionKey` can only be obtained by parsing
/// the string through [`Address`], so every key held by an
/// [`Envelope`](crate::Envelope) is a syntactically valid address.  The
/// stored string is the canonical form produced by the address codec.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ExtensionKey(String);

impl ExtensionKey {
    /// Parses an extension key, accepting an address for any network.
    pub fn parse(s: &str) -> Result<Self, InvalidExtensionKey> {
        Self::parse_for_network(s, None)
    }

    /// Parses an extension key, requiring the address to be valid for
    /// `network` when one is given.
    pub fn parse_for_network(
        s: &str,
        network: Option<Network>,
    ) -> Result<Self, InvalidExtensionKey> {
        let unchecked = s
            .parse::<Address<NetworkUnchecked>>()
            .map_err(|e| InvalidExtensionKey::NotAddress(e.to_string()))?;

        let address = match network {
            Some(network) => unchecked
                .require_network(network)
                .map_err(|_| InvalidExtensionKey::WrongNetwork(s.to_owned()))?,
            None => unchecked.assume_checked(),
        };

        Ok(Self(address.to_string()))
    }

    /// Parses an extension key from raw tag bytes as found in a script.
    pub fn from_tag_bytes(
        bytes: &[u8],
        network: Option<Network>,
    ) -> Result<Self, InvalidExtensionKey> {
        let s = str::from_utf8(bytes).map_err(|_| InvalidExtensionKey::NotUtf8)?;
        Self::parse_for_network(s, network)
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the key bytes, as pushed in the tag position of a script.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Converts into the inner string.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl From<Address> for ExtensionKey {
    fn from(address: Address) -> Self {
        Self(address.to_string())
    }
}

impl AsRef<str> for ExtensionKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExtensionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl str::FromStr for ExtensionKey {
    type Err = InvalidExtensionKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
