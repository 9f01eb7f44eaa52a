use thiserror::Error;

/// Errors that can occur while building envelope scripts.
#[derive(Debug, Error)]
pub enum EnvelopeBuildError {
    /// Failed to convert a field value into `PushBytesBuf`.
    #[error("failed to convert {len} byte {field} value to push bytes buffer")]
    PushConversion {
        /// Name of the field whose value failed to convert.
        field: &'static str,

        /// Size of the value that failed to convert.
        len: usize,
    },
}

/// Error type for tag bytes that are not a usable extension key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidExtensionKey {
    /// The tag bytes are not valid UTF-8.
    #[error("extension key is not valid utf-8")]
    NotUtf8,

    /// The string does not parse as an address.
    #[error("extension key is not an address: {0}")]
    NotAddress(String),

    /// The address parsed but belongs to a different network.
    #[error("extension key {0} is not valid for the configured network")]
    WrongNetwork(String),
}
