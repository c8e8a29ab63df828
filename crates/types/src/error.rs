// Path: crates/types/src/error.rs
//! Core error types for the verse store layer.

use thiserror::Error;

/// A trait for assigning a stable, machine-readable string code to an error.
pub trait ErrorCode {
    /// Returns the unique, stable string identifier for this error variant.
    fn code(&self) -> &'static str;
}

/// Errors from the local key-value datastore backing a store replica.
#[derive(Error, Debug)]
pub enum DatastoreError {
    /// Another replica instance holds the lock on the store directory.
    #[error("cannot acquire directory lock on {0}")]
    Locked(String),
    /// The requested key was not found.
    #[error("key not found in datastore")]
    NotFound,
    /// An error occurred in the storage backend.
    #[error("datastore backend error: {0}")]
    Backend(String),
    /// A stored value could not be decoded.
    #[error("datastore decode error: {0}")]
    Decode(String),
    /// The datastore has already been closed.
    #[error("datastore is closed")]
    Closed,
}

impl ErrorCode for DatastoreError {
    fn code(&self) -> &'static str {
        match self {
            Self::Locked(_) => "DATASTORE_LOCKED",
            Self::NotFound => "DATASTORE_KEY_NOT_FOUND",
            Self::Backend(_) => "DATASTORE_BACKEND_ERROR",
            Self::Decode(_) => "DATASTORE_DECODE_ERROR",
            Self::Closed => "DATASTORE_CLOSED",
        }
    }
}

/// Errors from cryptographic operations.
#[derive(Error, Debug)]
pub enum CryptoError {
    /// The signature failed cryptographic verification.
    #[error("signature verification failed")]
    VerificationFailed,
    /// The provided key material is malformed for the expected algorithm.
    #[error("invalid cryptographic key: {0}")]
    InvalidKey(String),
    /// Signing failed in the underlying library.
    #[error("signing failed: {0}")]
    Signing(String),
    /// A key-derivation (Argon2id) call failed.
    #[error("key derivation failed: {0}")]
    Derivation(String),
}

impl ErrorCode for CryptoError {
    fn code(&self) -> &'static str {
        match self {
            Self::VerificationFailed => "CRYPTO_VERIFICATION_FAILED",
            Self::InvalidKey(_) => "CRYPTO_INVALID_KEY",
            Self::Signing(_) => "CRYPTO_SIGNING_FAILED",
            Self::Derivation(_) => "CRYPTO_DERIVATION_FAILED",
        }
    }
}

/// Errors from the peer host and pub/sub layer.
#[derive(Error, Debug)]
pub enum NetworkError {
    /// Joining a gossip topic failed.
    #[error("subscribe failed: {0}")]
    Subscribe(String),
    /// Publishing to a gossip topic failed.
    #[error("publish failed: {0}")]
    Publish(String),
    /// The host's command loop has shut down.
    #[error("host channel closed")]
    ChannelClosed,
    /// The transport could not be set up or a dial failed.
    #[error("transport error: {0}")]
    Transport(String),
}

impl ErrorCode for NetworkError {
    fn code(&self) -> &'static str {
        match self {
            Self::Subscribe(_) => "NETWORK_SUBSCRIBE_FAILED",
            Self::Publish(_) => "NETWORK_PUBLISH_FAILED",
            Self::ChannelClosed => "NETWORK_CHANNEL_CLOSED",
            Self::Transport(_) => "NETWORK_TRANSPORT_ERROR",
        }
    }
}

/// Errors surfaced by stores and the verse factory.
#[derive(Error, Debug)]
pub enum StoreError {
    /// An address string could not be decoded.
    #[error("invalid address: {0}")]
    InvalidAddress(String),
    /// A composite key was malformed for the flavor handling it.
    #[error("invalid key: {0}")]
    InvalidKey(String),
    /// The access controller denied the operation.
    #[error("permission denied for key: {0}")]
    PermissionDenied(String),
    /// A signature-flavored write was attempted without a private key.
    #[error("no valid private key")]
    NoPrivateKey,
    /// The store directory is locked by another instance.
    #[error("directory locked: {0}")]
    DirectoryLocked(String),
    /// `load_check` never turned true within the load window.
    #[error("load error: sync timeout")]
    SyncTimeout,
    /// The requested key was not found.
    #[error("key not found")]
    NotFound,
    /// A value or wire message could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
    /// An error occurred in the local datastore.
    #[error("datastore error: {0}")]
    Datastore(#[from] DatastoreError),
    /// An error occurred in the peer host.
    #[error("network error: {0}")]
    Network(#[from] NetworkError),
    /// An error occurred in a cryptographic operation.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
    /// A filesystem operation on the store directory failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// The store has already been closed.
    #[error("store is closed")]
    Closed,
}

impl ErrorCode for StoreError {
    fn code(&self) -> &'static str {
        match self {
            Self::InvalidAddress(_) => "STORE_INVALID_ADDRESS",
            Self::InvalidKey(_) => "STORE_INVALID_KEY",
            Self::PermissionDenied(_) => "STORE_PERMISSION_DENIED",
            Self::NoPrivateKey => "STORE_NO_PRIVATE_KEY",
            Self::DirectoryLocked(_) => "STORE_DIRECTORY_LOCKED",
            Self::SyncTimeout => "STORE_SYNC_TIMEOUT",
            Self::NotFound => "STORE_KEY_NOT_FOUND",
            Self::Decode(_) => "STORE_DECODE_ERROR",
            Self::Datastore(_) => "STORE_DATASTORE_ERROR",
            Self::Network(_) => "STORE_NETWORK_ERROR",
            Self::Crypto(_) => "STORE_CRYPTO_ERROR",
            Self::Io(_) => "STORE_IO_ERROR",
            Self::Closed => "STORE_CLOSED",
        }
    }
}

impl From<prost::DecodeError> for StoreError {
    fn from(e: prost::DecodeError) -> Self {
        StoreError::Decode(e.to_string())
    }
}

impl From<String> for StoreError {
    fn from(s: String) -> Self {
        StoreError::Decode(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn datastore_error_maps_into_store_error() {
        let err: StoreError = DatastoreError::NotFound.into();
        assert_eq!(err.code(), "STORE_DATASTORE_ERROR");
    }

    #[test]
    fn codes_are_stable() {
        assert_eq!(StoreError::SyncTimeout.code(), "STORE_SYNC_TIMEOUT");
        assert_eq!(
            StoreError::DirectoryLocked("x".into()).code(),
            "STORE_DIRECTORY_LOCKED"
        );
        assert_eq!(CryptoError::VerificationFailed.code(), "CRYPTO_VERIFICATION_FAILED");
    }
}
