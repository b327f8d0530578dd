use thiserror::Error;

/// Errors that can occur during the Noise handshake or transport phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Error {
    /// A cryptographic operation failed (AEAD tag mismatch).
    #[error("cryptographic operation failed")]
    CryptoFailed,
    /// A public key is invalid (DH with it produced the all-zero secret).
    #[error("invalid public key")]
    BadKey,
    /// The provided output buffer is too small.
    #[error("output buffer too small")]
    BufferTooSmall,
    /// An operation was attempted in the wrong handshake state.
    #[error("operation not valid in current state")]
    WrongState,
    /// The wire message is malformed, truncated or of the wrong kind.
    #[error("malformed message")]
    BadMessage,
    /// The nonce counter has been exhausted (2^64 - 1 messages sent).
    #[error("nonce counter exhausted")]
    NonceExhausted,
    /// A transport frame was already received or is older than the replay window.
    #[error("replayed or stale frame")]
    Replay,
    /// A frame or reassembled message exceeds the configured limit.
    #[error("message too large")]
    MessageTooLarge,
    /// The random number generator failed to produce key material.
    #[error("random number generator failed")]
    Rng,
}
