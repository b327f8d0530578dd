#![deny(unsafe_code)]

//! # kasumi-handshake
//!
//! A pure, sans-IO implementation of the Noise NNpsk0 handshake pattern
//! with a fixed ciphersuite: `Noise_NNpsk0_25519_AEGIS128L_BLAKE3`.
//!
//! Both peers share a 32-byte pre-shared key and nothing else. Two messages
//! establish a pair of transport keys; after that, [`TransportState`] frames
//! and encrypts application data. The crate never touches sockets: callers
//! move the returned byte buffers themselves.
//!
//! ```rust
//! use kasumi_handshake::{Config, HandshakeState, Psk};
//!
//! let config = Config::builder(Psk::from_bytes([0u8; 32])).build().unwrap();
//! let mut initiator = HandshakeState::initiator(&config);
//! let mut responder = HandshakeState::responder(&config);
//!
//! let mut msg = [0u8; 128];
//! let mut payload = [0u8; 128];
//! let len = initiator.write_message_a(&[], &mut msg).unwrap();
//! responder.read_message_a(&msg[..len], &mut payload).unwrap();
//! let len = responder.write_message_b(&[], &mut msg).unwrap();
//! initiator.read_message_b(&msg[..len], &mut payload).unwrap();
//!
//! let mut alice = initiator.into_transport().unwrap();
//! let mut bob = responder.into_transport().unwrap();
//! let len = alice.write_message(b"hello", &mut msg).unwrap();
//! let n = bob.read_message(&msg[..len], &mut payload).unwrap();
//! assert_eq!(&payload[..n], b"hello");
//! ```
//!
//! ## Security Properties
//!
//! - X25519 all-zero shared secret rejection (low-order points)
//! - All key material zeroized on drop
//! - Constant-time cryptographic comparisons
//! - No unauthenticated plaintext released on tag mismatch
//! - Replay window on the transport receive path
//! - No panics on network input
//! - Fixed ciphersuite (no algorithm negotiation)

pub mod config;
pub mod crypto;
pub mod error;
pub mod fragment;
pub mod framing;
pub mod keys;
pub mod nonce;
pub mod replay;

mod cipher_state;
mod handshake;
mod symmetric_state;
mod transport;

// Re-export the primary public API
pub use cipher_state::CipherState;
pub use config::{Config, ConfigBuilder, DEFAULT_MAX_MESSAGE_LEN, DEFAULT_PROLOGUE};
pub use error::Error;
pub use fragment::Reassembler;
pub use handshake::{
    HANDSHAKE_OVERHEAD, HandshakeAction, HandshakeStage, HandshakeState, PROTOCOL_NAME, Role,
};
pub use keys::{KeyPair, PSK_LEN, Psk, PublicKey, SecretKey};
pub use nonce::Nonce;
pub use symmetric_state::SymmetricState;
pub use transport::{ReceivedFragment, TransportState};
