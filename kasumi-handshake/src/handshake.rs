use rand_core::{CryptoRngCore, OsRng};
use zeroize::Zeroize;

use crate::config::Config;
use crate::crypto::aead::AEAD_TAG_LEN;
use crate::crypto::hash::HASH_LEN;
use crate::crypto::x25519::DH_LEN;
use crate::error::Error;
use crate::framing::{self, Frame, FrameHeader, FrameKind, PREFIX_LEN};
use crate::keys::{KeyPair, PublicKey, Psk};
use crate::symmetric_state::SymmetricState;
use crate::transport::TransportState;

/// Noise protocol name for the fixed ciphersuite.
pub const PROTOCOL_NAME: &str = "Noise_NNpsk0_25519_AEGIS128L_BLAKE3";

/// Bytes every handshake message carries beyond its payload:
/// prefix, ephemeral public key and payload tag.
pub const HANDSHAKE_OVERHEAD: usize = PREFIX_LEN + DH_LEN + AEAD_TAG_LEN;

/// Which side of the handshake this is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Initiator,
    Responder,
}

/// Where the handshake currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeStage {
    /// Initialized, no message exchanged yet.
    Init,
    /// Initiator has written message A.
    SentA,
    /// Responder has read message A.
    ReceivedA,
    /// Both messages done; transport keys derived.
    Split,
    /// A message failed to verify. Terminal.
    Failed,
}

/// The current action the caller must take to advance the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeAction {
    /// Call `write_message()` to produce the next handshake message.
    WriteMessage,
    /// Call `read_message()` with the peer's handshake message.
    ReadMessage,
    /// The handshake is complete. Call `into_transport()`.
    Complete,
    /// The handshake failed. Discard it and start a new one.
    Failed,
}

/// A Noise NNpsk0 handshake state machine.
///
/// Implements the fixed ciphersuite `Noise_NNpsk0_25519_AEGIS128L_BLAKE3`.
///
/// ## NNpsk0 Pattern
///
/// ```text
/// NNpsk0:
///   -> psk, e
///   <- e, ee
/// ```
///
/// The transport keys are derived as soon as the second message is written
/// (responder) or read (initiator). Any failure while processing a message
/// moves the state to [`HandshakeStage::Failed`] and wipes the transcript;
/// the object cannot be retried. [`Error::BufferTooSmall`] and
/// [`Error::WrongState`] are the exceptions, raised before anything is mixed.
pub struct HandshakeState {
    /// `None` once split or failed; dropping it wipes `ck` and `h`.
    symmetric: Option<SymmetricState>,
    stage: HandshakeStage,
    role: Role,
    /// Consumed by the `psk` token of message A.
    psk: Option<Psk>,
    e: Option<KeyPair>,
    re: Option<PublicKey>,
    transport: Option<TransportState>,
    max_message_len: usize,
}

impl Drop for HandshakeState {
    fn drop(&mut self) {
        if let Some(ref mut re) = self.re {
            re.zeroize();
        }
        if let Some(ref mut e) = self.e {
            e.public.zeroize();
        }
    }
}

impl HandshakeState {
    /// Start a handshake: hash the protocol name, then mix in the prologue.
    pub fn new(role: Role, config: &Config) -> Self {
        let mut symmetric = SymmetricState::initialize(PROTOCOL_NAME);
        symmetric.mix_hash(config.prologue());

        Self {
            symmetric: Some(symmetric),
            stage: HandshakeStage::Init,
            role,
            psk: Some(config.psk().clone()),
            e: None,
            re: None,
            transport: None,
            max_message_len: config.max_message_len(),
        }
    }

    pub fn initiator(config: &Config) -> Self {
        Self::new(Role::Initiator, config)
    }

    pub fn responder(config: &Config) -> Self {
        Self::new(Role::Responder, config)
    }

    fn ss(&mut self) -> Result<&mut SymmetricState, Error> {
        self.symmetric.as_mut().ok_or(Error::WrongState)
    }

    /// What action the caller should take next.
    pub fn next_action(&self) -> HandshakeAction {
        match (self.stage, self.role) {
            (HandshakeStage::Init, Role::Initiator) | (HandshakeStage::ReceivedA, _) => {
                HandshakeAction::WriteMessage
            }
            (HandshakeStage::Init, Role::Responder) | (HandshakeStage::SentA, _) => {
                HandshakeAction::ReadMessage
            }
            (HandshakeStage::Split, _) => HandshakeAction::Complete,
            (HandshakeStage::Failed, _) => HandshakeAction::Failed,
        }
    }

    /// Write the next handshake message.
    ///
    /// `payload` is optional application data to encrypt within the message.
    /// Returns the number of bytes written to `out`.
    pub fn write_message(&mut self, payload: &[u8], out: &mut [u8]) -> Result<usize, Error> {
        self.write_message_with_rng(payload, out, &mut OsRng)
    }

    /// Write the next handshake message with a specific RNG (useful for testing).
    pub fn write_message_with_rng(
        &mut self,
        payload: &[u8],
        out: &mut [u8],
        rng: &mut impl CryptoRngCore,
    ) -> Result<usize, Error> {
        match (self.stage, self.role) {
            (HandshakeStage::Init, Role::Initiator) => {
                self.write_message_a_with_rng(payload, out, rng)
            }
            (HandshakeStage::ReceivedA, Role::Responder) => {
                self.write_message_b_with_rng(payload, out, rng)
            }
            _ => Err(Error::WrongState),
        }
    }

    /// Read a handshake message from the peer.
    ///
    /// Returns the number of decrypted payload bytes written to `out`.
    pub fn read_message(&mut self, message: &[u8], out: &mut [u8]) -> Result<usize, Error> {
        match (self.stage, self.role) {
            (HandshakeStage::Init, Role::Responder) => self.read_message_a(message, out),
            (HandshakeStage::SentA, Role::Initiator) => self.read_message_b(message, out),
            _ => Err(Error::WrongState),
        }
    }

    /// The overhead (in bytes) of the next message beyond the payload.
    pub fn next_message_overhead(&self) -> usize {
        match self.next_action() {
            HandshakeAction::WriteMessage => HANDSHAKE_OVERHEAD,
            _ => 0,
        }
    }

    pub fn stage(&self) -> HandshakeStage {
        self.stage
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Whether this side is the initiator.
    pub fn is_initiator(&self) -> bool {
        self.role == Role::Initiator
    }

    /// The current handshake hash.
    ///
    /// After the split this is the final channel binding value. Returns
    /// `Err(Error::WrongState)` once the handshake has failed or been
    /// consumed.
    pub fn handshake_hash(&self) -> Result<&[u8; HASH_LEN], Error> {
        if let Some(ref transport) = self.transport {
            return Ok(transport.handshake_hash());
        }
        self.symmetric
            .as_ref()
            .map(|s| s.handshake_hash())
            .ok_or(Error::WrongState)
    }

    /// Hand over the transport keys derived at the split.
    pub fn into_transport(mut self) -> Result<TransportState, Error> {
        if self.stage != HandshakeStage::Split {
            return Err(Error::WrongState);
        }
        self.transport.take().ok_or(Error::WrongState)
    }

    /// Abandon the handshake, wiping all handshake secrets.
    fn fail(&mut self, err: Error) -> Error {
        tracing::warn!(role = ?self.role, stage = ?self.stage, %err, "handshake aborted");
        self.stage = HandshakeStage::Failed;
        self.symmetric = None;
        self.psk = None;
        self.e = None;
        self.re = None;
        err
    }

    /// Run a step that mutates the transcript; any error is fatal.
    fn step<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T, Error>) -> Result<T, Error> {
        match f(self) {
            Ok(value) => Ok(value),
            Err(err) => Err(self.fail(err)),
        }
    }

    /// Derive the transport pair. Noise assigns c1 to initiator-to-responder.
    fn split(&mut self) -> Result<(), Error> {
        let symmetric = self.symmetric.take().ok_or(Error::WrongState)?;
        let (h, c1, c2) = symmetric.split();
        let (ours, theirs) = match self.role {
            Role::Initiator => (c1, c2),
            Role::Responder => (c2, c1),
        };
        self.transport = Some(TransportState::new(h, ours, theirs, self.max_message_len));
        self.psk = None;
        self.e = None;
        self.re = None;
        self.stage = HandshakeStage::Split;
        tracing::debug!(role = ?self.role, "handshake split complete");
        Ok(())
    }

    /// Check a received handshake frame and return its body.
    ///
    /// A malformed frame is fatal. A short `out` is not: nothing has been
    /// mixed into the transcript yet, so the caller may retry.
    fn handshake_body<'m>(
        &mut self,
        message: &'m [u8],
        kind: FrameKind,
        out: &[u8],
    ) -> Result<&'m [u8], Error> {
        let body = match Frame::parse(message) {
            Ok(frame)
                if frame.header.kind == kind
                    && frame.header.seq == 0
                    && frame.offset == 0
                    && frame.body.len() >= DH_LEN + AEAD_TAG_LEN =>
            {
                frame.body
            }
            Ok(_) => return Err(self.fail(Error::BadMessage)),
            Err(err) => return Err(self.fail(err)),
        };
        if out.len() < body.len() - DH_LEN - AEAD_TAG_LEN {
            return Err(Error::BufferTooSmall);
        }
        Ok(body)
    }

    fn check_write_len(payload: &[u8], out: &[u8]) -> Result<(), Error> {
        let total = HANDSHAKE_OVERHEAD
            .checked_add(payload.len())
            .ok_or(Error::BufferTooSmall)?;
        if out.len() < total {
            return Err(Error::BufferTooSmall);
        }
        Ok(())
    }

    // ===== Message A: initiator writes -> psk, e =====
    //
    // Layout: [prefix(8)][e_pub(32)][encrypted_payload(N+16)]

    /// Write message A (initiator only).
    pub fn write_message_a(&mut self, payload: &[u8], out: &mut [u8]) -> Result<usize, Error> {
        self.write_message_a_with_rng(payload, out, &mut OsRng)
    }

    pub fn write_message_a_with_rng(
        &mut self,
        payload: &[u8],
        out: &mut [u8],
        rng: &mut impl CryptoRngCore,
    ) -> Result<usize, Error> {
        if self.stage != HandshakeStage::Init || self.role != Role::Initiator {
            return Err(Error::WrongState);
        }
        Self::check_write_len(payload, out)?;

        let len = self.step(|hs| {
            let header = FrameHeader::new(FrameKind::HandshakeA, 0);
            let mut offset = framing::write_prefix(&header, 0, out)?;

            // -> psk
            let psk = hs.psk.take().ok_or(Error::WrongState)?;
            hs.ss()?.mix_key_and_hash(psk.as_bytes());

            // -> e
            let e = KeyPair::generate(rng)?;
            let e_pub = e.public;
            out[offset..offset + DH_LEN].copy_from_slice(e_pub.as_bytes());
            hs.ss()?.mix_hash(e_pub.as_bytes());
            hs.ss()?.mix_key(e_pub.as_bytes());
            hs.e = Some(e);
            offset += DH_LEN;

            let p_len = hs.ss()?.encrypt_and_hash(payload, &mut out[offset..])?;
            Ok(offset + p_len)
        })?;

        self.stage = HandshakeStage::SentA;
        tracing::debug!(len, "wrote handshake message A");
        Ok(len)
    }

    // ===== Message A: responder reads -> psk, e =====

    /// Read message A (responder only). Fails with [`Error::CryptoFailed`]
    /// if the peer used a different PSK or prologue.
    pub fn read_message_a(&mut self, message: &[u8], out: &mut [u8]) -> Result<usize, Error> {
        if self.stage != HandshakeStage::Init || self.role != Role::Responder {
            return Err(Error::WrongState);
        }

        let body = self.handshake_body(message, FrameKind::HandshakeA, out)?;

        let len = self.step(|hs| {
            // -> psk
            let psk = hs.psk.take().ok_or(Error::WrongState)?;
            hs.ss()?.mix_key_and_hash(psk.as_bytes());

            // -> e
            let mut re = [0u8; DH_LEN];
            re.copy_from_slice(&body[..DH_LEN]);
            let re = PublicKey::from_bytes(re);
            hs.ss()?.mix_hash(re.as_bytes());
            hs.ss()?.mix_key(re.as_bytes());
            hs.re = Some(re);

            hs.ss()?.decrypt_and_hash(&body[DH_LEN..], out)
        })?;

        self.stage = HandshakeStage::ReceivedA;
        tracing::debug!(len = message.len(), "read handshake message A");
        Ok(len)
    }

    // ===== Message B: responder writes <- e, ee =====
    //
    // Layout: [prefix(8)][e_pub(32)][encrypted_payload(N+16)]

    /// Write message B (responder only) and derive the transport keys.
    pub fn write_message_b(&mut self, payload: &[u8], out: &mut [u8]) -> Result<usize, Error> {
        self.write_message_b_with_rng(payload, out, &mut OsRng)
    }

    pub fn write_message_b_with_rng(
        &mut self,
        payload: &[u8],
        out: &mut [u8],
        rng: &mut impl CryptoRngCore,
    ) -> Result<usize, Error> {
        if self.stage != HandshakeStage::ReceivedA || self.role != Role::Responder {
            return Err(Error::WrongState);
        }
        Self::check_write_len(payload, out)?;

        let len = self.step(|hs| {
            let header = FrameHeader::new(FrameKind::HandshakeB, 0);
            let mut offset = framing::write_prefix(&header, 0, out)?;

            // <- e
            let e = KeyPair::generate(rng)?;
            out[offset..offset + DH_LEN].copy_from_slice(e.public.as_bytes());
            hs.ss()?.mix_hash(e.public.as_bytes());
            hs.ss()?.mix_key(e.public.as_bytes());
            offset += DH_LEN;

            // <- ee: DH(e, re)
            let re = hs.re.ok_or(Error::WrongState)?;
            let shared_ee = e.secret.diffie_hellman(&re)?;
            hs.ss()?.mix_key(shared_ee.as_bytes());

            let p_len = hs.ss()?.encrypt_and_hash(payload, &mut out[offset..])?;
            hs.split()?;
            Ok(offset + p_len)
        })?;

        tracing::debug!(len, "wrote handshake message B");
        Ok(len)
    }

    // ===== Message B: initiator reads <- e, ee =====

    /// Read message B (initiator only) and derive the transport keys.
    pub fn read_message_b(&mut self, message: &[u8], out: &mut [u8]) -> Result<usize, Error> {
        if self.stage != HandshakeStage::SentA || self.role != Role::Initiator {
            return Err(Error::WrongState);
        }

        let body = self.handshake_body(message, FrameKind::HandshakeB, out)?;

        let len = self.step(|hs| {
            // <- e
            let mut re = [0u8; DH_LEN];
            re.copy_from_slice(&body[..DH_LEN]);
            let re = PublicKey::from_bytes(re);
            hs.ss()?.mix_hash(re.as_bytes());
            hs.ss()?.mix_key(re.as_bytes());
            hs.re = Some(re);

            // <- ee: DH(e, re)
            let shared_ee = hs
                .e
                .as_ref()
                .ok_or(Error::WrongState)?
                .secret
                .diffie_hellman(&re)?;
            hs.ss()?.mix_key(shared_ee.as_bytes());

            let len = hs.ss()?.decrypt_and_hash(&body[DH_LEN..], out)?;
            hs.split()?;
            Ok(len)
        })?;

        tracing::debug!(len = message.len(), "read handshake message B");
        Ok(len)
    }
}

impl core::fmt::Debug for HandshakeState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HandshakeState")
            .field("role", &self.role)
            .field("stage", &self.stage)
            .finish_non_exhaustive()
    }
}
