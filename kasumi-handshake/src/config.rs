use crate::error::Error;
use crate::keys::Psk;

/// Prologue mixed into the transcript when none is configured.
pub const DEFAULT_PROLOGUE: &[u8] = b"kasumi/1 NNpsk0";

/// Default bound on a reassembled transport message.
pub const DEFAULT_MAX_MESSAGE_LEN: usize = 64 * 1024;

/// Session parameters shared by both handshake roles.
///
/// Both sides must agree on the PSK and prologue or message A fails to
/// authenticate.
#[derive(Clone, Debug)]
pub struct Config {
    psk: Psk,
    prologue: Vec<u8>,
    max_message_len: usize,
}

impl Config {
    /// Start building a config around a pre-shared key.
    pub fn builder(psk: Psk) -> ConfigBuilder {
        ConfigBuilder::new(psk)
    }

    pub fn psk(&self) -> &Psk {
        &self.psk
    }

    pub fn prologue(&self) -> &[u8] {
        &self.prologue
    }

    /// Upper bound on a message assembled from fragments.
    pub fn max_message_len(&self) -> usize {
        self.max_message_len
    }
}

/// Builder for [`Config`].
///
/// # Example
///
/// ```rust
/// use kasumi_handshake::{Config, Psk};
///
/// let config = Config::builder(Psk::from_bytes([7u8; 32]))
///     .with_prologue(b"my-app v2".to_vec())
///     .with_max_message_len(16 * 1024)
///     .build()
///     .unwrap();
/// assert_eq!(config.prologue(), b"my-app v2");
/// ```
pub struct ConfigBuilder {
    psk: Psk,
    prologue: Vec<u8>,
    max_message_len: usize,
}

impl ConfigBuilder {
    /// Create a builder with the default prologue and message limit.
    pub fn new(psk: Psk) -> Self {
        Self {
            psk,
            prologue: DEFAULT_PROLOGUE.to_vec(),
            max_message_len: DEFAULT_MAX_MESSAGE_LEN,
        }
    }

    /// Set a custom prologue for the handshake.
    ///
    /// Both sides must use the same prologue for the handshake to succeed.
    pub fn with_prologue(mut self, prologue: Vec<u8>) -> Self {
        self.prologue = prologue;
        self
    }

    /// Bound the size of reassembled messages.
    pub fn with_max_message_len(mut self, len: usize) -> Self {
        self.max_message_len = len;
        self
    }

    /// Validate and build.
    ///
    /// Fragment offsets are 32-bit, so the limit must lie in `1..=u32::MAX`.
    pub fn build(self) -> Result<Config, Error> {
        if self.max_message_len == 0 || u32::try_from(self.max_message_len).is_err() {
            return Err(Error::MessageTooLarge);
        }
        Ok(Config {
            psk: self.psk,
            prologue: self.prologue,
            max_message_len: self.max_message_len,
        })
    }
}
