//! # Command Batch
//!
//! Write-only buffer of RESP-encoded commands waiting for one round trip.

use bytes::BytesMut;

use crate::resp::encode_command;

/// Encoded commands plus how many replies they will produce.
#[derive(Debug, Default)]
pub struct Batch {
    buf: BytesMut,
    count: usize,
}

impl Batch {
    pub fn new() -> Self {
        Batch::default()
    }

    /// Encodes one command; nothing is sent.
    pub fn push<A: AsRef<[u8]>>(&mut self, args: &[A]) {
        encode_command(args, &mut self.buf);
        self.count += 1;
    }

    /// Number of queued commands (and expected replies).
    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Wire bytes for the whole batch.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }
}
