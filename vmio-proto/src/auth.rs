//! Fixed-size records exchanged during exec-session authentication.

/// Errors decoding a fixed-size wire record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum WireError {
    /// The buffer is shorter than the record.
    #[error("truncated record: got {got} bytes, need {need}")]
    Truncated {
        /// Bytes available.
        got: usize,
        /// Bytes required.
        need: usize,
    },
}

/// Request authenticating an exec session by its UUID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthRequest {
    /// Raw session UUID bytes.
    pub session: [u8; 16],
}

impl AuthRequest {
    /// Encoded size in bytes.
    pub const WIRE_SIZE: usize = 16;

    /// Encodes the record.
    pub const fn to_bytes(self) -> [u8; Self::WIRE_SIZE] {
        self.session
    }

    /// Decodes the record, ignoring trailing bytes.
    pub fn parse(buf: &[u8]) -> Result<Self, WireError> {
        let session = buf
            .get(..Self::WIRE_SIZE)
            .and_then(|b| <[u8; 16]>::try_from(b).ok())
            .ok_or(WireError::Truncated {
                got: buf.len(),
                need: Self::WIRE_SIZE,
            })?;
        Ok(Self { session })
    }
}

/// Authentication verdict returned by the peer.
///
/// Wire layout: one little-endian `u32`, non-zero meaning accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthResponse {
    /// Whether the peer accepted the session.
    pub accepted: bool,
}

impl AuthResponse {
    /// Encoded size in bytes.
    pub const WIRE_SIZE: usize = 4;

    /// Encodes the record.
    pub fn to_bytes(self) -> [u8; Self::WIRE_SIZE] {
        u32::from(self.accepted).to_le_bytes()
    }

    /// Decodes the record. A short buffer is a protocol violation.
    pub fn parse(buf: &[u8]) -> Result<Self, WireError> {
        let raw = buf
            .get(..Self::WIRE_SIZE)
            .and_then(|b| <[u8; 4]>::try_from(b).ok())
            .ok_or(WireError::Truncated {
                got: buf.len(),
                need: Self::WIRE_SIZE,
            })?;
        Ok(Self {
            accepted: u32::from_le_bytes(raw) != 0,
        })
    }
}
