//! Packages: the discrete message unit exchanged over a channel.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::CommandId;

/// Source of package numeric ids, shared by every package in the process.
static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Payload encoding tag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Encoding {
    /// Opaque bytes.
    #[default]
    Raw,
    /// UTF-8 text.
    Utf8,
}

/// Fixed part of a package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Command or IO type carried by the package.
    pub kind: CommandId,
    /// How the payload is encoded.
    pub encoding: Encoding,
    /// Monotonically increasing id assigned at construction.
    pub numeric_id: u64,
}

/// An immutable message.
///
/// The payload is reference counted: cloning a package, or wrapping it in an
/// [`Arc`] to retry a send, never copies the bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    /// Type, encoding and id.
    header: Header,
    /// Opaque payload.
    payload: Arc<[u8]>,
}

impl Package {
    /// Builds a package with a fresh numeric id.
    pub fn new(kind: CommandId, encoding: Encoding, payload: impl Into<Arc<[u8]>>) -> Self {
        Self {
            header: Header {
                kind,
                encoding,
                numeric_id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            },
            payload: payload.into(),
        }
    }

    /// Builds a [`Encoding::Raw`] package.
    pub fn raw(kind: CommandId, payload: impl Into<Arc<[u8]>>) -> Self {
        Self::new(kind, Encoding::Raw, payload)
    }

    /// Builds a [`Encoding::Utf8`] package from text.
    pub fn text(kind: CommandId, text: &str) -> Self {
        Self::new(kind, Encoding::Utf8, text.as_bytes())
    }

    /// Package header.
    pub const fn header(&self) -> &Header {
        &self.header
    }

    /// Command or IO type.
    pub const fn kind(&self) -> CommandId {
        self.header.kind
    }

    /// Payload encoding.
    pub const fn encoding(&self) -> Encoding {
        self.header.encoding
    }

    /// Numeric id assigned at construction.
    pub const fn numeric_id(&self) -> u64 {
        self.header.numeric_id
    }

    /// Payload bytes.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Shared handle to the payload buffer.
    pub fn shared_payload(&self) -> Arc<[u8]> {
        Arc::clone(&self.payload)
    }

    /// A package is malformed when it carries [`CommandId::ILLEGAL`].
    ///
    /// An empty payload is valid: header-only commands such as
    /// [`CommandId::VM_GET_STATE`] carry no data, and the header always
    /// has a fixed size, so no package is zero-sized.
    pub fn is_valid(&self) -> bool {
        self.header.kind != CommandId::ILLEGAL
    }
}
