//! Wire vocabulary for vmio channels.
//!
//! Command identifiers and their fixed ranges, the [`Package`] message unit,
//! the authentication records of the exec-session handshake, and a
//! length-prefixed [`postcard`] frame codec for moving packages across any
//! reliable byte stream.

mod auth;
mod codec;
mod command;
mod package;

pub use auth::{AuthRequest, AuthResponse, WireError};
pub use codec::{MAX_FRAME, decode, encode};
pub use command::{CommandId, CommandRange};
pub use package::{Encoding, Header, Package};
