//! core functionality for encrypting and decrypting
//! save files from "Geometry Dash"
//!
//! # Modules
//!
//! - `crypto`: XOR deobfuscation of the on-disk form
//! - `codec`: Save container format encoding/decoding
//! - `xml`: Pretty-printer for decrypted payloads
//! - `error`: Typed errors for the codec and the formatter

pub mod codec;
pub mod crypto;
pub mod error;
pub mod xml;

// Re-export commonly used items
pub use codec::{
    CONTAINER_HEADER, TRAILER_LEN, UnpackedSave, calc_checksum, decrypt, encrypt, pack_container,
    unpack_container,
};
pub use crypto::{XOR_KEY, xor_bytes};
pub use error::{CodecError, FormatError};
pub use xml::{XmlDocument, prettify};
