//! Error types for the save codec and the XML formatter.

use std::io;

use thiserror::Error;

/// Failures while decoding or encoding a save container.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The decoded container is shorter than header + trailer.
    #[error("container too short: {len} bytes, need at least {min}")]
    Truncated { len: usize, min: usize },

    /// The deobfuscated bytes are not valid base64.
    #[error("invalid base64 in container: {0}")]
    Base64(#[from] base64::DecodeError),

    /// The compressed section does not inflate to a payload.
    #[error("corrupt compressed stream: {0}")]
    CorruptStream(#[source] io::Error),

    /// The payload could not be compressed.
    #[error("compression failed: {0}")]
    Compress(#[source] io::Error),

    /// The stored checksum does not match the payload. Only raised by
    /// explicit verification, never by decoding itself.
    #[error("checksum mismatch: stored=0x{stored:08x} calculated=0x{calculated:08x}")]
    ChecksumMismatch { stored: u32, calculated: u32 },

    /// The stored payload size does not match the payload. Only raised by
    /// explicit verification, never by decoding itself.
    #[error("payload size mismatch: stored={stored} actual={actual}")]
    SizeMismatch { stored: u32, actual: usize },
}

/// Failures while parsing a decrypted payload for pretty-printing.
///
/// These are never fatal on the decrypt path: callers fall back to
/// writing the payload unformatted.
#[derive(Debug, Error)]
pub enum FormatError {
    /// The payload is not UTF-8 text.
    #[error("payload is not valid UTF-8: {0}")]
    NotUtf8(#[from] std::str::Utf8Error),

    /// The payload is not well-formed XML.
    #[error("malformed document at offset {offset}: {message}")]
    Malformed { offset: usize, message: String },
}
