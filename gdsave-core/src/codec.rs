/// Handles the container packing/unpacking with header, deflate body and trailer
use std::io::{self, Write};

use base64::Engine;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use flate2::write::ZlibEncoder;
use flate2::{Compression, Crc, Decompress, FlushDecompress, Status};

use crate::error::CodecError;

/// Fixed 10-byte header at the front of every container
/// (gzip magic `1f 8b`, deflate method `08`, zeroed flags/mtime/xfl, OS byte `0b`).
/// The game writes these exact bytes for every save; nothing in them is
/// derived from the payload.
pub const CONTAINER_HEADER: [u8; 10] = [
    0x1f, 0x8b, 0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x0b,
];

/// Trailer length: checksum(4 LE) + size(4 LE)
pub const TRAILER_LEN: usize = 8;

/// Base64 variant used by the game: standard alphabet with `-` and `_`
/// substituted for `+` and `/`. Encoding pads the way the game does;
/// decoding accepts padded and unpadded input.
const SAVE_B64: GeneralPurpose = GeneralPurpose::new(
    &base64::alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Layout: [header(10) | raw deflate stream | checksum(4 LE) | size(4 LE)]
#[derive(Debug)]
pub struct UnpackedSave {
    pub payload: Vec<u8>,
    pub checksum: u32,
    pub size: u32,
}

impl UnpackedSave {
    /// Checks the stored trailer fields against the payload
    ///
    /// Decoding never calls this: hand-edited saves routinely carry stale
    /// trailer values and the game loads them anyway. Strict callers opt in.
    pub fn verify(&self) -> Result<(), CodecError> {
        let calculated = calc_checksum(&self.payload);
        if self.checksum != calculated {
            return Err(CodecError::ChecksumMismatch {
                stored: self.checksum,
                calculated,
            });
        }
        if self.size != self.payload.len() as u32 {
            return Err(CodecError::SizeMismatch {
                stored: self.size,
                actual: self.payload.len(),
            });
        }
        Ok(())
    }
}

/// Calculate the trailer checksum for a payload
/// CRC-32 over the uncompressed payload (the gzip polynomial)
pub fn calc_checksum(payload: &[u8]) -> u32 {
    let mut crc = Crc::new();
    crc.update(payload);
    crc.sum()
}

/// Deflate-compress a payload into the headerless form the container stores
///
/// The compressor emits a zlib stream; its 2-byte header and 4-byte
/// Adler-32 trailer are cut off because the container supplies its own
/// framing around the bare deflate data.
pub fn compress(payload: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(payload).map_err(CodecError::Compress)?;
    let stream = encoder.finish().map_err(CodecError::Compress)?;

    // A zlib stream is never shorter than its 2-byte header + 4-byte trailer
    Ok(stream[2..stream.len() - 4].to_vec())
}

/// Inflate a headerless deflate stream back into the payload
///
/// The `flate2` reader adapters treat running out of input as end of
/// stream, which would turn a truncated body into a short payload. Driving
/// the inflater directly lets a missing final block surface as an error.
pub fn decompress(stream: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut inflater = Decompress::new(false);
    let mut payload = Vec::with_capacity(stream.len().max(64) * 2);

    loop {
        let consumed = inflater.total_in() as usize;
        let status = inflater
            .decompress_vec(&stream[consumed..], &mut payload, FlushDecompress::Finish)
            .map_err(|e| {
                CodecError::CorruptStream(io::Error::new(io::ErrorKind::InvalidData, e))
            })?;

        match status {
            Status::StreamEnd => return Ok(payload),
            // Not at the end marker yet: either the output buffer is full
            // or the input ran dry before the final block
            Status::Ok | Status::BufError => {
                if payload.len() == payload.capacity() {
                    payload.reserve(payload.capacity().max(64));
                } else {
                    return Err(CodecError::CorruptStream(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "deflate stream ends before its final block",
                    )));
                }
            }
        }
    }
}

/// Pack a payload into a container ready for encoding
pub fn pack_container(payload: &[u8]) -> Result<Vec<u8>, CodecError> {
    let body = compress(payload)?;

    let mut container = Vec::with_capacity(CONTAINER_HEADER.len() + body.len() + TRAILER_LEN);
    container.extend_from_slice(&CONTAINER_HEADER);
    container.extend_from_slice(&body);
    container.extend_from_slice(&calc_checksum(payload).to_le_bytes());
    // Stored size wraps at 2^32, the gzip ISIZE convention
    container.extend_from_slice(&(payload.len() as u32).to_le_bytes());

    Ok(container)
}

/// Unpack a container into payload and trailer metadata
///
/// The header bytes are skipped, not validated, and the trailer fields are
/// returned as stored; [`UnpackedSave::verify`] checks them on demand.
pub fn unpack_container(container: &[u8]) -> Result<UnpackedSave, CodecError> {
    let min = CONTAINER_HEADER.len() + TRAILER_LEN;
    if container.len() < min {
        return Err(CodecError::Truncated {
            len: container.len(),
            min,
        });
    }

    let body = &container[CONTAINER_HEADER.len()..container.len() - TRAILER_LEN];
    let trailer = &container[container.len() - TRAILER_LEN..];

    let payload = decompress(body)?;

    // Checksum and size are both little endian u32
    let checksum = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
    let size = u32::from_le_bytes([trailer[4], trailer[5], trailer[6], trailer[7]]);

    Ok(UnpackedSave {
        payload,
        checksum,
        size,
    })
}

/// Decrypt an on-disk save file into its payload and trailer metadata
pub fn decrypt(data: &[u8]) -> Result<UnpackedSave, CodecError> {
    use crate::crypto::{XOR_KEY, xor_bytes};

    let encoded = xor_bytes(data, XOR_KEY);
    let container = SAVE_B64.decode(encoded)?;
    unpack_container(&container)
}

/// Encrypt a payload into the on-disk save file form
pub fn encrypt(payload: &[u8]) -> Result<Vec<u8>, CodecError> {
    use crate::crypto::{XOR_KEY, xor_bytes};

    let container = pack_container(payload)?;
    let encoded = SAVE_B64.encode(&container);
    Ok(xor_bytes(encoded.as_bytes(), XOR_KEY))
}
