use anyhow::{Context, Result};
use gdsave_core::error::FormatError;
use gdsave_core::{calc_checksum, decrypt, encrypt, prettify};
use std::fs;
use std::path::{Path, PathBuf};

/// The two save files the game writes
pub const SAVE_FILES: [&str; 2] = ["CCGameManager.dat", "CCLocalLevels.dat"];

/// `CCGameManager.dat` -> `CCGameManager.xml`
pub fn xml_name(save_file: &str) -> PathBuf {
    Path::new(save_file).with_extension("xml")
}

/// One decrypted save file, ready to write out
#[derive(Debug)]
pub struct DecryptedSave {
    /// Pretty-printed XML, or the raw payload if formatting was off or failed
    pub xml: Vec<u8>,
    pub stored_checksum: u32,
    pub calculated_checksum: u32,
    /// Why pretty-printing fell back to the raw payload, if it did
    pub pretty_error: Option<FormatError>,
}

/// Service for handling save file encryption/decryption operations
pub struct SaveFileService;

impl SaveFileService {
    pub fn new() -> Self {
        Self
    }

    /// Decrypt one save file into writable XML bytes
    ///
    /// With `strict` the stored trailer is verified against the payload and a
    /// mismatch fails the file. Without it the fields are only reported back.
    /// A payload the formatter cannot parse is returned unformatted.
    pub fn decrypt_file(&self, path: &Path, pretty: bool, strict: bool) -> Result<DecryptedSave> {
        let data = fs::read(path)
            .with_context(|| format!("Failed to read save file: {}", path.display()))?;

        let unpacked = decrypt(&data)
            .with_context(|| format!("Failed to decrypt {}", path.display()))?;

        if strict {
            unpacked
                .verify()
                .with_context(|| format!("Trailer verification failed for {}", path.display()))?;
        }

        let stored_checksum = unpacked.checksum;
        let calculated_checksum = calc_checksum(&unpacked.payload);

        let (xml, pretty_error) = if pretty {
            match prettify(&unpacked.payload) {
                Ok(text) => (text.into_bytes(), None),
                Err(err) => (unpacked.payload, Some(err)),
            }
        } else {
            (unpacked.payload, None)
        };

        Ok(DecryptedSave {
            xml,
            stored_checksum,
            calculated_checksum,
            pretty_error,
        })
    }

    /// Encrypt one XML file back into the on-disk save form
    pub fn encrypt_file(&self, path: &Path) -> Result<Vec<u8>> {
        let payload = fs::read(path)
            .with_context(|| format!("Failed to read XML file: {}", path.display()))?;

        encrypt(&payload).with_context(|| format!("Failed to encrypt {}", path.display()))
    }
}

impl Default for SaveFileService {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn write_encrypted(payload: &[u8]) -> NamedTempFile {
        let file = NamedTempFile::new().unwrap();
        fs::write(file.path(), encrypt(payload).unwrap()).unwrap();
        file
    }

    #[test]
    fn test_decrypt_file_pretty() {
        let service = SaveFileService::new();
        let file = write_encrypted(b"<plist><dict><k>gems</k><i>42</i></dict></plist>");

        let save = service.decrypt_file(file.path(), true, true).unwrap();

        let expected = "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n\
            <plist>\n\
            \t<dict>\n\
            \t\t<k>gems</k>\n\
            \t\t<i>42</i>\n\
            \t</dict>\n\
            </plist>\n";
        assert_eq!(save.xml, expected.as_bytes());
        assert!(save.pretty_error.is_none());
        assert_eq!(save.stored_checksum, save.calculated_checksum);
    }

    #[test]
    fn test_decrypt_file_without_pretty_keeps_payload() {
        let service = SaveFileService::new();
        let payload = b"<plist><k>1</k></plist>";
        let file = write_encrypted(payload);

        let save = service.decrypt_file(file.path(), false, false).unwrap();
        assert_eq!(save.xml, payload.to_vec());
    }

    #[test]
    fn test_decrypt_file_falls_back_on_malformed_payload() {
        let service = SaveFileService::new();
        // Decrypts fine but is not well-formed XML
        let payload = b"<k>1";
        let file = write_encrypted(payload);

        let save = service.decrypt_file(file.path(), true, false).unwrap();
        assert_eq!(save.xml, payload.to_vec());
        assert!(save.pretty_error.is_some());
    }

    #[test]
    fn test_decrypt_file_missing() {
        let service = SaveFileService::new();
        assert!(
            service
                .decrypt_file(Path::new("/nonexistent/CCGameManager.dat"), true, false)
                .is_err()
        );
    }

    #[test]
    fn test_encrypt_file_roundtrip() {
        let service = SaveFileService::new();
        let file = NamedTempFile::new().unwrap();
        fs::write(file.path(), b"<k>1</k>").unwrap();

        let enc = service.encrypt_file(file.path()).unwrap();
        assert_eq!(decrypt(&enc).unwrap().payload, b"<k>1</k>");
    }

    #[test]
    fn test_xml_name() {
        assert_eq!(xml_name("CCGameManager.dat"), PathBuf::from("CCGameManager.xml"));
        assert_eq!(xml_name("CCLocalLevels.dat"), PathBuf::from("CCLocalLevels.xml"));
    }
}
