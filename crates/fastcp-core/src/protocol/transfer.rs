//! BEGIN payload: a PAX tar header naming the file and carrying the
//! hex-encoded whole-file checksum as an extended attribute.
//!
//! The entire tar header travels as one unit and is encrypted as a whole
//! when the session cipher is enabled.

use crate::constants::PAX_CHECKSUM_KEY;
use crate::error::{Error, Result};

/// Decoded BEGIN header: destination name plus expected checksum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferHeader {
    /// File name; base name for single transfers, a relative path for
    /// recursive ones.
    pub name: String,
    /// Hex-encoded whole-file checksum. Empty when checksumming is omitted.
    pub checksum_hex: String,
}

impl TransferHeader {
    /// Build a new transfer header.
    pub fn new(name: impl Into<String>, checksum_hex: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            checksum_hex: checksum_hex.into(),
        }
    }

    /// Serialize as a PAX tar header with a zero-length regular entry.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut builder = tar::Builder::new(Vec::new());

        builder
            .append_pax_extensions([
                ("path", self.name.as_bytes()),
                (PAX_CHECKSUM_KEY, self.checksum_hex.as_bytes()),
            ])
            .map_err(|e| Error::protocol(format!("tar header encode failed: {e}")))?;

        let mut header = tar::Header::new_ustar();
        header.set_entry_type(tar::EntryType::Regular);
        header.set_size(0);
        header.set_mode(0o644);
        if header.set_path(&self.name).is_err() {
            // Names too long for the ustar field ride in the PAX path record.
            header
                .set_path("data")
                .map_err(|e| Error::protocol(format!("tar header encode failed: {e}")))?;
        }
        header.set_cksum();

        builder
            .append(&header, std::io::empty())
            .map_err(|e| Error::protocol(format!("tar header encode failed: {e}")))?;

        builder
            .into_inner()
            .map_err(|e| Error::protocol(format!("tar header encode failed: {e}")))
    }

    /// Parse a PAX tar header received in a BEGIN payload.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut archive = tar::Archive::new(bytes);
        let mut entries = archive
            .entries()
            .map_err(|e| Error::protocol(format!("invalid transfer header: {e}")))?;

        let mut entry = entries
            .next()
            .ok_or_else(|| Error::protocol("transfer header has no entries"))?
            .map_err(|e| Error::protocol(format!("invalid transfer header: {e}")))?;

        let mut name: Option<String> = None;
        let mut checksum_hex = String::new();

        if let Ok(Some(extensions)) = entry.pax_extensions() {
            for extension in extensions.flatten() {
                match extension.key() {
                    Ok("path") => {
                        name = extension.value().ok().map(str::to_owned);
                    }
                    Ok(key) if key == PAX_CHECKSUM_KEY => {
                        checksum_hex = extension.value().unwrap_or_default().to_owned();
                    }
                    _ => {}
                }
            }
        }

        let name = match name {
            Some(name) if !name.is_empty() => name,
            _ => entry
                .path()
                .map_err(|e| Error::protocol(format!("invalid transfer header: {e}")))?
                .to_string_lossy()
                .into_owned(),
        };

        if name.is_empty() {
            return Err(Error::protocol("transfer header names no file"));
        }

        Ok(Self { name, checksum_hex })
    }
}
