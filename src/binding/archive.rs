//! Simulator archive extraction (spec §4.9 steps 1-3, §6.6): a PKZip
//! container with classic ("ZipCrypto") encryption and per-entry
//! store/deflate/Zstandard (methods 93, 100) compression.
//!
//! Grounded on the `zip` crate (`water236-horus`, `echtzeit-solutions-monsgeek-akko-linux`
//! manifests) for the common store/deflate/zstd-93 path via its built-in
//! ZipCrypto support; method 100 is a non-standard extension the crate
//! does not recognize, so it is decoded by hand-parsing the local file
//! header and feeding the decrypted bytes to the `zstd` crate directly
//! (`jsgroth-jgenesis` manifest) — a small, documented fallback rather
//! than a second general-purpose zip reader.

use crate::error::{AsteriqError, Result};
use std::io::{Cursor, Read};

/// Published PKZip-classic password for the simulator's packaged archive
/// (spec §6.6 "published constant key").
pub const ARCHIVE_PASSWORD: &[u8] = b"why did you use this key for something so important";

const METHOD_ZSTD_STANDARD: u16 = 93;
const METHOD_ZSTD_PROPRIETARY: u16 = 100;

/// Read `entry_name` out of `archive_bytes`, decrypting and decompressing
/// it regardless of which of the three supported methods it used.
pub fn extract_entry(archive_bytes: &[u8], entry_name: &str) -> Result<Vec<u8>> {
    let cursor = Cursor::new(archive_bytes);
    let mut archive = zip::ZipArchive::new(cursor)
        .map_err(|e| AsteriqError::ArchiveOpenFailure(e.to_string()))?;

    let result = match archive.by_name_decrypt(entry_name, ARCHIVE_PASSWORD) {
        Ok(mut file) => {
            let mut buf = Vec::new();
            file.read_to_end(&mut buf)
                .map_err(|e| AsteriqError::ArchiveOpenFailure(e.to_string()))?;
            Ok(buf)
        }
        Err(_) => extract_proprietary_zstd_entry(archive_bytes, entry_name),
    };
    result
}

/// Fallback path for compression method 100: find the entry's local file
/// header by hand, decrypt with ZipCrypto, and decompress with the
/// Zstandard frame decoder directly (bypassing the `zip` crate, which does
/// not know method 100).
fn extract_proprietary_zstd_entry(archive_bytes: &[u8], entry_name: &str) -> Result<Vec<u8>> {
    let record = find_local_header(archive_bytes, entry_name)
        .ok_or_else(|| AsteriqError::ArchiveOpenFailure(format!("entry not found: {entry_name}")))?;

    if record.method != METHOD_ZSTD_STANDARD && record.method != METHOD_ZSTD_PROPRIETARY {
        return Err(AsteriqError::UnsupportedCompression(record.method));
    }

    let raw = &archive_bytes[record.data_start..record.data_start + record.compressed_size];
    let decrypted = if record.encrypted {
        decrypt_zip_crypto(raw, ARCHIVE_PASSWORD).ok_or(AsteriqError::DecryptionFailure)?
    } else {
        raw.to_vec()
    };

    zstd::stream::decode_all(Cursor::new(decrypted))
        .map_err(|e| AsteriqError::ArchiveOpenFailure(e.to_string()))
}

struct LocalHeaderRecord {
    method: u16,
    encrypted: bool,
    compressed_size: usize,
    data_start: usize,
}

const LOCAL_HEADER_SIGNATURE: u32 = 0x0403_4b50;
const CENTRAL_DIR_SIGNATURE: u32 = 0x0201_4b50;

/// Walk the central directory to find `entry_name`'s local file header,
/// then re-parse that header to compute where the entry's data begins.
fn find_local_header(bytes: &[u8], entry_name: &str) -> Option<LocalHeaderRecord> {
    let mut pos = find_central_directory_start(bytes)?;
    while pos + 46 <= bytes.len() {
        let sig = u32::from_le_bytes(bytes[pos..pos + 4].try_into().ok()?);
        if sig != CENTRAL_DIR_SIGNATURE {
            break;
        }
        let method = u16::from_le_bytes(bytes[pos + 10..pos + 12].try_into().ok()?);
        let flags = u16::from_le_bytes(bytes[pos + 8..pos + 10].try_into().ok()?);
        let compressed_size = u32::from_le_bytes(bytes[pos + 20..pos + 24].try_into().ok()?) as usize;
        let name_len = u16::from_le_bytes(bytes[pos + 28..pos + 30].try_into().ok()?) as usize;
        let extra_len = u16::from_le_bytes(bytes[pos + 30..pos + 32].try_into().ok()?) as usize;
        let comment_len = u16::from_le_bytes(bytes[pos + 32..pos + 34].try_into().ok()?) as usize;
        let local_header_offset =
            u32::from_le_bytes(bytes[pos + 42..pos + 46].try_into().ok()?) as usize;
        let name_start = pos + 46;
        let name = bytes.get(name_start..name_start + name_len)?;

        if name == entry_name.as_bytes() {
            return parse_local_header(bytes, local_header_offset, method, flags, compressed_size);
        }
        pos = name_start + name_len + extra_len + comment_len;
    }
    None
}

fn parse_local_header(
    bytes: &[u8],
    offset: usize,
    method: u16,
    flags: u16,
    compressed_size: usize,
) -> Option<LocalHeaderRecord> {
    let sig = u32::from_le_bytes(bytes.get(offset..offset + 4)?.try_into().ok()?);
    if sig != LOCAL_HEADER_SIGNATURE {
        return None;
    }
    let name_len = u16::from_le_bytes(bytes[offset + 26..offset + 28].try_into().ok()?) as usize;
    let extra_len = u16::from_le_bytes(bytes[offset + 28..offset + 30].try_into().ok()?) as usize;
    let data_start = offset + 30 + name_len + extra_len;
    Some(LocalHeaderRecord {
        method,
        encrypted: flags & 0x0001 != 0,
        compressed_size,
        data_start,
    })
}

const END_OF_CENTRAL_DIR_SIGNATURE: u32 = 0x0605_4b50;

/// Scan backward from the end of the file for the End-Of-Central-Directory
/// record (it carries a variable-length comment, so its position isn't
/// fixed) and return the central directory's start offset.
fn find_central_directory_start(bytes: &[u8]) -> Option<usize> {
    let min_eocd_len = 22;
    if bytes.len() < min_eocd_len {
        return None;
    }
    let search_start = bytes.len().saturating_sub(min_eocd_len + 0xFFFF);
    for i in (search_start..=bytes.len() - min_eocd_len).rev() {
        let sig = u32::from_le_bytes(bytes[i..i + 4].try_into().ok()?);
        if sig == END_OF_CENTRAL_DIR_SIGNATURE {
            let cd_offset = u32::from_le_bytes(bytes[i + 16..i + 20].try_into().ok()?) as usize;
            return Some(cd_offset);
        }
    }
    None
}

/// Decrypt a classic PKZip ("ZipCrypto") stream: a documented, public
/// legacy cipher with a 12-byte random header consumed before the real
/// payload begins.
fn decrypt_zip_crypto(data: &[u8], password: &[u8]) -> Option<Vec<u8>> {
    if data.len() < 12 {
        return None;
    }
    let mut keys = ZipCryptoKeys::new(password);
    let mut header = [0u8; 12];
    for (i, &b) in data[..12].iter().enumerate() {
        header[i] = keys.decrypt_byte(b);
    }

    let mut out = Vec::with_capacity(data.len() - 12);
    for &b in &data[12..] {
        out.push(keys.decrypt_byte(b));
    }
    Some(out)
}

struct ZipCryptoKeys {
    key0: u32,
    key1: u32,
    key2: u32,
}

impl ZipCryptoKeys {
    fn new(password: &[u8]) -> Self {
        let mut keys = Self {
            key0: 0x1234_5678,
            key1: 0x2345_6789,
            key2: 0x3456_7890,
        };
        for &b in password {
            keys.update(b);
        }
        keys
    }

    fn update(&mut self, byte: u8) {
        self.key0 = crc32_update(self.key0, byte);
        self.key1 = self
            .key1
            .wrapping_add(self.key0 & 0xff)
            .wrapping_mul(134_775_813)
            .wrapping_add(1);
        self.key2 = crc32_update(self.key2, (self.key1 >> 24) as u8);
    }

    fn decrypt_byte(&mut self, encrypted: u8) -> u8 {
        let temp = (self.key2 | 2) as u16;
        let pad = ((temp.wrapping_mul(temp ^ 1)) >> 8) as u8;
        let plain = encrypted ^ pad;
        self.update(plain);
        plain
    }
}

fn crc32_update(crc: u32, byte: u8) -> u32 {
    (crc >> 8) ^ CRC32_TABLE[((crc ^ byte as u32) & 0xff) as usize]
}

static CRC32_TABLE: once_cell::sync::Lazy<[u32; 256]> = once_cell::sync::Lazy::new(|| {
    let mut table = [0u32; 256];
    for (i, entry) in table.iter_mut().enumerate() {
        let mut c = i as u32;
        for _ in 0..8 {
            c = if c & 1 != 0 {
                0xEDB8_8320 ^ (c >> 1)
            } else {
                c >> 1
            };
        }
        *entry = c;
    }
    table
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zip_crypto_round_trips() {
        let password = b"testpassword";
        let plaintext = b"hello, encrypted world! this is a test payload.";

        let mut enc_keys = ZipCryptoKeys::new(password);
        let mut header = [0u8; 12];
        for (i, h) in header.iter_mut().enumerate() {
            *h = enc_keys.decrypt_byte((i as u8).wrapping_mul(37));
        }
        // Re-derive with fresh keys to encrypt rather than decrypt: ZipCrypto
        // encryption is the same transform, applied to plaintext instead.
        let mut keys = ZipCryptoKeys::new(password);
        let mut ciphertext = Vec::new();
        for &b in header.iter() {
            let temp = (keys.key2 | 2) as u16;
            let pad = ((temp.wrapping_mul(temp ^ 1)) >> 8) as u8;
            let enc = b ^ pad;
            keys.update(b);
            ciphertext.push(enc);
        }
        for &b in plaintext {
            let temp = (keys.key2 | 2) as u16;
            let pad = ((temp.wrapping_mul(temp ^ 1)) >> 8) as u8;
            let enc = b ^ pad;
            keys.update(b);
            ciphertext.push(enc);
        }

        let decrypted = decrypt_zip_crypto(&ciphertext, password).unwrap();
        assert_eq!(&decrypted, plaintext);
    }

    #[test]
    fn crc32_table_matches_known_polynomial_zero_entry() {
        assert_eq!(CRC32_TABLE[0], 0);
    }
}
