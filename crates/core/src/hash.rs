//! Content hashing using MD5 (128-bit)

use std::fmt;
use std::io::Read;
use std::path::Path;

use md5::{Digest, Md5};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Size of the reusable read buffer for streaming file hashes
pub const HASH_BUFFER_SIZE: usize = 32 * 1024;

/// A 128-bit content digest, serialized as lowercase hex
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentHash([u8; 16]);

impl ContentHash {
    /// Hash arbitrary bytes
    #[must_use]
    pub fn from_bytes(data: &[u8]) -> Self {
        Self(Md5::digest(data).into())
    }

    /// Wrap a raw digest
    #[must_use]
    pub fn from_raw(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Parse a 32-character hex digest
    ///
    /// # Errors
    /// Returns an error if the string is not exactly 16 hex-encoded bytes
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let mut bytes = [0u8; 16];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Self(bytes))
    }

    /// Hash a file by path, returning the digest and the number of bytes read
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or read
    pub fn from_file(path: &Path) -> color_eyre::Result<(Self, u64)> {
        let mut file = std::fs::File::open(path)?;
        let mut hasher = Md5::new();
        let mut buffer = vec![0u8; HASH_BUFFER_SIZE];
        let mut size = 0u64;

        loop {
            let bytes_read = file.read(&mut buffer)?;
            if bytes_read == 0 {
                break;
            }
            size += bytes_read as u64;
            hasher.update(&buffer[..bytes_read]);
        }

        Ok((Self(hasher.finalize().into()), size))
    }

    /// Convert to hex string
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = self.to_hex();
        write!(f, "ContentHash({})", hex.get(..12).unwrap_or(&hex))
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for ContentHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ContentHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_deterministic() {
        let data = b"hello world";
        let h1 = ContentHash::from_bytes(data);
        let h2 = ContentHash::from_bytes(data);
        assert_eq!(h1, h2);
    }

    #[test]
    fn test_content_hash_different_data() {
        let h1 = ContentHash::from_bytes(b"hello");
        let h2 = ContentHash::from_bytes(b"world");
        assert_ne!(h1, h2);
    }

    #[test]
    fn test_known_digest() {
        assert_eq!(
            ContentHash::from_bytes(b"").to_hex(),
            "d41d8cd98f00b204e9800998ecf8427e"
        );
    }

    #[test]
    fn test_from_file_matches_from_bytes() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("big.bin");
        // Larger than one buffer so the streaming loop runs more than once
        let content: Vec<u8> = (0..HASH_BUFFER_SIZE * 3 + 17)
            .map(|i| (i % 251) as u8)
            .collect();
        std::fs::write(&path, &content).unwrap();

        let (hash, size) = ContentHash::from_file(&path).unwrap();
        assert_eq!(hash, ContentHash::from_bytes(&content));
        assert_eq!(size, content.len() as u64);
    }

    #[test]
    fn test_hex_serde() {
        let hash = ContentHash::from_bytes(b"abc");
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, "\"900150983cd24fb0d6963f7d28e17f72\"");
        let back: ContentHash = serde_json::from_str(&json).unwrap();
        assert_eq!(back, hash);
    }

    #[test]
    fn test_rejects_short_hex() {
        assert!(ContentHash::from_hex("abcd").is_err());
        assert!(serde_json::from_str::<ContentHash>("\"zz\"").is_err());
    }
}
