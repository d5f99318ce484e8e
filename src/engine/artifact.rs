//! Binary framing for persisted engine artifacts.
//!
//! Header (18 bytes):
//! - magic: [u8; 4] (`DSIM`)
//! - version: u8 (1)
//! - kind: u8 (1 = vocabulary, 2 = topic model, 3 = similarity index)
//! - payload_len: u64 (little-endian)
//! - checksum: u32 (CRC32 of the header fields before it and the payload)
//!
//! Payload: kind-specific, little-endian, floats stored bit-exactly.

/// Artifact magic bytes
const MAGIC: [u8; 4] = *b"DSIM";

/// Current file format version
const FORMAT_VERSION: u8 = 1;

/// Header size in bytes: magic(4) + version(1) + kind(1) + payload_len(8) + checksum(4)
const HEADER_SIZE: usize = 18;

/// Errors that can occur while encoding or decoding artifacts.
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid file format: {0}")]
    InvalidFormat(String),

    #[error("Version mismatch: file version {0}, supported version {1}")]
    VersionMismatch(u8, u8),

    #[error("Kind mismatch: expected {expected:?}, file holds kind {got}")]
    KindMismatch { expected: ArtifactKind, got: u8 },

    #[error("Checksum mismatch: file may be corrupted")]
    ChecksumMismatch,

    #[error("Truncated artifact: needed {needed} more bytes")]
    Truncated { needed: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ArtifactKind {
    Vocabulary = 1,
    TopicModel = 2,
    SimilarityIndex = 3,
}

/// Append-only little-endian buffer.
#[derive(Debug, Default)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    pub fn put_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_u64(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_i64(&mut self, value: i64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_f32(&mut self, value: f32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_f64(&mut self, value: f64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_str(&mut self, value: &str) {
        self.put_u32(value.len() as u32);
        self.buf.extend_from_slice(value.as_bytes());
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

/// Cursor over a payload, failing with `Truncated` instead of panicking.
#[derive(Debug)]
pub struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    /// Fail early when a declared element count cannot fit in what is left.
    pub fn expect_at_least(&self, elements: usize, element_size: usize) -> Result<(), ArtifactError> {
        let needed = elements.saturating_mul(element_size);
        if needed > self.remaining() {
            return Err(ArtifactError::Truncated {
                needed: needed - self.remaining(),
            });
        }
        Ok(())
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], ArtifactError> {
        let remaining = self.bytes.len() - self.pos;
        if remaining < len {
            return Err(ArtifactError::Truncated {
                needed: len - remaining,
            });
        }
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], ArtifactError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn get_u32(&mut self) -> Result<u32, ArtifactError> {
        Ok(u32::from_le_bytes(self.take_array()?))
    }

    pub fn get_u64(&mut self) -> Result<u64, ArtifactError> {
        Ok(u64::from_le_bytes(self.take_array()?))
    }

    pub fn get_i64(&mut self) -> Result<i64, ArtifactError> {
        Ok(i64::from_le_bytes(self.take_array()?))
    }

    pub fn get_f32(&mut self) -> Result<f32, ArtifactError> {
        Ok(f32::from_le_bytes(self.take_array()?))
    }

    pub fn get_f64(&mut self) -> Result<f64, ArtifactError> {
        Ok(f64::from_le_bytes(self.take_array()?))
    }

    pub fn get_str(&mut self) -> Result<String, ArtifactError> {
        let len = self.get_u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| ArtifactError::InvalidFormat(format!("token is not valid utf8: {e}")))
    }

    /// Fail unless every byte has been consumed.
    pub fn finish(self) -> Result<(), ArtifactError> {
        if self.pos != self.bytes.len() {
            return Err(ArtifactError::InvalidFormat(format!(
                "{} trailing bytes",
                self.bytes.len() - self.pos
            )));
        }
        Ok(())
    }
}

/// Wrap a payload into a framed artifact.
pub fn encode(kind: ArtifactKind, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_SIZE + payload.len());
    out.extend_from_slice(&MAGIC);
    out.push(FORMAT_VERSION);
    out.push(kind as u8);
    out.extend_from_slice(&(payload.len() as u64).to_le_bytes());

    let checksum = compute_checksum(&out, payload);
    out.extend_from_slice(&checksum.to_le_bytes());
    out.extend_from_slice(payload);
    out
}

/// Validate the header and checksum and return the payload.
pub fn decode(expected: ArtifactKind, bytes: &[u8]) -> Result<&[u8], ArtifactError> {
    if bytes.len() < HEADER_SIZE {
        return Err(ArtifactError::Truncated {
            needed: HEADER_SIZE - bytes.len(),
        });
    }

    if bytes[0..4] != MAGIC {
        return Err(ArtifactError::InvalidFormat("bad magic".to_string()));
    }

    let version = bytes[4];
    if version > FORMAT_VERSION {
        return Err(ArtifactError::VersionMismatch(version, FORMAT_VERSION));
    }

    let kind = bytes[5];
    if kind != expected as u8 {
        return Err(ArtifactError::KindMismatch {
            expected,
            got: kind,
        });
    }

    let mut len_bytes = [0u8; 8];
    len_bytes.copy_from_slice(&bytes[6..14]);
    let payload_len = u64::from_le_bytes(len_bytes) as usize;

    let mut checksum_bytes = [0u8; 4];
    checksum_bytes.copy_from_slice(&bytes[14..18]);
    let stored_checksum = u32::from_le_bytes(checksum_bytes);

    let payload = &bytes[HEADER_SIZE..];
    if payload.len() != payload_len {
        return Err(ArtifactError::InvalidFormat(format!(
            "payload length {} does not match header {}",
            payload.len(),
            payload_len
        )));
    }

    if compute_checksum(&bytes[0..14], payload) != stored_checksum {
        return Err(ArtifactError::ChecksumMismatch);
    }

    Ok(payload)
}

fn compute_checksum(header: &[u8], payload: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(header);
    hasher.update(payload);
    hasher.finalize()
}
