//! Token ↔ id mapping and bag-of-words encoding.

use std::collections::{BTreeMap, HashMap};

use crate::engine::artifact::{ArtifactError, ByteReader, ByteWriter};

/// Sparse term-frequency vector. Entries are sorted by id, counts are never zero.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentVector {
    entries: Vec<(u32, u32)>,
}

impl DocumentVector {
    pub fn from_counts(counts: BTreeMap<u32, u32>) -> Self {
        Self {
            entries: counts.into_iter().filter(|(_, count)| *count > 0).collect(),
        }
    }

    /// `(id, count)` pairs in ascending id order.
    pub fn entries(&self) -> &[(u32, u32)] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Dense, append-only token ↔ id mapping for one trained corpus.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Vocabulary {
    tokens: Vec<String>,
    ids: HashMap<String, u32>,
}

impl Vocabulary {
    /// Assign ids in first-seen order across all sequences.
    pub fn build<S: AsRef<str>>(sequences: &[Vec<S>]) -> Self {
        let mut vocabulary = Self::default();
        for sequence in sequences {
            for token in sequence {
                vocabulary.insert(token.as_ref());
            }
        }
        vocabulary
    }

    fn insert(&mut self, token: &str) -> u32 {
        if let Some(id) = self.ids.get(token) {
            return *id;
        }
        let id = self.tokens.len() as u32;
        self.tokens.push(token.to_string());
        self.ids.insert(token.to_string(), id);
        id
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn id(&self, token: &str) -> Option<u32> {
        self.ids.get(token).copied()
    }

    pub fn token(&self, id: u32) -> Option<&str> {
        self.tokens.get(id as usize).map(String::as_str)
    }

    /// Count in-vocabulary tokens. Unknown tokens are dropped.
    pub fn encode<S: AsRef<str>>(&self, tokens: &[S]) -> DocumentVector {
        let mut counts: BTreeMap<u32, u32> = BTreeMap::new();
        for token in tokens {
            if let Some(id) = self.id(token.as_ref()) {
                *counts.entry(id).or_default() += 1;
            }
        }
        DocumentVector::from_counts(counts)
    }

    /// Expand a vector back into its token multiset, in id order.
    pub fn decode(&self, vector: &DocumentVector) -> Vec<String> {
        vector
            .entries()
            .iter()
            .filter_map(|(id, count)| self.token(*id).map(|token| (token, *count)))
            .flat_map(|(token, count)| std::iter::repeat(token.to_string()).take(count as usize))
            .collect()
    }

    /// Checksum over the id-ordered token list. Ties a topic model to the
    /// vocabulary it was fitted against.
    pub fn fingerprint(&self) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&(self.tokens.len() as u64).to_le_bytes());
        for token in &self.tokens {
            hasher.update(&(token.len() as u32).to_le_bytes());
            hasher.update(token.as_bytes());
        }
        hasher.finalize()
    }

    pub(crate) fn write_payload(&self, writer: &mut ByteWriter) {
        writer.put_u32(self.tokens.len() as u32);
        for token in &self.tokens {
            writer.put_str(token);
        }
    }

    pub(crate) fn read_payload(reader: &mut ByteReader<'_>) -> Result<Self, ArtifactError> {
        let count = reader.get_u32()? as usize;
        let mut vocabulary = Self {
            tokens: Vec::with_capacity(count),
            ids: HashMap::with_capacity(count),
        };
        for _ in 0..count {
            let token = reader.get_str()?;
            if vocabulary.ids.contains_key(&token) {
                return Err(ArtifactError::InvalidFormat(format!(
                    "duplicate vocabulary token '{token}'"
                )));
            }
            vocabulary.insert(&token);
        }
        Ok(vocabulary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seqs(docs: &[&[&str]]) -> Vec<Vec<String>> {
        docs.iter()
            .map(|doc| doc.iter().map(|t| t.to_string()).collect())
            .collect()
    }

    #[test]
    fn test_build_assigns_dense_first_seen_ids() {
        let vocab = Vocabulary::build(&seqs(&[&["cat", "dog"], &["dog", "bird"]]));
        assert_eq!(vocab.len(), 3);
        assert_eq!(vocab.id("cat"), Some(0));
        assert_eq!(vocab.id("dog"), Some(1));
        assert_eq!(vocab.id("bird"), Some(2));
        assert_eq!(vocab.token(2), Some("bird"));
        assert_eq!(vocab.token(3), None);
    }

    #[test]
    fn test_encode_counts_and_drops_unknown() {
        let vocab = Vocabulary::build(&seqs(&[&["cat", "dog"]]));
        let vector = vocab.encode(&["dog", "cat", "dog", "zebra"]);
        assert_eq!(vector.entries(), &[(0, 1), (1, 2)]);
    }

    #[test]
    fn test_encode_only_unknown_is_empty() {
        let vocab = Vocabulary::build(&seqs(&[&["cat"]]));
        assert!(vocab.encode(&["zebra", "lion"]).is_empty());
    }

    #[test]
    fn test_decode_preserves_in_vocabulary_multiset() {
        let vocab = Vocabulary::build(&seqs(&[&["cat", "dog", "bird"]]));
        let tokens = ["bird", "cat", "unknown", "bird"];
        let mut decoded = vocab.decode(&vocab.encode(&tokens));
        decoded.sort();
        assert_eq!(decoded, vec!["bird", "bird", "cat"]);
    }

    #[test]
    fn test_fingerprint_depends_on_order_and_content() {
        let a = Vocabulary::build(&seqs(&[&["cat", "dog"]]));
        let b = Vocabulary::build(&seqs(&[&["dog", "cat"]]));
        let c = Vocabulary::build(&seqs(&[&["cat", "dog"]]));
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn test_payload_roundtrip_preserves_mapping() {
        let vocab = Vocabulary::build(&seqs(&[&["kissa", "koira"], &["hääyö", "kissa"]]));
        let mut writer = ByteWriter::default();
        vocab.write_payload(&mut writer);

        let bytes = writer.into_inner();
        let mut reader = ByteReader::new(&bytes);
        let loaded = Vocabulary::read_payload(&mut reader).unwrap();

        assert_eq!(loaded, vocab);
        assert_eq!(loaded.id("hääyö"), Some(2));
        assert_eq!(loaded.fingerprint(), vocab.fingerprint());
    }
}
