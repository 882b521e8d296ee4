use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Accumulates a descriptor's canonical content and produces a name-based,
/// content-derived identifier.
///
/// Every segment is prefixed with a running counter byte so that adjacent
/// fields cannot collide by concatenation (`("ab", "c")` digests differently
/// from `("a", "bc")`), and absent optional fields still advance the counter.
/// The SHA-256 output is truncated to 128 bits and stamped with RFC 4122
/// version/variant bits, yielding a standard 36-character hyphenated UUID
/// that is a pure function of the fed content.
pub struct IdentityDigest {
    hasher: Sha256,
    counter: u8,
}

impl IdentityDigest {
    /// Start a digest for a descriptor kind. The kind participates in the
    /// hash so that same-named descriptors of different kinds stay distinct.
    pub fn new(kind: &str) -> Self {
        let digest = Self {
            hasher: Sha256::new(),
            counter: 0,
        };
        digest.str(kind)
    }

    pub fn str(mut self, value: &str) -> Self {
        self.segment(value.as_bytes());
        self
    }

    pub fn opt_str(mut self, value: Option<&str>) -> Self {
        self.segment(value.unwrap_or("").as_bytes());
        self
    }

    pub fn uuid(mut self, value: &Uuid) -> Self {
        self.segment(value.as_bytes());
        self
    }

    pub fn opt_uuid(mut self, value: Option<&Uuid>) -> Self {
        match value {
            Some(uuid) => self.segment(uuid.as_bytes()),
            None => self.segment(&[]),
        }
        self
    }

    pub fn flag(mut self, value: bool) -> Self {
        self.segment(if value { b"1" } else { b"0" });
        self
    }

    pub fn strs<S: AsRef<str>>(mut self, values: &[S]) -> Self {
        for value in values {
            self.segment(value.as_ref().as_bytes());
        }
        self
    }

    pub fn uuids(mut self, values: &[Uuid]) -> Self {
        for value in values {
            self.segment(value.as_bytes());
        }
        self
    }

    pub fn finish(self) -> Uuid {
        let hash = self.hasher.finalize();
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&hash[..16]);
        // Name-based layout: version nibble 5, RFC 4122 variant.
        bytes[6] = (bytes[6] & 0x0f) | 0x50;
        bytes[8] = (bytes[8] & 0x3f) | 0x80;
        Uuid::from_bytes(bytes)
    }

    fn segment(&mut self, data: &[u8]) {
        self.hasher.update([self.counter]);
        self.counter = self.counter.wrapping_add(1);
        self.hasher.update(data);
    }
}
