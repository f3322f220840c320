use std::cmp::Ordering;
use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};

/// A bit set on sequence numbers assigned to batch-local entries. Entries
/// carrying it must not be elided during iteration, and they sort distinctly
/// from committed sequence numbers.
pub const SEQ_NUM_BATCH: u64 = 1 << 55;

/// The largest valid sequence number.
pub const SEQ_NUM_MAX: u64 = (1 << 56) - 1;

/// The kind of an internal record.
///
/// The discriminants are part of the file format and must not be changed.
/// Gaps in the numbering are reserved codes that this engine does not write.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum InternalKeyKind {
    /// A point deletion tombstone.
    Delete = 0,
    /// A regular value.
    Set = 1,
    /// A merge operand (used with merge operators).
    Merge = 2,
    /// An opaque marker recorded in the write-ahead log. Never emitted from
    /// compaction.
    LogData = 3,
    /// A range deletion tombstone.
    RangeDelete = 15,
    /// The largest valid kind. Not part of the file format; keys built with
    /// it sort before every other kind for the same (user key, seq), which
    /// makes it suitable for seek bounds.
    Max = 17,
    /// A marker for an invalid key.
    Invalid = 255,
}

impl InternalKeyKind {
    /// Maps a raw kind byte to a kind. Codes this engine does not recognize
    /// (including reserved codes below `Max`) map to `Invalid`.
    pub fn from_u8(kind: u8) -> InternalKeyKind {
        match kind {
            0 => InternalKeyKind::Delete,
            1 => InternalKeyKind::Set,
            2 => InternalKeyKind::Merge,
            3 => InternalKeyKind::LogData,
            15 => InternalKeyKind::RangeDelete,
            17 => InternalKeyKind::Max,
            _ => InternalKeyKind::Invalid,
        }
    }
}

/// A caller-supplied total order on user keys.
pub type UserComparator = Arc<dyn Fn(&[u8], &[u8]) -> Ordering + Send + Sync>;

/// The default byte-wise user key comparator.
pub fn bytewise_comparator() -> UserComparator {
    Arc::new(|a: &[u8], b: &[u8]| a.cmp(b))
}

/// A key used for the on-disk and in-memory partial stores that make up the
/// LSM tree.
///
/// It consists of the user key followed by an 8-byte trailer holding a 56-bit
/// sequence number and the record kind: `(seq << 8) | kind`, encoded
/// little-endian. The trailer encoding is part of the sstable file format.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InternalKey {
    /// The user key bytes.
    pub user_key: Bytes,
    trailer: u64,
}

impl InternalKey {
    pub fn new(user_key: Bytes, seq: u64, kind: InternalKeyKind) -> Self {
        debug_assert!(seq <= SEQ_NUM_MAX);
        Self {
            user_key,
            trailer: (seq << 8) | kind as u64,
        }
    }

    /// Decodes an internal key from its encoded form. Inputs shorter than the
    /// 8-byte trailer yield an `Invalid` key carrying the whole input as the
    /// user key.
    pub fn decode(encoded: Bytes) -> Self {
        if encoded.len() < 8 {
            return Self::new(encoded, 0, InternalKeyKind::Invalid);
        }
        let split = encoded.len() - 8;
        let trailer = u64::from_le_bytes(
            encoded[split..]
                .try_into()
                .expect("trailer is exactly 8 bytes"),
        );
        Self {
            user_key: encoded.slice(..split),
            trailer,
        }
    }

    /// Appends the encoded form (user key, then trailer) to `buf`.
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_slice(self.user_key.as_ref());
        buf.put_u64_le(self.trailer);
    }

    pub fn encoded(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_size());
        self.encode(&mut buf);
        buf.freeze()
    }

    pub fn encoded_size(&self) -> usize {
        self.user_key.len() + 8
    }

    pub fn seq_num(&self) -> u64 {
        self.trailer >> 8
    }

    pub fn kind(&self) -> InternalKeyKind {
        InternalKeyKind::from_u8((self.trailer & 0xff) as u8)
    }

    /// The raw kind byte, which may be a reserved code that `kind()` reports
    /// as `Invalid`.
    pub fn kind_byte(&self) -> u8 {
        (self.trailer & 0xff) as u8
    }

    pub fn trailer(&self) -> u64 {
        self.trailer
    }

    /// Rewrites the kind while preserving the user key and sequence number.
    /// Compaction uses this to promote a collapsed Merge to a Set barrier.
    pub fn set_kind(&mut self, kind: InternalKeyKind) {
        self.trailer = (self.trailer & !0xff) | kind as u64;
    }

    /// Returns true if the key has a valid kind.
    pub fn is_valid(&self) -> bool {
        self.kind() != InternalKeyKind::Invalid
    }

    /// Whether the sequence number carries the batch-local bit.
    pub fn is_batch_seq(&self) -> bool {
        self.seq_num() & SEQ_NUM_BATCH != 0
    }
}

/// The total order on internal keys given a user key comparator: ascending by
/// user key, then descending by trailer, so that newer sequence numbers (and
/// larger kinds on sequence ties) come first. Invalid keys sort before valid
/// ones; two invalid keys compare by user key.
pub fn internal_compare<F>(user_cmp: F, a: &InternalKey, b: &InternalKey) -> Ordering
where
    F: Fn(&[u8], &[u8]) -> Ordering,
{
    match (a.is_valid(), b.is_valid()) {
        (false, true) => Ordering::Less,
        (true, false) => Ordering::Greater,
        (false, false) => user_cmp(a.user_key.as_ref(), b.user_key.as_ref()),
        (true, true) => user_cmp(a.user_key.as_ref(), b.user_key.as_ref())
            .then_with(|| b.trailer.cmp(&a.trailer)),
    }
}
