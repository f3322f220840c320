use std::io;
use std::sync::Arc;

use bytes::Bytes;

use crate::compaction_iterator::CompactionIterator;
use crate::error::ShaleDbError;
use crate::iter::InternalIterator;
use crate::merge_operator::{MergeOperator, MergeOperatorError};
use crate::types::{internal_compare, InternalKey, InternalKeyKind};

pub(crate) fn ikey(user_key: &[u8], seq: u64, kind: InternalKeyKind) -> InternalKey {
    InternalKey::new(Bytes::copy_from_slice(user_key), seq, kind)
}

pub(crate) fn set(user_key: &[u8], seq: u64, value: &[u8]) -> (InternalKey, Bytes) {
    (
        ikey(user_key, seq, InternalKeyKind::Set),
        Bytes::copy_from_slice(value),
    )
}

pub(crate) fn del(user_key: &[u8], seq: u64) -> (InternalKey, Bytes) {
    (ikey(user_key, seq, InternalKeyKind::Delete), Bytes::new())
}

pub(crate) fn merge(user_key: &[u8], seq: u64, value: &[u8]) -> (InternalKey, Bytes) {
    (
        ikey(user_key, seq, InternalKeyKind::Merge),
        Bytes::copy_from_slice(value),
    )
}

/// A range tombstone covering `[start_key, end_key)`; the end key travels in
/// the value, as in the sstable encoding.
pub(crate) fn rangedel(start_key: &[u8], seq: u64, end_key: &[u8]) -> (InternalKey, Bytes) {
    (
        ikey(start_key, seq, InternalKeyKind::RangeDelete),
        Bytes::copy_from_slice(end_key),
    )
}

pub(crate) fn logdata(user_key: &[u8], seq: u64, payload: &[u8]) -> (InternalKey, Bytes) {
    (
        ikey(user_key, seq, InternalKeyKind::LogData),
        Bytes::copy_from_slice(payload),
    )
}

/// A merge operator that concatenates its operands, newer first.
pub(crate) struct ConcatMergeOperator;

impl MergeOperator for ConcatMergeOperator {
    fn merge(&self, _key: &[u8], newer: &[u8], older: &[u8]) -> Result<Bytes, MergeOperatorError> {
        let mut combined = Vec::with_capacity(newer.len() + older.len());
        combined.extend_from_slice(newer);
        combined.extend_from_slice(older);
        Ok(Bytes::from(combined))
    }
}

/// A scripted in-memory internal iterator. Entries are sorted into internal
/// key order on construction, so tests can list them in any order.
pub(crate) struct TestInternalIterator {
    entries: Vec<(InternalKey, Bytes)>,
    pos: usize,
    err: Option<ShaleDbError>,
    /// If set, advancing past this many records fails with an IO error.
    fail_after: Option<usize>,
}

impl TestInternalIterator {
    pub(crate) fn new(mut entries: Vec<(InternalKey, Bytes)>) -> Self {
        entries.sort_by(|a, b| internal_compare(|x: &[u8], y: &[u8]| x.cmp(y), &a.0, &b.0));
        Self {
            entries,
            pos: 0,
            err: None,
            fail_after: None,
        }
    }

    pub(crate) fn with_error_after(mut self, records: usize) -> Self {
        self.fail_after = Some(records);
        self
    }

    fn check_position(&mut self) -> bool {
        if let Some(limit) = self.fail_after {
            if self.pos >= limit && self.pos < self.entries.len() {
                self.err = Some(ShaleDbError::IoError(Arc::new(io::Error::new(
                    io::ErrorKind::Other,
                    "injected read failure",
                ))));
                return false;
            }
        }
        self.valid()
    }
}

impl InternalIterator for TestInternalIterator {
    fn seek_ge(&mut self, key: &InternalKey) {
        self.pos = self.entries.partition_point(|(k, _)| {
            internal_compare(|x: &[u8], y: &[u8]| x.cmp(y), k, key) == std::cmp::Ordering::Less
        });
        self.check_position();
    }

    fn seek_lt(&mut self, key: &InternalKey) {
        let n = self.entries.partition_point(|(k, _)| {
            internal_compare(|x: &[u8], y: &[u8]| x.cmp(y), k, key) == std::cmp::Ordering::Less
        });
        self.pos = if n == 0 { self.entries.len() } else { n - 1 };
        self.check_position();
    }

    fn first(&mut self) {
        self.pos = 0;
        self.check_position();
    }

    fn last(&mut self) {
        self.pos = self.entries.len().saturating_sub(1);
        self.check_position();
    }

    fn next(&mut self) -> bool {
        if self.err.is_some() {
            return false;
        }
        if self.pos < self.entries.len() {
            self.pos += 1;
        }
        self.check_position()
    }

    fn next_user_key(&mut self) -> bool {
        if self.err.is_some() || !self.valid() {
            return false;
        }
        let user_key = self.entries[self.pos].0.user_key.clone();
        while self.valid() && self.entries[self.pos].0.user_key == user_key {
            if !self.next() {
                return false;
            }
        }
        self.valid()
    }

    fn prev(&mut self) -> bool {
        if self.err.is_some() {
            return false;
        }
        if self.pos == 0 {
            self.pos = self.entries.len();
            return false;
        }
        self.pos -= 1;
        self.check_position()
    }

    fn prev_user_key(&mut self) -> bool {
        if self.err.is_some() || !self.valid() {
            return false;
        }
        let user_key = self.entries[self.pos].0.user_key.clone();
        while self.valid() && self.entries[self.pos].0.user_key == user_key {
            if !self.prev() {
                return false;
            }
        }
        self.valid()
    }

    fn key(&self) -> &InternalKey {
        &self.entries[self.pos].0
    }

    fn value(&self) -> &[u8] {
        self.entries[self.pos].1.as_ref()
    }

    fn valid(&self) -> bool {
        self.err.is_none() && self.pos < self.entries.len()
    }

    fn error(&self) -> Option<ShaleDbError> {
        self.err.clone()
    }

    fn close(&mut self) -> Result<(), ShaleDbError> {
        match &self.err {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }
}

/// Asserts that the compaction iterator emits exactly `expected`, in order,
/// without error.
pub(crate) fn assert_compaction_output<I: InternalIterator>(
    iter: &mut CompactionIterator<I>,
    expected: Vec<(InternalKey, Bytes)>,
) {
    let mut got = Vec::new();
    let mut more = iter.first();
    while more {
        got.push((iter.key().clone(), Bytes::copy_from_slice(iter.value())));
        more = iter.next();
    }
    assert!(
        iter.error().is_none(),
        "unexpected compaction error: {:?}",
        iter.error()
    );
    assert_eq!(got, expected);
    iter.close().expect("close failed");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_iterator_orders_entries() {
        let mut iter = TestInternalIterator::new(vec![
            set(b"b", 1, b"v2"),
            set(b"a", 2, b"v0"),
            set(b"a", 1, b"v1"),
        ]);
        iter.first();
        assert!(iter.valid());
        assert_eq!(iter.key(), &ikey(b"a", 2, InternalKeyKind::Set));
        assert!(iter.next());
        assert_eq!(iter.key(), &ikey(b"a", 1, InternalKeyKind::Set));
        assert!(iter.next());
        assert_eq!(iter.key(), &ikey(b"b", 1, InternalKeyKind::Set));
        assert!(!iter.next());
        assert!(!iter.valid());
    }

    #[test]
    fn scripted_iterator_seeks() {
        let mut iter = TestInternalIterator::new(vec![
            set(b"a", 2, b"v0"),
            set(b"b", 1, b"v1"),
            set(b"c", 3, b"v2"),
        ]);
        iter.seek_ge(&ikey(b"b", u64::MAX >> 8, InternalKeyKind::Max));
        assert!(iter.valid());
        assert_eq!(iter.key().user_key, Bytes::from_static(b"b"));
        assert!(iter.next_user_key());
        assert_eq!(iter.key().user_key, Bytes::from_static(b"c"));
    }
}
