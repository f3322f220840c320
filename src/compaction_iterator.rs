use std::cmp::Ordering;

use bytes::Bytes;

use crate::error::ShaleDbError;
use crate::iter::InternalIterator;
use crate::merge_operator::MergeOperatorType;
use crate::types::{InternalKey, InternalKeyKind, UserComparator, SEQ_NUM_BATCH};

/// A predicate supplied by the compaction scheduler. It returns true when no
/// lower level can contain any record for the user key, so a point tombstone
/// at the bottom of its stripe shadows nothing and can be dropped.
pub type ElideTombstone = Box<dyn Fn(&[u8]) -> bool + Send + Sync>;

/// Receives range deletion records in arrival order so they can be
/// fragmented and materialized into the output file separately from the
/// point-record stream.
pub trait RangeDeleteSink: Send + Sync {
    fn add(&mut self, key: &InternalKey, value: &[u8]) -> Result<(), ShaleDbError>;
}

/// A forward-only iterator that encapsulates the logic for collapsing
/// records during compaction. It wraps a merging iterator over the input
/// levels and drops records that are shadowed by newer records for the same
/// user key. The simplest case is two records `a.Set.2` and `a.Set.1`: only
/// `a.Set.2` is emitted, since the older record can never be observed again.
///
/// Three things complicate this story.
///
/// Point tombstones can sometimes be dropped entirely: a Delete only needs
/// to be written out if it might shadow a record in a level below the
/// compaction output. The scheduler communicates this through the
/// `elide_tombstone` predicate, which returns true when it can prove no
/// lower level contains the key (always true when compacting into the
/// bottommost level).
///
/// Merge records fold together: on seeing a Merge, the iterator scans
/// forward combining operands for the same key via the merge operator. A Set
/// ends the chain and the result is emitted with kind Set. The promotion
/// matters: the emitted record acts as a barrier so that a future compaction
/// cannot combine it with still older Merge operands that were not part of
/// this compaction. A Delete also ends the chain; the accumulated value is
/// emitted as a Merge and the tombstone, along with the history it shadows,
/// is consumed.
///
/// Snapshots restrict all of the above. Active snapshot sequence numbers
/// s1 < s2 < ... partition the sequence space into stripes (-inf, s1],
/// (s1, s2], ..., (sk, inf), and records may only collapse with records in
/// the same stripe: the newest record at or below each snapshot must survive
/// so the snapshot's view of the database is preserved. Every rule above
/// operates within a stripe, and a tombstone may only be elided from the
/// oldest stripe. Records whose sequence number carries the batch-local bit
/// never collapse with anything and pass through unchanged.
pub struct CompactionIterator<I: InternalIterator> {
    iter: I,
    cmp: UserComparator,
    merge: MergeOperatorType,
    /// Active snapshot sequence numbers, ascending. Immutable for the
    /// lifetime of the compaction.
    snapshots: Vec<u64>,
    elide_tombstone: ElideTombstone,
    range_del_sink: Option<Box<dyn RangeDeleteSink>>,
    /// The current output record. Owned by the iterator; borrows handed out
    /// by `key()`/`value()` are invalidated on advance.
    key: InternalKey,
    value: Bytes,
    valid: bool,
    /// Whether the next advance must first consume the rest of the current
    /// (user key, stripe), which is shadowed by the record just emitted.
    skip: bool,
    err: Option<ShaleDbError>,
}

impl<I: InternalIterator> CompactionIterator<I> {
    pub fn new(
        iter: I,
        cmp: UserComparator,
        merge: MergeOperatorType,
        mut snapshots: Vec<u64>,
        elide_tombstone: ElideTombstone,
    ) -> Self {
        snapshots.sort_unstable();
        snapshots.dedup();
        Self {
            iter,
            cmp,
            merge,
            snapshots,
            elide_tombstone,
            range_del_sink: None,
            key: InternalKey::new(Bytes::new(), 0, InternalKeyKind::Invalid),
            value: Bytes::new(),
            valid: false,
            skip: false,
            err: None,
        }
    }

    pub fn with_range_delete_sink(mut self, sink: Box<dyn RangeDeleteSink>) -> Self {
        self.range_del_sink = Some(sink);
        self
    }

    /// Positions the iterator at the first output record, if any.
    pub fn first(&mut self) -> bool {
        if self.err.is_some() {
            return false;
        }
        self.iter.first();
        self.skip = false;
        self.next()
    }

    /// Advances to the next output record. Returns false when the input is
    /// exhausted or an error has been latched.
    pub fn next(&mut self) -> bool {
        if self.err.is_some() {
            return false;
        }
        if self.skip {
            self.skip = false;
            self.skip_in_stripe();
            if self.err.is_some() {
                self.valid = false;
                return false;
            }
        }

        self.valid = false;
        while self.iter.valid() {
            let (seq, kind, kind_byte) = {
                let k = self.iter.key();
                (k.seq_num(), k.kind(), k.kind_byte())
            };
            if seq & SEQ_NUM_BATCH != 0 {
                // Batch-local records pass through untouched.
                self.save_current();
                self.valid = true;
                self.iter.next();
                return true;
            }
            match kind {
                InternalKeyKind::Delete => {
                    if self.in_oldest_stripe(seq)
                        && (self.elide_tombstone)(self.iter.key().user_key.as_ref())
                    {
                        // Nothing below this stripe, and the predicate says
                        // no lower level holds the key either: the tombstone
                        // and everything it shadows can be dropped.
                        self.skip_elided_user_key();
                        if self.err.is_some() {
                            return false;
                        }
                        continue;
                    }
                    self.save_current();
                    self.valid = true;
                    self.skip = true;
                    return true;
                }
                InternalKeyKind::Set => {
                    self.save_current();
                    self.valid = true;
                    self.skip = true;
                    return true;
                }
                InternalKeyKind::Merge => return self.merge_next(),
                InternalKeyKind::RangeDelete => {
                    // Range tombstones travel on their own channel and are
                    // never emitted on the point-record stream.
                    if let Err(e) = self.forward_range_delete() {
                        self.err = Some(e);
                        return false;
                    }
                    self.iter.next();
                }
                InternalKeyKind::LogData => {
                    self.iter.next();
                }
                _ => {
                    self.err = Some(ShaleDbError::CorruptInternalKey { kind: kind_byte });
                    return false;
                }
            }
        }
        if let Some(e) = self.iter.error() {
            self.err = Some(e);
        }
        false
    }

    /// The current output key. Valid until the next advance.
    pub fn key(&self) -> &InternalKey {
        &self.key
    }

    /// The current output value. Valid until the next advance.
    pub fn value(&self) -> &[u8] {
        self.value.as_ref()
    }

    pub fn valid(&self) -> bool {
        self.valid
    }

    /// The first error encountered, if any. Once set, `next()` returns
    /// false and the compaction must be aborted without installing output.
    pub fn error(&self) -> Option<&ShaleDbError> {
        self.err.as_ref()
    }

    pub fn close(&mut self) -> Result<(), ShaleDbError> {
        let inner = self.iter.close();
        if let Some(e) = &self.err {
            return Err(e.clone());
        }
        inner
    }

    /// The index of the snapshot stripe containing `seq`: the number of
    /// snapshots strictly below it. Stripe 0 extends to the beginning of
    /// time.
    fn stripe_of(&self, seq: u64) -> usize {
        self.snapshots.partition_point(|&s| s < seq)
    }

    fn in_oldest_stripe(&self, seq: u64) -> bool {
        self.stripe_of(seq) == 0
    }

    fn save_current(&mut self) {
        self.key = self.iter.key().clone();
        self.value = Bytes::copy_from_slice(self.iter.value());
    }

    /// Consumes the remainder of the emitted record's (user key, stripe),
    /// which it shadows. Range tombstones encountered along the way are
    /// still forwarded to the sink. Stops at a user key change, a stripe
    /// boundary, or a batch-local record.
    fn skip_in_stripe(&mut self) {
        let stripe = self.stripe_of(self.key.seq_num());
        while self.iter.valid() {
            let (seq, kind, same_key) = {
                let k = self.iter.key();
                let same_key = (self.cmp)(self.key.user_key.as_ref(), k.user_key.as_ref())
                    == Ordering::Equal;
                (k.seq_num(), k.kind(), same_key)
            };
            if !same_key || seq & SEQ_NUM_BATCH != 0 || self.stripe_of(seq) != stripe {
                return;
            }
            if kind == InternalKeyKind::RangeDelete {
                if let Err(e) = self.forward_range_delete() {
                    self.err = Some(e);
                    return;
                }
            }
            self.iter.next();
        }
    }

    /// Consumes an elided tombstone and everything it shadows, stopping at
    /// the next user key. Point records under the tombstone are dropped, but
    /// a range tombstone is not shadowed by a point delete and is still
    /// forwarded to the sink.
    fn skip_elided_user_key(&mut self) {
        let user_key = self.iter.key().user_key.clone();
        self.iter.next();
        while self.iter.valid() {
            let (kind, same_key) = {
                let k = self.iter.key();
                let same_key =
                    (self.cmp)(user_key.as_ref(), k.user_key.as_ref()) == Ordering::Equal;
                (k.kind(), same_key)
            };
            if !same_key {
                return;
            }
            if kind == InternalKeyKind::RangeDelete {
                if let Err(e) = self.forward_range_delete() {
                    self.err = Some(e);
                    return;
                }
            }
            self.iter.next();
        }
    }

    /// Folds a chain of Merge operands for the current user key, newest
    /// first, until something ends the chain. Entered with the iterator
    /// positioned at the first (newest) Merge record.
    fn merge_next(&mut self) -> bool {
        self.save_current();
        self.valid = true;
        self.skip = true;
        let stripe = self.stripe_of(self.key.seq_num());

        loop {
            self.iter.next();
            if !self.iter.valid() {
                if let Some(e) = self.iter.error() {
                    self.err = Some(e);
                    self.valid = false;
                    return false;
                }
                self.skip = false;
                return true;
            }
            let (seq, kind, kind_byte, same_key) = {
                let k = self.iter.key();
                let same_key = (self.cmp)(self.key.user_key.as_ref(), k.user_key.as_ref())
                    == Ordering::Equal;
                (k.seq_num(), k.kind(), k.kind_byte(), same_key)
            };
            if !same_key {
                // We've advanced to the next user key.
                self.skip = false;
                return true;
            }
            if seq & SEQ_NUM_BATCH != 0 || self.stripe_of(seq) != stripe {
                // Records past the boundary are visible to a snapshot (or
                // batch-local) and must be processed on their own.
                self.skip = false;
                return true;
            }
            match kind {
                InternalKeyKind::Delete => {
                    // The tombstone removes the history below it. Emit the
                    // accumulated value; the skip pass consumes the
                    // tombstone along with the rest of the stripe.
                    return true;
                }
                InternalKeyKind::Set => {
                    // MERGE+MERGE+SET -> SET, so the result shadows operands
                    // in lower levels that were not part of this compaction.
                    if let Err(e) = self.merge_with_current() {
                        self.err = Some(e);
                        self.valid = false;
                        return false;
                    }
                    self.key.set_kind(InternalKeyKind::Set);
                    return true;
                }
                InternalKeyKind::Merge => {
                    if let Err(e) = self.merge_with_current() {
                        self.err = Some(e);
                        self.valid = false;
                        return false;
                    }
                }
                InternalKeyKind::RangeDelete => {
                    if let Err(e) = self.forward_range_delete() {
                        self.err = Some(e);
                        self.valid = false;
                        return false;
                    }
                }
                InternalKeyKind::LogData => {}
                _ => {
                    self.err = Some(ShaleDbError::CorruptInternalKey { kind: kind_byte });
                    self.valid = false;
                    return false;
                }
            }
        }
    }

    fn merge_with_current(&mut self) -> Result<(), ShaleDbError> {
        let merged = self.merge.merge(
            self.key.user_key.as_ref(),
            self.value.as_ref(),
            self.iter.value(),
        )?;
        self.value = merged;
        Ok(())
    }

    fn forward_range_delete(&mut self) -> Result<(), ShaleDbError> {
        if let Some(sink) = self.range_del_sink.as_mut() {
            sink.add(self.iter.key(), self.iter.value())?;
        }
        Ok(())
    }
}
