use crate::error::ShaleDbError;
use crate::types::InternalKey;

/// A cursor over internal records in key order.
///
/// Unlike a user-facing iterator, positions are "internal keys" composed of
/// the user key, a sequence number and a record kind. In both forward and
/// reverse iteration, records for identical user keys are visited in
/// descending sequence order: newer records are returned before older ones.
///
/// Compaction consumes a merging implementation of this trait that draws from
/// all input levels; only the forward operations are exercised there. The
/// borrowed views returned by `key()` and `value()` are valid until the next
/// positioning call.
///
/// An iterator must be closed after use, but it is not necessary to read it
/// to exhaustion.
pub trait InternalIterator {
    /// Moves the iterator to the first record whose key is greater than or
    /// equal to the given key.
    fn seek_ge(&mut self, key: &InternalKey);

    /// Moves the iterator to the last record whose key is less than the
    /// given key.
    fn seek_lt(&mut self, key: &InternalKey);

    /// Moves the iterator to the first record.
    fn first(&mut self);

    /// Moves the iterator to the last record.
    fn last(&mut self);

    /// Moves the iterator to the next record. Returns false when exhausted.
    fn next(&mut self) -> bool;

    /// Moves the iterator to the next record with a user key greater than
    /// the current user key. Returns false when exhausted.
    fn next_user_key(&mut self) -> bool;

    /// Moves the iterator to the previous record. Returns false when
    /// exhausted.
    fn prev(&mut self) -> bool;

    /// Moves the iterator to the previous record with a user key less than
    /// the current user key. Returns false when exhausted.
    fn prev_user_key(&mut self) -> bool;

    /// The current internal key. Undefined unless `valid()` returns true.
    /// The returned borrow is invalidated by the next positioning call.
    fn key(&self) -> &InternalKey;

    /// The value of the current record. Undefined unless `valid()` returns
    /// true. The returned borrow is invalidated by the next positioning call.
    fn value(&self) -> &[u8];

    /// Whether the iterator is positioned at a valid record.
    fn valid(&self) -> bool;

    /// Any accumulated error. An iterator that stops with an error also
    /// reports `valid() == false`.
    fn error(&self) -> Option<ShaleDbError>;

    /// Closes the iterator and returns any accumulated error. Exhausting the
    /// input is not an error. It is valid to call close multiple times;
    /// other operations must not be called afterwards.
    fn close(&mut self) -> Result<(), ShaleDbError>;
}
