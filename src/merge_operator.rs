use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;

#[non_exhaustive]
#[derive(Clone, Debug, Error)]
pub enum MergeOperatorError {
    #[error("invalid merge operand: {msg}")]
    InvalidOperand { msg: String },
}

/// A trait for implementing custom merge operations.
///
/// The merge operator allows applications to bypass the traditional
/// read/modify/update cycle in situations where the update can be expressed
/// as an associative operator. Compaction uses it to collapse chains of
/// Merge records into a single record.
///
/// # Associativity Requirement
/// The merge operation MUST be associative, meaning that for any values
/// a, b, and c: merge(merge(a, b), c) == merge(a, merge(b, c)). Compaction
/// folds operands newest-first, so `newer` is always the accumulated newer
/// half of the chain and `older` the next operand toward the past.
///
/// Implementations must not retain the borrowed operands beyond the call;
/// the returned value is owned.
///
/// # Examples
/// A counter merge operator:
/// ```
/// use bytes::Bytes;
/// use shaledb::{MergeOperator, MergeOperatorError};
///
/// struct CounterMergeOperator;
///
/// impl MergeOperator for CounterMergeOperator {
///     fn merge(
///         &self,
///         _key: &[u8],
///         newer: &[u8],
///         older: &[u8],
///     ) -> Result<Bytes, MergeOperatorError> {
///         let a = u64::from_le_bytes(newer.try_into().map_err(|_| {
///             MergeOperatorError::InvalidOperand {
///                 msg: "counter operand must be 8 bytes".to_string(),
///             }
///         })?);
///         let b = u64::from_le_bytes(older.try_into().map_err(|_| {
///             MergeOperatorError::InvalidOperand {
///                 msg: "counter operand must be 8 bytes".to_string(),
///             }
///         })?);
///         Ok(Bytes::copy_from_slice(&(a + b).to_le_bytes()))
///     }
/// }
/// ```
pub trait MergeOperator {
    /// Combines two operands for `key` into a single value. `newer` is the
    /// more recent operand, `older` the less recent one.
    fn merge(&self, key: &[u8], newer: &[u8], older: &[u8]) -> Result<Bytes, MergeOperatorError>;
}

pub type MergeOperatorType = Arc<dyn MergeOperator + Send + Sync>;
