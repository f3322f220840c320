use std::sync::Arc;
use thiserror::Error;

use crate::merge_operator::MergeOperatorError;

#[non_exhaustive]
#[derive(Clone, Debug, Error)]
pub enum ShaleDbError {
    #[error("IO error: {0}")]
    IoError(#[from] Arc<std::io::Error>),

    /// An unknown or invalid record kind was encountered during iteration.
    /// The compaction must be aborted; partial output must not be installed.
    #[error("corrupt internal key: invalid kind {kind}")]
    CorruptInternalKey { kind: u8 },

    #[error("Merge Operator error: {0}")]
    MergeOperatorError(#[from] MergeOperatorError),

    #[error("Invalid Argument: {msg}")]
    InvalidArgument { msg: String },
}
