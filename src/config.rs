//! Configuration options for the compaction scoring model.

use serde::{Deserialize, Serialize};

use crate::error::ShaleDbError;

/// Options controlling the per-level compaction scores read by the
/// scheduler.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoringOptions {
    /// L0 is eligible for compaction once it holds this many files.
    pub l0_compaction_file_threshold: u64,
    /// L0 is eligible for compaction once it holds this many bytes.
    pub l0_compaction_byte_threshold: u64,
    /// The target size of the base level. Targets for deeper levels grow
    /// geometrically from this anchor.
    pub lbase_max_bytes: u64,
    /// The base level is the shallowest non-L0 level holding at least this
    /// many bytes.
    pub lbase_level_min_bytes: u64,
    /// The ratio between the target sizes of adjacent levels.
    pub level_size_multiplier: u64,
}

impl Default for ScoringOptions {
    fn default() -> Self {
        Self {
            l0_compaction_file_threshold: 4,
            l0_compaction_byte_threshold: 64 << 20,
            lbase_max_bytes: 64 << 20,
            lbase_level_min_bytes: 2 << 20,
            level_size_multiplier: 10,
        }
    }
}

impl ScoringOptions {
    pub fn validate(&self) -> Result<(), ShaleDbError> {
        if self.l0_compaction_file_threshold == 0
            || self.l0_compaction_byte_threshold == 0
            || self.lbase_max_bytes == 0
        {
            return Err(ShaleDbError::InvalidArgument {
                msg: "compaction thresholds must be non-zero".to_string(),
            });
        }
        if self.level_size_multiplier < 2 {
            return Err(ShaleDbError::InvalidArgument {
                msg: "level_size_multiplier must be at least 2".to_string(),
            });
        }
        Ok(())
    }
}
