use crate::layout::MAX_CAPACITY;
use thiserror::Error;

/// Error type for fallible map operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MapError {
    /// The table would have to grow past the maximum capacity (2^30 slots).
    #[error("capacity exceeded: table cannot grow past {MAX_CAPACITY} slots")]
    CapacityExceeded,
}
