use std::io;

use thiserror::Error;

use crate::blaster::RamRegion;
use crate::channel::ChannelError;

/// Coarse failure classes used by callers (such as an RPC layer) to bucket
/// errors without matching on message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Register name missing from the address table.
    Lookup,
    /// Operation refused by the descriptor permission set.
    Permission,
    /// Block or blob validation failure (mask, mode, bounds, size, region).
    Validation,
    /// Transport failure after the read retry budget, or immediately on write.
    Hardware,
    /// Persistent address-table store failure.
    Store,
}

/// Errors surfaced by register bus operations.
#[derive(Debug, Error)]
pub enum BusError {
    /// Register name absent from the address table.
    #[error("register {0} was not found in the address table")]
    NotFound(String),
    /// Descriptor permissions do not grant the requested operation.
    #[error("no '{needed}' permission for register {name}")]
    PermissionDenied {
        /// Register name whose descriptor refused the operation.
        name: String,
        /// Permission flag that was required (`r` or `w`).
        needed: char,
    },
    /// Block transfer attempted on a bit-field (masked) register.
    #[error("block access attempted on masked register {name}")]
    MaskedBlockAccess {
        /// Register name carrying a non-whole-word mask.
        name: String,
    },
    /// Block transfer of more than one word attempted on a scalar register.
    #[error("block access of {count} words attempted on single register {name}")]
    SingleRegisterOverrun {
        /// Scalar register name.
        name: String,
        /// Requested word count.
        count: u32,
    },
    /// A bounds check failed: block window, link index, or chip index.
    #[error("{what} out of range: {value} exceeds limit {limit}")]
    OutOfRange {
        /// Description of the checked quantity.
        what: String,
        /// Value that failed the check.
        value: u64,
        /// Largest acceptable value.
        limit: u64,
    },
    /// A RAM region discriminant is unknown, or the operation does not
    /// accept the combined `ALL` region.
    #[error("invalid BLASTER RAM region type 0x{0:02x}")]
    InvalidRegionType(u8),
    /// A configuration blob length is incompatible with the RAM capacity.
    #[error("blob of {actual} words is incompatible with {region} RAM capacity {expected}")]
    BlobSizeMismatch {
        /// RAM region the blob was intended for.
        region: RamRegion,
        /// Hardware-reported word capacity of the region.
        expected: u32,
        /// Word length of the supplied blob.
        actual: usize,
    },
    /// The hardware channel failed: reads after exhausting the retry
    /// budget, writes immediately.
    #[error("hardware channel error: {0}")]
    Hardware(#[from] ChannelError),
    /// The persistent address-table store could not be read or written.
    #[error("address table store i/o failure")]
    StoreIo(#[from] io::Error),
    /// The persistent address-table store holds an unparsable record.
    #[error("address table store corrupted at line {line}: {reason}")]
    StoreCorrupted {
        /// 1-indexed line of the offending record.
        line: usize,
        /// Parse failure description.
        reason: String,
    },
    /// A reload would grow the store past its fixed size cap.
    #[error("address table store would exceed the {limit}-byte cap")]
    StoreTooLarge {
        /// Maximum store size in bytes.
        limit: u64,
    },
    /// The environment variable locating the store is not set.
    #[error("environment variable {0} is not set")]
    StoreUnconfigured(&'static str),
}

impl BusError {
    /// Returns the coarse classification for this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::Lookup,
            Self::PermissionDenied { .. } => ErrorKind::Permission,
            Self::MaskedBlockAccess { .. }
            | Self::SingleRegisterOverrun { .. }
            | Self::OutOfRange { .. }
            | Self::InvalidRegionType(_)
            | Self::BlobSizeMismatch { .. } => ErrorKind::Validation,
            Self::Hardware(_) => ErrorKind::Hardware,
            Self::StoreIo(_)
            | Self::StoreCorrupted { .. }
            | Self::StoreTooLarge { .. }
            | Self::StoreUnconfigured(_) => ErrorKind::Store,
        }
    }
}
