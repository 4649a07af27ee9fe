//! Register-bus core for CTP7/Zynq GEM board control.

/// Register descriptor model: address, mask, size, access mode, permissions.
pub mod descriptor;
pub use descriptor::{
    AccessMode, Permissions, RecordError, RegisterDescriptor, WHOLE_WORD_MASK,
};

/// Fault taxonomy for lookup, permission, validation, transport and store errors.
pub mod error;
pub use error::{BusError, ErrorKind};

/// Hardware transport seam and cross-process transfer locking.
pub mod channel;
pub use channel::{ChannelError, ExclusiveChannel, HardwareChannel, TransferGuard, TransferLock};

/// Persistent name-to-descriptor address table.
pub mod table;
pub use table::{AddressTable, STORE_FILE_NAME, STORE_PATH_ENV, STORE_SIZE_CAP};

/// Single-register transactions: masked field access and retry-bounded raw I/O.
pub mod bus;
pub use bus::{apply_mask, bit_check, RegisterBus, READ_RETRY_LIMIT};

/// Validated block transfers over `Block` and `Fifo` registers.
pub mod block;

/// Slow-control link health probing with saturating error counters.
pub mod health;
pub use health::{
    LinkHealthMonitor, Sleeper, SlowCtrlErrorCounters, StdSleeper, INTER_READ_DELAY,
    LINK_RESET_SETTLE,
};

/// BLASTER configuration RAM blob codec for GBT, OptoHybrid and VFAT chips.
pub mod blaster;
pub use blaster::{
    RamBlobCodec, RamRegion, FULL_LINK_MASK, GBTS_PER_OH, GBT_SINGLE_RAM_WORDS, OH_PER_AMC,
    OH_SINGLE_RAM_WORDS, VFATS_PER_OH, VFAT_SINGLE_RAM_WORDS,
};

#[cfg(test)]
use proptest as _;
#[cfg(test)]
use rstest as _;
#[cfg(test)]
use tempfile as _;
