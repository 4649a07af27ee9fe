//! Hardware channel seam and cross-process transfer serialization.
//!
//! Exactly one memory-mapped hardware window exists per board, shared by
//! every server process. [`HardwareChannel`] is the transport contract the
//! rest of the crate is written against; [`ExclusiveChannel`] couples an
//! implementation with a [`TransferLock`] so each transfer holds the
//! system-wide lock for exactly its own duration.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;

use thiserror::Error;
use tracing::warn;

/// Transport-level failure reported by a hardware channel implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// The transport could not complete a read transfer.
    #[error("read of {count} words at 0x{address:08x} failed: {reason}")]
    ReadFailed {
        /// First word address of the failed transfer.
        address: u32,
        /// Requested transfer length in words.
        count: u32,
        /// Transport-specific failure description.
        reason: String,
    },
    /// The transport could not complete a write transfer.
    #[error("write of {count} words at 0x{address:08x} failed: {reason}")]
    WriteFailed {
        /// First word address of the failed transfer.
        address: u32,
        /// Requested transfer length in words.
        count: u32,
        /// Transport-specific failure description.
        reason: String,
    },
    /// The cross-process transfer lock could not be acquired.
    #[error("transfer lock failure: {0}")]
    Lock(String),
}

/// Word-addressed blocking transport into memory-mapped hardware.
///
/// Implementations perform a single contiguous transfer per call. Within
/// one process, call order is transfer order; there is no batching or
/// reordering.
pub trait HardwareChannel {
    /// Reads `count` consecutive 32-bit words starting at `address`.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::ReadFailed`] when the transfer cannot be
    /// completed. Callers decide the retry policy.
    fn read(&mut self, address: u32, count: u32) -> Result<Vec<u32>, ChannelError>;

    /// Writes `words` contiguously starting at `address`.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::WriteFailed`] when the transfer cannot be
    /// completed. Writes are never retried by this crate.
    fn write(&mut self, address: u32, words: &[u32]) -> Result<(), ChannelError>;
}

/// Cross-process mutual exclusion for the shared hardware window.
///
/// Backed by an advisory file lock, so ownership is kernel-enforced: if
/// the holding process dies mid-transfer the lock is released with its
/// file handle and no stale-lock recovery path is needed.
#[derive(Debug)]
pub struct TransferLock {
    file: File,
}

impl TransferLock {
    /// Opens the lock file at `path`, creating it if absent.
    ///
    /// # Errors
    ///
    /// Propagates the underlying filesystem error.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        Ok(Self { file })
    }

    /// Blocks until the exclusive lock is held.
    ///
    /// The returned guard releases the lock when dropped, on every exit
    /// path including errors.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Lock`] when the lock cannot be taken.
    pub fn acquire(&self) -> Result<TransferGuard<'_>, ChannelError> {
        self.file
            .lock()
            .map_err(|err| ChannelError::Lock(err.to_string()))?;
        Ok(TransferGuard { file: &self.file })
    }
}

/// Holds the exclusive transfer lock for the duration of one transfer.
#[derive(Debug)]
pub struct TransferGuard<'lock> {
    file: &'lock File,
}

impl Drop for TransferGuard<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.file.unlock() {
            warn!(%err, "failed to release transfer lock");
        }
    }
}

/// Wraps a channel so every transfer is serialized through a
/// [`TransferLock`].
///
/// Block transfers hold the lock for the whole contiguous transfer, not
/// per word. Ordering across processes is whatever the lock grants; only
/// mutual exclusion is guaranteed.
#[derive(Debug)]
pub struct ExclusiveChannel<C> {
    inner: C,
    lock: TransferLock,
}

impl<C> ExclusiveChannel<C> {
    /// Couples `inner` with the cross-process transfer lock.
    pub const fn new(inner: C, lock: TransferLock) -> Self {
        Self { inner, lock }
    }

    /// Releases the wrapper, returning the underlying channel.
    pub fn into_inner(self) -> C {
        self.inner
    }
}

impl<C: HardwareChannel> HardwareChannel for ExclusiveChannel<C> {
    fn read(&mut self, address: u32, count: u32) -> Result<Vec<u32>, ChannelError> {
        let _held = self.lock.acquire()?;
        self.inner.read(address, count)
    }

    fn write(&mut self, address: u32, words: &[u32]) -> Result<(), ChannelError> {
        let _held = self.lock.acquire()?;
        self.inner.write(address, words)
    }
}

#[cfg(test)]
mod tests {
    use super::{ChannelError, ExclusiveChannel, HardwareChannel, TransferLock};
    use std::collections::HashMap;

    #[derive(Debug, Default)]
    struct MapChannel {
        mem: HashMap<u32, u32>,
    }

    impl HardwareChannel for MapChannel {
        fn read(&mut self, address: u32, count: u32) -> Result<Vec<u32>, ChannelError> {
            Ok((address..address + count)
                .map(|a| self.mem.get(&a).copied().unwrap_or(0))
                .collect())
        }

        fn write(&mut self, address: u32, words: &[u32]) -> Result<(), ChannelError> {
            for (i, word) in words.iter().enumerate() {
                let offset = u32::try_from(i).expect("test transfer fits in u32");
                self.mem.insert(address + offset, *word);
            }
            Ok(())
        }
    }

    #[test]
    fn exclusive_channel_passes_transfers_through() {
        let dir = tempfile::tempdir().expect("temp dir");
        let lock = TransferLock::open(&dir.path().join("channel.lock")).expect("lock file");
        let mut channel = ExclusiveChannel::new(MapChannel::default(), lock);

        channel.write(0x40, &[0xDEAD_BEEF, 0x1234_5678]).expect("write");
        assert_eq!(
            channel.read(0x40, 2).expect("read"),
            vec![0xDEAD_BEEF, 0x1234_5678]
        );
    }

    #[test]
    fn transfer_lock_is_reacquirable_after_guard_drop() {
        let dir = tempfile::tempdir().expect("temp dir");
        let lock = TransferLock::open(&dir.path().join("channel.lock")).expect("lock file");

        drop(lock.acquire().expect("first acquisition"));
        drop(lock.acquire().expect("second acquisition"));
    }
}
