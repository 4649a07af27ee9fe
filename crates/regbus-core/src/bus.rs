//! Masked single-register transactions over the shared hardware channel.
//!
//! [`RegisterBus`] resolves symbolic names through the [`AddressTable`]
//! and performs word transactions on the [`HardwareChannel`]. Masked
//! registers are bit subfields of their containing word: reads extract
//! the field, writes read-modify-write the untouched bits back.

use tracing::{error, warn};

use crate::channel::{ChannelError, HardwareChannel};
use crate::descriptor::RegisterDescriptor;
use crate::error::BusError;
use crate::table::AddressTable;

/// Number of attempts a raw-address read makes before reporting failure.
///
/// Writes are never retried: a retried write risks double-applying a
/// side-effecting command, while a reread is harmless.
pub const READ_RETRY_LIMIT: u32 = 10;

/// Extracts the bit field selected by `mask` from a raw word.
///
/// The field is right-aligned by the position of the lowest set mask bit:
/// `apply_mask(0x0000_AB00, 0x0000_FF00) == 0xAB`. An all-zero mask
/// selects nothing and yields 0.
#[must_use]
pub const fn apply_mask(data: u32, mask: u32) -> u32 {
    if mask == 0 {
        return 0;
    }
    (data & mask) >> mask.trailing_zeros()
}

/// Returns bit `bit` of `word` as 0 or 1.
///
/// # Errors
///
/// Returns [`BusError::OutOfRange`] when `bit` exceeds 31.
pub fn bit_check(word: u32, bit: u8) -> Result<u32, BusError> {
    if bit > 31 {
        return Err(BusError::OutOfRange {
            what: "bit index into a 32-bit word".to_owned(),
            value: u64::from(bit),
            limit: 31,
        });
    }
    Ok((word >> bit) & 0x1)
}

/// The register transactor: named and raw word transactions.
#[derive(Debug)]
pub struct RegisterBus<C> {
    table: AddressTable,
    channel: C,
}

impl<C> RegisterBus<C> {
    /// Couples an address table with the hardware channel.
    pub const fn new(table: AddressTable, channel: C) -> Self {
        Self { table, channel }
    }

    /// The address table backing name resolution.
    #[must_use]
    pub const fn table(&self) -> &AddressTable {
        &self.table
    }

    /// Mutable table access, used to reload the schema.
    pub fn table_mut(&mut self) -> &mut AddressTable {
        &mut self.table
    }

    /// Releases the bus, returning its parts.
    pub fn into_parts(self) -> (AddressTable, C) {
        (self.table, self.channel)
    }

    pub(crate) fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }
}

impl<C: HardwareChannel> RegisterBus<C> {
    /// Reads the raw word at `address`, bypassing the address table.
    ///
    /// Used by callers holding a pre-resolved address, such as scan inner
    /// loops that would otherwise re-resolve the same name thousands of
    /// times. Retries up to [`READ_RETRY_LIMIT`] times on transport
    /// failure.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Hardware`] once the retry budget is exhausted.
    pub fn read_raw_address(&mut self, address: u32) -> Result<u32, BusError> {
        let mut attempt = 0;
        loop {
            match self.channel.read(address, 1) {
                Ok(words) => {
                    return words.first().copied().ok_or_else(|| {
                        BusError::Hardware(ChannelError::ReadFailed {
                            address,
                            count: 1,
                            reason: "transport returned no data".to_owned(),
                        })
                    })
                }
                Err(err) => {
                    attempt += 1;
                    if attempt >= READ_RETRY_LIMIT {
                        error!(address, attempt, "raw read failed, retry budget exhausted");
                        return Err(BusError::Hardware(err));
                    }
                    warn!(address, attempt, "raw read failed, retrying");
                }
            }
        }
    }

    /// Writes `value` to the raw word at `address`, bypassing the address
    /// table. A failed write is reported immediately, never retried.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Hardware`] on transport failure.
    pub fn write_raw_address(&mut self, address: u32, value: u32) -> Result<(), BusError> {
        self.channel.write(address, &[value])?;
        Ok(())
    }

    /// Reads the raw word behind `name`, ignoring the register mask.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::NotFound`] or [`BusError::Hardware`].
    pub fn read_raw_reg(&mut self, name: &str) -> Result<u32, BusError> {
        let address = self.table.lookup(name)?.address;
        self.read_raw_address(address)
    }

    /// Writes the raw word behind `name`, ignoring the register mask.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::NotFound`] or [`BusError::Hardware`].
    pub fn write_raw_reg(&mut self, name: &str, value: u32) -> Result<(), BusError> {
        let address = self.table.lookup(name)?.address;
        self.write_raw_address(address, value)
    }

    /// Reads the named register, extracting the masked field if any.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::NotFound`], [`BusError::PermissionDenied`]
    /// when `r` is not granted, or [`BusError::Hardware`].
    pub fn read_register(&mut self, name: &str) -> Result<u32, BusError> {
        let descriptor = *self.table.lookup(name)?;
        if !descriptor.permissions.read {
            return Err(BusError::PermissionDenied {
                name: name.to_owned(),
                needed: 'r',
            });
        }
        let raw = self.read_raw_address(descriptor.address)?;
        if descriptor.is_masked() {
            Ok(apply_mask(raw, descriptor.mask))
        } else {
            Ok(raw)
        }
    }

    /// Writes the named register. Unmasked registers take `value`
    /// directly; masked registers read-modify-write so bits outside the
    /// mask keep their current hardware state.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::NotFound`], [`BusError::PermissionDenied`]
    /// when `w` is not granted, or [`BusError::Hardware`].
    pub fn write_register(&mut self, name: &str, value: u32) -> Result<(), BusError> {
        let descriptor = *self.table.lookup(name)?;
        if !descriptor.permissions.write {
            return Err(BusError::PermissionDenied {
                name: name.to_owned(),
                needed: 'w',
            });
        }
        if !descriptor.is_masked() {
            return self.write_raw_address(descriptor.address, value);
        }
        let current = self.read_raw_address(descriptor.address)?;
        let merged = merge_field(current, value, &descriptor);
        self.write_raw_address(descriptor.address, merged)
    }
}

fn merge_field(current: u32, value: u32, descriptor: &RegisterDescriptor) -> u32 {
    let shifted = value
        .checked_shl(descriptor.mask.trailing_zeros())
        .unwrap_or(0);
    (shifted & descriptor.mask) | (current & !descriptor.mask)
}
