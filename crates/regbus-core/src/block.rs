//! Bounds-checked block transfers.
//!
//! Named block access validates against the register descriptor before
//! touching the channel: bit-field registers are never block-accessible,
//! scalar registers accept only single-word windows, and no window may
//! extend past the declared region size. The address-keyed variants skip
//! descriptor validation entirely and exist for callers (the BLASTER RAM
//! codec) that computed and validated the window themselves.

use tracing::debug;

use crate::bus::RegisterBus;
use crate::channel::HardwareChannel;
use crate::descriptor::{AccessMode, RegisterDescriptor};
use crate::error::BusError;

impl<C: HardwareChannel> RegisterBus<C> {
    /// Reads `count` words from the named region, starting `offset`
    /// words past its base address.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::NotFound`], [`BusError::MaskedBlockAccess`],
    /// [`BusError::SingleRegisterOverrun`], [`BusError::OutOfRange`], or
    /// [`BusError::Hardware`], in that validation order.
    pub fn read_block(&mut self, name: &str, count: u32, offset: u32) -> Result<Vec<u32>, BusError> {
        let descriptor = *self.table().lookup(name)?;
        validate_window(name, &descriptor, count, offset)?;
        let address = resolved_address(name, &descriptor, offset)?;
        debug!(name, count, offset, "block read");
        self.read_block_at(address, count)
    }

    /// Writes `values` contiguously to the named region, starting
    /// `offset` words past its base address.
    ///
    /// # Errors
    ///
    /// Same taxonomy and validation order as [`Self::read_block`].
    pub fn write_block(&mut self, name: &str, values: &[u32], offset: u32) -> Result<(), BusError> {
        let descriptor = *self.table().lookup(name)?;
        let count = word_count(name, values.len())?;
        validate_window(name, &descriptor, count, offset)?;
        let address = resolved_address(name, &descriptor, offset)?;
        debug!(name, count, offset, "block write");
        self.write_block_at(address, values)
    }

    /// Reads `count` words at a pre-resolved `address`, bypassing
    /// descriptor validation.
    ///
    /// Callers must have performed equivalent bounds validation through a
    /// computed address before using this.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Hardware`] on transport failure.
    pub fn read_block_at(&mut self, address: u32, count: u32) -> Result<Vec<u32>, BusError> {
        Ok(self.channel_mut().read(address, count)?)
    }

    /// Writes `values` at a pre-resolved `address`, bypassing descriptor
    /// validation.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Hardware`] on transport failure.
    pub fn write_block_at(&mut self, address: u32, values: &[u32]) -> Result<(), BusError> {
        self.channel_mut().write(address, values)?;
        Ok(())
    }
}

/// The externally authored table can place a region near the top of the
/// address space, so the window start is resolved with checked
/// arithmetic rather than trusted to fit.
fn resolved_address(
    name: &str,
    descriptor: &RegisterDescriptor,
    offset: u32,
) -> Result<u32, BusError> {
    descriptor.address.checked_add(offset).ok_or_else(|| BusError::OutOfRange {
        what: format!("hardware address behind {name} (offset 0x{offset:x})"),
        value: u64::from(descriptor.address) + u64::from(offset),
        limit: u64::from(u32::MAX),
    })
}

fn word_count(name: &str, len: usize) -> Result<u32, BusError> {
    u32::try_from(len).map_err(|_| BusError::OutOfRange {
        what: format!("block transfer length on {name}"),
        value: u64::try_from(len).unwrap_or(u64::MAX),
        limit: u64::from(u32::MAX),
    })
}

fn validate_window(
    name: &str,
    descriptor: &RegisterDescriptor,
    count: u32,
    offset: u32,
) -> Result<(), BusError> {
    if descriptor.is_masked() {
        return Err(BusError::MaskedBlockAccess {
            name: name.to_owned(),
        });
    }
    if descriptor.mode == AccessMode::Single && count > 1 {
        return Err(BusError::SingleRegisterOverrun {
            name: name.to_owned(),
            count,
        });
    }
    let end = u64::from(offset) + u64::from(count);
    if end > u64::from(descriptor.size) {
        return Err(BusError::OutOfRange {
            what: format!("block window on {name} (offset 0x{offset:x}, count 0x{count:x})"),
            value: end,
            limit: u64::from(descriptor.size),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::validate_window;
    use crate::descriptor::{AccessMode, Permissions, RegisterDescriptor, WHOLE_WORD_MASK};
    use crate::error::BusError;

    fn region(mask: u32, size: u32, mode: AccessMode) -> RegisterDescriptor {
        RegisterDescriptor {
            address: 0x1000,
            mask,
            size,
            mode,
            permissions: Permissions::RW,
        }
    }

    #[test]
    fn masked_registers_refuse_any_block_window() {
        let descriptor = region(0x0000_FF00, 1, AccessMode::Single);
        assert!(matches!(
            validate_window("REG", &descriptor, 1, 0),
            Err(BusError::MaskedBlockAccess { .. })
        ));
    }

    #[test]
    fn single_registers_accept_exactly_one_word() {
        let descriptor = region(WHOLE_WORD_MASK, 1, AccessMode::Single);
        assert!(validate_window("REG", &descriptor, 1, 0).is_ok());
        assert!(matches!(
            validate_window("REG", &descriptor, 2, 0),
            Err(BusError::SingleRegisterOverrun { count: 2, .. })
        ));
    }

    #[test]
    fn window_bound_is_inclusive_at_the_region_end() {
        let descriptor = region(WHOLE_WORD_MASK, 10, AccessMode::Block);
        assert!(validate_window("RAM", &descriptor, 4, 6).is_ok());
        assert!(matches!(
            validate_window("RAM", &descriptor, 5, 6),
            Err(BusError::OutOfRange {
                value: 11,
                limit: 10,
                ..
            })
        ));
    }

    #[test]
    fn window_overflow_cannot_wrap() {
        let descriptor = region(WHOLE_WORD_MASK, 10, AccessMode::Block);
        assert!(matches!(
            validate_window("RAM", &descriptor, u32::MAX, u32::MAX),
            Err(BusError::OutOfRange { .. })
        ));
    }
}
