//! BLASTER RAM blob codec: bulk chip-configuration transfers.
//!
//! The board holds three contiguous configuration RAM regions (GBT,
//! OptoHybrid, VFAT), each split per optical link and, within a link,
//! per chip. Blobs are staged here in bulk and blasted to the front-end
//! instead of being written register-by-register. Region capacities are
//! hardware-reported at runtime, so every size-dependent operation
//! re-queries capacity before validating a blob.
//!
//! Link-selective transfers use a 12-bit link mask and a **dense** blob
//! layout: one contiguous per-link block for every set bit, in ascending
//! link order, with no padding for skipped links. Callers size and index
//! their buffers accordingly; the codec never inserts placeholder words.

use std::fmt;

use tracing::debug;

use crate::bus::RegisterBus;
use crate::channel::HardwareChannel;
use crate::error::BusError;

/// Optical links served by one AMC.
pub const OH_PER_AMC: u32 = 12;
/// GBT chips on each OptoHybrid link.
pub const GBTS_PER_OH: u32 = 3;
/// VFAT chips on each OptoHybrid link.
pub const VFATS_PER_OH: u32 = 24;
/// Words of BLASTER RAM holding one GBT configuration.
pub const GBT_SINGLE_RAM_WORDS: u32 = 92;
/// Words of BLASTER RAM holding one OptoHybrid FPGA configuration.
pub const OH_SINGLE_RAM_WORDS: u32 = 100;
/// Words of BLASTER RAM holding one VFAT configuration.
pub const VFAT_SINGLE_RAM_WORDS: u32 = 74;
/// Link mask selecting all 12 links.
pub const FULL_LINK_MASK: u16 = 0xFFF;

/// Register reporting how many OptoHybrid links the firmware serves.
const NUM_OF_OH_REG: &str = "GEM_AMC.GEM_SYSTEM.CONFIG.NUM_OF_OH";

/// One of the BLASTER configuration RAM regions, or their union.
///
/// Discriminants are the stable wire values used by remote callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[repr(u8)]
pub enum RamRegion {
    /// GBT configuration RAM.
    Gbt = 0x1,
    /// OptoHybrid FPGA configuration RAM.
    OptoHybrid = 0x2,
    /// VFAT configuration RAM.
    Vfat = 0x4,
    /// Ordered concatenation GBT ++ OptoHybrid ++ VFAT.
    All = 0x7,
}

impl RamRegion {
    /// Converts a region to its stable wire discriminant.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Converts a wire discriminant back into a region.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x1 => Some(Self::Gbt),
            0x2 => Some(Self::OptoHybrid),
            0x4 => Some(Self::Vfat),
            0x7 => Some(Self::All),
            _ => None,
        }
    }

    /// The three concrete regions in transfer order.
    pub const COMPONENTS: [Self; 3] = [Self::Gbt, Self::OptoHybrid, Self::Vfat];

    /// Words in one per-link sub-block, or `None` for [`Self::All`].
    #[must_use]
    pub const fn per_link_words(self) -> Option<u32> {
        match self {
            Self::Gbt => Some(GBT_SINGLE_RAM_WORDS * GBTS_PER_OH),
            Self::OptoHybrid => Some(OH_SINGLE_RAM_WORDS),
            Self::Vfat => Some(VFAT_SINGLE_RAM_WORDS * VFATS_PER_OH),
            Self::All => None,
        }
    }

    /// Chips addressable within one link, or `None` for [`Self::All`].
    #[must_use]
    pub const fn chips_per_link(self) -> Option<u32> {
        match self {
            Self::Gbt => Some(GBTS_PER_OH),
            Self::OptoHybrid => Some(1),
            Self::Vfat => Some(VFATS_PER_OH),
            Self::All => None,
        }
    }

    const fn chip_words(self) -> Option<u32> {
        match self {
            Self::Gbt => Some(GBT_SINGLE_RAM_WORDS),
            Self::OptoHybrid => Some(OH_SINGLE_RAM_WORDS),
            Self::Vfat => Some(VFAT_SINGLE_RAM_WORDS),
            Self::All => None,
        }
    }

    const fn capacity_reg(self) -> Option<&'static str> {
        match self {
            Self::Gbt => Some("GEM_AMC.CONFIG_BLASTER.STATUS.GBT_RAM_SIZE"),
            Self::OptoHybrid => Some("GEM_AMC.CONFIG_BLASTER.STATUS.OH_RAM_SIZE"),
            Self::Vfat => Some("GEM_AMC.CONFIG_BLASTER.STATUS.VFAT_RAM_SIZE"),
            Self::All => None,
        }
    }

    const fn full_ram_reg(self) -> Option<&'static str> {
        match self {
            Self::Gbt => Some("GEM_AMC.CONFIG_BLASTER.RAM.GBT"),
            Self::OptoHybrid => Some("GEM_AMC.CONFIG_BLASTER.RAM.OH"),
            Self::Vfat => Some("GEM_AMC.CONFIG_BLASTER.RAM.VFAT"),
            Self::All => None,
        }
    }

    fn link_ram_reg(self, link: u32) -> Option<String> {
        match self {
            Self::Gbt => Some(format!("GEM_AMC.CONFIG_BLASTER.RAM.GBT_OH{link}")),
            Self::OptoHybrid => Some(format!("GEM_AMC.CONFIG_BLASTER.RAM.OH_FPGA_OH{link}")),
            Self::Vfat => Some(format!("GEM_AMC.CONFIG_BLASTER.RAM.VFAT_OH{link}")),
            Self::All => None,
        }
    }

    const fn invalid(self) -> BusError {
        BusError::InvalidRegionType(self.as_u8())
    }
}

impl fmt::Display for RamRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Gbt => "GBT",
            Self::OptoHybrid => "OptoHybrid",
            Self::Vfat => "VFAT",
            Self::All => "ALL",
        })
    }
}

fn blob_words(words: u32) -> usize {
    usize::try_from(words).unwrap_or(usize::MAX)
}

/// Reads and writes bulk configuration blobs in the BLASTER RAM regions.
#[derive(Debug)]
pub struct RamBlobCodec<'bus, C> {
    bus: &'bus mut RegisterBus<C>,
}

impl<'bus, C: HardwareChannel> RamBlobCodec<'bus, C> {
    /// Codec over the given register bus.
    pub fn new(bus: &'bus mut RegisterBus<C>) -> Self {
        Self { bus }
    }

    /// Hardware-reported word capacity of `region`; the capacity of
    /// [`RamRegion::All`] is the sum of the three components.
    ///
    /// # Errors
    ///
    /// Propagates lookup and transport failures from the capacity reads.
    pub fn capacity_of(&mut self, region: RamRegion) -> Result<u32, BusError> {
        match region.capacity_reg() {
            Some(reg) => self.bus.read_register(reg),
            None => {
                let mut total = 0u32;
                for component in RamRegion::COMPONENTS {
                    total = total.saturating_add(self.capacity_of(component)?);
                }
                Ok(total)
            }
        }
    }

    /// Number of OptoHybrid links the running firmware serves; bounds
    /// every link index.
    ///
    /// # Errors
    ///
    /// Propagates lookup and transport failures.
    pub fn supported_links(&mut self) -> Result<u32, BusError> {
        self.bus.read_register(NUM_OF_OH_REG)
    }

    /// Base address of chip `chip` on link `link` within `region`.
    ///
    /// OptoHybrid has no sub-chip index, so only `chip == 0` is valid
    /// there.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::OutOfRange`] for a link index beyond the
    /// firmware-reported link count or a chip index beyond the region's
    /// per-link chip count, and [`BusError::InvalidRegionType`] for
    /// [`RamRegion::All`].
    pub fn base_address(
        &mut self,
        region: RamRegion,
        link: u32,
        chip: u32,
    ) -> Result<u32, BusError> {
        let links = self.supported_links()?;
        if link >= links {
            return Err(BusError::OutOfRange {
                what: format!("OptoHybrid link index for {region} RAM"),
                value: u64::from(link),
                limit: u64::from(links.saturating_sub(1)),
            });
        }
        let chips = region.chips_per_link().ok_or_else(|| region.invalid())?;
        if chip >= chips {
            return Err(BusError::OutOfRange {
                what: format!("chip index for {region} RAM"),
                value: u64::from(chip),
                limit: u64::from(chips - 1),
            });
        }
        let reg = region.link_ram_reg(link).ok_or_else(|| region.invalid())?;
        let base = self.bus.table().lookup(&reg)?.address;
        let chip_words = region.chip_words().ok_or_else(|| region.invalid())?;
        base.checked_add(chip_words * chip).ok_or_else(|| BusError::OutOfRange {
            what: format!("chip base address in {region} RAM"),
            value: u64::from(base) + u64::from(chip_words * chip),
            limit: u64::from(u32::MAX),
        })
    }

    /// Returns `true` when `len` matches the region capacity exactly.
    ///
    /// There is no notion of a partial-but-valid blob for full-region
    /// transfers: undersized and oversized blobs are both invalid.
    ///
    /// # Errors
    ///
    /// Propagates capacity-read failures.
    pub fn check_blob_size(&mut self, region: RamRegion, len: usize) -> Result<bool, BusError> {
        let capacity = self.capacity_of(region)?;
        Ok(len == blob_words(capacity))
    }

    /// Reads the full contents of `region`. `blob_len` must equal the
    /// region capacity. [`RamRegion::All`] concatenates three full-region
    /// reads in GBT, OptoHybrid, VFAT order.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::BlobSizeMismatch`] when `blob_len` is not the
    /// exact capacity, or any lookup/transport failure.
    pub fn read_conf_ram(&mut self, region: RamRegion, blob_len: usize) -> Result<Vec<u32>, BusError> {
        self.require_exact_size(region, blob_len)?;
        debug!(%region, blob_len, "configuration RAM read");

        match region.full_ram_reg() {
            Some(reg) => {
                let capacity = self.capacity_of(region)?;
                self.bus.read_block(reg, capacity, 0)
            }
            None => {
                let mut blob = Vec::with_capacity(blob_len);
                for component in RamRegion::COMPONENTS {
                    let capacity = self.capacity_of(component)?;
                    blob.extend(self.read_conf_ram(component, blob_words(capacity))?);
                }
                Ok(blob)
            }
        }
    }

    /// Writes `blob` as the full contents of `region`. The blob length
    /// must equal the region capacity exactly. [`RamRegion::All`] slices
    /// the blob into three full-region writes in GBT, OptoHybrid, VFAT
    /// order.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::BlobSizeMismatch`] when the length is not the
    /// exact capacity, or any lookup/transport failure.
    pub fn write_conf_ram(&mut self, region: RamRegion, blob: &[u32]) -> Result<(), BusError> {
        self.require_exact_size(region, blob.len())?;
        debug!(%region, blob_len = blob.len(), "configuration RAM write");

        match region {
            RamRegion::Gbt => self.write_selective(RamRegion::Gbt, blob, 0),
            RamRegion::OptoHybrid => self.write_selective(RamRegion::OptoHybrid, blob, 0),
            RamRegion::Vfat => self.write_selective(RamRegion::Vfat, blob, 0),
            RamRegion::All => {
                let mut cursor = 0usize;
                for component in RamRegion::COMPONENTS {
                    let capacity = self.capacity_of(component)?;
                    let end = cursor + blob_words(capacity);
                    let chunk = blob.get(cursor..end).ok_or(BusError::BlobSizeMismatch {
                        region: component,
                        expected: capacity,
                        actual: blob.len().saturating_sub(cursor),
                    })?;
                    self.write_conf_ram(component, chunk)?;
                    cursor = end;
                }
                Ok(())
            }
        }
    }

    /// Link-selective read of the GBT configuration RAM.
    ///
    /// # Errors
    ///
    /// See [`Self::read_conf_ram`] and the selective-transfer rules in
    /// the module docs.
    pub fn read_gbt_conf_ram(&mut self, link_mask: u16) -> Result<Vec<u32>, BusError> {
        self.read_selective(RamRegion::Gbt, link_mask)
    }

    /// Link-selective read of the OptoHybrid configuration RAM.
    ///
    /// # Errors
    ///
    /// See [`Self::read_gbt_conf_ram`].
    pub fn read_optohybrid_conf_ram(&mut self, link_mask: u16) -> Result<Vec<u32>, BusError> {
        self.read_selective(RamRegion::OptoHybrid, link_mask)
    }

    /// Link-selective read of the VFAT configuration RAM.
    ///
    /// # Errors
    ///
    /// See [`Self::read_gbt_conf_ram`].
    pub fn read_vfat_conf_ram(&mut self, link_mask: u16) -> Result<Vec<u32>, BusError> {
        self.read_selective(RamRegion::Vfat, link_mask)
    }

    /// Link-selective write of the GBT configuration RAM. The blob may be
    /// at most the region capacity (equal-or-under accepted, unlike the
    /// full-region exact-equality rule).
    ///
    /// # Errors
    ///
    /// Returns [`BusError::BlobSizeMismatch`] when the blob exceeds the
    /// capacity or is too short for the selected links.
    pub fn write_gbt_conf_ram(&mut self, blob: &[u32], link_mask: u16) -> Result<(), BusError> {
        self.write_selective(RamRegion::Gbt, blob, link_mask)
    }

    /// Link-selective write of the OptoHybrid configuration RAM.
    ///
    /// # Errors
    ///
    /// See [`Self::write_gbt_conf_ram`].
    pub fn write_optohybrid_conf_ram(&mut self, blob: &[u32], link_mask: u16) -> Result<(), BusError> {
        self.write_selective(RamRegion::OptoHybrid, blob, link_mask)
    }

    /// Link-selective write of the VFAT configuration RAM.
    ///
    /// # Errors
    ///
    /// See [`Self::write_gbt_conf_ram`].
    pub fn write_vfat_conf_ram(&mut self, blob: &[u32], link_mask: u16) -> Result<(), BusError> {
        self.write_selective(RamRegion::Vfat, blob, link_mask)
    }

    fn require_exact_size(&mut self, region: RamRegion, len: usize) -> Result<(), BusError> {
        if self.check_blob_size(region, len)? {
            Ok(())
        } else {
            Err(BusError::BlobSizeMismatch {
                region,
                expected: self.capacity_of(region)?,
                actual: len,
            })
        }
    }

    /// A zero mask and the full 12-link mask both mean the whole region.
    fn read_selective(&mut self, region: RamRegion, link_mask: u16) -> Result<Vec<u32>, BusError> {
        let reg = region.full_ram_reg().ok_or_else(|| region.invalid())?;
        if link_mask == 0 || link_mask == FULL_LINK_MASK {
            let capacity = self.capacity_of(region)?;
            return self.bus.read_block(reg, capacity, 0);
        }

        let per_link = region.per_link_words().ok_or_else(|| region.invalid())?;
        let selected = u32::from(link_mask & FULL_LINK_MASK).count_ones();
        let mut blob = Vec::with_capacity(blob_words(per_link.saturating_mul(selected)));
        for link in 0..OH_PER_AMC {
            if link_mask & (1_u16 << link) == 0 {
                continue;
            }
            let link_reg = region.link_ram_reg(link).ok_or_else(|| region.invalid())?;
            blob.extend(self.bus.read_block(&link_reg, per_link, 0)?);
        }
        Ok(blob)
    }

    fn write_selective(
        &mut self,
        region: RamRegion,
        blob: &[u32],
        link_mask: u16,
    ) -> Result<(), BusError> {
        let capacity = self.capacity_of(region)?;
        if blob.len() > blob_words(capacity) {
            return Err(BusError::BlobSizeMismatch {
                region,
                expected: capacity,
                actual: blob.len(),
            });
        }

        let reg = region.full_ram_reg().ok_or_else(|| region.invalid())?;
        if link_mask == 0 || link_mask == FULL_LINK_MASK {
            return self.bus.write_block(reg, blob, 0);
        }

        let per_link = blob_words(region.per_link_words().ok_or_else(|| region.invalid())?);
        let mut cursor = 0usize;
        for link in 0..OH_PER_AMC {
            if link_mask & (1_u16 << link) == 0 {
                continue;
            }
            let end = cursor + per_link;
            let chunk = blob.get(cursor..end).ok_or(BusError::BlobSizeMismatch {
                region,
                expected: capacity,
                actual: blob.len(),
            })?;
            let link_reg = region.link_ram_reg(link).ok_or_else(|| region.invalid())?;
            self.bus.write_block(&link_reg, chunk, 0)?;
            cursor = end;
        }
        Ok(())
    }
}
