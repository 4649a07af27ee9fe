//! Shared fixture: a scripted in-memory hardware channel and a populated
//! address table covering scalars, bit fields, blocks, the slow-control
//! counters and the BLASTER RAM geometry.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};

use tempfile::TempDir;

use regbus_core::{
    AccessMode, AddressTable, ChannelError, HardwareChannel, Permissions, RegisterBus,
    RegisterDescriptor, GBTS_PER_OH, GBT_SINGLE_RAM_WORDS, OH_PER_AMC, OH_SINGLE_RAM_WORDS,
    VFATS_PER_OH, VFAT_SINGLE_RAM_WORDS, WHOLE_WORD_MASK,
};

pub const SCALAR: &str = "GEM_AMC.TEST.SCALAR";
pub const FIELD: &str = "GEM_AMC.TEST.FIELD";
pub const READ_ONLY: &str = "GEM_AMC.TEST.RO";
pub const WRITE_ONLY: &str = "GEM_AMC.TEST.WO";
pub const BLOCK: &str = "GEM_AMC.TEST.BLOCK";
pub const FIFO: &str = "GEM_AMC.TEST.FIFO";
pub const PROBE: &str = "GEM_AMC.TEST.PROBE";
pub const HIGH_BLOCK: &str = "GEM_AMC.TEST.HIGH";

pub const SCALAR_ADDR: u32 = 0x100;
pub const FIELD_ADDR: u32 = 0x101;
pub const BLOCK_ADDR: u32 = 0x200;
pub const BLOCK_SIZE: u32 = 10;
pub const FIFO_ADDR: u32 = 0x210;
pub const LINK_RESET_ADDR: u32 = 0x300;
pub const PROBE_ADDR: u32 = 0x301;
pub const COUNTER_BASE: u32 = 0x310;
pub const HIGH_BLOCK_ADDR: u32 = 0xFFFF_FFF0;
pub const NUM_OF_OH_ADDR: u32 = 0x400;
pub const CAPACITY_BASE: u32 = 0x401;

pub const GBT_RAM_ADDR: u32 = 0x1000;
pub const OH_RAM_ADDR: u32 = 0x2000;
pub const VFAT_RAM_ADDR: u32 = 0x3000;

pub const GBT_LINK_WORDS: u32 = GBT_SINGLE_RAM_WORDS * GBTS_PER_OH;
pub const VFAT_LINK_WORDS: u32 = VFAT_SINGLE_RAM_WORDS * VFATS_PER_OH;
pub const GBT_RAM_WORDS: u32 = GBT_LINK_WORDS * OH_PER_AMC;
pub const OH_RAM_WORDS: u32 = OH_SINGLE_RAM_WORDS * OH_PER_AMC;
pub const VFAT_RAM_WORDS: u32 = VFAT_LINK_WORDS * OH_PER_AMC;

/// Scripted word-addressed memory standing in for the board.
#[derive(Debug, Default)]
pub struct FakeChannel {
    pub mem: HashMap<u32, u32>,
    pub read_log: Vec<(u32, u32)>,
    pub write_log: Vec<(u32, Vec<u32>)>,
    reads_seen: HashMap<u32, u32>,
    fail_reads_from: HashMap<u32, u32>,
    fail_reads_until: HashMap<u32, u32>,
    fail_writes: HashSet<u32>,
}

impl FakeChannel {
    pub fn seed(&mut self, address: u32, value: u32) {
        self.mem.insert(address, value);
    }

    pub fn seed_block(&mut self, base: u32, words: &[u32]) {
        for (i, word) in words.iter().enumerate() {
            self.mem.insert(base + i as u32, *word);
        }
    }

    /// Every read of `address` from the `ordinal`-th onwards (1-based)
    /// fails.
    pub fn fail_reads_from(&mut self, address: u32, ordinal: u32) {
        self.fail_reads_from.insert(address, ordinal);
    }

    /// The first `n` reads of `address` fail, later ones succeed.
    pub fn fail_reads_until(&mut self, address: u32, n: u32) {
        self.fail_reads_until.insert(address, n);
    }

    pub fn fail_writes_at(&mut self, address: u32) {
        self.fail_writes.insert(address);
    }

    pub fn reads_of(&self, address: u32) -> usize {
        self.read_log.iter().filter(|(a, _)| *a == address).count()
    }

    pub fn writes_of(&self, address: u32) -> Vec<&[u32]> {
        self.write_log
            .iter()
            .filter(|(a, _)| *a == address)
            .map(|(_, words)| words.as_slice())
            .collect()
    }
}

impl HardwareChannel for FakeChannel {
    fn read(&mut self, address: u32, count: u32) -> Result<Vec<u32>, ChannelError> {
        self.read_log.push((address, count));
        let seen = self.reads_seen.entry(address).or_insert(0);
        *seen += 1;
        let failing = self.fail_reads_from.get(&address).is_some_and(|n| *seen >= *n)
            || self.fail_reads_until.get(&address).is_some_and(|n| *seen <= *n);
        if failing {
            return Err(ChannelError::ReadFailed {
                address,
                count,
                reason: "scripted failure".to_owned(),
            });
        }
        Ok((0..count)
            .map(|i| self.mem.get(&(address + i)).copied().unwrap_or(0))
            .collect())
    }

    fn write(&mut self, address: u32, words: &[u32]) -> Result<(), ChannelError> {
        self.write_log.push((address, words.to_vec()));
        if self.fail_writes.contains(&address) {
            return Err(ChannelError::WriteFailed {
                address,
                count: words.len() as u32,
                reason: "scripted failure".to_owned(),
            });
        }
        for (i, word) in words.iter().enumerate() {
            self.mem.insert(address + i as u32, *word);
        }
        Ok(())
    }
}

fn entry(
    name: &str,
    address: u32,
    mask: u32,
    size: u32,
    mode: AccessMode,
    permissions: Permissions,
) -> (String, RegisterDescriptor) {
    (
        name.to_owned(),
        RegisterDescriptor {
            address,
            mask,
            size,
            mode,
            permissions,
        },
    )
}

fn scalar(name: &str, address: u32, permissions: Permissions) -> (String, RegisterDescriptor) {
    entry(name, address, WHOLE_WORD_MASK, 1, AccessMode::Single, permissions)
}

fn block(name: &str, address: u32, size: u32) -> (String, RegisterDescriptor) {
    entry(name, address, WHOLE_WORD_MASK, size, AccessMode::Block, Permissions::RW)
}

/// Schema mirroring the register layout the suites exercise.
pub fn fixture_schema() -> Vec<(String, RegisterDescriptor)> {
    let mut schema = vec![
        scalar(SCALAR, SCALAR_ADDR, Permissions::RW),
        entry(FIELD, FIELD_ADDR, 0x0000_FF00, 1, AccessMode::Single, Permissions::RW),
        scalar(READ_ONLY, 0x102, Permissions::R),
        scalar(WRITE_ONLY, 0x103, Permissions::W),
        block(BLOCK, BLOCK_ADDR, BLOCK_SIZE),
        entry(FIFO, FIFO_ADDR, WHOLE_WORD_MASK, 16, AccessMode::Fifo, Permissions::RW),
        block(HIGH_BLOCK, HIGH_BLOCK_ADDR, 0x20),
        scalar("GEM_AMC.GEM_SYSTEM.CTRL.LINK_RESET", LINK_RESET_ADDR, Permissions::W),
        scalar(PROBE, PROBE_ADDR, Permissions::R),
        scalar("GEM_AMC.GEM_SYSTEM.CONFIG.NUM_OF_OH", NUM_OF_OH_ADDR, Permissions::R),
        scalar("GEM_AMC.CONFIG_BLASTER.STATUS.GBT_RAM_SIZE", CAPACITY_BASE, Permissions::R),
        scalar("GEM_AMC.CONFIG_BLASTER.STATUS.OH_RAM_SIZE", CAPACITY_BASE + 1, Permissions::R),
        scalar("GEM_AMC.CONFIG_BLASTER.STATUS.VFAT_RAM_SIZE", CAPACITY_BASE + 2, Permissions::R),
        block("GEM_AMC.CONFIG_BLASTER.RAM.GBT", GBT_RAM_ADDR, GBT_RAM_WORDS),
        block("GEM_AMC.CONFIG_BLASTER.RAM.OH", OH_RAM_ADDR, OH_RAM_WORDS),
        block("GEM_AMC.CONFIG_BLASTER.RAM.VFAT", VFAT_RAM_ADDR, VFAT_RAM_WORDS),
    ];
    for (i, suffix) in [
        "CRC_ERROR_CNT",
        "PACKET_ERROR_CNT",
        "BITSTUFFING_ERROR_CNT",
        "TIMEOUT_ERROR_CNT",
        "AXI_STROBE_ERROR_CNT",
        "TRANSACTION_CNT",
    ]
    .iter()
    .enumerate()
    {
        schema.push(scalar(
            &format!("GEM_AMC.SLOW_CONTROL.VFAT3.{suffix}"),
            COUNTER_BASE + i as u32,
            Permissions::R,
        ));
    }
    for link in 0..OH_PER_AMC {
        schema.push(block(
            &format!("GEM_AMC.CONFIG_BLASTER.RAM.GBT_OH{link}"),
            GBT_RAM_ADDR + GBT_LINK_WORDS * link,
            GBT_LINK_WORDS,
        ));
        schema.push(block(
            &format!("GEM_AMC.CONFIG_BLASTER.RAM.OH_FPGA_OH{link}"),
            OH_RAM_ADDR + OH_SINGLE_RAM_WORDS * link,
            OH_SINGLE_RAM_WORDS,
        ));
        schema.push(block(
            &format!("GEM_AMC.CONFIG_BLASTER.RAM.VFAT_OH{link}"),
            VFAT_RAM_ADDR + VFAT_LINK_WORDS * link,
            VFAT_LINK_WORDS,
        ));
    }
    schema
}

/// Seeds the firmware-reported geometry registers.
pub fn seed_geometry(channel: &mut FakeChannel) {
    channel.seed(NUM_OF_OH_ADDR, OH_PER_AMC);
    channel.seed(CAPACITY_BASE, GBT_RAM_WORDS);
    channel.seed(CAPACITY_BASE + 1, OH_RAM_WORDS);
    channel.seed(CAPACITY_BASE + 2, VFAT_RAM_WORDS);
}

/// A bus over the fixture schema and a fresh fake channel. The returned
/// [`TempDir`] keeps the table's backing store alive.
pub fn fixture_bus() -> (TempDir, RegisterBus<FakeChannel>) {
    let dir = TempDir::new().expect("tempdir");
    let mut table = AddressTable::open(dir.path().join("table.db")).expect("open table");
    table.reload(fixture_schema()).expect("reload");
    let mut channel = FakeChannel::default();
    seed_geometry(&mut channel);
    (dir, RegisterBus::new(table, channel))
}
