//! Slow-control link health sampling and error accounting.
//!
//! Link quality is quantified by issuing many reads and counting
//! transport-level failures downstream, not by reading a single counter
//! snapshot. Individual read failures inside the sampling loop are the
//! measurement, so they are absorbed into the counters rather than
//! propagated.

use std::ops::Add;
use std::time::Duration;

use tracing::debug;

use crate::bus::RegisterBus;
use crate::channel::HardwareChannel;
use crate::error::BusError;

/// Register that resets the slow-control link and its error counters.
pub const LINK_RESET_REG: &str = "GEM_AMC.GEM_SYSTEM.CTRL.LINK_RESET";

/// Name prefix of the downstream slow-control error counters.
pub const SLOW_CONTROL_PREFIX: &str = "GEM_AMC.SLOW_CONTROL.VFAT3.";

/// Settling time after a link reset before sampling may begin. The reset
/// propagates asynchronously in hardware; this is required settling time,
/// not a retry interval.
pub const LINK_RESET_SETTLE: Duration = Duration::from_micros(90);

/// Pacing delay between successive sampling reads, so the sampling loop
/// does not saturate the transport.
pub const INTER_READ_DELAY: Duration = Duration::from_micros(20);

/// Injectable sleep used for hardware settling and pacing delays, so
/// tests can substitute a recording fake and stay fast.
pub trait Sleeper {
    /// Blocks the calling thread for `duration`.
    fn sleep(&mut self, duration: Duration);
}

/// Production sleeper backed by [`std::thread::sleep`].
#[derive(Debug, Default, Clone, Copy)]
pub struct StdSleeper;

impl Sleeper for StdSleeper {
    fn sleep(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Classified slow-control failure counts accumulated by a health check.
///
/// Addition saturates each field at `u32::MAX`: a saturated counter is a
/// sentinel meaning "uncountably many", not a numeric value to trust.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct SlowCtrlErrorCounters {
    /// CRC errors on slow-control replies.
    pub crc: u32,
    /// Malformed reply packets.
    pub packet: u32,
    /// Bit-stuffing violations.
    pub bitstuffing: u32,
    /// Reply timeouts.
    pub timeout: u32,
    /// AXI strobe errors on the board-side bus.
    pub axi_strobe: u32,
    /// Saturating sum of the five error counters.
    pub sum: u32,
    /// Total slow-control transactions attempted.
    pub transactions: u32,
}

impl SlowCtrlErrorCounters {
    /// Recomputes `sum` as the saturating total of the five error
    /// counters.
    pub fn sum_errors(&mut self) {
        self.sum = self
            .crc
            .saturating_add(self.packet)
            .saturating_add(self.bitstuffing)
            .saturating_add(self.timeout)
            .saturating_add(self.axi_strobe);
    }
}

impl Add for SlowCtrlErrorCounters {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            crc: self.crc.saturating_add(rhs.crc),
            packet: self.packet.saturating_add(rhs.packet),
            bitstuffing: self.bitstuffing.saturating_add(rhs.bitstuffing),
            timeout: self.timeout.saturating_add(rhs.timeout),
            axi_strobe: self.axi_strobe.saturating_add(rhs.axi_strobe),
            sum: self.sum.saturating_add(rhs.sum),
            transactions: self.transactions.saturating_add(rhs.transactions),
        }
    }
}

/// Samples a register repeatedly after a link reset and collects the
/// downstream slow-control error counters.
#[derive(Debug)]
pub struct LinkHealthMonitor<'bus, C, S = StdSleeper> {
    bus: &'bus mut RegisterBus<C>,
    sleeper: S,
}

impl<'bus, C: HardwareChannel> LinkHealthMonitor<'bus, C> {
    /// Monitors over `bus` with real settling delays.
    pub fn new(bus: &'bus mut RegisterBus<C>) -> Self {
        Self {
            bus,
            sleeper: StdSleeper,
        }
    }
}

impl<'bus, C: HardwareChannel, S: Sleeper> LinkHealthMonitor<'bus, C, S> {
    /// Monitors over `bus` with an injected sleeper.
    pub fn with_sleeper(bus: &'bus mut RegisterBus<C>, sleeper: S) -> Self {
        Self { bus, sleeper }
    }

    /// Issues a link reset, reads `name` up to `n_reads` times, then
    /// collects the five downstream error counters and the transaction
    /// counter.
    ///
    /// Read failures inside the sampling loop never abort the check:
    /// with `break_on_failure` the loop stops early at the first failed
    /// attempt, otherwise failed attempts are simply skipped.
    ///
    /// # Errors
    ///
    /// Only the link-reset write and the six trailing counter reads
    /// propagate failures.
    pub fn repeated_reg_read(
        &mut self,
        name: &str,
        break_on_failure: bool,
        n_reads: u32,
    ) -> Result<SlowCtrlErrorCounters, BusError> {
        self.bus.write_register(LINK_RESET_REG, 0x1)?;
        self.sleeper.sleep(LINK_RESET_SETTLE);

        for attempt in 0..n_reads {
            match self.bus.read_register(name) {
                Ok(_) => self.sleeper.sleep(INTER_READ_DELAY),
                Err(err) => {
                    debug!(name, attempt, %err, "sampling read failed");
                    if break_on_failure {
                        break;
                    }
                }
            }
        }

        let mut counters = SlowCtrlErrorCounters {
            crc: self.read_counter("CRC_ERROR_CNT")?,
            packet: self.read_counter("PACKET_ERROR_CNT")?,
            bitstuffing: self.read_counter("BITSTUFFING_ERROR_CNT")?,
            timeout: self.read_counter("TIMEOUT_ERROR_CNT")?,
            axi_strobe: self.read_counter("AXI_STROBE_ERROR_CNT")?,
            sum: 0,
            transactions: self.read_counter("TRANSACTION_CNT")?,
        };
        counters.sum_errors();
        Ok(counters)
    }

    fn read_counter(&mut self, suffix: &str) -> Result<u32, BusError> {
        self.bus.read_register(&format!("{SLOW_CONTROL_PREFIX}{suffix}"))
    }
}
