//! Boundary contracts for the external collaborators.
//!
//! Peripheral drivers are black boxes to the core: an initialise call,
//! typed reads returning a status, a deinitialise call. Every non-ok
//! status surfaces as [`DriverError`] at the worker boundary; the worker
//! records the failure, allocates no data and completes its action with
//! the energy cost regardless.

use arrayvec::ArrayString;
use thiserror::Error;

use crate::codec::Reporter;
use crate::config::IMEI_LENGTH;
use crate::record::{Acceleration, BleDevice, Humidity, Light, Magnetic, Position, Pressure, Temperature};

/// Driver status taxonomy, shared by every collaborator.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Error)]
pub enum DriverError {
    #[error("driver error")]
    General,
    #[error("driver not initialised")]
    NotInitialised,
    #[error("i2c write failed")]
    I2cWrite,
    #[error("i2c write-read failed")]
    I2cWriteRead,
    #[error("calculation failed")]
    Calculation,
    #[error("device not present")]
    DeviceNotPresent,
    #[error("out of memory")]
    OutOfMemory,
    #[error("no data available")]
    NoData,
    #[error("no valid data available")]
    NoValidData,
    #[error("bad parameter")]
    Parameter,
    #[error("send failed")]
    SendFailed,
    #[error("timed out waiting for ack")]
    AckTimeout,
}

/// Supply tier derived from the VBAT thresholds. The processor only
/// operates at [`Bearable`][EnergyTier::Bearable] and above.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EnergyTier {
    Bad,
    NotBad,
    Bearable,
    Good,
}

/// Cause of the last exit from deep sleep.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum WakeReason {
    PowerOn,
    Pin,
    Watchdog,
    Soft,
    Rtc,
    Orientation,
    Magnetic,
}

impl WakeReason {
    pub(crate) fn as_u8(self) -> u8 {
        match self {
            Self::PowerOn => 0,
            Self::Pin => 1,
            Self::Watchdog => 2,
            Self::Soft => 3,
            Self::Rtc => 4,
            Self::Orientation => 5,
            Self::Magnetic => 6,
        }
    }
}

/// Common surface of every peripheral driver.
pub trait Driver {
    fn init(&mut self) -> Result<(), DriverError>;

    fn deinit(&mut self);

    /// Estimated energy drawn by one operation, in nanowatt-hours.
    fn energy_cost_nwh(&self) -> u64 {
        0
    }
}

/// Combined humidity / pressure / temperature device.
pub trait EnvironmentSensor: Driver {
    fn read_humidity(&mut self) -> Result<Humidity, DriverError>;

    fn read_pressure(&mut self) -> Result<Pressure, DriverError>;

    fn read_temperature(&mut self) -> Result<Temperature, DriverError>;
}

pub trait LightSensor: Driver {
    fn read_light(&mut self) -> Result<Light, DriverError>;
}

/// Accelerometer, also the source of the orientation wake interrupt.
pub trait MotionSensor: Driver {
    fn read_acceleration(&mut self) -> Result<Acceleration, DriverError>;

    fn set_interrupt_enabled(&mut self, enabled: bool) -> Result<(), DriverError>;
}

/// GNSS position fix plus the satellite count behind it.
#[derive(Clone, Copy, Debug)]
pub struct Fix {
    pub position: Position,
    pub svs_visible: u32,
}

pub trait PositionSensor: Driver {
    fn read_fix(&mut self) -> Result<Fix, DriverError>;
}

/// Hall-effect sensor, also the source of the magnetic wake interrupt.
pub trait MagneticSensor: Driver {
    fn read_field_strength(&mut self) -> Result<Magnetic, DriverError>;

    fn set_interrupt_enabled(&mut self, enabled: bool) -> Result<(), DriverError>;
}

pub trait BleScanner: Driver {
    fn read_device(&mut self) -> Result<BleDevice, DriverError>;
}

/// Byte totals for one reporting session.
#[derive(Clone, Copy, Debug, Default)]
pub struct TransferStats {
    pub bytes_transmitted: u32,
    pub bytes_received: u32,
    pub reports_sent: u32,
}

/// The cellular modem. The collaborator owns the datagram transport and
/// the transmit / await-ack / retry loop; the core hands it a
/// [`Reporter`] for encoding, ack decoding and queue release.
pub trait Cellular: Driver {
    /// Register with the network. `keep_going` is polled between
    /// registration steps; returning false abandons the attempt.
    fn connect(&mut self, keep_going: &mut dyn FnMut() -> bool) -> Result<(), DriverError>;

    /// Drain the data queue towards `server_address:server_port`:
    /// repeatedly encode one report, transmit it, await the ack up to
    /// `ACK_TIMEOUT_MS` (retrying the same datagram on timeout),
    /// release acked records, until the encoder runs dry or
    /// `keep_going` returns false.
    fn send_reports(
        &mut self,
        server_address: &str,
        server_port: u16,
        reporter: &mut Reporter<'_>,
        keep_going: &mut dyn FnMut() -> bool,
    ) -> Result<TransferStats, DriverError>;

    /// NTP time over UDP, seconds UTC.
    fn get_time(&mut self) -> Result<i64, DriverError>;

    /// 15-digit identifier, the default report name.
    fn imei(&mut self) -> Result<ArrayString<IMEI_LENGTH>, DriverError>;

    /// Snapshot of the serving cell, taken while registered. Queued as
    /// a `cel` record with each report session.
    fn network_info(&mut self) -> Result<crate::record::Cellular, DriverError>;
}

/// Supply-voltage supervisor.
pub trait PowerSupervisor: Send + Sync {
    fn tier(&self) -> EnergyTier;

    /// Which harvesting source currently feeds the supercap; queued as
    /// an `nrg` record at wake.
    fn energy_source(&self) -> u8 {
        0
    }
}

pub trait Watchdog: Send {
    /// Arm the watchdog. Returns false if the hardware refuses the
    /// timeout.
    fn start(&mut self, timeout_seconds: u32) -> bool;

    fn feed(&mut self);
}
