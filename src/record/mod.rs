//! Typed record payloads and their wire identities.
//!
//! Every queued data record carries exactly one payload variant. A
//! variant is a plain-old-data struct (integer fields only) so that it
//! can live inside the storage arena; the [`Payload`] enum is the typed
//! view used at the API surface. Each variant knows its wire tag, its
//! JSON body and its semantic distance to another value of the same
//! variant (used by the action ranker's variability pass).

use core::fmt;

use bitflags::bitflags;

pub use ble::BleDevice;
pub use cellular::Cellular;
pub use environment::{Humidity, Pressure, Temperature};
pub use light::Light;
pub use magnetic::Magnetic;
pub use motion::Acceleration;
pub use position::Position;
pub use system::{EnergySource, LogChunk, LogEntry, StatsReport, WakeUp};

use crate::codec::writer::FrameWriter;

mod ble;
mod cellular;
mod environment;
mod light;
mod magnetic;
mod motion;
mod position;
mod system;

/// Discriminant stored in the record header. Zero is reserved so that
/// a blank arena never aliases a live record.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum DataKind {
    Cellular = 1,
    Humidity,
    Pressure,
    Temperature,
    Light,
    Acceleration,
    Position,
    Magnetic,
    Ble,
    WakeUp,
    EnergySource,
    Statistics,
    Log,
}

impl DataKind {
    pub(crate) fn from_u8(tag: u8) -> Option<Self> {
        Some(match tag {
            1 => Self::Cellular,
            2 => Self::Humidity,
            3 => Self::Pressure,
            4 => Self::Temperature,
            5 => Self::Light,
            6 => Self::Acceleration,
            7 => Self::Position,
            8 => Self::Magnetic,
            9 => Self::Ble,
            10 => Self::WakeUp,
            11 => Self::EnergySource,
            12 => Self::Statistics,
            13 => Self::Log,
            _ => return None,
        })
    }

    /// Wire tag of this kind in the report format.
    pub fn tag(self) -> &'static str {
        match self {
            Self::Cellular => "cel",
            Self::Humidity => "hum",
            Self::Pressure => "pre",
            Self::Temperature => "tmp",
            Self::Light => "lgt",
            Self::Acceleration => "acc",
            Self::Position => "pos",
            Self::Magnetic => "mag",
            Self::Ble => "ble",
            Self::WakeUp => "wkp",
            Self::EnergySource => "nrg",
            Self::Statistics => "stt",
            Self::Log => "log",
        }
    }

    /// Size of the payload struct for this kind, before word rounding.
    pub(crate) fn payload_size(self) -> usize {
        match self {
            Self::Cellular => size_of::<Cellular>(),
            Self::Humidity => size_of::<Humidity>(),
            Self::Pressure => size_of::<Pressure>(),
            Self::Temperature => size_of::<Temperature>(),
            Self::Light => size_of::<Light>(),
            Self::Acceleration => size_of::<Acceleration>(),
            Self::Position => size_of::<Position>(),
            Self::Magnetic => size_of::<Magnetic>(),
            Self::Ble => size_of::<BleDevice>(),
            Self::WakeUp => size_of::<WakeUp>(),
            Self::EnergySource => size_of::<EnergySource>(),
            Self::Statistics => size_of::<StatsReport>(),
            Self::Log => size_of::<LogChunk>(),
        }
    }
}

bitflags! {
    /// Per-record flag bits. Everything above bit 0 takes part in the
    /// queue sort order; `CAN_BE_FREED` is storage bookkeeping only and
    /// is masked out by shifting.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct DataFlags: u8 {
        const CAN_BE_FREED = 0x01;
        const REQUIRES_ACK = 0x02;
        const SEND_NOW = 0x04;
    }
}

/// One record's contents.
#[derive(Clone, Copy, Debug)]
pub enum Payload {
    Cellular(Cellular),
    Humidity(Humidity),
    Pressure(Pressure),
    Temperature(Temperature),
    Light(Light),
    Acceleration(Acceleration),
    Position(Position),
    Magnetic(Magnetic),
    Ble(BleDevice),
    WakeUp(WakeUp),
    EnergySource(EnergySource),
    Statistics(StatsReport),
    Log(LogChunk),
}

impl Payload {
    pub fn kind(&self) -> DataKind {
        match self {
            Self::Cellular(_) => DataKind::Cellular,
            Self::Humidity(_) => DataKind::Humidity,
            Self::Pressure(_) => DataKind::Pressure,
            Self::Temperature(_) => DataKind::Temperature,
            Self::Light(_) => DataKind::Light,
            Self::Acceleration(_) => DataKind::Acceleration,
            Self::Position(_) => DataKind::Position,
            Self::Magnetic(_) => DataKind::Magnetic,
            Self::Ble(_) => DataKind::Ble,
            Self::WakeUp(_) => DataKind::WakeUp,
            Self::EnergySource(_) => DataKind::EnergySource,
            Self::Statistics(_) => DataKind::Statistics,
            Self::Log(_) => DataKind::Log,
        }
    }

    /// Emit the `,"d":{...}` body of this payload.
    pub(crate) fn write_json(&self, w: &mut FrameWriter<'_>) -> fmt::Result {
        match self {
            Self::Cellular(v) => v.write_json(w),
            Self::Humidity(v) => v.write_json(w),
            Self::Pressure(v) => v.write_json(w),
            Self::Temperature(v) => v.write_json(w),
            Self::Light(v) => v.write_json(w),
            Self::Acceleration(v) => v.write_json(w),
            Self::Position(v) => v.write_json(w),
            Self::Magnetic(v) => v.write_json(w),
            Self::Ble(v) => v.write_json(w),
            Self::WakeUp(v) => v.write_json(w),
            Self::EnergySource(v) => v.write_json(w),
            Self::Statistics(v) => v.write_json(w),
            Self::Log(v) => v.write_json(w),
        }
    }

    /// Semantic distance between two payloads of the same kind.
    ///
    /// Scalar variants diff their primary field, composite variants the
    /// component with the largest magnitude change; housekeeping
    /// variants report a constant 1. Mismatched kinds are a caller bug.
    pub fn difference(&self, other: &Self) -> i64 {
        debug_assert_eq!(self.kind(), other.kind());
        match (self, other) {
            (Self::Cellular(a), Self::Cellular(b)) => a.delta(b),
            (Self::Humidity(a), Self::Humidity(b)) => a.delta(b),
            (Self::Pressure(a), Self::Pressure(b)) => a.delta(b),
            (Self::Temperature(a), Self::Temperature(b)) => a.delta(b),
            (Self::Light(a), Self::Light(b)) => a.delta(b),
            (Self::Acceleration(a), Self::Acceleration(b)) => a.delta(b),
            (Self::Position(a), Self::Position(b)) => a.delta(b),
            (Self::Magnetic(a), Self::Magnetic(b)) => a.delta(b),
            (Self::Ble(a), Self::Ble(b)) => a.delta(b),
            (Self::WakeUp(_), Self::WakeUp(_))
            | (Self::EnergySource(_), Self::EnergySource(_))
            | (Self::Statistics(_), Self::Statistics(_))
            | (Self::Log(_), Self::Log(_)) => 1,
            _ => 0,
        }
    }
}

// Signed value with the largest magnitude, used by the composite
// variants' difference rule.
pub(crate) fn largest_component<const N: usize>(deltas: [i64; N]) -> i64 {
    let mut out = 0i64;
    for d in deltas {
        if d.abs() > out.abs() {
            out = d;
        }
    }
    out
}
