use core::fmt;
use std::fmt::Write;

use crate::codec::writer::FrameWriter;

/// Relative humidity.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[repr(C)]
pub struct Humidity {
    /// Per cent, 0..=100.
    pub percentage: u8,
}

impl Humidity {
    pub(crate) fn write_json(&self, w: &mut FrameWriter<'_>) -> fmt::Result {
        write!(w, ",\"d\":{{\"%\":{}}}", self.percentage)
    }

    pub(crate) fn delta(&self, other: &Self) -> i64 {
        i64::from(self.percentage) - i64::from(other.percentage)
    }
}

/// Atmospheric pressure.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[repr(C)]
pub struct Pressure {
    /// Pascals times 100.
    pub pascal_x100: u32,
}

impl Pressure {
    pub(crate) fn write_json(&self, w: &mut FrameWriter<'_>) -> fmt::Result {
        write!(w, ",\"d\":{{\"pasx100\":{}}}", self.pascal_x100)
    }

    pub(crate) fn delta(&self, other: &Self) -> i64 {
        i64::from(self.pascal_x100) - i64::from(other.pascal_x100)
    }
}

/// Ambient temperature.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[repr(C)]
pub struct Temperature {
    /// Degrees Celsius times 100.
    pub c_x100: i32,
}

impl Temperature {
    pub(crate) fn write_json(&self, w: &mut FrameWriter<'_>) -> fmt::Result {
        write!(w, ",\"d\":{{\"cx100\":{}}}", self.c_x100)
    }

    pub(crate) fn delta(&self, other: &Self) -> i64 {
        i64::from(self.c_x100) - i64::from(other.c_x100)
    }
}
