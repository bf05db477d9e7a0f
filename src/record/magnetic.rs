use core::fmt;
use std::fmt::Write;

use crate::codec::writer::FrameWriter;

/// Field strength from the hall-effect sensor.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[repr(C)]
pub struct Magnetic {
    /// Microtesla times 1000.
    pub tesla_x1000: u32,
}

impl Magnetic {
    pub(crate) fn write_json(&self, w: &mut FrameWriter<'_>) -> fmt::Result {
        write!(w, ",\"d\":{{\"tslx1000\":{}}}", self.tesla_x1000)
    }

    pub(crate) fn delta(&self, other: &Self) -> i64 {
        i64::from(self.tesla_x1000) - i64::from(other.tesla_x1000)
    }
}
