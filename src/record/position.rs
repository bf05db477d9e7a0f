use core::fmt;
use std::fmt::Write;

use super::largest_component;
use crate::codec::writer::FrameWriter;

/// GNSS fix.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[repr(C)]
pub struct Position {
    /// Latitude, degrees times 10^7.
    pub latitude_x10e7: i32,
    /// Longitude, degrees times 10^7.
    pub longitude_x10e7: i32,
    /// Fix uncertainty radius, metres.
    pub radius_metres: i32,
    /// Altitude, metres.
    pub altitude_metres: i32,
    /// Ground speed, metres per second.
    pub speed_mps: u32,
}

impl Position {
    pub(crate) fn write_json(&self, w: &mut FrameWriter<'_>) -> fmt::Result {
        write!(
            w,
            ",\"d\":{{\"latx10e7\":{},\"lngx10e7\":{},\"radm\":{},\"altm\":{},\"spdmps\":{}}}",
            self.latitude_x10e7,
            self.longitude_x10e7,
            self.radius_metres,
            self.altitude_metres,
            self.speed_mps,
        )
    }

    // Speed is left out: it is derived from successive fixes and would
    // double-count movement already visible in the coordinates.
    pub(crate) fn delta(&self, other: &Self) -> i64 {
        largest_component([
            i64::from(self.latitude_x10e7) - i64::from(other.latitude_x10e7),
            i64::from(self.longitude_x10e7) - i64::from(other.longitude_x10e7),
            i64::from(self.radius_metres) - i64::from(other.radius_metres),
            i64::from(self.altitude_metres) - i64::from(other.altitude_metres),
        ])
    }
}
