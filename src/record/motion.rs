use core::fmt;
use std::fmt::Write;

use super::largest_component;
use crate::codec::writer::FrameWriter;

/// Acceleration on the three axes, g times 1000.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[repr(C)]
pub struct Acceleration {
    pub x_gx1000: i32,
    pub y_gx1000: i32,
    pub z_gx1000: i32,
}

impl Acceleration {
    pub(crate) fn write_json(&self, w: &mut FrameWriter<'_>) -> fmt::Result {
        write!(
            w,
            ",\"d\":{{\"xgx1000\":{},\"ygx1000\":{},\"zgx1000\":{}}}",
            self.x_gx1000, self.y_gx1000, self.z_gx1000
        )
    }

    pub(crate) fn delta(&self, other: &Self) -> i64 {
        largest_component([
            i64::from(self.x_gx1000) - i64::from(other.x_gx1000),
            i64::from(self.y_gx1000) - i64::from(other.y_gx1000),
            i64::from(self.z_gx1000) - i64::from(other.z_gx1000),
        ])
    }
}
