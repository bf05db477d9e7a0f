use core::fmt;
use std::fmt::Write;

use super::largest_component;
use crate::codec::writer::FrameWriter;

/// Visible light and UV index.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[repr(C)]
pub struct Light {
    pub lux: u32,
    /// UV index times 1000.
    pub uv_index_x1000: u32,
}

impl Light {
    pub(crate) fn write_json(&self, w: &mut FrameWriter<'_>) -> fmt::Result {
        write!(
            w,
            ",\"d\":{{\"lux\":{},\"uvix1000\":{}}}",
            self.lux, self.uv_index_x1000
        )
    }

    pub(crate) fn delta(&self, other: &Self) -> i64 {
        largest_component([
            i64::from(self.lux) - i64::from(other.lux),
            i64::from(self.uv_index_x1000) - i64::from(other.uv_index_x1000),
        ])
    }
}
