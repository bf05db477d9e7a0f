use core::fmt;
use std::fmt::Write;
use std::str;

use crate::codec::writer::FrameWriter;
use crate::config::BLE_DEV_NAME_MAX;

/// State of one BLE peripheral picked up during a scan.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(C)]
pub struct BleDevice {
    name: [u8; BLE_DEV_NAME_MAX],
    name_len: u8,
    /// Remote battery level, per cent.
    pub battery_percentage: u8,
}

impl BleDevice {
    /// The device name travels unescaped inside a JSON string, so it
    /// is reduced here to printable ASCII minus quote and backslash,
    /// truncated to [`BLE_DEV_NAME_MAX`] bytes.
    pub fn new(name: &str, battery_percentage: u8) -> Self {
        let mut buf = [0u8; BLE_DEV_NAME_MAX];
        let mut len = 0;
        for &b in name.as_bytes() {
            if len == BLE_DEV_NAME_MAX {
                break;
            }
            if (b' '..=b'~').contains(&b) && b != b'"' && b != b'\\' {
                buf[len] = b;
                len += 1;
            }
        }
        Self {
            name: buf,
            name_len: len as u8,
            battery_percentage,
        }
    }

    pub fn name(&self) -> &str {
        str::from_utf8(&self.name[..self.name_len as usize]).unwrap_or("")
    }

    pub(crate) fn write_json(&self, w: &mut FrameWriter<'_>) -> fmt::Result {
        write!(
            w,
            ",\"d\":{{\"dev\":\"{}\",\"bat%\":{}}}",
            self.name(),
            self.battery_percentage
        )
    }

    pub(crate) fn delta(&self, other: &Self) -> i64 {
        i64::from(self.battery_percentage) - i64::from(other.battery_percentage)
    }
}

impl Default for BleDevice {
    fn default() -> Self {
        Self::new("", 0)
    }
}
