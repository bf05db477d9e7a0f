use core::fmt;
use std::fmt::Write;

use crate::codec::writer::FrameWriter;

/// Snapshot of the serving cell as seen at report time.
///
/// All radio figures are in the units the modem reports them in; no
/// scaling is applied by the core.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[repr(C)]
pub struct Cellular {
    /// Reference signal received power, dBm.
    pub rsrp_dbm: i32,
    /// Received signal strength, dBm.
    pub rssi_dbm: i32,
    /// Reference signal received quality, dB.
    pub rsrq_db: i32,
    /// Signal to noise ratio, dB.
    pub snr_db: i32,
    /// Coverage enhancement level.
    pub ecl: u32,
    /// Physical cell identifier.
    pub cell_id: u32,
    /// Transmit power, dBm.
    pub tx_power_dbm: i32,
    /// EARFCN channel number.
    pub earfcn: u32,
}

impl Cellular {
    pub(crate) fn write_json(&self, w: &mut FrameWriter<'_>) -> fmt::Result {
        write!(
            w,
            ",\"d\":{{\"rsrpdbm\":{},\"rssidbm\":{},\"rsrqdb\":{},\"snrdb\":{},\"ecl\":{},\"cid\":{},\"tpwdbm\":{},\"ch\":{}}}",
            self.rsrp_dbm,
            self.rssi_dbm,
            self.rsrq_db,
            self.snr_db,
            self.ecl,
            self.cell_id,
            self.tx_power_dbm,
            self.earfcn,
        )
    }

    // RSRP is the one figure that is both variable and meaningful, so
    // the threshold applies to it.
    pub(crate) fn delta(&self, other: &Self) -> i64 {
        i64::from(self.rsrp_dbm) - i64::from(other.rsrp_dbm)
    }
}
