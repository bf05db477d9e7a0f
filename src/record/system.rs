//! Housekeeping payloads: wake reason, energy source, statistics and
//! journal chunks. None of them are measurements; their ranking
//! difference is a constant 1.

use core::fmt;
use std::fmt::Write;

use crate::codec::writer::FrameWriter;
use crate::config::LOG_ENTRIES_PER_RECORD;
use crate::driver::WakeReason;

/// Wire spellings, indexed by the stored reason byte.
const WAKE_REASONS: [&str; 7] = ["PWR", "PIN", "WDG", "SOF", "RTC", "ACC", "MAG"];

/// Why the node left deep sleep.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[repr(C)]
pub struct WakeUp {
    reason: u8,
}

impl WakeUp {
    pub fn new(reason: WakeReason) -> Self {
        Self {
            reason: reason.as_u8(),
        }
    }

    pub(crate) fn write_json(&self, w: &mut FrameWriter<'_>) -> fmt::Result {
        let reason = WAKE_REASONS.get(self.reason as usize).copied().unwrap_or("PWR");
        write!(w, ",\"d\":{{\"rsn\":\"{}\"}}", reason)
    }
}

/// Which of the harvesting sources is currently selected.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[repr(C)]
pub struct EnergySource {
    pub source: u8,
}

impl EnergySource {
    pub(crate) fn write_json(&self, w: &mut FrameWriter<'_>) -> fmt::Result {
        write!(w, ",\"d\":{{\"src\":{}}}", self.source)
    }
}

/// Snapshot of the statistics counters (see [`crate::stats`]).
///
/// `actions_per_day` has one slot per measurement action type, in
/// declaration order from humidity through ble.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[repr(C)]
pub struct StatsReport {
    pub sleep_time_per_day_seconds: u32,
    pub wake_time_per_day_seconds: u32,
    pub wake_ups_per_day: u32,
    pub actions_per_day: [u32; 8],
    pub energy_per_day_nwh: u64,
    pub connection_attempts_since_reset: u32,
    pub connection_success_since_reset: u32,
    pub bytes_transmitted_since_reset: u32,
    pub bytes_received_since_reset: u32,
    pub position_attempts_since_reset: u32,
    pub position_success_since_reset: u32,
    pub position_last_num_sv_visible: u32,
}

impl StatsReport {
    pub(crate) fn write_json(&self, w: &mut FrameWriter<'_>) -> fmt::Result {
        let apd = &self.actions_per_day;
        write!(
            w,
            ",\"d\":{{\"stpd\":{},\"wtpd\":{},\"wpd\":{},\"apd\":[{},{},{},{},{},{},{},{}],\"epd\":{},\"ca\":{},\"cs\":{},\"cbt\":{},\"cbr\":{},\"poa\":{},\"pos\":{},\"svs\":{}}}",
            self.sleep_time_per_day_seconds,
            self.wake_time_per_day_seconds,
            self.wake_ups_per_day,
            apd[0],
            apd[1],
            apd[2],
            apd[3],
            apd[4],
            apd[5],
            apd[6],
            apd[7],
            self.energy_per_day_nwh,
            self.connection_attempts_since_reset,
            self.connection_success_since_reset,
            self.bytes_transmitted_since_reset,
            self.bytes_received_since_reset,
            self.position_attempts_since_reset,
            self.position_success_since_reset,
            self.position_last_num_sv_visible,
        )
    }
}

/// One journal entry: when, what, with what parameter.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[repr(C)]
pub struct LogEntry {
    pub timestamp: u32,
    pub event: u32,
    pub parameter: u32,
}

/// A slice of the event journal, packaged for transmission.
#[derive(Clone, Copy, Debug)]
#[repr(C)]
pub struct LogChunk {
    /// Journal format version, major.
    pub version_app: u8,
    /// Journal format version, minor.
    pub version_client: u8,
    /// Running chunk number since boot.
    pub index: u32,
    num_entries: u32,
    entries: [LogEntry; LOG_ENTRIES_PER_RECORD],
}

impl LogChunk {
    pub fn new(version_app: u8, version_client: u8, index: u32, entries: &[LogEntry]) -> Self {
        let mut buf = [LogEntry::default(); LOG_ENTRIES_PER_RECORD];
        let n = entries.len().min(LOG_ENTRIES_PER_RECORD);
        buf[..n].copy_from_slice(&entries[..n]);
        Self {
            version_app,
            version_client,
            index,
            num_entries: n as u32,
            entries: buf,
        }
    }

    pub fn entries(&self) -> &[LogEntry] {
        let n = (self.num_entries as usize).min(LOG_ENTRIES_PER_RECORD);
        &self.entries[..n]
    }

    // The version is coded as a string rather than a float so the far
    // end can pluck the two halves out without parsing decimals.
    pub(crate) fn write_json(&self, w: &mut FrameWriter<'_>) -> fmt::Result {
        write!(
            w,
            ",\"d\":{{\"v\":\"{}.{}\",\"i\":{},\"rec\":[",
            self.version_app, self.version_client, self.index
        )?;
        for (i, entry) in self.entries().iter().enumerate() {
            if i > 0 {
                w.write_char(',')?;
            }
            write!(w, "[{},{},{}]", entry.timestamp, entry.event, entry.parameter)?;
        }
        w.write_str("]}")
    }
}
