//! On-storage record layout.
//!
//! A record is a POD header, the payload struct of its kind rounded up
//! to the word, and one trailing word holding the successor offset of
//! the physical chain. Values are moved with unaligned pointer copies;
//! every field of every stored struct is a plain integer, so any byte
//! pattern reads back as a valid value.

use crate::record::{
    Acceleration, BleDevice, Cellular, DataKind, EnergySource, Humidity, Light, LogChunk,
    Magnetic, Payload, Position, Pressure, StatsReport, Temperature, WakeUp,
};

/// Allocation granule of the arena.
pub(crate) const WORD: usize = 4;

/// Link value meaning "no record".
pub(crate) const NONE_LINK: u32 = u32::MAX;

/// Action index meaning "no owning action".
pub(crate) const NO_ACTION: u8 = u8::MAX;

#[derive(Clone, Copy, Debug)]
#[repr(C)]
pub(crate) struct RawHeader {
    pub time_utc: i64,
    /// Queue link towards the head.
    pub prev: u32,
    /// Queue link towards the tail.
    pub next: u32,
    /// Generation of the owning action's slot.
    pub action_gen: u16,
    /// Generation stamp of this record, echoed in handles.
    pub gen: u16,
    /// Slot index of the owning action, [`NO_ACTION`] when detached.
    pub action_idx: u8,
    /// [`DataKind`] discriminant.
    pub tag: u8,
    /// [`DataFlags`][crate::record::DataFlags] bits.
    pub flags: u8,
}

impl RawHeader {
    pub fn prev_opt(&self) -> Option<u32> {
        (self.prev != NONE_LINK).then_some(self.prev)
    }

    pub fn next_opt(&self) -> Option<u32> {
        (self.next != NONE_LINK).then_some(self.next)
    }
}

pub(crate) const HEADER_SIZE: usize = size_of::<RawHeader>();

fn to_words(bytes: usize) -> usize {
    bytes.div_ceil(WORD)
}

/// Full storage footprint of a record of `kind`, successor word
/// included.
pub(crate) fn record_size(kind: DataKind) -> usize {
    to_words(HEADER_SIZE + kind.payload_size()) * WORD + WORD
}

// Copies the pointee out of `bytes` without alignment assumptions.
//
// Safety: the caller guarantees `bytes` holds at least `size_of::<T>()`
// bytes and that any byte pattern is a valid `T` (integer-only PODs).
unsafe fn read_pod<T: Copy>(bytes: &[u8]) -> T {
    debug_assert!(bytes.len() >= size_of::<T>());
    (bytes.as_ptr() as *const T).read_unaligned()
}

// Safety: the caller guarantees `bytes` holds at least `size_of::<T>()`
// bytes.
unsafe fn write_pod<T: Copy>(bytes: &mut [u8], val: T) {
    debug_assert!(bytes.len() >= size_of::<T>());
    (bytes.as_mut_ptr() as *mut T).write_unaligned(val);
}

pub(crate) fn read_header(record: &[u8]) -> RawHeader {
    assert!(record.len() >= HEADER_SIZE);
    unsafe { read_pod(record) }
}

pub(crate) fn write_header(record: &mut [u8], header: RawHeader) {
    assert!(record.len() >= HEADER_SIZE);
    unsafe { write_pod(record, header) }
}

/// Reads the payload stored behind the header. Returns `None` when the
/// tag byte names no known kind.
pub(crate) fn read_payload(record: &[u8], tag: u8) -> Option<Payload> {
    let kind = DataKind::from_u8(tag)?;
    let body = &record[HEADER_SIZE..];
    assert!(body.len() >= kind.payload_size());
    let payload = unsafe {
        match kind {
            DataKind::Cellular => Payload::Cellular(read_pod::<Cellular>(body)),
            DataKind::Humidity => Payload::Humidity(read_pod::<Humidity>(body)),
            DataKind::Pressure => Payload::Pressure(read_pod::<Pressure>(body)),
            DataKind::Temperature => Payload::Temperature(read_pod::<Temperature>(body)),
            DataKind::Light => Payload::Light(read_pod::<Light>(body)),
            DataKind::Acceleration => Payload::Acceleration(read_pod::<Acceleration>(body)),
            DataKind::Position => Payload::Position(read_pod::<Position>(body)),
            DataKind::Magnetic => Payload::Magnetic(read_pod::<Magnetic>(body)),
            DataKind::Ble => Payload::Ble(read_pod::<BleDevice>(body)),
            DataKind::WakeUp => Payload::WakeUp(read_pod::<WakeUp>(body)),
            DataKind::EnergySource => Payload::EnergySource(read_pod::<EnergySource>(body)),
            DataKind::Statistics => Payload::Statistics(read_pod::<StatsReport>(body)),
            DataKind::Log => Payload::Log(read_pod::<LogChunk>(body)),
        }
    };
    Some(payload)
}

pub(crate) fn write_payload(record: &mut [u8], payload: &Payload) {
    let body = &mut record[HEADER_SIZE..];
    unsafe {
        match payload {
            Payload::Cellular(v) => write_pod(body, *v),
            Payload::Humidity(v) => write_pod(body, *v),
            Payload::Pressure(v) => write_pod(body, *v),
            Payload::Temperature(v) => write_pod(body, *v),
            Payload::Light(v) => write_pod(body, *v),
            Payload::Acceleration(v) => write_pod(body, *v),
            Payload::Position(v) => write_pod(body, *v),
            Payload::Magnetic(v) => write_pod(body, *v),
            Payload::Ble(v) => write_pod(body, *v),
            Payload::WakeUp(v) => write_pod(body, *v),
            Payload::EnergySource(v) => write_pod(body, *v),
            Payload::Statistics(v) => write_pod(body, *v),
            Payload::Log(v) => write_pod(body, *v),
        }
    }
}

/// Successor offset stored in the record's trailing word.
pub(crate) fn read_succ(record: &[u8], kind: DataKind) -> u32 {
    let at = record_size(kind) - WORD;
    assert!(record.len() >= at + WORD);
    unsafe { read_pod(&record[at..]) }
}

pub(crate) fn write_succ(record: &mut [u8], kind: DataKind, succ: u32) {
    let at = record_size(kind) - WORD;
    assert!(record.len() >= at + WORD);
    unsafe { write_pod(&mut record[at..], succ) }
}
