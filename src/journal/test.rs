use super::{Event, EventLog, CAPACITY};
use crate::clock::FixedClock;
use crate::config::LOG_ENTRIES_PER_RECORD;

#[test]
fn test_ring_overwrites_oldest() {
    let clock = FixedClock::new(1000);
    let mut log = EventLog::new();
    for i in 0..(CAPACITY + 10) {
        log.add(&clock, Event::ActionStarted, i as u32);
    }
    assert_eq!(log.len(), CAPACITY);
    let chunk = log.drain_chunk().unwrap();
    // The ten oldest entries were overwritten.
    assert_eq!(chunk.entries()[0].parameter, 10);
}

#[test]
fn test_drain_in_chunks() {
    let clock = FixedClock::new(1000);
    let mut log = EventLog::new();
    for i in 0..40 {
        log.add(&clock, Event::Sleep, i);
    }
    let first = log.drain_chunk().unwrap();
    assert_eq!(first.entries().len(), LOG_ENTRIES_PER_RECORD);
    assert_eq!(first.index, 0);
    let second = log.drain_chunk().unwrap();
    assert_eq!(second.entries().len(), 40 - LOG_ENTRIES_PER_RECORD);
    assert_eq!(second.index, 1);
    assert!(log.drain_chunk().is_none());
}
