//! Bounded arena serving variable-size records in roughly FIFO order.
//!
//! Two offsets describe the live span: `first_full` is the oldest live
//! record, `next_empty` the write head. Each allocation patches the
//! previous record's trailing successor word, building a physical chain
//! that survives the gaps a wrap-around leaves at the region end.
//!
//! Freeing is deferred: a record is only marked, and space is reclaimed
//! when the mark reaches the head of the chain, so the live records
//! always occupy a single, possibly wrapped, span.

use log::trace;

use super::layout::{self, NONE_LINK, WORD};
use crate::record::{DataFlags, DataKind};

pub(crate) struct Arena {
    buf: Box<[u8]>,
    /// Offset of the oldest live record, none when empty.
    first_full: Option<u32>,
    /// Write head. Reset together with `first_full` when the arena
    /// drains, so allocation restarts at the base.
    next_empty: Option<u32>,
    /// Offset of the previous record's successor word, patched on the
    /// next allocation.
    prev_succ: Option<u32>,
    used: usize,
}

impl Arena {
    pub fn new(region: Box<[u8]>) -> Self {
        // Whole words only; a trailing partial word can never be
        // allocated anyway.
        let len = region.len() / WORD * WORD;
        let mut buf = region;
        if len != buf.len() {
            let mut v = Vec::from(buf);
            v.truncate(len);
            buf = v.into_boxed_slice();
        }
        Self {
            buf,
            first_full: None,
            next_empty: None,
            prev_succ: None,
            used: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn used(&self) -> usize {
        self.used
    }

    /// Where an allocation of `size` bytes would land right now.
    pub fn place(&self, size: usize) -> Option<u32> {
        let cap = self.capacity();
        if size == 0 || size > cap {
            return None;
        }
        let Some(first) = self.first_full else {
            // Empty arena, allocate at the base.
            return Some(0);
        };
        let first = first as usize;
        let next = self.next_empty.unwrap_or(0) as usize;

        if next > first {
            // |----FFFF-EEEE----| prefer the tail, wrap to the base
            // if the tail is short and the base is clear.
            if next + size <= cap {
                Some(next as u32)
            } else if first != 0 && size <= first {
                Some(0)
            } else {
                None
            }
        } else if next < first {
            // |FFFF----EEEE-FFFF| only the gap below first_full.
            if first - next >= size {
                Some(next as u32)
            } else {
                None
            }
        } else {
            // Write head caught up with the oldest record: full.
            None
        }
    }

    /// Allocate `size` bytes, returning the record offset. The record's
    /// successor word is cleared and the predecessor's is patched.
    pub fn alloc(&mut self, size: usize) -> Option<u32> {
        let off = self.place(size)?;

        if let Some(at) = self.prev_succ {
            let at = at as usize;
            self.buf[at..at + WORD].copy_from_slice(&off.to_ne_bytes());
        }

        let end = off as usize + size;
        let succ_at = end - WORD;
        self.buf[succ_at..end].copy_from_slice(&NONE_LINK.to_ne_bytes());
        self.prev_succ = Some(succ_at as u32);

        // Wrap the write head when it lands exactly on the edge.
        self.next_empty = Some(if end == self.capacity() { 0 } else { end as u32 });
        if self.first_full.is_none() {
            self.first_full = Some(off);
        }
        self.used += size;
        trace!("arena alloc {} byte(s) at {}, {} used", size, off, self.used);
        Some(off)
    }

    /// Mark the record at `off` freeable and reclaim the span of
    /// consecutive freeable records at the head of the chain, if the
    /// mark reaches it. Returns the bytes physically reclaimed.
    pub fn free(&mut self, off: u32) -> usize {
        {
            let rec = self.record_mut(off);
            let mut header = layout::read_header(rec);
            header.flags |= DataFlags::CAN_BE_FREED.bits();
            layout::write_header(rec, header);
        }

        if self.first_full != Some(off) {
            return 0;
        }

        let mut reclaimed = 0;
        let mut cur = off;
        loop {
            let rec = self.record(cur);
            let header = layout::read_header(rec);
            if header.flags & DataFlags::CAN_BE_FREED.bits() == 0 {
                self.first_full = Some(cur);
                break;
            }
            let Some(kind) = DataKind::from_u8(header.tag) else {
                // A corrupt tag would derail the walk; stop here.
                self.first_full = Some(cur);
                break;
            };
            reclaimed += layout::record_size(kind);
            let succ = layout::read_succ(rec, kind);
            if succ == NONE_LINK {
                // Consumed up to the write head: the arena is empty
                // again and allocation restarts at the base.
                self.first_full = None;
                self.next_empty = None;
                self.prev_succ = None;
                break;
            }
            cur = succ;
            self.first_full = Some(cur);
        }
        self.used = self.used.saturating_sub(reclaimed);
        trace!("arena reclaimed {} byte(s), {} used", reclaimed, self.used);
        reclaimed
    }

    /// Bytes of the record at `off`, running to the end of the region.
    pub fn record(&self, off: u32) -> &[u8] {
        &self.buf[off as usize..]
    }

    pub fn record_mut(&mut self, off: u32) -> &mut [u8] {
        &mut self.buf[off as usize..]
    }

    pub fn contains(&self, off: u32) -> bool {
        (off as usize) < self.capacity()
    }
}
