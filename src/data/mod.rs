//! The data queue: typed, flag-bearing records in a sorted
//! doubly-linked list, stored either in a caller-provided arena or in
//! per-record heap allocations under a fixed budget.
//!
//! Records are addressed by generational handles; a handle outlived by
//! its record simply stops resolving. Queue order (the links) and
//! physical order (the arena chain) are independent: `sort()` reorders
//! links only.

use std::sync::Arc;
use std::time::{Duration, Instant};

use log::debug;

use crate::action::{ActionId, Registry};
use crate::clock::Clock;
use crate::config::{DATA_MAX_SIZE_BYTES, DATA_SORT_GUARD_TIMER_MS};
use crate::record::{DataFlags, DataKind, Payload};
use arena::Arena;
use layout::{RawHeader, HEADER_SIZE, NONE_LINK, NO_ACTION};

mod arena;
pub(crate) mod layout;

/// Handle to a queued record.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct DataId {
    loc: u32,
    gen: u16,
}

/// Storage behind the queue, chosen at initialisation.
pub enum Backing {
    /// A contiguous region the queue takes ownership of.
    Arena(Box<[u8]>),
    /// Per-record heap allocations, capped at
    /// [`DATA_MAX_SIZE_BYTES`].
    Heap,
}

/// Snapshot of one record, handed to the codec and the ranker.
#[derive(Clone, Copy, Debug)]
pub(crate) struct RecordView {
    pub time_utc: i64,
    pub flags: DataFlags,
    pub kind: DataKind,
    pub payload: Payload,
    pub action: Option<ActionId>,
}

struct HeapStore {
    slots: Vec<Option<Box<[u8]>>>,
    free: Vec<u32>,
    used: usize,
}

enum Store {
    Arena(Arena),
    Heap(HeapStore),
}

impl Store {
    fn alloc(&mut self, kind: DataKind) -> Option<u32> {
        let size = layout::record_size(kind);
        match self {
            Self::Arena(arena) => arena.alloc(size),
            Self::Heap(heap) => {
                if heap.used + size > DATA_MAX_SIZE_BYTES {
                    return None;
                }
                let buf = vec![0u8; size].into_boxed_slice();
                let loc = match heap.free.pop() {
                    Some(loc) => {
                        heap.slots[loc as usize] = Some(buf);
                        loc
                    }
                    None => {
                        heap.slots.push(Some(buf));
                        (heap.slots.len() - 1) as u32
                    }
                };
                heap.used += size;
                Some(loc)
            }
        }
    }

    fn can_fit(&self, kind: DataKind) -> bool {
        let size = layout::record_size(kind);
        match self {
            Self::Arena(arena) => arena.place(size).is_some(),
            Self::Heap(heap) => heap.used + size <= DATA_MAX_SIZE_BYTES,
        }
    }

    fn free(&mut self, loc: u32, kind: DataKind) {
        match self {
            Self::Arena(arena) => {
                arena.free(loc);
            }
            Self::Heap(heap) => {
                if heap.slots[loc as usize].take().is_some() {
                    heap.used = heap.used.saturating_sub(layout::record_size(kind));
                    heap.free.push(loc);
                }
            }
        }
    }

    fn record(&self, loc: u32) -> Option<&[u8]> {
        match self {
            Self::Arena(arena) => arena.contains(loc).then(|| arena.record(loc)),
            Self::Heap(heap) => heap.slots.get(loc as usize)?.as_deref(),
        }
    }

    fn record_mut(&mut self, loc: u32) -> Option<&mut [u8]> {
        match self {
            Self::Arena(arena) => arena.contains(loc).then(|| arena.record_mut(loc)),
            Self::Heap(heap) => heap.slots.get_mut(loc as usize)?.as_deref_mut(),
        }
    }

    fn used(&self) -> usize {
        match self {
            Self::Arena(arena) => arena.used(),
            Self::Heap(heap) => heap.used,
        }
    }
}

pub struct DataQueue {
    store: Store,
    head: Option<u32>,
    tail: Option<u32>,
    gen: u16,
    sort_guard: Duration,
    clock: Arc<dyn Clock>,
}

impl DataQueue {
    pub fn new(backing: Backing, clock: Arc<dyn Clock>) -> Self {
        let store = match backing {
            Backing::Arena(region) => Store::Arena(Arena::new(region)),
            Backing::Heap => Store::Heap(HeapStore {
                slots: Vec::new(),
                free: Vec::new(),
                used: 0,
            }),
        };
        Self {
            store,
            head: None,
            tail: None,
            gen: 0,
            sort_guard: Duration::from_millis(DATA_SORT_GUARD_TIMER_MS),
            clock,
        }
    }

    /// Wall-clock bound for a single [`sort`][Self::sort] call.
    pub fn set_sort_guard(&mut self, guard: Duration) {
        self.sort_guard = guard;
    }

    /// Allocate a record, stamp it with the current time, copy the
    /// payload in, append it to the queue tail and cross-link it with
    /// its action. Returns `None` when no space is left.
    pub fn alloc(
        &mut self,
        action: Option<ActionId>,
        flags: DataFlags,
        payload: &Payload,
        registry: &mut Registry,
    ) -> Option<DataId> {
        let kind = payload.kind();
        let Some(loc) = self.store.alloc(kind) else {
            debug!("no room for a {:?} record", kind);
            return None;
        };

        self.gen = self.gen.wrapping_add(1);
        let gen = self.gen;
        let header = RawHeader {
            time_utc: self.clock.now_utc(),
            prev: self.tail.unwrap_or(NONE_LINK),
            next: NONE_LINK,
            action_gen: action.map(|a| a.generation()).unwrap_or(0),
            gen,
            action_idx: action.map(|a| a.index()).unwrap_or(NO_ACTION),
            tag: kind as u8,
            flags: (flags - DataFlags::CAN_BE_FREED).bits(),
        };
        // The store just handed this location out.
        let record = self.store.record_mut(loc)?;
        layout::write_header(record, header);
        layout::write_payload(record, payload);

        match self.tail {
            Some(tail) => self.patch_header(tail, |h| h.next = loc),
            None => self.head = Some(loc),
        }
        self.tail = Some(loc);

        let id = DataId { loc, gen };
        if let Some(a) = action {
            registry.attach_data(a, id);
        }
        Some(id)
    }

    /// Whether an allocation of `kind` would succeed right now.
    pub fn alloc_check(&self, kind: DataKind) -> bool {
        self.store.can_fit(kind)
    }

    /// Unlink the record, clear its action's back-reference and release
    /// its storage (deferred in arena mode until the mark reaches the
    /// head of the physical chain).
    pub fn free(&mut self, id: DataId, registry: &mut Registry) -> bool {
        let Some(header) = self.live_header(id) else {
            return false;
        };

        match header.prev_opt() {
            Some(p) => self.patch_header(p, |h| h.next = header.next),
            None => self.head = header.next_opt(),
        }
        match header.next_opt() {
            Some(n) => self.patch_header(n, |h| h.prev = header.prev),
            None => self.tail = header.prev_opt(),
        }

        if header.action_idx != NO_ACTION {
            registry.clear_data(header.action_idx, header.action_gen);
        }

        let Some(kind) = DataKind::from_u8(header.tag) else {
            return false;
        };
        self.store.free(id.loc, kind);
        true
    }

    /// Drop the record's back-reference to its action. Called by the
    /// registry when it recycles a slot whose data lives on.
    pub(crate) fn detach_action(&mut self, id: DataId) {
        if self.live_header(id).is_some() {
            self.patch_header(id.loc, |h| {
                h.action_idx = NO_ACTION;
                h.action_gen = 0;
            });
        }
    }

    /// Sort the queue by flag rank, then timestamp, both descending,
    /// and return the new head. Runs under the sort guard: a pass cut
    /// short leaves a partial order and the next call resumes.
    pub fn sort(&mut self) -> Option<DataId> {
        let started = Instant::now();
        let mut cur = self.head;
        while let Some(a) = cur {
            if started.elapsed() >= self.sort_guard {
                debug!("sort guard hit after {:?}", self.sort_guard);
                break;
            }
            let ha = self.header_at(a);
            let Some(b) = ha.next_opt() else {
                break;
            };
            let hb = self.header_at(b);
            let swap = (hb.flags >> 1) > (ha.flags >> 1)
                || ((hb.flags >> 1) == (ha.flags >> 1) && hb.time_utc > ha.time_utc);
            if swap {
                self.swap_adjacent(a, b);
                cur = self.head;
            } else {
                cur = Some(b);
            }
        }
        self.first()
    }

    /// Head of the queue.
    pub fn first(&self) -> Option<DataId> {
        let loc = self.head?;
        Some(DataId {
            loc,
            gen: self.header_at(loc).gen,
        })
    }

    /// Record following `id` in queue order.
    pub fn next_of(&self, id: DataId) -> Option<DataId> {
        let header = self.live_header(id)?;
        let loc = header.next_opt()?;
        Some(DataId {
            loc,
            gen: self.header_at(loc).gen,
        })
    }

    /// Contents of the record behind `id`.
    pub fn payload(&self, id: DataId) -> Option<Payload> {
        let header = self.live_header(id)?;
        layout::read_payload(self.store.record(id.loc)?, header.tag)
    }

    pub fn flags(&self, id: DataId) -> Option<DataFlags> {
        Some(DataFlags::from_bits_truncate(self.live_header(id)?.flags))
    }

    pub fn timestamp(&self, id: DataId) -> Option<i64> {
        Some(self.live_header(id)?.time_utc)
    }

    pub(crate) fn record_view(&self, id: DataId) -> Option<RecordView> {
        let header = self.live_header(id)?;
        let payload = layout::read_payload(self.store.record(id.loc)?, header.tag)?;
        let action = (header.action_idx != NO_ACTION)
            .then(|| ActionId::from_parts(header.action_idx, header.action_gen));
        Some(RecordView {
            time_utc: header.time_utc,
            flags: DataFlags::from_bits_truncate(header.flags),
            kind: payload.kind(),
            payload,
            action,
        })
    }

    /// Semantic distance between two records of the same kind; see
    /// [`Payload::difference`].
    pub fn difference(&self, a: DataId, b: DataId) -> i64 {
        match (self.payload(a), self.payload(b)) {
            (Some(pa), Some(pb)) => pa.difference(&pb),
            _ => 0,
        }
    }

    /// Number of queued records.
    pub fn count(&self) -> usize {
        self.iter_locs().count()
    }

    /// Number of queued records of `kind`.
    pub fn count_of(&self, kind: DataKind) -> usize {
        self.iter_locs()
            .filter(|&loc| self.header_at(loc).tag == kind as u8)
            .count()
    }

    /// Bytes of storage physically occupied.
    pub fn bytes_used(&self) -> usize {
        self.store.used()
    }

    /// Bytes of records currently linked in the queue.
    pub fn bytes_queued(&self) -> usize {
        self.iter_locs()
            .filter_map(|loc| DataKind::from_u8(self.header_at(loc).tag))
            .map(layout::record_size)
            .sum()
    }

    // Header of a known-live location.
    fn header_at(&self, loc: u32) -> RawHeader {
        match self.store.record(loc) {
            Some(record) => layout::read_header(record),
            None => RawHeader {
                time_utc: 0,
                prev: NONE_LINK,
                next: NONE_LINK,
                action_gen: 0,
                gen: 0,
                action_idx: NO_ACTION,
                tag: 0,
                flags: 0,
            },
        }
    }

    // Header behind a handle, if the handle still resolves.
    fn live_header(&self, id: DataId) -> Option<RawHeader> {
        let record = self.store.record(id.loc)?;
        if record.len() < HEADER_SIZE {
            return None;
        }
        let header = layout::read_header(record);
        let live = header.gen == id.gen
            && header.flags & DataFlags::CAN_BE_FREED.bits() == 0;
        live.then_some(header)
    }

    fn patch_header(&mut self, loc: u32, patch: impl FnOnce(&mut RawHeader)) {
        if let Some(record) = self.store.record_mut(loc) {
            let mut header = layout::read_header(record);
            patch(&mut header);
            layout::write_header(record, header);
        }
    }

    // Swap the adjacent records a -> b into b -> a.
    fn swap_adjacent(&mut self, a: u32, b: u32) {
        let ha = self.header_at(a);
        let hb = self.header_at(b);
        let before = ha.prev;
        let after = hb.next;

        self.patch_header(b, |h| {
            h.prev = before;
            h.next = a;
        });
        self.patch_header(a, |h| {
            h.prev = b;
            h.next = after;
        });
        if before != NONE_LINK {
            self.patch_header(before, |h| h.next = b);
        } else {
            self.head = Some(b);
        }
        if after != NONE_LINK {
            self.patch_header(after, |h| h.prev = a);
        } else {
            self.tail = Some(a);
        }
    }

    fn iter_locs(&self) -> impl Iterator<Item = u32> + '_ {
        let mut cur = self.head;
        std::iter::from_fn(move || {
            let loc = cur?;
            cur = self.header_at(loc).next_opt();
            Some(loc)
        })
    }
}
