//! Report encoder and acknowledgement decoder.
//!
//! Reports are size-bounded text datagrams:
//!
//! ```text
//! {"v":1,"n":"<name>","i":<index>,"a":<0|1>,"r":[{"<tag>":{"t":<utc>,
//! "nWh":<energy>,"d":{...}}},...]}
//! ```
//!
//! The encoder streams the sorted data queue into successive datagrams:
//! each call emits as many whole records as fit, frees the ones that
//! need no acknowledgement and leaves the rest queued until [`ack`]
//! confirms delivery. A record that does not fit is rolled back to the
//! byte and the cursor stays on it for the next call.
//!
//! [`ack`]: Codec::ack

use std::fmt::Write;

use arrayvec::ArrayString;
use log::debug;

pub use ack::{decode_ack, AckError};

use crate::action::Registry;
use crate::config::{CODEC_MAX_NAME_STRLEN, CODEC_PROTOCOL_VERSION};
use crate::data::{DataId, DataQueue, RecordView};
use crate::process::{lock, Node};
use crate::record::DataFlags;
use writer::FrameWriter;

mod ack;
pub(crate) mod writer;

/// What one `encode` call produced.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct EncodeOutcome {
    /// Bytes written, always within the caller's buffer.
    pub size: usize,

    /// At least one emitted record awaits acknowledgement; the report's
    /// `a` field was set.
    pub needs_ack: bool,

    /// The buffer could not even hold the report framing. Nothing was
    /// written.
    pub not_enough_room_for_header: bool,

    /// The framing fit but not a single record did. Nothing was
    /// written; the caller must bring a larger buffer.
    pub not_enough_room_for_even_one_data: bool,
}

pub struct Codec {
    cursor: Option<DataId>,
    report_index: i32,
    last_index: i32,
}

impl Codec {
    pub fn new() -> Self {
        Self {
            cursor: None,
            report_index: 0,
            last_index: 0,
        }
    }

    /// Sort the queue and point the encode cursor at its head. Must be
    /// called before the first `encode` of a reporting session.
    pub fn prepare(&mut self, queue: &mut DataQueue) {
        self.cursor = queue.sort();
    }

    /// Index that went into the last successfully encoded report. The
    /// first report carries index 0; there is no sentinel.
    pub fn last_index(&self) -> i32 {
        self.last_index
    }

    #[cfg(test)]
    pub(crate) fn set_report_index(&mut self, index: i32) {
        self.report_index = index;
    }

    /// Encode the next report into `buf`.
    ///
    /// Returns zero size once the cursor is exhausted. One report index
    /// is consumed per call that emits at least one record.
    pub fn encode(
        &mut self,
        name: &str,
        buf: &mut [u8],
        registry: &mut Registry,
        queue: &mut DataQueue,
    ) -> EncodeOutcome {
        debug_assert!(name.len() <= CODEC_MAX_NAME_STRLEN);
        let mut out = EncodeOutcome::default();

        let Some(first) = self.cursor else {
            return out;
        };

        let mut w = FrameWriter::new(buf);

        // Header, with the ack field tentatively 0. Its position is
        // kept so it can be patched once an ack-requiring record lands.
        if write!(
            w,
            "{{\"v\":{},\"n\":\"{}\",\"i\":{},\"a\":0",
            CODEC_PROTOCOL_VERSION, name, self.report_index
        )
        .is_err()
        {
            out.not_enough_room_for_header = true;
            return out;
        }
        w.push_closer(b'}');
        let ack_at = w.len() - 1;

        let framing_ok = w.room_to_close()
            && w.write_str(",\"r\":[").is_ok()
            && {
                w.push_closer(b']');
                w.room_to_close()
            };
        if !framing_ok {
            debug!("encode: no room for framing in {} byte(s)", buf.len());
            out.not_enough_room_for_header = true;
            return out;
        }

        let mut cur = Some(first);
        let mut items = 0u32;
        let mut needs_ack = false;
        while let Some(id) = cur {
            let Some(view) = queue.record_view(id) else {
                self.cursor = None;
                break;
            };
            let energy_nwh = view
                .action
                .and_then(|a| registry.energy_cost_nwh(a))
                .unwrap_or(0);

            let mark = w.mark();
            let comma_ok = items == 0 || (w.write_str(",").is_ok() && w.room_to_close());
            if !comma_ok || encode_record(&mut w, &view, energy_nwh).is_none() {
                w.rewind(mark);
                break;
            }

            items += 1;
            let next = queue.next_of(id);
            if view.flags.contains(DataFlags::REQUIRES_ACK) {
                needs_ack = true;
            } else {
                queue.free(id, registry);
            }
            self.cursor = next;
            cur = next;
        }

        if items == 0 {
            debug!("encode: not even one record fits in {} byte(s)", buf.len());
            out.not_enough_room_for_even_one_data = true;
            return out;
        }

        while w.depth() > 0 {
            if !w.close_one() {
                break;
            }
        }
        if needs_ack {
            w.set_byte(ack_at, b'1');
            out.needs_ack = true;
        }

        self.last_index = self.report_index;
        self.report_index = self.report_index.wrapping_add(1);
        if self.report_index < 0 {
            self.report_index = 0;
        }

        out.size = w.len();
        out
    }

    /// Release every record from the queue head up to (but excluding)
    /// the cursor. Call once the report covering them was acked.
    ///
    /// The queue must not be re-sorted between `encode` and this call.
    pub fn ack(&mut self, registry: &mut Registry, queue: &mut DataQueue) {
        while let Some(head) = queue.first() {
            if self.cursor == Some(head) {
                break;
            }
            if !queue.free(head, registry) {
                break;
            }
        }
    }
}

impl Default for Codec {
    fn default() -> Self {
        Self::new()
    }
}

/// One whole record: `{"<tag>":{"t":..,"nWh":..,"d":{..}}}`. `None`
/// means it did not fit and the writer must be rewound.
fn encode_record(w: &mut FrameWriter<'_>, view: &RecordView, energy_nwh: u64) -> Option<()> {
    w.write_str("{").ok()?;
    w.push_closer(b'}');
    if !w.room_to_close() {
        return None;
    }
    write!(
        w,
        "\"{}\":{{\"t\":{},\"nWh\":{}",
        view.kind.tag(),
        view.time_utc,
        energy_nwh
    )
    .ok()?;
    w.push_closer(b'}');
    if !w.room_to_close() {
        return None;
    }
    view.payload.write_json(w).ok()?;
    if !w.room_to_close() {
        return None;
    }
    // Tag object, then the record object around it.
    if !w.close_one() || !w.close_one() {
        return None;
    }
    if !w.room_to_close() {
        return None;
    }
    Some(())
}

/// Reporting facade handed to the cellular collaborator.
///
/// Bundles the codec, registry and queue behind short-lived locks so
/// the collaborator can run its transmit/ack loop without pinning core
/// state across I/O waits.
pub struct Reporter<'a> {
    node: &'a Node,
    name: ArrayString<CODEC_MAX_NAME_STRLEN>,
    buffer_len: usize,
}

impl<'a> Reporter<'a> {
    pub(crate) fn new(node: &'a Node, name: &str, buffer_len: usize) -> Self {
        let mut trimmed = name;
        while trimmed.len() > CODEC_MAX_NAME_STRLEN {
            let mut cut = trimmed.len() - 1;
            while !trimmed.is_char_boundary(cut) {
                cut -= 1;
            }
            trimmed = &trimmed[..cut];
        }
        Self {
            node,
            name: ArrayString::from(trimmed).unwrap_or_default(),
            buffer_len,
        }
    }

    /// Datagram buffer size the node was configured with; a transport
    /// without size constraints of its own should use this.
    pub fn suggested_buffer_len(&self) -> usize {
        self.buffer_len
    }

    /// Name that goes into report headers and is expected in acks.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sort the queue and rewind the encode cursor.
    pub fn prepare(&self) {
        let mut codec = lock(&self.node.codec);
        let mut queue = lock(&self.node.queue);
        codec.prepare(&mut queue);
    }

    /// Encode the next report datagram into `buf`.
    pub fn encode_next(&self, buf: &mut [u8]) -> EncodeOutcome {
        let mut codec = lock(&self.node.codec);
        let mut registry = lock(&self.node.registry);
        let mut queue = lock(&self.node.queue);
        codec.encode(&self.name, buf, &mut registry, &mut queue)
    }

    /// Release the records covered by the last acked report.
    pub fn confirm_ack(&self) {
        let mut codec = lock(&self.node.codec);
        let mut registry = lock(&self.node.registry);
        let mut queue = lock(&self.node.queue);
        codec.ack(&mut registry, &mut queue);
    }

    /// Decode an ack datagram against this reporter's name.
    pub fn decode_ack(&self, buf: &[u8]) -> Result<i32, AckError> {
        decode_ack(buf, &self.name)
    }

    pub fn last_index(&self) -> i32 {
        lock(&self.node.codec).last_index()
    }
}

#[cfg(test)]
mod test;
