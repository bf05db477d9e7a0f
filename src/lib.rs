//! Core subsystems of an energy-harvesting sensor node.
//!
//! The node runs from harvested ambient energy. When the supply
//! allows, it wakes, performs a ranked subset of sensing and reporting
//! actions, encodes the results into compact self-describing datagrams,
//! ships them over a cellular link with acknowledged delivery, and goes
//! back to deep sleep.
//!
//! This crate is the board-independent middle of that firmware:
//!
//! - [`action`] — the action registry and the multi-criteria ranker
//!   that decides what to do under energy scarcity;
//! - [`data`] — the typed data queue, backed by a wrap-around arena
//!   with deferred reclamation or by budgeted heap records;
//! - [`codec`] — the resumable bounded-buffer report encoder and the
//!   acknowledgement decoder;
//! - [`process`] — the cooperative wake/sleep processor and its
//!   bounded pool of cancellable workers;
//! - [`stats`] and [`journal`] — operating counters and the on-device
//!   event history;
//! - [`driver`] — the boundary contracts for sensors, modem, supply
//!   supervisor and watchdog, which the board crate implements.
//!
//! ## Example
//!
//! Queue one humidity reading and encode it into a report datagram:
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use eh_node_core::action::{ActionType, Registry};
//! use eh_node_core::clock::FixedClock;
//! use eh_node_core::codec::Codec;
//! use eh_node_core::data::{Backing, DataQueue};
//! use eh_node_core::record::{DataFlags, Humidity, Payload};
//!
//! let clock = Arc::new(FixedClock::new(1000));
//! let mut registry = Registry::new(clock.clone());
//! let mut queue = DataQueue::new(Backing::Heap, clock);
//!
//! // A completed humidity measurement with its reading queued.
//! let action = registry.add(ActionType::MeasureHumidity, &mut queue).unwrap();
//! let payload = Payload::Humidity(Humidity { percentage: 70 });
//! queue.alloc(Some(action), DataFlags::empty(), &payload, &mut registry).unwrap();
//! registry.complete(action);
//!
//! // Stream the queue into one datagram.
//! let mut codec = Codec::new();
//! let mut buf = [0u8; 512];
//! codec.prepare(&mut queue);
//! let out = codec.encode("dev", &mut buf, &mut registry, &mut queue);
//! assert_eq!(
//!     std::str::from_utf8(&buf[..out.size]).unwrap(),
//!     "{\"v\":1,\"n\":\"dev\",\"i\":0,\"a\":0,\"r\":[{\"hum\":{\"t\":1000,\"nWh\":0,\"d\":{\"%\":70}}}]}",
//! );
//! ```

pub mod action;
pub mod clock;
pub mod codec;
pub mod config;
pub mod data;
pub mod driver;
pub mod journal;
pub mod process;
pub mod record;
pub mod stats;
