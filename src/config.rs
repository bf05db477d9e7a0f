//! Build-time sizing and the runtime processor configuration.

use std::time::Duration;

/// Capacity of the action registry.
pub const MAX_NUM_ACTIONS: usize = 20;

/// Upper bound on concurrently running action workers.
pub const MAX_NUM_SIMULTANEOUS_ACTIONS: usize = 7;

/// Stack size for a worker thread.
///
/// Workers do little beyond calling into a driver, but drivers may
/// format AT commands or NMEA sentences on the stack.
pub const ACTION_THREAD_STACK_SIZE: usize = 64 * 1024;

/// How long the wake loop idles between polls of the worker slots.
pub const PROCESSOR_IDLE_MS: u64 = 100;

/// Storage budget for queued data records in heap mode.
///
/// In arena mode the budget is the length of the caller's region.
pub const DATA_MAX_SIZE_BYTES: usize = 4096;

/// Wall-clock bound on a single `sort()` pass over the data queue.
/// A sort cut short leaves a partial order; the next call resumes.
pub const DATA_SORT_GUARD_TIMER_MS: u64 = 100;

/// Version field emitted in every report header.
pub const CODEC_PROTOCOL_VERSION: u32 = 1;

/// Longest device name accepted in reports and acks.
pub const CODEC_MAX_NAME_STRLEN: usize = 32;

/// Smallest encode buffer that guarantees forward progress: a
/// worst-case header plus the largest single record (a full `log`
/// chunk) must fit or the encoder can only report lack of room.
pub const CODEC_ENCODE_BUFFER_MIN_SIZE: usize = 1024;

/// How long the cellular collaborator waits for an ack datagram
/// before retransmitting the same report.
pub const ACK_TIMEOUT_MS: u64 = 10_000;

/// Journal entries carried by one `log` data record.
pub const LOG_ENTRIES_PER_RECORD: usize = 25;

/// Longest BLE device name carried in a `ble` record.
pub const BLE_DEV_NAME_MAX: usize = 16;

/// Digits in a modem IMEI, used as the report name when no
/// device name is configured.
pub const IMEI_LENGTH: usize = 15;

/// Timeout the processor arms the watchdog with. Generous: a wake
/// cycle feeds it once per loop iteration.
pub const WATCHDOG_TIMEOUT_SECONDS: u32 = 60;

/// Runtime configuration for the wake processor.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProcessorConfig {
    /// Report server hostname or address.
    pub server_address: String,

    /// Report server UDP port.
    pub server_port: u16,

    /// Name to put in report headers. `None` uses the modem IMEI.
    pub device_name: Option<String>,

    /// Size of the report encode buffer, at least
    /// [`CODEC_ENCODE_BUFFER_MIN_SIZE`].
    pub encode_buffer_len: usize,

    /// Idle interval of the wake loop.
    #[cfg_attr(feature = "serde", serde(skip, default = "default_idle"))]
    pub idle: Duration,

    /// Continue past missing sensors at power-on self-test,
    /// descheduling their action types instead of failing.
    pub best_effort_post: bool,
}

#[cfg(feature = "serde")]
fn default_idle() -> Duration {
    Duration::from_millis(PROCESSOR_IDLE_MS)
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            server_address: String::new(),
            server_port: 0,
            device_name: None,
            encode_buffer_len: CODEC_ENCODE_BUFFER_MIN_SIZE,
            idle: Duration::from_millis(PROCESSOR_IDLE_MS),
            best_effort_post: true,
        }
    }
}
