//! Operating counters: per-day figures that roll over at UTC midnight
//! and per-reset figures that live until the next cold start.
//!
//! Nothing here reads the clock directly; callers pass the timestamps
//! in, which keeps the midnight arithmetic testable and lets
//! [`time_update`][Statistics::time_update] shift the stored stamps
//! before the clock itself is corrected.

use crate::action::ActionType;
use crate::record::StatsReport;

const SECONDS_PER_DAY: i64 = 86_400;

fn seconds_since_midnight(t: i64) -> i64 {
    t.rem_euclid(SECONDS_PER_DAY)
}

#[derive(Debug, Default)]
pub struct Statistics {
    sleep_time_per_day_seconds: u32,
    wake_time_per_day_seconds: u32,
    wake_ups_per_day: u32,
    actions_per_day: [u32; 8],
    energy_per_day_nwh: u64,

    connection_attempts: u32,
    connection_success: u32,
    bytes_transmitted: u32,
    bytes_received: u32,
    position_attempts: u32,
    position_success: u32,
    last_num_sv_visible: u32,

    last_wake_time: i64,
    last_sleep_time: i64,
}

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }

    fn zero_dailies(&mut self) {
        self.energy_per_day_nwh = 0;
        self.actions_per_day = [0; 8];
        self.wake_ups_per_day = 0;
    }

    /// Record a wake-up at `now`, accumulating the sleep just ended.
    /// Crossing midnight while asleep restarts the daily counters:
    /// the sleep credited to the new day is just the seconds since
    /// midnight.
    pub fn wake_up(&mut self, now: i64) {
        let since_midnight = seconds_since_midnight(now);

        if self.last_sleep_time > 0 {
            let slept = now - self.last_sleep_time;
            if since_midnight < seconds_since_midnight(self.last_sleep_time) {
                self.sleep_time_per_day_seconds = since_midnight as u32;
                self.wake_time_per_day_seconds = 0;
                self.zero_dailies();
            } else {
                self.sleep_time_per_day_seconds =
                    self.sleep_time_per_day_seconds.saturating_add(slept.max(0) as u32);
            }
        }
        self.wake_ups_per_day = self.wake_ups_per_day.saturating_add(1);
        self.last_wake_time = now;
    }

    /// Record going to sleep at `now`, accumulating the wake time.
    pub fn sleep(&mut self, now: i64) {
        let since_midnight = seconds_since_midnight(now);
        let awake = now - self.last_wake_time;

        if since_midnight < seconds_since_midnight(self.last_wake_time) {
            self.wake_time_per_day_seconds = since_midnight as u32;
            self.sleep_time_per_day_seconds = 0;
            self.zero_dailies();
        } else {
            self.wake_time_per_day_seconds =
                self.wake_time_per_day_seconds.saturating_add(awake.max(0) as u32);
        }
        self.last_sleep_time = now;
    }

    /// The system time is about to jump from `old_now` to `new_now`;
    /// move the stored stamps by the same delta first.
    pub fn time_update(&mut self, new_now: i64, old_now: i64) {
        let delta = new_now - old_now;
        self.last_wake_time += delta;
        self.last_sleep_time += delta;
    }

    pub fn add_action(&mut self, ty: ActionType) {
        if let Some(i) = ty.measurement_index() {
            self.actions_per_day[i] = self.actions_per_day[i].saturating_add(1);
        }
    }

    pub fn add_energy(&mut self, nwh: u64) {
        self.energy_per_day_nwh = self.energy_per_day_nwh.saturating_add(nwh);
    }

    pub fn inc_connection_attempts(&mut self) {
        self.connection_attempts = self.connection_attempts.saturating_add(1);
    }

    pub fn inc_connection_success(&mut self) {
        self.connection_success = self.connection_success.saturating_add(1);
    }

    pub fn add_transmitted(&mut self, bytes: u32) {
        self.bytes_transmitted = self.bytes_transmitted.saturating_add(bytes);
    }

    pub fn add_received(&mut self, bytes: u32) {
        self.bytes_received = self.bytes_received.saturating_add(bytes);
    }

    pub fn inc_position_attempts(&mut self) {
        self.position_attempts = self.position_attempts.saturating_add(1);
    }

    pub fn inc_position_success(&mut self) {
        self.position_success = self.position_success.saturating_add(1);
    }

    pub fn set_last_svs(&mut self, svs: u32) {
        self.last_num_sv_visible = svs;
    }

    /// Current counters as a `stt` record payload.
    pub fn snapshot(&self) -> StatsReport {
        StatsReport {
            sleep_time_per_day_seconds: self.sleep_time_per_day_seconds,
            wake_time_per_day_seconds: self.wake_time_per_day_seconds,
            wake_ups_per_day: self.wake_ups_per_day,
            actions_per_day: self.actions_per_day,
            energy_per_day_nwh: self.energy_per_day_nwh,
            connection_attempts_since_reset: self.connection_attempts,
            connection_success_since_reset: self.connection_success,
            bytes_transmitted_since_reset: self.bytes_transmitted,
            bytes_received_since_reset: self.bytes_received,
            position_attempts_since_reset: self.position_attempts,
            position_success_since_reset: self.position_success,
            position_last_num_sv_visible: self.last_num_sv_visible,
        }
    }
}

#[cfg(test)]
mod test;
