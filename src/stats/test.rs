use super::Statistics;
use crate::action::ActionType;

const DAY: i64 = 86_400;

#[test]
fn test_wake_sleep_accumulation() {
    let mut stats = Statistics::new();
    let midnight = 1_600_000_000 / DAY * DAY;

    stats.wake_up(midnight + 100);
    stats.sleep(midnight + 130);
    stats.wake_up(midnight + 400);
    stats.sleep(midnight + 460);

    let snap = stats.snapshot();
    assert_eq!(snap.wake_time_per_day_seconds, 30 + 60);
    assert_eq!(snap.sleep_time_per_day_seconds, 400 - 130);
    assert_eq!(snap.wake_ups_per_day, 2);
}

#[test]
fn test_midnight_rollover_while_asleep() {
    let mut stats = Statistics::new();
    let midnight = 1_600_000_000 / DAY * DAY;

    stats.wake_up(midnight - 600);
    stats.add_energy(500);
    stats.add_action(ActionType::MeasureHumidity);
    stats.sleep(midnight - 500);

    // Sleep across midnight: the new day starts with only the seconds
    // slept today, the dailies reset.
    stats.wake_up(midnight + 250);
    let snap = stats.snapshot();
    assert_eq!(snap.sleep_time_per_day_seconds, 250);
    assert_eq!(snap.wake_time_per_day_seconds, 0);
    assert_eq!(snap.energy_per_day_nwh, 0);
    assert_eq!(snap.actions_per_day, [0; 8]);
}

#[test]
fn test_midnight_rollover_while_awake() {
    let mut stats = Statistics::new();
    let midnight = 1_600_000_000 / DAY * DAY;

    stats.wake_up(midnight - 300);
    stats.add_energy(99);
    stats.sleep(midnight + 120);

    let snap = stats.snapshot();
    assert_eq!(snap.wake_time_per_day_seconds, 120);
    assert_eq!(snap.sleep_time_per_day_seconds, 0);
    assert_eq!(snap.energy_per_day_nwh, 0);
}

#[test]
fn test_time_update_shifts_stamps() {
    let mut stats = Statistics::new();
    let midnight = 1_600_000_000 / DAY * DAY;

    // The node wakes before NTP has run; its clock is way behind.
    stats.wake_up(midnight + 10);
    // NTP jumps the clock forward a whole day; without the shift the
    // next sleep would look like a day-long wake.
    stats.time_update(midnight + DAY + 10, midnight + 10);
    stats.sleep(midnight + DAY + 40);

    let snap = stats.snapshot();
    assert_eq!(snap.wake_time_per_day_seconds, 30);
}

#[test]
fn test_action_counters_measurements_only() {
    let mut stats = Statistics::new();
    stats.add_action(ActionType::MeasureHumidity);
    stats.add_action(ActionType::MeasureHumidity);
    stats.add_action(ActionType::MeasureBle);
    stats.add_action(ActionType::Report);

    let snap = stats.snapshot();
    assert_eq!(snap.actions_per_day[0], 2);
    assert_eq!(snap.actions_per_day[7], 1);
    assert_eq!(snap.actions_per_day.iter().sum::<u32>(), 3);
}

#[test]
fn test_transfer_counters() {
    let mut stats = Statistics::new();
    stats.inc_connection_attempts();
    stats.inc_connection_attempts();
    stats.inc_connection_success();
    stats.add_transmitted(352);
    stats.add_received(28);
    stats.inc_position_attempts();
    stats.inc_position_success();
    stats.set_last_svs(7);

    let snap = stats.snapshot();
    assert_eq!(snap.connection_attempts_since_reset, 2);
    assert_eq!(snap.connection_success_since_reset, 1);
    assert_eq!(snap.bytes_transmitted_since_reset, 352);
    assert_eq!(snap.bytes_received_since_reset, 28);
    assert_eq!(snap.position_attempts_since_reset, 1);
    assert_eq!(snap.position_success_since_reset, 1);
    assert_eq!(snap.position_last_num_sv_visible, 7);
}
