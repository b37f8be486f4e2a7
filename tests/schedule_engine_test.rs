
use cerbo_worker::modbus::RegisterMap;
use cerbo_worker::schedule::{ScheduleEngine, TickOutcome, WindowState};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use test_helpers::*;

struct Rig {
    modbus: Arc<FakeModbus>,
    store: Arc<MemorySchedules>,
    clock: Arc<FixedClock>,
    engine: ScheduleEngine,
}

fn rig(schedules: Vec<cerbo_worker::models::Schedule>, now: chrono::NaiveDateTime, writes_enabled: bool) -> Rig {
    let modbus = Arc::new(healthy_plant());
    let store = Arc::new(MemorySchedules::new(schedules));
    let clock = Arc::new(FixedClock::new(now));
    let engine = ScheduleEngine::new(
        "obj-a",
        &RegisterMap::default(),
        store.clone(),
        modbus.clone(),
        clock.clone(),
        default_setpoints(),
        writes_enabled,
    );
    Rig {
        modbus,
        store,
        clock,
        engine,
    }
}

#[tokio::test]
async fn test_wrap_around_window_applies_setpoints() {
    let night = schedule("night", "obj-a", time(22, 0), 6, (40000, 20, 100));
    let mut r = rig(vec![night], at(2, 30), true);
    r.modbus.set_holding(INVERTER, 2703, 500);
    r.modbus.set_holding(INVERTER, 2901, 300);
    r.modbus.set_holding(INVERTER, 2705, 300);

    let outcome = r.engine.tick().await.unwrap();

    assert_eq!(outcome, TickOutcome::Applied);
    assert_eq!(
        r.modbus.writes(),
        vec![(INVERTER, 2703, 400), (INVERTER, 2901, 200), (INVERTER, 2705, 100)]
    );
    assert!(r.store.get("night").is_active);
    assert_eq!(r.engine.state(), &WindowState::Running("night".into()));
}

#[tokio::test]
async fn test_converges_then_stays_idempotent() {
    let night = schedule("night", "obj-a", time(22, 0), 6, (40000, 20, 100));
    let mut r = rig(vec![night], at(2, 30), true);
    r.modbus.set_holding(INVERTER, 2703, 500);

    assert_eq!(r.engine.tick().await.unwrap(), TickOutcome::Applied);
    assert_eq!(r.modbus.writes().len(), 3);
    let flag_updates = r.store.flag_updates();

    for _ in 0..3 {
        assert_eq!(r.engine.tick().await.unwrap(), TickOutcome::InSync);
    }
    assert_eq!(r.modbus.writes().len(), 3);
    assert_eq!(r.store.flag_updates(), flag_updates);
}

#[tokio::test]
async fn test_no_window_falls_back_to_defaults() {
    let mut day = schedule("day", "obj-a", time(8, 0), 4, (40000, 20, 100));
    day.is_active = true;
    let mut r = rig(vec![day], at(20, 0), true);

    let outcome = r.engine.tick().await.unwrap();

    assert_eq!(outcome, TickOutcome::InSync);
    assert!(r.modbus.writes().is_empty());
    assert!(!r.store.get("day").is_active);
    assert_eq!(r.engine.state(), &WindowState::Idle);
}

#[tokio::test]
async fn test_leaving_window_restores_defaults() {
    let day = schedule("day", "obj-a", time(8, 0), 4, (40000, 20, 100));
    let mut r = rig(vec![day], at(9, 0), true);

    assert_eq!(r.engine.tick().await.unwrap(), TickOutcome::Applied);
    assert!(r.store.get("day").is_active);

    r.clock.set(at(12, 0));
    assert_eq!(r.engine.tick().await.unwrap(), TickOutcome::Applied);
    assert_eq!(
        r.modbus.writes()[3..].to_vec(),
        vec![(INVERTER, 2703, 700), (INVERTER, 2901, 300), (INVERTER, 2705, 300)]
    );
    assert!(!r.store.get("day").is_active);
    assert_eq!(r.engine.state(), &WindowState::Idle);
}

#[tokio::test]
async fn test_writes_disabled_still_updates_flags() {
    let night = schedule("night", "obj-a", time(22, 0), 6, (40000, 20, 100));
    let mut r = rig(vec![night], at(2, 30), false);
    r.modbus.set_holding(INVERTER, 2703, 500);

    let outcome = r.engine.tick().await.unwrap();

    assert_eq!(outcome, TickOutcome::WritesDisabled);
    assert!(r.modbus.writes().is_empty());
    assert!(r.store.get("night").is_active);
}

#[tokio::test]
async fn test_failed_read_back_defers_tick() {
    let mut day = schedule("day", "obj-a", time(8, 0), 4, (40000, 20, 100));
    day.is_active = false;
    let mut r = rig(vec![day], at(9, 0), true);
    r.modbus.fail_read(INVERTER, 2901, Failure::Exception);

    let outcome = r.engine.tick().await.unwrap();

    assert_eq!(outcome, TickOutcome::Deferred);
    assert!(r.modbus.writes().is_empty());
    assert!(!r.store.get("day").is_active);
    assert_eq!(r.store.flag_updates(), 0);
    assert_eq!(r.engine.state(), &WindowState::Idle);
}

#[tokio::test]
async fn test_failed_write_retried_next_tick() {
    let day = schedule("day", "obj-a", time(8, 0), 4, (40000, 20, 100));
    let mut r = rig(vec![day], at(9, 0), true);
    r.modbus.fail_write(INVERTER, 2901, Failure::Exception);

    assert_eq!(r.engine.tick().await.unwrap(), TickOutcome::WriteFailed);
    assert_eq!(r.modbus.writes(), vec![(INVERTER, 2703, 400)]);
    assert!(!r.store.get("day").is_active);

    r.modbus.clear_failures();
    assert_eq!(r.engine.tick().await.unwrap(), TickOutcome::Applied);
    assert_eq!(r.modbus.holding(INVERTER, 2901), 200);
    assert!(r.store.get("day").is_active);
    assert_eq!(r.engine.tick().await.unwrap(), TickOutcome::InSync);
}

#[tokio::test]
async fn test_unencodable_setpoints_refused() {
    let day = schedule("day", "obj-a", time(8, 0), 4, (5_000_000, 20, 100));
    let mut r = rig(vec![day], at(9, 0), true);

    assert_eq!(r.engine.tick().await.unwrap(), TickOutcome::Refused);
    assert!(r.modbus.writes().is_empty());
    assert!(r.store.get("day").is_active);
}

#[tokio::test]
async fn test_adjacent_windows_hand_over() {
    let first = schedule("first", "obj-a", time(8, 0), 2, (40000, 20, 100));
    let second = schedule("second", "obj-a", time(10, 0), 2, (-20000, 50, 150));
    let mut r = rig(vec![first, second], at(9, 59), true);

    r.engine.tick().await.unwrap();
    assert_eq!(r.engine.state(), &WindowState::Running("first".into()));
    assert_eq!(r.store.active_non_manual("obj-a"), vec!["first".to_string()]);

    r.clock.set(at(10, 0));
    assert_eq!(r.engine.tick().await.unwrap(), TickOutcome::Applied);
    assert_eq!(r.engine.state(), &WindowState::Running("second".into()));
    assert_eq!(r.store.active_non_manual("obj-a"), vec!["second".to_string()]);
    assert_eq!(r.modbus.holding(INVERTER, 2703), 65336);
    assert_eq!(r.modbus.holding(INVERTER, 2901), 500);
    assert_eq!(r.modbus.holding(INVERTER, 2705), 150);
}

#[tokio::test]
async fn test_manual_schedules_ignored_and_untouched() {
    let mut manual = schedule("manual", "obj-a", time(0, 0), 23, (10000, 90, 50));
    manual.is_manual_mode = true;
    manual.is_active = true;
    let mut r = rig(vec![manual], at(9, 0), true);

    assert_eq!(r.engine.tick().await.unwrap(), TickOutcome::InSync);
    assert!(r.modbus.writes().is_empty());
    assert!(r.store.get("manual").is_active);
}

#[tokio::test]
async fn test_at_most_one_active_window_across_day() {
    let schedules = vec![
        schedule("a", "obj-a", time(0, 0), 6, (10000, 20, 100)),
        schedule("b", "obj-a", time(4, 0), 6, (20000, 25, 100)),
        schedule("c", "obj-a", time(21, 0), 8, (30000, 30, 100)),
        schedule("d", "obj-a", time(12, 0), 3, (40000, 35, 100)),
    ];
    let mut r = rig(schedules, at(0, 0), true);

    for hour in 0..24 {
        for minute in [0, 30] {
            r.clock.set(at(hour, minute));
            r.engine.tick().await.unwrap();
            assert!(r.store.active_non_manual("obj-a").len() <= 1);
        }
    }

    // a, b and the wrapping c all cover 04:30; a starts earliest in the day.
    r.clock.set(at(4, 30));
    r.engine.tick().await.unwrap();
    assert_eq!(r.store.active_non_manual("obj-a"), vec!["a".to_string()]);

    r.clock.set(at(23, 0));
    r.engine.tick().await.unwrap();
    assert_eq!(r.store.active_non_manual("obj-a"), vec!["c".to_string()]);
}
