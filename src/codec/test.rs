use std::sync::Arc;

use rand::Rng;
use serde_json::Value;

use super::{decode_ack, AckError, Codec};
use crate::action::{ActionType, Registry};
use crate::clock::FixedClock;
use crate::data::{Backing, DataQueue};
use crate::driver::WakeReason;
use crate::record::{
    Acceleration, BleDevice, Cellular, DataFlags, EnergySource, Humidity, Light, LogChunk,
    LogEntry, Magnetic, Payload, Position, Pressure, StatsReport, Temperature, WakeUp,
};

fn setup() -> (Arc<FixedClock>, Registry, DataQueue, Codec) {
    let clock = Arc::new(FixedClock::new(1_000));
    let registry = Registry::new(clock.clone());
    let queue = DataQueue::new(Backing::Heap, clock.clone());
    (clock, registry, queue, Codec::new())
}

fn one_of_each() -> Vec<Payload> {
    vec![
        Payload::Cellular(Cellular {
            rsrp_dbm: -70,
            rssi_dbm: -75,
            rsrq_db: 5,
            snr_db: -5,
            ecl: 1,
            cell_id: 155,
            tx_power_dbm: 21,
            earfcn: 12_412,
        }),
        Payload::Humidity(Humidity { percentage: 70 }),
        Payload::Pressure(Pressure { pascal_x100: 9_000_000 }),
        Payload::Temperature(Temperature { c_x100: -2_300 }),
        Payload::Light(Light { lux: 4_500, uv_index_x1000: 3_000 }),
        Payload::Acceleration(Acceleration { x_gx1000: 5, y_gx1000: -1, z_gx1000: 0 }),
        Payload::Position(Position {
            latitude_x10e7: 522_231_170,
            longitude_x10e7: -743_910,
            radius_metres: 5,
            altitude_metres: 65,
            speed_mps: 0,
        }),
        Payload::Magnetic(Magnetic { tesla_x1000: 1_500 }),
        Payload::Ble(BleDevice::new("NINA-B1:354", 89)),
        Payload::WakeUp(WakeUp::new(WakeReason::Orientation)),
        Payload::EnergySource(EnergySource { source: 2 }),
        Payload::Statistics(StatsReport::default()),
        Payload::Log(LogChunk::new(
            1,
            0,
            0,
            &[
                LogEntry { timestamp: 235_825, event: 4, parameter: 1 },
                LogEntry { timestamp: 235_827, event: 5, parameter: 0 },
            ],
        )),
    ]
}

// Encode until the cursor runs dry, returning the datagrams.
fn drain(codec: &mut Codec, name: &str, buf_len: usize, registry: &mut Registry, queue: &mut DataQueue) -> Vec<String> {
    let mut buf = vec![0u8; buf_len];
    let mut out = Vec::new();
    loop {
        let res = codec.encode(name, &mut buf, registry, queue);
        assert!(
            !res.not_enough_room_for_header && !res.not_enough_room_for_even_one_data,
            "buffer of {} byte(s) too small",
            buf_len
        );
        if res.size == 0 {
            break;
        }
        out.push(String::from_utf8(buf[..res.size].to_vec()).unwrap());
    }
    out
}

#[test]
fn test_encode_empty_queue() {
    let (_clock, mut registry, mut queue, mut codec) = setup();
    let mut buf = [0u8; 512];
    codec.prepare(&mut queue);
    let out = codec.encode("DevName", &mut buf, &mut registry, &mut queue);
    assert_eq!(out.size, 0);
    assert!(!out.needs_ack);
    assert!(!out.not_enough_room_for_header);
    assert!(!out.not_enough_room_for_even_one_data);
}

#[test]
fn test_encode_single_humidity_exact() {
    let (_clock, mut registry, mut queue, mut codec) = setup();
    queue
        .alloc(
            None,
            DataFlags::empty(),
            &Payload::Humidity(Humidity { percentage: 70 }),
            &mut registry,
        )
        .unwrap();

    let mut buf = [0u8; 512];
    codec.prepare(&mut queue);
    let out = codec.encode("dev", &mut buf, &mut registry, &mut queue);
    assert_eq!(
        std::str::from_utf8(&buf[..out.size]).unwrap(),
        "{\"v\":1,\"n\":\"dev\",\"i\":0,\"a\":0,\"r\":[{\"hum\":{\"t\":1000,\"nWh\":0,\"d\":{\"%\":70}}}]}"
    );
    assert!(!out.needs_ack);
    assert_eq!(codec.last_index(), 0);
    // The record needed no ack and was freed during encoding.
    assert_eq!(queue.count(), 0);
}

#[test]
fn test_encode_every_kind_is_valid_json() {
    let (clock, mut registry, mut queue, mut codec) = setup();
    for payload in one_of_each() {
        queue.alloc(None, DataFlags::empty(), &payload, &mut registry).unwrap();
        clock.advance(1);
    }

    codec.prepare(&mut queue);
    let reports = drain(&mut codec, "357520071700641", 1024, &mut registry, &mut queue);
    assert!(!reports.is_empty());

    let mut records = 0;
    for report in &reports {
        let value: Value = serde_json::from_str(report).expect("invalid JSON emitted");
        assert_eq!(value["v"], 1);
        assert_eq!(value["n"], "357520071700641");
        assert_eq!(value["a"], 0);
        records += value["r"].as_array().unwrap().len();
    }
    assert_eq!(records, one_of_each().len());
    assert_eq!(queue.count(), 0);
}

#[test]
fn test_energy_cost_rides_with_record() {
    let (_clock, mut registry, mut queue, mut codec) = setup();
    let action = registry.add(ActionType::MeasureHumidity, &mut queue).unwrap();
    queue
        .alloc(
            Some(action),
            DataFlags::empty(),
            &Payload::Humidity(Humidity { percentage: 1 }),
            &mut registry,
        )
        .unwrap();
    registry.set_energy_cost(action, 123_456);
    registry.complete(action);

    codec.prepare(&mut queue);
    let reports = drain(&mut codec, "dev", 512, &mut registry, &mut queue);
    assert_eq!(reports.len(), 1);
    let value: Value = serde_json::from_str(&reports[0]).unwrap();
    assert_eq!(value["r"][0]["hum"]["nWh"], 123_456);
}

// Records that require an ack survive any number of encode passes and
// only leave the queue on ack(). Successive passes are identical in
// everything but the report index.
#[test]
fn test_ack_data_kept_until_acked() {
    let (clock, mut registry, mut queue, mut codec) = setup();
    let payloads = one_of_each();
    for payload in &payloads {
        queue.alloc(None, DataFlags::REQUIRES_ACK, payload, &mut registry).unwrap();
        clock.advance(1);
    }

    codec.prepare(&mut queue);
    let first = drain(&mut codec, "A name with spaces", 2048, &mut registry, &mut queue);
    assert_eq!(queue.count(), payloads.len());

    codec.prepare(&mut queue);
    let second = drain(&mut codec, "A name with spaces", 2048, &mut registry, &mut queue);
    assert_eq!(queue.count(), payloads.len());

    let total = |v: &[String]| v.iter().map(String::len).sum::<usize>();
    assert_eq!(total(&first), total(&second));
    for (a, b) in first.iter().zip(&second) {
        assert!(a.starts_with("{\"v\":1,\"n\":\"A name with spaces\",\"i\":"));
        // Identical outside the index field.
        let tail = |s: &str| s[s.find(",\"a\":").unwrap()..].to_string();
        assert_eq!(tail(a), tail(b));
        let json: Value = serde_json::from_str(a).unwrap();
        assert_eq!(json["a"], 1);
    }

    // No ack() between sessions, so every record was re-encoded with
    // a fresh, strictly increasing index.
    codec.ack(&mut registry, &mut queue);
    assert_eq!(queue.count(), 0);
}

// Resumable encoding into a small buffer: every record is emitted
// exactly once across the session, ack-requiring ones stay queued.
#[test]
fn test_resumable_encode_small_buffer() {
    let (clock, mut registry, mut queue, mut codec) = setup();
    let mut rng = rand::thread_rng();

    let mut ack_count = 0;
    for _ in 0..50 {
        let payload = match rng.gen_range(0..6) {
            0 => Payload::Humidity(Humidity { percentage: rng.gen_range(0..100) }),
            1 => Payload::Pressure(Pressure { pascal_x100: rng.gen_range(0..200_000) }),
            2 => Payload::Temperature(Temperature { c_x100: rng.gen_range(-4_000..8_000) }),
            3 => Payload::Magnetic(Magnetic { tesla_x1000: rng.gen_range(0..10_000) }),
            4 => Payload::EnergySource(EnergySource { source: rng.gen_range(0..3) }),
            _ => Payload::Acceleration(Acceleration {
                x_gx1000: rng.gen_range(-2_000..2_000),
                y_gx1000: rng.gen_range(-2_000..2_000),
                z_gx1000: rng.gen_range(-2_000..2_000),
            }),
        };
        let flags = if rng.gen_bool(0.5) {
            ack_count += 1;
            DataFlags::REQUIRES_ACK
        } else {
            DataFlags::empty()
        };
        queue.alloc(None, flags, &payload, &mut registry).unwrap();
        clock.advance(1);
    }

    codec.prepare(&mut queue);
    let reports = drain(&mut codec, "dev", 256, &mut registry, &mut queue);
    assert!(reports.len() > 1, "256-byte buffer should take several passes");

    // Unique timestamps make record identities checkable.
    let mut seen = std::collections::HashSet::new();
    for report in &reports {
        assert!(report.len() <= 256);
        let value: Value = serde_json::from_str(report).unwrap();
        for item in value["r"].as_array().unwrap() {
            let record = item.as_object().unwrap().values().next().unwrap();
            assert!(seen.insert(record["t"].as_i64().unwrap()), "record emitted twice");
        }
    }
    assert_eq!(seen.len(), 50);
    assert_eq!(queue.count(), ack_count);

    codec.ack(&mut registry, &mut queue);
    assert_eq!(queue.count(), 0);
}

#[test]
fn test_send_now_encoded_first() {
    let (clock, mut registry, mut queue, mut codec) = setup();
    queue
        .alloc(
            None,
            DataFlags::empty(),
            &Payload::Humidity(Humidity { percentage: 1 }),
            &mut registry,
        )
        .unwrap();
    clock.advance(100);
    queue
        .alloc(
            None,
            DataFlags::SEND_NOW,
            &Payload::WakeUp(WakeUp::new(WakeReason::Rtc)),
            &mut registry,
        )
        .unwrap();

    codec.prepare(&mut queue);
    let reports = drain(&mut codec, "dev", 512, &mut registry, &mut queue);
    let value: Value = serde_json::from_str(&reports[0]).unwrap();
    let first = value["r"][0].as_object().unwrap();
    assert!(first.contains_key("wkp"));
}

#[test]
fn test_buffer_too_small() {
    let (_clock, mut registry, mut queue, mut codec) = setup();
    queue
        .alloc(
            None,
            DataFlags::empty(),
            &Payload::Statistics(StatsReport::default()),
            &mut registry,
        )
        .unwrap();
    codec.prepare(&mut queue);

    // Not even the framing fits.
    let mut tiny = [0u8; 8];
    let out = codec.encode("0123456789012345678901234567890", &mut tiny, &mut registry, &mut queue);
    assert!(out.not_enough_room_for_header);
    assert_eq!(out.size, 0);

    // Framing fits, the record does not.
    let mut small = [0u8; 64];
    let out = codec.encode("dev", &mut small, &mut registry, &mut queue);
    assert!(out.not_enough_room_for_even_one_data);
    assert_eq!(out.size, 0);
    assert_eq!(queue.count(), 1);

    // Neither failure consumed a report index.
    let mut buf = [0u8; 1024];
    let out = codec.encode("dev", &mut buf, &mut registry, &mut queue);
    assert!(out.size > 0);
    let value: Value = serde_json::from_str(std::str::from_utf8(&buf[..out.size]).unwrap()).unwrap();
    assert_eq!(value["i"], 0);
}

#[test]
fn test_report_index_increments_and_wraps() {
    let (_clock, mut registry, mut queue, mut codec) = setup();
    for i in 0..3 {
        queue
            .alloc(
                None,
                DataFlags::empty(),
                &Payload::Humidity(Humidity { percentage: i }),
                &mut registry,
            )
            .unwrap();
    }

    // One record per pass thanks to a buffer sized just so.
    codec.prepare(&mut queue);
    let mut buf = [0u8; 96];
    let mut indices = Vec::new();
    loop {
        let out = codec.encode("d", &mut buf, &mut registry, &mut queue);
        if out.size == 0 {
            break;
        }
        let value: Value = serde_json::from_str(std::str::from_utf8(&buf[..out.size]).unwrap()).unwrap();
        indices.push(value["i"].as_i64().unwrap());
        assert_eq!(codec.last_index() as i64, *indices.last().unwrap());
    }
    assert_eq!(indices, vec![0, 1, 2]);

    // The index is 31-bit and wraps to zero, not negative.
    codec.set_report_index(i32::MAX);
    queue
        .alloc(
            None,
            DataFlags::empty(),
            &Payload::Humidity(Humidity { percentage: 9 }),
            &mut registry,
        )
        .unwrap();
    codec.prepare(&mut queue);
    let mut big = [0u8; 512];
    let out = codec.encode("d", &mut big, &mut registry, &mut queue);
    assert!(out.size > 0);
    assert_eq!(codec.last_index(), i32::MAX);

    queue
        .alloc(
            None,
            DataFlags::empty(),
            &Payload::Humidity(Humidity { percentage: 10 }),
            &mut registry,
        )
        .unwrap();
    codec.prepare(&mut queue);
    let out = codec.encode("d", &mut big, &mut registry, &mut queue);
    assert!(out.size > 0);
    assert_eq!(codec.last_index(), 0);
}

#[test]
fn test_decode_ack() {
    let buf = b"{\"n\":\"357520071700641\",\"i\":4}";
    assert_eq!(decode_ack(buf, "357520071700641"), Ok(4));
    // Name mismatches, at either end and by length.
    assert_eq!(decode_ack(buf, "357520071700640"), Err(AckError::NoNameMatch));
    assert_eq!(decode_ack(buf, "257520071700641"), Err(AckError::NoNameMatch));
    assert_eq!(decode_ack(buf, "35752007170064"), Err(AckError::NoNameMatch));
    assert_eq!(decode_ack(buf, "3575200717006411"), Err(AckError::NoNameMatch));

    // Maximum-length name.
    let max = b"{\"n\":\"01234567890123456789012345678901\",\"i\":9}";
    let max_name = "01234567890123456789012345678901";
    assert_eq!(decode_ack(max, max_name), Ok(9));
    // One character more is a caller error.
    assert_eq!(
        decode_ack(max, "012345678901234567890123456789012"),
        Err(AckError::BadParameter)
    );

    // Maximum index and whitespace in every tolerated spot.
    let big = b"{\"n\":\"01234567890123456789012345678901\",\"i\":2147483647}";
    assert_eq!(decode_ack(big, max_name), Ok(2_147_483_647));
    let spaced = b" { \"n\" : \"01234567890123456789012345678901\" , \"i\" : 2147483647 }";
    assert_eq!(decode_ack(spaced, max_name), Ok(2_147_483_647));

    // Alphabetic names.
    assert_eq!(
        decode_ack(b"{\"n\":\"abcdefghijklmnopqrstuvwxyz\",\"i\":7}", "abcdefghijklmnopqrstuvwxyz"),
        Ok(7)
    );

    // Trailing bytes after the closing brace are ignored.
    let trailing = b"{\"n\":\"dev\",\"i\":12}xxxxx";
    assert_eq!(decode_ack(trailing, "dev"), Ok(12));
}

#[test]
fn test_decode_ack_rejects_misformats() {
    let name = "01234567890123456789012345678901";
    let cases: &[&[u8]] = &[
        b"{'n':'01234567890123456789012345678901','i':2147483647}",
        b"{\"n\"\"01234567890123456789012345678901\",\"i\":2147483647}",
        b"{\"n\":01234567890123456789012345678901,\"i\":2147483647}",
        b"\"n\":\"01234567890123456789012345678901\",\"i\":2147483647}",
        b"{\"n\":\"01234567890123456789012345678901\",\"i\":2147483647",
        b"\"n\":\"01234567890123456789012345678901\",\"i\":2147483647",
        b"(\"n\":\"01234567890123456789012345678901\",\"i\":2147483647)",
        b"[\"n\":\"01234567890123456789012345678901\",\"i\":2147483647]",
        b"{\"n\":\"01234567890123456789012345678901\"\"i\":2147483647}",
        b"{\"n\":\"01234567890123456789012345678901\",\"d\":2147483647}",
        b"{\"i\":\"01234567890123456789012345678901\",\"n\":2147483647}",
        // Out of index range, signed, empty name.
        b"{\"n\":\"01234567890123456789012345678901\",\"i\":2147483648}",
        b"{\"n\":\"01234567890123456789012345678901\",\"i\":-1}",
        b"{\"n\":\"\",\"i\":4}",
    ];
    for case in cases {
        assert_eq!(decode_ack(case, name), Err(AckError::NotAckMessage), "{:?}", case);
    }
}

// A thousand monkeys never type a valid ack.
#[test]
fn test_decode_ack_fuzz() {
    let mut rng = rand::thread_rng();
    let mut buf = [0u8; 128];
    for _ in 0..1_000 {
        for b in buf.iter_mut() {
            *b = rng.gen_range(b'!'..=b'~');
        }
        assert_eq!(decode_ack(&buf, ""), Err(AckError::NotAckMessage));
    }
}
