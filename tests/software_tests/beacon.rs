use crate::software_tests::common::ObcEvent::*;
use crate::software_tests::common::*;
use std::time::Duration;
use OBC_Harness::{
    command::ObcControl,
    telemetry::{BeaconDecoder, CategorySpec, FieldSpec},
};

type TestResult = Result<(), Box<dyn std::error::Error>>;

#[test]
fn beacon_is_decoded_into_snapshot() -> TestResult {
    let harness = prepare_harness(vec![Beacon(vec![0x34, 0x12])]);

    let snapshot = harness.beacons.recv_timeout(Duration::from_secs(1))?;
    assert_eq!(snapshot.value("02: Program State", "Program CRC"), Some(0x1234));
    assert_eq!(snapshot.to_string(), "02: Program State\n    Program CRC: 0x1234\n");

    harness.finish();
    Ok(())
}

#[test]
fn beacon_between_request_and_response() -> TestResult {
    let events = vec![Expect("ping"), Beacon(vec![0xEF, 0xBE]), Reply(b"pong")];
    let harness = prepare_harness(events);

    assert_eq!(harness.client.ping()?, "pong");
    let snapshot = harness.beacons.recv_timeout(Duration::from_secs(1))?;
    assert_eq!(snapshot.value("02: Program State", "Program CRC"), Some(0xBEEF));

    harness.finish();
    Ok(())
}

#[test]
fn multi_category_beacon() -> TestResult {
    let decoder = BeaconDecoder::new(vec![
        CategorySpec::from_fields(
            "01: Boot",
            vec![FieldSpec::decimal("Boot counter", 12), FieldSpec::flags("Boot reason", 4)],
        )?,
        CategorySpec::new("02: Program State", vec![FieldSpec::hex("Program CRC", 16)], 16)?,
    ])?;
    let harness = prepare_harness_with_decoder(vec![Beacon(vec![0x2A, 0x50, 0x34, 0x12])], decoder);

    let snapshot = harness.beacons.recv_timeout(Duration::from_secs(1))?;
    assert_eq!(snapshot.value("01: Boot", "Boot counter"), Some(42));
    assert_eq!(snapshot.value("01: Boot", "Boot reason"), Some(0b0101));
    assert_eq!(snapshot.value("02: Program State", "Program CRC"), Some(0x1234));

    harness.finish();
    Ok(())
}

#[test]
fn truncated_beacon_is_dropped() -> TestResult {
    let harness = prepare_harness(vec![Beacon(vec![0x34]), Beacon(vec![0x01, 0x00])]);

    let snapshot = harness.beacons.recv_timeout(Duration::from_secs(1))?;
    assert_eq!(snapshot.value("02: Program State", "Program CRC"), Some(0x0001));

    harness.finish();
    Ok(())
}
