use crate::software_tests::common::ObcEvent::*;
use crate::software_tests::common::*;
use std::time::{Duration, Instant};
use OBC_Harness::command::{ClientError, I2c, I2cBus, I2cMode, ObcControl};

type TestResult = Result<(), Box<dyn std::error::Error>>;

#[test]
fn ping() -> TestResult {
    let harness = prepare_harness(vec![Expect("ping"), Reply(b"pong\n")]);

    assert_eq!(harness.client.ping()?, "pong");

    harness.finish();
    Ok(())
}

#[test]
fn wait_to_start_polls_until_started() -> TestResult {
    let events = vec![
        Expect("getState"),
        Reply(b"0"),
        Expect("getState"),
        Reply(b"0"),
        Expect("getState"),
        Reply(b"1"),
    ];
    let harness = prepare_harness(events);

    harness.client.wait_to_start(Duration::from_secs(5))?;

    harness.finish();
    Ok(())
}

#[test]
fn wait_to_start_gives_up() {
    // the OBC never answers, every getState times out
    let harness = prepare_harness(vec![Sleep(Duration::from_millis(1500))]);
    let client = OBC_Harness::command::ObcClient::new(harness.router().clone(), SECURITY_CODE)
        .with_timeout(Duration::from_millis(100));

    let start = Instant::now();
    let result = client.wait_to_start(Duration::from_millis(400));

    assert!(matches!(result, Err(ClientError::Timeout { .. })));
    assert!(start.elapsed() >= Duration::from_millis(400));
    assert!(start.elapsed() < Duration::from_millis(1200));
    assert_eq!(harness.router().pending_count(), 0);

    harness.finish();
}

#[test]
fn i2c_write_read() -> TestResult {
    let harness = prepare_harness(vec![Expect("i2c wr payload 18 abc"), Reply(b"xyz")]);

    assert_eq!(harness.client.i2c(I2cMode::WriteRead, I2cBus::Payload, 18, "abc")?, "xyz");

    harness.finish();
    Ok(())
}
