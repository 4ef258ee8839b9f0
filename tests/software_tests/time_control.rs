use crate::software_tests::common::ObcEvent::*;
use crate::software_tests::common::*;
use std::time::Duration;
use OBC_Harness::command::{ClientError, TimeControl};

type TestResult = Result<(), Box<dyn std::error::Error>>;

#[test]
fn time_is_sent_in_milliseconds() -> TestResult {
    let events = vec![
        Expect("jumpToTime 90000"),
        Reply(b"OK"),
        Expect("advance_time 1500"),
        Reply(b"OK"),
        Expect("currentTime"),
        Reply(b"91500"),
    ];
    let harness = prepare_harness(events);

    harness.client.jump_to_time(Duration::from_secs(90))?;
    harness.client.advance_time(Duration::from_millis(1500))?;
    assert_eq!(harness.client.current_time()?, Duration::from_millis(91500));

    harness.finish();
    Ok(())
}

#[test]
fn usage_text_instead_of_ok_is_a_decode_error() {
    let events = vec![Expect("jumpToTime 0"), Reply(b"jumpToTime <time>\n")];
    let harness = prepare_harness(events);

    assert!(matches!(harness.client.jump_to_time(Duration::ZERO), Err(ClientError::Decode(_))));

    harness.finish();
}
