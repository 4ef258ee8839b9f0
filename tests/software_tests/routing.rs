use crate::software_tests::common::ObcEvent::*;
use crate::software_tests::common::*;
use std::{
    sync::{Arc, Mutex},
    time::Duration,
};
use OBC_Harness::{
    command::{ClientError, ObcControl},
    communication::{Apid, Frame, ResponseKind, RouterError, Status},
};

fn file_list_frame(correlation_id: u8) -> Frame {
    Frame::Response {
        kind: ResponseKind { apid: Apid::FileList, status: Status::Success },
        correlation_id,
        payload: vec![],
    }
}

#[test]
fn unanswered_command_times_out() {
    let harness = prepare_harness(vec![Expect("ping"), Sleep(Duration::from_millis(1500))]);

    let result = harness.client.ping();

    assert!(matches!(result, Err(ClientError::Router(RouterError::Timeout(_)))));
    assert!(result.unwrap_err().is_timeout());
    assert_eq!(harness.router().pending_count(), 0);

    harness.finish();
}

#[test]
fn unsolicited_frames_reach_observer() {
    let events = vec![Sleep(Duration::from_millis(100)), Send(file_list_frame(200)), Send(Frame::Unknown(vec![0x3E]))];
    let harness = prepare_harness(events);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    harness.router().set_unsolicited_observer(move |frame| sink.lock().unwrap().push(frame.clone()));

    std::thread::sleep(Duration::from_millis(400));

    assert_eq!(seen.lock().unwrap().as_slice(), &[file_list_frame(200), Frame::Unknown(vec![0x3E])]);
    harness.finish();
}

#[test]
fn frame_of_other_kind_does_not_resolve_command() {
    // the terminal command filter ignores a file list frame carrying the same id
    let events = vec![Expect("ping"), Send(file_list_frame(0)), Reply(b"pong")];
    let harness = prepare_harness(events);

    assert_eq!(harness.client.ping().unwrap(), "pong");
    assert_eq!(harness.router().held_count(), 1);

    harness.finish();
}

#[test]
fn teardown_cancels_waiting_command() {
    let harness = prepare_harness(vec![Expect("getState"), Sleep(Duration::from_millis(500))]);
    let router = harness.router().clone();

    let canceller = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(100));
        router.cancel_all();
        router.cancel_all();
    });

    let result = harness.client.get_state();
    assert!(matches!(result, Err(ClientError::Router(RouterError::Cancelled(_)))));

    canceller.join().unwrap();
    harness.finish();
}
