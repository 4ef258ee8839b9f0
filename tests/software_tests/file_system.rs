use crate::software_tests::common::ObcEvent::*;
use crate::software_tests::common::*;
use OBC_Harness::command::{ClientError, FileSystem};

type TestResult = Result<(), Box<dyn std::error::Error>>;

#[test]
fn lists_files() -> TestResult {
    let events = vec![
        Expect("listFiles /"),
        Reply(b"a.txt\t12\nlog\t0\n"),
        Expect("listFiles /"),
        Reply(b"a.txt\t12\nlog\t0\n"),
    ];
    let harness = prepare_harness(events);

    assert_eq!(harness.client.list_files("/")?, vec!["a.txt", "log"]);
    assert_eq!(
        harness.client.list_files_with_sizes("/")?,
        vec![("a.txt".to_string(), 12), ("log".to_string(), 0)]
    );

    harness.finish();
    Ok(())
}

#[test]
fn writes_file_with_bulk_data() -> TestResult {
    let content = vec![0xde, 0xad, 0x00, 0xbe, 0xef];
    let events = vec![ExpectWithData("writeFile /data/f", content.clone()), Reply(b"5\n")];
    let harness = prepare_harness(events);

    assert_eq!(harness.client.write_file("/data/f", &content)?, 5);

    harness.finish();
    Ok(())
}

#[test]
fn reads_raw_file_content() -> TestResult {
    let events = vec![Expect("readFile /data/f"), Reply(&[0x00, 0xff, 0x0a])];
    let harness = prepare_harness(events);

    assert_eq!(harness.client.read_file("/data/f")?, vec![0x00, 0xff, 0x0a]);

    harness.finish();
    Ok(())
}

#[test]
fn maintenance_commands() -> TestResult {
    let events = vec![
        Expect("sync_fs"),
        Reply(b""),
        Expect("erase 1"),
        Reply(b""),
        Expect("rm /data/f"),
        Reply(b""),
    ];
    let harness = prepare_harness(events);

    harness.client.sync_fs()?;
    harness.client.erase(1)?;
    harness.client.remove_file("/data/f")?;

    harness.finish();
    Ok(())
}

#[test]
fn error_frame_is_reported_as_remote_failure() {
    let events = vec![Expect("rm /missing"), Fail(2)];
    let harness = prepare_harness(events);

    let result = harness.client.remove_file("/missing");
    assert!(matches!(result, Err(ClientError::Remote { code: 2, .. })));
    assert!(!result.unwrap_err().is_timeout());

    harness.finish();
}
