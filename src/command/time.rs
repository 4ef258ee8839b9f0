use super::{decode_ok, decode_text, ClientResult, CommandDescriptor, ObcClient};
use anyhow::Context;
use std::time::Duration;

const JUMP_TO_TIME: CommandDescriptor<()> = CommandDescriptor::new("jumpToTime {0}", decode_ok);
const ADVANCE_TIME: CommandDescriptor<()> = CommandDescriptor::new("advance_time {0}", decode_ok);
const CURRENT_TIME: CommandDescriptor<Duration> = CommandDescriptor::new("currentTime", decode_millis);

/// Mission time of the OBC. All values travel as whole milliseconds.
pub trait TimeControl {
    fn jump_to_time(&self, mission_time: Duration) -> ClientResult<()>;
    fn advance_time(&self, delta: Duration) -> ClientResult<()>;
    fn current_time(&self) -> ClientResult<Duration>;
}

impl TimeControl for ObcClient {
    fn jump_to_time(&self, mission_time: Duration) -> ClientResult<()> {
        self.execute(&JUMP_TO_TIME, &[&mission_time.as_millis()])
    }

    fn advance_time(&self, delta: Duration) -> ClientResult<()> {
        self.execute(&ADVANCE_TIME, &[&delta.as_millis()])
    }

    fn current_time(&self) -> ClientResult<Duration> {
        self.execute(&CURRENT_TIME, &[])
    }
}

fn decode_millis(payload: &[u8]) -> anyhow::Result<Duration> {
    let text = decode_text(payload)?;
    let millis = text.trim().parse().with_context(|| format!("Expected milliseconds, got {text:?}"))?;
    Ok(Duration::from_millis(millis))
}
