use super::{decode_text, ClientError, ClientResult, CommandDescriptor, ObcClient};
use std::time::{Duration, Instant};

const PING: CommandDescriptor<String> = CommandDescriptor::new("ping", decode_text);
const GET_STATE: CommandDescriptor<String> = CommandDescriptor::new("getState", decode_text);

/// `getState` answer once the mission loop is running
const STARTED_STATE: &str = "1";
const INITIAL_POLL_INTERVAL: Duration = Duration::from_millis(50);
const MAXIMUM_POLL_INTERVAL: Duration = Duration::from_secs(1);

pub trait ObcControl {
    fn ping(&self) -> ClientResult<String>;
    fn get_state(&self) -> ClientResult<String>;
    /// Polls the OBC state with exponential backoff until it reports it has started
    fn wait_to_start(&self, timeout: Duration) -> ClientResult<()>;
}

impl ObcControl for ObcClient {
    fn ping(&self) -> ClientResult<String> {
        self.execute(&PING, &[])
    }

    fn get_state(&self) -> ClientResult<String> {
        self.execute(&GET_STATE, &[])
    }

    fn wait_to_start(&self, timeout: Duration) -> ClientResult<()> {
        let start = Instant::now();
        let mut interval = INITIAL_POLL_INTERVAL;

        loop {
            let remaining = timeout.saturating_sub(start.elapsed());
            if remaining.is_zero() {
                log::error!("OBC did not start within {timeout:?}");
                return Err(ClientError::Timeout { waited: start.elapsed() });
            }

            match self.run(&GET_STATE, &[], &[], None, self.timeout.min(remaining)) {
                Ok(state) if state == STARTED_STATE => {
                    log::info!("OBC started after {:?}", start.elapsed());
                    return Ok(());
                }
                Ok(state) => log::debug!("OBC state is {state:?}, waiting"),
                Err(e) if e.is_timeout() => log::debug!("No answer to getState yet"),
                Err(e) => return Err(e),
            }

            std::thread::sleep(interval.min(timeout.saturating_sub(start.elapsed())));
            interval = (interval * 2).min(MAXIMUM_POLL_INTERVAL);
        }
    }
}
