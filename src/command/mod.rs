//! The remote OBC as a typed client. Every command is a [`CommandDescriptor`] executed through
//! [`ObcClient::execute`]; the capability traits only pick descriptors and arguments.

use crate::communication::{
    Apid, CorrelatedRequest, Frame, FrameFilter, ResponseRouter, Status, TerminalRequest,
};
use anyhow::Context;
use std::{fmt::Display, sync::Arc, time::Duration};

mod error;
mod file_system;
mod formatter;
mod i2c;
mod obc;
mod time;

pub use error::ClientError;
pub use file_system::FileSystem;
pub use formatter::{CommandFormatter, FormatError};
pub use i2c::{I2c, I2cBus, I2cMode};
pub use obc::ObcControl;
pub use time::TimeControl;

pub type ClientResult<T> = Result<T, ClientError>;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// A command template together with the decoder for its response payload
pub struct CommandDescriptor<T> {
    pub template: &'static str,
    pub filter: FrameFilter,
    pub decode: fn(&[u8]) -> anyhow::Result<T>,
}

impl<T> CommandDescriptor<T> {
    /// Descriptor for a terminal command, answered on the terminal APID
    pub const fn new(template: &'static str, decode: fn(&[u8]) -> anyhow::Result<T>) -> Self {
        CommandDescriptor { template, filter: FrameFilter::Apid(Apid::Terminal), decode }
    }

    pub const fn with_filter(mut self, filter: FrameFilter) -> Self {
        self.filter = filter;
        self
    }
}

/// Client for one OBC. Holds the single formatter and router every capability goes through.
pub struct ObcClient {
    router: Arc<ResponseRouter>,
    formatter: CommandFormatter,
    security_code: u32,
    timeout: Duration,
}

impl ObcClient {
    pub fn new(router: Arc<ResponseRouter>, security_code: u32) -> Self {
        ObcClient { router, formatter: CommandFormatter::default(), security_code, timeout: DEFAULT_TIMEOUT }
    }

    /// Sets how long a single command waits for its response
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_formatter(mut self, formatter: CommandFormatter) -> Self {
        self.formatter = formatter;
        self
    }

    pub fn router(&self) -> &Arc<ResponseRouter> {
        &self.router
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn execute<T>(
        &self,
        descriptor: &CommandDescriptor<T>,
        positional: &[&dyn Display],
    ) -> ClientResult<T> {
        self.run(descriptor, positional, &[], None, self.timeout)
    }

    pub fn execute_with_keywords<T>(
        &self,
        descriptor: &CommandDescriptor<T>,
        positional: &[&dyn Display],
        keyword: &[(&str, &dyn Display)],
    ) -> ClientResult<T> {
        self.run(descriptor, positional, keyword, None, self.timeout)
    }

    /// Attaches a raw data block after the formatted command line
    pub fn execute_with_data<T>(
        &self,
        descriptor: &CommandDescriptor<T>,
        positional: &[&dyn Display],
        data: &[u8],
    ) -> ClientResult<T> {
        self.run(descriptor, positional, &[], Some(data), self.timeout)
    }

    fn run<T>(
        &self,
        descriptor: &CommandDescriptor<T>,
        positional: &[&dyn Display],
        keyword: &[(&str, &dyn Display)],
        data: Option<&[u8]>,
        timeout: Duration,
    ) -> ClientResult<T> {
        let command_line = self.formatter.format(descriptor.template, positional, keyword)?;
        let correlation_id = self.router.allocate_id();
        log::debug!("Sending {command_line:?} as request {correlation_id}");

        let uplink = TerminalRequest {
            correlation_id,
            command_line: command_line.clone(),
            data: data.map(<[u8]>::to_vec),
        }
        .into_uplink(self.security_code);
        let request =
            CorrelatedRequest::new(correlation_id, uplink.encode(), descriptor.filter, timeout);

        match self.router.execute(request)? {
            Frame::Response { kind, payload, .. } => match kind.status {
                Status::Success => (descriptor.decode)(&payload)
                    .with_context(|| format!("Response to {command_line:?}"))
                    .map_err(ClientError::Decode),
                Status::Error(code) => {
                    log::warn!("{command_line:?} failed with code {code}");
                    Err(ClientError::Remote { command: command_line, code })
                }
            },
            frame => Err(ClientError::Decode(anyhow::anyhow!("Unexpected frame {frame:?}"))),
        }
    }
}

/// Terminal output as text, without the trailing line break
pub fn decode_text(payload: &[u8]) -> anyhow::Result<String> {
    let text = std::str::from_utf8(payload).context("Response is not valid UTF-8")?;
    Ok(text.trim_end_matches(['\r', '\n']).to_string())
}

/// Ignores whatever the command printed
pub fn decode_unit(_payload: &[u8]) -> anyhow::Result<()> {
    Ok(())
}

/// Commands that acknowledge with a plain `OK`
pub fn decode_ok(payload: &[u8]) -> anyhow::Result<()> {
    match decode_text(payload)?.as_str() {
        "OK" => Ok(()),
        other => anyhow::bail!("Expected OK, got {other:?}"),
    }
}

pub fn decode_raw(payload: &[u8]) -> anyhow::Result<Vec<u8>> {
    Ok(payload.to_vec())
}
