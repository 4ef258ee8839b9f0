use super::{decode_text, ClientResult, CommandDescriptor, ObcClient};
use strum::Display;

const I2C: CommandDescriptor<String> = CommandDescriptor::new("i2c {0} {1} {2} {3}", decode_transfer);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum I2cBus {
    System,
    Payload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum I2cMode {
    #[strum(serialize = "w")]
    Write,
    #[strum(serialize = "wr")]
    WriteRead,
}

/// Raw I2C transfers through the OBC's test command
pub trait I2c {
    /// Sends `data` to `device` and returns what the OBC printed (the read bytes for
    /// [`I2cMode::WriteRead`])
    fn i2c(&self, mode: I2cMode, bus: I2cBus, device: u8, data: &str) -> ClientResult<String>;
}

impl I2c for ObcClient {
    fn i2c(&self, mode: I2cMode, bus: I2cBus, device: u8, data: &str) -> ClientResult<String> {
        self.execute(&I2C, &[&mode, &bus, &device, &data])
    }
}

fn decode_transfer(payload: &[u8]) -> anyhow::Result<String> {
    let output = decode_text(payload)?;
    if output.starts_with("Error") || output.starts_with("Unknown") {
        anyhow::bail!("I2C transfer failed: {output}");
    }
    Ok(output)
}
