//! Everything between the serial port and a command caller: link packets, downlink/uplink
//! frames, the response router and the thread feeding it.

mod frame;
mod link;
mod reader;
mod router;
mod timer;

pub use frame::{
    Apid, CorrelationId, Frame, FrameError, FrameFilter, ResponseKind, Status, TerminalRequest,
    Uplink, TERMINAL_COMMAND,
};
pub use link::{LinkPacket, LinkParseError, PacketAssembler};
pub use reader::FrameReader;
pub use router::{
    CorrelatedRequest, RequestHandle, ResponseRouter, RouterError, UnsolicitedObserver,
    HELD_FRAME_LIFETIME, MAXIMUM_HELD_FRAMES,
};
pub use timer::DeadlineTimer;

use std::{io::Write, sync::Mutex, time::Duration};

/// Read timeout of the serial port. The reader thread retries on expiry, so this only bounds
/// how quickly it notices a stop request.
pub const SERIAL_READ_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("link I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("transport is closed")]
    Closed,
    #[error("{0} bytes exceed the maximum packet size")]
    TooLarge(usize),
}

/// The sending half of the link to the OBC
pub trait Transport: Send + Sync {
    fn send(&self, bytes: &[u8]) -> Result<(), TransportError>;
}

/// Wraps every payload into a [`LinkPacket`] and writes it to the underlying stream
pub struct StreamTransport<W> {
    writer: Mutex<Option<W>>,
}

impl<W: Write + Send> StreamTransport<W> {
    pub fn new(writer: W) -> Self {
        StreamTransport { writer: Mutex::new(Some(writer)) }
    }

    /// Drops the writer. Every later send fails with [`TransportError::Closed`].
    pub fn close(&self) {
        self.writer.lock().unwrap().take();
    }
}

impl<W: Write + Send> Transport for StreamTransport<W> {
    fn send(&self, bytes: &[u8]) -> Result<(), TransportError> {
        if bytes.len() > LinkPacket::MAXIMUM_DATA_LENGTH {
            return Err(TransportError::TooLarge(bytes.len()));
        }

        let mut writer = self.writer.lock().unwrap();
        let writer = writer.as_mut().ok_or(TransportError::Closed)?;
        writer.write_all(&LinkPacket(bytes.to_vec()).serialize())?;
        writer.flush()?;
        Ok(())
    }
}

pub type SerialTransport = StreamTransport<Box<dyn serialport::SerialPort>>;

/// Opens the serial port and splits it into a transport and a read half for [`FrameReader`]
pub fn open_serial(
    path: &str,
    baudrate: u32,
) -> serialport::Result<(SerialTransport, Box<dyn serialport::SerialPort>)> {
    let port = serialport::new(path, baudrate).timeout(SERIAL_READ_TIMEOUT).open()?;
    let reader = port.try_clone()?;
    Ok((StreamTransport::new(port), reader))
}
