use super::frame::Frame;
use super::link::{LinkParseError, PacketAssembler};
use super::router::ResponseRouter;
use crate::telemetry::{BeaconDecoder, TelemetrySnapshot};
use std::{
    io::{ErrorKind, Read},
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::Sender,
        Arc,
    },
    thread::{self, JoinHandle},
};

const READ_CHUNK_SIZE: usize = 256;

/// The single thread that turns bytes from the OBC into frames. Responses go to the router,
/// beacons are decoded and sent to the beacon sink, everything else is reported as
/// unsolicited.
pub struct FrameReader {
    stop: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
}

impl FrameReader {
    pub fn spawn<R: Read + Send + 'static>(
        source: R,
        router: Arc<ResponseRouter>,
        decoder: Arc<BeaconDecoder>,
        beacons: Sender<TelemetrySnapshot>,
    ) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = stop.clone();
        let thread_handle = thread::spawn(move || {
            read_frames(source, &router, &decoder, &beacons, &thread_stop);
        });

        FrameReader { stop, thread_handle: Some(thread_handle) }
    }

    /// Asks the thread to stop and waits for it. Only returns once the source yields, so
    /// blocking sources need a read timeout.
    pub fn stop(mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }

    pub fn is_finished(&self) -> bool {
        self.thread_handle.as_ref().map_or(true, JoinHandle::is_finished)
    }
}

impl Drop for FrameReader {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

fn read_frames(
    mut source: impl Read,
    router: &ResponseRouter,
    decoder: &BeaconDecoder,
    beacons: &Sender<TelemetrySnapshot>,
    stop: &AtomicBool,
) {
    let mut assembler = PacketAssembler::new();
    let mut chunk = [0; READ_CHUNK_SIZE];

    while !stop.load(Ordering::Relaxed) {
        match source.read(&mut chunk) {
            Ok(0) => {
                if assembler.buffered() > 0 {
                    log::warn!("Link closed with {} bytes of an incomplete packet", assembler.buffered());
                }
                router.close("end of stream");
                return;
            }
            Ok(n) => assembler.extend(&chunk[..n]),
            Err(e) => match e.kind() {
                ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted => continue,
                _ => {
                    router.close(e.to_string());
                    return;
                }
            },
        }

        while let Some(result) = assembler.next_packet() {
            let packet = match result {
                Ok(packet) => packet,
                Err(LinkParseError::InvalidHeader(byte)) => {
                    log::trace!("Skipping {byte:#04x} while looking for a packet header");
                    continue;
                }
                Err(LinkParseError::InvalidCRC) => {
                    log::warn!("Dropping link packet with invalid CRC");
                    continue;
                }
                Err(LinkParseError::InvalidLength(length)) => {
                    log::warn!("Dropping link packet announcing {length} bytes");
                    continue;
                }
                Err(LinkParseError::Io(e)) => {
                    log::error!("Unexpected I/O error while assembling packets: {e}");
                    continue;
                }
            };

            match Frame::decode(packet.data()) {
                Frame::Beacon(payload) => handle_beacon(&payload, decoder, beacons),
                frame => router.deliver(frame),
            }
        }
    }
}

fn handle_beacon(payload: &[u8], decoder: &BeaconDecoder, beacons: &Sender<TelemetrySnapshot>) {
    let decoded = match decoder.decode(payload) {
        Ok(decoded) => decoded,
        Err(e) => {
            log::error!("Could not decode beacon: {e}");
            return;
        }
    };

    if let Some(trailing) = decoded.trailing {
        log::warn!("Beacon decoded with {trailing}");
    }
    if beacons.send(decoded.snapshot).is_err() {
        log::debug!("Beacon receiver is gone, dropping snapshot");
    }
}
