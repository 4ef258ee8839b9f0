use std::{
    fmt::Debug,
    os::unix::net::UnixStream,
    sync::{mpsc, Arc},
    thread::{self, JoinHandle},
    time::Duration,
};

use OBC_Harness::{
    command::ObcClient,
    communication::{
        Apid, Frame, FrameReader, LinkPacket, ResponseKind, ResponseRouter, Status,
        StreamTransport, TerminalRequest, Uplink,
    },
    telemetry::{BeaconDecoder, TelemetrySnapshot},
};

pub const SECURITY_CODE: u32 = 0xBB0B_DEAD;
pub const COMMAND_TIMEOUT: Duration = Duration::from_millis(1000);

pub enum ObcEvent {
    /// The OBC shall receive this command line without bulk data
    Expect(&'static str),
    /// The OBC shall receive this command line followed by the given bulk data
    ExpectWithData(&'static str, Vec<u8>),
    /// The OBC answers the last received command successfully with this output
    Reply(&'static [u8]),
    /// The OBC answers the last received command with an error code
    Fail(u8),
    /// The OBC broadcasts a beacon with the given payload
    Beacon(Vec<u8>),
    /// The OBC sends an arbitrary frame
    Send(Frame),
    /// Makes the OBC pause, e.g. to let a request time out
    Sleep(Duration),
}

impl Debug for ObcEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Expect(line) => f.debug_tuple("Expect").field(line).finish(),
            Self::ExpectWithData(line, data) => {
                f.debug_tuple("ExpectWithData").field(line).field(&data.len()).finish()
            }
            Self::Reply(output) => f.debug_tuple("Reply").field(&String::from_utf8_lossy(output)).finish(),
            Self::Fail(code) => f.debug_tuple("Fail").field(code).finish(),
            Self::Beacon(payload) => f.debug_tuple("Beacon").field(payload).finish(),
            Self::Send(frame) => f.debug_tuple("Send").field(frame).finish(),
            Self::Sleep(d) => f.debug_tuple("Sleep").field(d).finish(),
        }
    }
}

/// Plays the OBC side of the link. Every received uplink is checked against the expected
/// events; a mismatch panics the simulation thread and fails the test in [`Harness::finish`].
struct SimulatedObc {
    stream: UnixStream,
    last_correlation_id: u8,
    sequence: u32,
}

impl SimulatedObc {
    fn run(mut self, events: Vec<ObcEvent>) {
        for event in events {
            println!("OBC: {event:?}");
            match event {
                ObcEvent::Expect(line) => {
                    let request = self.receive();
                    assert_eq!(request.command_line, line);
                    assert_eq!(request.data, None);
                }
                ObcEvent::ExpectWithData(line, data) => {
                    let request = self.receive();
                    assert_eq!(request.command_line, line);
                    assert_eq!(request.data, Some(data));
                }
                ObcEvent::Reply(output) => self.respond(Status::Success, output),
                ObcEvent::Fail(code) => self.respond(Status::Error(code), &[]),
                ObcEvent::Beacon(payload) => self.send(&Frame::Beacon(payload)),
                ObcEvent::Send(frame) => self.send(&frame),
                ObcEvent::Sleep(d) => thread::sleep(d),
            }
        }
    }

    fn receive(&mut self) -> TerminalRequest {
        let packet = LinkPacket::try_from_read(&mut self.stream).unwrap();
        let uplink = Uplink::decode(packet.data()).unwrap();
        assert_eq!(uplink.security_code, SECURITY_CODE);

        let request = TerminalRequest::from_uplink(&uplink).unwrap();
        self.last_correlation_id = request.correlation_id;
        request
    }

    fn respond(&mut self, status: Status, output: &[u8]) {
        let frame = Frame::Response {
            kind: ResponseKind { apid: Apid::Terminal, status },
            correlation_id: self.last_correlation_id,
            payload: output.to_vec(),
        };
        self.send(&frame);
    }

    fn send(&mut self, frame: &Frame) {
        use std::io::Write;
        let bytes = LinkPacket(frame.encode(self.sequence)).serialize();
        self.sequence += 1;
        self.stream.write_all(&bytes).unwrap();
    }
}

pub struct Harness {
    pub client: ObcClient,
    pub beacons: mpsc::Receiver<TelemetrySnapshot>,
    reader: Option<FrameReader>,
    obc: Option<JoinHandle<()>>,
}

impl Harness {
    pub fn router(&self) -> &Arc<ResponseRouter> {
        self.client.router()
    }

    /// Waits for the simulated OBC to play all events, then tears the harness down
    pub fn finish(mut self) {
        if let Some(obc) = self.obc.take() {
            obc.join().unwrap();
        }
        self.router().cancel_all();
        if let Some(reader) = self.reader.take() {
            reader.stop();
        }
    }
}

/// Connects a client to a simulated OBC that plays the given events.
/// * `events` is the expected conversation, see [ObcEvent]
pub fn prepare_harness(events: Vec<ObcEvent>) -> Harness {
    prepare_harness_with_decoder(events, BeaconDecoder::default())
}

pub fn prepare_harness_with_decoder(events: Vec<ObcEvent>, decoder: BeaconDecoder) -> Harness {
    let _ = std::fs::create_dir("tests/tmp");
    file_per_thread_logger::allow_uninitialized();
    file_per_thread_logger::initialize("tests/tmp/log-");

    let (harness_end, obc_end) = UnixStream::pair().unwrap();
    let read_half = harness_end.try_clone().unwrap();
    read_half.set_read_timeout(Some(Duration::from_millis(50))).unwrap();

    let router = ResponseRouter::new(Arc::new(StreamTransport::new(harness_end)));
    let (beacon_tx, beacons) = mpsc::channel();
    let reader = FrameReader::spawn(read_half, router.clone(), Arc::new(decoder), beacon_tx);

    let obc = SimulatedObc { stream: obc_end, last_correlation_id: 0, sequence: 0 };
    let obc = thread::spawn(move || obc.run(events));

    Harness {
        client: ObcClient::new(router, SECURITY_CODE).with_timeout(COMMAND_TIMEOUT),
        beacons,
        reader: Some(reader),
        obc: Some(obc),
    }
}
