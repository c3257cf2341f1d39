use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;

use bytes::BytesMut;
use telelink_frame::{encode_message, FrameError, Message, StreamReducer};
use telelink_transport::{Connector, EndpointConnector};
use tracing::{debug, info, warn};

use crate::config::LinkConfig;
use crate::dispatch::Dispatcher;
use crate::error::{LinkError, Result};
use crate::event::{EventSender, LinkEvent};
use crate::outbound::OutboundQueue;
use crate::worker::{self, LinkState, WorkerParts, WorkerShared};

struct WorkerHandle {
    target: String,
    thread: JoinHandle<()>,
    shared: Arc<WorkerShared>,
    done: mpsc::Receiver<()>,
    stopping: bool,
}

/// Consumer-side handle for a board link.
///
/// Commands are queued with [`Link::send`]; decoded telemetry, sample buffers
/// and link failures arrive on [`Link::events`]. Reconnection is always an
/// explicit [`Link::connect`] call.
pub struct Link<C: Connector = EndpointConnector> {
    connector: Arc<C>,
    config: LinkConfig,
    outbound: Arc<OutboundQueue>,
    events_tx: EventSender,
    events_rx: mpsc::Receiver<LinkEvent>,
    worker: Option<WorkerHandle>,
}

impl Link<EndpointConnector> {
    /// Create a link that opens `unix:` / `tcp:` targets.
    pub fn new(config: LinkConfig) -> Self {
        let connector = EndpointConnector::new(config.open_timeout);
        Self::with_connector(connector, config)
    }
}

impl<C: Connector> Link<C> {
    /// Create a link with a custom connector.
    pub fn with_connector(connector: C, config: LinkConfig) -> Self {
        let (events_tx, events_rx) = EventSender::channel();
        Self {
            connector: Arc::new(connector),
            config,
            outbound: Arc::new(OutboundQueue::new()),
            events_tx,
            events_rx,
            worker: None,
        }
    }

    /// Start a worker for `target` unless one is already running.
    ///
    /// Open failures are reported asynchronously as
    /// [`LinkEvent::ConnectionError`].
    ///
    /// Fails with [`LinkError::ShutdownFailed`] while a worker from an earlier
    /// [`Link::disconnect`] is still winding down; the outbound queue is shared
    /// and only one worker may drain it.
    pub fn connect(&mut self, target: &str) -> Result<()> {
        if let Some(handle) = self.worker.as_ref().filter(|h| h.stopping) {
            if !handle.thread.is_finished() {
                return Err(LinkError::ShutdownFailed(format!(
                    "worker for {} is still stopping",
                    handle.target
                )));
            }
        }
        if self.is_connected() {
            debug!(target, "link already running");
            return Ok(());
        }
        self.reap_finished();

        self.config.validate()?;
        let reducer = StreamReducer::new(self.config.reducer)?;
        self.outbound.clear();

        let shared = Arc::new(WorkerShared::new());
        let (done_tx, done_rx) = mpsc::channel();
        let parts = WorkerParts {
            target: target.to_string(),
            config: self.config.clone(),
            outbound: Arc::clone(&self.outbound),
            events: self.events_tx.clone(),
            shared: Arc::clone(&shared),
            dispatcher: Dispatcher::new(reducer),
            done: done_tx,
        };
        let thread = worker::spawn(Arc::clone(&self.connector), parts).map_err(LinkError::Spawn)?;

        info!(target, "link worker started");
        self.worker = Some(WorkerHandle {
            target: target.to_string(),
            thread,
            shared,
            done: done_rx,
            stopping: false,
        });
        Ok(())
    }

    /// Ask the worker to stop and wait up to `shutdown_timeout` for it.
    ///
    /// On timeout the worker handle is kept: [`Link::state`] keeps reporting
    /// the live worker and calling `disconnect` again resumes the wait.
    pub fn disconnect(&mut self) -> Result<()> {
        let Some(handle) = self.worker.as_mut() else {
            return Ok(());
        };
        handle.stopping = true;
        handle.shared.request_stop();

        let timeout = self.config.shutdown_timeout;
        if let Err(mpsc::RecvTimeoutError::Timeout) = handle.done.recv_timeout(timeout) {
            warn!(target = %handle.target, ?timeout, "link worker still running after stop request");
            return Err(LinkError::ShutdownFailed(format!(
                "worker for {} did not stop within {timeout:?}",
                handle.target
            )));
        }

        let Some(handle) = self.worker.take() else {
            return Ok(());
        };
        if handle.thread.join().is_err() {
            return Err(LinkError::ShutdownFailed(format!(
                "worker for {} panicked",
                handle.target
            )));
        }
        info!(target = %handle.target, "link disconnected");
        Ok(())
    }

    /// Encode and queue a message for the board.
    pub fn send(&self, message: &Message) -> Result<()> {
        let max = self.config.frame.max_payload_size;
        if message.payload.len() > max {
            return Err(FrameError::PayloadTooLarge {
                size: message.payload.len(),
                max,
            }
            .into());
        }
        let mut frame = BytesMut::with_capacity(message.wire_size());
        encode_message(message.id, &message.payload, &mut frame)?;
        self.send_raw(&frame)
    }

    /// Queue already-encoded frame bytes.
    pub fn send_raw(&self, bytes: &[u8]) -> Result<()> {
        if !self.is_connected() {
            return Err(LinkError::NotConnected);
        }
        self.outbound.push(bytes);
        Ok(())
    }

    /// True while a worker is connecting or running and has not been asked to stop.
    pub fn is_connected(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|handle| !handle.stopping && handle.shared.state() != LinkState::Disconnected)
    }

    /// Current worker state.
    pub fn state(&self) -> LinkState {
        self.worker
            .as_ref()
            .map(|handle| handle.shared.state())
            .unwrap_or(LinkState::Disconnected)
    }

    /// Target of the current or last worker.
    pub fn target(&self) -> Option<&str> {
        self.worker.as_ref().map(|handle| handle.target.as_str())
    }

    /// Ordered stream of worker events.
    pub fn events(&self) -> &mpsc::Receiver<LinkEvent> {
        &self.events_rx
    }

    /// Outbound bytes not yet acknowledged by the transport.
    pub fn pending_bytes(&self) -> usize {
        self.outbound.len()
    }

    /// Link configuration.
    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    fn reap_finished(&mut self) {
        if let Some(handle) = self.worker.take() {
            if handle.thread.join().is_err() {
                warn!(target = %handle.target, "previous link worker panicked");
            }
        }
    }
}

impl<C: Connector> Drop for Link<C> {
    fn drop(&mut self) {
        if let Err(err) = self.disconnect() {
            warn!(%err, "link shutdown on drop failed");
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::collections::VecDeque;
    use std::io::{Read, Write};
    use std::os::unix::net::UnixStream;
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    use telelink_frame::{ReducerConfig, HEADER_SIZE};
    use telelink_transport::{LinkStream, TransportError};

    use super::*;
    use crate::command;
    use crate::telemetry::Telemetry;

    /// Hands out pre-connected socket ends; the test keeps the board side.
    #[derive(Default)]
    struct PairConnector {
        streams: Mutex<VecDeque<UnixStream>>,
    }

    impl PairConnector {
        fn with_boards(count: usize) -> (Self, Vec<UnixStream>) {
            let connector = Self::default();
            let mut boards = Vec::new();
            for _ in 0..count {
                let (host, board) = UnixStream::pair().unwrap();
                connector.streams.lock().unwrap().push_back(host);
                boards.push(board);
            }
            (connector, boards)
        }
    }

    impl Connector for PairConnector {
        type Stream = UnixStream;

        fn open(&self, target: &str) -> telelink_transport::Result<UnixStream> {
            self.streams
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| TransportError::Connect {
                    target: target.to_string(),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such board"),
                })
        }
    }

    /// Board that never answers; every read blocks well past any timeout.
    struct SlowStream;

    impl Read for SlowStream {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            std::thread::sleep(Duration::from_millis(400));
            Err(std::io::ErrorKind::WouldBlock.into())
        }
    }

    impl Write for SlowStream {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl LinkStream for SlowStream {
        fn set_read_timeout(&self, _timeout: Option<Duration>) -> std::io::Result<()> {
            Ok(())
        }

        fn set_write_timeout(&self, _timeout: Option<Duration>) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct SlowConnector;

    impl Connector for SlowConnector {
        type Stream = SlowStream;

        fn open(&self, _target: &str) -> telelink_transport::Result<SlowStream> {
            Ok(SlowStream)
        }
    }

    fn connected_link(config: LinkConfig) -> (Link<PairConnector>, UnixStream) {
        let (connector, mut boards) = PairConnector::with_boards(1);
        let mut link = Link::with_connector(connector, config);
        link.connect("board").unwrap();
        wait_for_state(&link, LinkState::Ready);
        (link, boards.remove(0))
    }

    fn wait_for_state<C: Connector>(link: &Link<C>, state: LinkState) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while link.state() != state {
            assert!(Instant::now() < deadline, "link never reached {state:?}");
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    fn next_event<C: Connector>(link: &Link<C>) -> LinkEvent {
        link.events()
            .recv_timeout(Duration::from_secs(5))
            .expect("event should arrive")
    }

    fn frame(message: &Message) -> Vec<u8> {
        message.encode().unwrap().to_vec()
    }

    #[test]
    fn position_reply_becomes_decoded_message() {
        let (link, mut board) = connected_link(LinkConfig::default());
        board.write_all(&[b'a', 0xAA, 0x02, 0x00, 0x34, 0x12]).unwrap();

        let LinkEvent::DecodedMessage(msg) = next_event(&link) else {
            panic!("expected a decoded message");
        };
        assert_eq!(msg.id, b'a');
        assert_eq!(
            Telemetry::decode(&msg),
            Some(Telemetry::ActuatorPosition {
                axis: crate::Actuator::Foc,
                position: 0x1234
            })
        );
    }

    #[test]
    fn queued_commands_reach_the_board_in_order() {
        let (link, mut board) = connected_link(LinkConfig::default());
        let commands = command::read_settings();
        for cmd in &commands {
            link.send(cmd).unwrap();
        }

        let expected: Vec<u8> = commands.iter().flat_map(frame).collect();
        let mut got = vec![0u8; expected.len()];
        board.read_exact(&mut got).unwrap();
        assert_eq!(got, expected);

        let deadline = Instant::now() + Duration::from_secs(5);
        while link.pending_bytes() != 0 {
            assert!(Instant::now() < deadline, "outbound queue never drained");
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn send_without_connection_is_rejected() {
        let link = Link::with_connector(PairConnector::default(), LinkConfig::default());
        let err = link.send(&command::reboot()).unwrap_err();
        assert!(matches!(err, LinkError::NotConnected));
        assert_eq!(link.pending_bytes(), 0);
    }

    #[test]
    fn oversized_command_is_rejected() {
        let (link, _board) = connected_link(LinkConfig::default());
        let err = link
            .send(&Message::new(b'A', vec![0u8; 2048]))
            .unwrap_err();
        assert!(matches!(
            err,
            LinkError::Frame(FrameError::PayloadTooLarge { .. })
        ));
    }

    #[test]
    fn open_failure_reports_connection_error() {
        let mut link = Link::with_connector(PairConnector::default(), LinkConfig::default());
        link.connect("missing").unwrap();

        let event = next_event(&link);
        assert!(matches!(&event, LinkEvent::ConnectionError(msg) if msg.contains("missing")));
        wait_for_state(&link, LinkState::Disconnected);
        assert!(matches!(
            link.send(&command::reboot()),
            Err(LinkError::NotConnected)
        ));
    }

    #[test]
    fn bulk_samples_produce_one_buffer_per_cycle() {
        let (link, mut board) = connected_link(LinkConfig::default());
        let ReducerConfig { ratio, depth } = link.config().reducer;
        let samples: Vec<i16> = (0..(ratio * depth) as i16).map(|i| i * 10).collect();
        let payload: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        board.write_all(&frame(&Message::new(b'r', payload))).unwrap();

        let LinkEvent::SampleBufferReady(values) = next_event(&link) else {
            panic!("expected a sample buffer");
        };
        let expected: Vec<i16> = samples
            .chunks(ratio)
            .map(|g| (g.iter().map(|&v| i32::from(v)).sum::<i32>() / ratio as i32) as i16)
            .collect();
        assert_eq!(values, expected);
        assert!(link
            .events()
            .recv_timeout(Duration::from_millis(100))
            .is_err());
    }

    #[test]
    fn corrupt_header_is_swallowed_and_link_recovers() {
        let (link, mut board) = connected_link(LinkConfig::default());
        board.write_all(&[b'a', 0x00, 0x02, 0x00, 0xFF, 0xFF]).unwrap();
        std::thread::sleep(Duration::from_millis(150));
        board
            .write_all(&frame(&Message::new(b'b', vec![0x10, 0x00])))
            .unwrap();

        assert_eq!(
            next_event(&link),
            LinkEvent::DecodedMessage(Message::new(b'b', vec![0x10, 0x00]))
        );
        assert_eq!(link.state(), LinkState::Ready);
    }

    #[test]
    fn unknown_messages_are_not_forwarded() {
        let (link, mut board) = connected_link(LinkConfig::default());
        let mut wire = frame(&Message::new(b'Z', vec![1, 2, 3]));
        wire.extend(frame(&Message::empty(b'.')));
        board.write_all(&wire).unwrap();

        assert_eq!(
            next_event(&link),
            LinkEvent::DecodedMessage(Message::empty(b'.'))
        );
    }

    #[test]
    fn frame_split_across_writes_is_reassembled() {
        let (link, mut board) = connected_link(LinkConfig::default());
        let wire = frame(&Message::new(b'p', vec![0x00, 0x19, 0x00, 0x00]));
        board.write_all(&wire[..HEADER_SIZE + 1]).unwrap();
        std::thread::sleep(Duration::from_millis(15));
        board.write_all(&wire[HEADER_SIZE + 1..]).unwrap();

        assert_eq!(
            next_event(&link),
            LinkEvent::DecodedMessage(Message::new(b'p', vec![0x00, 0x19, 0x00, 0x00]))
        );
    }

    #[test]
    fn write_timeout_is_fatal() {
        let (link, _board) = connected_link(LinkConfig::default());
        // Nobody reads the board side, so the socket buffer eventually fills.
        link.send_raw(&vec![0u8; 4 * 1024 * 1024]).unwrap();

        let event = next_event(&link);
        assert!(matches!(event, LinkEvent::WriteTimeout(_)), "got {event:?}");
        wait_for_state(&link, LinkState::Disconnected);
        assert!(matches!(
            link.send_raw(b"x"),
            Err(LinkError::NotConnected)
        ));
    }

    #[test]
    fn peer_close_ends_the_worker() {
        let (link, board) = connected_link(LinkConfig::default());
        drop(board);

        let event = next_event(&link);
        assert!(matches!(&event, LinkEvent::ConnectionError(msg) if msg.contains("closed")));
        wait_for_state(&link, LinkState::Disconnected);
    }

    #[test]
    fn disconnect_is_prompt_and_silent() {
        let (mut link, _board) = connected_link(LinkConfig::default());
        let started = Instant::now();
        link.disconnect().unwrap();
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(link.state(), LinkState::Disconnected);
        assert!(link.events().try_recv().is_err());
        link.disconnect().unwrap();
    }

    #[test]
    fn stuck_worker_is_kept_until_it_stops() {
        let config = LinkConfig {
            shutdown_timeout: Duration::from_millis(50),
            ..LinkConfig::default()
        };
        let mut link = Link::with_connector(SlowConnector, config);
        link.connect("slow-board").unwrap();
        wait_for_state(&link, LinkState::Ready);

        assert!(matches!(
            link.disconnect(),
            Err(LinkError::ShutdownFailed(msg)) if msg.contains("slow-board")
        ));
        assert_ne!(link.state(), LinkState::Disconnected);
        assert_eq!(link.target(), Some("slow-board"));
        assert!(!link.is_connected());
        assert!(matches!(
            link.send(&command::reboot()),
            Err(LinkError::NotConnected)
        ));
        assert!(matches!(
            link.connect("slow-board"),
            Err(LinkError::ShutdownFailed(_))
        ));

        let deadline = Instant::now() + Duration::from_secs(5);
        while link.disconnect().is_err() {
            assert!(Instant::now() < deadline, "worker never stopped");
        }
        assert_eq!(link.state(), LinkState::Disconnected);
        assert_eq!(link.target(), None);

        link.connect("slow-board").unwrap();
        wait_for_state(&link, LinkState::Ready);
        assert_eq!(link.target(), Some("slow-board"));
    }

    #[test]
    fn reconnect_uses_a_fresh_worker() {
        let (connector, mut boards) = PairConnector::with_boards(2);
        let mut link = Link::with_connector(connector, LinkConfig::default());

        link.connect("board").unwrap();
        wait_for_state(&link, LinkState::Ready);
        link.connect("board").unwrap();
        link.disconnect().unwrap();

        link.connect("board").unwrap();
        wait_for_state(&link, LinkState::Ready);
        link.send(&command::reboot()).unwrap();

        let mut got = [0u8; HEADER_SIZE];
        boards[1].read_exact(&mut got).unwrap();
        assert_eq!(got, [b'X', 0xAA, 0, 0]);
        drop(boards);
    }

    #[test]
    fn events_preserve_wire_order() {
        let (link, mut board) = connected_link(LinkConfig::default());
        let replies = [
            Message::new(b'a', vec![1, 0]),
            Message::new(b'b', vec![2, 0]),
            Message::new(b'c', vec![3, 0]),
            Message::new(b'o', vec![50, 1]),
        ];
        let wire: Vec<u8> = replies.iter().flat_map(frame).collect();
        board.write_all(&wire).unwrap();

        for expected in replies {
            assert_eq!(next_event(&link), LinkEvent::DecodedMessage(expected));
        }
    }
}
