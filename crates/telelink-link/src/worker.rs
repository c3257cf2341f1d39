use std::io::ErrorKind;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;
use std::time::Duration;

use bytes::BytesMut;
use telelink_frame::{Extract, FrameDecoder};
use telelink_transport::{Connector, LinkStream};
use tracing::{debug, info, warn};

use crate::config::LinkConfig;
use crate::dispatch::Dispatcher;
use crate::event::{EventSender, LinkEvent};
use crate::outbound::OutboundQueue;

const INITIAL_BUFFER_CAPACITY: usize = 4 * 1024;
const READ_CHUNK_SIZE: usize = 1024;
/// Stop coalescing a burst once this much is buffered so writes and stop
/// requests still get a turn against a peer that never pauses.
const COALESCE_LIMIT: usize = 16 * 1024;

/// Lifecycle of one link worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LinkState {
    Disconnected = 0,
    Connecting = 1,
    Ready = 2,
    Draining = 3,
}

impl LinkState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Connecting,
            2 => Self::Ready,
            3 => Self::Draining,
            _ => Self::Disconnected,
        }
    }
}

/// State shared between the consumer handle and the worker thread.
#[derive(Debug)]
pub(crate) struct WorkerShared {
    state: AtomicU8,
    stop: AtomicBool,
}

impl WorkerShared {
    pub(crate) fn new() -> Self {
        Self {
            state: AtomicU8::new(LinkState::Connecting as u8),
            stop: AtomicBool::new(false),
        }
    }

    pub(crate) fn state(&self) -> LinkState {
        LinkState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: LinkState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub(crate) fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }
}

/// Why the ready loop ended.
enum Exit {
    Stopped,
    WriteTimeout(String),
    Failed(String),
}

/// Everything the worker thread needs besides the stream it opens.
pub(crate) struct WorkerParts {
    pub target: String,
    pub config: LinkConfig,
    pub outbound: Arc<OutboundQueue>,
    pub events: EventSender,
    pub shared: Arc<WorkerShared>,
    pub dispatcher: Dispatcher,
    pub done: mpsc::Sender<()>,
}

/// Start a worker thread that opens `parts.target` with `connector`.
pub(crate) fn spawn<C: Connector>(
    connector: Arc<C>,
    parts: WorkerParts,
) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("telelink-worker".to_string())
        .spawn(move || {
            let done = parts.done.clone();
            run(connector.as_ref(), parts);
            let _ = done.send(());
        })
}

fn run<C: Connector>(connector: &C, parts: WorkerParts) {
    let WorkerParts {
        target,
        config,
        outbound,
        events,
        shared,
        dispatcher,
        done: _,
    } = parts;

    shared.set_state(LinkState::Connecting);
    let stream = match connector
        .open(&target)
        .map_err(|err| err.to_string())
        .and_then(|stream| {
            stream
                .set_write_timeout(Some(config.write_timeout))
                .map_err(|err| format!("failed to configure {target}: {err}"))?;
            Ok(stream)
        }) {
        Ok(stream) => stream,
        Err(reason) => {
            warn!(%target, %reason, "connection failed");
            events.emit(LinkEvent::ConnectionError(format!(
                "can't open {target}: {reason}"
            )));
            shared.set_state(LinkState::Disconnected);
            return;
        }
    };

    let mut worker = LinkWorker {
        stream,
        decoder: FrameDecoder::with_config(config.frame.clone()),
        config,
        outbound,
        events,
        rx_buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
        dispatcher,
    };

    worker.discard_stale_input();
    shared.set_state(LinkState::Ready);
    info!(%target, "link ready");

    let exit = loop {
        if shared.stop_requested() {
            break Exit::Stopped;
        }
        if let Err(exit) = worker.flush_outbound() {
            break exit;
        }
        if let Err(exit) = worker.fill_receive_buffer() {
            break exit;
        }
        worker.drain_frames();
    };

    shared.set_state(LinkState::Draining);
    match exit {
        Exit::Stopped => debug!(%target, "stop requested"),
        Exit::WriteTimeout(reason) => {
            warn!(%target, %reason, "write timeout");
            worker.events.emit(LinkEvent::WriteTimeout(reason));
        }
        Exit::Failed(reason) => {
            warn!(%target, %reason, "link failed");
            worker.events.emit(LinkEvent::ConnectionError(reason));
        }
    }

    drop(worker);
    info!(%target, "link closed");
    shared.set_state(LinkState::Disconnected);
}

/// Per-connection worker state. Owned by the worker thread only.
struct LinkWorker<S> {
    stream: S,
    config: LinkConfig,
    outbound: Arc<OutboundQueue>,
    events: EventSender,
    rx_buf: BytesMut,
    decoder: FrameDecoder,
    dispatcher: Dispatcher,
}

impl<S: LinkStream> LinkWorker<S> {
    /// Drop whatever the transport buffered before this connection was ready.
    fn discard_stale_input(&mut self) {
        if self
            .stream
            .set_read_timeout(Some(self.config.read_grace))
            .is_err()
        {
            return;
        }
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        let mut discarded = 0usize;
        while discarded < COALESCE_LIMIT {
            match self.stream.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => discarded += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
        if discarded > 0 {
            debug!(discarded, "discarded stale input");
        }
    }

    /// Write one bounded batch from the outbound queue.
    fn flush_outbound(&mut self) -> Result<(), Exit> {
        let Some(pending) = self.outbound.peek() else {
            return Ok(());
        };

        match self.stream.write(&pending) {
            Ok(0) => Err(Exit::Failed("link closed while writing".to_string())),
            Ok(written) => {
                self.outbound.consume(written);
                debug!(written, remaining = pending.len() - written, "wrote outbound bytes");
                Ok(())
            }
            Err(err) if is_timeout(&err) => Err(Exit::WriteTimeout(format!(
                "write request timeout ({} bytes pending)",
                pending.len()
            ))),
            Err(err) if err.kind() == ErrorKind::Interrupted => Ok(()),
            Err(err) => Err(Exit::Failed(format!("write failed: {err}"))),
        }
    }

    /// Wait up to the read timeout for data, then coalesce the rest of the burst.
    fn fill_receive_buffer(&mut self) -> Result<(), Exit> {
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        self.set_read_timeout(self.config.read_timeout)?;

        match self.read_chunk(&mut chunk)? {
            0 => return Ok(()),
            n => self.rx_buf.extend_from_slice(&chunk[..n]),
        }

        self.set_read_timeout(self.config.read_grace)?;
        while self.rx_buf.len() < COALESCE_LIMIT {
            match self.read_chunk(&mut chunk)? {
                0 => break,
                n => self.rx_buf.extend_from_slice(&chunk[..n]),
            }
        }
        Ok(())
    }

    /// One read; `Ok(0)` means the timeout elapsed without data.
    fn read_chunk(&mut self, chunk: &mut [u8]) -> Result<usize, Exit> {
        loop {
            return match self.stream.read(chunk) {
                Ok(0) => Err(Exit::Failed("link closed by peer".to_string())),
                Ok(n) => Ok(n),
                Err(err) if is_timeout(&err) => Ok(0),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => Err(Exit::Failed(format!("read failed: {err}"))),
            };
        }
    }

    fn set_read_timeout(&mut self, timeout: Duration) -> Result<(), Exit> {
        self.stream
            .set_read_timeout(Some(timeout))
            .map_err(|err| Exit::Failed(format!("failed to set read timeout: {err}")))
    }

    /// Decode and dispatch every complete message in the receive buffer.
    fn drain_frames(&mut self) {
        loop {
            match self.decoder.try_extract(&mut self.rx_buf) {
                Extract::Complete(message) => self.dispatcher.dispatch(message, &self.events),
                Extract::Incomplete | Extract::Corrupt(_) => break,
            }
        }
    }
}

fn is_timeout(err: &std::io::Error) -> bool {
    matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
}
