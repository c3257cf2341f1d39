use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::debug;

use crate::endpoint::Endpoint;
use crate::error::{Result, TransportError};

/// A connected duplex byte stream with bounded blocking.
///
/// Reads and writes that exceed the configured timeout fail with
/// `ErrorKind::WouldBlock` or `ErrorKind::TimedOut` depending on the platform.
pub trait LinkStream: Read + Write + Send {
    /// Set the read timeout for subsequent reads.
    fn set_read_timeout(&self, timeout: Option<Duration>) -> std::io::Result<()>;

    /// Set the write timeout for subsequent writes.
    fn set_write_timeout(&self, timeout: Option<Duration>) -> std::io::Result<()>;
}

#[cfg(unix)]
impl LinkStream for std::os::unix::net::UnixStream {
    fn set_read_timeout(&self, timeout: Option<Duration>) -> std::io::Result<()> {
        std::os::unix::net::UnixStream::set_read_timeout(self, timeout)
    }

    fn set_write_timeout(&self, timeout: Option<Duration>) -> std::io::Result<()> {
        std::os::unix::net::UnixStream::set_write_timeout(self, timeout)
    }
}

impl LinkStream for TcpStream {
    fn set_read_timeout(&self, timeout: Option<Duration>) -> std::io::Result<()> {
        TcpStream::set_read_timeout(self, timeout)
    }

    fn set_write_timeout(&self, timeout: Option<Duration>) -> std::io::Result<()> {
        TcpStream::set_write_timeout(self, timeout)
    }
}

/// Stream returned by [`EndpointConnector`]: one of the supported socket kinds.
pub struct LinkConnection {
    inner: LinkConnectionInner,
}

enum LinkConnectionInner {
    #[cfg(unix)]
    Unix(std::os::unix::net::UnixStream),
    Tcp(TcpStream),
}

impl LinkConnection {
    /// Wrap a connected Unix domain socket stream.
    #[cfg(unix)]
    pub fn from_unix(stream: std::os::unix::net::UnixStream) -> Self {
        Self {
            inner: LinkConnectionInner::Unix(stream),
        }
    }

    /// Wrap a connected TCP stream.
    pub fn from_tcp(stream: TcpStream) -> Self {
        Self {
            inner: LinkConnectionInner::Tcp(stream),
        }
    }
}

impl Read for LinkConnection {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            #[cfg(unix)]
            LinkConnectionInner::Unix(stream) => stream.read(buf),
            LinkConnectionInner::Tcp(stream) => stream.read(buf),
        }
    }
}

impl Write for LinkConnection {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            #[cfg(unix)]
            LinkConnectionInner::Unix(stream) => stream.write(buf),
            LinkConnectionInner::Tcp(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            #[cfg(unix)]
            LinkConnectionInner::Unix(stream) => stream.flush(),
            LinkConnectionInner::Tcp(stream) => stream.flush(),
        }
    }
}

impl LinkStream for LinkConnection {
    fn set_read_timeout(&self, timeout: Option<Duration>) -> std::io::Result<()> {
        match &self.inner {
            #[cfg(unix)]
            LinkConnectionInner::Unix(stream) => stream.set_read_timeout(timeout),
            LinkConnectionInner::Tcp(stream) => stream.set_read_timeout(timeout),
        }
    }

    fn set_write_timeout(&self, timeout: Option<Duration>) -> std::io::Result<()> {
        match &self.inner {
            #[cfg(unix)]
            LinkConnectionInner::Unix(stream) => stream.set_write_timeout(timeout),
            LinkConnectionInner::Tcp(stream) => stream.set_write_timeout(timeout),
        }
    }
}

impl std::fmt::Debug for LinkConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match &self.inner {
            #[cfg(unix)]
            LinkConnectionInner::Unix(_) => "unix",
            LinkConnectionInner::Tcp(_) => "tcp",
        };
        f.debug_struct("LinkConnection").field("type", &kind).finish()
    }
}

/// Opens a [`LinkStream`] for a target string.
///
/// The link worker calls this from its own thread, once per connection.
pub trait Connector: Send + Sync + 'static {
    type Stream: LinkStream + 'static;

    /// Open the stream. Must return within a bounded time.
    fn open(&self, target: &str) -> Result<Self::Stream>;
}

/// Default connector: parses the target as an [`Endpoint`] and opens it.
#[derive(Debug, Clone)]
pub struct EndpointConnector {
    open_timeout: Duration,
}

impl EndpointConnector {
    /// Create a connector with the given bound on TCP connection setup.
    pub fn new(open_timeout: Duration) -> Self {
        Self { open_timeout }
    }

    /// Bound applied to connection setup.
    pub fn open_timeout(&self) -> Duration {
        self.open_timeout
    }
}

impl Default for EndpointConnector {
    fn default() -> Self {
        Self::new(Duration::from_millis(500))
    }
}

impl Connector for EndpointConnector {
    type Stream = LinkConnection;

    fn open(&self, target: &str) -> Result<LinkConnection> {
        match Endpoint::parse(target)? {
            #[cfg(unix)]
            Endpoint::Unix(path) => {
                let stream = crate::uds::UnixDomainSocket::connect(&path)?;
                Ok(LinkConnection::from_unix(stream))
            }
            #[cfg(not(unix))]
            Endpoint::Unix(_) => Err(TransportError::Unsupported("unix")),
            Endpoint::Tcp(addr) => {
                let stream = connect_tcp(&addr, self.open_timeout)?;
                Ok(LinkConnection::from_tcp(stream))
            }
        }
    }
}

fn connect_tcp(addr: &str, timeout: Duration) -> Result<TcpStream> {
    let connect_err = |source| TransportError::Connect {
        target: format!("tcp:{addr}"),
        source,
    };

    let mut last_err = None;
    for sock_addr in addr.to_socket_addrs().map_err(connect_err)? {
        match TcpStream::connect_timeout(&sock_addr, timeout) {
            Ok(stream) => {
                stream.set_nodelay(true).map_err(connect_err)?;
                debug!(%sock_addr, "connected over tcp");
                return Ok(stream);
            }
            Err(err) => last_err = Some(err),
        }
    }

    Err(connect_err(last_err.unwrap_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::AddrNotAvailable,
            "address resolved to nothing",
        )
    })))
}
