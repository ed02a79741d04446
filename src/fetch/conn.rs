use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::{mpsc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use rustls::{ClientConnection, StreamOwned};
use url::{Host, Url};

use super::Protocol;
use crate::error::{ProofError, Result};

/// A bidirectional byte stream a fetcher can talk over.
///
/// `set_timeout` bounds the next blocking read or write. Streams without a
/// socket underneath (test doubles) keep the default no-op.
pub trait Connection: Read + Write + Send {
    fn set_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        let _ = timeout;
        Ok(())
    }
}

impl Connection for TcpStream {
    fn set_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        self.set_read_timeout(timeout)?;
        self.set_write_timeout(timeout)
    }
}

impl Connection for StreamOwned<ClientConnection, TcpStream> {
    fn set_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        self.sock.set_timeout(timeout)
    }
}

impl<C: Connection + ?Sized> Connection for Box<C> {
    fn set_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        (**self).set_timeout(timeout)
    }
}

/// A point in time by which a whole exchange must finish.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Deadline {
    expires: Option<Instant>,
}

impl Deadline {
    pub(crate) fn after(timeout: Option<Duration>) -> Self {
        Self {
            expires: timeout.and_then(|t| Instant::now().checked_add(t)),
        }
    }

    /// Time left, `None` when unbounded. Fails once the deadline has passed.
    pub(crate) fn remaining(&self) -> io::Result<Option<Duration>> {
        match self.expires {
            None => Ok(None),
            Some(at) => {
                let left = at.saturating_duration_since(Instant::now());
                if left.is_zero() {
                    Err(io::Error::new(io::ErrorKind::TimedOut, "deadline exceeded"))
                } else {
                    Ok(Some(left))
                }
            }
        }
    }
}

/// Wraps a connection so every read and write is bounded by one deadline.
pub(crate) struct Bounded<C> {
    inner: C,
    deadline: Deadline,
}

impl<C: Connection> Bounded<C> {
    pub(crate) fn new(inner: C, deadline: Deadline) -> Self {
        Self { inner, deadline }
    }

    fn arm(&mut self) -> io::Result<()> {
        if let Some(left) = self.deadline.remaining()? {
            self.inner.set_timeout(Some(left))?;
        }
        Ok(())
    }
}

impl<C: Connection> Read for Bounded<C> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.arm()?;
        self.inner.read(buf)
    }
}

impl<C: Connection> Write for Bounded<C> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.arm()?;
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.arm()?;
        self.inner.flush()
    }
}

/// A caller-supplied connection, consumed by the next fetch.
#[derive(Default)]
pub(crate) struct Preset(Mutex<Option<Box<dyn Connection>>>);

impl Preset {
    pub(crate) fn new(conn: Box<dyn Connection>) -> Self {
        Self(Mutex::new(Some(conn)))
    }

    pub(crate) fn take(&self) -> Option<Box<dyn Connection>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).take()
    }
}

/// The host part of a URL in a form the resolver and TLS accept
/// (IPv6 literals without brackets).
pub(crate) fn host_of(url: &Url, protocol: Protocol) -> Result<String> {
    match url.host() {
        Some(Host::Domain(domain)) => Ok(domain.to_string()),
        Some(Host::Ipv4(ip)) => Ok(ip.to_string()),
        Some(Host::Ipv6(ip)) => Ok(ip.to_string()),
        None => Err(ProofError::Connect {
            protocol,
            source: io::Error::new(io::ErrorKind::InvalidInput, format!("URL has no host: {url}")),
        }),
    }
}

/// Open a TCP connection to `host:port` within the deadline.
pub(crate) fn dial(host: &str, port: u16, deadline: &Deadline) -> io::Result<TcpStream> {
    connect_any(resolve((host.to_string(), port), deadline)?, deadline)
}

/// Open a TCP connection to an address of the form `host:port`.
pub(crate) fn dial_address(address: &str, deadline: &Deadline) -> io::Result<TcpStream> {
    connect_any(resolve(address.to_string(), deadline)?, deadline)
}

/// Resolve `target` within the deadline.
///
/// The system resolver cannot be interrupted, so a bounded lookup runs on
/// its own thread and is abandoned once the deadline passes.
fn resolve<A>(target: A, deadline: &Deadline) -> io::Result<Vec<SocketAddr>>
where
    A: ToSocketAddrs + Send + 'static,
{
    let Some(left) = deadline.remaining()? else {
        return Ok(target.to_socket_addrs()?.collect());
    };

    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let _ = tx.send(target.to_socket_addrs().map(|addrs| addrs.collect::<Vec<_>>()));
    });
    match rx.recv_timeout(left) {
        Ok(addrs) => addrs,
        Err(mpsc::RecvTimeoutError::Timeout) => Err(io::Error::new(
            io::ErrorKind::TimedOut,
            "name resolution exceeded deadline",
        )),
        Err(mpsc::RecvTimeoutError::Disconnected) => {
            Err(io::Error::other("resolver thread exited without an answer"))
        }
    }
}

fn connect_any(addrs: Vec<SocketAddr>, deadline: &Deadline) -> io::Result<TcpStream> {
    let mut last_err = None;
    for addr in addrs {
        let attempt = match deadline.remaining()? {
            Some(left) => TcpStream::connect_timeout(&addr, left),
            None => TcpStream::connect(addr),
        };
        match attempt {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                tracing::debug!(%addr, error = %e, "connect attempt failed");
                last_err = Some(e);
            }
        }
    }
    Err(last_err.unwrap_or_else(|| {
        io::Error::new(io::ErrorKind::AddrNotAvailable, "address resolved to nothing")
    }))
}

/// Read the rest of a stream, refusing more than `limit` bytes.
///
/// With `tolerate_eof`, an `UnexpectedEof` ends the body instead of failing
/// it. Only TLS streams want this: a peer that closes without close_notify
/// surfaces that way after the body.
pub(crate) fn read_body(
    reader: &mut impl Read,
    limit: usize,
    protocol: Protocol,
    tolerate_eof: bool,
) -> Result<Vec<u8>> {
    let mut body = Vec::new();
    let cap = u64::try_from(limit).unwrap_or(u64::MAX).saturating_add(1);
    match reader.take(cap).read_to_end(&mut body) {
        Ok(_) => {}
        Err(e) if tolerate_eof && e.kind() == io::ErrorKind::UnexpectedEof => {}
        Err(source) => return Err(ProofError::Response { protocol, source }),
    }
    if body.len() > limit {
        return Err(ProofError::ContentTooLarge { protocol, limit });
    }
    Ok(body)
}
