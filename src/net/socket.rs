//! Listening socket ownership and reconciliation.
//!
//! # Responsibilities
//! - Bind the listening socket (with "address in use" retry)
//! - Wrap/unwrap it in TLS as the configuration demands
//! - Re-apply socket tunables when only they changed
//! - Keep socket identity stable across reloads that don't move the address
//!
//! # Design Decisions
//! - Exactly one socket per manager; only the manager closes or replaces it
//! - TLS is a context attached to the socket, so unwrapping keeps the fd
//! - Each bound socket gets a process-unique id so callers can tell a rebind
//!   from a reuse even when the kernel recycles the fd number

use std::fmt;
use std::io;
use std::net::{SocketAddr, TcpListener, ToSocketAddrs};
use std::os::fd::{AsRawFd, RawFd};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, TcpKeepalive, Type};

use crate::config::ServerConfig;
use crate::net::tls::{TlsContext, TlsError};
use crate::resilience::backoff::{retry_until, Attempt, Backoff, RetryError};

/// Global counter for socket IDs.
static SOCKET_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Identity of one bound socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SocketId(u64);

impl SocketId {
    fn next() -> Self {
        Self(SOCKET_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SocketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sock-{}", self.0)
    }
}

/// Error type for socket management.
#[derive(Debug, thiserror::Error)]
pub enum SocketError {
    #[error(
        "when running server in SSL mode, you must specify both a cert_file and key_file option value"
    )]
    PartialTls,

    #[error("could not resolve {host}:{port}: {source}")]
    Resolve {
        host: String,
        port: u16,
        source: io::Error,
    },

    #[error("no IPv4 or IPv6 address found for {host}:{port}")]
    NoAddress { host: String, port: u16 },

    #[error("failed to bind {addr}: {source}")]
    Bind { addr: SocketAddr, source: io::Error },

    #[error("could not bind to {host}:{port} after trying for {secs} seconds")]
    BindTimeout { host: String, port: u16, secs: u64 },

    #[error(transparent)]
    Tls(#[from] TlsError),

    #[error("socket option failed: {0}")]
    Io(#[from] io::Error),
}

/// The bound OS socket, optionally carrying a TLS context.
pub struct ListeningSocket {
    id: SocketId,
    socket: Socket,
    local_addr: SocketAddr,
    tls: Option<TlsContext>,
}

impl ListeningSocket {
    pub fn id(&self) -> SocketId {
        self.id
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn raw_fd(&self) -> RawFd {
        self.socket.as_raw_fd()
    }

    pub fn is_tls(&self) -> bool {
        self.tls.is_some()
    }

    pub fn tls(&self) -> Option<&TlsContext> {
        self.tls.as_ref()
    }

    /// Duplicate the descriptor as a std listener for a serving loop. The
    /// duplicate shares the kernel socket; closing it leaves this one open.
    pub fn try_clone_listener(&self) -> io::Result<TcpListener> {
        Ok(self.socket.try_clone()?.into())
    }
}

impl fmt::Debug for ListeningSocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListeningSocket")
            .field("id", &self.id)
            .field("fd", &self.raw_fd())
            .field("local_addr", &self.local_addr)
            .field("tls", &self.tls)
            .finish()
    }
}

/// What a call to [`SocketManager::ensure_socket`] actually did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SocketChanges {
    pub rebound: bool,
    pub wrapped: bool,
    pub unwrapped: bool,
    pub certificates_reloaded: bool,
    pub keepidle_applied: bool,
    pub relistened: bool,
}

impl SocketChanges {
    pub fn is_noop(&self) -> bool {
        *self == Self::default()
    }
}

/// Owner of the single listening socket.
#[derive(Debug, Default)]
pub struct SocketManager {
    current: Option<ListeningSocket>,
}

impl SocketManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn socket(&self) -> Option<&ListeningSocket> {
        self.current.as_ref()
    }

    /// Ensure a socket exists and matches `config`.
    ///
    /// Called at startup with no previous config, and on every reload with
    /// the snapshot being replaced. A new socket is opened only when there is
    /// none yet or the bind host/port moved; every other change is applied to
    /// the existing socket.
    pub fn ensure_socket(
        &mut self,
        config: &ServerConfig,
        previous: Option<&ServerConfig>,
    ) -> Result<SocketChanges, SocketError> {
        if config.cert_file.is_some() != config.key_file.is_some() {
            return Err(SocketError::PartialTls);
        }

        let needs_new_socket = self.current.is_none()
            || previous.map_or(true, |prev| {
                prev.bind_host != config.bind_host || prev.bind_port != config.bind_port
            });
        let use_tls = config.use_tls();
        let used_tls_before = previous.is_some_and(|prev| prev.use_tls());
        let needs_wrap = use_tls && (!used_tls_before || needs_new_socket);
        let needs_unwrap = !use_tls && used_tls_before;

        let mut changes = SocketChanges::default();

        if needs_new_socket {
            if let Some(old) = self.current.take() {
                tracing::info!(
                    socket_id = %old.id,
                    address = %old.local_addr,
                    "Closing superseded listening socket"
                );
            }
        }
        if self.current.is_none() {
            self.current = Some(bind_with_retry(config)?);
            changes.rebound = true;
        }
        let Some(current) = self.current.as_mut() else {
            return Err(SocketError::NoAddress {
                host: config.bind_host.clone(),
                port: config.bind_port,
            });
        };

        if needs_wrap {
            current.tls = Some(TlsContext::load(config)?);
            changes.wrapped = true;
        } else if needs_unwrap {
            current.tls = None;
            changes.unwrapped = true;
        }

        // Pick up newly deployed certificates on a socket that stays wrapped.
        if let Some(prev) = previous.filter(|_| use_tls && used_tls_before && !needs_wrap) {
            let certs_changed = prev.cert_file != config.cert_file
                || prev.key_file != config.key_file
                || prev.ca_file != config.ca_file;
            if certs_changed {
                match current.tls.as_mut() {
                    Some(tls) => tls.reload(config)?,
                    None => current.tls = Some(TlsContext::load(config)?),
                }
                changes.certificates_reloaded = true;
            }
        }

        let keepidle_changed =
            previous.is_some_and(|prev| prev.tcp_keepidle_secs != config.tcp_keepidle_secs);
        if needs_new_socket || keepidle_changed {
            let keepalive = TcpKeepalive::new().with_time(config.tcp_keepidle());
            current.socket.set_tcp_keepalive(&keepalive)?;
            changes.keepidle_applied = true;
        }

        if !needs_new_socket && previous.is_some_and(|prev| prev.backlog != config.backlog) {
            current.socket.listen(config.backlog)?;
            changes.relistened = true;
        }

        if !changes.is_noop() {
            tracing::info!(
                socket_id = %current.id,
                address = %current.local_addr,
                tls = current.is_tls(),
                ?changes,
                "Listening socket configured"
            );
        }

        Ok(changes)
    }

    /// Shut down and drop the listening socket.
    pub fn close(&mut self) {
        if let Some(socket) = self.current.take() {
            let _ = socket.socket.shutdown(std::net::Shutdown::Both);
            tracing::debug!(socket_id = %socket.id, "Listening socket closed");
        }
    }
}

/// Resolve the bind target, keeping the first IPv4 or IPv6 address.
fn resolve(config: &ServerConfig) -> Result<SocketAddr, SocketError> {
    let (host, port) = config.bind_target();
    let addrs = (host, port)
        .to_socket_addrs()
        .map_err(|source| SocketError::Resolve {
            host: host.to_string(),
            port,
            source,
        })?;

    addrs
        .into_iter()
        .find(|addr| addr.is_ipv4() || addr.is_ipv6())
        .ok_or_else(|| SocketError::NoAddress {
            host: host.to_string(),
            port,
        })
}

fn bind(addr: SocketAddr, backlog: i32) -> io::Result<Socket> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    // sockets can hang around forever without keepalive
    socket.set_keepalive(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(backlog)?;
    Ok(socket)
}

/// Delays between attempts to bind an address that is still in use.
const BIND_BACKOFF: Backoff = Backoff::new(Duration::from_millis(100), Duration::from_secs(1));

fn bind_with_retry(config: &ServerConfig) -> Result<ListeningSocket, SocketError> {
    let addr = resolve(config)?;

    let socket = retry_until(config.bind_timeout(), BIND_BACKOFF, || match bind(addr, config.backlog) {
        Ok(socket) => Attempt::Done(socket),
        Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
            tracing::debug!(address = %addr, "Address in use, retrying bind");
            Attempt::Retry(e)
        }
        Err(e) => Attempt::Fail(e),
    })
    .map_err(|err| match err {
        RetryError::TimedOut(_) => SocketError::BindTimeout {
            host: config.bind_host.clone(),
            port: config.bind_port,
            secs: config.bind_timeout_secs,
        },
        RetryError::Failed(source) => SocketError::Bind { addr, source },
    })?;

    let local_addr = socket
        .local_addr()?
        .as_socket()
        .ok_or_else(|| io::Error::new(io::ErrorKind::Unsupported, "not an inet socket"))?;

    let id = SocketId::next();
    tracing::info!(socket_id = %id, address = %local_addr, backlog = config.backlog, "Listener bound");

    Ok(ListeningSocket {
        id,
        socket,
        local_addr,
        tls: None,
    })
}
