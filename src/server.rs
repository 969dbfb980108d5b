//! TCP listener and accept loop.
//!
//! Binds the configured address, accepts connections, and hands each one to
//! the handler. In sequential mode the next connection is not accepted until
//! the current exchange finishes; concurrent mode spawns one task per
//! connection instead.

use crate::config::{Config, ServeMode};
use crate::error::ServerError;
use crate::handler;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, trace, warn};

/// Listen backlog passed to `listen(2)`
const LISTEN_BACKLOG: i32 = 1024;

/// Server instance
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    mode: ServeMode,
    delay: Duration,
    shutdown_tx: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Server {
    /// Resolve and bind the configured address.
    ///
    /// Must be called from within a Tokio runtime.
    pub async fn bind(config: &Config) -> Result<Self, ServerError> {
        let listen = config.listen_addr();

        let addr = tokio::net::lookup_host(&listen)
            .await
            .and_then(|mut addrs| {
                addrs.next().ok_or_else(|| {
                    io::Error::new(io::ErrorKind::AddrNotAvailable, "no addresses found")
                })
            })
            .map_err(|source| ServerError::Resolve {
                addr: listen.clone(),
                source,
            })?;

        let std_listener = create_listener(addr).map_err(|source| ServerError::Bind {
            addr: listen.clone(),
            source,
        })?;
        let listener = TcpListener::from_std(std_listener)?;
        let local_addr = listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok(Server {
            listener,
            local_addr,
            mode: config.mode,
            delay: config.delay,
            shutdown_tx: Arc::new(shutdown_tx),
            shutdown_rx,
        })
    }

    /// Address the listener is bound to (resolves port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Handle that asks a running server to stop accepting.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: Arc::clone(&self.shutdown_tx),
        }
    }

    /// Accept connections until shutdown is requested.
    ///
    /// A shutdown request is observed between connections: a sequential
    /// exchange in progress finishes first, and in concurrent mode every
    /// outstanding connection task is awaited before returning.
    pub async fn run(self) -> Result<(), ServerError> {
        let Server {
            listener,
            local_addr,
            mode,
            delay,
            mut shutdown_rx,
            ..
        } = self;

        info!(
            address = %local_addr,
            mode = ?mode,
            delay_ms = delay.as_millis() as u64,
            "serving at port {}",
            local_addr.port()
        );

        let mut tasks = JoinSet::new();

        loop {
            tokio::select! {
                _ = shutdown_requested(&mut shutdown_rx) => {
                    debug!("Shutdown requested");
                    break;
                }

                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = %e, "Connection task failed");
                    }
                }

                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!(peer = %peer, "New connection");

                        match mode {
                            ServeMode::Sequential => serve_connection(stream, peer, delay).await,
                            ServeMode::Concurrent => {
                                tasks.spawn(serve_connection(stream, peer, delay));
                            }
                        }
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to accept connection");
                    }
                },
            }
        }

        drop(listener);

        if !tasks.is_empty() {
            debug!(outstanding = tasks.len(), "Waiting for connection tasks");
        }
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Connection task failed");
            }
        }

        info!(address = %local_addr, "Server stopped");
        Ok(())
    }

    /// Spawn [`Server::run`] on the current runtime.
    pub fn start(self) -> ServerHandle {
        let local_addr = self.local_addr;
        let shutdown = self.shutdown_handle();
        let task = tokio::spawn(self.run());

        ServerHandle {
            local_addr,
            shutdown,
            task,
        }
    }
}

/// Requests shutdown of a server.
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.tx.send_replace(true);
    }
}

/// A server running on a spawned task.
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown: ShutdownHandle,
    task: JoinHandle<Result<(), ServerError>>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Request shutdown and wait for the accept loop to finish.
    pub async fn stop(self) -> Result<(), ServerError> {
        self.shutdown.shutdown();

        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(ServerError::Io(io::Error::other(e))),
        }
    }
}

/// Resolves once shutdown has been requested. Never resolves if every
/// sender is gone without requesting it.
async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Run the handler for one connection, containing any error it returns.
async fn serve_connection(stream: TcpStream, peer: SocketAddr, delay: Duration) {
    match handler::handle_connection(stream, peer, delay).await {
        Ok(exchange) => {
            trace!(peer = %exchange.peer, len = exchange.message.len(), "Exchange complete");
        }
        Err(e) => {
            warn!(peer = %peer, error = %e, "Connection error");
        }
    }
}

/// Create a non-blocking TCP listener with SO_REUSEADDR.
fn create_listener(addr: SocketAddr) -> io::Result<std::net::TcpListener> {
    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(LISTEN_BACKLOG)?;

    Ok(socket.into())
}
