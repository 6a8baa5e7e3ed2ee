//! Single running daemon per user, enforced through a loopback TCP port.
//!
//! The lock is advisory: whoever holds the listener is the daemon. The OS
//! releases the port when the holder dies, so there is no stale lock file to
//! clean up.
//!
//! Acquiring is synchronous so the port can be claimed before the process
//! forks into the background; the listener joins the async runtime only when
//! [`InstanceGuard::serve`] runs.

use std::{
    io,
    net::{self, Ipv4Addr, SocketAddr},
    time::Duration,
};

use anyhow::{Context, Result};
use log::{debug, error, info};
use tokio::{
    net::{TcpListener, TcpStream},
    time::timeout,
};
use tokio_stream::{StreamExt, wrappers::TcpListenerStream};
use tokio_util::sync::CancellationToken;

pub const DEFAULT_LOCK_PORT: u16 = 8989;

/// Process exit code when the lock port cannot be bound for another reason.
pub const EXIT_LOCK_FAILURE: u8 = 3;

const CONNECT_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug)]
pub enum Acquisition {
    Acquired(InstanceGuard),
    AlreadyRunning,
}

/// Held lock port. Dropping it releases the lock.
#[derive(Debug)]
pub struct InstanceGuard {
    listener: net::TcpListener,
    port: u16,
}

impl InstanceGuard {
    /// Claims the lock port on 127.0.0.1.
    ///
    /// Port 0 asks the OS for any free port, which is only useful in tests.
    pub fn acquire(port: u16) -> Result<Acquisition> {
        if port != 0 && net::TcpStream::connect_timeout(&lock_addr(port), CONNECT_TIMEOUT).is_ok() {
            return Ok(Acquisition::AlreadyRunning);
        }

        match net::TcpListener::bind(lock_addr(port)) {
            Ok(listener) => {
                listener
                    .set_nonblocking(true)
                    .context("Failed to make the lock listener non-blocking")?;
                let port = listener
                    .local_addr()
                    .context("Lock listener has no local address")?
                    .port();
                info!("Holding instance lock on 127.0.0.1:{port}");
                Ok(Acquisition::Acquired(Self { listener, port }))
            }
            Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
                debug!("Lock port {port} taken during startup");
                Ok(Acquisition::AlreadyRunning)
            }
            Err(e) => Err(e).with_context(|| format!("Failed to bind lock port {port}")),
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Accepts and drops liveness checks until `cancel` fires.
    ///
    /// Must run inside the runtime that drives the daemon.
    pub async fn serve(self, cancel: CancellationToken) {
        let port = self.port;
        let listener = match TcpListener::from_std(self.listener) {
            Ok(listener) => listener,
            Err(e) => {
                error!("Cannot watch lock port {port}: {e}");
                cancel.cancelled().await;
                return;
            }
        };

        let mut incoming = TcpListenerStream::new(listener);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                next = incoming.next() => match next {
                    Some(Ok(stream)) => {
                        debug!("Liveness check from {:?}", stream.peer_addr().ok());
                        drop(stream);
                    }
                    Some(Err(e)) => debug!("Lock port accept failed: {e}"),
                    None => break,
                },
            }
        }
        info!("Released instance lock on 127.0.0.1:{port}");
    }
}

/// Whether something answers on the lock port.
pub async fn is_running(port: u16) -> bool {
    matches!(
        timeout(CONNECT_TIMEOUT, TcpStream::connect(lock_addr(port))).await,
        Ok(Ok(_))
    )
}

fn lock_addr(port: u16) -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, port))
}
