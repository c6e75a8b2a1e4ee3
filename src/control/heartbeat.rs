// src/control/heartbeat.rs

//! Driver-side heartbeat.
//!
//! The driver sends a heartbeat frame every interval. When a send fails it
//! closes its link, moves to `Retrying` and reconnects; after `max_retries`
//! consecutive failures it moves to `Fail` and stops for good.

use std::fmt;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::ControlSection;
use crate::control::frame::write_frame;
use crate::control::packet::Packet;

pub type LinkFuture<'a> = Pin<Box<dyn Future<Output = io::Result<()>> + Send + 'a>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Init,
    Retrying,
    Fail,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Init => "INIT",
            ConnectionState::Retrying => "RETRYING",
            ConnectionState::Fail => "FAIL",
        };
        f.write_str(s)
    }
}

/// Transport the heartbeat runs over.
pub trait HeartbeatLink: Send + 'static {
    fn send_heartbeat(&mut self) -> LinkFuture<'_>;

    fn reconnect(&mut self) -> LinkFuture<'_>;

    fn close(&mut self);
}

/// Heartbeat over a TCP connection to the agent's control channel.
#[derive(Debug)]
pub struct TcpLink {
    addr: SocketAddr,
    stream: Option<TcpStream>,
}

impl TcpLink {
    pub async fn connect(addr: SocketAddr) -> io::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self {
            addr,
            stream: Some(stream),
        })
    }

    /// A link that connects on the first `reconnect`.
    pub fn disconnected(addr: SocketAddr) -> Self {
        Self { addr, stream: None }
    }
}

impl HeartbeatLink for TcpLink {
    fn send_heartbeat(&mut self) -> LinkFuture<'_> {
        Box::pin(async move {
            let stream = self
                .stream
                .as_mut()
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "not connected"))?;
            let frame = Packet::HeartbeatRequest
                .to_frame()
                .map_err(io::Error::other)?;
            write_frame(stream, &frame).await.map_err(io::Error::other)
        })
    }

    fn reconnect(&mut self) -> LinkFuture<'_> {
        Box::pin(async move {
            let stream = TcpStream::connect(self.addr).await?;
            self.stream = Some(stream);
            Ok(())
        })
    }

    fn close(&mut self) {
        self.stream = None;
    }
}

pub struct HeartbeatLoop<L: HeartbeatLink> {
    link: L,
    interval: Duration,
    max_retries: u32,
    state: watch::Sender<ConnectionState>,
}

impl<L: HeartbeatLink> fmt::Debug for HeartbeatLoop<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeartbeatLoop")
            .field("interval", &self.interval)
            .field("max_retries", &self.max_retries)
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

impl<L: HeartbeatLink> HeartbeatLoop<L> {
    pub fn new(link: L, interval: Duration, max_retries: u32) -> Self {
        let (state, _) = watch::channel(ConnectionState::Init);
        Self {
            link,
            interval,
            max_retries: max_retries.max(1),
            state,
        }
    }

    pub fn from_section(link: L, section: &ControlSection) -> Self {
        Self::new(link, section.heartbeat_interval(), section.max_retries)
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn set_state(&self, next: ConnectionState) {
        self.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            info!(from = %current, to = %next, "heartbeat connection state changed");
            *current = next;
            true
        });
    }

    /// Run until the link is given up. Returns the final state (`Fail`).
    pub async fn run(mut self) -> ConnectionState {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut failures: u32 = 0;

        loop {
            ticker.tick().await;

            match self.link.send_heartbeat().await {
                Ok(()) => {
                    if failures > 0 {
                        debug!(after = failures, "heartbeat recovered");
                    }
                    failures = 0;
                    self.set_state(ConnectionState::Init);
                }
                Err(err) => {
                    failures += 1;
                    self.link.close();
                    warn!(attempt = failures, max = self.max_retries, error = %err, "heartbeat failed");

                    if failures >= self.max_retries {
                        error!(failures, "heartbeat retries exhausted; giving up");
                        self.set_state(ConnectionState::Fail);
                        return ConnectionState::Fail;
                    }

                    self.set_state(ConnectionState::Retrying);
                    if let Err(err) = self.link.reconnect().await {
                        debug!(error = %err, "reconnect failed");
                    }
                }
            }
        }
    }
}
