// Best-effort datagram channel between operator and robot
//
// Sends are fire-and-forget. Receives return at most one datagram and never
// wait past the caller's timeout. Bad datagrams are logged and counted here,
// never returned as errors.

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

use crate::config::{MAX_DATAGRAM, MIN_DATAGRAM};

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Could not bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// One received payload and its sender
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    pub payload: Vec<u8>,
    pub from: SocketAddr,
}

/// Link counters, updated from any context
#[derive(Debug, Default)]
pub struct LinkStats {
    received: AtomicU64,
    undersized: AtomicU64,
    oversized: AtomicU64,
    malformed: AtomicU64,
    send_failures: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStatsSnapshot {
    pub received: u64,
    pub undersized: u64,
    pub oversized: u64,
    pub malformed: u64,
    pub send_failures: u64,
}

impl LinkStats {
    /// Count a datagram that arrived but did not decode
    pub fn record_malformed(&self) {
        self.malformed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> LinkStatsSnapshot {
        LinkStatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            undersized: self.undersized.load(Ordering::Relaxed),
            oversized: self.oversized.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
        }
    }
}

impl fmt::Display for LinkStatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "received={} undersized={} oversized={} malformed={} send_failures={}",
            self.received, self.undersized, self.oversized, self.malformed, self.send_failures
        )
    }
}

pub struct CommandChannel {
    socket: UdpSocket,
    stats: LinkStats,
}

impl CommandChannel {
    pub async fn bind(addr: SocketAddr) -> Result<Self, ChannelError> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| ChannelError::Bind { addr, source })?;
        info!("Channel bound to {}", socket.local_addr()?);
        Ok(Self {
            socket,
            stats: LinkStats::default(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ChannelError> {
        Ok(self.socket.local_addr()?)
    }

    pub fn stats(&self) -> &LinkStats {
        &self.stats
    }

    /// Fire-and-forget send. Failures are counted, not returned.
    pub async fn send(&self, bytes: &[u8], dest: SocketAddr) {
        if let Err(e) = self.socket.send_to(bytes, dest).await {
            self.stats.send_failures.fetch_add(1, Ordering::Relaxed);
            debug!("Send to {} failed: {}", dest, e);
        }
    }

    /// Wait up to `timeout` for one datagram
    ///
    /// `None` means nothing usable arrived: timeout, socket error, or a
    /// datagram of the wrong size.
    pub async fn try_receive(&self, timeout: Duration) -> Option<Datagram> {
        // One spare byte so an oversized datagram is detectable
        let mut buf = vec![0u8; MAX_DATAGRAM + 1];

        let (len, from) = match tokio::time::timeout(timeout, self.socket.recv_from(&mut buf)).await
        {
            Err(_) => return None,
            Ok(Err(e)) => {
                // e.g. ICMP port unreachable surfacing from an earlier send
                debug!("Receive error: {}", e);
                return None;
            }
            Ok(Ok(received)) => received,
        };

        self.stats.received.fetch_add(1, Ordering::Relaxed);
        if len < MIN_DATAGRAM {
            self.stats.undersized.fetch_add(1, Ordering::Relaxed);
            warn!("Dropped undersized datagram ({} bytes) from {}", len, from);
            return None;
        }
        if len > MAX_DATAGRAM {
            self.stats.oversized.fetch_add(1, Ordering::Relaxed);
            warn!("Dropped oversized datagram from {}", from);
            return None;
        }

        buf.truncate(len);
        Some(Datagram { payload: buf, from })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    async fn pair() -> (CommandChannel, CommandChannel) {
        let a = CommandChannel::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let b = CommandChannel::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        (a, b)
    }

    #[tokio::test]
    async fn test_send_and_receive() {
        let (a, b) = pair().await;
        a.send(br#"{"Left":1,"Right":0}"#, b.local_addr().unwrap())
            .await;

        let dgram = b.try_receive(Duration::from_secs(1)).await.unwrap();
        assert_eq!(dgram.payload, br#"{"Left":1,"Right":0}"#.to_vec());
        assert_eq!(dgram.from, a.local_addr().unwrap());
        assert_eq!(b.stats().snapshot().received, 1);
    }

    #[tokio::test]
    async fn test_timeout_is_not_an_error() {
        let (_a, b) = pair().await;
        let start = Instant::now();
        assert!(b.try_receive(Duration::from_millis(20)).await.is_none());
        assert!(start.elapsed() < Duration::from_millis(500));
        assert_eq!(b.stats().snapshot(), LinkStatsSnapshot::default());
    }

    #[tokio::test]
    async fn test_undersized_and_oversized_are_counted() {
        let (a, b) = pair().await;
        let dest = b.local_addr().unwrap();
        a.send(b"x", dest).await;
        a.send(&vec![b'{'; MAX_DATAGRAM + 10], dest).await;

        assert!(b.try_receive(Duration::from_secs(1)).await.is_none());
        assert!(b.try_receive(Duration::from_secs(1)).await.is_none());

        let stats = b.stats().snapshot();
        assert_eq!(stats.received, 2);
        assert_eq!(stats.undersized, 1);
        assert_eq!(stats.oversized, 1);
    }

    #[test]
    fn test_snapshot_display() {
        let stats = LinkStats::default();
        stats.record_malformed();
        assert_eq!(
            stats.snapshot().to_string(),
            "received=0 undersized=0 oversized=0 malformed=1 send_failures=0"
        );
    }
}
