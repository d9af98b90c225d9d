//! TCP keep-alive socket options

use crate::error::Result;
use serde::{Deserialize, Serialize};
use socket2::{SockRef, TcpKeepalive};
use std::time::Duration;
use tokio::net::TcpStream;

/// Keep-alive probe configuration applied to every socket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeepaliveSettings {
    pub enabled: bool,
    /// Idle time before the first probe
    pub time: Duration,
    /// Time between probes
    pub interval: Duration,
    /// Unanswered probes before the connection is dropped.
    /// Ignored on platforms without `TCP_KEEPCNT`.
    pub retries: u32,
}

impl Default for KeepaliveSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            time: Duration::from_secs(5),
            interval: Duration::from_secs(5),
            retries: 5,
        }
    }
}

impl KeepaliveSettings {
    /// Enabled keep-alive with default timings
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            ..Self::default()
        }
    }

    fn to_socket_keepalive(&self) -> TcpKeepalive {
        let keepalive = TcpKeepalive::new().with_time(self.time);

        #[cfg(any(
            target_os = "android",
            target_os = "freebsd",
            target_os = "fuchsia",
            target_os = "illumos",
            target_os = "ios",
            target_os = "linux",
            target_os = "macos",
            target_os = "netbsd",
            target_os = "windows",
        ))]
        let keepalive = keepalive.with_interval(self.interval);

        #[cfg(any(
            target_os = "android",
            target_os = "freebsd",
            target_os = "fuchsia",
            target_os = "illumos",
            target_os = "ios",
            target_os = "linux",
            target_os = "macos",
            target_os = "netbsd",
        ))]
        let keepalive = keepalive.with_retries(self.retries);

        keepalive
    }
}

/// Apply keep-alive settings to a connected stream; a no-op when disabled
pub fn apply(stream: &TcpStream, settings: &KeepaliveSettings) -> Result<()> {
    if !settings.enabled {
        return Ok(());
    }
    let sock = SockRef::from(stream);
    sock.set_tcp_keepalive(&settings.to_socket_keepalive())?;
    Ok(())
}
