//! Payload-free change signal between processes sharing a container.
//!
//! A channel is a directory under `<container>/channels/`. Every observer
//! binds a Unix datagram socket there; posting sends an empty datagram to
//! each socket found. Delivery is fire-and-forget: a full observer queue or a
//! channel with no observers drops the signal, and observers must re-read
//! the shared state on startup to cover anything they missed.

use std::path::{Path, PathBuf};

#[cfg(unix)]
use std::os::unix::net::UnixDatagram;
#[cfg(unix)]
use std::sync::atomic::{AtomicU64, Ordering};
#[cfg(unix)]
use std::time::Duration;
#[cfg(unix)]
use std::{fs, io};

use crate::error::Result;
#[cfg(not(unix))]
use crate::error::StoreError;

/// Well-known channel the filter posts on after appending to the spam log.
pub const DEFAULT_CHANNEL: &str = "sieve.spamlog.changed";

const CHANNELS_DIR: &str = "channels";
const ENDPOINT_EXT: &str = "sock";

#[cfg(unix)]
static NEXT_ENDPOINT: AtomicU64 = AtomicU64::new(0);

/// Keep channel names usable as a single path component. Names made only of
/// dots (or nothing) would resolve outside `channels/`, so they become `_`.
fn sanitize_channel(name: &str) -> String {
    if name.chars().all(|c| c == '.') {
        return "_".to_string();
    }
    name.chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

pub fn channel_dir(container: &Path, channel: &str) -> PathBuf {
    container
        .join(CHANNELS_DIR)
        .join(sanitize_channel(channel))
}

/// Posting side of a channel.
#[derive(Clone, Debug)]
pub struct Notifier {
    dir: PathBuf,
}

impl Notifier {
    pub fn new(container: &Path, channel: &str) -> Self {
        Self {
            dir: channel_dir(container, channel),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Signal every current observer. Returns how many endpoints accepted the
    /// datagram; failures are logged and otherwise ignored. Endpoints whose
    /// owner has gone away are removed.
    #[cfg(unix)]
    pub fn notify_changed(&self) -> usize {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(_) => return 0,
        };
        let socket = match UnixDatagram::unbound() {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!("change notification skipped: {e}");
                return 0;
            }
        };
        if let Err(e) = socket.set_nonblocking(true) {
            tracing::warn!("change notification skipped: {e}");
            return 0;
        }

        let mut delivered = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ENDPOINT_EXT) {
                continue;
            }
            match socket.send_to(&[], &path) {
                Ok(_) => delivered += 1,
                Err(e) if matches!(e.kind(), io::ErrorKind::ConnectionRefused | io::ErrorKind::NotFound) => {
                    tracing::debug!("pruning stale endpoint {}", path.display());
                    let _ = fs::remove_file(&path);
                }
                Err(e) => tracing::debug!("signal to {} dropped: {e}", path.display()),
            }
        }
        tracing::debug!("change signal delivered to {delivered} observer(s)");
        delivered
    }

    #[cfg(not(unix))]
    pub fn notify_changed(&self) -> usize {
        tracing::debug!("change notification unsupported on this platform");
        0
    }
}

/// Receiving side of a channel. The endpoint is removed on drop.
#[cfg(unix)]
pub struct ChangeObserver {
    socket: UnixDatagram,
    path: PathBuf,
}

#[cfg(unix)]
impl ChangeObserver {
    pub fn subscribe(container: &Path, channel: &str) -> Result<Self> {
        let dir = channel_dir(container, channel);
        fs::create_dir_all(&dir)?;

        let n = NEXT_ENDPOINT.fetch_add(1, Ordering::Relaxed);
        let path = dir.join(format!("{}-{n}.{ENDPOINT_EXT}", std::process::id()));
        // A leftover endpoint from a dead process with a recycled pid.
        let _ = fs::remove_file(&path);

        let socket = UnixDatagram::bind(&path)?;
        tracing::info!("subscribed to {} at {}", channel, path.display());
        Ok(Self { socket, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn socket(&self) -> &UnixDatagram {
        &self.socket
    }

    /// Block up to `timeout` for a signal. Signals queued behind the first
    /// one are drained, so a burst of appends wakes the observer once.
    pub fn wait(&self, timeout: Duration) -> Result<bool> {
        let timeout = timeout.max(Duration::from_millis(1));
        self.socket.set_read_timeout(Some(timeout))?;

        let mut buf = [0u8; 16];
        match self.socket.recv(&mut buf) {
            Ok(_) => {
                self.drain()?;
                Ok(true)
            }
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn drain(&self) -> Result<()> {
        self.socket.set_nonblocking(true)?;
        let mut buf = [0u8; 16];
        while self.socket.recv(&mut buf).is_ok() {}
        self.socket.set_nonblocking(false)?;
        Ok(())
    }
}

#[cfg(unix)]
impl Drop for ChangeObserver {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

#[cfg(not(unix))]
pub struct ChangeObserver;

#[cfg(not(unix))]
impl ChangeObserver {
    pub fn subscribe(_container: &Path, _channel: &str) -> Result<Self> {
        Err(StoreError::InvalidData(
            "change observation requires Unix domain sockets".into(),
        ))
    }
}
