//! Per-session line cache and the blocking read protocol.

use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_lite::future;
use smol::lock::{Mutex, MutexGuard};

use crate::lookup::Lookup;
use crate::record::SensorRecord;
use crate::registry::SessionSlot;
use crate::{Error, Measurement};

/// Sized so any `i64` calibrated value renders without truncation.
const LINE_CAPACITY: usize = 32;

/// The cache is already current; the read loop blocks and retries.
/// Never crosses the crate boundary.
struct NotReady;

struct LineCache {
    buf: [u8; LINE_CAPACITY],
    len: usize,
}

impl LineCache {
    fn render(&mut self, millis: i64) {
        let sign = if millis < 0 { "-" } else { "" };
        let magnitude = millis.unsigned_abs();
        let line = format!(" {sign}{}.{:03}\n", magnitude / 1_000, magnitude % 1_000);
        // Capacity bounds the copy, snprintf style.
        let n = line.len().min(LINE_CAPACITY);
        self.buf[..n].copy_from_slice(&line.as_bytes()[..n]);
        self.len = n;
    }
}

/// How a read behaves when no fresh sample exists yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMode {
    Blocking,
    NonBlocking,
}

/// Outcome of one successful read call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadPass {
    /// Bytes copied to the output sink; 0 means end of the cached line.
    pub bytes: usize,
    /// Cursor for the next call; rewound to 0 once the line is consumed.
    pub cursor: usize,
}

/// One consumer session bound to a (sensor, measurement) pair.
///
/// Holds the formatted line cache behind an exclusive async lock and the
/// stamp of the sample the cache reflects. The stamp lives outside the lock
/// as an atomic so [`is_stale`](Self::is_stale) can probe freshness without
/// serializing against a reader mid-copy; it is only written while the
/// cache lock is held.
pub struct Channel {
    sensor: Arc<SensorRecord>,
    measurement: Measurement,
    lookup: Arc<dyn Lookup>,
    cache: Mutex<LineCache>,
    stamp: AtomicU64,
    stop: Option<async_broadcast::Receiver<()>>,
    _slot: Option<SessionSlot>,
}

impl Channel {
    pub(crate) fn new(
        sensor: Arc<SensorRecord>,
        measurement: Measurement,
        lookup: Arc<dyn Lookup>,
        stop: Option<async_broadcast::Receiver<()>>,
        slot: Option<SessionSlot>,
    ) -> Self {
        Self {
            sensor,
            measurement,
            lookup,
            cache: Mutex::new(LineCache {
                buf: [0; LINE_CAPACITY],
                len: 0,
            }),
            // Zero predates every real stamp, so a new channel is stale.
            stamp: AtomicU64::new(0),
            stop,
            _slot: slot,
        }
    }

    pub fn measurement(&self) -> Measurement {
        self.measurement
    }

    /// True when the sensor holds a sample newer than the cached line.
    ///
    /// Safe to evaluate without the cache lock; this is both the fast-path
    /// probe and the predicate re-checked around the blocking wait.
    pub fn is_stale(&self) -> bool {
        let (_, latest) = self.sensor.snapshot(self.measurement);
        latest > self.stamp.load(Ordering::Acquire)
    }

    /// Read up to `max_bytes` of the cached line into `out`.
    ///
    /// `cursor` is the byte offset into the line, carried by the caller
    /// across calls the way a file offset would be. A call at cursor 0
    /// starts a fresh pass: the cache is re-rendered from the latest
    /// sample, blocking until one newer than the cached stamp exists
    /// (or failing with [`Error::WouldBlock`] in non-blocking mode).
    /// Mid-line cursors serve the remaining cached bytes without any
    /// freshness check. Consuming the final byte rewinds the returned
    /// cursor to 0.
    pub async fn read(
        &self,
        out: &mut (dyn Write + Send),
        max_bytes: usize,
        cursor: usize,
        mode: ReadMode,
    ) -> Result<ReadPass, Error> {
        let mut cache = self.lock_interruptible().await?;

        if cursor == 0 {
            while self.refresh(&mut cache).is_err() {
                if mode == ReadMode::NonBlocking {
                    return Err(Error::WouldBlock);
                }
                // Never hold the session lock while asleep.
                drop(cache);
                self.wait_for_sample().await?;
                cache = self.lock_interruptible().await?;
            }
        }

        let n = max_bytes.min(cache.len.saturating_sub(cursor));
        if n == 0 {
            return Ok(ReadPass { bytes: 0, cursor });
        }
        out.write_all(&cache.buf[cursor..cursor + n])
            .map_err(Error::Fault)?;

        let advanced = cursor + n;
        let cursor = if advanced == cache.len { 0 } else { advanced };
        Ok(ReadPass { bytes: n, cursor })
    }

    /// Re-render the cached line if the sensor has a newer sample.
    ///
    /// The producer-side lock is held only for the scalar copy-out inside
    /// `snapshot`; calibration and formatting run under the session lock
    /// the caller already holds (enforced by the guard parameter).
    fn refresh(&self, cache: &mut LineCache) -> Result<(), NotReady> {
        let (raw, stamp) = self.sensor.snapshot(self.measurement);
        if stamp <= self.stamp.load(Ordering::Acquire) {
            return Err(NotReady);
        }
        let millis = self.lookup.calibrate(self.measurement, raw);
        cache.render(millis);
        self.stamp.store(stamp, Ordering::Release);
        log::debug!(
            "{} cache refreshed: raw {raw}, stamp {stamp}",
            self.measurement
        );
        Ok(())
    }

    /// Block until a sample newer than the cached one exists.
    ///
    /// The listener is registered before the predicate is re-checked, so a
    /// publish landing between the check and the await still wakes us.
    async fn wait_for_sample(&self) -> Result<(), Error> {
        loop {
            let listener = self.sensor.listen();
            if self.is_stale() {
                return Ok(());
            }
            log::trace!("{} reader waiting for a fresh sample", self.measurement);
            future::or(
                async {
                    listener.await;
                    Ok(())
                },
                async {
                    interrupted(self.stop.clone()).await;
                    Err(Error::Interrupted)
                },
            )
            .await?;
        }
    }

    async fn lock_interruptible(&self) -> Result<MutexGuard<'_, LineCache>, Error> {
        future::or(
            async { Ok(self.cache.lock().await) },
            async {
                interrupted(self.stop.clone()).await;
                Err(Error::Interrupted)
            },
        )
        .await
    }
}

/// Resolves once the interrupt signal fires; pends forever on a channel
/// with no interrupt source.
async fn interrupted(stop: Option<async_broadcast::Receiver<()>>) {
    match stop {
        Some(mut stop) => loop {
            match stop.recv().await {
                Ok(()) | Err(async_broadcast::RecvError::Overflowed(_)) => return,
                // Sender gone: interruption can no longer happen.
                Err(async_broadcast::RecvError::Closed) => {
                    std::future::pending::<()>().await
                }
            }
        },
        None => std::future::pending().await,
    }
}
