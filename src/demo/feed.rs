use std::sync::Arc;
use std::time::Duration;

use async_io::Timer;
use sens_cache::{Measurement, SensorTable};
use smol::stream::StreamExt;
use smol_macros::Executor;

use super::Update;

/// Simulated acquisition board: one raw sample per measurement type per
/// tick, stamped with wall-clock seconds.
pub(super) struct SimFeed {
    table: Arc<SensorTable>,
    sensor: usize,
    sender: async_channel::Sender<Update>,
    stop_receiver: async_broadcast::Receiver<()>,
}

impl SimFeed {
    pub(super) fn spawn(
        ex: &Executor<'_>,
        table: Arc<SensorTable>,
        sensor: usize,
        sender: async_channel::Sender<Update>,
        stop_receiver: async_broadcast::Receiver<()>,
    ) {
        let feed = Self {
            table,
            sensor,
            sender,
            stop_receiver,
        };
        ex.spawn(feed.run()).detach();
    }

    async fn run(mut self) {
        let mut timeout = Timer::interval(Duration::from_secs(1));
        let mut tick = 0u64;
        loop {
            if timeout.next().await.is_some() {
                let stamp = chrono::Utc::now().timestamp() as u64;
                for measurement in Measurement::ALL {
                    let raw = Self::sample(measurement, self.sensor, tick);
                    let _ = self.table.publish(self.sensor, measurement, raw, stamp);
                }
                tick += 1;
            }
            if self.stop_receiver.try_recv().is_ok() {
                println!("SimFeed {}: Ctrl+C received", self.sensor);
                let _ = self.sender.send(Update::TaskDone).await;
                break;
            }
        }
    }

    /// Deterministic triangle waves, phase-shifted per sensor.
    fn sample(measurement: Measurement, sensor: usize, tick: u64) -> u16 {
        let phase = (tick + sensor as u64 * 7) % 64;
        let ramp = if phase < 32 { phase } else { 64 - phase } as u16;
        match measurement {
            Measurement::Battery => 900 - ramp * 4,
            Measurement::Temperature => 4_100 + ramp * 25,
            Measurement::Light => 200 + ramp * 30,
        }
    }
}
