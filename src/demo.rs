mod feed;
mod reader;

use std::sync::Arc;

use async_channel::bounded;
use sens_cache::{CalibrationTables, Measurement, SensorTable};
use smol_macros::Executor;

use feed::SimFeed;
use reader::LineReader;

const SENSOR_COUNT: usize = 2;

pub(crate) enum Update {
    Line { label: String, text: String },
    TaskDone,
}

pub(crate) struct Demo {
    receiver: async_channel::Receiver<Update>,
    tasks: usize,
}

impl Demo {
    pub(crate) async fn spawn(
        ex: &Executor<'_>,
        stop_receiver: async_broadcast::Receiver<()>,
    ) -> anyhow::Result<()> {
        let table = Arc::new(
            SensorTable::new(SENSOR_COUNT, Arc::new(CalibrationTables))
                .with_interrupt(stop_receiver.clone())
                .with_session_limit(SENSOR_COUNT * 8),
        );

        let (sender, receiver) = bounded(10);
        let mut tasks = 0;

        for sensor in 0..SENSOR_COUNT {
            SimFeed::spawn(
                ex,
                table.clone(),
                sensor,
                sender.clone(),
                stop_receiver.clone(),
            );
            tasks += 1;
        }
        for sensor in 0..SENSOR_COUNT {
            for measurement in Measurement::ALL {
                let channel = table.open(sensor, measurement)?;
                let label = format!("sensor{sensor}/{measurement}");
                LineReader::spawn(ex, channel, label, sender.clone());
                tasks += 1;
            }
        }

        let actor = Self { receiver, tasks };
        actor.run().await;
        Ok(())
    }

    pub(crate) async fn run(mut self) {
        while let Ok(update) = self.receiver.recv().await {
            match update {
                Update::Line { label, text } => println!("[{label}] {text}"),
                Update::TaskDone => {
                    self.tasks -= 1;
                    if self.tasks == 0 {
                        println!("All tasks are done, exit");
                        break;
                    }
                }
            }
        }
    }
}
