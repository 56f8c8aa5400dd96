use sens_cache::{Channel, Error, ReadMode};
use smol_macros::Executor;

use super::Update;

/// Blocking consumer of one stream; forwards each decoded line upstream.
pub(super) struct LineReader {
    channel: Channel,
    label: String,
    sender: async_channel::Sender<Update>,
}

impl LineReader {
    pub(super) fn spawn(
        ex: &Executor<'_>,
        channel: Channel,
        label: String,
        sender: async_channel::Sender<Update>,
    ) {
        let reader = Self {
            channel,
            label,
            sender,
        };
        ex.spawn(reader.run()).detach();
    }

    async fn run(self) {
        let mut cursor = 0;
        let mut line = Vec::new();
        loop {
            match self
                .channel
                .read(&mut line, 64, cursor, ReadMode::Blocking)
                .await
            {
                Ok(pass) => {
                    cursor = pass.cursor;
                    if cursor == 0 && !line.is_empty() {
                        let text = String::from_utf8_lossy(&line).trim().to_string();
                        line.clear();
                        let update = Update::Line {
                            label: self.label.clone(),
                            text,
                        };
                        if self.sender.send(update).await.is_err() {
                            break;
                        }
                    }
                }
                Err(Error::Interrupted) => {
                    println!("{}: Ctrl+C received", self.label);
                    let _ = self.sender.send(Update::TaskDone).await;
                    break;
                }
                Err(err) => {
                    log::warn!("{}: read failed: {err}", self.label);
                    let _ = self.sender.send(Update::TaskDone).await;
                    break;
                }
            }
        }
    }
}
