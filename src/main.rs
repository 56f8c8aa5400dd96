use smol_macros::{main, Executor};

mod demo;

use demo::Demo;

main! {
    async fn main(ex: &Executor<'_>) -> anyhow::Result<()> {
        env_logger::init();

        // Set a handler that sends a message through a channel.
        let (stop_sender, stop_receiver) = async_broadcast::broadcast(10);
        let handle = move || {
            stop_sender.try_broadcast(()).ok();
        };
        ctrlc::set_handler(handle)?;

        Demo::spawn(ex, stop_receiver).await
    }
}
