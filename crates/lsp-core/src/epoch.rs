//! The epoch clock: a periodic tick delivered to the event loop until
//! cancelled. Has no shared state with the event loop — it only knows how
//! to push onto a channel.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Spawns the epoch clock. Returns its join handle and a cancellation
/// sender; dropping or firing the cancellation sender stops the clock.
pub fn spawn(period: Duration, tx: mpsc::UnboundedSender<()>) -> (JoinHandle<()>, oneshot::Sender<()>) {
    let (cancel_tx, mut cancel_rx) = oneshot::channel();
    let handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.tick().await; // first tick is immediate; the event loop only wants periodic ticks
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if tx.send(()).is_err() {
                        break;
                    }
                }
                _ = &mut cancel_rx => break,
            }
        }
    });
    (handle, cancel_tx)
}
