//! Cooperative shutdown signal.
//!
//! One boolean flag for the whole process, transitioning false -> true exactly
//! once. The acceptor selects on [`Shutdown::requested`] to abandon a blocked
//! accept; workers poll [`Shutdown::is_requested`] between messages so an
//! in-flight exchange always completes.

use tokio::sync::watch;

/// Read side of the shutdown flag, cloned into the acceptor and every worker.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

/// Write side, held by whatever wires up signal delivery.
#[derive(Debug)]
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
}

/// Create a linked handle/flag pair.
pub fn channel() -> (ShutdownHandle, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownHandle { tx }, Shutdown { rx })
}

impl ShutdownHandle {
    /// Request shutdown. Idempotent; there is no reverse transition.
    pub fn trigger(&self) {
        // send only fails with no receivers, at which point nobody is left
        // to observe the flag anyway
        let _ = self.tx.send(true);
    }
}

impl Shutdown {
    /// Non-blocking check, used at the top of each worker receive cycle.
    pub fn is_requested(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown has been requested.
    pub async fn requested(&mut self) {
        // wait_for only errs if the sender is dropped without triggering;
        // treat that as shutdown so nothing blocks forever
        let _ = self.rx.wait_for(|v| *v).await;
    }
}
