use parking_lot::Mutex;
use std::{
    future::Future,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::debug;

struct Armed {
    serial: u64,
    cancel: CancellationToken,
}

/// Temporizador de inactividad con a lo sumo una espera viva.
///
/// Re-arming swaps the slot before cancelling the previous wait, so two
/// overlapping `arm` calls never leave two live timers. Once the sleep has
/// elapsed the callback runs to completion even if `cancel` is called
/// while it is in progress.
pub struct IdleTimer {
    slot: Arc<Mutex<Option<Armed>>>,
    serial: AtomicU64,
}

impl IdleTimer {
    pub fn new() -> Self {
        Self {
            slot: Arc::new(Mutex::new(None)),
            serial: AtomicU64::new(0),
        }
    }

    /// (Re)arma el temporizador; cancela la espera anterior.
    pub fn arm<F, Fut>(&self, after: Duration, tasks: &TaskTracker, on_fire: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let serial = self.serial.fetch_add(1, Ordering::Relaxed) + 1;
        let cancel = CancellationToken::new();
        let previous = self.slot.lock().replace(Armed {
            serial,
            cancel: cancel.clone(),
        });
        if let Some(previous) = previous {
            previous.cancel.cancel();
        }

        let slot = self.slot.clone();
        tasks.spawn(async move {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(after) => {}
            }

            {
                let mut slot = slot.lock();
                if slot.as_ref().is_some_and(|armed| armed.serial == serial) {
                    *slot = None;
                }
            }

            debug!("⏰ Temporizador de inactividad #{} vencido", serial);
            on_fire().await;
        });
    }

    /// Cancela la espera pendiente; no hace nada si no hay ninguna.
    pub fn cancel(&self) {
        if let Some(armed) = self.slot.lock().take() {
            armed.cancel.cancel();
        }
    }

    pub fn is_armed(&self) -> bool {
        self.slot.lock().is_some()
    }
}

impl Default for IdleTimer {
    fn default() -> Self {
        Self::new()
    }
}
