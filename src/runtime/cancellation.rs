//! At most one live cancellation handle per conversation

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

struct Slot {
    id: u64,
    token: CancellationToken,
}

#[derive(Default)]
pub struct CancellationController {
    current: Mutex<Option<Slot>>,
    next_id: AtomicU64,
}

/// Cancellation scope of one turn. Released when dropped.
pub struct TurnHandle<'a> {
    controller: &'a CancellationController,
    id: u64,
    token: CancellationToken,
}

impl CancellationController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel whatever turn is current and install a fresh handle, cancelled
    /// when `external` fires or when it is superseded.
    pub fn begin_new(&self, external: &CancellationToken) -> TurnHandle<'_> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = external.child_token();

        let previous = self.current.lock().unwrap().replace(Slot {
            id,
            token: token.clone(),
        });
        if let Some(previous) = previous {
            tracing::debug!(turn = previous.id, "Superseding turn in flight");
            previous.token.cancel();
        }

        TurnHandle {
            controller: self,
            id,
            token,
        }
    }

    /// Cancel and release the current handle without replacing it
    pub fn cancel_current(&self) -> bool {
        match self.current.lock().unwrap().take() {
            Some(slot) => {
                tracing::debug!(turn = slot.id, "Cancelling turn in flight");
                slot.token.cancel();
                true
            }
            None => false,
        }
    }

    #[cfg(test)]
    pub fn is_active(&self) -> bool {
        self.current.lock().unwrap().is_some()
    }

    fn release(&self, id: u64) {
        let mut current = self.current.lock().unwrap();
        if current.as_ref().is_some_and(|slot| slot.id == id) {
            *current = None;
        }
    }
}

impl TurnHandle<'_> {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    #[cfg(test)]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for TurnHandle<'_> {
    fn drop(&mut self) {
        self.controller.release(self.id);
    }
}
