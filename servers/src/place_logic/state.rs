use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, mpsc};

/// Shared service context: the live-connection registry plus the placement
/// counters read by the monitor. Cloned into every connection task; all
/// clones share the same underlying state.
#[derive(Clone)]
pub struct AppState {
    // Map of client_id -> outbound frame queue for that connection
    clients: Arc<Mutex<HashMap<usize, mpsc::UnboundedSender<Arc<str>>>>>,
    placed: Arc<AtomicU64>,
    store_dropped: Arc<AtomicU64>,
    malformed: Arc<AtomicU64>,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            clients: Arc::new(Mutex::new(HashMap::new())),
            placed: Arc::new(AtomicU64::new(0)),
            store_dropped: Arc::new(AtomicU64::new(0)),
            malformed: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Registers a connection and returns the receiving half of its outbound
    /// queue. Frames broadcast from here on are queued for this client.
    pub async fn add_client(&self, client_id: usize) -> mpsc::UnboundedReceiver<Arc<str>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut clients = self.clients.lock().await;
        clients.insert(client_id, tx);
        rx
    }

    /// Safe to call repeatedly, or for an id that was never registered.
    pub async fn remove_client(&self, client_id: usize) {
        let mut clients = self.clients.lock().await;
        clients.remove(&client_id);
    }

    /// Queues one shared frame for every client live at call time. A send to
    /// a client whose receiver is gone removes that client instead of
    /// failing the broadcast.
    pub async fn broadcast(&self, frame: Arc<str>) {
        let mut clients = self.clients.lock().await;
        clients.retain(|client_id, tx| {
            if tx.send(Arc::clone(&frame)).is_ok() {
                true
            } else {
                log::info!(
                    "Client {} outbound queue closed, removing from registry",
                    client_id
                );
                false
            }
        });
    }

    pub async fn client_count(&self) -> usize {
        self.clients.lock().await.len()
    }

    pub fn note_placed(&self) {
        self.placed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn note_store_dropped(&self) {
        self.store_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn note_malformed(&self) {
        self.malformed.fetch_add(1, Ordering::Relaxed);
    }

    /// (confirmed placements, placements dropped by storage, malformed frames)
    pub fn stats(&self) -> (u64, u64, u64) {
        (
            self.placed.load(Ordering::Relaxed),
            self.store_dropped.load(Ordering::Relaxed),
            self.malformed.load(Ordering::Relaxed),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn broadcast_reaches_every_registered_client() {
        let state = AppState::new();
        let mut rx1 = state.add_client(1).await;
        let mut rx2 = state.add_client(2).await;

        state.broadcast(Arc::from("frame")).await;

        assert_eq!(rx1.recv().await.as_deref(), Some("frame"));
        assert_eq!(rx2.recv().await.as_deref(), Some("frame"));
    }

    #[tokio::test]
    async fn dead_client_is_pruned_and_the_rest_still_receive() {
        let state = AppState::new();
        let rx1 = state.add_client(1).await;
        let mut rx2 = state.add_client(2).await;

        // Client 1 went away without unregistering.
        drop(rx1);

        state.broadcast(Arc::from("first")).await;
        assert_eq!(state.client_count().await, 1);
        assert_eq!(rx2.recv().await.as_deref(), Some("first"));

        state.broadcast(Arc::from("second")).await;
        assert_eq!(rx2.recv().await.as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn removed_client_receives_no_later_broadcasts() {
        let state = AppState::new();
        let mut rx = state.add_client(7).await;

        state.remove_client(7).await;
        state.broadcast(Arc::from("late")).await;

        // Sender side is gone, so the queue ends instead of delivering.
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn remove_client_is_idempotent() {
        let state = AppState::new();
        state.remove_client(42).await;

        let _rx = state.add_client(42).await;
        state.remove_client(42).await;
        state.remove_client(42).await;

        assert_eq!(state.client_count().await, 0);
    }

    #[tokio::test]
    async fn counters_accumulate_independently() {
        let state = AppState::new();
        state.note_placed();
        state.note_placed();
        state.note_store_dropped();
        state.note_malformed();

        assert_eq!(state.stats(), (2, 1, 1));
    }
}
