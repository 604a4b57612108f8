//! Update progress events.

use tokio::sync::broadcast;

/// Events emitted while an update runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateEvent {
    /// Querying the source for its latest candidate.
    Resolving {
        /// Source location (URL or path).
        location: String,
    },

    /// The running version is current.
    UpToDate {
        /// Version advertised by the source.
        version: String,
    },

    /// Fetching and unpacking the candidate.
    Fetching {
        /// Version being fetched.
        version: String,
    },

    /// Replacing the executable on disk.
    Swapping {
        /// Version being installed.
        version: String,
    },

    /// Update completed.
    Updated {
        /// New version.
        version: String,
    },

    /// Update aborted.
    Failed {
        /// Error message.
        message: String,
    },
}

/// Channel for receiving update events.
pub type UpdateEventsChannel = broadcast::Receiver<UpdateEvent>;

/// Sender for update events.
pub type UpdateEventsSender = broadcast::Sender<UpdateEvent>;

/// Create a new event channel pair.
#[must_use]
pub fn create_event_channel() -> (UpdateEventsSender, UpdateEventsChannel) {
    broadcast::channel(32)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_reach_every_subscriber() {
        let (tx, mut rx1) = create_event_channel();
        let mut rx2 = tx.subscribe();

        let event = UpdateEvent::Fetching {
            version: "v1.2.0".to_string(),
        };
        tx.send(event.clone()).unwrap();

        assert_eq!(rx1.recv().await.unwrap(), event);
        assert_eq!(rx2.recv().await.unwrap(), event);
    }
}
