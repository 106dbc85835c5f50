use murmur_bridge::MessageFromBackend;
use murmur_bridge::notification::{NotificationMessage, NotificationType};
use tokio::sync::mpsc::Sender;

/// Outbound half of the bridge, shared by the session and the services.
///
/// A closed frontend is not an error for the backend: events are dropped
/// with a debug log.
#[derive(Debug, Clone)]
pub struct Publisher {
    tx: Sender<MessageFromBackend>,
}

impl Publisher {
    pub fn new(tx: Sender<MessageFromBackend>) -> Self {
        Self { tx }
    }

    /// Send a message to the frontend bridge, waiting for room in the queue.
    pub async fn publish(&self, message: MessageFromBackend) {
        if let Err(err) = self.tx.send(message).await {
            log::debug!("Frontend is gone, dropping {:?}", err.0);
        }
    }

    /// Send a notification message to the frontend bridge.
    pub async fn notify(&self, notification_type: NotificationType, content: impl Into<String>) {
        self.publish(MessageFromBackend::NotificationMessage(
            NotificationMessage::new(notification_type, content),
        ))
        .await;
    }
}
