/// Severity of a user-visible notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationType {
    /// Neutral informational message that does not indicate success or failure.
    Info,
    /// Indicates a successful operation or positive outcome.
    Success,
    /// A problem the user should know about that does not stop transcription,
    /// such as audio that could not be decoded.
    Warning,
    /// A failed operation, such as a model that could not be loaded.
    Error,
}

/// A notification payload intended for the user interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationMessage {
    pub notification_type: NotificationType,
    pub message: String,
}

impl NotificationMessage {
    pub fn new(notification_type: NotificationType, message: impl Into<String>) -> Self {
        Self {
            notification_type,
            message: message.into(),
        }
    }
}
