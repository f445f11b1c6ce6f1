use crate::common::types::{Message, Session, TypingPing};

/// Notifications the backend worker sends up to the UI.
#[derive(Debug, Clone)]
pub enum BackendEvent {
    /// The sign-in flow was handed to the system browser.
    SignInStarted,
    SessionEstablished(Session),
    /// The browser flow came back empty; the text is presentable.
    SignInFailed(String),
    SignedOut,
    /// The backend rejected our token; the session has been dropped.
    SessionExpired,
    /// One page of history, oldest first. `exhausted` means the page came
    /// up short and no older rows remain.
    HistoryLoaded {
        messages: Vec<Message>,
        exhausted: bool,
    },
    /// A row inserted while we are subscribed.
    MessageReceived(Message),
    TypingReceived(TypingPing),
    /// Realtime link up or down. Drives the header indicator.
    ChannelStatus { connected: bool },
    /// A user-visible action failed; the text is already presentable.
    ActionFailed(String),
}
