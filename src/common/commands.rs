/// Requests the UI sends down to the backend worker.
#[derive(Debug, Clone)]
pub enum BackendCommand {
    /// Kick off the browser sign-in flow.
    SignIn,
    /// End the session with the auth provider and drop it locally.
    SignOut,
    /// Insert a message as the signed-in user.
    SendMessage { content: String },
    /// Fetch the next older page of history.
    LoadOlder,
    /// Broadcast a typing ping for the signed-in user.
    PublishTyping,
}
