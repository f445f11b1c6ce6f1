use tokio::sync::mpsc;

use crate::common::{BackendCommand, BackendEvent, Session, TypingPing};
use crate::config::AppConfig;

use super::realtime::{FeedUpdate, RealtimeFeed};
use super::{Error, auth, rest};

/// Background half of the app. Owns the HTTP client, the realtime feed and
/// the session, and talks to the UI purely through the two channels.
pub struct BackendClient {
    config: AppConfig,
    http: reqwest::Client,
    event_sender: mpsc::Sender<BackendEvent>,
    command_receiver: mpsc::Receiver<BackendCommand>,
    session: Option<Session>,
    /// Rows fetched through REST so far; the next page starts here.
    history_offset: usize,
    /// The sign-in flow runs in its own task (it waits on a browser);
    /// results come back through this channel.
    auth_result_sender: mpsc::Sender<Result<Session, Error>>,
    auth_results: mpsc::Receiver<Result<Session, Error>>,
    auth_in_flight: bool,
}

impl BackendClient {
    pub fn new(
        config: AppConfig,
        event_sender: mpsc::Sender<BackendEvent>,
        command_receiver: mpsc::Receiver<BackendCommand>,
    ) -> Self {
        let (auth_result_sender, auth_results) = mpsc::channel(1);
        Self {
            config,
            http: reqwest::Client::new(),
            event_sender,
            command_receiver,
            session: None,
            history_offset: 0,
            auth_result_sender,
            auth_results,
            auth_in_flight: false,
        }
    }

    pub async fn run(mut self) -> Result<(), Error> {
        let mut feed = RealtimeFeed::new(self.config.clone());
        self.fetch_history("Could not load messages", &mut feed).await;

        loop {
            tokio::select! {
                command = self.command_receiver.recv() => {
                    match command {
                        Some(command) => self.handle_command(command, &mut feed).await,
                        // UI gone; shut down.
                        None => break,
                    }
                }
                result = self.auth_results.recv() => {
                    if let Some(result) = result {
                        self.finish_sign_in(result, &mut feed).await;
                    }
                }
                update = feed.next_update() => {
                    self.handle_feed_update(update).await;
                }
            }
        }

        feed.shutdown().await;
        Ok(())
    }

    async fn handle_command(&mut self, command: BackendCommand, feed: &mut RealtimeFeed) {
        match command {
            BackendCommand::SignIn => self.start_sign_in().await,
            BackendCommand::SignOut => self.sign_out(feed).await,
            BackendCommand::SendMessage { content } => self.send_message(content, feed).await,
            BackendCommand::LoadOlder => {
                self.fetch_history("Could not load older messages", feed).await;
            }
            BackendCommand::PublishTyping => {
                if let Some(session) = &self.session {
                    let ping = TypingPing {
                        user_id: session.user_id.clone(),
                        username: session.username.clone(),
                    };
                    feed.publish_typing(&ping).await;
                }
            }
        }
    }

    async fn handle_feed_update(&mut self, update: FeedUpdate) {
        match update {
            FeedUpdate::Connected => {
                log::info!("Realtime channels joined");
                self.emit(BackendEvent::ChannelStatus { connected: true }).await;
            }
            FeedUpdate::MessageInserted(message) => {
                self.emit(BackendEvent::MessageReceived(message)).await;
            }
            FeedUpdate::Typing(ping) => {
                self.emit(BackendEvent::TypingReceived(ping)).await;
            }
            FeedUpdate::Disconnected(reason) => {
                log::warn!("Realtime feed down: {reason}");
                self.emit(BackendEvent::ChannelStatus { connected: false }).await;
            }
        }
    }

    async fn start_sign_in(&mut self) {
        if self.auth_in_flight {
            log::info!("Sign-in already in progress; ignoring");
            return;
        }
        self.auth_in_flight = true;
        self.emit(BackendEvent::SignInStarted).await;

        let http = self.http.clone();
        let config = self.config.clone();
        let results = self.auth_result_sender.clone();
        tokio::spawn(async move {
            let result = auth::sign_in(&http, &config).await;
            let _ = results.send(result).await;
        });
    }

    async fn finish_sign_in(&mut self, result: Result<Session, Error>, feed: &mut RealtimeFeed) {
        self.auth_in_flight = false;
        match result {
            Ok(session) => {
                log::info!("Signed in as {} ({})", session.username, session.user_id);
                feed.set_access_token(Some(session.access_token.clone())).await;
                self.session = Some(session.clone());
                self.emit(BackendEvent::SessionEstablished(session)).await;
            }
            Err(err) => {
                log::warn!("Sign-in failed: {err}");
                self.emit(BackendEvent::SignInFailed("Could not sign you in".to_string()))
                    .await;
            }
        }
    }

    async fn sign_out(&mut self, feed: &mut RealtimeFeed) {
        if let Some(session) = self.session.take() {
            // Local session is gone regardless of what the server says.
            if let Err(err) = auth::sign_out(&self.http, &self.config, &session.access_token).await {
                log::warn!("Logout call failed: {err}");
            }
        }
        feed.set_access_token(None).await;
        self.emit(BackendEvent::SignedOut).await;
    }

    async fn send_message(&mut self, content: String, feed: &mut RealtimeFeed) {
        let Some(session) = self.session.clone() else {
            log::warn!("SendMessage without a session; dropping");
            return;
        };
        match rest::insert_message(&self.http, &self.config, &session, &content).await {
            Ok(()) => {}
            Err(err) if err.is_session_expired() => self.expire_session(feed).await,
            Err(err) => {
                log::warn!("Message insert failed: {err}");
                self.emit(BackendEvent::ActionFailed(
                    "Could not send your message".to_string(),
                ))
                .await;
            }
        }
    }

    async fn fetch_history(&mut self, failure: &str, feed: &mut RealtimeFeed) {
        match rest::fetch_page(
            &self.http,
            &self.config,
            self.session.as_ref(),
            self.history_offset,
        )
        .await
        {
            Ok(page) => {
                self.history_offset += page.messages.len();
                self.emit(BackendEvent::HistoryLoaded {
                    messages: page.messages,
                    exhausted: page.exhausted,
                })
                .await;
            }
            Err(err) if err.is_session_expired() && self.session.is_some() => {
                self.expire_session(feed).await;
            }
            Err(err) => {
                log::warn!("History fetch failed: {err}");
                self.emit(BackendEvent::ActionFailed(failure.to_string())).await;
            }
        }
    }

    async fn expire_session(&mut self, feed: &mut RealtimeFeed) {
        self.session = None;
        feed.set_access_token(None).await;
        self.emit(BackendEvent::SessionExpired).await;
    }

    async fn emit(&self, event: BackendEvent) {
        if let Err(err) = self.event_sender.send(event).await {
            log::warn!("UI event channel closed: {err}");
        }
    }
}
