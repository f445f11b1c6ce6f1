use std::time::Instant;

use eframe::egui;
use tokio::sync::mpsc;

use crate::common::{BackendCommand, BackendEvent};
use crate::notify::{self, MessageChime};
use crate::storage::{Preferences, prefs};

use super::components::{chat_area, header_bar, input_bar, toasts, typing_bar};
use super::state::AppState;

pub struct LobbyApp {
    state: AppState,
    command_sender: mpsc::Sender<BackendCommand>,
    event_receiver: mpsc::Receiver<BackendEvent>,
    chime: MessageChime,
    prefs_path: String,
}

impl LobbyApp {
    pub fn new(
        _cc: &eframe::CreationContext<'_>,
        command_sender: mpsc::Sender<BackendCommand>,
        event_receiver: mpsc::Receiver<BackendEvent>,
        prefs: Preferences,
        prefs_path: String,
        provider_label: String,
    ) -> Self {
        Self {
            state: AppState::new(prefs.sound_enabled, provider_label),
            command_sender,
            event_receiver,
            chime: MessageChime::new(),
            prefs_path,
        }
    }

    fn handle_backend_events(&mut self, ctx: &egui::Context) {
        let now = Instant::now();
        let focused = ctx.input(|i| i.viewport().focused.unwrap_or(true));

        while let Ok(event) = self.event_receiver.try_recv() {
            match event {
                BackendEvent::SignInStarted => self.state.sign_in_pending = true,
                BackendEvent::SessionEstablished(session) => self.state.set_session(session),
                BackendEvent::SignInFailed(text) => {
                    self.state.sign_in_pending = false;
                    self.state.push_toast(text, now);
                }
                BackendEvent::SignedOut => self.state.clear_session(),
                BackendEvent::SessionExpired => {
                    self.state.clear_session();
                    self.state.release_loading();
                    self.state
                        .push_toast("Your session expired; sign in again", now);
                }
                BackendEvent::HistoryLoaded {
                    messages,
                    exhausted,
                } => self.state.apply_history(messages, exhausted),
                BackendEvent::MessageReceived(message) => {
                    let own = self
                        .state
                        .session
                        .as_ref()
                        .is_some_and(|s| s.user_id == message.user_id);
                    let is_new = self.state.insert_message(message.clone());
                    if is_new && !own {
                        if self.state.sound_enabled {
                            self.chime.play();
                        }
                        if !focused {
                            notify::notify_message(message.display_name(), &message.content);
                        }
                        // Someone who just posted is no longer typing.
                        self.state.drop_typing(&message.user_id);
                    }
                }
                BackendEvent::TypingReceived(ping) => self.state.record_typing(ping, now),
                BackendEvent::ChannelStatus { connected } => self.state.connected = connected,
                BackendEvent::ActionFailed(text) => {
                    self.state.release_loading();
                    self.state.push_toast(text, now);
                }
            }
        }
    }

    fn send_command(&mut self, command: BackendCommand) {
        if let Err(err) = self.command_sender.try_send(command) {
            log::warn!("Failed to send command to backend: {err}");
        }
    }

    fn persist_prefs(&self) {
        let prefs = Preferences {
            sound_enabled: self.state.sound_enabled,
        };
        if let Err(err) = prefs::save(&self.prefs_path, &prefs) {
            log::warn!("Failed to persist preferences: {err}");
        }
    }
}

impl eframe::App for LobbyApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.handle_backend_events(ctx);

        let now = Instant::now();
        self.state.sweep_typing(now);
        self.state.sweep_toasts(now);

        egui::TopBottomPanel::top("header").show(ctx, |ui| {
            let actions = header_bar::render(ui, &mut self.state);
            if actions.sign_in {
                self.send_command(BackendCommand::SignIn);
            }
            if actions.sign_out {
                self.send_command(BackendCommand::SignOut);
            }
            if actions.sound_toggled {
                self.persist_prefs();
            }
        });

        egui::TopBottomPanel::bottom("composer").show(ctx, |ui| {
            typing_bar::render(ui, &self.state);
            let can_submit = self.state.can_submit();
            let actions = input_bar::render(ui, &mut self.state.input_text, can_submit);
            if actions.typed && self.state.should_ping_typing(now) {
                self.send_command(BackendCommand::PublishTyping);
            }
            if let Some(content) = actions.submit {
                self.send_command(BackendCommand::SendMessage { content });
            }
            ui.add_space(6.0);
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            let actions = chat_area::render(ui, &mut self.state);
            if actions.load_older {
                self.send_command(BackendCommand::LoadOlder);
            }
        });

        toasts::render(ctx, &self.state);

        // Events and typing expiry arrive off-frame; keep painting.
        ctx.request_repaint();
    }
}
