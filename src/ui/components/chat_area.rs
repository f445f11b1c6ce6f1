use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Local, NaiveDate, Utc};
use eframe::egui;

use crate::common::Message;
use crate::ui::state::AppState;

/// What the chat area wants done after this frame.
#[derive(Default)]
pub struct ChatAreaActions {
    pub load_older: bool,
}

pub fn render(ui: &mut egui::Ui, state: &mut AppState) -> ChatAreaActions {
    let mut actions = ChatAreaActions::default();

    let output = egui::ScrollArea::vertical()
        .id_salt("chat_scroll")
        .auto_shrink([false, false])
        .stick_to_bottom(true)
        .show(ui, |ui| {
            if !state.history_loaded {
                ui.vertical_centered(|ui| {
                    ui.add_space(24.0);
                    ui.spinner();
                });
                return;
            }

            if !state.history_exhausted {
                ui.vertical_centered(|ui| {
                    if state.loading_older {
                        ui.spinner();
                    } else if ui.button("Load older messages").clicked() {
                        actions.load_older = true;
                    }
                });
            }

            if state.messages.is_empty() {
                ui.vertical_centered(|ui| {
                    ui.add_space(24.0);
                    ui.label(egui::RichText::new("No messages yet. Say hello!").weak());
                });
                return;
            }

            let mut last_date: Option<NaiveDate> = None;
            for message in &state.messages {
                let day = local_day(message.created_at);
                if last_date != Some(day) {
                    date_separator(ui, day);
                    last_date = Some(day);
                }
                message_row(ui, message);
            }
            ui.add_space(4.0);
        });

    // After a prepend, put the viewport back at the same distance from the
    // bottom it had before the fetch, so the view does not jump.
    if let Some(distance) = state.restore_anchor.take() {
        let mut scroll_state = output.state.clone();
        scroll_state.offset.y = (output.content_size.y - distance).max(0.0);
        scroll_state.store(ui.ctx(), output.id);
        ui.ctx().request_repaint();
    }

    state.last_scroll_offset = output.state.offset.y;
    state.last_content_height = output.content_size.y;

    // Capture the anchor before any rows move; the caller turns the click
    // into a fetch.
    if actions.load_older {
        state.scroll_anchor = Some(state.last_content_height - state.last_scroll_offset);
        state.loading_older = true;
    }

    actions
}

fn message_row(ui: &mut egui::Ui, message: &Message) {
    ui.add_space(6.0);
    ui.horizontal(|ui| {
        avatar(ui, message);
        ui.vertical(|ui| {
            ui.horizontal(|ui| {
                ui.label(
                    egui::RichText::new(message.display_name())
                        .strong()
                        .color(user_color(&message.user_id)),
                );
                let stamp = message.created_at.with_timezone(&Local).format("%H:%M");
                ui.label(egui::RichText::new(stamp.to_string()).weak().small());
            });
            ui.add(egui::Label::new(&message.content).wrap());
        });
    });
}

fn avatar(ui: &mut egui::Ui, message: &Message) {
    let size = egui::vec2(24.0, 24.0);
    let (rect, _response) = ui.allocate_exact_size(size, egui::Sense::hover());
    let color = user_color(&message.user_id);
    ui.painter()
        .circle_filled(rect.center(), 12.0, color.linear_multiply(0.35));
    let initial = message
        .display_name()
        .chars()
        .next()
        .map(|c| c.to_uppercase().to_string())
        .unwrap_or_else(|| "?".to_string());
    ui.painter().text(
        rect.center(),
        egui::Align2::CENTER_CENTER,
        initial,
        egui::FontId::proportional(12.0),
        color,
    );
}

fn date_separator(ui: &mut egui::Ui, day: NaiveDate) {
    ui.add_space(10.0);
    ui.vertical_centered(|ui| {
        ui.label(
            egui::RichText::new(day.format("%B %-d, %Y").to_string())
                .weak()
                .small(),
        );
    });
    ui.separator();
}

fn local_day(at: DateTime<Utc>) -> NaiveDate {
    at.with_timezone(&Local).date_naive()
}

/// Stable per-user hue derived from the id.
fn user_color(user_id: &str) -> egui::Color32 {
    const PALETTE: [egui::Color32; 8] = [
        egui::Color32::from_rgb(0xe0, 0x6c, 0x75),
        egui::Color32::from_rgb(0x98, 0xc3, 0x79),
        egui::Color32::from_rgb(0xe5, 0xc0, 0x7b),
        egui::Color32::from_rgb(0x61, 0xaf, 0xef),
        egui::Color32::from_rgb(0xc6, 0x78, 0xdd),
        egui::Color32::from_rgb(0x56, 0xb6, 0xc2),
        egui::Color32::from_rgb(0xd1, 0x9a, 0x66),
        egui::Color32::from_rgb(0xab, 0xb2, 0xbf),
    ];
    let mut hasher = DefaultHasher::new();
    user_id.hash(&mut hasher);
    PALETTE[(hasher.finish() % PALETTE.len() as u64) as usize]
}
