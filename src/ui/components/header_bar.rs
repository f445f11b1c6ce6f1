use eframe::egui;

use crate::ui::state::AppState;

#[derive(Default)]
pub struct HeaderActions {
    pub sign_in: bool,
    pub sign_out: bool,
    /// The sound checkbox moved; persist it.
    pub sound_toggled: bool,
}

pub fn render(ui: &mut egui::Ui, state: &mut AppState) -> HeaderActions {
    let mut actions = HeaderActions::default();

    ui.horizontal(|ui| {
        ui.heading("Lobby");

        let (dot, color, tip) = if state.connected {
            ("●", egui::Color32::from_rgb(0x98, 0xc3, 0x79), "Live updates connected")
        } else {
            ("○", egui::Color32::GRAY, "Live updates offline; reconnecting")
        };
        ui.colored_label(color, dot).on_hover_text(tip);

        ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
            if state.sign_in_pending {
                ui.add_enabled(false, egui::Button::new("Waiting for browser..."));
            } else if let Some(session) = &state.session {
                if ui.button("Sign out").clicked() {
                    actions.sign_out = true;
                }
                ui.label(egui::RichText::new(&session.username).strong());
            } else if ui
                .button(format!("Sign in with {}", state.provider_label))
                .clicked()
            {
                actions.sign_in = true;
            }

            if ui.checkbox(&mut state.sound_enabled, "Sound").changed() {
                actions.sound_toggled = true;
            }
        });
    });

    actions
}
