use eframe::egui;

use crate::ui::state;

/// Outcome of rendering the composer for one frame.
#[derive(Default)]
pub struct InputActions {
    /// Trimmed message ready to send.
    pub submit: Option<String>,
    /// The draft changed this frame; drives typing pings.
    pub typed: bool,
}

pub fn render(ui: &mut egui::Ui, input_text: &mut String, can_submit: bool) -> InputActions {
    let mut actions = InputActions::default();
    let mut send = false;

    ui.horizontal(|ui| {
        let hint = if can_submit {
            "Message the room"
        } else {
            "Sign in to join the conversation"
        };
        let edit = egui::TextEdit::singleline(input_text)
            .hint_text(hint)
            .desired_width(ui.available_width() - 64.0);
        let response = ui.add_enabled(can_submit, edit);

        if response.changed() {
            actions.typed = true;
        }

        if ui.add_enabled(can_submit, egui::Button::new("Send")).clicked() {
            send = true;
        }

        if response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter)) {
            send = true;
            response.request_focus();
        }
    });

    if send && can_submit {
        // Whitespace-only drafts are cleared without sending anything.
        actions.submit = state::sanitize_submission(input_text);
        input_text.clear();
    }

    actions
}
