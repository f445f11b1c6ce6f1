use eframe::egui;

use crate::ui::state::AppState;

/// Transient error notices, stacked over the bottom-right corner.
pub fn render(ctx: &egui::Context, state: &AppState) {
    if state.toasts.is_empty() {
        return;
    }
    egui::Area::new(egui::Id::new("toasts"))
        .anchor(egui::Align2::RIGHT_BOTTOM, egui::vec2(-12.0, -48.0))
        .interactable(false)
        .show(ctx, |ui| {
            for toast in &state.toasts {
                egui::Frame::popup(&ctx.style()).show(ui, |ui| {
                    ui.label(&toast.text);
                });
                ui.add_space(4.0);
            }
        });
}
