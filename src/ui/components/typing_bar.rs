use eframe::egui;

use crate::ui::state::AppState;

/// One quiet line above the composer. Rendered even when empty so the
/// layout does not jump when someone starts typing.
pub fn render(ui: &mut egui::Ui, state: &AppState) {
    let line = state.typing_line().unwrap_or_else(|| " ".to_string());
    ui.add_space(2.0);
    ui.label(egui::RichText::new(line).weak().small().italics());
}
