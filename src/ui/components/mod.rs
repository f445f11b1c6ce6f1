pub mod chat_area;
pub mod header_bar;
pub mod input_bar;
pub mod toasts;
pub mod typing_bar;
