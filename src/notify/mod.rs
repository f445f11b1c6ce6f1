use std::time::Duration;

use rodio::source::SineWave;
use rodio::{OutputStream, OutputStreamBuilder, Sink, Source};

/// Longest desktop-notification body before truncation.
const BODY_LIMIT: usize = 120;

/// Short synthesized ping for incoming messages. Holds the output stream
/// for the life of the app; construction failure degrades to silence.
pub struct MessageChime {
    _stream: Option<OutputStream>,
    sink: Option<Sink>,
}

impl MessageChime {
    pub fn new() -> Self {
        match OutputStreamBuilder::open_default_stream() {
            Ok(stream) => {
                let sink = Sink::connect_new(stream.mixer());
                Self {
                    _stream: Some(stream),
                    sink: Some(sink),
                }
            }
            Err(err) => {
                log::warn!("Audio output unavailable, chime disabled: {err}");
                Self {
                    _stream: None,
                    sink: None,
                }
            }
        }
    }

    pub fn play(&self) {
        if let Some(sink) = &self.sink {
            let source = SineWave::new(880.0)
                .take_duration(Duration::from_millis(150))
                .amplify(0.20);
            sink.append(source);
        }
    }
}

/// Fire-and-forget desktop notification for a message that arrived while
/// the window was unfocused.
pub fn notify_message(author: &str, content: &str) {
    deliver(author, &truncate_body(content));
}

#[cfg(not(target_os = "macos"))]
fn deliver(title: &str, body: &str) {
    use notify_rust::{Notification, Timeout};
    if let Err(err) = Notification::new()
        .summary(title)
        .body(body)
        .timeout(Timeout::Milliseconds(5000))
        .show()
    {
        log::warn!("Desktop notification failed: {err}");
    }
}

/// notify-rust needs a signed app bundle on macOS; osascript does not.
#[cfg(target_os = "macos")]
fn deliver(title: &str, body: &str) {
    let script = format!(
        r#"display notification "{}" with title "{}""#,
        escape_applescript(body),
        escape_applescript(title),
    );
    if let Err(err) = std::process::Command::new("osascript")
        .arg("-e")
        .arg(&script)
        .output()
    {
        log::warn!("Desktop notification failed: {err}");
    }
}

/// Backslashes have to go first so the later escapes are not doubled.
#[cfg(target_os = "macos")]
fn escape_applescript(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
}

fn truncate_body(content: &str) -> String {
    if content.chars().count() <= BODY_LIMIT {
        return content.to_string();
    }
    let cut: String = content.chars().take(BODY_LIMIT).collect();
    format!("{cut}...")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_bodies_pass_through() {
        assert_eq!(truncate_body("hello"), "hello");
    }

    #[test]
    fn test_long_bodies_are_truncated() {
        let long: String = std::iter::repeat('x').take(500).collect();
        let body = truncate_body(&long);
        assert_eq!(body.chars().count(), BODY_LIMIT + 3);
        assert!(body.ends_with("..."));
    }

    #[test]
    fn test_truncation_respects_multibyte_boundaries() {
        let long: String = std::iter::repeat('ö').take(300).collect();
        let body = truncate_body(&long);
        assert!(body.chars().take(BODY_LIMIT).all(|c| c == 'ö'));
    }

    #[test]
    fn test_chime_survives_missing_audio_output() {
        // On hosts with no audio device this exercises the silent path.
        let chime = MessageChime::new();
        chime.play();
    }

    #[cfg(target_os = "macos")]
    #[test]
    fn test_applescript_escaping_covers_control_characters() {
        assert_eq!(
            escape_applescript("a\"b\\c\r\nd"),
            "a\\\"b\\\\c\\r\\nd"
        );
    }
}
