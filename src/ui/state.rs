use std::collections::{BTreeMap, HashSet};
use std::time::{Duration, Instant};

use crate::common::{Message, Session, TypingPing};

/// How long a typing ping stays visible without a refresh.
pub const TYPING_TIMEOUT: Duration = Duration::from_secs(3);
/// How often expired pings are swept out.
pub const TYPING_SWEEP: Duration = Duration::from_secs(1);
/// Outgoing pings are rate-limited to one per interval; well under the
/// timeout, so a steady typist never flickers off.
const TYPING_PING_INTERVAL: Duration = Duration::from_secs(1);
/// How long an error toast stays up.
const TOAST_TTL: Duration = Duration::from_secs(5);
const MAX_TOASTS: usize = 4;

/// A transient user-facing notice.
#[derive(Debug, Clone)]
pub struct Toast {
    pub text: String,
    pub raised_at: Instant,
}

#[derive(Debug, Clone)]
struct TypingEntry {
    username: String,
    last_seen: Instant,
}

/// Everything the frames are drawn from. Mutated only on the UI thread.
pub struct AppState {
    pub session: Option<Session>,
    pub sign_in_pending: bool,
    pub connected: bool,
    /// Shown on the sign-in button ("GitHub", "Google", ...).
    pub provider_label: String,

    pub messages: Vec<Message>,
    seen_ids: HashSet<String>,
    /// First page has landed; until then the chat area shows a spinner.
    pub history_loaded: bool,
    /// The server has no rows older than what we hold.
    pub history_exhausted: bool,
    /// A load-older fetch is in flight; the control is disabled meanwhile.
    pub loading_older: bool,

    /// user_id -> entry. BTreeMap keeps the indicator line stable.
    typing: BTreeMap<String, TypingEntry>,
    last_typing_sweep: Instant,
    last_typing_ping: Option<Instant>,

    pub input_text: String,
    pub sound_enabled: bool,
    pub toasts: Vec<Toast>,

    // Scroll bookkeeping for prepend anchoring (see chat_area).
    pub last_scroll_offset: f32,
    pub last_content_height: f32,
    /// Distance from the bottom, captured when a load-older fetch starts.
    pub scroll_anchor: Option<f32>,
    /// Armed once the prepended rows are in; applied by the next render.
    pub restore_anchor: Option<f32>,
}

impl AppState {
    pub fn new(sound_enabled: bool, provider_label: String) -> Self {
        Self {
            session: None,
            sign_in_pending: false,
            connected: false,
            provider_label,
            messages: Vec::new(),
            seen_ids: HashSet::new(),
            history_loaded: false,
            history_exhausted: false,
            loading_older: false,
            typing: BTreeMap::new(),
            last_typing_sweep: Instant::now(),
            last_typing_ping: None,
            input_text: String::new(),
            sound_enabled,
            toasts: Vec::new(),
            last_scroll_offset: 0.0,
            last_content_height: 0.0,
            scroll_anchor: None,
            restore_anchor: None,
        }
    }

    /// Insert keeping (created_at, id) order. Duplicates between realtime
    /// and fetched pages are dropped. Returns whether the row was new.
    pub fn insert_message(&mut self, message: Message) -> bool {
        if !self.seen_ids.insert(message.id.clone()) {
            return false;
        }
        let position = self.messages.partition_point(|existing| {
            (existing.created_at, existing.id.as_str())
                <= (message.created_at, message.id.as_str())
        });
        self.messages.insert(position, message);
        true
    }

    /// Fold in a page of history (oldest first) and update pagination.
    pub fn apply_history(&mut self, messages: Vec<Message>, exhausted: bool) {
        for message in messages {
            self.insert_message(message);
        }
        if exhausted {
            // Stays hidden for the rest of the session.
            self.history_exhausted = true;
        }
        self.history_loaded = true;
        self.loading_older = false;
        if self.restore_anchor.is_none() {
            self.restore_anchor = self.scroll_anchor.take();
        }
    }

    pub fn record_typing(&mut self, ping: TypingPing, now: Instant) {
        if let Some(session) = &self.session {
            // Never show ourselves typing.
            if session.user_id == ping.user_id {
                return;
            }
        }
        self.typing.insert(
            ping.user_id,
            TypingEntry {
                username: ping.username,
                last_seen: now,
            },
        );
    }

    /// A ping from someone who just posted is stale; drop it right away.
    pub fn drop_typing(&mut self, user_id: &str) {
        self.typing.remove(user_id);
    }

    /// A fetch went wrong; show what we have, re-arm the pagination
    /// control, and forget the anchor captured for it. Opening the gate
    /// here keeps live inserts rendering even when the startup fetch
    /// never lands, and leaves the load control as the retry path.
    pub fn release_loading(&mut self) {
        self.history_loaded = true;
        self.loading_older = false;
        self.scroll_anchor = None;
    }

    /// Whether a keystroke should go out as a ping right now.
    pub fn should_ping_typing(&mut self, now: Instant) -> bool {
        match self.last_typing_ping {
            Some(last) if now.duration_since(last) < TYPING_PING_INTERVAL => false,
            _ => {
                self.last_typing_ping = Some(now);
                true
            }
        }
    }

    /// Drop entries older than the timeout. Runs at the sweep interval, so
    /// an entry can outlive the timeout by at most one sweep.
    pub fn sweep_typing(&mut self, now: Instant) {
        if now.duration_since(self.last_typing_sweep) < TYPING_SWEEP {
            return;
        }
        self.last_typing_sweep = now;
        self.typing
            .retain(|_, entry| now.duration_since(entry.last_seen) < TYPING_TIMEOUT);
    }

    /// Indicator line under the composer, or None when nobody is typing.
    pub fn typing_line(&self) -> Option<String> {
        let names: Vec<&str> = self.typing.values().map(|e| e.username.as_str()).collect();
        match names.as_slice() {
            [] => None,
            [one] => Some(format!("{one} is typing...")),
            [one, two] => Some(format!("{one} and {two} are typing...")),
            _ => Some("Several people are typing...".to_string()),
        }
    }

    pub fn push_toast(&mut self, text: impl Into<String>, now: Instant) {
        self.toasts.push(Toast {
            text: text.into(),
            raised_at: now,
        });
        if self.toasts.len() > MAX_TOASTS {
            self.toasts.remove(0);
        }
    }

    pub fn sweep_toasts(&mut self, now: Instant) {
        self.toasts
            .retain(|toast| now.duration_since(toast.raised_at) < TOAST_TTL);
    }

    pub fn set_session(&mut self, session: Session) {
        self.sign_in_pending = false;
        // Our own stale ping, if any.
        self.typing.remove(&session.user_id);
        self.session = Some(session);
    }

    /// Sign-out or expiry: submission deactivates, messages stay visible.
    pub fn clear_session(&mut self) {
        self.session = None;
        self.sign_in_pending = false;
    }

    pub fn can_submit(&self) -> bool {
        self.session.is_some()
    }
}

/// Trimmed content ready to send, or None when there is nothing to send.
pub fn sanitize_submission(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn msg(id: &str, secs: i64) -> Message {
        Message {
            id: id.to_string(),
            user_id: format!("user-{id}"),
            content: format!("message {id}"),
            created_at: Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
            username: Some(format!("name-{id}")),
            avatar_url: None,
        }
    }

    fn state() -> AppState {
        AppState::new(true, "GitHub".to_string())
    }

    fn session(user_id: &str) -> Session {
        Session {
            user_id: user_id.to_string(),
            username: "me".to_string(),
            avatar_url: None,
            access_token: "jwt".to_string(),
        }
    }

    #[test]
    fn test_messages_stay_ordered_regardless_of_arrival() {
        let mut state = state();
        state.insert_message(msg("c", 30));
        state.insert_message(msg("a", 10));
        state.insert_message(msg("b", 20));

        let ids: Vec<&str> = state.messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["a", "b", "c"]);
        for pair in state.messages.windows(2) {
            assert!(pair[0].created_at <= pair[1].created_at);
        }
    }

    #[test]
    fn test_equal_timestamps_fall_back_to_id_order() {
        let mut state = state();
        state.insert_message(msg("b", 10));
        state.insert_message(msg("a", 10));
        let ids: Vec<&str> = state.messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["a", "b"]);
    }

    #[test]
    fn test_duplicate_rows_are_dropped() {
        let mut state = state();
        assert!(state.insert_message(msg("a", 10)));
        // Same row again, as the realtime echo of a fetched page.
        assert!(!state.insert_message(msg("a", 10)));
        assert_eq!(state.messages.len(), 1);
    }

    #[test]
    fn test_short_page_hides_load_older_for_good() {
        let mut state = state();
        state.apply_history(vec![msg("a", 10)], true);
        assert!(state.history_exhausted);

        // A later page can never un-exhaust history.
        state.apply_history(vec![msg("b", 20)], false);
        assert!(state.history_exhausted);
    }

    #[test]
    fn test_history_page_releases_the_loading_flag() {
        let mut state = state();
        state.loading_older = true;
        state.apply_history(Vec::new(), false);
        assert!(!state.loading_older);
        assert!(state.history_loaded);
    }

    #[test]
    fn test_failed_fetch_rearms_the_load_control() {
        let mut state = state();
        state.loading_older = true;
        state.scroll_anchor = Some(100.0);
        state.release_loading();
        assert!(!state.loading_older);
        assert!(state.scroll_anchor.is_none());
    }

    #[test]
    fn test_failed_initial_fetch_still_presents_live_rows() {
        let mut state = state();
        assert!(!state.history_loaded);

        // The startup fetch failed; the pane must come up anyway so live
        // inserts render and the load control offers a retry.
        state.release_loading();
        assert!(state.history_loaded);
        assert!(!state.history_exhausted);

        assert!(state.insert_message(msg("a", 10)));
        assert_eq!(state.messages.len(), 1);
    }

    #[test]
    fn test_typing_expires_after_timeout_plus_sweep() {
        let mut state = state();
        let t0 = Instant::now();
        state.record_typing(
            TypingPing {
                user_id: "u1".to_string(),
                username: "ada".to_string(),
            },
            t0,
        );
        assert!(state.typing_line().is_some());

        // Just before the timeout the entry survives a sweep.
        state.sweep_typing(t0 + TYPING_TIMEOUT - Duration::from_millis(1));
        assert!(state.typing_line().is_some());

        // By timeout + sweep interval it is gone.
        state.sweep_typing(t0 + TYPING_TIMEOUT + TYPING_SWEEP);
        assert!(state.typing_line().is_none());
    }

    #[test]
    fn test_fresh_ping_extends_the_window() {
        let mut state = state();
        let t0 = Instant::now();
        let ping = TypingPing {
            user_id: "u1".to_string(),
            username: "ada".to_string(),
        };
        state.record_typing(ping.clone(), t0);
        state.record_typing(ping, t0 + Duration::from_secs(2));

        state.sweep_typing(t0 + Duration::from_secs(4));
        assert!(state.typing_line().is_some());
    }

    #[test]
    fn test_own_typing_ping_is_ignored() {
        let mut state = state();
        state.set_session(session("me-1"));
        state.record_typing(
            TypingPing {
                user_id: "me-1".to_string(),
                username: "me".to_string(),
            },
            Instant::now(),
        );
        assert!(state.typing_line().is_none());
    }

    #[test]
    fn test_typing_line_wording() {
        let mut state = state();
        let now = Instant::now();
        state.record_typing(
            TypingPing {
                user_id: "u1".to_string(),
                username: "ada".to_string(),
            },
            now,
        );
        assert_eq!(state.typing_line().unwrap(), "ada is typing...");

        state.record_typing(
            TypingPing {
                user_id: "u2".to_string(),
                username: "bob".to_string(),
            },
            now,
        );
        assert_eq!(state.typing_line().unwrap(), "ada and bob are typing...");

        state.record_typing(
            TypingPing {
                user_id: "u3".to_string(),
                username: "eve".to_string(),
            },
            now,
        );
        assert_eq!(state.typing_line().unwrap(), "Several people are typing...");
    }

    #[test]
    fn test_typing_pings_are_rate_limited() {
        let mut state = state();
        let t0 = Instant::now();
        assert!(state.should_ping_typing(t0));
        assert!(!state.should_ping_typing(t0 + Duration::from_millis(200)));
        assert!(state.should_ping_typing(t0 + Duration::from_millis(1200)));
    }

    #[test]
    fn test_posting_drops_the_author_typing_entry() {
        let mut state = state();
        state.record_typing(
            TypingPing {
                user_id: "u1".to_string(),
                username: "ada".to_string(),
            },
            Instant::now(),
        );
        state.drop_typing("u1");
        assert!(state.typing_line().is_none());
    }

    #[test]
    fn test_toasts_expire_and_are_capped() {
        let mut state = state();
        let t0 = Instant::now();
        for i in 0..6 {
            state.push_toast(format!("toast {i}"), t0);
        }
        assert_eq!(state.toasts.len(), 4);

        state.sweep_toasts(t0 + Duration::from_secs(6));
        assert!(state.toasts.is_empty());
    }

    #[test]
    fn test_sign_out_disables_submission_but_keeps_messages() {
        let mut state = state();
        state.set_session(session("me-1"));
        state.insert_message(msg("a", 10));
        assert!(state.can_submit());

        state.clear_session();
        assert!(!state.can_submit());
        assert_eq!(state.messages.len(), 1);
    }

    #[test]
    fn test_sanitize_submission() {
        assert_eq!(sanitize_submission("  hi  "), Some("hi".to_string()));
        assert_eq!(sanitize_submission("hi"), Some("hi".to_string()));
        assert_eq!(sanitize_submission("   "), None);
        assert_eq!(sanitize_submission(""), None);
        assert_eq!(sanitize_submission("\n\t"), None);
    }

    #[test]
    fn test_history_restore_anchor_arms_only_on_pending_loads() {
        let mut state = state();
        // Initial page: no anchor captured, nothing to restore.
        state.apply_history(vec![msg("a", 10)], false);
        assert!(state.restore_anchor.is_none());

        // Load-older flow: the capture from click time is handed over.
        state.scroll_anchor = Some(420.0);
        state.apply_history(vec![msg("b", 5)], false);
        assert_eq!(state.restore_anchor, Some(420.0));
        assert!(state.scroll_anchor.is_none());
    }
}
