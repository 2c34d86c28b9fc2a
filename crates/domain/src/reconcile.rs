use std::collections::HashSet;

use crate::chat::ChatMessage;

/// Delivery state of an optimistic local message. `Failed` is set by
/// the caller when its confirmation timeout elapses; the server never
/// reports send failures on the channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryState {
    Pending,
    Failed,
}

/// A locally echoed message that has not been confirmed by a server
/// broadcast yet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProvisionalMessage {
    pub local_id: String,
    pub body: String,
    pub sent_at_ms: i64,
    pub delivery: DeliveryState,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ViewEntry {
    Confirmed(ChatMessage),
    Provisional(ProvisionalMessage),
}

impl ViewEntry {
    pub fn text(&self) -> &str {
        match self {
            ViewEntry::Confirmed(message) => &message.body,
            ViewEntry::Provisional(provisional) => &provisional.body,
        }
    }
}

/// Merges REST-fetched history with the live event stream into one
/// ordered, deduplicated view of a single conversation.
///
/// History and the room join race; live events that arrive before the
/// history snapshot are buffered and folded in once `apply_history`
/// runs. Display order is history order with live arrivals appended,
/// which is sound because the channel delivers per-room in append
/// order.
#[derive(Debug)]
pub struct ConversationView {
    self_id: String,
    history_loaded: bool,
    buffered: Vec<ChatMessage>,
    entries: Vec<ViewEntry>,
    seen: HashSet<String>,
    local_seq: u64,
}

impl ConversationView {
    pub fn new(self_id: impl Into<String>) -> Self {
        Self {
            self_id: self_id.into(),
            history_loaded: false,
            buffered: Vec::new(),
            entries: Vec::new(),
            seen: HashSet::new(),
            local_seq: 0,
        }
    }

    pub fn entries(&self) -> &[ViewEntry] {
        &self.entries
    }

    pub fn history_loaded(&self) -> bool {
        self.history_loaded
    }

    /// Optimistic local echo. Returns the provisional entry's local id
    /// so the caller can later mark it failed; empty text yields no
    /// entry, mirroring the server-side drop.
    pub fn begin_send(&mut self, text: &str, now_ms: i64) -> Option<String> {
        let body = text.trim();
        if body.is_empty() {
            return None;
        }
        self.local_seq += 1;
        let local_id = format!("local-{}", self.local_seq);
        self.entries.push(ViewEntry::Provisional(ProvisionalMessage {
            local_id: local_id.clone(),
            body: body.to_string(),
            sent_at_ms: now_ms,
            delivery: DeliveryState::Pending,
        }));
        Some(local_id)
    }

    /// Seeds (or re-seeds, after a reconnect) the ordered list from a
    /// history snapshot, then folds in any live events that raced
    /// ahead of it.
    pub fn apply_history(&mut self, history: Vec<ChatMessage>) {
        self.history_loaded = true;

        let mut merged = Vec::with_capacity(history.len() + self.entries.len());
        let mut seen = HashSet::new();
        for message in history {
            if seen.insert(message.message_id.clone()) {
                merged.push(ViewEntry::Confirmed(message));
            }
        }
        for entry in self.entries.drain(..) {
            match entry {
                ViewEntry::Confirmed(message) => {
                    if seen.insert(message.message_id.clone()) {
                        merged.push(ViewEntry::Confirmed(message));
                    }
                }
                provisional => merged.push(provisional),
            }
        }
        self.entries = merged;
        self.seen = seen;

        for message in std::mem::take(&mut self.buffered) {
            self.merge_live(message);
        }
    }

    /// Handles a `newMessage` broadcast. Duplicate server ids are
    /// discarded; a broadcast of the caller's own message replaces the
    /// matching provisional entry instead of duplicating it.
    pub fn apply_live(&mut self, message: ChatMessage) {
        if !self.history_loaded {
            self.buffered.push(message);
            return;
        }
        self.merge_live(message);
    }

    /// Marks a still-unconfirmed local message as failed. Returns
    /// false if the entry was already confirmed or never existed.
    pub fn mark_failed(&mut self, local_id: &str) -> bool {
        for entry in &mut self.entries {
            if let ViewEntry::Provisional(provisional) = entry {
                if provisional.local_id == local_id {
                    provisional.delivery = DeliveryState::Failed;
                    return true;
                }
            }
        }
        false
    }

    fn merge_live(&mut self, message: ChatMessage) {
        if !self.seen.insert(message.message_id.clone()) {
            return;
        }

        if message.sender_id == self.self_id {
            let matching = self.entries.iter().position(|entry| {
                matches!(entry, ViewEntry::Provisional(provisional) if provisional.body == message.body)
            });
            if let Some(index) = matching {
                self.entries.remove(index);
            }
        }

        self.entries.push(ViewEntry::Confirmed(message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(id: &str, sender: &str, body: &str, at: i64) -> ChatMessage {
        ChatMessage {
            message_id: id.to_string(),
            listing_id: "listing-1".to_string(),
            seller_id: "seller-1".to_string(),
            buyer_id: "buyer-1".to_string(),
            sender_id: sender.to_string(),
            body: body.to_string(),
            created_at_ms: at,
        }
    }

    fn texts(view: &ConversationView) -> Vec<&str> {
        view.entries().iter().map(ViewEntry::text).collect()
    }

    #[test]
    fn own_broadcast_replaces_the_provisional_entry() {
        let mut view = ConversationView::new("buyer-1");
        view.apply_history(vec![]);

        view.begin_send("hello", 10).expect("local id");
        assert_eq!(texts(&view), vec!["hello"]);

        view.apply_live(message("m-1", "buyer-1", "hello", 11));

        assert_eq!(view.entries().len(), 1);
        assert!(matches!(&view.entries()[0], ViewEntry::Confirmed(m) if m.message_id == "m-1"));
    }

    #[test]
    fn duplicate_delivery_is_idempotent() {
        let mut view = ConversationView::new("buyer-1");
        view.apply_history(vec![]);

        view.apply_live(message("m-1", "seller-1", "hi", 5));
        view.apply_live(message("m-1", "seller-1", "hi", 5));

        assert_eq!(view.entries().len(), 1);
    }

    #[test]
    fn live_events_before_history_are_buffered_and_merged_once() {
        let mut view = ConversationView::new("buyer-1");

        view.apply_live(message("m-2", "seller-1", "second", 20));
        assert!(view.entries().is_empty());

        view.apply_history(vec![
            message("m-1", "buyer-1", "first", 10),
            message("m-2", "seller-1", "second", 20),
        ]);

        assert_eq!(texts(&view), vec!["first", "second"]);
    }

    #[test]
    fn own_message_from_another_device_is_appended() {
        let mut view = ConversationView::new("buyer-1");
        view.apply_history(vec![]);

        // No provisional entry with this body exists locally.
        view.apply_live(message("m-1", "buyer-1", "sent elsewhere", 5));

        assert_eq!(view.entries().len(), 1);
        assert!(matches!(&view.entries()[0], ViewEntry::Confirmed(_)));
    }

    #[test]
    fn empty_text_is_not_echoed() {
        let mut view = ConversationView::new("buyer-1");
        assert!(view.begin_send("   ", 1).is_none());
        assert!(view.entries().is_empty());
    }

    #[test]
    fn timed_out_send_can_be_marked_failed_and_still_confirm_late() {
        let mut view = ConversationView::new("buyer-1");
        view.apply_history(vec![]);

        let local_id = view.begin_send("slow one", 10).expect("local id");
        assert!(view.mark_failed(&local_id));
        assert!(matches!(
            &view.entries()[0],
            ViewEntry::Provisional(p) if p.delivery == DeliveryState::Failed
        ));

        // The broadcast eventually arrives and supersedes the marker.
        view.apply_live(message("m-1", "buyer-1", "slow one", 12));
        assert_eq!(view.entries().len(), 1);
        assert!(matches!(&view.entries()[0], ViewEntry::Confirmed(_)));

        assert!(!view.mark_failed(&local_id));
    }

    #[test]
    fn history_reload_after_reconnect_keeps_pending_entries() {
        let mut view = ConversationView::new("buyer-1");
        view.apply_history(vec![message("m-1", "seller-1", "hi", 5)]);
        view.begin_send("on its way", 10);

        view.apply_history(vec![
            message("m-1", "seller-1", "hi", 5),
            message("m-2", "seller-1", "anyone there?", 8),
        ]);

        assert_eq!(texts(&view), vec!["hi", "anyone there?", "on its way"]);
    }

    #[test]
    fn live_arrivals_append_after_history() {
        let mut view = ConversationView::new("buyer-1");
        view.apply_history(vec![
            message("m-1", "buyer-1", "one", 1),
            message("m-2", "seller-1", "two", 2),
        ]);

        view.apply_live(message("m-3", "seller-1", "three", 3));

        assert_eq!(texts(&view), vec!["one", "two", "three"]);
    }
}
