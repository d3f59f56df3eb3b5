//! Handler registration and per-event routing.
//!
//! Each event reaches at most one callback: the handler registered for its
//! kind, otherwise the catch-all. Refresh events are renewal bookkeeping and
//! only reach a handler registered for [`EventKind::Refresh`] itself.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::event::Event;
use crate::protocol::EventKind;

/// Callback receiving one event.
pub type Handler = Arc<dyn Fn(Event) + Send + Sync>;

#[derive(Clone, Default)]
pub struct Handlers {
    by_kind: HashMap<EventKind, Handler>,
    catch_all: Option<Handler>,
}

impl Handlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `kind`, replacing any previous one.
    pub fn on<F>(mut self, kind: EventKind, handler: F) -> Self
    where
        F: Fn(Event) + Send + Sync + 'static,
    {
        self.set(kind, handler);
        self
    }

    /// Register the catch-all used when no kind-specific handler exists.
    pub fn on_any<F>(mut self, handler: F) -> Self
    where
        F: Fn(Event) + Send + Sync + 'static,
    {
        self.catch_all = Some(Arc::new(handler));
        self
    }

    pub fn set<F>(&mut self, kind: EventKind, handler: F)
    where
        F: Fn(Event) + Send + Sync + 'static,
    {
        self.by_kind.insert(kind, Arc::new(handler));
    }

    pub fn remove(&mut self, kind: EventKind) -> bool {
        self.by_kind.remove(&kind).is_some()
    }

    /// The handler an event of `kind` is delivered to, if any.
    pub fn resolve(&self, kind: EventKind) -> Option<Handler> {
        if let Some(handler) = self.by_kind.get(&kind) {
            return Some(handler.clone());
        }
        if kind == EventKind::Refresh {
            return None;
        }
        self.catch_all.clone()
    }
}

impl fmt::Debug for Handlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<_> = self.by_kind.keys().map(EventKind::as_str).collect();
        kinds.sort_unstable();
        f.debug_struct("Handlers")
            .field("kinds", &kinds)
            .field("catch_all", &self.catch_all.is_some())
            .finish()
    }
}

/// Human-readable status line for an event, as a status bar would show it.
pub fn status_line(event: &Event) -> Option<String> {
    let line = match event.kind() {
        EventKind::Data => "data".to_string(),
        EventKind::Error => format!("server error: {}", event.field_or("p_reason", "")),
        EventKind::JoinAck => "connected".to_string(),
        EventKind::JoinListenAck => "join-listen-ack".to_string(),
        EventKind::ListenAck => "listening".to_string(),
        EventKind::Heartbeat => "heartbeat".to_string(),
        EventKind::LeaveAck => "disconnected".to_string(),
        EventKind::SubscribeAck => {
            format!("subscribed to {}", event.subject().unwrap_or_default())
        }
        EventKind::UnsubscribeAck => "unsubscribed".to_string(),
        EventKind::Abort => "abort".to_string(),
        EventKind::Nack => format!("error response: {}", event.field_or("p_reason", "")),
        EventKind::Refresh
        | EventKind::RefreshAck
        | EventKind::HeartbeatAck
        | EventKind::Other => return None,
    };
    Some(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    type Seen = Arc<Mutex<Vec<String>>>;

    fn recorder(seen: &Seen, tag: &'static str) -> impl Fn(Event) + Send + Sync + 'static {
        let seen = seen.clone();
        move |event: Event| {
            seen.lock()
                .unwrap()
                .push(format!("{tag}:{}", event.event_type()));
        }
    }

    fn deliver(handlers: &Handlers, event: Event) {
        if let Some(handler) = handlers.resolve(event.kind()) {
            handler(event);
        }
    }

    #[test]
    fn specific_handler_wins_over_catch_all() {
        let seen: Seen = Default::default();
        let handlers = Handlers::new()
            .on(EventKind::Data, recorder(&seen, "data"))
            .on_any(recorder(&seen, "any"));

        deliver(&handlers, Event::data("/a"));
        deliver(&handlers, Event::new("hb"));
        assert_eq!(*seen.lock().unwrap(), ["data:data", "any:hb"]);
    }

    #[test]
    fn nack_suffix_routes_to_nack_handler() {
        let seen: Seen = Default::default();
        let handlers = Handlers::new().on(EventKind::Nack, recorder(&seen, "nack"));

        deliver(&handlers, Event::new("subscribe-nack"));
        deliver(&handlers, Event::new("listen-nack"));
        deliver(&handlers, Event::new("subscribe-ack"));
        assert_eq!(
            *seen.lock().unwrap(),
            ["nack:subscribe-nack", "nack:listen-nack"]
        );
    }

    #[test]
    fn refresh_skips_catch_all() {
        let handlers = Handlers::new().on_any(|_| {});
        assert!(handlers.resolve(EventKind::Refresh).is_none());
        assert!(handlers.resolve(EventKind::RefreshAck).is_some());

        let handlers = handlers.on(EventKind::Refresh, |_| {});
        assert!(handlers.resolve(EventKind::Refresh).is_some());
    }

    #[test]
    fn no_handler_drops_silently() {
        let handlers = Handlers::new();
        assert!(handlers.resolve(EventKind::Data).is_none());
        assert!(handlers.resolve(EventKind::Other).is_none());
    }

    #[test]
    fn replace_and_remove() {
        let seen: Seen = Default::default();
        let mut handlers = Handlers::new().on(EventKind::Data, recorder(&seen, "first"));
        handlers.set(EventKind::Data, recorder(&seen, "second"));
        deliver(&handlers, Event::data("/a"));
        assert!(handlers.remove(EventKind::Data));
        assert!(!handlers.remove(EventKind::Data));
        deliver(&handlers, Event::data("/a"));
        assert_eq!(*seen.lock().unwrap(), ["second:data"]);
    }

    #[test]
    fn status_lines() {
        let ack = Event::new("subscribe-ack").with_field("p_subject", "/t");
        assert_eq!(status_line(&ack).as_deref(), Some("subscribed to /t"));
        assert_eq!(
            status_line(&Event::error("down")).as_deref(),
            Some("server error: down")
        );
        assert!(status_line(&Event::new("refresh")).is_none());
    }
}
