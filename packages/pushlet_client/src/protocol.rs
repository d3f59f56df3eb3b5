//! Wire vocabulary of the Pushlet protocol: field names, event type names and
//! the classification of inbound event types into handler kinds.

use std::fmt;

pub const P_EVENT: &str = "p_event";
pub const P_FORMAT: &str = "p_format";
pub const P_MODE: &str = "p_mode";
pub const P_SUBJECT: &str = "p_subject";
pub const P_LABEL: &str = "p_label";
pub const P_SID: &str = "p_sid";
pub const P_ID: &str = "p_id";
pub const P_REASON: &str = "p_reason";
pub const P_WAIT: &str = "p_wait";
pub const P_TIME: &str = "p_time";
pub const P_SEQ: &str = "p_seq";
pub const P_FROM: &str = "p_from";
pub const P_TO: &str = "p_to";
pub const P_URL: &str = "p_url";

pub const FORMAT_XML_STRICT: &str = "xml-strict";
pub const MODE_PULL: &str = "pull";

pub const E_DATA: &str = "data";
pub const E_REFRESH: &str = "refresh";
pub const E_ERROR: &str = "error";
pub const E_ABORT: &str = "abort";
pub const E_JOIN_ACK: &str = "join-ack";
pub const E_JOIN_LISTEN_ACK: &str = "join-listen-ack";
pub const E_LISTEN_ACK: &str = "listen-ack";
pub const E_HEARTBEAT: &str = "hb";
pub const E_HEARTBEAT_ACK: &str = "hb-ack";
pub const E_LEAVE_ACK: &str = "leave-ack";
pub const E_REFRESH_ACK: &str = "refresh-ack";
pub const E_SUBSCRIBE_ACK: &str = "subscribe-ack";
pub const E_UNSUBSCRIBE_ACK: &str = "unsubscribe-ack";

/// Suffix shared by every negative acknowledgement (`subscribe-nack`, ...).
pub const NACK_SUFFIX: &str = "nack";

/// Handler slot an inbound event type resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Data,
    Refresh,
    Error,
    JoinAck,
    JoinListenAck,
    ListenAck,
    Heartbeat,
    HeartbeatAck,
    LeaveAck,
    RefreshAck,
    SubscribeAck,
    UnsubscribeAck,
    Abort,
    Nack,
    /// Unknown type; only the catch-all handler sees it.
    Other,
}

impl EventKind {
    /// Classify a `p_event` value. Exact names win over the `nack` suffix rule.
    pub fn classify(event_type: &str) -> Self {
        match event_type {
            E_DATA => Self::Data,
            E_REFRESH => Self::Refresh,
            E_ERROR => Self::Error,
            E_JOIN_ACK => Self::JoinAck,
            E_JOIN_LISTEN_ACK => Self::JoinListenAck,
            E_LISTEN_ACK => Self::ListenAck,
            E_HEARTBEAT => Self::Heartbeat,
            E_HEARTBEAT_ACK => Self::HeartbeatAck,
            E_LEAVE_ACK => Self::LeaveAck,
            E_REFRESH_ACK => Self::RefreshAck,
            E_SUBSCRIBE_ACK => Self::SubscribeAck,
            E_UNSUBSCRIBE_ACK => Self::UnsubscribeAck,
            E_ABORT => Self::Abort,
            t if t.ends_with(NACK_SUFFIX) => Self::Nack,
            _ => Self::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Data => "data",
            Self::Refresh => "refresh",
            Self::Error => "error",
            Self::JoinAck => "join-ack",
            Self::JoinListenAck => "join-listen-ack",
            Self::ListenAck => "listen-ack",
            Self::Heartbeat => "heartbeat",
            Self::HeartbeatAck => "heartbeat-ack",
            Self::LeaveAck => "leave-ack",
            Self::RefreshAck => "refresh-ack",
            Self::SubscribeAck => "subscribe-ack",
            Self::UnsubscribeAck => "unsubscribe-ack",
            Self::Abort => "abort",
            Self::Nack => "nack",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
