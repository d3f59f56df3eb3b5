//! Outbound commands and the requests built for them.

use std::fmt;

use serde_json::Value;

use crate::protocol::{
    FORMAT_XML_STRICT, MODE_PULL, P_EVENT, P_FORMAT, P_ID, P_LABEL, P_MODE, P_SID, P_SUBJECT,
};
use crate::query::{Query, encode_component};

/// A client-issued protocol command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Join,
    JoinListen,
    Listen,
    Subscribe,
    Unsubscribe,
    Publish,
    PublishToOnline,
    Leave,
    Heartbeat,
    Refresh,
}

/// Session condition a command needs before it may be sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    /// Any non-terminal state.
    Alive,
    /// Rank of READY or above.
    Ready,
    /// Rank of JOINED or above (JOINED or LISTENING).
    Joined,
    /// Exactly LISTENING.
    Listening,
}

impl Command {
    /// Value sent as `p_event`.
    pub fn wire_name(&self) -> &'static str {
        match self {
            Self::Join => "join",
            Self::JoinListen => "join-listen",
            Self::Listen => "listen",
            Self::Subscribe => "subscribe",
            Self::Unsubscribe => "unsubscribe",
            Self::Publish => "publish",
            Self::PublishToOnline => "publish_to_online",
            Self::Leave => "leave",
            Self::Heartbeat => "hb",
            Self::Refresh => "refresh",
        }
    }

    pub fn precondition(&self) -> Precondition {
        match self {
            Self::Join | Self::JoinListen => Precondition::Ready,
            Self::Listen => Precondition::Joined,
            Self::Subscribe | Self::Unsubscribe | Self::Refresh => Precondition::Listening,
            Self::Leave => Precondition::Alive,
            Self::Publish | Self::PublishToOnline | Self::Heartbeat => Precondition::Joined,
        }
    }

    /// Whether an unmet precondition parks the command for a retry.
    /// A refresh whose moment has passed is skipped instead.
    pub fn defers(&self) -> bool {
        !matches!(self, Self::Refresh | Self::Leave)
    }

    /// Commands whose response the server holds open.
    pub fn is_long_poll(&self) -> bool {
        matches!(self, Self::Listen | Self::JoinListen | Self::Refresh)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// A command plus its query parameters, not yet bound to a session id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub command: Command,
    pub query: Query,
}

impl Request {
    pub fn new(command: Command, query: Query) -> Self {
        Self { command, query }
    }

    pub fn join() -> Self {
        Self::new(Command::Join, pull_format())
    }

    pub fn join_listen(subject: Option<&str>) -> Self {
        let mut query = pull_format();
        query.push_opt(P_SUBJECT, subject);
        Self::new(Command::JoinListen, query)
    }

    pub fn listen(subject: Option<&str>) -> Self {
        let mut query = Query::new().with(P_MODE, MODE_PULL);
        query.push_opt(P_SUBJECT, subject);
        Self::new(Command::Listen, query)
    }

    pub fn subscribe(subject: &str, label: Option<&str>) -> Self {
        let mut query = Query::new().with(P_SUBJECT, subject);
        query.push_opt(P_LABEL, label);
        Self::new(Command::Subscribe, query)
    }

    /// Without a subscription id the server drops every subscription.
    pub fn unsubscribe(subscription_id: Option<&str>) -> Self {
        let mut query = Query::new();
        query.push_opt(P_SID, subscription_id);
        Self::new(Command::Unsubscribe, query)
    }

    pub fn publish(subject: &str, extra: Option<Query>) -> Self {
        Self::new(Command::Publish, subject_with(subject, extra))
    }

    pub fn publish_to_online(subject: &str, extra: Option<Query>) -> Self {
        Self::new(Command::PublishToOnline, subject_with(subject, extra))
    }

    pub fn publish_json(subject: &str, value: &Value, online: bool) -> Self {
        let extra = Some(Query::from_json(value));
        if online {
            Self::publish_to_online(subject, extra)
        } else {
            Self::publish(subject, extra)
        }
    }

    pub fn leave() -> Self {
        Self::new(Command::Leave, Query::new())
    }

    pub fn heartbeat() -> Self {
        Self::new(Command::Heartbeat, Query::new())
    }

    pub fn refresh() -> Self {
        Self::new(Command::Refresh, Query::new())
    }

    /// `base?p_event=<type>[&query][&p_id=<session>]`.
    pub fn url(&self, base: &str, session_id: Option<&str>) -> String {
        let separator = if base.contains('?') { '&' } else { '?' };
        let mut url = format!(
            "{base}{separator}{P_EVENT}={}",
            encode_component(self.command.wire_name())
        );
        if !self.query.is_empty() {
            url.push('&');
            url.push_str(&self.query.encode());
        }
        if let Some(id) = session_id {
            url.push_str(&format!("&{P_ID}={}", encode_component(id)));
        }
        url
    }
}

fn pull_format() -> Query {
    Query::new()
        .with(P_FORMAT, FORMAT_XML_STRICT)
        .with(P_MODE, MODE_PULL)
}

fn subject_with(subject: &str, extra: Option<Query>) -> Query {
    let mut query = Query::new().with(P_SUBJECT, subject);
    if let Some(extra) = extra {
        query.append(extra);
    }
    query
}
