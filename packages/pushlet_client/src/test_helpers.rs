use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::oneshot;

use crate::client::PushletClient;
use crate::config::ClientConfig;
use crate::event::Event;
use crate::query::parse_query;
use crate::transport::Transport;

/// In-memory transport that records every URL it is asked to fetch and
/// answers from per-command queues of canned events.
///
/// A command with nothing queued gets an empty response. Commands marked
/// with [`hold`](Self::hold) stay open until [`release`](Self::release).
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    inner: Arc<Mutex<Script>>,
}

#[derive(Default)]
struct Script {
    issued: Vec<String>,
    responses: HashMap<String, VecDeque<Vec<Event>>>,
    held_commands: HashSet<String>,
    held: HashMap<String, VecDeque<oneshot::Sender<Vec<Event>>>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `events` as the next response to `p_event=<command>`.
    pub fn respond(&self, command: &str, events: Vec<Event>) {
        self.inner
            .lock()
            .unwrap()
            .responses
            .entry(command.to_string())
            .or_default()
            .push_back(events);
    }

    /// Keep every later `command` request open until released.
    pub fn hold(&self, command: &str) {
        self.inner
            .lock()
            .unwrap()
            .held_commands
            .insert(command.to_string());
    }

    /// Answer the oldest held `command` request with `events`.
    pub fn release(&self, command: &str, events: Vec<Event>) {
        let sender = self
            .inner
            .lock()
            .unwrap()
            .held
            .get_mut(command)
            .and_then(VecDeque::pop_front)
            .expect("no held request");
        let _ = sender.send(events);
    }

    pub fn issued(&self) -> Vec<String> {
        self.inner.lock().unwrap().issued.clone()
    }

    /// The `p_event` of every issued request, in order.
    pub fn issued_commands(&self) -> Vec<String> {
        self.issued()
            .iter()
            .map(|url| command_of(url).unwrap_or_default())
            .collect()
    }
}

impl Transport for ScriptedTransport {
    fn issue(&self, url: String) -> BoxFuture<'static, Vec<Event>> {
        let mut script = self.inner.lock().unwrap();
        let command = command_of(&url).unwrap_or_default();
        script.issued.push(url);
        if script.held_commands.contains(&command) {
            let (tx, rx) = oneshot::channel();
            script.held.entry(command).or_default().push_back(tx);
            return Box::pin(async move { rx.await.unwrap_or_default() });
        }
        let events = script
            .responses
            .get_mut(&command)
            .and_then(VecDeque::pop_front)
            .unwrap_or_default();
        Box::pin(async move { events })
    }
}

fn command_of(url: &str) -> Option<String> {
    let (_, query) = url.split_once('?')?;
    parse_query(query).get("p_event").map(str::to_owned)
}

/// Event of `event_type` with extra fields.
pub fn ev(event_type: &str, fields: &[(&str, &str)]) -> Event {
    fields
        .iter()
        .fold(Event::new(event_type), |event, (name, value)| {
            event.with_field(*name, *value)
        })
}

/// Client with default tunables over `transport`. Needs a runtime.
pub fn test_client(transport: &ScriptedTransport) -> PushletClient {
    PushletClient::with_transport(ClientConfig::default(), Arc::new(transport.clone()))
        .expect("client")
}

/// Let spawned tasks run while the paused clock moves forward `ms`.
pub async fn advance(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}
