//! The session-oriented client.
//!
//! Every public operation returns immediately. Whether its request goes out
//! now, later, or never is decided by the session state machine:
//!
//! - precondition met: the request is spawned on the scheduler;
//! - precondition not met yet: the command is parked and re-checked every
//!   `retry_interval` until it can be sent or the session turns terminal;
//! - terminal session: the command is dropped.
//!
//! Responses are routed event by event, in document order: first the state
//! transition, then the registered handler. A `refresh` event schedules the
//! next long poll after its `p_wait`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::command::{Command, Request};
use crate::config::ClientConfig;
use crate::error::{PushletError, Result};
use crate::event::Event;
use crate::protocol::EventKind;
use crate::query::Query;
use crate::router::{Handlers, status_line};
use crate::scheduler::Scheduler;
use crate::session::{Admission, Session, SessionState};
use crate::transport::{HttpTransport, Transport};

/// Handle to one client session. Clones share the session.
#[derive(Clone)]
pub struct PushletClient {
    inner: Arc<Inner>,
}

/// Non-owning handle, for handlers that need to call back into the client
/// without keeping it alive.
#[derive(Clone)]
pub struct WeakPushletClient {
    inner: Weak<Inner>,
}

impl WeakPushletClient {
    pub fn upgrade(&self) -> Option<PushletClient> {
        self.inner.upgrade().map(|inner| PushletClient { inner })
    }
}

struct Inner {
    session: Mutex<Session>,
    handlers: RwLock<Handlers>,
    endpoint: Mutex<Endpoint>,
    transport: Arc<dyn Transport>,
    scheduler: Scheduler,
    retry_interval: Duration,
    refresh_fallback: Duration,
}

struct Endpoint {
    base_url: String,
    locked: bool,
}

/// Result of one attempt to send a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    Issued,
    Deferred,
    Dropped,
}

impl PushletClient {
    /// Client over HTTP. Must be called inside a tokio runtime.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let transport = HttpTransport::new(&config)?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Client over any [`Transport`].
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        let inner = Inner {
            session: Mutex::new(Session::new()),
            handlers: RwLock::new(Handlers::new()),
            endpoint: Mutex::new(Endpoint {
                base_url: config.base_url.clone(),
                locked: false,
            }),
            transport,
            scheduler: Scheduler::new()?,
            retry_interval: config.retry_interval(),
            refresh_fallback: config.refresh_fallback(),
        };
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    pub fn downgrade(&self) -> WeakPushletClient {
        WeakPushletClient {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Mark initialization complete: UNINITIALIZED -> READY.
    pub fn initialize(&self) {
        if self.inner.session().initialize() {
            info!("pushlet - initialized");
        }
    }

    /// Override the endpoint. Only allowed before the first request goes out.
    pub fn set_base_url(&self, base_url: impl Into<String>) -> Result<()> {
        let mut endpoint = self.inner.endpoint();
        if endpoint.locked {
            return Err(PushletError::BaseUrlLocked);
        }
        endpoint.base_url = base_url.into();
        Ok(())
    }

    pub fn base_url(&self) -> String {
        self.inner.endpoint().base_url.clone()
    }

    pub fn set_handlers(&self, handlers: Handlers) {
        *self.inner.handlers_mut() = handlers;
    }

    pub fn on<F>(&self, kind: EventKind, handler: F)
    where
        F: Fn(Event) + Send + Sync + 'static,
    {
        self.inner.handlers_mut().set(kind, handler);
    }

    pub fn on_any<F>(&self, handler: F)
    where
        F: Fn(Event) + Send + Sync + 'static,
    {
        let mut handlers = self.inner.handlers_mut();
        *handlers = std::mem::take(&mut *handlers).on_any(handler);
    }

    pub fn state(&self) -> SessionState {
        self.inner.session().state()
    }

    pub fn session_id(&self) -> Option<String> {
        self.inner.session().id().map(str::to_owned)
    }

    pub fn is_listening(&self) -> bool {
        self.state() == SessionState::Listening
    }

    /// Join, forgetting any held session id unless one is supplied.
    pub fn join(&self, session_id: Option<&str>) {
        self.inner.session().begin_join(session_id);
        self.inner.request(Request::join());
    }

    /// Join and listen in one request, optionally subscribing to `subject`.
    pub fn join_listen(&self, subject: Option<&str>, session_id: Option<&str>) {
        info!(subject = subject.unwrap_or_default(), "pushlet - join-listen");
        self.inner.session().begin_join(session_id);
        self.inner.request(Request::join_listen(subject));
    }

    pub fn listen(&self, subject: Option<&str>) {
        self.inner.request(Request::listen(subject));
    }

    /// Subscribe to one subject or a comma-separated list.
    pub fn subscribe(&self, subject: &str, label: Option<&str>) {
        self.inner.request(Request::subscribe(subject, label));
    }

    /// Drop one subscription, or all of them when `subscription_id` is `None`.
    pub fn unsubscribe(&self, subscription_id: Option<&str>) {
        self.inner.request(Request::unsubscribe(subscription_id));
    }

    pub fn publish(&self, subject: &str, extra: Option<Query>) {
        self.inner.request(Request::publish(subject, extra));
    }

    /// Publish to subscribers that are currently online only.
    pub fn publish_to_online(&self, subject: &str, extra: Option<Query>) {
        self.inner.request(Request::publish_to_online(subject, extra));
    }

    pub fn publish_json(&self, subject: &str, value: &Value) {
        self.inner.request(Request::publish_json(subject, value, false));
    }

    pub fn publish_json_to_online(&self, subject: &str, value: &Value) {
        self.inner.request(Request::publish_json(subject, value, true));
    }

    /// Leave the session. The state drops to READY before the server answers.
    pub fn leave(&self) {
        self.inner.request(Request::leave());
    }

    pub fn heartbeat(&self) {
        self.inner.request(Request::heartbeat());
    }

    /// Cancel parked commands, pending renewals and in-flight requests.
    pub fn shutdown(&self) {
        self.inner.scheduler.shutdown();
    }
}

impl std::fmt::Debug for PushletClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let session = self.inner.session();
        f.debug_struct("PushletClient")
            .field("state", &session.state())
            .field("session_id", &session.id())
            .finish()
    }
}

impl Inner {
    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn endpoint(&self) -> MutexGuard<'_, Endpoint> {
        self.endpoint.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn handlers_mut(&self) -> std::sync::RwLockWriteGuard<'_, Handlers> {
        self.handlers.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn request(self: &Arc<Self>, request: Request) {
        self.submit(request, None);
    }

    /// Issue `request` now or park it. `renewal` is the session epoch a
    /// long-poll renewal was scheduled in.
    fn submit(self: &Arc<Self>, request: Request, renewal: Option<u64>) {
        if self.try_issue(&request, renewal) == Attempt::Deferred {
            self.defer(request, renewal);
        }
    }

    fn try_issue(self: &Arc<Self>, request: &Request, renewal: Option<u64>) -> Attempt {
        let command = request.command;
        let (url, epoch) = {
            let mut session = self.session();
            let state = session.state();
            let admission = match renewal {
                Some(epoch) => session.admit_renewal(epoch),
                None => session.admit(command),
            };
            match admission {
                Admission::Issue => {}
                Admission::Defer => {
                    debug!(command = %command, state = %state, "pushlet - waiting");
                    return Attempt::Deferred;
                }
                Admission::Drop if state.is_terminal() => {
                    warn!(command = %command, state = %state, "pushlet - died, command dropped");
                    return Attempt::Dropped;
                }
                Admission::Drop => {
                    debug!(command = %command, state = %state, "pushlet - not refreshing");
                    return Attempt::Dropped;
                }
            }
            let mut endpoint = self.endpoint();
            endpoint.locked = true;
            (request.url(&endpoint.base_url, session.id()), session.epoch())
        };
        self.send(command, url, epoch);
        Attempt::Issued
    }

    /// Re-check a parked command every `retry_interval`.
    fn defer(self: &Arc<Self>, request: Request, renewal: Option<u64>) {
        let weak = Arc::downgrade(self);
        let interval = self.retry_interval;
        self.scheduler.spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                if inner.try_issue(&request, renewal) != Attempt::Deferred {
                    return;
                }
            }
        });
    }

    fn send(self: &Arc<Self>, command: Command, url: String, epoch: u64) {
        debug!(command = %command, url = %url, "issuing request");
        let response = self.transport.issue(url);
        let weak = Arc::downgrade(self);
        self.scheduler.spawn(async move {
            let events = response.await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            if command.is_long_poll() {
                inner.session().poll_finished(epoch);
            }
            debug!(command = %command, count = events.len(), "response events");
            for event in events {
                inner.dispatch(event, epoch);
            }
        });
    }

    fn dispatch(self: &Arc<Self>, event: Event, epoch: u64) {
        let kind = event.kind();
        let transition = self.session().apply(&event);
        if let Some(transition) = transition {
            debug!(from = %transition.from, to = %transition.to, "session state changed");
        }
        if let Some(line) = status_line(&event) {
            info!("pushlet - {line}");
        }

        if kind == EventKind::Refresh {
            self.schedule_refresh(&event, epoch);
        }

        // an acknowledgement the session could not accept ends it
        let rejected = (kind != EventKind::Error
            && matches!(transition, Some(t) if t.to == SessionState::Error))
            .then(|| event.event_type().to_string());

        self.deliver(event);

        if let Some(ack) = rejected {
            let failure = Event::error(format!("{ack} without session id"));
            warn!(event = %ack, "pushlet - acknowledgement without session id");
            self.deliver(failure);
        }
    }

    fn deliver(&self, event: Event) {
        let handler = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .resolve(event.kind());
        match handler {
            Some(handler) => handler(event),
            None => debug!(event = %event.event_type(), "no handler, event dropped"),
        }
    }

    fn schedule_refresh(self: &Arc<Self>, event: &Event, epoch: u64) {
        if !self.session().schedule_renewal(epoch) {
            debug!(epoch, "pushlet - refresh already pending or session replaced");
            return;
        }
        let wait = event.wait().unwrap_or_else(|| {
            warn!(
                p_wait = event.field_or("p_wait", ""),
                "refresh without usable wait, using fallback"
            );
            self.refresh_fallback
        });
        debug!(wait_ms = wait.as_millis() as u64, "pushlet - refresh scheduled");
        let weak = Arc::downgrade(self);
        self.scheduler.schedule(wait, async move {
            if let Some(inner) = weak.upgrade() {
                inner.submit(Request::refresh(), Some(epoch));
            }
        });
    }
}
