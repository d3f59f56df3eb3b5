//! HTTP transport and response decoding.
//!
//! Responses are XML documents whose root wraps one element per event:
//!
//! ```text
//! <pushlet>
//!   <event p_event="join-listen-ack" p_id="S123"/>
//!   <event p_event="refresh" p_wait="3000"/>
//! </pushlet>
//! ```
//!
//! Failures never escape as errors: they come back as a single synthetic
//! `error` event so the router sees them like any protocol error.

use std::sync::Arc;

use futures::future::BoxFuture;
use quick_xml::events::{BytesStart, Event as XmlEvent};
use reqwest::Url;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::error::{PushletError, Result};
use crate::event::Event;

/// Sends one request and yields the decoded events in document order.
pub trait Transport: Send + Sync + 'static {
    fn issue(&self, url: String) -> BoxFuture<'static, Vec<Event>>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn issue(&self, url: String) -> BoxFuture<'static, Vec<Event>> {
        (**self).issue(url)
    }
}

/// `reqwest`-backed GET transport.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
    origin: Option<Url>,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .build()?;
        let origin = config
            .origin
            .as_deref()
            .map(|origin| {
                Url::parse(origin).map_err(|e| PushletError::InvalidUrl {
                    url: origin.to_string(),
                    reason: e.to_string(),
                })
            })
            .transpose()?;
        Ok(Self { client, origin })
    }

    /// Absolute URLs pass through; relative ones join the configured origin.
    pub fn resolve(&self, url: &str) -> Result<Url> {
        let invalid = |reason: String| PushletError::InvalidUrl {
            url: url.to_string(),
            reason,
        };
        match (Url::parse(url), &self.origin) {
            (Ok(absolute), _) => Ok(absolute),
            (Err(_), Some(origin)) => origin.join(url).map_err(|e| invalid(e.to_string())),
            (Err(e), None) => Err(invalid(e.to_string())),
        }
    }

    async fn fetch(client: reqwest::Client, url: Url) -> Result<String> {
        let response = client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(PushletError::Status {
                status: status.as_u16(),
                text: status.canonical_reason().unwrap_or("").to_string(),
            });
        }
        Ok(response.text().await?)
    }
}

impl Transport for HttpTransport {
    fn issue(&self, url: String) -> BoxFuture<'static, Vec<Event>> {
        let resolved = self.resolve(&url);
        let client = self.client.clone();
        Box::pin(async move {
            let result = match resolved {
                Ok(target) => Self::fetch(client, target).await,
                Err(e) => Err(e),
            };
            let outcome = result.and_then(|body| {
                debug!(url = %url, body = %body, "response received");
                decode_events(&body)
            });
            match outcome {
                Ok(events) => events,
                Err(e) => {
                    warn!(url = %url, error = %e, code = e.error_code(), "transport failure");
                    vec![failure_event(&e)]
                }
            }
        })
    }
}

/// The synthetic `error` event standing in for a transport failure.
pub fn failure_event(err: &PushletError) -> Event {
    Event::error(err.reason())
}

/// Decode a response body. Each direct child of the root element becomes one
/// event; deeper elements and text are ignored. A blank body has no events.
/// Anything else must be exactly one well-formed root element.
pub fn decode_events(body: &str) -> Result<Vec<Event>> {
    if body.trim().is_empty() {
        return Ok(Vec::new());
    }
    let mut reader = quick_xml::Reader::from_str(body);
    reader.config_mut().trim_text(true);

    let mut events = Vec::new();
    let mut depth = 0usize;
    let mut root_closed = false;
    loop {
        let event = reader.read_event()?;
        if depth == 0 {
            match &event {
                XmlEvent::Start(_) | XmlEvent::Empty(_) if root_closed => {
                    return Err(malformed("more than one root element"));
                }
                XmlEvent::Text(_) | XmlEvent::CData(_) => {
                    return Err(malformed("text outside the root element"));
                }
                _ => {}
            }
        }
        match event {
            XmlEvent::Start(element) => {
                if depth == 1 {
                    events.push(element_to_event(&element)?);
                }
                depth += 1;
            }
            XmlEvent::Empty(element) => match depth {
                0 => root_closed = true,
                1 => events.push(element_to_event(&element)?),
                _ => {}
            },
            XmlEvent::End(_) => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    root_closed = true;
                }
            }
            XmlEvent::Eof => break,
            _ => {}
        }
    }

    if depth > 0 {
        return Err(malformed("document ends inside an element"));
    }
    if !root_closed {
        return Err(malformed("no root element"));
    }
    Ok(events)
}

fn malformed(reason: &str) -> PushletError {
    PushletError::Malformed(reason.to_string())
}

fn element_to_event(element: &BytesStart<'_>) -> Result<Event> {
    let mut fields = Vec::new();
    for attribute in element.attributes() {
        let attribute = attribute?;
        let name = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
        let value = attribute.unescape_value()?.into_owned();
        fields.push((name, value));
    }
    Ok(Event::from_fields(fields))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TRANSPORT_REASON_PREFIX;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const BODY: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<pushlet>
  <event p_event="join-listen-ack" p_id="S123" p_subject="/a b&amp;c"/>
  <event p_event="data" p_subject="/temperature" value="21"><ignored depth="2"/></event>
  <event p_event="refresh" p_wait="3000"/>
</pushlet>"#;

    fn transport_for(server: &MockServer) -> HttpTransport {
        let config = ClientConfig {
            origin: Some(server.uri()),
            ..ClientConfig::default()
        };
        HttpTransport::new(&config).unwrap()
    }

    #[test]
    fn decode_children_in_order() {
        let events = decode_events(BODY).unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].event_type(), "join-listen-ack");
        assert_eq!(events[0].session_id(), Some("S123"));
        assert_eq!(events[0].subject(), Some("/a b&c"));
        assert_eq!(events[1].field("value"), Some("21"));
        assert!(events[1].field("depth").is_none());
        assert_eq!(events[2].event_type(), "refresh");
    }

    #[test]
    fn decode_empty_documents() {
        assert!(decode_events("").unwrap().is_empty());
        assert!(decode_events("<pushlet/>").unwrap().is_empty());
        assert!(decode_events("<pushlet></pushlet>").unwrap().is_empty());
        assert!(decode_events("  \n").unwrap().is_empty());
    }

    #[test]
    fn decode_rejects_malformed() {
        assert!(decode_events("<pushlet><event p_event=\"data\"></pushlet>").is_err());
        assert!(decode_events("<pushlet><event p_event=data/></pushlet>").is_err());
    }

    #[test]
    fn decode_rejects_truncated_document() {
        assert!(decode_events("<pushlet><event p_event=\"data\" v=\"1\"/>").is_err());
        assert!(decode_events("<pushlet><event p_event=\"data\">").is_err());
    }

    #[test]
    fn decode_rejects_non_xml_bodies() {
        let err = decode_events("Internal error").unwrap_err();
        assert_eq!(err.error_code(), "malformed");
        assert!(decode_events("<pushlet/><pushlet/>").is_err());
        assert!(decode_events("<pushlet/> trailing").is_err());
        assert!(decode_events("<?xml version=\"1.0\"?>").is_err());
    }

    #[test]
    fn resolve_relative_against_origin() {
        let config = ClientConfig {
            origin: Some("http://example.test/app/".into()),
            ..ClientConfig::default()
        };
        let transport = HttpTransport::new(&config).unwrap();
        let url = transport.resolve("pushlet.srv?p_event=join").unwrap();
        assert_eq!(url.as_str(), "http://example.test/app/pushlet.srv?p_event=join");

        let absolute = transport.resolve("http://other.test/p").unwrap();
        assert_eq!(absolute.host_str(), Some("other.test"));
    }

    #[test]
    fn resolve_relative_without_origin_fails() {
        let transport = HttpTransport::new(&ClientConfig::default()).unwrap();
        let err = transport.resolve("pushlet.srv").unwrap_err();
        assert_eq!(err.error_code(), "invalid_url");
    }

    #[tokio::test]
    async fn issue_decodes_success_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/pushlet.srv"))
            .and(query_param("p_event", "join-listen"))
            .respond_with(ResponseTemplate::new(200).set_body_string(BODY))
            .expect(1)
            .mount(&server)
            .await;

        let transport = transport_for(&server);
        let events = transport
            .issue("pushlet.srv?p_event=join-listen&p_mode=pull".into())
            .await;
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].session_id(), Some("S123"));
    }

    #[tokio::test]
    async fn http_500_becomes_one_error_event() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let events = transport_for(&server)
            .issue("pushlet.srv?p_event=join".into())
            .await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type(), "error");
        let reason = events[0].reason().unwrap();
        assert!(reason.starts_with(TRANSPORT_REASON_PREFIX));
        assert!(reason.contains("500 Internal Server Error"));
    }

    #[tokio::test]
    async fn malformed_body_becomes_error_event() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<pushlet><event"))
            .mount(&server)
            .await;

        let events = transport_for(&server)
            .issue("pushlet.srv?p_event=hb".into())
            .await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type(), "error");
        assert!(!events[0].reason().unwrap().is_empty());
    }

    #[tokio::test]
    async fn plain_text_body_becomes_error_event() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("Internal error"))
            .mount(&server)
            .await;

        let events = transport_for(&server)
            .issue("pushlet.srv?p_event=refresh".into())
            .await;
        assert_eq!(events.len(), 1);
        assert!(events[0].reason().unwrap().contains("text outside the root element"));
    }

    #[tokio::test]
    async fn connection_refused_becomes_error_event() {
        let config = ClientConfig {
            origin: Some("http://127.0.0.1:1/".into()),
            ..ClientConfig::default()
        };
        let events = HttpTransport::new(&config)
            .unwrap()
            .issue("pushlet.srv?p_event=join".into())
            .await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type(), "error");
        assert!(events[0].reason().unwrap().contains("request failed"));
    }
}
