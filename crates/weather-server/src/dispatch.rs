//! Request dispatch for the aggregation server.
//!
//! [`Dispatcher`] turns one decoded [`Request`] into one [`Response`]. It
//! owns no I/O: the worker decodes, calls [`Dispatcher::dispatch`], and
//! encodes whatever comes back.
//!
//! Clock handling follows the Lamport rules. The request's stamp is merged
//! before anything else, reads are bounded by the merged time, and every
//! response carries a fresh `send()` stamp.

use std::sync::Arc;

use tracing::{debug, info, warn};
use weather_core::{ContentStore, LamportClock};
use weather_types::{Document, Reading, SourceId, StationId};
use weather_wire::message::{LAMPORT_CLOCK, SERVER_ID};
use weather_wire::{Method, Request, Response, StatusCode, WireError};

use crate::error::RequestError;

/// Routes requests to the content store.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    store: Arc<ContentStore>,
    clock: Arc<LamportClock>,
}

impl Dispatcher {
    /// Create a dispatcher over a shared store and clock.
    pub const fn new(store: Arc<ContentStore>, clock: Arc<LamportClock>) -> Self {
        Self { store, clock }
    }

    /// Handle one request and build its stamped response.
    pub fn dispatch(&self, request: &Request) -> Response {
        self.clock.receive(request.headers.lamport_clock());

        let result = match &request.method {
            Method::Get => self.handle_get(request),
            Method::Put => self.handle_put(request),
            Method::Other(method) => Err(RequestError::MalformedRequest(format!(
                "unsupported method {method}"
            ))),
        };

        let response = result.unwrap_or_else(|e| {
            match &e {
                RequestError::NoData => debug!(target_path = %request.target, "no data"),
                RequestError::Encoding(_) => warn!(error = %e, "request failed"),
                _ => info!(method = %request.method, error = %e, "request rejected"),
            }
            Response::new(e.status())
        });
        self.stamp(response)
    }

    /// Build the `400` sent for a request that could not be decoded.
    pub fn reject(&self, error: &WireError) -> Response {
        info!(error = %error, "undecodable request");
        self.stamp(Response::new(StatusCode::BAD_REQUEST))
    }

    fn stamp(&self, response: Response) -> Response {
        response.header(LAMPORT_CLOCK, self.clock.send())
    }

    fn handle_get(&self, request: &Request) -> Result<Response, RequestError> {
        let station = request.station_id().map(StationId::from);
        let bound = self.clock.current();
        let reading = self
            .store
            .resolve(station.as_ref(), bound)
            .ok_or(RequestError::NoData)?;

        let body = serde_json::to_vec(&reading.payload)?;
        debug!(
            station = %reading.station_id,
            lamport_time = reading.lamport_time,
            bound,
            "reading served"
        );
        Ok(Response::new(StatusCode::OK).json_body(body))
    }

    fn handle_put(&self, request: &Request) -> Result<Response, RequestError> {
        let source = request
            .server_id()
            .map(SourceId::from)
            .ok_or(RequestError::MissingRequiredHeader(SERVER_ID))?;

        let document: Document = serde_json::from_slice(&request.body)
            .map_err(|e| RequestError::MalformedBody(format!("not a JSON object: {e}")))?;

        let reading = Reading::from_document(document, self.clock.current(), source).ok_or_else(
            || RequestError::MalformedBody("document has no usable \"id\" field".to_owned()),
        )?;

        let kind = self
            .store
            .put(reading)
            .map_err(|e| RequestError::MalformedBody(e.to_string()))?;

        let status = if kind.is_new() {
            StatusCode::CREATED
        } else {
            StatusCode::OK
        };
        Ok(Response::new(status))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeDelta;
    use weather_wire::message::STATION_ID;

    use super::*;

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(
            Arc::new(ContentStore::new(TimeDelta::seconds(20))),
            Arc::new(LamportClock::new()),
        )
    }

    fn put(source: &str, clock: i64, body: &str) -> Request {
        Request::new(Method::Put, "/weather.json")
            .header(SERVER_ID, source)
            .header(LAMPORT_CLOCK, clock)
            .json_body(body.as_bytes().to_vec())
    }

    fn get(station: Option<&str>, clock: i64) -> Request {
        let request = Request::new(Method::Get, "/weather.json").header(LAMPORT_CLOCK, clock);
        match station {
            Some(s) => request.header(STATION_ID, s),
            None => request,
        }
    }

    #[test]
    fn first_put_creates_then_updates() {
        let d = dispatcher();
        let first = d.dispatch(&put("s1", 1, r#"{"id":"A","t":"1"}"#));
        assert_eq!(first.status, StatusCode::CREATED);
        let second = d.dispatch(&put("s1", 3, r#"{"id":"A","t":"2"}"#));
        assert_eq!(second.status, StatusCode::OK);
        assert_eq!(d.store.reading_count(), 2);
    }

    #[test]
    fn put_merges_clock_before_stamping_reading() {
        let d = dispatcher();
        d.dispatch(&put("s1", 10, r#"{"id":"A"}"#));
        let stored = d.store.get(&StationId::from("A"), u64::MAX).unwrap();
        // receive(10) on a fresh clock gives 11.
        assert_eq!(stored.lamport_time, 11);
    }

    #[test]
    fn every_response_carries_a_fresh_clock() {
        let d = dispatcher();
        let response = d.dispatch(&get(None, 5));
        assert_eq!(response.status, StatusCode::NO_CONTENT);
        // receive(5) -> 6, send() -> 7.
        assert_eq!(response.lamport_clock(), 7);
        assert!(response.body.is_empty());
    }

    #[test]
    fn put_without_server_id_is_rejected() {
        let d = dispatcher();
        let request = Request::new(Method::Put, "/").json_body(br#"{"id":"A"}"#.to_vec());
        let response = d.dispatch(&request);
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert!(d.store.is_empty());
    }

    #[test]
    fn malformed_bodies_leave_store_unchanged() {
        let d = dispatcher();
        for body in ["not json", "[1,2]", r#"{"temp":"3"}"#, r#"{"id":""}"#, r#"{"id":null}"#, ""] {
            let response = d.dispatch(&put("s1", 1, body));
            assert_eq!(response.status, StatusCode::BAD_REQUEST, "body {body:?}");
        }
        assert!(d.store.is_empty());
        assert_eq!(d.store.source_count(), 0);
    }

    #[test]
    fn malformed_put_from_known_source_changes_nothing() {
        let d = dispatcher();
        d.dispatch(&put("s1", 1, r#"{"id":"A","t":"1"}"#));
        d.dispatch(&put("s2", 2, r#"{"id":"B","t":"2"}"#));
        let before = d.store.snapshot();

        for body in ["not json", r#"{"temp":"3"}"#, r#"{"id":""}"#] {
            let response = d.dispatch(&put("s1", 9, body));
            assert_eq!(response.status, StatusCode::BAD_REQUEST, "body {body:?}");
        }

        // Ledgers and the sender's liveness instant are untouched.
        assert_eq!(d.store.snapshot(), before);
    }

    #[test]
    fn numeric_id_is_accepted() {
        let d = dispatcher();
        let response = d.dispatch(&put("s1", 1, r#"{"id":42,"t":"x"}"#));
        assert_eq!(response.status, StatusCode::CREATED);
        assert!(d.store.get(&StationId::from("42"), u64::MAX).is_some());
    }

    #[test]
    fn get_returns_payload_verbatim() {
        let d = dispatcher();
        d.dispatch(&put("s1", 1, r#"{"id":"A","wind":"NW","temp":"13.3"}"#));
        let response = d.dispatch(&get(Some("A"), 0));
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body, br#"{"id":"A","wind":"NW","temp":"13.3"}"#.to_vec());
        assert_eq!(response.headers.get("Content-Type"), Some("application/json"));
    }

    #[test]
    fn get_without_station_uses_smallest_id() {
        let d = dispatcher();
        d.dispatch(&put("s1", 1, r#"{"id":"B"}"#));
        d.dispatch(&put("s1", 1, r#"{"id":"A"}"#));
        let response = d.dispatch(&get(None, 0));
        let body: Document = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(body.get("id").unwrap(), "A");
    }

    #[test]
    fn get_unknown_station_is_no_content() {
        let d = dispatcher();
        d.dispatch(&put("s1", 1, r#"{"id":"A"}"#));
        let response = d.dispatch(&get(Some("Z"), 0));
        assert_eq!(response.status, StatusCode::NO_CONTENT);
    }

    #[test]
    fn get_returns_latest_reading() {
        let d = dispatcher();
        d.dispatch(&put("s1", 1, r#"{"id":"A","v":"old"}"#));
        d.dispatch(&put("s2", 50, r#"{"id":"A","v":"new"}"#));
        let response = d.dispatch(&get(Some("A"), -1));
        let body: Document = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(body.get("v").unwrap(), "new");
    }

    #[test]
    fn unknown_method_is_bad_request() {
        let d = dispatcher();
        let response = d.dispatch(&Request::new(Method::parse("DELETE"), "/"));
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert!(response.lamport_clock() > 0);
    }

    #[test]
    fn reject_is_stamped_bad_request() {
        let d = dispatcher();
        let response = d.reject(&WireError::MalformedRequest("x".to_owned()));
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(response.lamport_clock(), 1);
    }
}
