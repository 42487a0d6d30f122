//! Request, response, header, and status types.

use crate::error::WireError;

/// Header carrying the sender's Lamport clock stamp.
pub const LAMPORT_CLOCK: &str = "LamportClock";
/// Header naming the station a query wants.
pub const STATION_ID: &str = "StationID";
/// Header carrying the identity of the sending process.
pub const SERVER_ID: &str = "ServerID";
/// Body media type header.
pub const CONTENT_TYPE: &str = "Content-Type";
/// Body length header.
pub const CONTENT_LENGTH: &str = "Content-Length";
/// Media type of every body this protocol carries.
pub const JSON_CONTENT_TYPE: &str = "application/json";
/// Resource path used by sources and query clients.
pub const WEATHER_PATH: &str = "/weather.json";
/// Protocol version written on every start line.
pub const VERSION: &str = "HTTP/1.1";

/// Request method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    /// Query the most recent reading for a station.
    Get,
    /// Push a reading.
    Put,
    /// Anything else; answered with `400 Bad Request`.
    Other(String),
}

impl Method {
    /// Parse a method token, case-insensitively.
    pub fn parse(token: &str) -> Self {
        match token.to_ascii_uppercase().as_str() {
            "GET" => Self::Get,
            "PUT" => Self::Put,
            _ => Self::Other(token.to_owned()),
        }
    }

    /// The method token as written on the wire.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Get => "GET",
            Self::Put => "PUT",
            Self::Other(token) => token,
        }
    }
}

impl core::fmt::Display for Method {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Response status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StatusCode(u16);

impl StatusCode {
    /// `200 OK`
    pub const OK: Self = Self(200);
    /// `201 Created`
    pub const CREATED: Self = Self(201);
    /// `204 No Content`
    pub const NO_CONTENT: Self = Self(204);
    /// `400 Bad Request`
    pub const BAD_REQUEST: Self = Self(400);
    /// `500 Internal Server Error`
    pub const INTERNAL_SERVER_ERROR: Self = Self(500);

    /// Wrap a raw status code.
    pub const fn from_u16(code: u16) -> Self {
        Self(code)
    }

    /// The numeric code.
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Whether the code is in the 2xx range.
    pub const fn is_success(self) -> bool {
        self.0 >= 200 && self.0 < 300
    }

    /// Whether the code is in the 5xx range.
    pub const fn is_server_error(self) -> bool {
        self.0 >= 500 && self.0 < 600
    }

    /// Canonical reason phrase.
    pub const fn reason(self) -> &'static str {
        match self.0 {
            200 => "OK",
            201 => "Created",
            204 => "No Content",
            400 => "Bad Request",
            500 => "Internal Server Error",
            _ => "Unknown",
        }
    }
}

impl core::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} {}", self.0, self.reason())
    }
}

/// Ordered header list with case-insensitive lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    /// Create an empty header list.
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Value of the first header named `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Set `name`, replacing an existing value in place.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.0.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case(&name)) {
            Some(slot) => slot.1 = value,
            None => self.0.push((name, value)),
        }
    }

    /// Remove every header named `name`.
    pub fn remove(&mut self, name: &str) {
        self.0.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
    }

    /// Iterate over headers in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Number of headers.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no headers.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The `LamportClock` stamp, or `-1` when absent or unparsable.
    pub fn lamport_clock(&self) -> i64 {
        self.get(LAMPORT_CLOCK)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(-1)
    }

    /// A header value, treating the empty string as absent.
    pub fn non_empty(&self, name: &str) -> Option<&str> {
        self.get(name).map(str::trim).filter(|v| !v.is_empty())
    }

    /// The declared body length; `0` when absent.
    pub fn content_length(&self) -> Result<usize, WireError> {
        self.get(CONTENT_LENGTH).map_or(Ok(0), |v| {
            v.trim().parse().map_err(|e| {
                WireError::MalformedRequest(format!("invalid Content-Length {v:?}: {e}"))
            })
        })
    }
}

/// A decoded or to-be-sent request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Request method.
    pub method: Method,
    /// Request target (path).
    pub target: String,
    /// Protocol version token.
    pub version: String,
    /// Headers in arrival order.
    pub headers: Headers,
    /// Raw body bytes.
    pub body: Vec<u8>,
}

impl Request {
    /// A request with no headers and no body.
    pub fn new(method: Method, target: impl Into<String>) -> Self {
        Self {
            method,
            target: target.into(),
            version: VERSION.to_owned(),
            headers: Headers::new(),
            body: Vec::new(),
        }
    }

    /// Builder-style header setter.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.headers.insert(name, value.to_string());
        self
    }

    /// Attach a JSON body.
    #[must_use]
    pub fn json_body(mut self, body: Vec<u8>) -> Self {
        self.headers.insert(CONTENT_TYPE, JSON_CONTENT_TYPE);
        self.body = body;
        self
    }

    /// The `StationID` header, if present and non-empty.
    pub fn station_id(&self) -> Option<&str> {
        self.headers.non_empty(STATION_ID)
    }

    /// The `ServerID` header, if present and non-empty.
    pub fn server_id(&self) -> Option<&str> {
        self.headers.non_empty(SERVER_ID)
    }
}

/// A decoded or to-be-sent response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Protocol version token.
    pub version: String,
    /// Status code.
    pub status: StatusCode,
    /// Reason phrase as sent.
    pub reason: String,
    /// Headers in arrival order.
    pub headers: Headers,
    /// Raw body bytes.
    pub body: Vec<u8>,
}

impl Response {
    /// A response with the canonical reason phrase and no body.
    pub fn new(status: StatusCode) -> Self {
        Self {
            version: VERSION.to_owned(),
            status,
            reason: status.reason().to_owned(),
            headers: Headers::new(),
            body: Vec::new(),
        }
    }

    /// Builder-style header setter.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.headers.insert(name, value.to_string());
        self
    }

    /// Attach a JSON body.
    #[must_use]
    pub fn json_body(mut self, body: Vec<u8>) -> Self {
        self.headers.insert(CONTENT_TYPE, JSON_CONTENT_TYPE);
        self.body = body;
        self
    }

    /// The `LamportClock` stamp, or `-1` when absent or unparsable.
    pub fn lamport_clock(&self) -> i64 {
        self.headers.lamport_clock()
    }
}
