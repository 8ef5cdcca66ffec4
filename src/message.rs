// pea: message / envelope / request data model (§3, §6)

use serde::{Deserialize, Serialize};

/// Outcome of an executor's handling of a request, carried in the envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusCode {
    Ok,
    Error,
}

/// One hop a message has traversed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteEntry {
    pub pea_name: String,
    pub identity: String,
    pub timestamp_unix_ms: i64,
}

/// Envelope fields the core cares about (§3). The rest of the wire
/// envelope (tracing ids, compression, ...) is the transport's concern and
/// is not modeled here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub request_id: String,
    pub request_type: String,
    pub status: StatusCode,
    pub route: Vec<RouteEntry>,
    pub is_data_request: bool,
    /// Set when the hook pipeline marks the message with a chained error or
    /// attaches an executor exception (§4.5, §4.4).
    pub exception: Option<ExceptionPayload>,
    pub updated_at_unix_ms: i64,
}

/// What `add_exception` records on the envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExceptionPayload {
    /// `None` for a `ChainedPodException` passthrough (§4.5): "no
    /// exception payload attached", only the marker.
    pub message: Option<String>,
    pub executor: Option<String>,
}

impl Envelope {
    pub fn new(request_id: impl Into<String>, request_type: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            request_type: request_type.into(),
            status: StatusCode::Ok,
            route: Vec::new(),
            is_data_request: false,
            exception: None,
            updated_at_unix_ms: 0,
        }
    }

    pub fn add_route(&mut self, pea_name: &str, identity: &str, now_unix_ms: i64) {
        self.route.push(RouteEntry {
            pea_name: pea_name.to_string(),
            identity: identity.to_string(),
            timestamp_unix_ms: now_unix_ms,
        });
    }

    /// §4.5: ChainedPodException carries no exception payload, only a marker.
    pub fn add_chained_marker(&mut self) {
        self.exception = Some(ExceptionPayload {
            message: None,
            executor: None,
        });
    }

    pub fn add_exception(&mut self, message: String, executor: &str) {
        self.exception = Some(ExceptionPayload {
            message: Some(message),
            executor: Some(executor.to_string()),
        });
    }

    pub fn update_timestamp(&mut self, now_unix_ms: i64) {
        self.updated_at_unix_ms = now_unix_ms;
    }

    /// Human-readable trace of the route for log lines, e.g.
    /// `"encoder(encoder-0) -> ranker(ranker-0)"` (§3 accessor list).
    pub fn colored_route(&self) -> String {
        self.route
            .iter()
            .map(|hop| format!("{}({})", hop.pea_name, hop.identity))
            .collect::<Vec<_>>()
            .join(" -> ")
    }

    /// Union the routes (and adopt the union for the caller) of all
    /// messages collected for a completed partial set. The caller's own
    /// envelope is the *last* arrival and is mutated in place (§4.4 step 4).
    pub fn merge_envelope_from(&mut self, others: &[Envelope]) {
        let mut merged_route = Vec::new();
        for other in others {
            for entry in &other.route {
                merged_route.push(entry.clone());
            }
        }
        self.route = merged_route;
    }
}

/// A message: transport envelope plus a domain-specific request body.
/// Generic over the request type so embedding domains can plug in their
/// own payload without this crate knowing its shape.
#[derive(Debug, Clone)]
pub struct Message<R> {
    pub envelope: Envelope,
    pub request: R,
}

impl<R> Message<R> {
    pub fn new(envelope: Envelope, request: R) -> Self {
        Self { envelope, request }
    }
}
