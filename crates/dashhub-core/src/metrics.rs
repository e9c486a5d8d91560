//! Metric names recorded by the hub.

/// Client events received (counter, labels: outcome).
pub const CLIENT_EVENTS_TOTAL: &str = "client_events_total";
/// Endpoint executions that failed or panicked (counter).
pub const ENDPOINT_FAILURES_TOTAL: &str = "endpoint_failures_total";
/// State requests awaiting an answer (gauge).
pub const STATE_REQUESTS_PENDING: &str = "state_requests_pending";
/// State requests that ran out their timeout (counter).
pub const STATE_REQUEST_TIMEOUTS_TOTAL: &str = "state_request_timeouts_total";
