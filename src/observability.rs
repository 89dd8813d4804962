use biometrics::{Collector, Counter};

pub(crate) static CLIENT_REQUESTS: Counter = Counter::new("m365chat.client.requests");
pub(crate) static CLIENT_REQUEST_ERRORS: Counter = Counter::new("m365chat.client.request_errors");

pub(crate) static STREAM_EVENTS: Counter = Counter::new("m365chat.stream.events");
pub(crate) static STREAM_ERRORS: Counter = Counter::new("m365chat.stream.errors");

pub(crate) static TOKEN_REFRESHES: Counter = Counter::new("m365chat.auth.token_refreshes");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&CLIENT_REQUESTS);
    collector.register_counter(&CLIENT_REQUEST_ERRORS);

    collector.register_counter(&STREAM_EVENTS);
    collector.register_counter(&STREAM_ERRORS);

    collector.register_counter(&TOKEN_REFRESHES);
}
