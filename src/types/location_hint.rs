use serde::{Deserialize, Serialize};

/// Location hint attached to every chat request.
///
/// The API expects an IANA time-zone identifier such as `America/New_York`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LocationHint {
    /// IANA time-zone identifier for the user's locale.
    #[serde(rename = "timeZone", alias = "TimeZone")]
    pub time_zone: String,
}

impl LocationHint {
    /// Create a new location hint with the given time zone.
    pub fn new(time_zone: impl Into<String>) -> Self {
        Self {
            time_zone: time_zone.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_camel_case() {
        let hint = LocationHint::new("Europe/London");
        let json = serde_json::to_string(&hint).unwrap();
        assert_eq!(json, r#"{"timeZone":"Europe/London"}"#);
    }
}
