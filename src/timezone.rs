//! Time-zone handling for the chat request location hint.
//!
//! The API expects an IANA identifier such as `America/New_York`. Systems
//! that report a legacy (Windows-style) zone name get mapped through a
//! static fallback table; unmapped identifiers pass through unchanged.

/// Resolve the local system time zone as an IANA identifier.
///
/// Falls back to `UTC` when the platform zone cannot be determined.
pub fn local_iana() -> String {
    match iana_time_zone::get_timezone() {
        Ok(zone) => to_iana(&zone),
        Err(_) => "UTC".to_string(),
    }
}

/// Convert a zone identifier to IANA format.
///
/// Identifiers that already look IANA-formatted (containing a `/`, or the
/// literal `UTC`) pass through untouched. Otherwise the identifier is looked
/// up in a table of common legacy zone names; identifiers with no mapping
/// are returned as-is rather than causing a failure.
pub fn to_iana(zone: &str) -> String {
    if zone == "UTC" || zone.contains('/') {
        return zone.to_string();
    }
    match zone {
        "Pacific Standard Time" => "America/Los_Angeles",
        "Mountain Standard Time" => "America/Denver",
        "Central Standard Time" => "America/Chicago",
        "Eastern Standard Time" => "America/New_York",
        "GMT Standard Time" => "Europe/London",
        "W. Europe Standard Time" => "Europe/Paris",
        "Central Europe Standard Time" => "Europe/Warsaw",
        "Romance Standard Time" => "Europe/Paris",
        "Central European Standard Time" => "Europe/Belgrade",
        "AUS Eastern Standard Time" => "Australia/Sydney",
        "E. Australia Standard Time" => "Australia/Brisbane",
        "AUS Central Standard Time" => "Australia/Darwin",
        "China Standard Time" => "Asia/Shanghai",
        "India Standard Time" => "Asia/Kolkata",
        "Tokyo Standard Time" => "Asia/Tokyo",
        _ => zone,
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iana_identifiers_pass_through() {
        assert_eq!(to_iana("America/New_York"), "America/New_York");
        assert_eq!(to_iana("Europe/London"), "Europe/London");
        assert_eq!(to_iana("UTC"), "UTC");
    }

    #[test]
    fn legacy_names_map_to_iana() {
        assert_eq!(to_iana("Pacific Standard Time"), "America/Los_Angeles");
        assert_eq!(to_iana("India Standard Time"), "Asia/Kolkata");
        assert_eq!(to_iana("GMT Standard Time"), "Europe/London");
    }

    #[test]
    fn unmapped_names_pass_through_unchanged() {
        assert_eq!(to_iana("Atlantis Standard Time"), "Atlantis Standard Time");
    }

    #[test]
    fn local_zone_is_nonempty() {
        assert!(!local_iana().is_empty());
    }
}
