//! Access control checks that run before anything else touches a command:
//! the radiation-leak world lockout and the location-bound command table.

use shipproto::{CommandOutcome, Location};

pub const LOCKOUT_RESPONSE: &str =
    "Cannot comply. Bridge controls are locked out due to the radiation alert.";

pub const LOCATION_DENIED_ALERT: &str = "location_denied";

/// Commands that require physical presence. Matched as substrings of the
/// lowercased command text.
pub const RESTRICTED_COMMANDS: &[(&str, Location)] = &[
    ("eject warp core", Location::Engineering),
    ("purge coolant", Location::Engineering),
    ("medical override", Location::Sickbay),
    ("quarantine", Location::Sickbay),
    ("cargo release", Location::CargoBay),
    ("jettison cargo", Location::CargoBay),
    ("jefferies tube access", Location::JefferiesTube),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocationDenial {
    pub phrase: &'static str,
    pub required: Location,
}

/// First restricted phrase present in `text` that the user is not standing
/// in the right place for. `text` must already be lowercased.
pub fn check_location(text: &str, at: Location) -> Option<LocationDenial> {
    RESTRICTED_COMMANDS
        .iter()
        .find(|(phrase, required)| text.contains(phrase) && at != *required)
        .map(|(phrase, required)| LocationDenial {
            phrase,
            required: *required,
        })
}

pub fn denial_outcome(denial: &LocationDenial, at: Location) -> CommandOutcome {
    CommandOutcome {
        response: format!(
            "Access Denied. Command '{}' requires physical presence in {}. Current location: {}.",
            denial.phrase, denial.required, at
        ),
        alert: Some(LOCATION_DENIED_ALERT.to_string()),
        required_location: Some(denial.required.as_str().to_string()),
        ..CommandOutcome::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denies_only_on_location_mismatch() {
        let d = check_location("computer, eject warp core immediately!", Location::Bridge)
            .expect("should deny from the bridge");
        assert_eq!(d.required, Location::Engineering);

        assert_eq!(
            check_location("computer, eject warp core immediately!", Location::Engineering),
            None
        );
    }

    #[test]
    fn unrestricted_text_passes_everywhere() {
        for at in Location::ALL {
            assert_eq!(check_location("status report", at), None);
        }
    }

    #[test]
    fn denial_names_the_required_location() {
        let d = check_location("quarantine deck five", Location::Bridge).unwrap();
        let o = denial_outcome(&d, Location::Bridge);
        assert!(o.response.contains("Access Denied"));
        assert!(o.response.contains("Sickbay"));
        assert_eq!(o.alert.as_deref(), Some(LOCATION_DENIED_ALERT));
        assert_eq!(o.required_location.as_deref(), Some("Sickbay"));
        assert!(o.updates.is_empty());
    }
}
