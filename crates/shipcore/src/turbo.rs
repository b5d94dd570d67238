//! Turbo mode: an ordered rule list that resolves the common commands
//! without a model round-trip. First match wins; later rules never combine
//! with earlier ones. Pure rules carry their updates/response inline;
//! stateful rules (status snapshot, auth sessions) are executed by the
//! engine against the store.

/// Status/report only short-circuits for short utterances; longer sentences
/// that merely mention a report should still reach the model.
const STATUS_MAX_LEN: usize = 80;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurboMatch {
    /// Fixed updates and response, no store access needed to decide.
    Static {
        updates: &'static [(&'static str, i64)],
        response: &'static str,
        alert: Option<&'static str>,
    },
    /// "status" / "report": respond with the live ship snapshot.
    StatusReport,
    /// "initiate auth": mint a session code for this user.
    InitiateAuth,
    /// "authorize session NNNN": consume a pending session.
    AuthorizeSession { code: String },
}

/// Match `text` (already lowercased) against the rule list.
pub fn match_command(text: &str) -> Option<TurboMatch> {
    if text.contains("000-destruct-0") || text.contains("self destruct") {
        return Some(TurboMatch::Static {
            updates: &[("shields", 0)],
            response: "Auto-destruct sequence accepted. Countdown initiated... just kidding. \
                       Shields lowered for dramatic effect.",
            alert: None,
        });
    }
    if has_word(text, "joshua") || text.contains("sudo !!") {
        return Some(TurboMatch::Static {
            updates: &[],
            response: "Greetings, Professor Falken. A strange game. The only winning move is \
                       not to play.",
            alert: None,
        });
    }
    if text.len() <= STATUS_MAX_LEN && (has_word(text, "status") || has_word(text, "report")) {
        return Some(TurboMatch::StatusReport);
    }
    if text.contains("shields up")
        || text.contains("raise shields")
        || text.contains("shields to maximum")
    {
        return Some(TurboMatch::Static {
            updates: &[("shields", 100)],
            response: "Shields raised to maximum.",
            alert: None,
        });
    }
    if text.contains("shields down") || text.contains("lower shields") {
        return Some(TurboMatch::Static {
            updates: &[("shields", 0)],
            response: "Shields lowered.",
            alert: None,
        });
    }
    if text.contains("red alert") {
        return Some(TurboMatch::Static {
            updates: &[("shields", 100), ("phasers", 100)],
            response: "Red alert. Shields at maximum, phasers armed.",
            alert: Some("red_alert"),
        });
    }
    if text.contains("engage warp") || text.contains("warp engage") || text.contains("maximum warp")
    {
        return Some(TurboMatch::Static {
            updates: &[("warp", 90)],
            response: "Warp drive engaged.",
            alert: None,
        });
    }
    if text.contains("disengage warp")
        || text.contains("warp disengage")
        || text.contains("full stop")
    {
        return Some(TurboMatch::Static {
            updates: &[("warp", 0)],
            response: "Warp drive disengaged.",
            alert: None,
        });
    }
    if text.contains("arm phasers") || text.contains("phasers arm") || text.contains("lock phasers")
    {
        return Some(TurboMatch::Static {
            updates: &[("phasers", 100)],
            response: "Phasers armed and locked.",
            alert: None,
        });
    }
    if text.contains("initiate auth") {
        return Some(TurboMatch::InitiateAuth);
    }
    if let Some(code) = auth_code(text) {
        return Some(TurboMatch::AuthorizeSession { code });
    }
    if bare_wake_word(text) {
        return Some(TurboMatch::Static {
            updates: &[],
            response: "Awaiting command.",
            alert: None,
        });
    }
    None
}

fn has_word(text: &str, word: &str) -> bool {
    text.split(|c: char| !c.is_ascii_alphanumeric())
        .any(|w| w == word)
}

/// Capture exactly four digits after "authorize session".
fn auth_code(text: &str) -> Option<String> {
    let idx = text.find("authorize session")?;
    let rest = text[idx + "authorize session".len()..].trim_start();
    let digits = rest
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect::<String>();
    if digits.len() == 4 {
        Some(digits)
    } else {
        None
    }
}

/// The wake word alone, not merely mentioned inside a longer command.
fn bare_wake_word(text: &str) -> bool {
    text.trim()
        .trim_matches(|c: char| !c.is_ascii_alphanumeric())
        == "computer"
}

#[cfg(test)]
mod tests {
    use super::*;

    fn static_response(text: &str) -> &'static str {
        match match_command(text) {
            Some(TurboMatch::Static { response, .. }) => response,
            other => panic!("expected static match for {text:?}, got {other:?}"),
        }
    }

    #[test]
    fn destruct_easter_egg_lowers_shields() {
        match match_command("000-destruct-0") {
            Some(TurboMatch::Static {
                updates, response, ..
            }) => {
                assert_eq!(updates, &[("shields", 0)]);
                assert!(response.contains("just kidding"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn joshua_easter_egg() {
        assert!(static_response("hello joshua").contains("winning move"));
        assert!(static_response("sudo !!").contains("winning move"));
    }

    #[test]
    fn status_only_matches_short_text() {
        assert_eq!(match_command("status report"), Some(TurboMatch::StatusReport));
        let long = "please prepare a detailed engineering report covering every plasma conduit \
                    on decks four through nine";
        assert_ne!(match_command(long), Some(TurboMatch::StatusReport));
    }

    #[test]
    fn shields_and_warp_rules() {
        assert_eq!(static_response("shields up"), "Shields raised to maximum.");
        assert_eq!(static_response("lower shields"), "Shields lowered.");
        assert_eq!(static_response("engage warp"), "Warp drive engaged.");
        assert_eq!(static_response("full stop"), "Warp drive disengaged.");
        assert_eq!(static_response("arm phasers"), "Phasers armed and locked.");
    }

    #[test]
    fn red_alert_sets_alert_field() {
        match match_command("red alert!") {
            Some(TurboMatch::Static { updates, alert, .. }) => {
                assert_eq!(updates, &[("shields", 100), ("phasers", 100)]);
                assert_eq!(alert, Some("red_alert"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn first_rule_wins_over_later_rules() {
        // Contains both a shields phrase and a warp phrase; shields is listed
        // first and must take the command alone.
        match match_command("shields up and engage warp") {
            Some(TurboMatch::Static { updates, .. }) => {
                assert_eq!(updates, &[("shields", 100)]);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn auth_rules_capture_codes() {
        assert_eq!(match_command("initiate auth"), Some(TurboMatch::InitiateAuth));
        assert_eq!(
            match_command("authorize session 1234"),
            Some(TurboMatch::AuthorizeSession {
                code: "1234".to_string()
            })
        );
        assert_eq!(match_command("authorize session 12"), None);
        assert_eq!(match_command("authorize session now"), None);
    }

    #[test]
    fn wake_word_must_stand_alone() {
        assert_eq!(static_response("computer"), "Awaiting command.");
        assert_eq!(static_response(" computer. "), "Awaiting command.");
        // Mentioning the computer inside an unmatched sentence goes to the model.
        assert_eq!(match_command("computer, plot a course to starbase 12"), None);
    }
}
