//! Remaining-time text.

use chrono::Duration;

/// Prefix for contests accepting entries.
pub const OPEN_PREFIX: &str = "Open - ";

/// Prefix for contests accepting votes.
pub const VOTING_PREFIX: &str = "Voting - ";

/// Builds `"<prefix><days>, <hours>, <minutes> left"`.
///
/// Units are whole and truncated: days, then hours after days, then minutes
/// after hours. Zero units are skipped. With `short_form` the text stops
/// after the first unit written. When no unit is positive (under a minute
/// left, or the deadline already behind us) the text reads `1 minute`.
#[must_use]
pub fn format_remaining(prefix: &str, remaining: Duration, short_form: bool) -> String {
    let units = [
        (remaining.num_days(), "day"),
        (remaining.num_hours() % 24, "hour"),
        (remaining.num_minutes() % 60, "minute"),
    ];

    let mut text = String::from(prefix);
    for (count, unit) in units {
        if count <= 0 {
            continue;
        }
        if !text.ends_with("- ") {
            text.push_str(", ");
        }
        push_unit(&mut text, count, unit);
        if short_form {
            text.push_str(" left");
            return text;
        }
    }

    if text.ends_with("- ") {
        push_unit(&mut text, 1, "minute");
    }
    text.push_str(" left");
    text
}

fn push_unit(text: &mut String, count: i64, unit: &str) {
    text.push_str(&count.to_string());
    text.push(' ');
    text.push_str(unit);
    if count > 1 {
        text.push('s');
    }
}
