// Free-text course durations such as "8h 30m", "45m" or "3h".

use regex::Regex;
use std::sync::LazyLock;

static HOURS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([0-9]+)h").expect("hours regex is invalid"));
static MINUTES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([0-9]+)m").expect("minutes regex is invalid"));

/// Total minutes described by `duration`.
///
/// The first `<N>h` and first `<N>m` found are used; anything missing or
/// unrecognised counts as zero, so this never fails.
pub fn parse_minutes(duration: Option<&str>) -> u64 {
    let Some(text) = duration else {
        return 0;
    };
    first_number(&HOURS, text)
        .saturating_mul(60)
        .saturating_add(first_number(&MINUTES, text))
}

fn first_number(re: &Regex, text: &str) -> u64 {
    re.captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0)
}
