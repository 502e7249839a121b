//! `HH:MM:SS(.ffffff)` timecodes for guess/reveal positions and provider
//! durations. Parsing returns `None` on malformed input; absence is a value
//! here, not an exception.

use std::time::Duration;

/// Parse `"SS"`, `"MM:SS"` or `"HH:MM:SS"`, each with an optional fractional
/// part on the seconds field.
#[must_use]
pub fn parse(s: &str) -> Option<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() > 3 {
        return None;
    }

    let mut whole = 0u64;
    for (i, p) in parts[..parts.len() - 1].iter().enumerate() {
        let v: u64 = p.parse().ok()?;
        if i > 0 && v >= 60 {
            return None;
        }
        whole = whole * 60 + v;
    }

    let secs_part = parts[parts.len() - 1];
    let (sec_str, frac_str) = match secs_part.split_once('.') {
        Some((a, b)) => (a, Some(b)),
        None => (secs_part, None),
    };
    let secs: u64 = sec_str.parse().ok()?;
    if parts.len() > 1 && secs >= 60 {
        return None;
    }
    let micros = match frac_str {
        Some(f) if !f.is_empty() => {
            let digits: String = f.chars().take(6).collect();
            if !digits.chars().all(|c| c.is_ascii_digit()) {
                return None;
            }
            let padded = format!("{digits:0<6}");
            padded.parse::<u64>().ok()?
        }
        Some(_) => return None,
        None => 0,
    };

    Some(Duration::from_micros((whole * 60 + secs) * 1_000_000 + micros))
}

/// Seconds as f64, the shape ffmpeg `-ss` and the scoring kernels want.
#[must_use]
pub fn parse_seconds(s: &str) -> Option<f64> {
    parse(s).map(|d| d.as_secs_f64())
}

/// Format as `HH:MM:SS` or `HH:MM:SS.ffffff` when sub-second precision is
/// present.
#[must_use]
pub fn format(d: Duration) -> String {
    let total = d.as_secs();
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    let micros = d.subsec_micros();
    if micros == 0 {
        format!("{h:02}:{m:02}:{s:02}")
    } else {
        format!("{h:02}:{m:02}:{s:02}.{micros:06}")
    }
}

#[must_use]
pub fn zero() -> String {
    format(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_three_shapes() {
        assert_eq!(parse_seconds("50"), Some(50.0));
        assert_eq!(parse_seconds("1:30"), Some(90.0));
        assert_eq!(parse_seconds("01:02:03"), Some(3723.0));
        assert_eq!(parse_seconds("00:00:00"), Some(0.0));
    }

    #[test]
    fn parses_fractions() {
        assert_eq!(parse("00:00:01.5"), Some(Duration::from_millis(1500)));
        assert_eq!(parse("0:10.250000"), Some(Duration::from_millis(10250)));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse(""), None);
        assert_eq!(parse("abc"), None);
        assert_eq!(parse("1:2:3:4"), None);
        assert_eq!(parse("1."), None);
        assert_eq!(parse("0:99"), None);
    }

    #[test]
    fn format_round_trips() {
        for s in ["00:00:00", "00:00:50", "01:02:03", "00:01:20.500000"] {
            let d = parse(s).unwrap();
            assert_eq!(format(d), s);
            assert_eq!(parse(&format(d)), Some(d));
        }
    }

    #[test]
    fn guess_equal_to_reveal_is_legal() {
        let g = parse("00:00:30").unwrap();
        let r = parse("00:00:30").unwrap();
        assert_eq!(g, r);
    }
}
