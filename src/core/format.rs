//! Line formatting: timestamp prefixes and hex rendering of raw chunks.

use std::fmt::Write;

use chrono::{DateTime, Timelike, Utc};

/// Width of `[HH:MM:SS.mmm] `.
pub const TIMESTAMP_PREFIX_LEN: usize = 15;

/// `[HH:MM:SS.mmm] ` for `now`.
pub fn timestamp_prefix(now: DateTime<Utc>) -> String {
    format!(
        "[{:02}:{:02}:{:02}.{:03}] ",
        now.hour(),
        now.minute(),
        now.second(),
        now.timestamp_subsec_millis().min(999)
    )
}

/// Strips one leading `[HH:MM:SS.mmm] ` from `line`, if it is there.
pub fn strip_timestamp(line: &[u8]) -> &[u8] {
    if has_timestamp_prefix(line) {
        &line[TIMESTAMP_PREFIX_LEN..]
    } else {
        line
    }
}

fn has_timestamp_prefix(line: &[u8]) -> bool {
    const PATTERN: &[u8; TIMESTAMP_PREFIX_LEN] = b"[00:00:00.000] ";
    line.len() >= TIMESTAMP_PREFIX_LEN
        && PATTERN.iter().zip(line).all(|(&p, &b)| {
            if p == b'0' {
                b.is_ascii_digit()
            } else {
                p == b
            }
        })
}

/// Renders `chunk` as upper-case hex pairs separated by single spaces.
pub fn hex_line(chunk: &[u8]) -> String {
    let mut out = String::with_capacity(chunk.len() * 3);
    for (i, b) in chunk.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{b:02X}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn prefix_has_fixed_width() {
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 3).unwrap()
            + chrono::Duration::milliseconds(42);
        let prefix = timestamp_prefix(now);
        assert_eq!(prefix, "[07:05:03.042] ");
        assert_eq!(prefix.len(), TIMESTAMP_PREFIX_LEN);
        assert_eq!(strip_timestamp(format!("{prefix}boot").as_bytes()), b"boot");
    }

    #[test]
    fn strips_only_a_leading_well_formed_prefix() {
        assert_eq!(strip_timestamp(b"[12:34:56.789] hello"), b"hello");
        assert_eq!(
            strip_timestamp(b"[12:34:56.789] [01:02:03.004] x"),
            b"[01:02:03.004] x"
        );
        assert_eq!(strip_timestamp(b"hello"), b"hello");
        assert_eq!(strip_timestamp(b" [12:34:56.789] x"), b" [12:34:56.789] x");
        assert_eq!(strip_timestamp(b"[12:34:56.789]x"), b"[12:34:56.789]x");
        assert_eq!(strip_timestamp(b"[ab:34:56.789] x"), b"[ab:34:56.789] x");
        assert_eq!(strip_timestamp(b"[12:34:56.789] "), b"");
    }

    #[test]
    fn hex_line_pairs() {
        assert_eq!(hex_line(&[0x0a, 0xff, 0x10]), "0A FF 10");
        assert_eq!(hex_line(&[]), "");
    }
}
