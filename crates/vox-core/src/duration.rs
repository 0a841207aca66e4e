//! Duration estimates
//!
//! These are approximations. Callers treat the values as informational.

use crate::provider::WordTiming;

/// Bitrate assumed when estimating duration from an encoded file size
pub const ASSUMED_BITRATE_KBPS: f64 = 128.0;

/// Duration from the end timestamp of the last word
pub fn from_word_timings(words: &[WordTiming]) -> Option<f64> {
    words
        .iter()
        .map(|w| w.end)
        .filter(|end| end.is_finite() && *end >= 0.0)
        .fold(None, |max, end| match max {
            Some(m) if m >= end => Some(m),
            _ => Some(end),
        })
}

/// Duration of an encoded file assuming [`ASSUMED_BITRATE_KBPS`]
pub fn from_byte_size(bytes: usize) -> f64 {
    (bytes as f64 * 8.0) / (ASSUMED_BITRATE_KBPS * 1000.0)
}

pub fn to_minutes(secs: f64) -> f64 {
    secs / 60.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(text: &str, start: f64, end: f64) -> WordTiming {
        WordTiming {
            text: text.to_string(),
            start,
            end,
            speaker: None,
        }
    }

    #[test]
    fn test_from_word_timings_uses_last_end() {
        let words = vec![word("hello", 0.0, 0.4), word("world", 0.5, 1.25)];
        assert_eq!(from_word_timings(&words), Some(1.25));
        assert_eq!(from_word_timings(&[]), None);
    }

    #[test]
    fn test_from_byte_size() {
        // 16 000 bytes at 128 kbps is one second
        assert_eq!(from_byte_size(16_000), 1.0);
        assert_eq!(from_byte_size(0), 0.0);
        assert_eq!(to_minutes(from_byte_size(960_000)), 1.0);
    }
}
