//! Wall-clock stamps shown on chat and whisper lines.

use std::fmt;

use chrono::{Local, NaiveTime};

/// Hour and minute of local time, rendered as `HH:MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp(NaiveTime);

impl Timestamp {
    /// The current local time.
    pub fn now() -> Self {
        Self(Local::now().time())
    }

    /// Builds a stamp from an hour and minute.
    ///
    /// Returns `None` for out-of-range values.
    pub fn from_hm(hour: u32, minute: u32) -> Option<Self> {
        NaiveTime::from_hms_opt(hour, minute, 0).map(Self)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%H:%M"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_padded_display() {
        let ts = Timestamp::from_hm(9, 5).unwrap();
        assert_eq!(ts.to_string(), "09:05");
    }

    #[test]
    fn test_out_of_range_rejected() {
        assert!(Timestamp::from_hm(24, 0).is_none());
        assert!(Timestamp::from_hm(12, 60).is_none());
    }

    #[test]
    fn test_now_renders_five_chars() {
        let rendered = Timestamp::now().to_string();
        assert_eq!(rendered.len(), 5);
        assert_eq!(rendered.as_bytes().get(2), Some(&b':'));
    }
}
