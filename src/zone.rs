use anyhow::{Result, bail};
use chrono::{DateTime, FixedOffset, Utc};
use chrono_tz::Tz;

/// Timezone used for backup names, export names and listing timestamps.
///
/// Named zones come from the IANA database and follow daylight saving.
/// Fixed offsets such as `+03:00` are accepted for hosts that prefer them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Zone {
    Named(Tz),
    Fixed(FixedOffset),
}

impl Zone {
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.eq_ignore_ascii_case("utc") || trimmed == "Z" {
            return Ok(Self::Named(Tz::UTC));
        }
        if let Ok(tz) = trimmed.parse::<Tz>() {
            return Ok(Self::Named(tz));
        }
        if let Ok(offset) = trimmed.parse::<FixedOffset>() {
            return Ok(Self::Fixed(offset));
        }
        bail!("timezone {raw:?} is neither an IANA zone like Europe/Moscow nor an offset like +03:00")
    }

    pub fn format(&self, instant: DateTime<Utc>, pattern: &str) -> String {
        match self {
            Self::Named(tz) => instant.with_timezone(tz).format(pattern).to_string(),
            Self::Fixed(offset) => instant.with_timezone(offset).format(pattern).to_string(),
        }
    }

    /// `None` when the milliseconds fall outside chrono's representable range.
    pub fn format_millis(&self, millis: i64, pattern: &str) -> Option<String> {
        DateTime::<Utc>::from_timestamp_millis(millis).map(|instant| self.format(instant, pattern))
    }

    pub fn now(&self, pattern: &str) -> String {
        self.format(Utc::now(), pattern)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PATTERN: &str = "%Y-%m-%d %H:%M:%S";

    #[test]
    fn iana_names_and_offsets_parse() {
        assert_eq!(
            Zone::parse("Europe/Moscow").unwrap(),
            Zone::Named(chrono_tz::Europe::Moscow)
        );
        assert_eq!(Zone::parse(" utc ").unwrap(), Zone::Named(Tz::UTC));
        assert_eq!(
            Zone::parse("-05:30").unwrap(),
            Zone::Fixed(FixedOffset::west_opt(19_800).unwrap())
        );
        assert!(Zone::parse("Mars/Olympus_Mons").is_err());
        assert!(Zone::parse("").is_err());
    }

    #[test]
    fn named_zone_follows_daylight_saving() {
        let berlin = Zone::parse("Europe/Berlin").unwrap();
        let winter = "2023-01-15T12:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let summer = "2023-07-15T12:00:00Z".parse::<DateTime<Utc>>().unwrap();
        assert_eq!(berlin.format(winter, PATTERN), "2023-01-15 13:00:00");
        assert_eq!(berlin.format(summer, PATTERN), "2023-07-15 14:00:00");
    }

    #[test]
    fn millis_render_in_zone() {
        let moscow = Zone::parse("Europe/Moscow").unwrap();
        assert_eq!(
            moscow.format_millis(1_700_000_000_000, PATTERN).as_deref(),
            Some("2023-11-15 01:13:20")
        );
        let fixed = Zone::parse("+00:00").unwrap();
        assert_eq!(
            fixed.format_millis(1_700_000_000_000, PATTERN).as_deref(),
            Some("2023-11-14 22:13:20")
        );
        assert_eq!(moscow.format_millis(i64::MAX, PATTERN), None);
    }
}
