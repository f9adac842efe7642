use chrono::{DateTime, FixedOffset, Offset, Utc};

const HOUR_SECS: i32 = 3600;

/// Fixed-offset zones accepted for usage timestamps. DST is never applied.
const TIMEZONE_ALIASES: &[(&str, i32)] = &[
    ("JST", 9),
    ("Taiwan", 8),
    ("ET", -5),
    ("CT", -6),
    ("MT", -7),
    ("PT", -8),
    ("UTC", 0),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageTimezone {
    offset_hours: i32,
}

impl UsageTimezone {
    pub const UTC: Self = Self { offset_hours: 0 };

    pub fn from_alias(alias: &str) -> Self {
        TIMEZONE_ALIASES
            .iter()
            .find(|(name, _)| *name == alias)
            .map(|(_, offset_hours)| Self {
                offset_hours: *offset_hours,
            })
            .unwrap_or(Self::UTC)
    }

    pub fn offset_hours(&self) -> i32 {
        self.offset_hours
    }

    fn offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.offset_hours * HOUR_SECS)
            .unwrap_or_else(|| Utc.fix())
    }

    fn suffix(&self) -> String {
        if self.offset_hours == 0 {
            return "Z".to_string();
        }
        let sign = if self.offset_hours < 0 { '-' } else { '+' };
        format!("{}{:02}:00", sign, self.offset_hours.abs())
    }

    pub fn format(&self, instant: DateTime<Utc>) -> String {
        let local = instant.with_timezone(&self.offset());
        format!("{}{}", local.format("%Y-%m-%dT%H:%M:%S"), self.suffix())
    }

    pub fn now(&self) -> String {
        self.format(Utc::now())
    }
}

impl Default for UsageTimezone {
    fn default() -> Self {
        Self::UTC
    }
}
