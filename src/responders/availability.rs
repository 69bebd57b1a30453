use chrono::{DateTime, Datelike, FixedOffset, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};

/// When a responder can be reached.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Availability {
    /// Reachable 24 hours a day.
    #[default]
    Always,
    /// Reachable between `start_hour` (inclusive) and `end_hour` (exclusive),
    /// local to `utc_offset_minutes`. A window with `start_hour > end_hour`
    /// wraps past midnight.
    BusinessHours {
        start_hour: u32,
        end_hour: u32,
        #[serde(default)]
        utc_offset_minutes: i32,
        #[serde(default)]
        weekdays_only: bool,
    },
}

impl Availability {
    pub fn is_available_at(&self, at: DateTime<Utc>) -> bool {
        match *self {
            Availability::Always => true,
            Availability::BusinessHours {
                start_hour,
                end_hour,
                utc_offset_minutes,
                weekdays_only,
            } => {
                let Some(offset) = FixedOffset::east_opt(utc_offset_minutes * 60) else {
                    return false;
                };
                let local = at.with_timezone(&offset);
                if weekdays_only && matches!(local.weekday(), Weekday::Sat | Weekday::Sun) {
                    return false;
                }
                let hour = local.hour();
                if start_hour == end_hour {
                    false
                } else if start_hour < end_hour {
                    hour >= start_hour && hour < end_hour
                } else {
                    hour >= start_hour || hour < end_hour
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn test_always() {
        assert!(Availability::Always.is_available_at(at(2026, 1, 4, 3)));
    }

    #[test]
    fn test_business_hours_with_offset() {
        // 09:00-17:00 at UTC-5
        let a = Availability::BusinessHours {
            start_hour: 9,
            end_hour: 17,
            utc_offset_minutes: -300,
            weekdays_only: true,
        };
        // Wednesday 2026-01-07 15:00 UTC = 10:00 local
        assert!(a.is_available_at(at(2026, 1, 7, 15)));
        // 23:00 UTC = 18:00 local
        assert!(!a.is_available_at(at(2026, 1, 7, 23)));
        // Saturday
        assert!(!a.is_available_at(at(2026, 1, 10, 15)));
    }

    #[test]
    fn test_overnight_window() {
        let a = Availability::BusinessHours {
            start_hour: 22,
            end_hour: 6,
            utc_offset_minutes: 0,
            weekdays_only: false,
        };
        assert!(a.is_available_at(at(2026, 1, 7, 23)));
        assert!(a.is_available_at(at(2026, 1, 7, 2)));
        assert!(!a.is_available_at(at(2026, 1, 7, 12)));
    }

    #[test]
    fn test_toml_shape() {
        let a: Availability = toml::from_str(
            "mode = \"business_hours\"\nstart_hour = 8\nend_hour = 20\nweekdays_only = true\n",
        )
        .unwrap();
        assert_eq!(
            a,
            Availability::BusinessHours {
                start_hour: 8,
                end_hour: 20,
                utc_offset_minutes: 0,
                weekdays_only: true
            }
        );
    }
}
