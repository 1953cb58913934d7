use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, Offset, Utc};

use crate::config::Units;

use super::models::{Alert, CurrentWeather, ForecastEntry};

/// Rain chance above which a forecast line mentions it, in percent.
const RAIN_MENTION_THRESHOLD: f64 = 20.0;

/// Offsets outside ±24h are not representable and fall back to UTC.
pub fn offset_from_seconds(seconds: i32) -> FixedOffset {
    FixedOffset::east_opt(seconds).unwrap_or_else(|| Utc.fix())
}

fn local(timestamp: i64, offset: FixedOffset) -> Option<DateTime<FixedOffset>> {
    DateTime::from_timestamp(timestamp, 0).map(|utc| utc.with_timezone(&offset))
}

/// Upper-cases the first character and lower-cases the rest.
pub fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

pub fn current_report(city: &str, data: &CurrentWeather, units: Units) -> String {
    format!(
        "The weather in {city} is {} with a temperature of {}{}. Humidity: {}%, Wind Speed: {} {}",
        data.description(),
        data.main.temp,
        units.temperature_symbol(),
        data.main.humidity,
        data.wind.speed,
        units.speed_unit(),
    )
}

/// One calendar day of forecast lines, each keyed by its local time.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastDay {
    pub date: NaiveDate,
    pub entries: Vec<(NaiveTime, String)>,
}

/// Groups entries by local calendar date. Days come out chronologically and
/// each day's entries by time of day, whatever order the provider used.
pub fn group_forecast(entries: &[ForecastEntry], offset: FixedOffset, units: Units) -> Vec<ForecastDay> {
    let mut by_day: BTreeMap<NaiveDate, Vec<(NaiveTime, String)>> = BTreeMap::new();

    for entry in entries {
        let Some(at) = local(entry.dt, offset) else {
            continue;
        };
        let time = at.time();
        let rain = entry.pop * 100.0;
        let mut line = format!(
            "  • {}: {}, {:.1}{}",
            time.format("%H:%M"),
            capitalize(entry.description()),
            entry.main.temp,
            units.temperature_symbol(),
        );
        if rain > RAIN_MENTION_THRESHOLD {
            line.push_str(&format!(", {rain:.0}% chance of rain"));
        }
        by_day.entry(at.date_naive()).or_default().push((time, line));
    }

    by_day
        .into_iter()
        .map(|(date, mut entries)| {
            entries.sort_by_key(|(time, _)| *time);
            ForecastDay { date, entries }
        })
        .collect()
}

pub fn forecast_report(city: &str, days: &[ForecastDay]) -> String {
    let mut parts = vec![format!("Weather Forecast for {city}:")];
    for day in days {
        parts.push(format!(
            "\n{} ({}):",
            day.date.format("%A"),
            day.date.format("%Y-%m-%d")
        ));
        parts.extend(day.entries.iter().map(|(_, line)| line.clone()));
    }
    parts.join("\n")
}

pub fn alerts_report(city: &str, alerts: &[Alert], offset: FixedOffset) -> String {
    if alerts.is_empty() {
        return format!("No active weather alerts for {city}.");
    }

    let stamp = |ts: i64| {
        local(ts, offset)
            .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| ts.to_string())
    };
    let blocks: Vec<String> = alerts
        .iter()
        .map(|alert| {
            format!(
                "Alert: {}\nFrom: {} to {}\nDescription: {}\n",
                alert.event,
                stamp(alert.start),
                stamp(alert.end),
                alert.description
            )
        })
        .collect();

    format!("Weather alerts for {city}:\n{}", blocks.join("\n"))
}

pub fn local_time_report(city: &str, now: DateTime<Utc>, offset: FixedOffset) -> String {
    format!(
        "The current time in {city} is {}",
        now.with_timezone(&offset).format("%Y-%m-%d %H:%M:%S UTC%:z")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::weather::models::{Condition, ForecastReadings};
    use chrono::TimeZone;

    fn entry(dt: i64, temp: f64, description: &str, pop: f64) -> ForecastEntry {
        ForecastEntry {
            dt,
            main: ForecastReadings { temp },
            weather: vec![Condition {
                description: description.into(),
            }],
            pop,
        }
    }

    fn ts(y: i32, m: u32, d: u32, h: u32, min: u32) -> i64 {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap().timestamp()
    }

    #[test]
    fn capitalize_matches_sentence_case() {
        assert_eq!(capitalize("light RAIN"), "Light rain");
        assert_eq!(capitalize(""), "");
        assert_eq!(capitalize("éclair"), "Éclair");
    }

    #[test]
    fn forecast_days_and_times_are_ordered() {
        let utc = offset_from_seconds(0);
        let entries = vec![
            entry(ts(2025, 3, 2, 9, 0), 11.0, "rain", 0.9),
            entry(ts(2025, 3, 1, 21, 0), 8.26, "clear sky", 0.0),
            entry(ts(2025, 3, 1, 3, 0), 5.0, "few clouds", 0.1),
            entry(ts(2025, 3, 2, 0, 0), 7.0, "mist", 0.25),
        ];

        let days = group_forecast(&entries, utc, Units::Metric);
        let dates: Vec<String> = days.iter().map(|d| d.date.to_string()).collect();
        assert_eq!(dates, vec!["2025-03-01", "2025-03-02"]);

        let first: Vec<String> = days[0].entries.iter().map(|(t, _)| t.format("%H:%M").to_string()).collect();
        assert_eq!(first, vec!["03:00", "21:00"]);
        let second: Vec<String> = days[1].entries.iter().map(|(t, _)| t.format("%H:%M").to_string()).collect();
        assert_eq!(second, vec!["00:00", "09:00"]);

        assert_eq!(days[0].entries[1].1, "  • 21:00: Clear sky, 8.3°C");
        assert_eq!(days[1].entries[0].1, "  • 00:00: Mist, 7.0°C, 25% chance of rain");
        assert_eq!(days[1].entries[1].1, "  • 09:00: Rain, 11.0°C, 90% chance of rain");
    }

    #[test]
    fn forecast_dates_follow_city_offset() {
        // 23:00 UTC is already the next day in UTC+2
        let entries = vec![entry(ts(2025, 3, 1, 23, 0), 3.0, "snow", 0.0)];
        let days = group_forecast(&entries, offset_from_seconds(7200), Units::Metric);
        assert_eq!(days[0].date.to_string(), "2025-03-02");
        assert_eq!(days[0].entries[0].1, "  • 01:00: Snow, 3.0°C");
    }

    #[test]
    fn forecast_report_layout() {
        let entries = vec![entry(ts(2025, 3, 1, 12, 0), 14.0, "overcast clouds", 0.0)];
        let days = group_forecast(&entries, offset_from_seconds(0), Units::Imperial);
        assert_eq!(
            forecast_report("Lyon", &days),
            "Weather Forecast for Lyon:\n\nSaturday (2025-03-01):\n  • 12:00: Overcast clouds, 14.0°F"
        );
    }

    #[test]
    fn alerts_report_formats_each_alert() {
        let alerts = vec![Alert {
            event: "Wind warning".into(),
            start: ts(2025, 1, 5, 6, 0),
            end: ts(2025, 1, 5, 18, 30),
            description: "Gusts up to 90 km/h".into(),
        }];
        assert_eq!(
            alerts_report("Bergen", &alerts, offset_from_seconds(3600)),
            "Weather alerts for Bergen:\nAlert: Wind warning\nFrom: 2025-01-05 07:00 to 2025-01-05 19:30\nDescription: Gusts up to 90 km/h\n"
        );
        assert_eq!(
            alerts_report("Bergen", &[], offset_from_seconds(0)),
            "No active weather alerts for Bergen."
        );
    }

    #[test]
    fn local_time_uses_offset() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        assert_eq!(
            local_time_report("Tokyo", now, offset_from_seconds(32400)),
            "The current time in Tokyo is 2025-06-01 21:00:00 UTC+09:00"
        );
        assert_eq!(
            local_time_report("Caracas", now, offset_from_seconds(-14400)),
            "The current time in Caracas is 2025-06-01 08:00:00 UTC-04:00"
        );
    }

    #[test]
    fn out_of_range_offset_falls_back_to_utc() {
        assert_eq!(offset_from_seconds(200_000), offset_from_seconds(0));
    }
}
