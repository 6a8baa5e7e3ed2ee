//! Decides which status the light should show at a given moment.

use chrono::{Datelike, NaiveDateTime, NaiveTime};

use crate::config::{Config, Rule, StatusLabel, parse_clock};

/// Status for `now`.
///
/// A manual override wins outright. Otherwise the rules are walked in order
/// and every enabled rule covering `now` replaces the result, so the last
/// matching rule decides; with no match the default state applies.
pub fn resolve(now: &NaiveDateTime, config: &Config) -> StatusLabel {
    if let Some(forced) = config.manual_override {
        return forced;
    }

    config
        .rules
        .iter()
        .rev()
        .find(|rule| rule.matches(now))
        .map_or(config.default_state, |rule| rule.status)
}

/// Whether `t` lies in the half-open range `[start, end)`.
///
/// `start > end` describes a range crossing midnight. `start == end` is an
/// empty range. A time that is not `HH:MM` never matches.
pub fn time_in_range(start: &str, end: &str, t: NaiveTime) -> bool {
    match (parse_clock(start), parse_clock(end)) {
        (Some(start), Some(end)) => contains(start, end, t),
        _ => false,
    }
}

fn contains(start: NaiveTime, end: NaiveTime, t: NaiveTime) -> bool {
    if start <= end {
        start <= t && t < end
    } else {
        t >= start || t < end
    }
}

impl Rule {
    /// Whether this rule is enabled and covers `now`.
    ///
    /// The day list is checked against the day `now` falls on, so the part
    /// of an overnight range after midnight belongs to the following day's
    /// entry.
    pub fn matches(&self, now: &NaiveDateTime) -> bool {
        if !self.enabled || !self.days.contains(&now.weekday()) {
            return false;
        }
        let Some((start, end)) = self.window() else {
            return false;
        };
        contains(start, end, now.time())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Weekday};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    const WEEKDAYS: [Weekday; 5] = [
        Weekday::Mon,
        Weekday::Tue,
        Weekday::Wed,
        Weekday::Thu,
        Weekday::Fri,
    ];

    // 2026-02-02 is a Monday.
    fn at(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 2, day)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    fn clock(hour: u32, minute: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, minute, 0).unwrap()
    }

    fn config(rules: Vec<Rule>) -> Config {
        Config {
            default_state: StatusLabel::Away,
            rules,
            ..Config::default()
        }
    }

    fn office_hours() -> Config {
        config(vec![
            Rule::new(WEEKDAYS, "09:00", "17:00", StatusLabel::Focused),
            Rule::new(WEEKDAYS, "11:00", "12:00", StatusLabel::Open),
        ])
    }

    #[test]
    fn morning_is_focused() {
        assert_eq!(resolve(&at(2, 10, 30), &office_hours()), StatusLabel::Focused);
    }

    #[test]
    fn later_rule_wins_when_both_match() {
        assert_eq!(resolve(&at(2, 11, 30), &office_hours()), StatusLabel::Open);
    }

    #[test]
    fn default_applies_outside_rules() {
        assert_eq!(resolve(&at(2, 17, 0), &office_hours()), StatusLabel::Away);
        // Saturday
        assert_eq!(resolve(&at(7, 10, 30), &office_hours()), StatusLabel::Away);
    }

    #[test]
    fn override_beats_every_rule() {
        let mut config = office_hours();
        config.manual_override = Some(StatusLabel::Off);
        assert_eq!(resolve(&at(2, 11, 30), &config), StatusLabel::Off);
    }

    #[test]
    fn legacy_override_resolves_through_config() {
        let config =
            Config::from_document(serde_json::json!({ "manual_override": "red" })).unwrap();
        assert_eq!(resolve(&at(7, 3, 0), &config), StatusLabel::Focused);
    }

    #[test]
    fn legacy_override_beats_a_matching_rule() {
        let config = Config::from_document(serde_json::json!({
            "manual_override": "red",
            "default_state": "away",
            "rules": [{ "days": ["Mon"], "start": "09:00", "end": "17:00", "state": "open" }],
        }))
        .unwrap();
        assert_eq!(resolve(&at(2, 10, 30), &config), StatusLabel::Focused);
    }

    #[test]
    fn after_midnight_part_follows_the_listed_day() {
        let config = config(vec![Rule::new(
            [Weekday::Mon],
            "22:00",
            "02:00",
            StatusLabel::Off,
        )]);
        assert_eq!(resolve(&at(2, 1, 0), &config), StatusLabel::Off);
        assert_eq!(resolve(&at(2, 23, 0), &config), StatusLabel::Off);
        assert_eq!(resolve(&at(3, 1, 0), &config), StatusLabel::Away);
    }

    #[test]
    fn disabled_rules_are_ignored() {
        let mut rule = Rule::new(WEEKDAYS, "09:00", "17:00", StatusLabel::Focused);
        rule.enabled = false;
        assert_eq!(resolve(&at(2, 10, 0), &config(vec![rule])), StatusLabel::Away);
    }

    #[test]
    fn overnight_range_wraps_midnight() {
        assert!(time_in_range("22:00", "02:00", clock(23, 0)));
        assert!(time_in_range("22:00", "02:00", clock(1, 0)));
        assert!(!time_in_range("22:00", "02:00", clock(3, 0)));
        assert!(!time_in_range("22:00", "02:00", clock(2, 0)));
        assert!(time_in_range("22:00", "02:00", clock(22, 0)));
    }

    #[test]
    fn ranges_are_half_open() {
        assert!(time_in_range("09:00", "17:00", clock(9, 0)));
        assert!(!time_in_range("09:00", "17:00", clock(17, 0)));
    }

    #[test]
    fn malformed_times_never_match() {
        assert!(!time_in_range("9am", "17:00", clock(10, 0)));
        assert!(!time_in_range("09:00", "25:00", clock(10, 0)));

        let broken = Rule::new(WEEKDAYS, "09:00", "later", StatusLabel::Focused);
        assert!(!broken.matches(&at(2, 10, 0)));
    }

    #[test]
    fn last_second_before_end_still_matches() {
        let rule = Rule::new(WEEKDAYS, "09:00", "17:00", StatusLabel::Focused);
        let now = NaiveDate::from_ymd_opt(2026, 2, 2)
            .unwrap()
            .and_hms_milli_opt(16, 59, 59, 999)
            .unwrap();
        assert!(rule.matches(&now));
    }

    #[test]
    fn overnight_rule_uses_the_calendar_day() {
        let rule = Rule::new([Weekday::Fri], "22:00", "02:00", StatusLabel::Off);
        // Friday 23:00 matches, Saturday 01:00 does not list Sat.
        assert!(rule.matches(&at(6, 23, 0)));
        assert!(!rule.matches(&at(7, 1, 0)));
    }

    #[test]
    fn empty_rule_list_gives_default() {
        assert_eq!(resolve(&at(2, 10, 0), &config(vec![])), StatusLabel::Away);
    }

    fn any_time() -> impl Strategy<Value = NaiveTime> {
        (0u32..24, 0u32..60).prop_map(|(h, m)| clock(h, m))
    }

    proptest! {
        #[test]
        fn equal_bounds_match_nothing(bound in any_time(), t in any_time()) {
            let raw = bound.format("%H:%M").to_string();
            prop_assert!(!time_in_range(&raw, &raw, t));
        }

        #[test]
        fn range_and_its_complement_partition_the_day(
            start in any_time(),
            end in any_time(),
            t in any_time(),
        ) {
            prop_assume!(start != end);
            let (s, e) = (start.format("%H:%M").to_string(), end.format("%H:%M").to_string());
            prop_assert_ne!(time_in_range(&s, &e, t), time_in_range(&e, &s, t));
        }

        #[test]
        fn override_always_wins(
            label in prop::sample::select(StatusLabel::ALL.to_vec()),
            hour in 0u32..24,
            day in 2u32..9,
        ) {
            let mut config = office_hours();
            config.manual_override = Some(label);
            prop_assert_eq!(resolve(&at(day, hour, 15), &config), label);
        }
    }
}
