use std::io::BufReader;

use ical::parser::ical::{IcalParser, component::IcalEvent};

use super::*;
use crate::NormalizedMoment;

fn event(title: &str, month: u32, day: u32, hour: u32, minute: u32) -> PrayerEvent {
    PrayerEvent {
        title: title.to_string(),
        moment: NormalizedMoment {
            year: 2025,
            month,
            day,
            hour,
            minute,
        },
        description: format!("{} prayer time for Cairo, Egypt", title),
    }
}

fn parse(content: &str) -> Vec<IcalEvent> {
    let mut parser = IcalParser::new(BufReader::new(content.as_bytes()));
    let calendar = parser
        .next()
        .expect("missing calendar")
        .expect("calendar failed to parse");
    assert!(parser.next().is_none());
    calendar.events
}

fn property<'a>(event: &'a IcalEvent, name: &str) -> Option<&'a str> {
    event
        .properties
        .iter()
        .find(|p| p.name == name)
        .and_then(|p| p.value.as_deref())
}

#[test]
fn test_empty_calendar_is_well_formed() {
    let generator = IcsGenerator::default();
    let ics_content = generator.generate(&[]).expect("生成ICS失败");

    assert!(ics_content.starts_with("BEGIN:VCALENDAR\r\n"));
    assert!(ics_content.ends_with("END:VCALENDAR\r\n"));
    assert!(!ics_content.contains("BEGIN:VEVENT"));
    assert!(parse(&ics_content).is_empty());
}

#[test]
fn test_round_trip_matches_titles_and_start_times() {
    let events = vec![
        event("Fajr", 2, 28, 5, 12),
        event("Dhuhr", 2, 28, 11, 58),
        event("Isha", 3, 1, 19, 3),
    ];

    let generator = IcsGenerator::default();
    let ics_content = generator.generate(&events).expect("生成ICS失败");
    let parsed = parse(&ics_content);

    assert_eq!(parsed.len(), events.len());
    for (ics_event, expected) in parsed.iter().zip(&events) {
        assert_eq!(property(ics_event, "SUMMARY"), Some(expected.title.as_str()));
        let start = expected
            .moment
            .to_naive_datetime()
            .unwrap()
            .format("%Y%m%dT%H%M%S")
            .to_string();
        assert_eq!(property(ics_event, "DTSTART"), Some(start.as_str()));
    }

    assert_eq!(property(&parsed[0], "DTEND"), Some("20250228T052700"));
    assert!(ics_content.contains("DESCRIPTION:Fajr prayer time for Cairo\\, Egypt\r\n"));
}

#[test]
fn test_invalid_time_is_a_build_failure() {
    let events = vec![event("Fajr", 1, 1, 5, 0), event("Dhuhr", 1, 1, 24, 30)];

    let result = IcsGenerator::default().generate(&events);
    match result {
        Err(Error::IcsGeneration(message)) => assert!(message.contains("Dhuhr")),
        other => panic!("expected IcsGeneration error, got {:?}", other.map(|s| s.len())),
    }
}

#[test]
fn test_duration_and_reminder_options() {
    let options = IcsOptions {
        calendar_name: Some("Prayer Times - Cairo 2025".to_string()),
        include_description: false,
        event_duration_minutes: 30,
        reminder_minutes: Some(10),
    };
    let generator = IcsGenerator::new(options);
    let ics_content = generator
        .generate(&[event("Asr", 6, 15, 16, 40)])
        .expect("生成ICS失败");

    assert!(ics_content.contains("X-WR-CALNAME:Prayer Times - Cairo 2025\r\n"));
    assert!(ics_content.contains("DTSTART:20250615T164000\r\n"));
    assert!(ics_content.contains("DTEND:20250615T171000\r\n"));
    assert!(!ics_content.contains("TZID"));
    assert!(ics_content.contains("TRIGGER:-PT10M\r\n"));
    assert!(!ics_content.contains("prayer time for"));
}

#[test]
fn test_long_lines_are_folded() {
    let mut long = event("Maghrib", 4, 10, 18, 20);
    long.description = "Maghrib prayer time for ".to_string() + &"Ш".repeat(80);

    let ics_content = IcsGenerator::default()
        .generate(&[long.clone()])
        .expect("生成ICS失败");

    for line in ics_content.split("\r\n") {
        assert!(line.len() <= MAX_LINE_OCTETS, "line too long: {}", line);
    }

    let parsed = parse(&ics_content);
    assert_eq!(property(&parsed[0], "DESCRIPTION"), Some(long.description.as_str()));
}

#[test]
fn test_escape_text() {
    assert_eq!(escape_text("a,b;c\\d\ne"), "a\\,b\\;c\\\\d\\ne");
}
