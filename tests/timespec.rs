// Time expression parsing and formatting

use atwg_rs::scheduler::{
    TimeSpec, TimeSpecError, format_seconds, gradient_to_time, parse_seconds,
};

#[test]
fn test_time_to_sec() {
    assert_eq!(TimeSpec::parse(None), Err(TimeSpecError::MissingTime));
    assert_eq!(TimeSpec::parse(None).unwrap_err().to_string(), "No time string provided");
    assert_eq!(TimeSpec::from_secs(60.0).unwrap().as_secs(), 60.0);
    assert_eq!(parse_seconds("145").unwrap(), 145.0);
    // positional d:h:m:s
    assert_eq!(parse_seconds("::30").unwrap(), 30.0);
    assert_eq!(parse_seconds("02:30").unwrap(), 150.0);
    assert_eq!(parse_seconds("01:02:30").unwrap(), 3750.0);
    assert_eq!(parse_seconds("1.5:::").unwrap(), 129600.0);
    // unit tokens
    assert_eq!(parse_seconds("2day 2h").unwrap(), 180000.0);
    assert_eq!(parse_seconds("1.5day 2.5h").unwrap(), 138600.0);
    // unit without magnitude
    assert_eq!(parse_seconds("h").unwrap(), 3600.0);
    assert_eq!(parse_seconds("min").unwrap(), 60.0);
    assert_eq!(parse_seconds("sec").unwrap(), 1.0);
}

#[test]
fn test_sec_to_time() {
    assert!(matches!(format_seconds(-25.0, None), Err(TimeSpecError::Negative(_))));
    assert_eq!(format_seconds(129631.0, None).unwrap(), "1d 12h 31s");
    assert_eq!(format_seconds(29.0, None).unwrap(), "29s");
    assert_eq!(format_seconds(0.0, None).unwrap(), "0");
    assert_eq!(format_seconds(61.0, None).unwrap(), "1m 1s");
    assert_eq!(format_seconds(61.5, None).unwrap(), "1m 1.5s");
    assert_eq!(format_seconds(129731.0, Some(":")).unwrap(), "1:12:2:11");
}

#[test]
fn test_colon_format_parses_back() {
    for secs in [1u32, 59, 60, 3599, 3600, 86399, 86400, 129731, 1_000_000] {
        let text = format_seconds(secs as f64, Some(":")).unwrap();
        assert_eq!(parse_seconds(&text).unwrap(), secs as f64, "{}", text);
    }
}

#[test]
fn test_parse_is_pure() {
    let first = parse_seconds("1.5day 2.5h").unwrap();
    let _ = parse_seconds("garbage");
    assert_eq!(parse_seconds("1.5day 2.5h").unwrap(), first);
}

#[test]
fn test_temp_grad_to_time() {
    assert_eq!(gradient_to_time(None, None), Err(TimeSpecError::MissingGradient));
    assert_eq!(
        gradient_to_time(None, None).unwrap_err().to_string(),
        "No temperature gradient given"
    );
    assert_eq!(gradient_to_time(Some("5sec"), None).unwrap(), 5.0);
    assert_eq!(gradient_to_time(Some("5sec"), Some(4.0)).unwrap(), 20.0);
}

#[test]
fn test_timespec_display() {
    let t: TimeSpec = "1.5day 2.5h".parse().unwrap();
    assert_eq!(t.to_string(), "1d 14h 30m");
}
