use kube_runtime::controller::Action;
use std::collections::VecDeque;
use std::time::Duration;

const UNITS: [(char, u64); 3] = [('d', 86400), ('h', 3600), ('m', 60)];

/// How long to wait before looking at a test run that is still making progress.
pub(crate) const DEFAULT_REQUEUE: &str = "5s";

/// How long to wait before retrying a test run whose reconciliation failed.
pub(crate) const DEFAULT_ERROR_REQUEUE: &str = "30s";

/// Tell the controller to reconcile the object again after some duration.
pub(crate) fn requeue(after: Duration) -> Action {
    Action::requeue(after)
}

/// Do not requeue the object, it will be reconciled when it changes.
pub(crate) fn no_requeue() -> Action {
    Action::await_change()
}

/// Parse a duration string of the form `1d2h3m4s` into a Duration. Units are optional but must
/// appear in that order; a bare number is seconds.
pub(crate) fn parse_duration(input: &str) -> Option<Duration> {
    let mut secs: u64 = 0;
    let mut duration_string = input;
    for unit in UNITS {
        let mut vec: VecDeque<&str> = duration_string.split(unit.0).collect();
        if vec.len() > 1 {
            secs += vec.pop_front()?.parse::<u64>().ok()? * unit.1;
        }
        duration_string = vec.pop_front()?;
    }
    let mut vec: VecDeque<&str> = duration_string.split('s').collect();
    let seconds = vec.pop_front()?;
    if !seconds.is_empty() {
        secs += seconds.parse::<u64>().ok()?;
    }
    Some(Duration::from_secs(secs))
}

#[test]
fn all_units() {
    assert_eq!(parse_duration("1d2h3m4s"), Some(Duration::from_secs(93784)))
}

#[test]
fn some_units() {
    assert_eq!(parse_duration("1d3m4s"), Some(Duration::from_secs(86584)))
}

#[test]
fn only_seconds() {
    assert_eq!(parse_duration("500s"), Some(Duration::from_secs(500)))
}

#[test]
fn no_seconds() {
    assert_eq!(parse_duration("1h5m"), Some(Duration::from_secs(3900)))
}

#[test]
fn no_units() {
    assert_eq!(parse_duration("5123"), Some(Duration::from_secs(5123)))
}

#[test]
fn defaults_parse() {
    assert_eq!(parse_duration(DEFAULT_REQUEUE), Some(Duration::from_secs(5)));
    assert_eq!(
        parse_duration(DEFAULT_ERROR_REQUEUE),
        Some(Duration::from_secs(30))
    );
}

#[test]
fn wrong_order() {
    assert!(parse_duration("10d5m3h2s").is_none())
}

#[test]
fn invalid_unit() {
    assert!(parse_duration("5y40s").is_none())
}

#[test]
fn missing_value() {
    assert!(parse_duration("5hm4s").is_none())
}
