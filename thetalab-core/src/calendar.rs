//! Trading calendar for the regular cash session.
//!
//! Same-day expiries settle against the 16:00 close, so session boundaries
//! double as valuation anchors: time-to-expiry is measured to the settlement
//! timestamp of the bar's own date.

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Weekday};

/// Regular session open, exchange local time.
pub fn session_open() -> NaiveTime {
    NaiveTime::from_hms_opt(9, 30, 0).unwrap()
}

/// Regular session close and same-day settlement time.
pub fn session_close() -> NaiveTime {
    NaiveTime::from_hms_opt(16, 0, 0).unwrap()
}

/// Full-day holidays observed by the simulated exchange.
fn is_holiday(date: NaiveDate) -> bool {
    matches!(
        (date.month(), date.day()),
        (1, 1) | (7, 4) | (12, 25)
    )
}

/// Whether the exchange is open on `date` at all.
pub fn is_trading_day(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) && !is_holiday(date)
}

/// Whether `ts` falls inside the regular session (open inclusive, close
/// exclusive) on a trading day.
pub fn in_session(ts: NaiveDateTime) -> bool {
    is_trading_day(ts.date()) && ts.time() >= session_open() && ts.time() < session_close()
}

/// Settlement timestamp for contracts expiring on `expiry`.
pub fn settlement_ts(expiry: NaiveDate) -> NaiveDateTime {
    expiry.and_time(session_close())
}

/// Year fraction from `now` to settlement on `expiry`, floored at zero.
/// Uses calendar seconds over a 365-day year, which is what sub-day
/// expiries need; day-count conventions do not matter at this horizon.
pub fn year_fraction_to_settlement(now: NaiveDateTime, expiry: NaiveDate) -> f64 {
    const SECONDS_PER_YEAR: f64 = 365.0 * 24.0 * 3600.0;
    let secs = (settlement_ts(expiry) - now).num_seconds();
    (secs.max(0) as f64) / SECONDS_PER_YEAR
}

/// Trading days in `[start, end]`, inclusive on both ends.
pub fn trading_days(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let mut days = Vec::new();
    let mut d = start;
    while d <= end {
        if is_trading_day(d) {
            days.push(d);
        }
        match d.succ_opt() {
            Some(next) => d = next,
            None => break,
        }
    }
    days
}
