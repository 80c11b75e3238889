//! Custom date patterns
//!
//! Renders instants through moment-style token patterns such as
//! `YYYY-MM-DD HH:mm:ss`. Patterns are compiled once into a list of items
//! and rejected up front when they contain letters that are not tokens.
//!
//! # Tokens
//!
//! ```text
//! YYYY YY            year
//! Q                  quarter
//! MMMM MMM MM M      month (name, short name, padded, number)
//! DDDD DDD           day of year (padded, number)
//! DD Do D            day of month (padded, ordinal, number)
//! dddd ddd dd d      weekday (name, short, two letters, 0 = Sunday)
//! E                  ISO weekday (1 = Monday)
//! HH H hh h kk k     hour (24h, 12h, 1-24)
//! mm m ss s          minute, second
//! SSS SS S           fractional second
//! A a                AM/PM, am/pm
//! ZZ Z               offset (+0100, +01:00)
//! X x                epoch seconds, epoch milliseconds
//! [text]             literal text
//! ```
//!
//! Any other non-alphabetic character is copied literally.

use chrono::{DateTime, Datelike, FixedOffset, Local, Offset, Timelike, Utc};

use crate::query::error::{QueryError, QueryResult};

/// Tokens ordered so that longer forms are tried first
const TOKENS: &[(&str, DateToken)] = &[
    ("YYYY", DateToken::Year),
    ("YY", DateToken::YearShort),
    ("Q", DateToken::Quarter),
    ("MMMM", DateToken::MonthName),
    ("MMM", DateToken::MonthShort),
    ("MM", DateToken::MonthPadded),
    ("M", DateToken::Month),
    ("DDDD", DateToken::DayOfYearPadded),
    ("DDD", DateToken::DayOfYear),
    ("DD", DateToken::DayPadded),
    ("Do", DateToken::DayOrdinal),
    ("D", DateToken::Day),
    ("dddd", DateToken::WeekdayName),
    ("ddd", DateToken::WeekdayShort),
    ("dd", DateToken::WeekdayMin),
    ("d", DateToken::Weekday),
    ("E", DateToken::IsoWeekday),
    ("HH", DateToken::Hour24Padded),
    ("H", DateToken::Hour24),
    ("hh", DateToken::Hour12Padded),
    ("h", DateToken::Hour12),
    ("kk", DateToken::HourFromOnePadded),
    ("k", DateToken::HourFromOne),
    ("mm", DateToken::MinutePadded),
    ("m", DateToken::Minute),
    ("ss", DateToken::SecondPadded),
    ("s", DateToken::Second),
    ("SSS", DateToken::Millis),
    ("SS", DateToken::Centis),
    ("S", DateToken::Decis),
    ("A", DateToken::MeridiemUpper),
    ("a", DateToken::MeridiemLower),
    ("ZZ", DateToken::OffsetCompact),
    ("Z", DateToken::Offset),
    ("X", DateToken::EpochSeconds),
    ("x", DateToken::EpochMillis),
];

const MONTHS: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

const WEEKDAYS: [&str; 7] = [
    "Sunday",
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DateToken {
    Year,
    YearShort,
    Quarter,
    MonthName,
    MonthShort,
    MonthPadded,
    Month,
    DayOfYearPadded,
    DayOfYear,
    DayPadded,
    DayOrdinal,
    Day,
    WeekdayName,
    WeekdayShort,
    WeekdayMin,
    Weekday,
    IsoWeekday,
    Hour24Padded,
    Hour24,
    Hour12Padded,
    Hour12,
    HourFromOnePadded,
    HourFromOne,
    MinutePadded,
    Minute,
    SecondPadded,
    Second,
    Millis,
    Centis,
    Decis,
    MeridiemUpper,
    MeridiemLower,
    OffsetCompact,
    Offset,
    EpochSeconds,
    EpochMillis,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum FormatItem {
    Token(DateToken),
    Literal(String),
}

/// A compiled custom date pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatePattern {
    items: Vec<FormatItem>,
}

impl DatePattern {
    /// Compile a pattern, failing on letters that are not tokens or on a
    /// pattern without any token
    pub fn compile(pattern: &str) -> QueryResult<Self> {
        let unrecognized = || QueryError::UnrecognizedFormat {
            format: pattern.to_string(),
        };

        let mut items = Vec::new();
        let mut literal = String::new();
        let mut rest = pattern;

        while let Some(c) = rest.chars().next() {
            if c == '[' {
                let close = rest.find(']').ok_or_else(unrecognized)?;
                literal.push_str(&rest[1..close]);
                rest = &rest[close + 1..];
                continue;
            }

            if c.is_alphabetic() {
                let (text, token) = TOKENS
                    .iter()
                    .find(|(text, _)| rest.starts_with(text))
                    .ok_or_else(unrecognized)?;
                if !literal.is_empty() {
                    items.push(FormatItem::Literal(std::mem::take(&mut literal)));
                }
                items.push(FormatItem::Token(*token));
                rest = &rest[text.len()..];
                continue;
            }

            literal.push(c);
            rest = &rest[c.len_utf8()..];
        }

        if !literal.is_empty() {
            items.push(FormatItem::Literal(literal));
        }

        if !items.iter().any(|i| matches!(i, FormatItem::Token(_))) {
            return Err(unrecognized());
        }

        Ok(Self { items })
    }

    /// Render an instant already shifted into its display zone
    pub fn render(&self, dt: &DateTime<FixedOffset>) -> String {
        let mut out = String::new();
        for item in &self.items {
            match item {
                FormatItem::Literal(text) => out.push_str(text),
                FormatItem::Token(token) => render_token(&mut out, *token, dt),
            }
        }
        out
    }
}

fn render_token(out: &mut String, token: DateToken, dt: &DateTime<FixedOffset>) {
    use std::fmt::Write;

    let month = dt.month0() as usize;
    let weekday = dt.weekday().num_days_from_sunday() as usize;
    let (pm, hour12) = dt.hour12();

    // Writing into a String cannot fail
    let _ = match token {
        DateToken::Year => write!(out, "{:04}", dt.year()),
        DateToken::YearShort => write!(out, "{:02}", dt.year().rem_euclid(100)),
        DateToken::Quarter => write!(out, "{}", dt.month0() / 3 + 1),
        DateToken::MonthName => write!(out, "{}", MONTHS[month]),
        DateToken::MonthShort => write!(out, "{}", &MONTHS[month][..3]),
        DateToken::MonthPadded => write!(out, "{:02}", dt.month()),
        DateToken::Month => write!(out, "{}", dt.month()),
        DateToken::DayOfYearPadded => write!(out, "{:03}", dt.ordinal()),
        DateToken::DayOfYear => write!(out, "{}", dt.ordinal()),
        DateToken::DayPadded => write!(out, "{:02}", dt.day()),
        DateToken::DayOrdinal => write!(out, "{}{}", dt.day(), ordinal_suffix(dt.day())),
        DateToken::Day => write!(out, "{}", dt.day()),
        DateToken::WeekdayName => write!(out, "{}", WEEKDAYS[weekday]),
        DateToken::WeekdayShort => write!(out, "{}", &WEEKDAYS[weekday][..3]),
        DateToken::WeekdayMin => write!(out, "{}", &WEEKDAYS[weekday][..2]),
        DateToken::Weekday => write!(out, "{}", weekday),
        DateToken::IsoWeekday => write!(out, "{}", dt.weekday().number_from_monday()),
        DateToken::Hour24Padded => write!(out, "{:02}", dt.hour()),
        DateToken::Hour24 => write!(out, "{}", dt.hour()),
        DateToken::Hour12Padded => write!(out, "{:02}", hour12),
        DateToken::Hour12 => write!(out, "{}", hour12),
        DateToken::HourFromOnePadded => write!(out, "{:02}", hour_from_one(dt.hour())),
        DateToken::HourFromOne => write!(out, "{}", hour_from_one(dt.hour())),
        DateToken::MinutePadded => write!(out, "{:02}", dt.minute()),
        DateToken::Minute => write!(out, "{}", dt.minute()),
        DateToken::SecondPadded => write!(out, "{:02}", dt.second()),
        DateToken::Second => write!(out, "{}", dt.second()),
        DateToken::Millis => write!(out, "{:03}", dt.timestamp_subsec_millis()),
        DateToken::Centis => write!(out, "{:02}", dt.timestamp_subsec_millis() / 10),
        DateToken::Decis => write!(out, "{}", dt.timestamp_subsec_millis() / 100),
        DateToken::MeridiemUpper => write!(out, "{}", if pm { "PM" } else { "AM" }),
        DateToken::MeridiemLower => write!(out, "{}", if pm { "pm" } else { "am" }),
        DateToken::OffsetCompact => write_offset(out, dt, ""),
        DateToken::Offset => write_offset(out, dt, ":"),
        DateToken::EpochSeconds => write!(out, "{}", dt.timestamp()),
        DateToken::EpochMillis => write!(out, "{}", dt.timestamp_millis()),
    };
}

fn write_offset(
    out: &mut String,
    dt: &DateTime<FixedOffset>,
    separator: &str,
) -> std::fmt::Result {
    use std::fmt::Write;

    let seconds = dt.offset().local_minus_utc();
    let sign = if seconds < 0 { '-' } else { '+' };
    let minutes = seconds.abs() / 60;
    write!(out, "{}{:02}{}{:02}", sign, minutes / 60, separator, minutes % 60)
}

fn hour_from_one(hour: u32) -> u32 {
    if hour == 0 {
        24
    } else {
        hour
    }
}

fn ordinal_suffix(day: u32) -> &'static str {
    match (day % 10, day % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    }
}

/// Time zone custom patterns are rendered in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisplayZone {
    /// The process's local time zone
    #[default]
    Local,
    /// A fixed UTC offset
    Fixed(FixedOffset),
}

impl DisplayZone {
    /// Parse `local`, `utc`/`Z`, or an offset like `+02:00`, `-0530`
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("local") {
            return Some(Self::Local);
        }
        if s.eq_ignore_ascii_case("utc") || s == "Z" {
            return FixedOffset::east_opt(0).map(Self::Fixed);
        }

        let (sign, digits) = match s.chars().next()? {
            '+' => (1, &s[1..]),
            '-' => (-1, &s[1..]),
            _ => return None,
        };
        let digits: String = digits.chars().filter(|c| *c != ':').collect();
        if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        let hours: i32 = digits[..2].parse().ok()?;
        let minutes: i32 = digits[2..].parse().ok()?;
        if minutes >= 60 {
            return None;
        }
        FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).map(Self::Fixed)
    }

    /// Shift an instant into this zone
    pub fn localize(&self, instant: &DateTime<Utc>) -> DateTime<FixedOffset> {
        match self {
            Self::Local => {
                let local = instant.with_timezone(&Local);
                local.with_timezone(&local.offset().fix())
            }
            Self::Fixed(offset) => instant.with_timezone(offset),
        }
    }
}
