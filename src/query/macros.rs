//! Time Macro Expansion
//!
//! Replaces time-range macros embedded in aggregation text with literal
//! values. The expansion loop is driven by the [`MacroScanner`]; what a
//! macro body means is decided by the registered [`MacroHandler`]s, so new
//! macro kinds can be added without touching the loop.
//!
//! # Time Macro Syntax
//!
//! ```text
//! {{ __time_from:date }}              -> 2021-01-01T00:00:00.000Z
//! {{ __time_to:date:iso }}            -> 2021-01-01T00:00:00.000Z
//! {{ __time_from:date:toObjectId }}   -> 5fee66000000000000000000
//! {{ __time_to:date:seconds }}        -> 1609459200
//! {{ __time_from:date:milliseconds }} -> 1609459200000
//! {{ __time_to:date:YYYY-MM-DD }}     -> 2021-01-01
//! ```
//!
//! Text that looks like a macro but does not match any handler (for
//! example `{{ __time_from }}` without `:date`) is left as is.

use chrono::{DateTime, SecondsFormat, Utc};
use nom::{
    branch::alt,
    bytes::complete::{tag, take_while1},
    character::complete::char,
    combinator::{all_consuming, opt, value},
    sequence::preceded,
    IResult,
};
use std::sync::Arc;

use crate::model::TimeRange;
use crate::query::error::QueryResult;
use crate::query::format::{DatePattern, DisplayZone};
use crate::query::scanner::MacroScanner;

/// Everything a handler may need to render a macro
#[derive(Debug, Clone, Copy)]
pub struct MacroContext<'a> {
    pub range: &'a TimeRange,
    pub zone: DisplayZone,
}

/// A family of macros recognised inside `{{ ... }}`
pub trait MacroHandler: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Render a macro body
    ///
    /// Returns `Ok(None)` when the body is not one of this handler's macros.
    fn render(&self, body: &str, ctx: &MacroContext<'_>) -> QueryResult<Option<String>>;
}

/// Which end of the time range a macro refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeBound {
    From,
    To,
}

impl TimeBound {
    pub fn instant(&self, range: &TimeRange) -> DateTime<Utc> {
        match self {
            Self::From => range.from,
            Self::To => range.to,
        }
    }
}

/// One parsed time macro occurrence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroMatch {
    pub kind: TimeBound,
    /// Text after `:date:`, if any
    pub format: Option<String>,
}

impl MacroMatch {
    /// Parse a macro body such as `__time_to:date:seconds`
    pub fn parse(body: &str) -> Option<Self> {
        all_consuming(time_macro)(body).ok().map(|(_, m)| m)
    }

    /// Resolve the output encoding for this occurrence
    pub fn encoding(&self) -> DateEncoding<'_> {
        match self.format.as_deref() {
            None | Some("iso") => DateEncoding::Iso,
            Some("toObjectId") => DateEncoding::ObjectId,
            Some("seconds") => DateEncoding::Seconds,
            Some("milliseconds") => DateEncoding::Milliseconds,
            Some(pattern) => DateEncoding::Custom(pattern),
        }
    }

    /// Render against a time range
    pub fn render(&self, range: &TimeRange, zone: DisplayZone) -> QueryResult<String> {
        self.encoding().render(&self.kind.instant(range), zone)
    }
}

/// Output encodings selected by the format specifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateEncoding<'a> {
    /// ISO-8601, millisecond precision, `Z` designator
    ///
    /// Years 0000 to 9999 render as plain RFC 3339. Years outside that range
    /// carry a sign (`+10000-01-01T...`) which RFC 3339 parsers reject.
    Iso,
    /// 24 hex digits: big-endian epoch seconds then zero padding
    ///
    /// Seconds outside the unsigned 32-bit range wrap modulo 2^32.
    ObjectId,
    Seconds,
    Milliseconds,
    /// A token pattern rendered in the display zone
    Custom(&'a str),
}

impl DateEncoding<'_> {
    pub fn render(&self, instant: &DateTime<Utc>, zone: DisplayZone) -> QueryResult<String> {
        match self {
            Self::Iso => Ok(instant.to_rfc3339_opts(SecondsFormat::Millis, true)),
            Self::ObjectId => Ok(object_id_prefix(instant)),
            Self::Seconds => Ok(instant.timestamp().to_string()),
            Self::Milliseconds => Ok(instant.timestamp_millis().to_string()),
            Self::Custom(pattern) => {
                Ok(DatePattern::compile(pattern)?.render(&zone.localize(instant)))
            }
        }
    }
}

/// Identifier whose timestamp component is the instant and whose remaining
/// eight bytes are zero
fn object_id_prefix(instant: &DateTime<Utc>) -> String {
    let seconds = instant.timestamp();
    let prefix = u32::try_from(seconds).unwrap_or_else(|_| {
        tracing::warn!(seconds, "time outside the object identifier range, wrapping");
        seconds.rem_euclid(1 << 32) as u32
    });
    format!("{:08x}{:016x}", prefix, 0u64)
}

/// Parse `__time_from|__time_to`, `:date`, optional `:format`
fn time_macro(input: &str) -> IResult<&str, MacroMatch> {
    let (input, kind) = alt((
        value(TimeBound::From, tag("__time_from")),
        value(TimeBound::To, tag("__time_to")),
    ))(input)?;
    let (input, _) = tag(":date")(input)?;
    let (input, format) = opt(preceded(char(':'), take_while1(|_| true)))(input)?;

    Ok((
        input,
        MacroMatch {
            kind,
            format: format.map(str::to_string),
        },
    ))
}

/// Handler for `__time_from` / `__time_to` date macros
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeMacro;

impl MacroHandler for TimeMacro {
    fn name(&self) -> &'static str {
        "time"
    }

    fn render(&self, body: &str, ctx: &MacroContext<'_>) -> QueryResult<Option<String>> {
        match MacroMatch::parse(body) {
            Some(m) => m.render(ctx.range, ctx.zone).map(Some),
            None => Ok(None),
        }
    }
}

/// Rewrites every recognised macro in a text
#[derive(Clone)]
pub struct TimeMacroExpander {
    handlers: Vec<Arc<dyn MacroHandler>>,
    zone: DisplayZone,
}

impl Default for TimeMacroExpander {
    fn default() -> Self {
        Self::new(DisplayZone::default())
    }
}

impl std::fmt::Debug for TimeMacroExpander {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeMacroExpander")
            .field(
                "handlers",
                &self.handlers.iter().map(|h| h.name()).collect::<Vec<_>>(),
            )
            .field("zone", &self.zone)
            .finish()
    }
}

impl TimeMacroExpander {
    /// Create an expander with the time macro handler installed
    pub fn new(zone: DisplayZone) -> Self {
        Self {
            handlers: vec![Arc::new(TimeMacro)],
            zone,
        }
    }

    /// Register an additional handler, tried after the existing ones
    pub fn with_handler(mut self, handler: impl MacroHandler + 'static) -> Self {
        self.handlers.push(Arc::new(handler));
        self
    }

    pub fn zone(&self) -> DisplayZone {
        self.zone
    }

    /// Expand all macros in `text` against `range`
    ///
    /// Fails only when a recognised macro names a custom format that is not
    /// a valid date pattern (or an added handler reports an error).
    pub fn expand(&self, text: &str, range: &TimeRange) -> QueryResult<String> {
        let ctx = MacroContext {
            range,
            zone: self.zone,
        };
        let mut scanner = MacroScanner::new(text);
        let mut out = String::with_capacity(text.len());
        let mut replaced = 0usize;

        while let Some(candidate) = scanner.next_candidate() {
            if let Some(rendered) = self.render(candidate.body, &ctx)? {
                out.push_str(scanner.accept(&candidate));
                out.push_str(&rendered);
                replaced += 1;
            }
        }
        out.push_str(scanner.remainder());

        tracing::trace!(replaced, "expanded macros");
        Ok(out)
    }

    /// List the time macros `expand` would replace, in order
    pub fn find_macros(text: &str) -> Vec<MacroMatch> {
        let mut scanner = MacroScanner::new(text);
        let mut found = Vec::new();

        while let Some(candidate) = scanner.next_candidate() {
            if let Some(m) = MacroMatch::parse(candidate.body) {
                scanner.accept(&candidate);
                found.push(m);
            }
        }

        found
    }

    fn render(&self, body: &str, ctx: &MacroContext<'_>) -> QueryResult<Option<String>> {
        for handler in &self.handlers {
            if let Some(rendered) = handler.render(body, ctx)? {
                return Ok(Some(rendered));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::error::QueryError;
    use chrono::{Duration, TimeZone};

    fn utc_expander() -> TimeMacroExpander {
        TimeMacroExpander::new(DisplayZone::parse("UTC").unwrap())
    }

    fn new_year_range() -> TimeRange {
        let from = Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap();
        TimeRange::new(from, from + Duration::days(1))
    }

    #[test]
    fn test_iso_default_and_keyword() {
        let expander = utc_expander();
        let range = new_year_range();

        assert_eq!(
            expander.expand("{{__time_from:date}}", &range).unwrap(),
            "2021-01-01T00:00:00.000Z"
        );
        assert_eq!(
            expander.expand("{{ __time_to:date:iso }}", &range).unwrap(),
            "2021-01-02T00:00:00.000Z"
        );
    }

    #[test]
    fn test_iso_round_trips_to_millisecond() {
        let expander = utc_expander();
        for millis in [0i64, 1, 999, 1_609_459_200_123, 4_102_444_799_999, -86_400_001] {
            let range = TimeRange::from_millis(millis, millis).unwrap();
            let text = expander.expand("{{__time_from:date}}", &range).unwrap();
            let parsed = DateTime::parse_from_rfc3339(&text).unwrap();
            assert_eq!(parsed.timestamp_millis(), millis, "round trip of {}", text);
        }
    }

    #[test]
    fn test_object_id() {
        let expander = utc_expander();
        let out = expander
            .expand("{{__time_from:date:toObjectId}}", &new_year_range())
            .unwrap();

        assert_eq!(out, "5fee66000000000000000000");
        assert_eq!(out.len(), 24);
    }

    #[test]
    fn test_iso_year_bounds() {
        let expander = utc_expander();

        let last =
            Utc.with_ymd_and_hms(9999, 12, 31, 23, 59, 59).unwrap() + Duration::milliseconds(999);
        let text = expander
            .expand("{{__time_to:date}}", &TimeRange::new(last, last))
            .unwrap();
        assert_eq!(text, "9999-12-31T23:59:59.999Z");
        assert_eq!(DateTime::parse_from_rfc3339(&text).unwrap(), last);

        let past = Utc.with_ymd_and_hms(10000, 1, 1, 0, 0, 0).unwrap();
        let text = expander
            .expand("{{__time_to:date}}", &TimeRange::new(past, past))
            .unwrap();
        assert_eq!(text, "+10000-01-01T00:00:00.000Z");
    }

    #[test]
    fn test_object_id_small_value_is_padded() {
        let range = TimeRange::from_millis(255_000, 255_000).unwrap();
        let out = utc_expander()
            .expand("{{__time_to:date:toObjectId}}", &range)
            .unwrap();
        assert_eq!(out, "000000ff0000000000000000");
    }

    #[test]
    fn test_object_id_outside_u32_wraps() {
        let expander = utc_expander();

        let range = TimeRange::from_millis(-1000, 0).unwrap();
        assert_eq!(
            expander
                .expand("{{__time_from:date:toObjectId}}", &range)
                .unwrap(),
            "ffffffff0000000000000000"
        );

        // 2106-02-07T06:28:16Z is 2^32 seconds
        let range = TimeRange::from_millis(4_294_967_296_000, 4_294_967_297_000).unwrap();
        assert_eq!(
            expander
                .expand(
                    "{{__time_from:date:toObjectId}} {{__time_to:date:toObjectId}}",
                    &range,
                )
                .unwrap(),
            "000000000000000000000000 000000010000000000000000"
        );
    }

    #[test]
    fn test_seconds_and_milliseconds() {
        let expander = utc_expander();
        let range = TimeRange::from_millis(1_609_459_200_999, 1_609_459_201_000).unwrap();

        assert_eq!(
            expander.expand("{{__time_from:date:seconds}}", &range).unwrap(),
            "1609459200"
        );
        assert_eq!(
            expander
                .expand("{{__time_from:date:milliseconds}}", &range)
                .unwrap(),
            "1609459200999"
        );
    }

    #[test]
    fn test_seconds_floor_before_epoch() {
        let range = TimeRange::from_millis(-1, 0).unwrap();
        assert_eq!(
            utc_expander()
                .expand("{{__time_from:date:seconds}}", &range)
                .unwrap(),
            "-1"
        );
    }

    #[test]
    fn test_custom_pattern() {
        let out = utc_expander()
            .expand("{{ __time_to:date:YYYY/MM/DD-HH:mm }}", &new_year_range())
            .unwrap();
        assert_eq!(out, "2021/01/02-00:00");
    }

    #[test]
    fn test_custom_pattern_uses_display_zone() {
        let expander = TimeMacroExpander::new(DisplayZone::parse("-05:00").unwrap());
        let out = expander
            .expand("{{__time_from:date:YYYY-MM-DD}}", &new_year_range())
            .unwrap();
        assert_eq!(out, "2020-12-31");
    }

    #[test]
    fn test_keywords_are_case_sensitive() {
        let err = utc_expander()
            .expand("{{__time_from:date:toobjectid}}", &new_year_range())
            .unwrap_err();
        assert!(matches!(err, QueryError::UnrecognizedFormat { .. }));

        let err = utc_expander()
            .expand("{{__time_from:date:ISO}}", &new_year_range())
            .unwrap_err();
        assert!(matches!(err, QueryError::UnrecognizedFormat { .. }));
    }

    #[test]
    fn test_aggregation_text_unchanged_outside_macro() {
        let out = utc_expander()
            .expand(
                r#"{"ts":{"$gte":"{{__time_from:date}}"}}"#,
                &new_year_range(),
            )
            .unwrap();
        assert_eq!(out, r#"{"ts":{"$gte":"2021-01-01T00:00:00.000Z"}}"#);
    }

    #[test]
    fn test_two_macros_any_order_and_spacing() {
        let expander = utc_expander();
        let range = new_year_range();

        let out = expander
            .expand(
                "[{{__time_to:date:seconds}}, {{   __time_from:date:seconds\t}}]",
                &range,
            )
            .unwrap();
        assert_eq!(out, "[1609545600, 1609459200]");

        let out = expander
            .expand("{{ __time_from:date:seconds }}..{{__time_to:date:seconds}}", &range)
            .unwrap();
        assert_eq!(out, "1609459200..1609545600");
    }

    #[test]
    fn test_malformed_macros_left_untouched() {
        let expander = utc_expander();
        let range = new_year_range();

        for text in [
            "{{ __time_from }}",
            "{{__time_to:dat}}",
            "{{__time_from:dates}}",
            "{{__time_from:date:}}",
            "{{ __time_from :date }}",
            "{{ __time_until:date }}",
            "{{ __time_from:date ",
            "{ __time_from:date }",
        ] {
            assert_eq!(expander.expand(text, &range).unwrap(), text);
        }
    }

    #[test]
    fn test_malformed_next_to_valid() {
        let out = utc_expander()
            .expand(
                "{{ __time_from }} {{ __time_to:date:seconds }}",
                &new_year_range(),
            )
            .unwrap();
        assert_eq!(out, "{{ __time_from }} 1609545600");
    }

    #[test]
    fn test_extra_opening_brace() {
        let out = utc_expander()
            .expand(r#"{{{__time_from:date:seconds}}}"#, &new_year_range())
            .unwrap();
        assert_eq!(out, "{1609459200}");
    }

    #[test]
    fn test_no_macros() {
        let text = r#"[{"$match":{"host":"a"}}]"#;
        assert_eq!(utc_expander().expand(text, &new_year_range()).unwrap(), text);
        assert_eq!(utc_expander().expand("", &new_year_range()).unwrap(), "");
    }

    #[test]
    fn test_find_macros() {
        let found = TimeMacroExpander::find_macros(
            "{{__time_from:date}} {{ nope }} {{ __time_to:date:seconds }}",
        );
        assert_eq!(
            found,
            vec![
                MacroMatch {
                    kind: TimeBound::From,
                    format: None
                },
                MacroMatch {
                    kind: TimeBound::To,
                    format: Some("seconds".to_string())
                },
            ]
        );
    }

    #[test]
    fn test_encoding_selection() {
        let m = MacroMatch::parse("__time_to:date:milliseconds").unwrap();
        assert_eq!(m.encoding(), DateEncoding::Milliseconds);

        let m = MacroMatch::parse("__time_to:date:HH:mm").unwrap();
        assert_eq!(m.encoding(), DateEncoding::Custom("HH:mm"));
    }

    struct RangeLength;

    impl MacroHandler for RangeLength {
        fn name(&self) -> &'static str {
            "range_length"
        }

        fn render(&self, body: &str, ctx: &MacroContext<'_>) -> QueryResult<Option<String>> {
            if body != "__range_ms" {
                return Ok(None);
            }
            let millis = ctx.range.to_epoch_millis() - ctx.range.from_epoch_millis();
            Ok(Some(millis.to_string()))
        }
    }

    #[test]
    fn test_additional_handler() {
        let expander = utc_expander().with_handler(RangeLength);
        let out = expander
            .expand(
                "{{__range_ms}} from {{__time_from:date:seconds}}",
                &new_year_range(),
            )
            .unwrap();
        assert_eq!(out, "86400000 from 1609459200");
        assert!(format!("{:?}", expander).contains("range_length"));
    }
}
