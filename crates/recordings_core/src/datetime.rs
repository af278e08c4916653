//! Free-form date/time normalization into the stored timestamp format.
//!
//! Recordings store their start and end times as `YYYY-MM-DD HH:mm:ss.SSS`.
//! Users type whatever they like ("January 7, 2019", "07/01/2019 11:00 AM",
//! "2019/1/7"). [`normalize_date_time`] maps those onto the stored form, or
//! hands back the trimmed input unchanged when nothing recognizes it, so the
//! caller can still run a substring search on the literal text.
//!
//! Parsing is an ordered pipeline of [`DateMatcher`] strategies; the first
//! one that yields a valid calendar date wins:
//!
//! | Order | Matcher              | Accepts                                      |
//! |-------|----------------------|----------------------------------------------|
//! | 1     | `general`            | ISO `T` forms, RFC 2822, `YYYY.MM.DD`, `M/D/YY`, written months; year > 1900 |
//! | 2     | `us_slash`           | `MM/DD/YYYY`                                 |
//! | 3     | `ambiguous_slash`    | `DD/MM/YYYY` when the first group is > 12    |
//! | 4     | `year_first`         | `YYYY-MM-DD`, `YYYY/MM/DD`                   |
//! | 5     | `day_first_dash`     | `DD-MM-YYYY`                                 |
//! | 6     | `general_any_year`   | written forms with any year                  |
//!
//! Every numeric matcher takes an optional `H:mm[:ss[.SSS]] [AM|PM]` suffix.

use std::sync::LazyLock;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime};
use regex::{Captures, Regex};

use crate::observability::{NormalizationOutcome, record_normalization};

const CANONICAL_DATE_FORMAT: &str = "%Y-%m-%d";
const CANONICAL_DATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Optional time-of-day tail shared by the numeric patterns.
const TIME_SUFFIX: &str = r"(?:\s+(?P<hour>\d{1,2}):(?P<minute>\d{2})(?::(?P<second>\d{2})(?:\.(?P<milli>\d{3}))?)?(?:\s*(?P<meridiem>AM|PM))?)?";

static CANONICAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}(\s+\d{2}:\d{2}(:\d{2}(\.\d{3})?)?)?$").expect("canonical regex")
});
static DATE_ONLY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("date-only regex"));
static DATE_SHAPED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}").expect("date-shape regex"));
static HAS_TIME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{1,2}:\d{2}").expect("time-presence regex"));

static SLASH: LazyLock<Regex> = LazyLock::new(|| numeric_pattern(r"(\d{1,2})/(\d{1,2})/(\d{4})"));
static YEAR_FIRST: LazyLock<Regex> =
    LazyLock::new(|| numeric_pattern(r"(\d{4})[-/](\d{1,2})[-/](\d{1,2})"));
static DASH: LazyLock<Regex> = LazyLock::new(|| numeric_pattern(r"(\d{1,2})-(\d{1,2})-(\d{4})"));
static DOTTED: LazyLock<Regex> =
    LazyLock::new(|| numeric_pattern(r"(\d{4})\.(\d{1,2})\.(\d{1,2})"));
static SHORT_SLASH: LazyLock<Regex> =
    LazyLock::new(|| numeric_pattern(r"(\d{1,2})/(\d{1,2})/(\d{2})"));

static WRITTEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)^(?P<date>.+?)(?:,?\s+at)?{}$",
        TIME_SUFFIX.replacen(r"(?P<milli>\d{3})", r"(?P<milli>\d{1,3})", 1)
    ))
    .expect("written regex")
});
static ORDINAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(\d{1,2})(?:st|nd|rd|th)\b").expect("ordinal regex"));
static WEEKDAY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:mon|tue|wed|thu|fri|sat|sun)[a-z]*\.?,?\s+").expect("weekday regex")
});
/// `GMT+1000`, `UTC`, `-05:00`, optionally followed by a `(zone name)`.
static TRAILING_ZONE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s+(?:(?:GMT|UTC)(?:[+-]\d{2}:?\d{2})?|[+-]\d{2}:?\d{2})(?:\s+\([^)]*\))?$")
        .expect("trailing zone regex")
});

fn numeric_pattern(date: &str) -> Regex {
    Regex::new(&format!(r"(?i)^{date}{TIME_SUFFIX}$")).expect("numeric date regex")
}

/// True when `value` is already in the stored format (date-only, or date and
/// time with optional seconds and milliseconds).
pub fn is_canonical(value: &str) -> bool {
    CANONICAL.is_match(value)
}

/// True for exactly `YYYY-MM-DD`.
pub fn is_date_only(value: &str) -> bool {
    DATE_ONLY.is_match(value)
}

/// True when `value` starts with a `YYYY-MM-DD` date.
pub fn is_date_shaped(value: &str) -> bool {
    DATE_SHAPED.is_match(value)
}

/// Parse a canonical value back into its date and time fields.
pub fn parse_canonical(value: &str) -> Option<NaiveDateTime> {
    if !is_canonical(value) {
        return None;
    }
    if is_date_only(value) {
        return NaiveDate::parse_from_str(value, CANONICAL_DATE_FORMAT)
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0));
    }
    let collapsed = value.split_whitespace().collect::<Vec<_>>().join(" ");
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|layout| NaiveDateTime::parse_from_str(&collapsed, layout).ok())
}

/// One strategy in the parsing pipeline.
pub trait DateMatcher: Send + Sync {
    fn name(&self) -> &'static str;

    /// Interpret `input` (already trimmed) or decline with `None`.
    fn try_parse(&self, input: &str) -> Option<NaiveDateTime>;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct TimeOfDay {
    hour: u32,
    minute: u32,
    second: u32,
    milli: u32,
}

impl TimeOfDay {
    /// Read the named time groups; midnight when the suffix is absent.
    fn from_captures(caps: &Captures<'_>) -> Option<Self> {
        let Some(hour) = caps.name("hour") else {
            return Some(Self::default());
        };
        let hour: u32 = hour.as_str().parse().ok()?;
        let minute = caps.name("minute")?.as_str().parse().ok()?;
        let second = match caps.name("second") {
            Some(m) => m.as_str().parse().ok()?,
            None => 0,
        };
        let milli = match caps.name("milli") {
            Some(m) => parse_fraction_millis(m.as_str())?,
            None => 0,
        };
        let meridiem = caps.name("meridiem").map(|m| m.as_str());
        Some(Self {
            hour: apply_meridiem(hour, meridiem),
            minute,
            second,
            milli,
        })
    }

    fn to_naive_time(self) -> Option<NaiveTime> {
        NaiveTime::from_hms_milli_opt(self.hour, self.minute, self.second, self.milli)
    }
}

/// `.9` is 900ms, `.09` is 90ms.
fn parse_fraction_millis(digits: &str) -> Option<u32> {
    let value: u32 = digits.parse().ok()?;
    match digits.len() {
        1 => Some(value * 100),
        2 => Some(value * 10),
        3 => Some(value),
        _ => None,
    }
}

fn apply_meridiem(hour: u32, marker: Option<&str>) -> u32 {
    match marker {
        Some(m) if m.eq_ignore_ascii_case("pm") && (1..12).contains(&hour) => hour + 12,
        Some(m) if m.eq_ignore_ascii_case("am") && hour == 12 => 0,
        _ => hour,
    }
}

fn assemble(year: &str, month: &str, day: &str, caps: &Captures<'_>) -> Option<NaiveDateTime> {
    assemble_with_year(year.parse().ok()?, month, day, caps)
}

fn assemble_with_year(
    year: i32,
    month: &str,
    day: &str,
    caps: &Captures<'_>,
) -> Option<NaiveDateTime> {
    let date = NaiveDate::from_ymd_opt(year, month.parse().ok()?, day.parse().ok()?)?;
    let time = TimeOfDay::from_captures(caps)?.to_naive_time()?;
    Some(date.and_time(time))
}

/// Two-digit years below 50 are 20xx, the rest 19xx.
fn expand_two_digit_year(year: i32) -> i32 {
    if year < 50 { 2000 + year } else { 1900 + year }
}

/// One whitespace-separated piece of a cleaned-up written date.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum WrittenToken {
    MonthName(u32),
    /// One or two digits.
    Day(u32),
    /// Exactly four digits.
    Year(i32),
}

impl WrittenToken {
    fn classify(token: &str) -> Option<Self> {
        if token.bytes().all(|b| b.is_ascii_digit()) {
            return match token.len() {
                1 | 2 => token.parse().ok().map(Self::Day),
                4 => token.parse().ok().map(Self::Year),
                _ => None,
            };
        }
        token
            .parse::<chrono::Month>()
            .ok()
            .map(|m| Self::MonthName(m.number_from_month()))
    }
}

/// Month name plus day and year in any of the usual orders. A month and year
/// alone mean the first of that month; anything else is not a date.
fn written_date(cleaned: &str) -> Option<NaiveDate> {
    use WrittenToken::{Day, MonthName, Year};

    let tokens = cleaned
        .split_whitespace()
        .map(WrittenToken::classify)
        .collect::<Option<Vec<_>>>()?;
    let (year, month, day) = match tokens.as_slice() {
        [MonthName(m), Day(d), Year(y)]
        | [Day(d), MonthName(m), Year(y)]
        | [Year(y), MonthName(m), Day(d)] => (*y, *m, *d),
        [MonthName(m), Year(y)] | [Year(y), MonthName(m)] => (*y, *m, 1),
        _ => return None,
    };
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Locale-agnostic parser for self-describing forms: RFC 3339, RFC 2822,
/// ISO with a `T` separator, dotted year-first and two-digit-year slash dates,
/// and written month names.
#[derive(Clone, Copy, Debug)]
pub struct GeneralParser {
    /// Results in or before this year are rejected.
    year_floor: Option<i32>,
}

impl GeneralParser {
    /// Rejects years up to and including 1900, which only show up when a
    /// short numeric string is misread.
    pub fn modern() -> Self {
        Self {
            year_floor: Some(1900),
        }
    }

    pub fn any_year() -> Self {
        Self { year_floor: None }
    }

    fn parse_any(input: &str) -> Option<NaiveDateTime> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
            return Some(dt.naive_local());
        }
        if let Ok(dt) = DateTime::parse_from_rfc2822(input) {
            return Some(dt.naive_local());
        }
        if let Some(dt) = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
            .iter()
            .find_map(|layout| NaiveDateTime::parse_from_str(input, layout).ok())
        {
            return Some(dt);
        }
        if let Some(caps) = DOTTED.captures(input) {
            return assemble(&caps[1], &caps[2], &caps[3], &caps);
        }
        if let Some(caps) = SHORT_SLASH.captures(input) {
            let year = expand_two_digit_year(caps[3].parse().ok()?);
            return assemble_with_year(year, &caps[1], &caps[2], &caps);
        }
        Self::parse_written(input)
    }

    /// Written month names. Commas, periods, dashes, ordinal suffixes, a
    /// leading weekday and a trailing zone are dropped first.
    fn parse_written(input: &str) -> Option<NaiveDateTime> {
        let without_zone = TRAILING_ZONE.replace(input, "");
        let caps = WRITTEN.captures(&without_zone)?;
        let date_part = caps.name("date")?.as_str();
        let without_weekday = WEEKDAY.replace(date_part, "");
        let without_ordinals = ORDINAL.replace_all(&without_weekday, "$1");
        let date = written_date(&without_ordinals.replace([',', '.', '-'], " "))?;
        let time = TimeOfDay::from_captures(&caps)?.to_naive_time()?;
        Some(date.and_time(time))
    }
}

impl DateMatcher for GeneralParser {
    fn name(&self) -> &'static str {
        if self.year_floor.is_some() {
            "general"
        } else {
            "general_any_year"
        }
    }

    fn try_parse(&self, input: &str) -> Option<NaiveDateTime> {
        let parsed = Self::parse_any(input)?;
        match self.year_floor {
            Some(floor) if parsed.year() <= floor => None,
            _ => Some(parsed),
        }
    }
}

/// `MM/DD/YYYY`, month first.
#[derive(Clone, Copy, Debug, Default)]
pub struct UsSlash;

impl DateMatcher for UsSlash {
    fn name(&self) -> &'static str {
        "us_slash"
    }

    fn try_parse(&self, input: &str) -> Option<NaiveDateTime> {
        let caps = SLASH.captures(input)?;
        assemble(&caps[3], &caps[1], &caps[2], &caps)
    }
}

/// Slash dates that [`UsSlash`] could not place.
///
/// A first group above 12 can only be a day, so the date is read day-first.
/// Otherwise the US reading stands: `03/04/2019` is March 4th.
#[derive(Clone, Copy, Debug, Default)]
pub struct AmbiguousSlash;

impl DateMatcher for AmbiguousSlash {
    fn name(&self) -> &'static str {
        "ambiguous_slash"
    }

    fn try_parse(&self, input: &str) -> Option<NaiveDateTime> {
        let caps = SLASH.captures(input)?;
        let first: u32 = caps[1].parse().ok()?;
        if first > 12 {
            assemble(&caps[3], &caps[2], &caps[1], &caps)
        } else {
            assemble(&caps[3], &caps[1], &caps[2], &caps)
        }
    }
}

/// `YYYY-MM-DD` or `YYYY/MM/DD` with unpadded fields allowed.
#[derive(Clone, Copy, Debug, Default)]
pub struct YearFirst;

impl DateMatcher for YearFirst {
    fn name(&self) -> &'static str {
        "year_first"
    }

    fn try_parse(&self, input: &str) -> Option<NaiveDateTime> {
        let caps = YEAR_FIRST.captures(input)?;
        assemble(&caps[1], &caps[2], &caps[3], &caps)
    }
}

/// `DD-MM-YYYY`, day first regardless of whether the day exceeds 12.
#[derive(Clone, Copy, Debug, Default)]
pub struct DayFirstDash;

impl DateMatcher for DayFirstDash {
    fn name(&self) -> &'static str {
        "day_first_dash"
    }

    fn try_parse(&self, input: &str) -> Option<NaiveDateTime> {
        let caps = DASH.captures(input)?;
        assemble(&caps[3], &caps[2], &caps[1], &caps)
    }
}

/// The standard pipeline, in priority order.
pub fn default_matchers() -> Vec<Box<dyn DateMatcher>> {
    vec![
        Box::new(GeneralParser::modern()),
        Box::new(UsSlash),
        Box::new(AmbiguousSlash),
        Box::new(YearFirst),
        Box::new(DayFirstDash),
        Box::new(GeneralParser::any_year()),
    ]
}

/// Runs a list of [`DateMatcher`]s and renders the winner in stored format.
pub struct Normalizer {
    matchers: Vec<Box<dyn DateMatcher>>,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::with_matchers(default_matchers())
    }
}

impl std::fmt::Debug for Normalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Normalizer")
            .field(
                "matchers",
                &self.matchers.iter().map(|m| m.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl Normalizer {
    pub fn with_matchers(matchers: Vec<Box<dyn DateMatcher>>) -> Self {
        Self { matchers }
    }

    /// `None` for blank input, the canonical form when some matcher accepts
    /// the input, otherwise the trimmed input itself.
    pub fn normalize(&self, input: &str) -> Option<String> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return None;
        }
        if is_canonical(trimmed) {
            record_normalization(NormalizationOutcome::Canonical);
            return Some(trimmed.to_string());
        }
        let Some((matcher, parsed)) = self.parse(trimmed) else {
            tracing::trace!(input = %trimmed, "no date matcher accepted input");
            record_normalization(NormalizationOutcome::Verbatim);
            return Some(trimmed.to_string());
        };
        tracing::trace!(input = %trimmed, matcher, "normalized date");
        record_normalization(NormalizationOutcome::Parsed);
        if HAS_TIME.is_match(trimmed) {
            Some(parsed.format(CANONICAL_DATE_TIME_FORMAT).to_string())
        } else {
            Some(parsed.format(CANONICAL_DATE_FORMAT).to_string())
        }
    }

    /// First matcher that accepts `trimmed`, with its result.
    pub fn parse(&self, trimmed: &str) -> Option<(&'static str, NaiveDateTime)> {
        self.matchers
            .iter()
            .find_map(|m| m.try_parse(trimmed).map(|dt| (m.name(), dt)))
    }
}

static DEFAULT_NORMALIZER: LazyLock<Normalizer> = LazyLock::new(Normalizer::default);

/// Normalize with the default pipeline. See the module docs.
pub fn normalize_date_time(input: &str) -> Option<String> {
    DEFAULT_NORMALIZER.normalize(input)
}

/// [`normalize_date_time`] for a possibly-missing value.
pub fn normalize_optional(input: Option<&str>) -> Option<String> {
    input.and_then(normalize_date_time)
}
