//! # Observation time handling
//!
//! Everything the pipeline needs to know about *when* an image was taken:
//!
//! - [`TimeSpec`](crate::time::TimeSpec): the caller-supplied time, tagged by how it was given.
//! - [`resolve_time`](crate::time::resolve_time): the ordered fallback policy turning an optional
//!   [`TimeSpec`](crate::time::TimeSpec) and the image header into one UTC [`Epoch`].
//! - [`parse_time`](crate::time::parse_time): a permissive date/time parser for operator input and
//!   acquisition-software headers.
//! - [`gmst`](crate::time::gmst): Greenwich Mean Sidereal Time, used by the horizon transform.
//!
//! ## Resolution order
//!
//! ```text
//! TimeSpec::Epoch        -> used as-is
//! TimeSpec::UnixSeconds  -> POSIX seconds, UTC
//! TimeSpec::Text         -> parse_time
//! None                   -> HeaderTimeSource (FITS keyword, "FRAME" by default) -> parse_time
//!                           nothing found -> AzelError::MissingTime
//! ```
//!
//! The header fallback depends on the acquisition tool writing a parseable time in a known
//! keyword, so it is injected through the [`HeaderTimeSource`](crate::time::HeaderTimeSource) trait
//! rather than hard-wired.
use std::ops::RangeInclusive;
use std::str::FromStr;
use std::sync::LazyLock;

use camino::Utf8Path;
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Timelike, Utc};
use hifitime::Epoch;
use regex::Regex;
use tracing::{debug, info};

use crate::azel_errors::AzelError;
use crate::constants::{DAYS_PER_CENTURY, DPI, MJD, SECONDS_PER_DAY, SIDEREAL_RATE, T2000};
use crate::fits_io::read_key_string;

/// `JD 2451545.0`, `MJD=51544.5`, `mjd 51544` ...
static JULIAN_DAY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(MJD|JD)\s*[:=]?\s*([-+]?\d+(?:\.\d*)?)(?:\s*UTC)?$")
        .expect("valid julian day regex")
});

/// Layouts tried, in order, once hifitime and RFC 3339 parsing have failed.
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S%.f",
    "%Y/%m/%dT%H:%M:%S%.f",
    "%Y/%m/%d %H:%M",
    "%d/%m/%Y %H:%M:%S%.f",
    "%Y%m%dT%H%M%S%.f",
    "%a %b %e %H:%M:%S%.f %Y",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%Y%m%d"];

const VALID_YEARS: RangeInclusive<i32> = 1..=9999;

/// A caller-supplied observation time, tagged by the way it was given.
#[derive(Debug, Clone, PartialEq)]
pub enum TimeSpec {
    /// A datetime value, used as-is.
    Epoch(Epoch),
    /// POSIX seconds since 1970-01-01T00:00:00 UTC (the `ut1_unix` convention of HDF5 stacks).
    UnixSeconds(f64),
    /// Free text, parsed with [`parse_time`].
    Text(String),
}

impl From<Epoch> for TimeSpec {
    fn from(epoch: Epoch) -> Self {
        TimeSpec::Epoch(epoch)
    }
}

impl From<f64> for TimeSpec {
    fn from(seconds: f64) -> Self {
        TimeSpec::UnixSeconds(seconds)
    }
}

impl From<&str> for TimeSpec {
    fn from(text: &str) -> Self {
        TimeSpec::Text(text.to_string())
    }
}

impl From<String> for TimeSpec {
    fn from(text: String) -> Self {
        TimeSpec::Text(text)
    }
}

/// Where a resolved observation time came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeOrigin {
    Caller,
    UnixSeconds,
    Text,
    /// FITS header keyword of the solved image
    Header(String),
}

/// Outcome of [`resolve_time`].
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTime {
    pub epoch: Epoch,
    pub origin: TimeOrigin,
}

/// Source of a fallback observation time stored alongside the image.
pub trait HeaderTimeSource {
    /// Return the raw time text for `image`, or `None` when the image carries none.
    fn header_time(&self, image: &Utf8Path) -> Result<Option<String>, AzelError>;

    /// Human readable name of the field, for logs and [`TimeOrigin::Header`].
    fn field_name(&self) -> &str;
}

/// Reads the observation time from one keyword of the primary FITS header.
///
/// The default keyword `FRAME` is written by Andor Solis; other acquisition
/// tools use `DATE-OBS` or their own keyword.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FitsKeywordTime {
    keyword: String,
}

impl FitsKeywordTime {
    pub fn new(keyword: impl Into<String>) -> Self {
        FitsKeywordTime {
            keyword: keyword.into(),
        }
    }
}

impl Default for FitsKeywordTime {
    fn default() -> Self {
        FitsKeywordTime::new(crate::constants::DEFAULT_TIME_KEY)
    }
}

impl HeaderTimeSource for FitsKeywordTime {
    fn header_time(&self, image: &Utf8Path) -> Result<Option<String>, AzelError> {
        read_key_string(image, &self.keyword)
    }

    fn field_name(&self) -> &str {
        &self.keyword
    }
}

/// Resolve the observation time of `image`, most specific source first.
///
/// Arguments
/// ---------
/// * `time`: the caller-supplied time, if any
/// * `image`: the solved FITS image, consulted only when `time` is `None`
/// * `header`: how to extract a fallback time from `image`
///
/// Return
/// ------
/// * the UTC epoch and its origin, [`AzelError::MissingTime`] when neither the caller nor the
///   header provides a time, [`AzelError::TimeParseError`] when the text cannot be parsed
pub fn resolve_time(
    time: Option<&TimeSpec>,
    image: &Utf8Path,
    header: &dyn HeaderTimeSource,
) -> Result<ResolvedTime, AzelError> {
    let resolved = match time {
        Some(TimeSpec::Epoch(epoch)) => ResolvedTime {
            epoch: *epoch,
            origin: TimeOrigin::Caller,
        },
        Some(TimeSpec::UnixSeconds(seconds)) => ResolvedTime {
            epoch: epoch_from_unix(*seconds)?,
            origin: TimeOrigin::UnixSeconds,
        },
        Some(TimeSpec::Text(text)) => ResolvedTime {
            epoch: parse_time(text)?,
            origin: TimeOrigin::Text,
        },
        None => {
            let text = header
                .header_time(image)?
                .ok_or_else(|| AzelError::MissingTime(image.to_owned()))?;
            info!("using FITS header {} for time", header.field_name());
            ResolvedTime {
                epoch: parse_time(&text)?,
                origin: TimeOrigin::Header(header.field_name().to_string()),
            }
        }
    };
    debug!("observation time {} ({:?})", resolved.epoch, resolved.origin);
    Ok(resolved)
}

/// Convert POSIX seconds to a UTC epoch, rejecting NaN and infinities.
pub fn epoch_from_unix(seconds: f64) -> Result<Epoch, AzelError> {
    if !seconds.is_finite() {
        return Err(AzelError::TimeParseError(format!(
            "{seconds} is not a valid POSIX time"
        )));
    }
    check_year(Epoch::from_unix_seconds(seconds), seconds)
}

/// Reject epochs outside the years an ISO-8601 date can express; hifitime saturates far
/// beyond them instead of failing.
fn check_year(epoch: Epoch, value: impl std::fmt::Display) -> Result<Epoch, AzelError> {
    let year = epoch.to_gregorian_utc().0;
    if VALID_YEARS.contains(&year) {
        Ok(epoch)
    } else {
        Err(AzelError::TimeParseError(format!(
            "{value} is outside the years {} to {}",
            VALID_YEARS.start(),
            VALID_YEARS.end()
        )))
    }
}

/// Parse a date/time string permissively, interpreting it as UTC unless it carries an offset.
///
/// Accepted forms, tried in order:
/// * RFC 3339 with `Z` or a numeric offset (`2000-01-01T00:00:00+02:00`)
/// * `JD 2451545.0` / `MJD 51544.5` (optionally with `=` or `:` and a trailing `UTC`)
/// * anything [`hifitime::Epoch::from_str`] understands (`2000-01-01T00:00:00`, `... UTC`, `... TAI`)
/// * ISO-like layouts with space or `T`, `/` separated dates, minute precision, date only
///
/// Surrounding whitespace and single quotes (left over from FITS string cards) are ignored.
pub fn parse_time(text: &str) -> Result<Epoch, AzelError> {
    let trimmed = text.trim().trim_matches('\'').trim();
    if trimmed.is_empty() {
        return Err(AzelError::TimeParseError(format!("{text:?}")));
    }
    check_year(parse_trimmed(trimmed)?, trimmed)
}

fn parse_trimmed(trimmed: &str) -> Result<Epoch, AzelError> {
    if let Ok(datetime) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(epoch_from_naive(&datetime.with_timezone(&Utc).naive_utc()));
    }

    if let Some(caps) = JULIAN_DAY_RE.captures(trimmed) {
        let value: f64 = caps[2]
            .parse()
            .map_err(|_| AzelError::TimeParseError(trimmed.to_string()))?;
        return Ok(if caps[1].eq_ignore_ascii_case("MJD") {
            Epoch::from_mjd_utc(value)
        } else {
            Epoch::from_jde_utc(value)
        });
    }

    // hifitime reads a bare digit run as a year; leave those to the layouts below
    if let Ok(epoch) = Epoch::from_str(trimmed) {
        if VALID_YEARS.contains(&epoch.to_gregorian_utc().0) {
            return Ok(epoch);
        }
    }

    let without_zulu = trimmed.trim_end_matches(['Z', 'z']);
    for format in DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(without_zulu, format) {
            return Ok(epoch_from_naive(&naive));
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(without_zulu, format) {
            return Ok(epoch_from_naive(&date.and_time(chrono::NaiveTime::MIN)));
        }
    }

    Err(AzelError::TimeParseError(trimmed.to_string()))
}

fn epoch_from_naive(naive: &NaiveDateTime) -> Epoch {
    // chrono encodes a leap second as nanosecond >= 1e9
    let nanos = naive.nanosecond().min(999_999_999);
    Epoch::from_gregorian_utc(
        naive.year(),
        naive.month() as u8,
        naive.day() as u8,
        naive.hour() as u8,
        naive.minute() as u8,
        naive.second() as u8,
        nanos,
    )
}

/// Format an epoch as an ISO-8601 UTC string with millisecond precision (`2000-01-01T00:00:00.000Z`).
pub fn format_iso_utc(epoch: &Epoch) -> String {
    let (year, month, day, hour, minute, second, nanos) = epoch.to_gregorian_utc();
    format!(
        "{year:04}-{month:02}-{day:02}T{hour:02}:{minute:02}:{second:02}.{:03}Z",
        nanos / 1_000_000
    )
}

/// Modified Julian Date of `epoch` used as UT1 for Earth rotation.
///
/// UT1 − UTC stays below 0.9 s by construction of UTC, which is far below
/// the pixel scale of wide-field imagers, so UTC stands in for UT1.
pub fn mjd_ut1(epoch: &Epoch) -> MJD {
    epoch.to_mjd_utc_days()
}

/// Compute the Greenwich Mean Sidereal Time (GMST) in radians
/// for a given Modified Julian Date (UT1 time scale).
///
/// This function implements the IAU 1982 polynomial formula
/// for the mean sidereal time at 0h UT1, plus the fractional-day
/// correction term due to Earth's rotation rate.
///
/// # Arguments
/// * `tjm` - Modified Julian Date (MJD, UT1 time scale)
///
/// # Returns
/// * GMST angle in radians, normalized to the interval [0, 2π).
///
/// # References
/// * IAU 1982, IERS Conventions 1996/2000.
/// * Explanatory Supplement to the Astronomical Almanac (1992).
pub fn gmst(tjm: MJD) -> f64 {
    // Polynomial coefficients for GMST at 0h UT1 (in seconds)
    const C0: f64 = 24110.54841;
    const C1: f64 = 8640184.812866;
    const C2: f64 = 9.3104e-2;
    const C3: f64 = -6.2e-6;

    // 0h UT1 of the current day, in Julian centuries since J2000
    let day = tjm.floor();
    let t = (day - T2000) / DAYS_PER_CENTURY;

    let gmst0 = (((C3 * t + C2) * t + C1) * t + C0) * DPI / SECONDS_PER_DAY;

    // Earth rotation during the elapsed fraction of the day
    let gmst = gmst0 + (tjm - day) * DPI * SIDEREAL_RATE;

    gmst.rem_euclid(DPI)
}

/// Local mean sidereal time in radians for an east longitude in radians.
pub fn local_sidereal_time(epoch: &Epoch, longitude: f64) -> f64 {
    (gmst(mjd_ut1(epoch)) + longitude).rem_euclid(DPI)
}
