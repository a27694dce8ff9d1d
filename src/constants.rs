//! # Constants and type definitions
//!
//! This module centralizes the **angular conversion factors**, **epoch constants** and
//! **type aliases** shared by the plate-scale pipeline.
//!
//! ## Overview
//!
//! - Unit conversions (degrees ↔ radians, days ↔ seconds)
//! - Reference epochs (J2000.0 as a Modified Julian Date)
//! - Defaults of the command-line surface (frame count, solver command, file suffixes)
//! - Type aliases documenting the unit carried by a bare `f64`

// -------------------------------------------------------------------------------------------------
// Physical constants and unit conversions
// -------------------------------------------------------------------------------------------------

/// 2π, useful for trigonometric conversions
pub const DPI: f64 = 2. * std::f64::consts::PI;

/// Number of seconds in a Julian day
pub const SECONDS_PER_DAY: f64 = 86_400.0;

/// MJD epoch of J2000.0 (2000-01-01 12:00:00 TT)
pub const T2000: f64 = 51544.5;

/// Days in a Julian century
pub const DAYS_PER_CENTURY: f64 = 36525.0;

/// Degrees → radians
pub const RADEG: f64 = std::f64::consts::PI / 180.0;

/// Ratio of the sidereal day to the solar day
pub const SIDEREAL_RATE: f64 = 1.00273790934;

// -------------------------------------------------------------------------------------------------
// Pipeline defaults
// -------------------------------------------------------------------------------------------------

/// Number of frames averaged when the caller gives no selection
pub const DEFAULT_NAVG: usize = 10;

/// Executable of the astrometry.net field solver
pub const DEFAULT_SOLVER: &str = "solve-field";

/// FITS header keyword holding the frame time written by the acquisition software
pub const DEFAULT_TIME_KEY: &str = "FRAME";

/// Suffix of the intermediate aggregated image
pub const FITS_SUFFIX: &str = "fits";

/// Suffix of the WCS sidecar written by the solver next to the image
pub const WCS_SUFFIX: &str = "wcs";

/// Suffix of the final sky dataset
pub const DATASET_SUFFIX: &str = "nc";

// -------------------------------------------------------------------------------------------------
// Type aliases
// -------------------------------------------------------------------------------------------------

/// Angle in degrees
pub type Degree = f64;
/// Angle in radians
pub type Radian = f64;
/// Modified Julian Date (days)
pub type MJD = f64;
