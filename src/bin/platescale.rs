//! Plate-scale an image or a stack of frames: writes the per-pixel RA/Dec and, when the
//! camera location is known, azimuth/elevation to a netCDF file.
//!
//! ```text
//! platescale stack.h5 -s -c 65.1 -147.5
//! platescale sky.fits -t 2013-04-14T08:54:20Z -c 40 -80 -o out/sky.nc
//! ```
use anyhow::{Context, Result};
use astrometry_azel::constants::{DEFAULT_NAVG, DEFAULT_SOLVER, DEFAULT_TIME_KEY};
use astrometry_azel::plate_solver::{AstrometryNet, SolveMode};
use astrometry_azel::platescale::{do_platescale, PlateScaleConfig};
use astrometry_azel::stack::{FrameSelection, Reduction};
use astrometry_azel::time::{parse_time, TimeSpec};
use camino::Utf8PathBuf;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Register an image to the sky: per-pixel RA/Dec and az/el")]
struct Args {
    /// Image or stack to plate scale (.fits, .h5, .mat, .png, .jpg, .tif, ...)
    infn: Utf8PathBuf,

    /// netCDF output; the aggregated image is written next to it as .fits
    #[arg(short, long)]
    outfn: Option<Utf8PathBuf>,

    /// Observer geodetic latitude and longitude in degrees
    #[arg(
        short = 'c',
        long,
        num_args = 2,
        value_names = ["LAT", "LON"],
        allow_negative_numbers = true
    )]
    latlon: Option<Vec<f64>>,

    /// Observation time: ISO 8601 UTC, or Unix seconds
    #[arg(short = 't', long = "ut1")]
    time: Option<String>,

    /// Frames to aggregate: a count from the start, or START STOP
    #[arg(short = 'N', long, num_args = 1..=2, default_values_t = [DEFAULT_NAVG])]
    navg: Vec<usize>,

    /// Per-pixel statistic across frames: mean or median
    #[arg(short, long, default_value_t = Reduction::Mean)]
    method: Reduction,

    /// Run the plate solver instead of using an existing .wcs solution
    #[arg(short, long)]
    solve: bool,

    /// Extra arguments passed to the solver, e.g. "--downsample 4"
    #[arg(short, long, allow_hyphen_values = true, default_value = "")]
    args: String,

    /// Plate solver executable
    #[arg(long, env = "SOLVE_FIELD", default_value = DEFAULT_SOLVER)]
    solver: String,

    /// FITS keyword holding the frame time of a FITS input, used when no other time is known
    #[arg(long, default_value = DEFAULT_TIME_KEY)]
    time_key: String,

    /// More logging, repeatable
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Less logging, repeatable
    #[arg(short, long, action = clap::ArgAction::Count)]
    quiet: u8,
}

fn log_level(verbose: u8, quiet: u8) -> &'static str {
    match i16::from(verbose) - i16::from(quiet) {
        i16::MIN..=-2 => "error",
        -1 => "warn",
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

/// Date/time text first; a bare number that is not a date is taken as POSIX seconds.
fn time_spec(text: &str) -> TimeSpec {
    match parse_time(text) {
        Ok(epoch) => TimeSpec::Epoch(epoch),
        Err(_) => match text.trim().parse::<f64>() {
            Ok(seconds) => TimeSpec::UnixSeconds(seconds),
            Err(_) => TimeSpec::Text(text.to_string()),
        },
    }
}

impl Args {
    fn config(&self) -> Result<PlateScaleConfig> {
        let mut config = PlateScaleConfig::default()
            .with_selection(FrameSelection::from_counts(&self.navg)?)
            .with_reduction(self.method)
            .with_solve(SolveMode::from_flag(self.solve))
            .with_time_key(self.time_key.as_str());
        if let Some(outfn) = &self.outfn {
            config = config.with_outfn(outfn.clone());
        }
        if let Some(&[lat, lon]) = self.latlon.as_deref() {
            config = config.with_latlon(lat, lon);
        }
        if let Some(time) = &self.time {
            config = config.with_time(time_spec(time));
        }
        Ok(config)
    }

    fn solver(&self) -> AstrometryNet {
        AstrometryNet::new()
            .with_program(self.solver.as_str())
            .with_args(&self.args)
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level(args.verbose, args.quiet)));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = args.config()?;
    let result = do_platescale(&args.infn, &config, &args.solver())
        .with_context(|| format!("plate scaling {}", args.infn))?;

    let (rows, cols) = result.dataset.dim();
    info!(
        "{rows}x{cols} pixels registered{}: {}",
        if result.dataset.horizon.is_some() {
            " with az/el"
        } else {
            ""
        },
        result.output
    );
    Ok(())
}
