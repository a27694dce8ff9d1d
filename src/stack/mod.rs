//! # Frame aggregation
//!
//! Reduce a stack of raw frames to one representative image before plate solving.
//! Averaging a few frames beats down the read noise enough for the solver to find
//! faint stars, while keeping the native sample type of the camera.
//!
//! ## Supported containers
//!
//! | Suffix | [`StackFormat`] | Layout |
//! |--------|-----------------|--------|
//! | `.fits`, `.fit`, `.fts` | `Fits` | primary HDU, 2-D or 3-D (`NAXIS3` = frames) |
//! | `.h5`, `.hdf5` | `Hdf5` | `/rawimg`, optional `/ut1_unix` and `/params.rotccw` (feature `hdf5`) |
//! | `.mat` | `Matlab` | variable `data`, column-major (feature `matlab`) |
//! | `.png`, `.tif`, ... | `Raster` | single frame, color averaged to gray |
//!
//! Every loader reads only the selected frames and returns a [`FrameStack`].
//! [`collapse_stack`] then reduces it with a [`Reduction`] and applies the orientation
//! correction declared by the file.
//!
//! ## Example
//!
//! ```rust,no_run
//! use astrometry_azel::stack::{collapse_stack, FrameSelection, Reduction};
//! use camino::Utf8Path;
//!
//! let image = collapse_stack(
//!     Utf8Path::new("aurora.h5"),
//!     &FrameSelection::Range { start: 5, stop: 15 },
//!     Reduction::Median,
//!     None,
//! )?;
//! println!("{:?} {:?}", image.image.shape(), image.time);
//! # Ok::<(), astrometry_azel::azel_errors::AzelError>(())
//! ```
use std::fmt;
use std::ops::Range;
use std::str::FromStr;

use camino::Utf8Path;
use ndarray::{s, Array, Array2, Array3, ArrayView2, Axis, Dimension, Ix2, Ix3};
use num_traits::AsPrimitive;
use tracing::{debug, info};

use crate::azel_errors::AzelError;
use crate::constants::DEFAULT_NAVG;
use crate::time::TimeSpec;

pub mod fits;
#[cfg(feature = "hdf5")]
pub mod hdf5;
#[cfg(feature = "matlab")]
pub mod matlab;
pub mod raster;

/// Native sample type of an image or stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleType {
    U8,
    I16,
    U16,
    I32,
    F32,
    F64,
}

impl fmt::Display for SampleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SampleType::U8 => "u8",
            SampleType::I16 => "i16",
            SampleType::U16 => "u16",
            SampleType::I32 => "i32",
            SampleType::F32 => "f32",
            SampleType::F64 => "f64",
        };
        f.write_str(name)
    }
}

/// An n-dimensional array of samples that keeps the dtype it was stored with.
#[derive(Debug, Clone, PartialEq)]
pub enum SampleArray<D: Dimension> {
    U8(Array<u8, D>),
    I16(Array<i16, D>),
    U16(Array<u16, D>),
    I32(Array<i32, D>),
    F32(Array<f32, D>),
    F64(Array<f64, D>),
}

/// Frames × rows × columns
pub type StackSamples = SampleArray<Ix3>;
/// Rows × columns
pub type ImageSamples = SampleArray<Ix2>;

/// Evaluate `$body` with `$arr` bound to the inner array, whatever its dtype.
macro_rules! with_samples {
    ($value:expr, $arr:ident => $body:expr) => {
        match $value {
            SampleArray::U8($arr) => $body,
            SampleArray::I16($arr) => $body,
            SampleArray::U16($arr) => $body,
            SampleArray::I32($arr) => $body,
            SampleArray::F32($arr) => $body,
            SampleArray::F64($arr) => $body,
        }
    };
}

/// Like [`with_samples`], rewrapping the result in the same variant.
macro_rules! map_samples {
    ($value:expr, $arr:ident => $body:expr) => {
        match $value {
            SampleArray::U8($arr) => SampleArray::U8($body),
            SampleArray::I16($arr) => SampleArray::I16($body),
            SampleArray::U16($arr) => SampleArray::U16($body),
            SampleArray::I32($arr) => SampleArray::I32($body),
            SampleArray::F32($arr) => SampleArray::F32($body),
            SampleArray::F64($arr) => SampleArray::F64($body),
        }
    };
}

pub(crate) use with_samples;

macro_rules! impl_from_array {
    ($($t:ty => $variant:ident),* $(,)?) => {
        $(
            impl<D: Dimension> From<Array<$t, D>> for SampleArray<D> {
                fn from(array: Array<$t, D>) -> Self {
                    SampleArray::$variant(array)
                }
            }
        )*
    };
}

impl_from_array!(u8 => U8, i16 => I16, u16 => U16, i32 => I32, f32 => F32, f64 => F64);

impl<D: Dimension> SampleArray<D> {
    pub fn shape(&self) -> &[usize] {
        with_samples!(self, arr => arr.shape())
    }

    pub fn sample_type(&self) -> SampleType {
        match self {
            SampleArray::U8(_) => SampleType::U8,
            SampleArray::I16(_) => SampleType::I16,
            SampleArray::U16(_) => SampleType::U16,
            SampleArray::I32(_) => SampleType::I32,
            SampleArray::F32(_) => SampleType::F32,
            SampleArray::F64(_) => SampleType::F64,
        }
    }

    /// Copy of the samples widened to `f64`.
    pub fn to_f64(&self) -> Array<f64, D> {
        with_samples!(self, arr => arr.mapv(|v| AsPrimitive::<f64>::as_(v)))
    }
}

impl StackSamples {
    /// Number of frames
    pub fn depth(&self) -> usize {
        self.shape()[0]
    }

    /// `(rows, columns)` of every frame
    pub fn frame_dim(&self) -> (usize, usize) {
        let shape = self.shape();
        (shape[1], shape[2])
    }

    /// Per-pixel reduction across the frame axis, cast back to the stack dtype.
    pub fn reduce(&self, reduction: Reduction) -> ImageSamples {
        map_samples!(self, arr => reduce_frames(arr, reduction))
    }
}

impl ImageSamples {
    /// `(rows, columns)`
    pub fn dim(&self) -> (usize, usize) {
        let shape = self.shape();
        (shape[0], shape[1])
    }

    /// Rotate counter-clockwise by `k` quarter turns (`numpy.rot90(img, k)`).
    pub fn rot90(&self, k: i32) -> ImageSamples {
        map_samples!(self, arr => rot90(arr.view(), k))
    }
}

/// Which frames of a stack to aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameSelection {
    /// Frames `[0, n)`
    First(usize),
    /// Frames `[start, stop)`
    Range { start: usize, stop: usize },
}

impl Default for FrameSelection {
    fn default() -> Self {
        FrameSelection::First(DEFAULT_NAVG)
    }
}

impl fmt::Display for FrameSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let range = self.range();
        write!(f, "[{}, {})", range.start, range.end)
    }
}

impl FrameSelection {
    /// Build a selection from the `-N` command-line values: one count, or a start/stop pair.
    ///
    /// Arguments
    /// ---------
    /// * `counts`: `[n]` for the first `n` frames, `[start, stop]` for a half-open range
    ///
    /// Return
    /// ------
    /// * the selection, or [`AzelError::InvalidSelection`] for any other shape or an empty range
    pub fn from_counts(counts: &[usize]) -> Result<Self, AzelError> {
        let selection = match counts {
            [n] => FrameSelection::First(*n),
            [start, stop] => FrameSelection::Range {
                start: *start,
                stop: *stop,
            },
            other => {
                return Err(AzelError::InvalidSelection(format!(
                    "expected a frame count or a start and stop frame, got {other:?}"
                )))
            }
        };
        if selection.range().is_empty() {
            return Err(AzelError::InvalidSelection(format!(
                "{selection} selects no frame"
            )));
        }
        Ok(selection)
    }

    /// Half-open frame range, unchecked.
    pub fn range(&self) -> Range<usize> {
        match *self {
            FrameSelection::First(n) => 0..n,
            FrameSelection::Range { start, stop } => start..stop,
        }
    }

    /// Frame range checked against a stack holding `depth` frames.
    pub fn bounds(&self, depth: usize) -> Result<Range<usize>, AzelError> {
        let range = self.range();
        if range.is_empty() {
            return Err(AzelError::InvalidSelection(format!("{self} selects no frame")));
        }
        if range.end > depth {
            return Err(AzelError::InvalidSelection(format!(
                "{self} is out of bounds for a stack of {depth} frames"
            )));
        }
        Ok(range)
    }
}

/// Per-pixel statistic across frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Reduction {
    #[default]
    Mean,
    Median,
}

impl FromStr for Reduction {
    type Err = AzelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mean" => Ok(Reduction::Mean),
            "median" => Ok(Reduction::Median),
            other => Err(AzelError::InvalidInput(format!(
                "unknown reduction method {other:?}, expected \"mean\" or \"median\""
            ))),
        }
    }
}

impl fmt::Display for Reduction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reduction::Mean => f.write_str("mean"),
            Reduction::Median => f.write_str("median"),
        }
    }
}

impl Reduction {
    /// Reduce `values` to one number. `values` is reordered by the median.
    fn apply(self, values: &mut [f64]) -> f64 {
        let n = values.len();
        match self {
            Reduction::Mean => values.iter().sum::<f64>() / n as f64,
            Reduction::Median => {
                // a NaN sample makes the median NaN, like the mean
                if values.iter().any(|v| v.is_nan()) {
                    return f64::NAN;
                }
                values.sort_unstable_by(f64::total_cmp);
                if n % 2 == 1 {
                    values[n / 2]
                } else {
                    0.5 * (values[n / 2 - 1] + values[n / 2])
                }
            }
        }
    }
}

fn reduce_frames<T>(stack: &Array3<T>, reduction: Reduction) -> Array2<T>
where
    T: Copy + 'static + AsPrimitive<f64>,
    f64: AsPrimitive<T>,
{
    let (depth, rows, cols) = stack.dim();
    if depth == 1 {
        return stack.index_axis(Axis(0), 0).to_owned();
    }

    let mut column: Vec<f64> = Vec::with_capacity(depth);
    Array2::from_shape_fn((rows, cols), |(r, c)| {
        column.clear();
        column.extend(
            stack
                .slice(s![.., r, c])
                .iter()
                .map(|&v| AsPrimitive::<f64>::as_(v)),
        );
        // `as` truncates toward zero and saturates
        AsPrimitive::<T>::as_(reduction.apply(&mut column))
    })
}

/// Counter-clockwise rotation by `k` quarter turns, same convention as `numpy.rot90`.
pub fn rot90<T: Clone>(image: ArrayView2<T>, k: i32) -> Array2<T> {
    match k.rem_euclid(4) {
        1 => image.reversed_axes().slice_move(s![..;-1, ..]).to_owned(),
        2 => image.slice_move(s![..;-1, ..;-1]).to_owned(),
        3 => image.slice_move(s![..;-1, ..]).reversed_axes().to_owned(),
        _ => image.to_owned(),
    }
}

/// Frames loaded from a stack file, restricted to the selection.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameStack {
    /// Selected frames, frames × rows × columns
    pub frames: StackSamples,
    /// POSIX time of each selected frame, when the container stores one
    pub times: Option<Vec<f64>>,
    /// Counter-clockwise quarter turns that bring the frames upright
    pub rotccw: Option<i32>,
}

impl FrameStack {
    pub fn new(frames: impl Into<StackSamples>) -> Self {
        FrameStack {
            frames: frames.into(),
            times: None,
            rotccw: None,
        }
    }

    /// A single 2-D frame, stored as a stack of depth one.
    pub fn single<T>(frame: Array2<T>) -> Self
    where
        StackSamples: From<Array3<T>>,
    {
        FrameStack::new(frame.insert_axis(Axis(0)))
    }
}

/// One representative image of a stack.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedImage {
    pub image: ImageSamples,
    /// Caller-supplied time, or the time of the first selected frame
    pub time: Option<TimeSpec>,
}

/// Container format of a stack, chosen from the file suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackFormat {
    Fits,
    Hdf5,
    Matlab,
    Raster,
}

const RASTER_SUFFIXES: &[&str] = &["png", "tif", "tiff", "jpg", "jpeg", "bmp", "gif"];

impl StackFormat {
    pub fn from_path(path: &Utf8Path) -> Result<Self, AzelError> {
        let suffix = path
            .extension()
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match suffix.as_str() {
            "fits" | "fit" | "fts" => Ok(StackFormat::Fits),
            "h5" | "hdf5" => Ok(StackFormat::Hdf5),
            "mat" => Ok(StackFormat::Matlab),
            s if RASTER_SUFFIXES.contains(&s) => Ok(StackFormat::Raster),
            _ => Err(AzelError::UnsupportedFormat(path.to_string())),
        }
    }

    /// Load the selected frames of `path`.
    pub fn load(
        self,
        path: &Utf8Path,
        selection: &FrameSelection,
    ) -> Result<FrameStack, AzelError> {
        match self {
            StackFormat::Fits => fits::load_fits_stack(path, selection),
            StackFormat::Raster => raster::load_raster(path),
            #[cfg(feature = "hdf5")]
            StackFormat::Hdf5 => hdf5::load_hdf5_stack(path, selection),
            #[cfg(feature = "matlab")]
            StackFormat::Matlab => matlab::load_mat_stack(path, selection),
            #[allow(unreachable_patterns)]
            disabled => Err(AzelError::UnsupportedFormat(format!(
                "{path}: {disabled:?} support was not compiled in"
            ))),
        }
    }
}

/// Load `path`, reduce the selected frames and put the result upright.
///
/// Arguments
/// ---------
/// * `path`: stack or image file, format chosen by [`StackFormat::from_path`]
/// * `selection`: frames to aggregate, ignored for single-frame files
/// * `reduction`: mean or median across frames
/// * `time`: caller-supplied observation time, takes precedence over the file's frame times
///
/// Return
/// ------
/// * the aggregated image in the stack dtype and the observation time, if any is known
pub fn collapse_stack(
    path: &Utf8Path,
    selection: &FrameSelection,
    reduction: Reduction,
    time: Option<TimeSpec>,
) -> Result<AggregatedImage, AzelError> {
    let format = StackFormat::from_path(path)?;
    let stack = format.load(path, selection)?;
    debug!(
        "loaded {} {} frame(s) of {:?} from {path}",
        stack.frames.depth(),
        stack.frames.sample_type(),
        stack.frames.frame_dim()
    );

    let mut image = stack.frames.reduce(reduction);
    if let Some(k) = stack.rotccw {
        info!("rotating {path} by {k} quarter turn(s) counter-clockwise");
        image = image.rot90(k);
    }

    let time = time.or_else(|| {
        stack
            .times
            .as_ref()
            .and_then(|times| times.first())
            .map(|&seconds| TimeSpec::UnixSeconds(seconds))
    });

    Ok(AggregatedImage { image, time })
}

/// Observer latitude and longitude (degrees) stored in the stack file, if any.
///
/// Only HDF5 stacks carry a site location (`/sensorloc` or `/lla`); other formats yield `None`.
pub fn read_site_location(path: &Utf8Path) -> Result<Option<(f64, f64)>, AzelError> {
    match StackFormat::from_path(path) {
        #[cfg(feature = "hdf5")]
        Ok(StackFormat::Hdf5) => hdf5::read_site_location(path),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod stack_test {
    use super::*;
    use ndarray::array;

    fn ramp_stack() -> Array3<u16> {
        Array3::from_shape_fn((4, 2, 3), |(f, r, c)| (10 * f + 3 * r + c) as u16)
    }

    #[test]
    fn test_selection_from_counts() {
        assert_eq!(
            FrameSelection::from_counts(&[10]).unwrap(),
            FrameSelection::First(10)
        );
        assert_eq!(
            FrameSelection::from_counts(&[2, 7]).unwrap(),
            FrameSelection::Range { start: 2, stop: 7 }
        );
        assert!(matches!(
            FrameSelection::from_counts(&[1, 2, 3]),
            Err(AzelError::InvalidSelection(_))
        ));
        assert!(matches!(
            FrameSelection::from_counts(&[]),
            Err(AzelError::InvalidSelection(_))
        ));
        assert!(matches!(
            FrameSelection::from_counts(&[5, 5]),
            Err(AzelError::InvalidSelection(_))
        ));
        assert_eq!(FrameSelection::default(), FrameSelection::First(10));
    }

    #[test]
    fn test_selection_bounds() {
        assert_eq!(FrameSelection::First(3).bounds(4).unwrap(), 0..3);
        assert_eq!(
            FrameSelection::Range { start: 1, stop: 4 }.bounds(4).unwrap(),
            1..4
        );
        assert_eq!(
            FrameSelection::First(10).bounds(4),
            Err(AzelError::InvalidSelection(
                "[0, 10) is out of bounds for a stack of 4 frames".into()
            ))
        );
    }

    #[test]
    fn test_reduction_from_str() {
        assert_eq!("mean".parse::<Reduction>().unwrap(), Reduction::Mean);
        assert_eq!(" Median ".parse::<Reduction>().unwrap(), Reduction::Median);
        assert!(matches!(
            "mode".parse::<Reduction>(),
            Err(AzelError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_mean_truncates_to_stack_dtype() {
        let stack = array![[[1u16, 10]], [[2, 11]]];
        let image = SampleArray::from(stack).reduce(Reduction::Mean);
        // (1 + 2) / 2 = 1.5 -> 1, (10 + 11) / 2 = 10.5 -> 10
        assert_eq!(image, SampleArray::U16(array![[1u16, 10]]));
    }

    #[test]
    fn test_median_even_and_odd() {
        let stack = array![[[1.0f32]], [[9.0]], [[2.0]], [[4.0]]];
        let image = SampleArray::from(stack).reduce(Reduction::Median);
        assert_eq!(image, SampleArray::F32(array![[3.0f32]]));

        let stack = array![[[-3i16]], [[100]], [[7]]];
        let image = SampleArray::from(stack).reduce(Reduction::Median);
        assert_eq!(image, SampleArray::I16(array![[7i16]]));
    }

    #[test]
    fn test_nan_sample_propagates() {
        let stack = array![[[1.0f64, 2.0]], [[f64::NAN, 3.0]], [[5.0, 4.0]]];
        for reduction in [Reduction::Mean, Reduction::Median] {
            let SampleArray::F64(image) = SampleArray::from(stack.clone()).reduce(reduction) else {
                panic!("f64 stack should reduce to an f64 image");
            };
            assert!(image[[0, 0]].is_nan());
            assert_eq!(image[[0, 1]], 3.0);
        }
    }

    #[test]
    fn test_identical_frames_are_preserved() {
        let frame = Array2::from_shape_fn((3, 5), |(r, c)| (r * 5 + c) as u8 * 7);
        let stack = ndarray::stack![Axis(0), frame, frame, frame];
        for reduction in [Reduction::Mean, Reduction::Median] {
            let image = SampleArray::from(stack.clone()).reduce(reduction);
            assert_eq!(image, SampleArray::U8(frame.clone()));
        }
    }

    #[test]
    fn test_reduce_keeps_frame_shape() {
        let image = SampleArray::from(ramp_stack()).reduce(Reduction::Mean);
        assert_eq!(image.shape(), &[2, 3]);
        assert_eq!(image.sample_type(), SampleType::U16);
        // mean over f of 10 f + 3 r + c = 15 + 3 r + c
        assert_eq!(image, SampleArray::U16(array![[15u16, 16, 17], [18, 19, 20]]));
    }

    #[test]
    fn test_rot90_matches_numpy() {
        let m = array![[1, 2, 3], [4, 5, 6]];
        assert_eq!(rot90(m.view(), 0), m);
        assert_eq!(rot90(m.view(), 1), array![[3, 6], [2, 5], [1, 4]]);
        assert_eq!(rot90(m.view(), 2), array![[6, 5, 4], [3, 2, 1]]);
        assert_eq!(rot90(m.view(), 3), array![[4, 1], [5, 2], [6, 3]]);
        assert_eq!(rot90(m.view(), -1), rot90(m.view(), 3));
        assert_eq!(rot90(m.view(), 5), rot90(m.view(), 1));
    }

    #[test]
    fn test_stack_format_from_suffix() {
        assert_eq!(
            StackFormat::from_path(Utf8Path::new("a/b.FITS")).unwrap(),
            StackFormat::Fits
        );
        assert_eq!(
            StackFormat::from_path(Utf8Path::new("b.h5")).unwrap(),
            StackFormat::Hdf5
        );
        assert_eq!(
            StackFormat::from_path(Utf8Path::new("b.mat")).unwrap(),
            StackFormat::Matlab
        );
        assert_eq!(
            StackFormat::from_path(Utf8Path::new("b.tiff")).unwrap(),
            StackFormat::Raster
        );
        assert_eq!(
            StackFormat::from_path(Utf8Path::new("b.dat")),
            Err(AzelError::UnsupportedFormat("b.dat".into()))
        );
        assert!(StackFormat::from_path(Utf8Path::new("noext")).is_err());
    }

    #[cfg(not(feature = "hdf5"))]
    #[test]
    fn test_disabled_format_is_unsupported() {
        let err = StackFormat::Hdf5
            .load(Utf8Path::new("x.h5"), &FrameSelection::default())
            .unwrap_err();
        assert!(matches!(err, AzelError::UnsupportedFormat(_)));
    }
}
