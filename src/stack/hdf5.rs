//! HDF5 stacks written by the auroral camera acquisition software.
//!
//! | Path | Content |
//! |------|---------|
//! | `/rawimg` | frames × rows × columns, or a single rows × columns frame |
//! | `/ut1_unix` | POSIX time of each frame (optional) |
//! | `/params` | compound with an integer `rotccw` field (optional) |
//! | `/sensorloc` | compound with `glat`, `glon` fields in degrees (optional) |
//! | `/lla` | latitude, longitude, altitude (optional, used when `/sensorloc` is absent) |
use std::ops::Range;

use camino::Utf8Path;
use hdf5::types::{FloatSize, IntSize, TypeDescriptor};
use hdf5::{Dataset, File, H5Type};
use ndarray::{s, Array3, Ix3};
use tracing::{debug, warn};

use super::{FrameSelection, FrameStack, SampleArray, StackSamples};
use crate::azel_errors::AzelError;

#[derive(H5Type, Clone, Copy, Debug)]
#[repr(C)]
struct Params {
    rotccw: i32,
}

#[derive(H5Type, Clone, Copy, Debug)]
#[repr(C)]
struct SensorLoc {
    glat: f64,
    glon: f64,
}

fn h5_error(path: &Utf8Path) -> impl Fn(hdf5::Error) -> AzelError + '_ {
    move |source| AzelError::Hdf5 {
        path: path.to_owned(),
        source,
    }
}

/// Load the selected frames of `/rawimg`, with their times and the orientation correction.
pub fn load_hdf5_stack(
    path: &Utf8Path,
    selection: &FrameSelection,
) -> Result<FrameStack, AzelError> {
    let file = File::open(path).map_err(h5_error(path))?;
    let rawimg = file.dataset("rawimg").map_err(h5_error(path))?;

    let shape = rawimg.shape();
    let frames = match shape[..] {
        [_, _] => 0..1,
        [depth, _, _] => selection.bounds(depth)?,
        _ => {
            return Err(AzelError::InvalidInput(format!(
                "{path}: /rawimg has shape {shape:?}, expected 2-D or 3-D"
            )))
        }
    };

    let descriptor = rawimg
        .dtype()
        .and_then(|dtype| dtype.to_descriptor())
        .map_err(h5_error(path))?;
    let samples: StackSamples = match descriptor {
        TypeDescriptor::Unsigned(IntSize::U1) => {
            SampleArray::U8(read_frames(path, &rawimg, &frames)?)
        }
        TypeDescriptor::Integer(IntSize::U1) | TypeDescriptor::Integer(IntSize::U2) => {
            SampleArray::I16(read_frames(path, &rawimg, &frames)?)
        }
        TypeDescriptor::Unsigned(IntSize::U2) => {
            SampleArray::U16(read_frames(path, &rawimg, &frames)?)
        }
        TypeDescriptor::Integer(IntSize::U4) => {
            SampleArray::I32(read_frames(path, &rawimg, &frames)?)
        }
        TypeDescriptor::Float(FloatSize::U4) => {
            SampleArray::F32(read_frames(path, &rawimg, &frames)?)
        }
        TypeDescriptor::Unsigned(_) | TypeDescriptor::Integer(_) | TypeDescriptor::Float(_) => {
            SampleArray::F64(read_frames(path, &rawimg, &frames)?)
        }
        other => {
            return Err(AzelError::UnsupportedFormat(format!(
                "{path}: /rawimg element type {other:?}"
            )))
        }
    };

    let times = read_frame_times(path, &file, &frames)?;
    let rotccw = read_rotccw(path, &file)?;
    debug!("{path}: frames {frames:?}, times {}, rotccw {rotccw:?}", times.is_some());

    Ok(FrameStack {
        frames: samples,
        times,
        rotccw,
    })
}

fn read_frames<T: H5Type>(
    path: &Utf8Path,
    rawimg: &Dataset,
    frames: &Range<usize>,
) -> Result<Array3<T>, AzelError> {
    if rawimg.ndim() == 2 {
        let frame = rawimg.read_2d::<T>().map_err(h5_error(path))?;
        return Ok(frame.insert_axis(ndarray::Axis(0)));
    }
    rawimg
        .read_slice::<T, _, Ix3>(s![frames.start..frames.end, .., ..])
        .map_err(h5_error(path))
}

fn read_frame_times(
    path: &Utf8Path,
    file: &File,
    frames: &Range<usize>,
) -> Result<Option<Vec<f64>>, AzelError> {
    if !file.link_exists("ut1_unix") {
        return Ok(None);
    }
    let ut1 = file.dataset("ut1_unix").map_err(h5_error(path))?;
    if ut1.size() < frames.end {
        warn!(
            "{path}: /ut1_unix holds {} times, frames {frames:?} selected; ignoring frame times",
            ut1.size()
        );
        return Ok(None);
    }
    let times = ut1
        .read_slice_1d::<f64, _>(s![frames.start..frames.end])
        .map_err(h5_error(path))?;
    Ok(Some(times.to_vec()))
}

fn read_rotccw(path: &Utf8Path, file: &File) -> Result<Option<i32>, AzelError> {
    if !file.link_exists("params") {
        return Ok(None);
    }
    let params = file
        .dataset("params")
        .and_then(|ds| ds.read_raw::<Params>())
        .map_err(h5_error(path))?;
    Ok(params.first().map(|p| p.rotccw))
}

/// Observer `(latitude, longitude)` in degrees from `/sensorloc`, else the first two values of `/lla`.
pub fn read_site_location(path: &Utf8Path) -> Result<Option<(f64, f64)>, AzelError> {
    let file = File::open(path).map_err(h5_error(path))?;

    if file.link_exists("sensorloc") {
        let loc = file
            .dataset("sensorloc")
            .and_then(|ds| ds.read_raw::<SensorLoc>())
            .map_err(h5_error(path))?;
        if let Some(loc) = loc.first() {
            return Ok(Some((loc.glat, loc.glon)));
        }
    }

    if file.link_exists("lla") {
        let lla = file
            .dataset("lla")
            .and_then(|ds| ds.read_raw::<f64>())
            .map_err(h5_error(path))?;
        if let [lat, lon, ..] = lla[..] {
            return Ok(Some((lat, lon)));
        }
    }

    Ok(None)
}

#[cfg(test)]
mod hdf5_stack_test {
    use super::*;
    use crate::stack::{collapse_stack, Reduction};
    use crate::time::TimeSpec;
    use camino::Utf8PathBuf;
    use ndarray::{array, Array2};

    fn write_stack(path: &Utf8Path, with_metadata: bool) {
        let file = File::create(path).unwrap();
        let rawimg = Array3::from_shape_fn((5, 2, 3), |(f, r, c)| (100 * f + 10 * r + c) as u16);
        file.new_dataset_builder()
            .with_data(&rawimg)
            .create("rawimg")
            .unwrap();
        if with_metadata {
            let ut1: Vec<f64> = (0..5).map(|i| 1.0e9 + i as f64).collect();
            file.new_dataset_builder()
                .with_data(&ut1)
                .create("ut1_unix")
                .unwrap();
            file.new_dataset_builder()
                .with_data(&[Params { rotccw: 1 }])
                .create("params")
                .unwrap();
            file.new_dataset_builder()
                .with_data(&[65.1, -147.5, 200.0])
                .create("lla")
                .unwrap();
        }
    }

    #[test]
    fn test_collapse_with_time_and_rotation() {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("stack.h5")).unwrap();
        write_stack(&path, true);

        let image = collapse_stack(
            &path,
            &FrameSelection::Range { start: 1, stop: 4 },
            Reduction::Mean,
            None,
        )
        .unwrap();
        // frames 1..4 average to frame 2, [[200, 201, 202], [210, 211, 212]], then one
        // quarter turn counter-clockwise
        let expected: Array2<u16> = array![[202, 212], [201, 211], [200, 210]];
        assert_eq!(image.image, SampleArray::U16(expected));
        let SampleArray::U16(rotated) = &image.image else {
            panic!("u16 stack should reduce to a u16 image");
        };
        // the top-right corner of the frame ends up top-left
        assert_eq!(rotated[[0, 0]], 202);
        assert_eq!(rotated[[2, 1]], 210);
        assert_eq!(image.time, Some(TimeSpec::UnixSeconds(1.0e9 + 1.0)));

        assert_eq!(read_site_location(&path).unwrap(), Some((65.1, -147.5)));
    }

    #[test]
    fn test_short_time_table_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("short.h5")).unwrap();
        write_stack(&path, true);

        let stack = load_hdf5_stack(&path, &FrameSelection::Range { start: 2, stop: 5 }).unwrap();
        assert!(stack.times.is_some());

        let file = File::open_rw(&path).unwrap();
        file.unlink("ut1_unix").unwrap();
        file.new_dataset_builder()
            .with_data(&[1.0e9, 1.0e9 + 1.0])
            .create("ut1_unix")
            .unwrap();
        drop(file);

        let stack = load_hdf5_stack(&path, &FrameSelection::Range { start: 2, stop: 5 }).unwrap();
        assert_eq!(stack.times, None);
        assert_eq!(stack.frames.depth(), 3);
    }

    #[test]
    fn test_caller_time_wins_and_metadata_is_optional() {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("bare.h5")).unwrap();
        write_stack(&path, false);

        let image = collapse_stack(
            &path,
            &FrameSelection::First(2),
            Reduction::Median,
            Some("2020-01-01T00:00:00".into()),
        )
        .unwrap();
        assert_eq!(image.image.dim(), (2, 3));
        assert_eq!(image.time, Some(TimeSpec::Text("2020-01-01T00:00:00".into())));
        assert_eq!(read_site_location(&path).unwrap(), None);
    }
}
