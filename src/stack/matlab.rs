//! MATLAB v5 `.mat` files holding the stack in a variable named `data`.
//!
//! MATLAB stores arrays column-major, so the raw buffer of a `rows × cols × frames` variable
//! is the row-major buffer of the transposed `frames × cols × rows` array. The variable is
//! loaded transposed, exactly as `data.T` would be, and frames index the last MATLAB axis.
use std::fs;
use std::ops::Range;

use camino::Utf8Path;
use matfile::{MatFile, NumericData};
use ndarray::{s, Array3, Axis, IxDyn};

use super::{FrameSelection, FrameStack, SampleArray, StackSamples};
use crate::azel_errors::AzelError;

const VARIABLE: &str = "data";

pub fn load_mat_stack(
    path: &Utf8Path,
    selection: &FrameSelection,
) -> Result<FrameStack, AzelError> {
    let matlab_error = |reason: String| AzelError::Matlab {
        path: path.to_owned(),
        reason,
    };

    let file = fs::File::open(path)?;
    let mat = MatFile::parse(file).map_err(|e| matlab_error(format!("{e:?}")))?;
    let array = mat
        .find_by_name(VARIABLE)
        .ok_or_else(|| matlab_error(format!("no variable named {VARIABLE:?}")))?;

    // transposed MATLAB dimensions, row-major
    let shape: Vec<usize> = array.size().iter().rev().copied().collect();
    let frames = match shape[..] {
        [_, _] => 0..1,
        [depth, _, _] => selection.bounds(depth)?,
        _ => {
            return Err(matlab_error(format!(
                "variable {VARIABLE:?} has shape {shape:?}, expected 2-D or 3-D"
            )))
        }
    };

    let samples: StackSamples = match array.data() {
        NumericData::UInt8 { real, .. } => SampleArray::U8(select(path, &shape, real, &frames)?),
        NumericData::Int8 { real, .. } => {
            let widened: Vec<i16> = real.iter().map(|&v| i16::from(v)).collect();
            SampleArray::I16(select(path, &shape, &widened, &frames)?)
        }
        NumericData::Int16 { real, .. } => SampleArray::I16(select(path, &shape, real, &frames)?),
        NumericData::UInt16 { real, .. } => SampleArray::U16(select(path, &shape, real, &frames)?),
        NumericData::Int32 { real, .. } => SampleArray::I32(select(path, &shape, real, &frames)?),
        NumericData::Single { real, .. } => SampleArray::F32(select(path, &shape, real, &frames)?),
        NumericData::Double { real, .. } => SampleArray::F64(select(path, &shape, real, &frames)?),
        NumericData::UInt32 { real, .. } => {
            let widened: Vec<f64> = real.iter().map(|&v| f64::from(v)).collect();
            SampleArray::F64(select(path, &shape, &widened, &frames)?)
        }
        NumericData::Int64 { real, .. } => {
            let widened: Vec<f64> = real.iter().map(|&v| v as f64).collect();
            SampleArray::F64(select(path, &shape, &widened, &frames)?)
        }
        NumericData::UInt64 { real, .. } => {
            let widened: Vec<f64> = real.iter().map(|&v| v as f64).collect();
            SampleArray::F64(select(path, &shape, &widened, &frames)?)
        }
    };

    Ok(FrameStack::new(samples))
}

/// Reshape the transposed buffer and keep the selected frames.
fn select<T: Clone>(
    path: &Utf8Path,
    shape: &[usize],
    real: &[T],
    frames: &Range<usize>,
) -> Result<Array3<T>, AzelError> {
    let array = ndarray::Array::from_shape_vec(IxDyn(shape), real.to_vec())
        .map_err(|e| AzelError::InvalidInput(format!("{path}: {e}")))?;
    let array = if array.ndim() == 2 {
        array.insert_axis(Axis(0))
    } else {
        array
    };
    let array = array
        .into_dimensionality::<ndarray::Ix3>()
        .map_err(|e| AzelError::InvalidInput(format!("{path}: {e}")))?;
    Ok(array.slice(s![frames.start..frames.end, .., ..]).to_owned())
}
