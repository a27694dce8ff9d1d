//! FITS stacks: a 2-D primary image, or a cube whose `NAXIS3` axis indexes frames.
use camino::Utf8Path;
use fitsio::hdu::FitsHdu;
use fitsio::images::{ImageType, ReadImage};
use fitsio::FitsFile;
use ndarray::Array3;

use super::{FrameSelection, FrameStack, SampleArray, StackSamples};
use crate::azel_errors::AzelError;
use crate::fits_io::{open, primary_image, read_pixel_range};

/// Load the selected frames of the primary HDU of `path`.
///
/// Only the pixels of the selected frames are read from disk. A 2-D image is returned as a
/// single frame and the selection is not checked against it.
pub fn load_fits_stack(
    path: &Utf8Path,
    selection: &FrameSelection,
) -> Result<FrameStack, AzelError> {
    let mut fptr = open(path)?;
    let (hdu, shape, image_type) = primary_image(path, &mut fptr)?;

    let (frames, rows, cols) = match shape[..] {
        [rows, cols] => (0..1, rows, cols),
        [depth, rows, cols] => (selection.bounds(depth)?, rows, cols),
        _ => {
            return Err(AzelError::InvalidInput(format!(
                "{path}: expected a 2-D image or 3-D stack, found shape {shape:?}"
            )))
        }
    };
    let plane = rows * cols;
    let span = Span {
        depth: frames.len(),
        rows,
        cols,
        start: frames.start * plane,
        end: frames.end * plane,
    };

    let samples: StackSamples = match image_type {
        ImageType::UnsignedByte => SampleArray::U8(span.read(path, &hdu, &mut fptr)?),
        ImageType::Byte | ImageType::Short => SampleArray::I16(span.read(path, &hdu, &mut fptr)?),
        ImageType::UnsignedShort => SampleArray::U16(span.read(path, &hdu, &mut fptr)?),
        ImageType::Long => SampleArray::I32(span.read(path, &hdu, &mut fptr)?),
        ImageType::Float => SampleArray::F32(span.read(path, &hdu, &mut fptr)?),
        ImageType::Double | ImageType::UnsignedLong | ImageType::LongLong => {
            SampleArray::F64(span.read(path, &hdu, &mut fptr)?)
        }
    };

    Ok(FrameStack::new(samples))
}

/// Flat pixel range of the selected frames
struct Span {
    depth: usize,
    rows: usize,
    cols: usize,
    start: usize,
    end: usize,
}

impl Span {
    fn read<T>(
        &self,
        path: &Utf8Path,
        hdu: &FitsHdu,
        fptr: &mut FitsFile,
    ) -> Result<Array3<T>, AzelError>
    where
        Vec<T>: ReadImage,
    {
        let pixels = read_pixel_range(hdu, fptr, self.start, self.end)
            .map_err(|e| AzelError::fits(path, e))?;
        Array3::from_shape_vec((self.depth, self.rows, self.cols), pixels)
            .map_err(|e| AzelError::InvalidInput(format!("{path}: {e}")))
    }
}
