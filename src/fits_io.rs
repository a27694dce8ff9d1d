//! # FITS image I/O
//!
//! The aggregated image is handed to the plate solver as a FITS primary HDU. This module writes
//! that file (with the `CHECKSUM`/`DATASUM` integrity keywords), reads it back in its stored
//! dtype, and exposes the small header accessors used by the WCS reader and the time fallback.
//!
//! Rows are written in array order: row 0 of the image is FITS row 1, which is also the
//! pixel convention of the WCS solution computed on that file.
use camino::Utf8Path;
use fitsio::errors::check_status;
use fitsio::hdu::{FitsHdu, HduInfo};
use fitsio::headers::ReadsKey;
use fitsio::images::{ImageDescription, ImageType, ReadImage, WriteImage};
use fitsio::FitsFile;
use ndarray::Array2;
use tracing::{debug, info};

use crate::azel_errors::AzelError;
use crate::stack::{with_samples, ImageSamples, SampleArray};

/// `BITPIX` family written for each sample type. `u16` uses the `BZERO = 32768` convention.
fn image_type(image: &ImageSamples) -> ImageType {
    match image {
        SampleArray::U8(_) => ImageType::UnsignedByte,
        SampleArray::I16(_) => ImageType::Short,
        SampleArray::U16(_) => ImageType::UnsignedShort,
        SampleArray::I32(_) => ImageType::Long,
        SampleArray::F32(_) => ImageType::Float,
        SampleArray::F64(_) => ImageType::Double,
    }
}

/// Write `image` as the primary HDU of `path`, replacing any existing file, and stamp the
/// `CHECKSUM`/`DATASUM` keywords.
///
/// Arguments
/// ---------
/// * `image`: the aggregated image, written in its own dtype
/// * `path`: destination, overwritten if present
///
/// Return
/// ------
/// * [`AzelError::WriteFailed`] naming `path` on any cfitsio or filesystem error
pub fn write_fits(image: &ImageSamples, path: &Utf8Path) -> Result<(), AzelError> {
    write_fits_with_keys(image, path, &[])
}

/// Like [`write_fits`], also writing the string cards `keys` into the primary header before
/// the checksum is computed.
pub fn write_fits_with_keys(
    image: &ImageSamples,
    path: &Utf8Path,
    keys: &[(&str, &str)],
) -> Result<(), AzelError> {
    info!("writing {path}");
    let (rows, cols) = image.dim();
    let description = ImageDescription {
        data_type: image_type(image),
        dimensions: &[rows, cols],
    };

    let mut fptr = FitsFile::create(path)
        .with_custom_primary(&description)
        .overwrite()
        .open()
        .map_err(|e| AzelError::write_failed(path, e))?;
    let hdu = fptr
        .primary_hdu()
        .map_err(|e| AzelError::write_failed(path, e))?;

    with_samples!(image, arr => write_pixels(&mut fptr, &hdu, arr))
        .map_err(|e| AzelError::write_failed(path, e))?;
    for (key, value) in keys {
        hdu.write_key(&mut fptr, key, *value)
            .map_err(|e| AzelError::write_failed(path, e))?;
    }

    write_checksum(&mut fptr).map_err(|e| AzelError::write_failed(path, e))?;
    debug!("{path}: {rows}x{cols} {} with checksum", image.sample_type());
    Ok(())
}

fn write_pixels<T>(
    fptr: &mut FitsFile,
    hdu: &FitsHdu,
    image: &Array2<T>,
) -> fitsio::errors::Result<()>
where
    T: Copy + WriteImage,
{
    let flat: Vec<T> = image.iter().copied().collect();
    hdu.write_image(fptr, &flat)
}

fn write_checksum(fptr: &mut FitsFile) -> fitsio::errors::Result<()> {
    let mut status = 0;
    // SAFETY: `fptr` is an open file positioned on the HDU just written
    unsafe {
        fitsio::sys::ffpcks(fptr.as_raw(), &mut status);
    }
    check_status(status)
}

/// Whether the data and header checksums of the primary HDU of `path` both verify.
///
/// A file without checksum keywords does not verify.
pub fn verify_checksum(path: &Utf8Path) -> Result<bool, AzelError> {
    let mut fptr = open(path)?;
    fptr.primary_hdu().map_err(|e| AzelError::fits(path, e))?;

    let (mut data_ok, mut hdu_ok, mut status) = (0, 0, 0);
    // SAFETY: the file is open and positioned on the primary HDU
    unsafe {
        fitsio::sys::ffvcks(fptr.as_raw(), &mut data_ok, &mut hdu_ok, &mut status);
    }
    check_status(status).map_err(|e| AzelError::fits(path, e))?;
    debug!("{path}: datasum status {data_ok}, checksum status {hdu_ok}");
    Ok(data_ok == 1 && hdu_ok == 1)
}

pub(crate) fn open(path: &Utf8Path) -> Result<FitsFile, AzelError> {
    FitsFile::open(path).map_err(|e| AzelError::fits(path, e))
}

/// Shape of the primary image, C order (`[frames,] rows, columns`).
pub(crate) fn primary_image(
    path: &Utf8Path,
    fptr: &mut FitsFile,
) -> Result<(FitsHdu, Vec<usize>, ImageType), AzelError> {
    let hdu = fptr.primary_hdu().map_err(|e| AzelError::fits(path, e))?;
    match &hdu.info {
        HduInfo::ImageInfo { shape, image_type } => {
            let (shape, image_type) = (shape.clone(), image_type.clone());
            Ok((hdu, shape, image_type))
        }
        _ => Err(AzelError::InvalidInput(format!(
            "{path}: primary HDU is not an image"
        ))),
    }
}

/// Read the primary 2-D image of `path` in its stored dtype.
///
/// Signed bytes are widened to `i16`, unsigned 32-bit and 64-bit integers are read as `f64`.
pub fn read_image(path: &Utf8Path) -> Result<ImageSamples, AzelError> {
    let mut fptr = open(path)?;
    let (hdu, shape, image_type) = primary_image(path, &mut fptr)?;
    let [rows, cols] = shape[..] else {
        return Err(AzelError::InvalidInput(format!(
            "{path}: expected a 2-D image, found shape {shape:?}"
        )));
    };

    let image = match image_type {
        ImageType::UnsignedByte => SampleArray::U8(read_plane(path, &hdu, &mut fptr, rows, cols)?),
        ImageType::Byte | ImageType::Short => {
            SampleArray::I16(read_plane(path, &hdu, &mut fptr, rows, cols)?)
        }
        ImageType::UnsignedShort => {
            SampleArray::U16(read_plane(path, &hdu, &mut fptr, rows, cols)?)
        }
        ImageType::Long => SampleArray::I32(read_plane(path, &hdu, &mut fptr, rows, cols)?),
        ImageType::Float => SampleArray::F32(read_plane(path, &hdu, &mut fptr, rows, cols)?),
        ImageType::Double | ImageType::UnsignedLong | ImageType::LongLong => {
            SampleArray::F64(read_plane(path, &hdu, &mut fptr, rows, cols)?)
        }
    };
    Ok(image)
}

fn read_plane<T>(
    path: &Utf8Path,
    hdu: &FitsHdu,
    fptr: &mut FitsFile,
    rows: usize,
    cols: usize,
) -> Result<Array2<T>, AzelError>
where
    Vec<T>: ReadImage,
{
    let pixels: Vec<T> = hdu.read_image(fptr).map_err(|e| AzelError::fits(path, e))?;
    Array2::from_shape_vec((rows, cols), pixels)
        .map_err(|e| AzelError::InvalidInput(format!("{path}: {e}")))
}

/// Pixel dimensions `(height, width)` of the image in `path`.
///
/// The last two axes of the primary HDU are used, so colour cubes give the size of one plane.
/// A bare WCS header without data falls back to the `IMAGEH`/`IMAGEW` keywords written by
/// astrometry.net.
pub fn read_image_shape(path: &Utf8Path) -> Result<(usize, usize), AzelError> {
    let mut fptr = open(path)?;
    let (hdu, shape, _) = primary_image(path, &mut fptr)?;
    if let [.., rows, cols] = shape[..] {
        return Ok((rows, cols));
    }

    let height: Option<i64> = read_key_optional(&hdu, &mut fptr, "IMAGEH");
    let width: Option<i64> = read_key_optional(&hdu, &mut fptr, "IMAGEW");
    match (height, width) {
        (Some(h), Some(w)) if h > 0 && w > 0 => Ok((h as usize, w as usize)),
        _ => Err(AzelError::InvalidInput(format!(
            "{path}: no image data and no IMAGEH/IMAGEW keywords"
        ))),
    }
}

/// Value of a primary-header keyword, `None` when the keyword is absent.
pub(crate) fn read_key_optional<T: ReadsKey>(
    hdu: &FitsHdu,
    fptr: &mut FitsFile,
    key: &str,
) -> Option<T> {
    hdu.read_key(fptr, key).ok()
}

/// Text value of keyword `key` in the primary header of `path`.
///
/// Numeric cards are returned as written. Surrounding quotes and blanks are stripped.
pub fn read_key_string(path: &Utf8Path, key: &str) -> Result<Option<String>, AzelError> {
    let mut fptr = open(path)?;
    let hdu = fptr.primary_hdu().map_err(|e| AzelError::fits(path, e))?;
    Ok(read_key_optional::<String>(&hdu, &mut fptr, key)
        .map(|value| value.trim().trim_matches('\'').trim().to_string())
        .filter(|value| !value.is_empty()))
}

/// Reads the selected range of pixels of the primary HDU of an open file.
pub(crate) fn read_pixel_range<T>(
    hdu: &FitsHdu,
    fptr: &mut FitsFile,
    start: usize,
    end: usize,
) -> fitsio::errors::Result<Vec<T>>
where
    Vec<T>: ReadImage,
{
    hdu.read_section(fptr, start, end)
}
