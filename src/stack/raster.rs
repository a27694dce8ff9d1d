//! Generic raster images (PNG, TIFF, JPEG, ...) decoded by the `image` crate.
//!
//! A raster is always a single frame. 8-bit and 16-bit grayscale keep their dtype; any
//! other pixel layout is converted to `f32` RGB in `[0, 1]` and the three channels averaged.
use camino::Utf8Path;
use image::DynamicImage;
use ndarray::Array2;

use super::FrameStack;
use crate::azel_errors::AzelError;

pub fn load_raster(path: &Utf8Path) -> Result<FrameStack, AzelError> {
    let decoded = image::open(path).map_err(|source| AzelError::Image {
        path: path.to_owned(),
        source,
    })?;
    let (rows, cols) = (decoded.height() as usize, decoded.width() as usize);
    let shape_error = |e: ndarray::ShapeError| AzelError::InvalidInput(format!("{path}: {e}"));

    let stack = match decoded {
        DynamicImage::ImageLuma8(gray) => FrameStack::single(
            Array2::from_shape_vec((rows, cols), gray.into_raw()).map_err(shape_error)?,
        ),
        DynamicImage::ImageLuma16(gray) => FrameStack::single(
            Array2::from_shape_vec((rows, cols), gray.into_raw()).map_err(shape_error)?,
        ),
        color => {
            let rgb = color.to_rgb32f();
            let gray: Vec<f32> = rgb
                .pixels()
                .map(|p| (p.0[0] + p.0[1] + p.0[2]) / 3.0)
                .collect();
            FrameStack::single(Array2::from_shape_vec((rows, cols), gray).map_err(shape_error)?)
        }
    };
    Ok(stack)
}
