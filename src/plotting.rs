//! Side-by-side comparison figures of a case.
//!
//! A figure shows CT, segmentation and the segmentation over CT, plus the MR
//! slice when the requested index exists in the MR volume.

use image::{GenericImage, ImageBuffer, Rgb, RgbImage};
use ndarray::ArrayView2;
use thiserror::Error;

use crate::config::DEFAULT_OVERLAY_ALPHA;
use crate::enums::{Colormap, InvalidPlane, Plane};
use crate::sample_loader::{Sample, SampleError, SampleLoader};
use crate::volume::{overlay_to_image, slice_to_image};

const PADDING: u32 = 8;
const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);

#[derive(Debug, Error)]
pub enum PlotError {
    #[error(transparent)]
    InvalidPlane(#[from] InvalidPlane),

    #[error("The slice number {index} is too high, select a number lower than {count}")]
    SliceOutOfRange { index: usize, count: usize },

    #[error("CT and segmentation slices differ in shape: {ct:?} vs {segmentation:?}")]
    ShapeMismatch {
        ct: (usize, usize),
        segmentation: (usize, usize),
    },

    #[error("could not build panel image")]
    Render,

    #[error(transparent)]
    Sample(#[from] SampleError),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Layout {
    /// CT, segmentation, overlay and MR in a 2x2 grid.
    WithMr,
    /// CT, segmentation and overlay in a row; the MR volume has only
    /// `mr_slices` slices along the plane.
    WithoutMr { mr_slices: usize },
}

#[derive(Debug)]
pub struct Figure {
    pub image: RgbImage,
    pub layout: Layout,
}

impl Figure {
    pub fn save(&self, path: impl AsRef<std::path::Path>) -> Result<(), PlotError> {
        self.image.save(path.as_ref())?;
        Ok(())
    }
}

/// Render `slice_number` of an already loaded sample along `plane`.
pub fn plot_sample(
    sample: &Sample,
    plane: Plane,
    slice_number: usize,
    overlay_alpha: f32,
) -> Result<Figure, PlotError> {
    let count = sample.ct.slice_count(plane);
    let (Some(ct), Some(segmentation)) = (
        sample.ct.get_slice_from_axis(slice_number, plane),
        sample.segmentation.get_slice_from_axis(slice_number, plane),
    ) else {
        return Err(PlotError::SliceOutOfRange {
            index: slice_number,
            count: count.min(sample.segmentation.slice_count(plane)),
        });
    };

    match sample.mr.get_slice_from_axis(slice_number, plane) {
        Some(mr) => Ok(Figure {
            image: plot_all(&ct, &mr, &segmentation, overlay_alpha)?,
            layout: Layout::WithMr,
        }),
        None => {
            let mr_slices = sample.mr.slice_count(plane);
            log::info!(
                "The slice number is too high for the MR image. If you want to plot the MR image, \
                 please choose a slice number lower than {mr_slices}"
            );
            Ok(Figure {
                image: plot_ct_label(&ct, &segmentation, overlay_alpha)?,
                layout: Layout::WithoutMr { mr_slices },
            })
        }
    }
}

/// Load a case and render one slice; `plane` is `a`, `c` or `s`.
pub fn plot_sample_from_dir(
    loader: &SampleLoader,
    plane: &str,
    case_number: u32,
    slice_number: usize,
) -> Result<Figure, PlotError> {
    let plane: Plane = plane.parse()?;
    let sample = loader.load(case_number)?;
    plot_sample(&sample, plane, slice_number, DEFAULT_OVERLAY_ALPHA)
}

/// 2x2 grid: CT, segmentation / CT + segmentation, MR.
pub fn plot_all(
    ct: &ArrayView2<'_, f32>,
    mr: &ArrayView2<'_, f32>,
    segmentation: &ArrayView2<'_, u8>,
    overlay_alpha: f32,
) -> Result<RgbImage, PlotError> {
    let [ct, segmentation, overlay] = base_panels(ct, segmentation, overlay_alpha)?;
    let mr = slice_to_image(mr, Colormap::Gray).ok_or(PlotError::Render)?;
    compose(&[&ct, &segmentation, &overlay, &mr], 2)
}

/// Single row: CT, segmentation, CT + segmentation.
pub fn plot_ct_label(
    ct: &ArrayView2<'_, f32>,
    segmentation: &ArrayView2<'_, u8>,
    overlay_alpha: f32,
) -> Result<RgbImage, PlotError> {
    let [ct, segmentation, overlay] = base_panels(ct, segmentation, overlay_alpha)?;
    compose(&[&ct, &segmentation, &overlay], 3)
}

fn base_panels(
    ct: &ArrayView2<'_, f32>,
    segmentation: &ArrayView2<'_, u8>,
    overlay_alpha: f32,
) -> Result<[RgbImage; 3], PlotError> {
    if ct.dim() != segmentation.dim() {
        return Err(PlotError::ShapeMismatch {
            ct: ct.dim(),
            segmentation: segmentation.dim(),
        });
    }
    Ok([
        slice_to_image(ct, Colormap::Gray).ok_or(PlotError::Render)?,
        slice_to_image(segmentation, Colormap::Jet).ok_or(PlotError::Render)?,
        overlay_to_image(ct, segmentation, overlay_alpha).ok_or(PlotError::Render)?,
    ])
}

/// Lay panels out row-major in a grid of `columns`, each cell sized to the
/// largest panel.
fn compose(panels: &[&RgbImage], columns: usize) -> Result<RgbImage, PlotError> {
    let cell_width = panels.iter().map(|p| p.width()).max().unwrap_or(0);
    let cell_height = panels.iter().map(|p| p.height()).max().unwrap_or(0);
    let rows = panels.len().div_ceil(columns) as u32;
    let columns = columns as u32;

    let width = columns * cell_width + (columns + 1) * PADDING;
    let height = rows * cell_height + (rows + 1) * PADDING;
    let mut canvas = ImageBuffer::from_pixel(width, height, BACKGROUND);

    for (i, panel) in panels.iter().enumerate() {
        let i = i as u32;
        let x = PADDING + (i % columns) * (cell_width + PADDING);
        let y = PADDING + (i / columns) * (cell_height + PADDING);
        canvas.copy_from(*panel, x, y)?;
    }
    Ok(canvas)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::Volume;
    use ndarray::Array3;

    fn sample(mr_depth: usize) -> Sample {
        Sample {
            ct: Volume::new(Array3::from_shape_fn((4, 3, 5), |(x, y, z)| {
                (x + y + z) as f32
            })),
            mr: Volume::new(Array3::ones((4, 3, mr_depth))),
            segmentation: Volume::new(Array3::from_shape_fn((4, 3, 5), |(x, _, _)| {
                (x % 3) as u8
            })),
        }
    }

    #[test]
    fn four_panels_when_mr_slice_exists() {
        let figure = plot_sample(&sample(5), Plane::Axial, 2, 0.5).unwrap();
        assert_eq!(figure.layout, Layout::WithMr);
        // Two cells of 4x3 per row, two rows.
        assert_eq!(figure.image.dimensions(), (2 * 4 + 3 * PADDING, 2 * 3 + 3 * PADDING));
    }

    #[test]
    fn falls_back_without_mr_slice() {
        let figure = plot_sample(&sample(2), Plane::Axial, 3, 0.5).unwrap();
        assert_eq!(figure.layout, Layout::WithoutMr { mr_slices: 2 });
        assert_eq!(figure.image.dimensions(), (3 * 4 + 4 * PADDING, 3 + 2 * PADDING));
    }

    #[test]
    fn rejects_out_of_range_slice() {
        let err = plot_sample(&sample(5), Plane::Sagittal, 4, 0.5).unwrap_err();
        assert!(matches!(
            err,
            PlotError::SliceOutOfRange { index: 4, count: 4 }
        ));
    }

    #[test]
    fn rejects_unknown_plane() {
        let err = plot_sample_from_dir(&SampleLoader::default(), "q", 1, 0).unwrap_err();
        assert!(matches!(err, PlotError::InvalidPlane(_)));
    }
}
