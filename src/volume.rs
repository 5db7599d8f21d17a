use crate::enums::Colormap;
use crate::enums::Plane;
use crate::nrrd::Sample;

use image::ImageBuffer;
use image::Rgb;
use ndarray::Array3;
use ndarray::ArrayView2;
use ndarray::ArrayView3;
use ndarray::Axis;
use rayon::prelude::*;

/// An in-memory volume indexed `[x, y, z]`, as stored in the NRRD file.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Volume<T> {
    pub data: Array3<T>,
}

impl<T: Sample> Volume<T> {
    pub fn new(data: Array3<T>) -> Self {
        Self { data }
    }

    /// Get the dimensions of the volume (x, y, z)
    pub fn dim(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    /// Get a reference to the underlying data
    pub fn data(&self) -> &Array3<T> {
        &self.data
    }

    pub fn into_data(self) -> Array3<T> {
        self.data
    }

    /// View with the slicing axis first and rows/columns in display order.
    ///
    /// Axial is `(z, y, x)`. Sagittal `(x, z, y)` and coronal `(y, z, x)`
    /// have their row axis flipped so the head is at the top.
    pub fn oriented(&self, plane: Plane) -> ArrayView3<'_, T> {
        let view = self.data.view();
        match plane {
            Plane::Axial => view.permuted_axes([2, 1, 0]),
            Plane::Sagittal => {
                let mut view = view.permuted_axes([0, 2, 1]);
                view.invert_axis(Axis(1));
                view
            }
            Plane::Coronal => {
                let mut view = view.permuted_axes([1, 2, 0]);
                view.invert_axis(Axis(1));
                view
            }
        }
    }

    /// Number of slices along `plane`.
    pub fn slice_count(&self, plane: Plane) -> usize {
        let (x, y, z) = self.dim();
        match plane {
            Plane::Axial => z,
            Plane::Sagittal => x,
            Plane::Coronal => y,
        }
    }

    pub fn is_valid_index(&self, index: usize, plane: Plane) -> bool {
        index < self.slice_count(plane)
    }

    pub fn get_slice_from_axis(&self, index: usize, plane: Plane) -> Option<ArrayView2<'_, T>> {
        if !self.is_valid_index(index, plane) {
            return None;
        }
        Some(self.oriented(plane).index_axis_move(Axis(0), index))
    }
}

/// Per-slice min/max normalization into `[0, 1]`.
fn normalize<T: Sample>(slice: &ArrayView2<'_, T>) -> Vec<f32> {
    let values: Vec<f64> = slice.iter().map(|v| v.to_f64()).collect();
    let (min, max) = values
        .par_iter()
        .fold(
            || (f64::INFINITY, f64::NEG_INFINITY),
            |(lo, hi), &v| (lo.min(v), hi.max(v)),
        )
        .reduce(
            || (f64::INFINITY, f64::NEG_INFINITY),
            |a, b| (a.0.min(b.0), a.1.max(b.1)),
        );
    let range = max - min;
    values
        .into_par_iter()
        .map(|v| {
            if range > 0.0 && range.is_finite() {
                ((v - min) / range) as f32
            } else {
                0.0
            }
        })
        .collect()
}

/// Render a slice with a colormap, rows top to bottom.
pub fn slice_to_image<T: Sample>(
    slice: &ArrayView2<'_, T>,
    colormap: Colormap,
) -> Option<ImageBuffer<Rgb<u8>, Vec<u8>>> {
    let (height, width) = slice.dim();
    let pixel_data: Vec<u8> = normalize(slice)
        .into_par_iter()
        .flat_map_iter(|t| colormap.rgb(t))
        .collect();
    ImageBuffer::from_raw(width as u32, height as u32, pixel_data)
}

/// Blend a colormapped `overlay` slice onto a gray `base` slice.
pub fn overlay_to_image<B: Sample, O: Sample>(
    base: &ArrayView2<'_, B>,
    overlay: &ArrayView2<'_, O>,
    alpha: f32,
) -> Option<ImageBuffer<Rgb<u8>, Vec<u8>>> {
    if base.dim() != overlay.dim() {
        return None;
    }
    let (height, width) = base.dim();
    let alpha = alpha.clamp(0.0, 1.0);
    let pixel_data: Vec<u8> = normalize(base)
        .into_par_iter()
        .zip(normalize(overlay).into_par_iter())
        .flat_map_iter(|(b, o)| {
            let under = Colormap::Gray.rgb(b);
            let over = Colormap::Jet.rgb(o);
            (0..3).map(move |c| {
                (f32::from(under[c]) * (1.0 - alpha) + f32::from(over[c]) * alpha).round() as u8
            })
        })
        .collect();
    ImageBuffer::from_raw(width as u32, height as u32, pixel_data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    fn ramp() -> Volume<u8> {
        // x = 2, y = 3, z = 4; value encodes the index.
        Volume::new(Array3::from_shape_fn((2, 3, 4), |(x, y, z)| {
            (x * 100 + y * 10 + z) as u8
        }))
    }

    #[test]
    fn counts_slices_per_plane() {
        let volume = ramp();
        assert_eq!(volume.slice_count(Plane::Axial), 4);
        assert_eq!(volume.slice_count(Plane::Coronal), 3);
        assert_eq!(volume.slice_count(Plane::Sagittal), 2);
        assert!(volume.get_slice_from_axis(4, Plane::Axial).is_none());
    }

    #[test]
    fn axial_slice_is_y_by_x() {
        let volume = ramp();
        let slice = volume.get_slice_from_axis(3, Plane::Axial).unwrap();
        assert_eq!(slice.dim(), (3, 2));
        assert_eq!(slice[[2, 1]], 123);
    }

    #[test]
    fn sagittal_rows_are_flipped() {
        let volume = ramp();
        let slice = volume.get_slice_from_axis(1, Plane::Sagittal).unwrap();
        assert_eq!(slice.dim(), (4, 3));
        // First row is the highest z.
        assert_eq!(slice[[0, 0]], 103);
        assert_eq!(slice[[3, 2]], 120);
    }

    #[test]
    fn coronal_rows_are_flipped() {
        let volume = ramp();
        let slice = volume.get_slice_from_axis(2, Plane::Coronal).unwrap();
        assert_eq!(slice.dim(), (4, 2));
        assert_eq!(slice[[0, 1]], 123);
        assert_eq!(slice[[3, 0]], 20);
    }

    #[test]
    fn gray_image_spans_full_range() {
        let volume = ramp();
        let slice = volume.get_slice_from_axis(0, Plane::Axial).unwrap();
        let image = slice_to_image(&slice, Colormap::Gray).unwrap();
        assert_eq!(image.dimensions(), (2, 3));
        assert_eq!(image.get_pixel(0, 0).0, [0, 0, 0]);
        assert_eq!(image.get_pixel(1, 2).0, [255, 255, 255]);
    }

    #[test]
    fn overlay_requires_matching_shapes() {
        let volume = ramp();
        let axial = volume.get_slice_from_axis(0, Plane::Axial).unwrap();
        let coronal = volume.get_slice_from_axis(0, Plane::Coronal).unwrap();
        assert!(overlay_to_image(&axial, &coronal, 0.5).is_none());
        assert!(overlay_to_image(&axial, &axial, 0.5).is_some());
    }
}
