use crate::{Channel, ScaleVector, Volume};
use ndarray::Axis;

/// Kernels are cut off at this many standard deviations.
const TRUNCATE: f64 = 4.0;

/// Smooth `volume` with the channel's physical blur radius converted to
/// voxels along each axis.
///
/// Z spacing is usually several times coarser than X/Y, so the same radius
/// in microns covers fewer voxels along Z.
pub fn smooth(volume: &Volume, channel: Channel, scale: &ScaleVector) -> Volume {
    let sigma = channel.profile().voxel_sigma(scale);
    gaussian_filter(volume, sigma)
}

/// Separable Gaussian filter with per-axis sigma in voxels, axis order
/// (Z, Y, X). Samples beyond the border repeat the nearest edge sample.
pub fn gaussian_filter(volume: &Volume, sigma: [f64; 3]) -> Volume {
    let mut smoothed = volume.clone();
    for (axis, &axis_sigma) in sigma.iter().enumerate() {
        if axis_sigma > 0.0 {
            convolve_axis(&mut smoothed, Axis(axis), &gaussian_kernel(axis_sigma));
        }
    }
    smoothed
}

/// Normalized 1D Gaussian of radius `floor(TRUNCATE * sigma + 0.5)`.
fn gaussian_kernel(sigma: f64) -> Vec<f32> {
    let radius = (TRUNCATE * sigma + 0.5) as isize;
    let weights: Vec<f64> = (-radius..=radius)
        .map(|offset| (-0.5 * (offset as f64 / sigma).powi(2)).exp())
        .collect();
    let total: f64 = weights.iter().sum();
    weights.iter().map(|w| (w / total) as f32).collect()
}

fn convolve_axis(volume: &mut Volume, axis: Axis, kernel: &[f32]) {
    let radius = (kernel.len() / 2) as isize;
    let mut line = Vec::with_capacity(volume.len_of(axis));
    for mut lane in volume.lanes_mut(axis) {
        let len = lane.len() as isize;
        line.clear();
        line.extend(lane.iter().copied());
        for (i, out) in lane.iter_mut().enumerate() {
            *out = kernel
                .iter()
                .enumerate()
                .map(|(k, &w)| {
                    let j = (i as isize + k as isize - radius).clamp(0, len - 1);
                    w * line[j as usize]
                })
                .sum();
        }
    }
}
