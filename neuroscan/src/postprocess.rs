use crate::{Channel, LabelVolume, ScaleVector};
use itertools::{iproduct, Itertools};
use log::debug;
use ndarray::{Array3, ArrayView3, ArrayViewMut3, Axis};
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};

/// Erosion works on independent slabs of this many Z planes.
pub const EROSION_SLAB_DEPTH: usize = 1;

/// Clean raw model labels: erode if the channel asks for it, then drop
/// objects smaller than the channel's minimum volume.
pub fn clean(raw: LabelVolume, channel: Channel, scale: &ScaleVector) -> LabelVolume {
    let profile = channel.profile();
    let mut labels = match profile.erosion_radius {
        Some(radius) => {
            let mut eroded = erode_labels(&raw, radius, EROSION_SLAB_DEPTH);
            let dropped = retain_largest_fragments(&mut eroded);
            if dropped > 0 {
                debug!("Erosion split {dropped} label(s), kept the largest fragment of each");
            }
            eroded
        }
        None => raw,
    };
    let min_size = profile.min_object_volume_voxels(scale);
    let removed = remove_small_objects(&mut labels, min_size);
    debug!("Removed {removed} {channel} object(s) below {min_size:.1} voxels");
    labels
}

/// Offsets of a 3D ball, `dz² + dy² + dx² <= radius²`.
pub fn ball(radius: usize) -> Vec<[isize; 3]> {
    let r = radius as isize;
    iproduct!(-r..=r, -r..=r, -r..=r)
        .filter(|&(dz, dy, dx)| dz * dz + dy * dy + dx * dx <= r * r)
        .map(|(dz, dy, dx)| [dz, dy, dx])
        .collect()
}

/// Shrink every label independently with a ball of `radius`.
///
/// The volume is cut into slabs of `slab_depth` planes along Z, each slab is
/// eroded on its own in parallel. Slabs always span the full Y/X extent so
/// the structuring element is never clipped in-plane. A voxel keeps its label
/// only if every neighbour under the ball that lies inside the slab carries
/// the same label.
pub fn erode_labels(labels: &LabelVolume, radius: usize, slab_depth: usize) -> LabelVolume {
    let footprint = ball(radius);
    let mut eroded = Array3::zeros(labels.raw_dim());
    labels
        .axis_chunks_iter(Axis(0), slab_depth.max(1))
        .zip(eroded.axis_chunks_iter_mut(Axis(0), slab_depth.max(1)))
        .collect::<Vec<_>>()
        .into_par_iter()
        .for_each(|(slab, mut out)| erode_slab(&slab, &mut out, &footprint));
    eroded
}

fn erode_slab(
    slab: &ArrayView3<'_, u32>,
    out: &mut ArrayViewMut3<'_, u32>,
    footprint: &[[isize; 3]],
) {
    let (nz, ny, nx) = slab.dim();
    let bounds = [nz as isize, ny as isize, nx as isize];
    for ((z, y, x), &label) in slab.indexed_iter() {
        if label == 0 {
            continue;
        }
        let keep = footprint.iter().all(|offset| {
            let at = [
                z as isize + offset[0],
                y as isize + offset[1],
                x as isize + offset[2],
            ];
            if at.iter().zip(bounds).any(|(&p, n)| p < 0 || p >= n) {
                return true;
            }
            slab[[at[0] as usize, at[1] as usize, at[2] as usize]] == label
        });
        if keep {
            out[[z, y, x]] = label;
        }
    }
}

/// Reset every fragment of a label except its largest 26-connected piece,
/// so that no id spans two disjoint components. Returns the number of
/// fragments dropped.
pub fn retain_largest_fragments(labels: &mut LabelVolume) -> usize {
    let (nz, ny, nx) = labels.dim();
    let neighbours: Vec<[isize; 3]> = iproduct!(-1isize..=1, -1isize..=1, -1isize..=1)
        .filter(|&offset| offset != (0, 0, 0))
        .map(|(dz, dy, dx)| [dz, dy, dx])
        .collect();

    // component index + 1 per voxel, 0 for background
    let mut component = Array3::<u32>::zeros(labels.raw_dim());
    let mut sizes: Vec<usize> = Vec::new();
    let mut largest: HashMap<u32, u32> = HashMap::new();
    let mut stack = Vec::new();

    for start in iproduct!(0..nz, 0..ny, 0..nx) {
        let label = labels[start];
        if label == 0 || component[start] != 0 {
            continue;
        }
        sizes.push(0);
        let id = sizes.len() as u32;
        component[start] = id;
        stack.push(start);
        while let Some((z, y, x)) = stack.pop() {
            sizes[id as usize - 1] += 1;
            for offset in &neighbours {
                let (sz, sy, sx) = (
                    z as isize + offset[0],
                    y as isize + offset[1],
                    x as isize + offset[2],
                );
                if sz < 0 || sy < 0 || sx < 0 {
                    continue;
                }
                let next = (sz as usize, sy as usize, sx as usize);
                if next.0 >= nz || next.1 >= ny || next.2 >= nx {
                    continue;
                }
                if labels[next] == label && component[next] == 0 {
                    component[next] = id;
                    stack.push(next);
                }
            }
        }
        largest
            .entry(label)
            .and_modify(|best| {
                if sizes[id as usize - 1] > sizes[*best as usize - 1] {
                    *best = id;
                }
            })
            .or_insert(id);
    }

    let mut dropped = HashSet::new();
    for (label, &comp) in labels.iter_mut().zip(component.iter()) {
        let id = *label;
        if id != 0 && largest[&id] != comp {
            dropped.insert(comp);
            *label = 0;
        }
    }
    dropped.len()
}

/// Reset every label with fewer than `min_size` voxels to background in a
/// single pass. Other voxels are left untouched. Returns the number of
/// labels removed.
pub fn remove_small_objects(labels: &mut LabelVolume, min_size: f64) -> usize {
    let too_small: HashSet<u32> = labels
        .iter()
        .filter(|&&label| label != 0)
        .counts()
        .into_iter()
        .filter(|&(_, count)| (count as f64) < min_size)
        .map(|(&label, _)| label)
        .collect();
    if !too_small.is_empty() {
        labels.mapv_inplace(|label| if too_small.contains(&label) { 0 } else { label });
    }
    too_small.len()
}
