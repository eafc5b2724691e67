use crate::errors::AnalysisError;
use crate::grid::Grid;
use crate::progress::Bar;
use atomic_counter::{AtomicCounter, RelaxedCounter};
use crossbeam_utils::thread;
use std::sync::atomic::{AtomicIsize, Ordering};

/// A local maximum of the topological field.
#[derive(Debug, Clone)]
pub struct Attractor {
    /// Index into the attractor list; ids are assigned in flat-voxel order
    /// so they are stable between runs.
    pub id: usize,
    /// The flat index of the maximum voxel.
    pub voxel: isize,
    /// The field value at the maximum.
    pub value: f64,
    /// Number of voxels draining to this maximum.
    pub basin_voxels: usize,
}

/// The result of basin segmentation: one attractor id per voxel plus the
/// enumerated attractors. A pure function of the grid.
pub struct Segmentation {
    pub labels: Vec<usize>,
    pub attractors: Vec<Attractor>,
}

/// One steepest-ascent step from p.
///
/// Takes the neighbour with the largest positive distance-weighted gradient,
/// earlier neighbours winning ties. On a plateau, where no gradient is
/// positive, the walk defers to the lowest-indexed neighbour holding a
/// bit-identical value; indices strictly decrease along such a walk so it
/// terminates. Returns p itself when p is a maximum under both rules.
pub fn ascent_step(grid: &Grid, p: isize) -> isize {
    let value = grid[p];
    let neighbours = grid.neighbours(p);
    let mut best = p;
    let mut steepest = 0.;
    for (i, q) in neighbours.iter().enumerate() {
        let gradient = (grid[*q] - value) / grid.neighbour_distances[i];
        if gradient > steepest {
            steepest = gradient;
            best = *q;
        }
    }
    if best != p {
        return best;
    }
    let mut lowest = p;
    for q in neighbours {
        if grid[q].to_bits() == value.to_bits() && q < lowest {
            lowest = q;
        }
    }
    lowest
}

/// Partitions every voxel of the grid into the basin of the maximum its
/// ascent path terminates at.
///
/// Runs two passes over the voxels, both distributed over scoped worker
/// threads pulling indices from a shared counter. The first finds the
/// maxima and seeds the shared label array, the second walks ascent paths
/// until they hit a labelled voxel and then labels the whole path. The
/// step rule is deterministic, so every thread that reaches a voxel
/// computes the same label and the relaxed stores cannot race to different
/// values.
pub fn segment(
    grid: &Grid,
    threads: usize,
    progress: &Bar,
) -> Result<Segmentation, AnalysisError> {
    let total = grid.size.total;
    let first = grid.values()[0];
    if grid.values().iter().all(|v| v.to_bits() == first.to_bits()) {
        return Err(AnalysisError::DegenerateAttractors {
            value: first,
            total,
        });
    }
    let threads = threads.max(1);
    // pass one: locate the maxima
    let counter = RelaxedCounter::new(0);
    let mut maxima = thread::scope(|s| {
        let spawned = (0..threads)
            .map(|_| {
                s.spawn(|_| {
                    let mut local = Vec::new();
                    loop {
                        let p = counter.inc();
                        if p >= total {
                            break local;
                        }
                        let p = p as isize;
                        if ascent_step(grid, p) == p {
                            local.push(p);
                        }
                    }
                })
            })
            .collect::<Vec<_>>();
        spawned
            .into_iter()
            .flat_map(|t| t.join().expect("maxima thread panicked"))
            .collect::<Vec<isize>>()
    })
    .expect("failed to join maxima search threads");
    maxima.sort_unstable();

    let labels: Vec<AtomicIsize> = (0..total).map(|_| AtomicIsize::new(-1)).collect();
    for (id, p) in maxima.iter().enumerate() {
        labels[*p as usize].store(id as isize, Ordering::Relaxed);
    }
    // pass two: walk each voxel uphill until a labelled voxel is found and
    // label the path behind it
    let counter = RelaxedCounter::new(0);
    thread::scope(|s| {
        for _ in 0..threads {
            s.spawn(|_| {
                let mut path = Vec::new();
                loop {
                    let p = counter.inc();
                    if p >= total {
                        break;
                    }
                    let mut pn = p as isize;
                    path.clear();
                    let label = loop {
                        let known = labels[pn as usize].load(Ordering::Relaxed);
                        if known >= 0 {
                            break known;
                        }
                        path.push(pn);
                        pn = ascent_step(grid, pn);
                    };
                    for visited in &path {
                        labels[*visited as usize].store(label, Ordering::Relaxed);
                    }
                    progress.tick();
                }
            });
        }
    })
    .expect("failed to join ascent threads");

    let labels: Vec<usize> = labels
        .into_iter()
        .map(|l| l.into_inner() as usize)
        .collect();
    let mut attractors: Vec<Attractor> = maxima
        .iter()
        .enumerate()
        .map(|(id, p)| Attractor {
            id,
            voxel: *p,
            value: grid[*p],
            basin_voxels: 0,
        })
        .collect();
    for label in &labels {
        attractors[*label].basin_voxels += 1;
    }
    Ok(Segmentation { labels, attractors })
}
