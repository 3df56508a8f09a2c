//! Dominant color extraction from album art
//!
//! Clusters a sparse sample of mid-lightness pixels with k-means and ranks
//! the clusters so large, bright regions come first. Seeding is
//! deterministic: identical pixels always yield identical palettes.

use tracing::{debug, trace};
use tw_common::model::PALETTE_LEN;
use tw_common::{ColorPalette, Rgb};

/// Only every Nth pixel is considered
pub const SAMPLE_STRIDE: usize = 80;

/// k for k-means; one cluster per palette slot
pub const CLUSTER_COUNT: usize = PALETTE_LEN;

/// Hard cap on k-means refinement passes
pub const MAX_ITERATIONS: usize = 20;

const BYTES_PER_PIXEL: usize = 4;

/// Near-black and near-white samples make dull gradients
const MIN_LIGHTNESS: f64 = 0.1;
const MAX_LIGHTNESS: f64 = 0.9;

const BRIGHTNESS_BOOST: f64 = 1.1;

type Point = [f64; 3];

#[derive(Debug, Clone, Copy)]
struct Cluster {
    centroid: Point,
    population: usize,
}

impl Cluster {
    fn score(&self) -> f64 {
        self.population as f64 * norm(&self.centroid)
    }
}

/// Decode encoded art (JPEG, PNG, WebP, GIF) and extract its palette
///
/// Returns `None` when the bytes do not decode; callers fall back to
/// [`ColorPalette::DEFAULT`].
pub fn palette_from_image_bytes(bytes: &[u8]) -> Option<ColorPalette> {
    let decoded = match image::load_from_memory(bytes) {
        Ok(decoded) => decoded,
        Err(e) => {
            debug!(error = %e, len = bytes.len(), "Album art could not be decoded");
            return None;
        }
    };

    let rgba = decoded.to_rgba8();
    extract_palette(rgba.as_raw(), rgba.width(), rgba.height())
}

/// Extract five ranked colors from a raw RGBA buffer
///
/// `None` for degenerate input (zero-sized image, buffer shorter than the
/// stated dimensions). Fewer than five usable samples yields the default
/// palette rather than `None`.
pub fn extract_palette(rgba: &[u8], width: u32, height: u32) -> Option<ColorPalette> {
    let pixel_count = (width as usize).checked_mul(height as usize)?;
    let byte_len = pixel_count.checked_mul(BYTES_PER_PIXEL)?;
    if pixel_count == 0 || rgba.len() < byte_len {
        debug!(width, height, len = rgba.len(), "Degenerate pixel buffer");
        return None;
    }

    let candidates = sample_candidates(&rgba[..byte_len]);
    if candidates.len() < CLUSTER_COUNT {
        debug!(candidates = candidates.len(), "Too few usable pixels, using default palette");
        return Some(ColorPalette::DEFAULT);
    }

    let mut clusters = kmeans(&candidates);
    // Stable sort keeps seed order among equal scores
    clusters.sort_by(|a, b| b.score().total_cmp(&a.score()));

    let mut colors = [Rgb::gray(0); PALETTE_LEN];
    for (slot, cluster) in colors.iter_mut().zip(&clusters) {
        *slot = boost(&cluster.centroid);
    }
    Some(ColorPalette::new(colors))
}

fn sample_candidates(rgba: &[u8]) -> Vec<Point> {
    rgba.chunks_exact(BYTES_PER_PIXEL)
        .step_by(SAMPLE_STRIDE)
        .filter_map(|px| {
            let (r, g, b) = (px[0], px[1], px[2]);
            let max = r.max(g).max(b);
            let min = r.min(g).min(b);
            let lightness = (f64::from(max) + f64::from(min)) / 510.0;

            (lightness > MIN_LIGHTNESS && lightness < MAX_LIGHTNESS)
                .then(|| [f64::from(r), f64::from(g), f64::from(b)])
        })
        .collect()
}

fn kmeans(points: &[Point]) -> Vec<Cluster> {
    let mut centroids: Vec<Point> = points[..CLUSTER_COUNT].to_vec();
    // Everything starts in cluster 0; a first pass that agrees keeps the seeds
    let mut labels: Vec<usize> = vec![0; points.len()];

    for iteration in 0..MAX_ITERATIONS {
        let assigned: Vec<usize> = points.iter().map(|p| nearest(&centroids, p)).collect();
        if assigned == labels {
            trace!(iteration, "k-means converged");
            break;
        }
        centroids = recompute(&centroids, points, &assigned);
        labels = assigned;
    }

    let mut population = [0usize; CLUSTER_COUNT];
    for &label in &labels {
        population[label] += 1;
    }

    centroids
        .into_iter()
        .zip(population)
        .map(|(centroid, population)| Cluster { centroid, population })
        .collect()
}

/// Index of the closest centroid; ties resolve to the lowest index
fn nearest(centroids: &[Point], point: &Point) -> usize {
    let mut best = 0;
    let mut best_dist = f64::INFINITY;
    for (i, centroid) in centroids.iter().enumerate() {
        let dist = distance(centroid, point);
        if dist < best_dist {
            best_dist = dist;
            best = i;
        }
    }
    best
}

/// Mean of each cluster; an empty cluster keeps its previous centroid
fn recompute(previous: &[Point], points: &[Point], labels: &[usize]) -> Vec<Point> {
    let mut sums = vec![[0.0f64; 3]; previous.len()];
    let mut counts = vec![0usize; previous.len()];

    for (point, &label) in points.iter().zip(labels) {
        for (sum, value) in sums[label].iter_mut().zip(point) {
            *sum += value;
        }
        counts[label] += 1;
    }

    previous
        .iter()
        .zip(sums.iter().zip(&counts))
        .map(|(old, (sum, &count))| {
            if count == 0 {
                *old
            } else {
                let n = count as f64;
                [sum[0] / n, sum[1] / n, sum[2] / n]
            }
        })
        .collect()
}

fn distance(a: &Point, b: &Point) -> f64 {
    let dr = a[0] - b[0];
    let dg = a[1] - b[1];
    let db = a[2] - b[2];
    (dr * dr + dg * dg + db * db).sqrt()
}

fn norm(p: &Point) -> f64 {
    (p[0] * p[0] + p[1] * p[1] + p[2] * p[2]).sqrt()
}

fn boost(centroid: &Point) -> Rgb {
    let channel = |value: f64| -> u8 {
        (value.round() * BRIGHTNESS_BOOST).min(255.0).round() as u8
    };
    Rgb::new(channel(centroid[0]), channel(centroid[1]), channel(centroid[2]))
}
