//! Provides the implementation for (sort) k-means over sampled RGB pixels

use crate::PixelSamples;
use palette::Srgb;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use std::cmp::Reverse;

/// Squared Euclidean distance between two colors in RGB space
#[allow(clippy::cast_sign_loss)]
fn squared_distance(x: Srgb<u8>, y: Srgb<u8>) -> u32 {
	let dr = i32::from(x.red) - i32::from(y.red);
	let dg = i32::from(x.green) - i32::from(y.green);
	let db = i32::from(x.blue) - i32::from(y.blue);
	// channel deltas are within -255..=255, so the sum is at most 3 * 255^2
	(dr * dr + dg * dg + db * db) as u32
}

/// Bookkeeping for each k-means data point
struct PointData {
	/// Center assignment for this data point
	assignment: Vec<u8>,
	/// Squared distance from each data point to its nearest centroid, used by k-means++ seeding
	weight: Vec<u32>,
}

impl PointData {
	/// Create a [`PointData`] with the given number of data points
	fn new(n: u32) -> Self {
		let n = n as usize;
		Self {
			assignment: vec![0; n],
			weight: vec![u32::MAX; n],
		}
	}

	/// Reset data for the next k-means trial
	fn reset(&mut self) {
		// assignments are corrected every iteration
		self.weight.fill(u32::MAX);
	}
}

/// Data for each center/centroid
struct CenterData {
	/// The centroid point
	centroid: Vec<Srgb<u8>>,
	/// Per-channel sum over all data points in this center
	sum: Vec<[i64; 3]>,
	/// Number of pixels in this center
	count: Vec<u32>,
}

impl CenterData {
	/// Create a [`CenterData`] with the given number of centers
	fn new(k: u8) -> Self {
		let k = usize::from(k);
		Self {
			centroid: Vec::new(),
			sum: vec![[0; 3]; k],
			count: vec![0; k],
		}
	}

	/// Reset data for the next k-means trial
	fn reset(&mut self) {
		self.centroid.clear();
		self.sum.fill([0; 3]);
		self.count.fill(0);
	}
}

/// Holds all the state used by k-means
struct KmeansState {
	/// Data for each center
	centers: CenterData,
	/// One fourth of the squared distance between each pair of centers
	distances: Vec<(u8, u32)>,
	/// Data for each point
	points: PointData,
}

impl KmeansState {
	/// Initialize a new [`KmeansState`] with `k` centers and `n` data points
	fn new(k: u8, n: u32) -> Self {
		Self {
			centers: CenterData::new(k),
			distances: vec![(0, 0); usize::from(k) * usize::from(k)],
			points: PointData::new(n),
		}
	}
}

/// Parameters controlling dominant color extraction
///
/// The defaults are tuned for grid-sampled product photos:
/// up to 5 clusters, a 15 iteration cap, convergence once the centroids move
/// by at most one channel step in total, and a 2% population floor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterOptions {
	/// Number of independent k-means trials to run, keeping the lowest-variance result
	pub trials: u32,
	/// Maximum number of clusters to find
	pub k: u8,
	/// Maximum number of iterations per trial
	pub max_iter: u32,
	/// Convergence cutoff: a trial stops once the summed absolute per-channel
	/// centroid movement of an iteration is at most this value
	pub tolerance: u32,
	/// Clusters whose share of the samples is at most this value are dropped from the result
	pub min_weight: f32,
	/// Seed for the random number generator behind centroid seeding
	///
	/// A fixed seed gives identical output on every run; callers wanting varied
	/// results supply a fresh seed per call.
	pub seed: u64,
}

impl ClusterOptions {
	/// Create options with the default parameters
	#[must_use]
	pub const fn new() -> Self {
		Self {
			trials: 1,
			k: 5,
			max_iter: 15,
			tolerance: 1,
			min_weight: 0.02,
			seed: 0,
		}
	}

	/// Set the maximum number of clusters
	#[must_use]
	pub const fn with_k(mut self, k: u8) -> Self {
		self.k = k;
		self
	}

	/// Set the number of k-means trials
	#[must_use]
	pub const fn with_trials(mut self, trials: u32) -> Self {
		self.trials = trials;
		self
	}

	/// Set the maximum number of iterations per trial
	#[must_use]
	pub const fn with_max_iter(mut self, max_iter: u32) -> Self {
		self.max_iter = max_iter;
		self
	}

	/// Set the convergence cutoff on total centroid movement
	#[must_use]
	pub const fn with_tolerance(mut self, tolerance: u32) -> Self {
		self.tolerance = tolerance;
		self
	}

	/// Set the cluster weight floor
	#[must_use]
	pub const fn with_min_weight(mut self, min_weight: f32) -> Self {
		self.min_weight = min_weight;
		self
	}

	/// Set the random number generator seed
	#[must_use]
	pub const fn with_seed(mut self, seed: u64) -> Self {
		self.seed = seed;
		self
	}
}

impl Default for ClusterOptions {
	fn default() -> Self {
		Self::new()
	}
}

/// A cluster of similar pixels, reported as its centroid color and its share of the samples
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DominantColor {
	/// The centroid of the cluster
	pub color: Srgb<u8>,
	/// The cluster population divided by the total number of samples, in `(0.0, 1.0]`
	pub weight: f32,
	/// The number of pixels in the cluster
	pub count: u32,
}

/// Result from running k-means over a set of pixel samples
#[derive(Debug, Clone)]
pub struct Extraction {
	/// Dominant colors above the weight floor, sorted by descending weight
	pub colors: Vec<DominantColor>,
	/// Variance achieved by the winning trial
	///
	/// A lower variance indicates a higher accuracy.
	pub variance: f64,
	/// Number of elapsed iterations in the winning trial
	pub iterations: u32,
	/// Total number of pixels behind the samples
	pub samples: u32,
}

impl Extraction {
	/// Create an empty result, representing that no k-means trials were able to be run
	const fn empty() -> Self {
		Self {
			colors: Vec::new(),
			variance: 0.0,
			iterations: 0,
			samples: 0,
		}
	}
}

/// Choose the starting centroids using the k-means++ algorithm
///
/// The first centroid is sampled uniformly over pixels (so counts weigh in),
/// and each next centroid is sampled with probability proportional to
/// count times the squared distance to its nearest existing centroid.
fn kmeans_plus_plus(k: u8, rng: &mut impl Rng, samples: &PixelSamples, centroids: &mut Vec<Srgb<u8>>, weights: &mut [u32]) {
	use rand::{
		distributions::{WeightedError::*, WeightedIndex},
		prelude::Distribution,
	};

	match WeightedIndex::new(&samples.counts) {
		Ok(sampler) => centroids.push(samples.colors[sampler.sample(rng)]),
		Err(NoItem | AllWeightsZero | InvalidWeight | TooMany) => {
			unreachable!("counts are nonempty and every count is >= 1")
		},
	}

	for i in 1..usize::from(k) {
		let centroid = centroids[i - 1];
		for (weight, &color) in weights.iter_mut().zip(&samples.colors) {
			*weight = u32::min(*weight, squared_distance(color, centroid));
		}

		let seeding = weights.iter().zip(&samples.counts).map(|(&d, &n)| u64::from(d) * u64::from(n));
		match WeightedIndex::new(seeding) {
			Ok(sampler) => centroids.push(samples.colors[sampler.sample(rng)]),
			Err(AllWeightsZero) => return, // all points exactly match a centroid
			Err(InvalidWeight | NoItem | TooMany) => {
				unreachable!("weights are finite and colors.len() is in 1..=2.pow(24)")
			},
		}
	}
}

/// Initializes the center sums and counts based off the initial centroids
fn compute_initial_sums(samples: &PixelSamples, centers: &mut CenterData, assignment: &[u8]) {
	for ((color, n), &center) in samples.pairs().zip(assignment) {
		let i = usize::from(center);
		let n64 = i64::from(n);
		let sum = &mut centers.sum[i];
		sum[0] += n64 * i64::from(color.red);
		sum[1] += n64 * i64::from(color.green);
		sum[2] += n64 * i64::from(color.blue);
		centers.count[i] += n;
	}
}

/// For each pair of centers, update their distances and sort each center's row by increasing distance
// i and j are < centroids.len() <= u8::MAX
#[allow(clippy::cast_possible_truncation)]
fn update_distances(centroids: &[Srgb<u8>], distances: &mut [(u8, u32)]) {
	let k = centroids.len();
	for i in 0..k {
		let ci = centroids[i];
		distances[i * k + i] = (i as u8, 0);
		for j in (i + 1)..k {
			let cj = centroids[j];
			// round down, so the pruning bound below stays conservative
			let dist = squared_distance(ci, cj) / 4;
			distances[j * k + i] = (i as u8, dist);
			distances[i * k + j] = (j as u8, dist);
		}
	}

	for row in distances.chunks_exact_mut(k) {
		row.sort_unstable_by_key(|&(_, dist)| dist);
	}
}

/// For each data point, update its assigned center
#[cfg(not(feature = "threads"))]
fn update_assignments(samples: &PixelSamples, centers: &mut CenterData, distances: &[(u8, u32)], points: &mut PointData) {
	let k = centers.centroid.len();
	for ((color, n), center) in samples.pairs().zip(&mut points.assignment) {
		let ci = usize::from(*center);
		let dist = squared_distance(color, centers.centroid[ci]);

		// Find the closest center
		let mut min_dist = dist;
		let mut min_center = *center;
		for &(other_center, half_dist) in &distances[(ci * k + 1)..((ci + 1) * k)] {
			if dist < half_dist {
				break;
			}

			let other_dist = squared_distance(color, centers.centroid[usize::from(other_center)]);
			if other_dist < min_dist {
				min_dist = other_dist;
				min_center = other_center;
			}
		}

		// Move this point to its new center
		if min_center != *center {
			let n64 = i64::from(n);
			let r = n64 * i64::from(color.red);
			let g = n64 * i64::from(color.green);
			let b = n64 * i64::from(color.blue);

			let old_sum = &mut centers.sum[ci];
			old_sum[0] -= r;
			old_sum[1] -= g;
			old_sum[2] -= b;
			centers.count[ci] -= n;

			let cj = usize::from(min_center);

			let new_sum = &mut centers.sum[cj];
			new_sum[0] += r;
			new_sum[1] += g;
			new_sum[2] += b;
			centers.count[cj] += n;

			*center = min_center;
		}
	}
}

/// For each data point, update its assigned center
#[cfg(feature = "threads")]
fn update_assignments(samples: &PixelSamples, centers: &mut CenterData, distances: &[(u8, u32)], points: &mut PointData) {
	use rayon::prelude::*;

	let k = centers.centroid.len();
	let num_points = samples.colors.len();
	let deltas = points
		.assignment
		.par_iter_mut()
		.with_min_len(num_points / rayon::current_num_threads())
		.zip(&samples.colors)
		.zip(&samples.counts)
		.fold_with(
			(vec![[0_i64; 3]; k], vec![0_i64; k]),
			|(mut sums, mut counts), ((center, &color), &n)| {
				let ci = usize::from(*center);
				let dist = squared_distance(color, centers.centroid[ci]);

				// Find the closest center
				let mut min_dist = dist;
				let mut min_center = *center;
				for &(other_center, half_dist) in &distances[(ci * k + 1)..((ci + 1) * k)] {
					if dist < half_dist {
						break;
					}

					let other_dist = squared_distance(color, centers.centroid[usize::from(other_center)]);
					if other_dist < min_dist {
						min_dist = other_dist;
						min_center = other_center;
					}
				}

				// Move this point to its new center
				if min_center != *center {
					let n64 = i64::from(n);
					let r = n64 * i64::from(color.red);
					let g = n64 * i64::from(color.green);
					let b = n64 * i64::from(color.blue);

					sums[ci][0] -= r;
					sums[ci][1] -= g;
					sums[ci][2] -= b;
					counts[ci] -= n64;

					let cj = usize::from(min_center);

					sums[cj][0] += r;
					sums[cj][1] += g;
					sums[cj][2] += b;
					counts[cj] += n64;

					*center = min_center;
				}

				(sums, counts)
			},
		)
		.collect::<Vec<_>>();

	for (delta_sums, delta_counts) in deltas {
		for (sum, delta_sum) in centers.sum.iter_mut().zip(&delta_sums) {
			sum[0] += delta_sum[0];
			sum[1] += delta_sum[1];
			sum[2] += delta_sum[2];
		}
		#[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
		for (count, &delta_count) in centers.count.iter_mut().zip(&delta_counts) {
			let new_count = i64::from(*count) + delta_count;
			// Each center count is the sum of the counts of its points,
			// so moving all points out of this center cannot give a negative value.
			// Similarly, since the sum of the counts of all points is <= u32::MAX,
			// then moving all points into this center cannot give a value > u32::MAX.
			debug_assert!(u32::try_from(new_count).is_ok());
			*count = new_count as u32;
		}
	}
}

/// The rounded mean of a channel sum over `n` pixels
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn channel_mean(sum: i64, n: u32) -> u8 {
	// a mean of u8 channel values is itself in 0..=255
	(sum as f64 / f64::from(n)).round() as u8
}

/// For each center, update its centroid to the integer-rounded mean of its points
/// and return the summed absolute per-channel movement
///
/// A center with no assigned points keeps its previous centroid,
/// so the number of centers stays stable across iterations.
fn update_centroids(centers: &mut CenterData) -> u32 {
	let mut total_delta = 0;
	for ((centroid, &n), sum) in centers.centroid.iter_mut().zip(&centers.count).zip(&centers.sum) {
		if n == 0 {
			continue;
		}

		let new_centroid = Srgb::new(channel_mean(sum[0], n), channel_mean(sum[1], n), channel_mean(sum[2], n));

		total_delta += u32::from(centroid.red.abs_diff(new_centroid.red))
			+ u32::from(centroid.green.abs_diff(new_centroid.green))
			+ u32::from(centroid.blue.abs_diff(new_centroid.blue));

		*centroid = new_centroid;
	}

	total_delta
}

/// Run a trial of sort k-means
#[allow(clippy::cast_precision_loss)]
fn kmeans(
	samples: &PixelSamples,
	KmeansState { centers, distances, points }: &mut KmeansState,
	options: &ClusterOptions,
	seed: u64,
) -> Extraction {
	let &ClusterOptions {
		k,
		max_iter,
		tolerance,
		min_weight,
		..
	} = options;

	let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
	kmeans_plus_plus(k, &mut rng, samples, &mut centers.centroid, &mut points.weight);
	compute_initial_sums(samples, centers, &points.assignment);

	let mut iterations = 0;
	let mut total_delta = u32::MAX;
	while iterations < max_iter && total_delta > tolerance {
		update_distances(&centers.centroid, distances);
		update_assignments(samples, centers, distances, points);
		total_delta = update_centroids(centers);
		iterations += 1;
	}

	let variance = samples
		.pairs()
		.zip(&points.assignment)
		.map(|((color, n), &center)| {
			f64::from(n) * f64::from(squared_distance(color, centers.centroid[usize::from(center)]))
		})
		.sum();

	let total = samples.num_pixels();
	let mut colors = centers
		.centroid
		.iter()
		.zip(&centers.count)
		.filter(|&(_, &count)| count > 0)
		.map(|(&color, &count)| DominantColor {
			color,
			weight: count as f32 / total as f32,
			count,
		})
		.filter(|dominant| dominant.weight > min_weight)
		.collect::<Vec<_>>();

	colors.sort_by_key(|dominant| Reverse(dominant.count));

	centers.reset();
	points.reset();

	Extraction {
		colors,
		variance,
		iterations,
		samples: total,
	}
}

/// Run multiple trials of k-means, taking the trial with the lowest variance
fn run_trials(samples: &PixelSamples, options: &ClusterOptions) -> Extraction {
	let mut state = KmeansState::new(options.k, samples.num_colors());

	(0..options.trials)
		.map(|i| kmeans(samples, &mut state, options, options.seed ^ u64::from(i)))
		.min_by(|x, y| f64::total_cmp(&x.variance, &y.variance))
		.unwrap_or(Extraction::empty())
}

/// Run multiple trials of k-means, taking the trial with the lowest variance
///
/// An empty result with no colors is returned if `samples` is empty, `trials` = 0, or `k` = 0.
pub fn run(samples: &PixelSamples, options: &ClusterOptions) -> Extraction {
	if options.k == 0 || samples.is_empty() {
		Extraction::empty()
	} else {
		run_trials(samples, options)
	}
}
