//! Find the dominant colors of an image and match them against a reference chip palette.
//!
//! # Examples
//!
//! ## Extract the dominant colors from a pixel buffer.
//!
//! ```
//! use chipmatch::{ClusterOptions, PixelSamples};
//! use palette::Srgb;
//!
//! let mut pixels = vec![Srgb::new(200u8, 30, 30); 90];
//! pixels.extend(vec![Srgb::new(30u8, 30, 200); 60]);
//!
//! let samples = PixelSamples::unfiltered(&pixels);
//! let result = chipmatch::dominant_colors(&samples, &ClusterOptions::new().with_k(2));
//!
//! assert_eq!(result.colors.len(), 2);
//! assert_eq!(result.colors[0].color, Srgb::new(200, 30, 30));
//! ```
//!
//! ## Match an image against a small reference palette.
//!
//! ```
//! use chipmatch::{DeltaE, MatchOptions, PixelSamples, ReferenceColor, ReferencePalette};
//! use palette::Srgb;
//!
//! let palette = ReferencePalette::new(vec![
//!     ReferenceColor::from_hex("red", "RED", "Signal Red", "#C81E1E").unwrap(),
//!     ReferenceColor::from_hex("blue", "BLUE", "Signal Blue", "#1E1EC8").unwrap(),
//! ]);
//!
//! let pixels = vec![Srgb::new(200u8, 30, 30); 100];
//! let samples = PixelSamples::unfiltered(&pixels);
//!
//! let matches = chipmatch::auto_match(&samples, &palette, &MatchOptions::new(DeltaE::Ciede2000));
//!
//! assert_eq!(matches[0].chip.code, "RED");
//! ```
//!
//! # Options
//!
//! Here are explanations of the various options shared between
//! [`dominant_colors`] and [`auto_match`].
//!
//! Note that if `trials` = 0, `k` = 0, or there are no pixel samples,
//! then the [`Extraction`] will have no colors and a variance of `0.0`.
//!
//! ## Background Filtering
//!
//! Product photos are usually shot against white sweeps or gray gradients,
//! and those pixels would otherwise dominate the clusters.
//! [`BackgroundFilter`] drops very bright, very dark, washed out, and gray pixels before clustering.
//! If fewer than `min_foreground` pixels survive,
//! such as for subjects that really are white or black,
//! the filter steps aside and every pixel is kept.
//!
//! ## K
//!
//! This is the (maximum) number of dominant colors to find.
//!
//! 3 to 8 is most likely the range you want.
//!
//! The ideal number of clusters is hard to know in advance, if there even is an "ideal" number.
//! Clusters below the `min_weight` floor are dropped from the result,
//! so a slightly generous `k` mostly costs time rather than accuracy.
//!
//! ## Trials
//!
//! This is the number of times to run k-means, taking the trial with the lowest variance.
//!
//! 1 to 4 trials is recommended.
//!
//! k-means is an approximation algorithm that can get stuck in a local minimum,
//! so there is no guarantee that a single run gives a "good enough" result.
//! More trials increase your chance of a more optimal result, at a linear cost in time.
//!
//! ## Tolerance and Max Iterations
//!
//! Each trial stops once an iteration moves the centroids by at most `tolerance`
//! channel steps in total, or after `max_iter` iterations, whichever comes first.
//! Centroids are 8 bit RGB colors, so a tolerance of `1` already means "visually settled",
//! and around 15 iterations is plenty for photos.
//!
//! ## Metric
//!
//! Chip lookups compare colors in CIE Lab using either [`DeltaE::Cie76`] or [`DeltaE::Ciede2000`].
//! CIEDE2000 tracks human perception much better, especially for near neutrals,
//! while CIE76 is cheaper and simpler to reason about.
//! There is no default: pick the metric that fits how your results are consumed.
//!
//! ## Seed
//!
//! This is the value used to seed the random number generator which is used to choose the initial centroids.
//!
//! Provide any arbitrary value like `0`, `42`, or `123456789`.
//! The same seed over the same pixels gives the same palette on every run.

#![deny(unsafe_code)]
#![warn(clippy::pedantic, clippy::cargo)]
#![warn(clippy::use_debug, clippy::dbg_macro, clippy::todo, clippy::unimplemented)]
#![warn(clippy::unwrap_used, clippy::unwrap_in_result)]
#![warn(clippy::unneeded_field_pattern, clippy::rest_pat_in_fully_bound_structs)]
#![warn(clippy::unnecessary_self_imports)]
#![warn(clippy::str_to_string, clippy::string_to_string, clippy::string_slice)]
#![warn(missing_docs, clippy::missing_docs_in_private_items, rustdoc::all)]
#![warn(clippy::float_cmp_const, clippy::lossy_float_literal)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::enum_glob_use)]
#![allow(clippy::unreadable_literal)]
#![allow(clippy::many_single_char_names)]

use palette::Srgb;
use std::collections::HashMap;

mod chips;
mod deltae;
mod kmeans;
mod lab;

pub use chips::{FromHexError, Match, ReferenceColor, ReferencePalette};
pub use deltae::{delta_e_2000, delta_e_76, DeltaE};
pub use kmeans::{ClusterOptions, DominantColor, Extraction};
pub use lab::{rgb_to_lab, Lab};

/// Thresholds for classifying pixels as background rather than subject
///
/// Brightness is the plain mean of the three channels in `0.0..=255.0`,
/// and saturation is `(max - min) / max` in `0.0..=1.0` (`0.0` for black).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackgroundFilter {
	/// Pixels brighter than this are background (studio white sweeps)
	pub white_level: f64,
	/// Pixels darker than this are background (shadows and vignettes)
	pub black_level: f64,
	/// Saturation below which a bright pixel counts as washed out
	pub washout_saturation: f64,
	/// Brightness above which the washout rule applies
	pub washout_level: f64,
	/// Saturation below which a pixel counts as gray at any brightness
	pub gray_saturation: f64,
	/// Fall back to the unfiltered pixels when fewer than this many survive
	pub min_foreground: usize,
}

impl BackgroundFilter {
	/// Create a filter with the default thresholds
	#[must_use]
	pub const fn new() -> Self {
		Self {
			white_level: 240.0,
			black_level: 15.0,
			washout_saturation: 0.1,
			washout_level: 180.0,
			gray_saturation: 0.05,
			min_foreground: 50,
		}
	}

	/// Whether the given pixel reads as background under these thresholds
	#[must_use]
	pub fn is_background(&self, pixel: Srgb<u8>) -> bool {
		let brightness = (f64::from(pixel.red) + f64::from(pixel.green) + f64::from(pixel.blue)) / 3.0;
		let max = pixel.red.max(pixel.green).max(pixel.blue);
		let min = pixel.red.min(pixel.green).min(pixel.blue);
		let saturation = if max == 0 { 0.0 } else { f64::from(max - min) / f64::from(max) };

		brightness > self.white_level
			|| brightness < self.black_level
			|| (saturation < self.washout_saturation && brightness > self.washout_level)
			|| saturation < self.gray_saturation
	}
}

impl Default for BackgroundFilter {
	fn default() -> Self {
		Self::new()
	}
}

/// Deduplicated pixels with their populations, ready for clustering
#[derive(Debug, Clone)]
pub struct PixelSamples {
	/// Unique colors in first-seen order
	pub(crate) colors: Vec<Srgb<u8>>,
	/// The number of duplicate pixels for each color
	pub(crate) counts: Vec<u32>,
	/// Total number of pixels behind the samples
	pub(crate) total: u32,
}

impl PixelSamples {
	/// Create a `PixelSamples` with empty Vecs
	const fn new() -> Self {
		Self {
			colors: Vec::new(),
			counts: Vec::new(),
			total: 0,
		}
	}

	/// Deduplicate the pixels that pass `keep`, counting the occurrences of each color
	fn dedup(pixels: &[Srgb<u8>], mut keep: impl FnMut(Srgb<u8>) -> bool) -> Self {
		let mut data = Self::new();

		// Grouping identical pixels speeds up k-means,
		// since product photos repeat the same few hundred colors over and over.

		// Packed Srgb -> data index
		let mut memo: HashMap<u32, u32> = HashMap::new();

		for &srgb in pixels {
			if !keep(srgb) {
				continue;
			}

			let key = srgb.into_u32::<palette::rgb::channels::Rgba>();
			let index = *memo.entry(key).or_insert_with(|| {
				// data.len() < u32::MAX because there are only (2^8)^3 < u32::MAX possible sRGB colors
				#[allow(clippy::cast_possible_truncation)]
				let index = data.colors.len() as u32;

				data.colors.push(srgb);
				data.counts.push(0);
				index
			});

			data.counts[index as usize] += 1;
			data.total += 1;
		}

		data
	}

	/// Deduplicate the given pixels, dropping those that read as background
	///
	/// When fewer than [`BackgroundFilter::min_foreground`] pixels survive the filter,
	/// such as for subjects that really are white or black,
	/// the filter is abandoned and every pixel is kept.
	///
	/// # Panics
	/// Panics if `pixels.len()` exceeds `u32::MAX`.
	#[must_use]
	pub fn from_pixels(pixels: &[Srgb<u8>], filter: &BackgroundFilter) -> Self {
		assert_pixel_count(pixels);
		let data = Self::dedup(pixels, |srgb| !filter.is_background(srgb));
		if (data.total as usize) < filter.min_foreground {
			Self::dedup(pixels, |_| true)
		} else {
			data
		}
	}

	/// Deduplicate the given pixels without any background filtering
	///
	/// # Panics
	/// Panics if `pixels.len()` exceeds `u32::MAX`.
	#[must_use]
	pub fn unfiltered(pixels: &[Srgb<u8>]) -> Self {
		assert_pixel_count(pixels);
		Self::dedup(pixels, |_| true)
	}

	/// The number of unique colors
	// colors.len() < u32::MAX because there are only (2^8)^3 < u32::MAX possible sRGB colors
	#[allow(clippy::cast_possible_truncation)]
	#[must_use]
	pub fn num_colors(&self) -> u32 {
		self.colors.len() as u32
	}

	/// The total number of pixels behind the samples
	#[must_use]
	pub const fn num_pixels(&self) -> u32 {
		self.total
	}

	/// Whether there are no samples
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.colors.is_empty()
	}

	/// Iterator over each unique color and its count
	pub(crate) fn pairs(&self) -> impl Iterator<Item = (Srgb<u8>, u32)> + '_ {
		self.colors.iter().copied().zip(self.counts.iter().copied())
	}
}

/// Assert that a pixel slice is small enough for u32 counts
fn assert_pixel_count(pixels: &[Srgb<u8>]) {
	assert!(
		u32::try_from(pixels.len()).is_ok(),
		"number of pixels must be within u32::MAX"
	);
}

/// Collect every `stride`-th pixel in both dimensions from a row-major pixel buffer
///
/// A stride of 1 keeps every pixel, and a stride of 5 keeps about one pixel in 25.
/// A stride of 0 is treated as 1, and a stride larger than either dimension
/// still keeps the top-left pixel.
///
/// # Panics
/// Panics if `pixels.len()` differs from `width * height`.
#[must_use]
pub fn sample_grid(pixels: &[Srgb<u8>], width: usize, height: usize, stride: usize) -> Vec<Srgb<u8>> {
	assert_eq!(pixels.len(), width * height, "pixel buffer must be width * height pixels");

	let stride = stride.max(1);
	let rows = (0..height).step_by(stride);
	let cols = (0..width).step_by(stride);

	let mut samples = Vec::with_capacity(rows.len() * cols.len());
	for y in rows {
		let row = &pixels[(y * width)..((y + 1) * width)];
		for x in cols.clone() {
			samples.push(row[x]);
		}
	}

	samples
}

/// Find the dominant colors of the given samples using k-means
///
/// See the crate documentation for examples and information on each option.
#[must_use]
pub fn dominant_colors(samples: &PixelSamples, options: &ClusterOptions) -> Extraction {
	kmeans::run(samples, options)
}

/// Parameters controlling end to end palette matching
///
/// There is no `Default` implementation since there is no universally right
/// [`DeltaE`] metric, so every construction states one explicitly.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchOptions {
	/// The color difference metric used to compare dominant colors against chips
	pub metric: DeltaE,
	/// How many of the top dominant colors to look up, usually in `1..=3`
	pub top: usize,
	/// Matches at or above this distance are dropped rather than reported
	pub max_distance: Option<f64>,
	/// Options for the dominant color extraction stage
	pub cluster: ClusterOptions,
}

impl MatchOptions {
	/// Create options with the default parameters and the given metric
	#[must_use]
	pub const fn new(metric: DeltaE) -> Self {
		Self {
			metric,
			top: 3,
			max_distance: None,
			cluster: ClusterOptions::new(),
		}
	}

	/// Set how many dominant colors to look up
	#[must_use]
	pub const fn with_top(mut self, top: usize) -> Self {
		self.top = top;
		self
	}

	/// Set the acceptance cutoff on match distance
	#[must_use]
	pub const fn with_max_distance(mut self, max_distance: f64) -> Self {
		self.max_distance = Some(max_distance);
		self
	}

	/// Set the options for the dominant color extraction stage
	#[must_use]
	pub const fn with_cluster(mut self, cluster: ClusterOptions) -> Self {
		self.cluster = cluster;
		self
	}
}

/// A dominant color resolved to its closest reference chip
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PaletteMatch<'a> {
	/// The matched chip
	pub chip: &'a ReferenceColor,
	/// Color difference between the dominant color and the chip
	pub distance: f64,
	/// Share of the samples covered by the dominant color behind this match
	pub weight: f32,
}

/// Extract the dominant colors of the given samples and resolve each to its closest chip
///
/// The top dominant colors are looked up in descending weight order and each
/// contributes at most one match. A chip already claimed by a heavier dominant
/// color is skipped rather than replaced by its runner-up, and with
/// [`MatchOptions::max_distance`] set, matches at or above the cutoff are dropped.
/// Empty samples or an empty palette give no matches.
#[must_use]
pub fn auto_match<'a>(
	samples: &PixelSamples,
	palette: &'a ReferencePalette,
	options: &MatchOptions,
) -> Vec<PaletteMatch<'a>> {
	let extraction = dominant_colors(samples, &options.cluster);
	let mut matches = Vec::new();

	for dominant in extraction.colors.iter().take(options.top) {
		if let Some(closest) = palette.find_closest(dominant.color, options.metric, 1).pop() {
			let duplicate = matches.iter().any(|previous: &PaletteMatch<'_>| previous.chip.id == closest.chip.id);
			let rejected = options.max_distance.map_or(false, |max| closest.distance >= max);

			if !(duplicate || rejected) {
				matches.push(PaletteMatch {
					chip: closest.chip,
					distance: closest.distance,
					weight: dominant.weight,
				});
			}
		}
	}

	matches
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn background_rules_classify_the_obvious_cases() {
		let filter = BackgroundFilter::new();

		// studio white sweep
		assert!(filter.is_background(Srgb::new(255, 255, 255)));
		assert!(filter.is_background(Srgb::new(245, 243, 247)));
		// deep shadow
		assert!(filter.is_background(Srgb::new(5, 5, 5)));
		// washed out highlight
		assert!(filter.is_background(Srgb::new(200, 190, 195)));
		// near gray at middle brightness
		assert!(filter.is_background(Srgb::new(128, 125, 127)));

		// saturated subject colors
		assert!(!filter.is_background(Srgb::new(200, 30, 30)));
		assert!(!filter.is_background(Srgb::new(30, 30, 200)));
		assert!(!filter.is_background(Srgb::new(128, 100, 60)));
	}

	#[test]
	fn dedup_merges_identical_pixels() {
		let red = Srgb::new(200, 30, 30);
		let blue = Srgb::new(30, 30, 200);
		let pixels = vec![red, blue, red, red, blue];

		let samples = PixelSamples::unfiltered(&pixels);

		assert_eq!(samples.num_colors(), 2);
		assert_eq!(samples.num_pixels(), 5);
		assert_eq!(samples.colors, vec![red, blue]);
		assert_eq!(samples.counts, vec![3, 2]);
	}

	#[test]
	fn mostly_background_images_fall_back_to_every_pixel() {
		let pixels = vec![Srgb::new(250, 250, 250); 100];

		let samples = PixelSamples::from_pixels(&pixels, &BackgroundFilter::new());

		assert_eq!(samples.num_pixels(), 100);
		assert_eq!(samples.num_colors(), 1);
	}

	#[test]
	fn background_is_dropped_when_enough_subject_remains() {
		let mut pixels = vec![Srgb::new(250, 250, 250); 900];
		pixels.extend(vec![Srgb::new(200, 30, 30); 100]);

		let samples = PixelSamples::from_pixels(&pixels, &BackgroundFilter::new());

		assert_eq!(samples.num_pixels(), 100);
		assert_eq!(samples.colors, vec![Srgb::new(200, 30, 30)]);
	}

	#[test]
	fn white_background_never_outweighs_the_subject() {
		let mut pixels = vec![Srgb::new(252, 252, 252); 900];
		pixels.extend(vec![Srgb::new(200, 30, 30); 100]);

		let samples = PixelSamples::from_pixels(&pixels, &BackgroundFilter::new());
		let result = dominant_colors(&samples, &ClusterOptions::new());

		assert_eq!(result.colors.len(), 1);
		let dominant = result.colors[0];
		assert_eq!(dominant.color, Srgb::new(200, 30, 30));
		assert!((dominant.weight - 1.0).abs() < 1e-6);
	}

	#[test]
	fn sample_grid_keeps_every_strideth_pixel() {
		let mut pixels = Vec::new();
		for y in 0..10u8 {
			for x in 0..10u8 {
				pixels.push(Srgb::new(x, y, 0));
			}
		}

		let samples = sample_grid(&pixels, 10, 10, 5);

		assert_eq!(
			samples,
			vec![
				Srgb::new(0, 0, 0),
				Srgb::new(5, 0, 0),
				Srgb::new(0, 5, 0),
				Srgb::new(5, 5, 0),
			]
		);
	}

	#[test]
	fn sample_grid_with_stride_one_keeps_everything() {
		let pixels = vec![Srgb::new(1, 2, 3); 12];
		assert_eq!(sample_grid(&pixels, 4, 3, 1), pixels);
		assert_eq!(sample_grid(&pixels, 4, 3, 0), pixels);
	}

	#[test]
	fn sample_grid_with_a_huge_stride_keeps_the_corner() {
		let mut pixels = vec![Srgb::new(9, 9, 9); 25];
		pixels[0] = Srgb::new(1, 1, 1);

		assert_eq!(sample_grid(&pixels, 5, 5, 100), vec![Srgb::new(1, 1, 1)]);
	}

	#[test]
	fn solid_red_image_matches_the_red_chip() {
		let palette = ReferencePalette::new(vec![
			ReferenceColor::new("red", "RED", "Signal Red", Srgb::new(200, 30, 30)),
			ReferenceColor::new("blue", "BLUE", "Signal Blue", Srgb::new(30, 30, 200)),
		]);

		let pixels = vec![Srgb::new(200, 30, 30); 100];
		let samples = PixelSamples::unfiltered(&pixels);

		for metric in [DeltaE::Cie76, DeltaE::Ciede2000] {
			let matches = auto_match(&samples, &palette, &MatchOptions::new(metric));
			assert_eq!(matches.len(), 1);
			assert_eq!(matches[0].chip.code, "RED");
			assert!(matches[0].distance.abs() < 1e-9);

			let all = palette.find_closest(Srgb::new(200, 30, 30), metric, 2);
			assert!(all[1].distance > 30.0);
		}
	}

	#[test]
	fn heavier_dominants_claim_chips_first() {
		let palette = ReferencePalette::new(vec![ReferenceColor::new(
			"red",
			"RED",
			"Signal Red",
			Srgb::new(200, 30, 30),
		)]);

		let mut pixels = vec![Srgb::new(200, 30, 30); 60];
		pixels.extend(vec![Srgb::new(205, 35, 35); 40]);
		let samples = PixelSamples::unfiltered(&pixels);

		let options = MatchOptions::new(DeltaE::Ciede2000).with_cluster(ClusterOptions::new().with_k(2));
		let matches = auto_match(&samples, &palette, &options);

		assert_eq!(matches.len(), 1);
		assert_eq!(matches[0].chip.id, "red");
		assert!((matches[0].weight - 0.6).abs() < 1e-6);
	}

	#[test]
	fn distant_matches_are_dropped_by_the_cutoff() {
		let palette = ReferencePalette::new(vec![ReferenceColor::new(
			"blue",
			"BLUE",
			"Signal Blue",
			Srgb::new(30, 30, 200),
		)]);

		let pixels = vec![Srgb::new(200, 30, 30); 100];
		let samples = PixelSamples::unfiltered(&pixels);

		let bounded = MatchOptions::new(DeltaE::Ciede2000).with_max_distance(30.0);
		assert!(auto_match(&samples, &palette, &bounded).is_empty());

		let unbounded = MatchOptions::new(DeltaE::Ciede2000);
		assert_eq!(auto_match(&samples, &palette, &unbounded).len(), 1);
	}

	#[test]
	fn empty_samples_and_empty_palettes_give_no_matches() {
		let palette = ReferencePalette::new(vec![ReferenceColor::new(
			"red",
			"RED",
			"Signal Red",
			Srgb::new(200, 30, 30),
		)]);
		let options = MatchOptions::new(DeltaE::Cie76);

		let no_samples = PixelSamples::unfiltered(&[]);
		assert!(auto_match(&no_samples, &palette, &options).is_empty());

		let samples = PixelSamples::unfiltered(&[Srgb::new(200, 30, 30)]);
		let no_palette = ReferencePalette::new(Vec::new());
		assert!(auto_match(&samples, &no_palette, &options).is_empty());
	}
}
