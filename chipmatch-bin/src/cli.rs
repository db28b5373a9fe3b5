//! Specifies the CLI and handles arg parsing

use chipmatch::DeltaE;
use clap::{Parser, ValueEnum};
use std::{
	fmt::{Debug, Display},
	num::ParseFloatError,
	ops::RangeBounds,
	path::PathBuf,
	str::FromStr,
};

/// Supported output formats for the printed colors
#[derive(Copy, Clone, ValueEnum)]
pub enum FormatOutput {
	/// sRGB hexcode
	Hex,
	/// sRGB (r,g,b) triple
	Rgb,
	/// Whitespace with true color background
	Swatch,
}

/// Ways to colorize the output text
#[derive(Copy, Clone, ValueEnum)]
pub enum ColorizeOutput {
	/// Foreground
	Fg,
	/// Background
	Bg,
}

/// Color difference formulas for comparing colors against chips
#[derive(Copy, Clone, ValueEnum)]
pub enum Metric {
	/// CIE76, plain Euclidean distance in Lab space
	Cie76,
	/// CIEDE2000, slower but much closer to human judgment
	Ciede2000,
}

impl Metric {
	/// The library metric behind this flag
	pub fn delta_e(self) -> DeltaE {
		match self {
			Metric::Cie76 => DeltaE::Cie76,
			Metric::Ciede2000 => DeltaE::Ciede2000,
		}
	}
}

/// Find the dominant colors of an image and match them against a reference chip palette.
///
/// Without --palette, the dominant colors themselves are printed, heaviest first.
/// With --palette, each of the top dominant colors is resolved to its closest chip.
#[derive(Parser)]
#[command(version)]
pub struct Options {
	/// The path to the input image
	pub image: PathBuf,

	/// The path to a palette file with one `code,hex,name` chip per line
	///
	/// Blank lines and lines starting with `#` are skipped,
	/// and the name falls back to the code when omitted.
	/// E.g., a line could be `19-1664 TCX,#BF1932,True Red`.
	#[arg(short, long)]
	pub palette: Option<PathBuf>,

	/// The color difference formula used to compare colors against chips
	#[arg(short, long, default_value = "ciede2000")]
	pub metric: Metric,

	/// The format to print the colors in
	#[arg(short, long, default_value = "hex")]
	pub output: FormatOutput,

	/// Color the foreground or background for each printed color
	#[arg(short, long)]
	pub colorize: Option<ColorizeOutput>,

	/// Cluster every n-th pixel in both dimensions
	///
	/// The default examines about one pixel in 25, which is plenty for photos.
	/// Use 1 to cluster every pixel.
	#[arg(short, long, default_value_t = 5)]
	pub stride: usize,

	/// The (maximum) number of dominant colors to find
	#[arg(short, default_value_t = 5)]
	pub k: u8,

	/// The number of trials of k-means to run
	///
	/// k-means can get stuck in a local minimum, so you may want to run a few or more trials to get better results.
	/// The trial with the lowest variance is picked.
	#[arg(short = 'n', long, default_value_t = 1)]
	pub trials: u32,

	/// The maximum number of iterations for all k-means trials
	#[arg(short = 'i', long, default_value_t = 15)]
	pub max_iter: u32,

	/// The total centroid movement under which a k-means trial counts as converged
	///
	/// Centroids are 8 bit RGB colors, so the default of 1 already means "visually settled".
	#[arg(short = 'e', long, default_value_t = 1)]
	pub tolerance: u32,

	/// Exclude dominant colors making up at most this fraction of the pixels
	#[arg(long, default_value_t = 0.02, value_parser = parse_valid_weight)]
	pub min_weight: f32,

	/// The seed value used for the random number generator
	#[arg(long, default_value_t = 0)]
	pub seed: u64,

	/// How many of the dominant colors to match against the palette
	#[arg(short, long, default_value_t = 3)]
	pub top: usize,

	/// Print this many closest chips per dominant color instead of one match each
	#[arg(long, default_value_t = 0)]
	pub candidates: usize,

	/// Drop matches at or above this Delta E distance
	#[arg(short = 'd', long, value_parser = parse_valid_distance)]
	pub max_distance: Option<f64>,

	/// Cluster every sampled pixel instead of dropping background pixels
	#[arg(long)]
	pub no_filter: bool,

	/// Brightness above which a pixel counts as white background
	#[arg(long, default_value_t = 240.0, value_parser = parse_valid_level)]
	pub white_level: f64,

	/// Brightness below which a pixel counts as black background
	#[arg(long, default_value_t = 15.0, value_parser = parse_valid_level)]
	pub black_level: f64,

	/// Brightness above which low saturation pixels count as washed out background
	#[arg(long, default_value_t = 180.0, value_parser = parse_valid_level)]
	pub washout_level: f64,

	/// Saturation below which a bright pixel counts as washed out background
	#[arg(long, default_value_t = 0.1, value_parser = parse_valid_saturation)]
	pub washout_saturation: f64,

	/// Saturation below which a pixel counts as gray background at any brightness
	#[arg(long, default_value_t = 0.05, value_parser = parse_valid_saturation)]
	pub gray_saturation: f64,

	/// Keep the background when fewer than this many pixels survive the filter
	#[arg(long, default_value_t = 50)]
	pub min_foreground: usize,

	/// The number of threads to use, where 0 indicates automatic
	#[cfg(feature = "threads")]
	#[arg(long, default_value_t = 0)]
	pub threads: u8,

	/// Print additional information, such as the number of k-means iterations
	#[arg(long)]
	pub verbose: bool,
}

/// Parse a float value and ensure it is in the provided, valid range
fn parse_float_in_range<T>(s: &str, range: impl RangeBounds<T> + Debug) -> Result<T, String>
where
	T: FromStr<Err = ParseFloatError> + Display + PartialOrd,
{
	let value: T = s.parse().map_err(|e| format!("{e}"))?;
	if range.contains(&value) {
		Ok(value)
	} else {
		Err(format!("{value} is not in {range:?}"))
	}
}

/// Parse a cluster weight and ensure it is in `0.0..=1.0`
fn parse_valid_weight(s: &str) -> Result<f32, String> {
	parse_float_in_range(s, 0.0..=1.0)
}

/// Parse a saturation threshold and ensure it is in `0.0..=1.0`
fn parse_valid_saturation(s: &str) -> Result<f64, String> {
	parse_float_in_range(s, 0.0..=1.0)
}

/// Parse a brightness threshold and ensure it is in `0.0..=255.0`
fn parse_valid_level(s: &str) -> Result<f64, String> {
	parse_float_in_range(s, 0.0..=255.0)
}

/// Parse a Delta E distance and ensure it is >= `0.0`
fn parse_valid_distance(s: &str) -> Result<f64, String> {
	parse_float_in_range(s, 0.0..)
}
