//! Find the dominant colors of an image and match them against a reference chip palette.

#![deny(unsafe_code, unsafe_op_in_unsafe_fn)]
#![warn(
	clippy::pedantic,
	clippy::cargo,
	clippy::use_debug,
	clippy::dbg_macro,
	clippy::todo,
	clippy::unimplemented,
	clippy::unwrap_used,
	clippy::unwrap_in_result,
	clippy::unneeded_field_pattern,
	clippy::rest_pat_in_fully_bound_structs,
	clippy::unnecessary_self_imports,
	clippy::str_to_string,
	clippy::string_to_string,
	clippy::string_slice,
	missing_docs,
	clippy::missing_docs_in_private_items,
	rustdoc::all,
	clippy::float_cmp_const,
	clippy::lossy_float_literal
)]
#![allow(
	clippy::doc_markdown,
	clippy::module_name_repetitions,
	clippy::many_single_char_names,
	clippy::missing_panics_doc,
	clippy::unreadable_literal
)]

mod cli;

#[allow(clippy::wildcard_imports)]
use cli::*;

use std::{
	fmt::{self, Display},
	path::Path,
	process::ExitCode,
	time::Instant,
};

use chipmatch::{
	auto_match, dominant_colors, sample_grid, BackgroundFilter, ClusterOptions, Extraction, MatchOptions, PaletteMatch,
	PixelSamples, ReferenceColor, ReferencePalette,
};
use clap::Parser;
use colored::Colorize;
use image::DynamicImage;
use palette::Srgb;

/// Record the running time of a function and print the elapsed time
macro_rules! time {
	($name: literal, $verbose: expr, $func_call: expr) => {{
		let start = Instant::now();
		let result = $func_call;
		if $verbose {
			println!("{} took {}ms", $name, start.elapsed().as_millis());
		}
		result
	}};
}

/// Error cases for loading the input image and palette file
#[derive(Debug)]
enum CliError {
	/// Failed to read or decode the image file
	ImageLoad(image::ImageError),
	/// Failed to read the palette file
	PaletteRead(std::io::Error),
	/// A palette file line that could not be parsed
	PaletteParse {
		/// 1-based line number of the offending entry
		line: usize,
		/// What was wrong with the line
		reason: String,
	},
}

impl Display for CliError {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			CliError::ImageLoad(e) => write!(f, "Failed to load the image file: {e}"),
			CliError::PaletteRead(e) => write!(f, "Failed to read the palette file: {e}"),
			CliError::PaletteParse { line, reason } => {
				write!(f, "Failed to parse the palette file at line {line}: {reason}")
			},
		}
	}
}

fn main() -> ExitCode {
	let options = Options::parse();

	let result = run_match_and_print(&options);

	// Returning Result<_> uses Debug printing instead of Display
	if let Err(e) = result {
		eprintln!("{e}");
		ExitCode::FAILURE
	} else {
		ExitCode::SUCCESS
	}
}

/// Builds a thread pool and then runs `match_and_print`
#[cfg(feature = "threads")]
fn run_match_and_print(options: &Options) -> Result<(), CliError> {
	let pool = rayon::ThreadPoolBuilder::new()
		.num_threads(usize::from(options.threads))
		.build()
		.expect("initialized thread pool");

	pool.install(|| match_and_print(options))
}

/// Runs `match_and_print` on a single thread
#[cfg(not(feature = "threads"))]
fn run_match_and_print(options: &Options) -> Result<(), CliError> {
	match_and_print(options)
}

/// Load the inputs, run the pipeline, and print the result using the given options
fn match_and_print(options: &Options) -> Result<(), CliError> {
	// Input
	let img = time!("Image loading", options.verbose, load_image(&options.image))?;
	let img = img.into_rgb8();
	let pixels: &[Srgb<u8>] = palette::cast::from_component_slice(img.as_raw());
	let (width, height) = (img.width() as usize, img.height() as usize);

	// Sampling and preprocessing
	let sampled = sample_grid(pixels, width, height, options.stride);
	if options.verbose {
		println!("Sampled {} of {} pixels", sampled.len(), pixels.len());
	}

	let samples = time!(
		"Preprocessing",
		options.verbose,
		if options.no_filter {
			PixelSamples::unfiltered(&sampled)
		} else {
			PixelSamples::from_pixels(&sampled, &background_filter(options))
		}
	);

	if options.verbose {
		println!("Reduced samples to {} unique colors", samples.num_colors());
	}

	// Clustering and output
	match &options.palette {
		None => {
			let extraction = time!(
				"k-means",
				options.verbose,
				dominant_colors(&samples, &cluster_options(options))
			);
			if options.verbose {
				print_extraction_stats(&extraction);
			}

			print_dominants(&extraction, options);
		},
		Some(path) => {
			let chips = time!("Palette loading", options.verbose, load_palette(path))?;
			let palette = ReferencePalette::new(chips);
			if options.verbose {
				println!("Loaded {} reference chips", palette.len());
			}

			if options.candidates > 0 {
				let extraction = time!(
					"k-means",
					options.verbose,
					dominant_colors(&samples, &cluster_options(options))
				);
				if options.verbose {
					print_extraction_stats(&extraction);
				}

				print_candidates(&extraction, &palette, options);
			} else {
				let matches = time!(
					"Matching",
					options.verbose,
					auto_match(&samples, &palette, &match_options(options))
				);

				print_matches(&matches, options);
			}
		},
	}

	Ok(())
}

/// Load the image at the given path
fn load_image(path: &Path) -> Result<DynamicImage, CliError> {
	image::open(path).map_err(CliError::ImageLoad)
}

/// Load a `code,hex,name` palette file into reference chips
fn load_palette(path: &Path) -> Result<Vec<ReferenceColor>, CliError> {
	let contents = std::fs::read_to_string(path).map_err(CliError::PaletteRead)?;
	parse_palette(&contents)
}

/// Parse the `code,hex,name` lines of a palette file, skipping blank lines and `#` comments
fn parse_palette(contents: &str) -> Result<Vec<ReferenceColor>, CliError> {
	let mut chips = Vec::new();

	for (i, line) in contents.lines().enumerate() {
		let line = line.trim();
		if line.is_empty() || line.starts_with('#') {
			continue;
		}

		let mut fields = line.splitn(3, ',').map(str::trim);
		let (code, hex) = match (fields.next(), fields.next()) {
			(Some(code), Some(hex)) if !code.is_empty() && !hex.is_empty() => (code, hex),
			_ => {
				return Err(CliError::PaletteParse {
					line: i + 1,
					reason: "expected `code,hex,name`".to_owned(),
				})
			},
		};
		let name = fields.next().unwrap_or(code);

		// The code doubles as the identifier used to deduplicate matches
		let chip = ReferenceColor::from_hex(code, code, name, hex).map_err(|e| CliError::PaletteParse {
			line: i + 1,
			reason: format!("{e}"),
		})?;
		chips.push(chip);
	}

	Ok(chips)
}

/// Build the background filter thresholds from the command line options
fn background_filter(options: &Options) -> BackgroundFilter {
	BackgroundFilter {
		white_level: options.white_level,
		black_level: options.black_level,
		washout_saturation: options.washout_saturation,
		washout_level: options.washout_level,
		gray_saturation: options.gray_saturation,
		min_foreground: options.min_foreground,
	}
}

/// Build the clustering options from the command line options
fn cluster_options(options: &Options) -> ClusterOptions {
	ClusterOptions::new()
		.with_k(options.k)
		.with_trials(options.trials)
		.with_max_iter(options.max_iter)
		.with_tolerance(options.tolerance)
		.with_min_weight(options.min_weight)
		.with_seed(options.seed)
}

/// Build the matching options from the command line options
fn match_options(options: &Options) -> MatchOptions {
	let mut matching = MatchOptions::new(options.metric.delta_e())
		.with_top(options.top)
		.with_cluster(cluster_options(options));

	if let Some(max_distance) = options.max_distance {
		matching = matching.with_max_distance(max_distance);
	}

	matching
}

/// Print the iteration count and variance of the winning k-means trial
fn print_extraction_stats(extraction: &Extraction) {
	println!(
		"Best trial took {} iterations with a variance of {:.2}",
		extraction.iterations, extraction.variance
	);
}

/// Format a color as its own cell of text based off the output options
fn color_cell(color: Srgb<u8>, options: &Options) -> String {
	let text = match options.output {
		FormatOutput::Hex => format!("{color:X}"),
		FormatOutput::Rgb => format!("({},{},{})", color.red, color.green, color.blue),
		FormatOutput::Swatch => return "   ".on_truecolor(color.red, color.green, color.blue).to_string(),
	};

	match options.colorize {
		Some(ColorizeOutput::Fg) => text.truecolor(color.red, color.green, color.blue).to_string(),
		Some(ColorizeOutput::Bg) => text.on_truecolor(color.red, color.green, color.blue).to_string(),
		None => text,
	}
}

/// Print the dominant colors on one line, heaviest first
fn print_dominants(extraction: &Extraction, options: &Options) {
	println!(
		"{}",
		extraction
			.colors
			.iter()
			.map(|dominant| color_cell(dominant.color, options))
			.collect::<Vec<_>>()
			.join(" ")
	);

	if options.verbose {
		for dominant in &extraction.colors {
			println!(
				"{:X} covers {:.1}% of the samples",
				dominant.color,
				f64::from(dominant.weight) * 100.0
			);
		}
	}
}

/// Print the closest chips for each of the top dominant colors
fn print_candidates(extraction: &Extraction, palette: &ReferencePalette, options: &Options) {
	let metric = options.metric.delta_e();
	for dominant in extraction.colors.iter().take(options.top) {
		println!(
			"{} {:.1}%",
			color_cell(dominant.color, options),
			f64::from(dominant.weight) * 100.0
		);

		for found in palette.find_closest(dominant.color, metric, options.candidates) {
			println!(
				"  {} {} {} (dE {:.2})",
				color_cell(found.chip.color, options),
				found.chip.code,
				found.chip.name,
				found.distance
			);
		}
	}
}

/// Print one line per chip match
fn print_matches(matches: &[PaletteMatch], options: &Options) {
	for found in matches {
		println!(
			"{} {} {} (dE {:.2}, {:.1}%)",
			color_cell(found.chip.color, options),
			found.chip.code,
			found.chip.name,
			found.distance,
			f64::from(found.weight) * 100.0
		);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const PALETTE: &str = "\
# chip list
19-1664 TCX,#BF1932,True Red

19-4052 TCX,#0F4C81,Classic Blue
RAW,C81E1E
";

	#[test]
	fn palette_files_parse_codes_hex_and_names() {
		let chips = match parse_palette(PALETTE) {
			Ok(chips) => chips,
			Err(e) => panic!("failed to parse palette: {e}"),
		};

		assert_eq!(chips.len(), 3);
		assert_eq!(chips[0].code, "19-1664 TCX");
		assert_eq!(chips[0].name, "True Red");
		assert_eq!(chips[0].color, Srgb::new(191, 25, 50));
		assert_eq!(chips[1].color, Srgb::new(15, 76, 129));
		// names fall back to the code
		assert_eq!(chips[2].name, "RAW");
		assert_eq!(chips[2].color, Srgb::new(200, 30, 30));
	}

	#[test]
	fn truncated_palette_lines_report_their_line_number() {
		let result = parse_palette("19-1664 TCX,#BF1932,True Red\noops\n");
		match result {
			Err(CliError::PaletteParse { line, .. }) => assert_eq!(line, 2),
			other => panic!("expected a parse error, got {other:?}"),
		}
	}

	#[test]
	fn bad_hex_codes_report_their_line_number() {
		let result = parse_palette("# header\nRED,#XYZXYZ,Bad Red\n");
		match result {
			Err(CliError::PaletteParse { line, .. }) => assert_eq!(line, 2),
			other => panic!("expected a parse error, got {other:?}"),
		}
	}
}
