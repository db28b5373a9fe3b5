//! Reference chip palettes and closest-match lookup

use crate::deltae::DeltaE;
use crate::lab::{rgb_to_lab, Lab};
use palette::Srgb;

pub use palette::rgb::FromHexError;

/// A named reference color, such as a color book chip or a brand palette entry
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceColor {
	/// Stable identifier, used to deduplicate matches across dominant colors
	pub id: String,
	/// Vendor code printed on the chip, such as `19-1664 TCX`
	pub code: String,
	/// Human readable name, such as `True Red`
	pub name: String,
	/// The chip color
	pub color: Srgb<u8>,
}

impl ReferenceColor {
	/// Create a reference color from an already parsed [`Srgb`] value
	#[must_use]
	pub fn new(id: impl Into<String>, code: impl Into<String>, name: impl Into<String>, color: Srgb<u8>) -> Self {
		Self {
			id: id.into(),
			code: code.into(),
			name: name.into(),
			color,
		}
	}

	/// Create a reference color from a hex string like `"#C81E1E"` or `"C81E1E"`
	///
	/// # Errors
	/// Returns an error if `hex` is not a valid hex color code.
	pub fn from_hex(
		id: impl Into<String>,
		code: impl Into<String>,
		name: impl Into<String>,
		hex: &str,
	) -> Result<Self, FromHexError> {
		Ok(Self::new(id, code, name, hex.parse()?))
	}
}

/// A reference chip together with its distance from a query color
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Match<'a> {
	/// The matched chip
	pub chip: &'a ReferenceColor,
	/// Color difference between the query color and the chip, per the chosen metric
	pub distance: f64,
}

/// A set of reference chips with their Lab coordinates computed up front
///
/// Construction converts every chip to Lab once, so repeated lookups only pay
/// for the distance computations.
#[derive(Debug, Clone)]
pub struct ReferencePalette {
	/// The chips in insertion order
	chips: Vec<ReferenceColor>,
	/// Lab coordinates for each chip, index aligned with `chips`
	labs: Vec<Lab>,
}

impl ReferencePalette {
	/// Create a palette from the given chips, caching their Lab coordinates
	#[must_use]
	pub fn new(chips: Vec<ReferenceColor>) -> Self {
		let labs = chips.iter().map(|chip| rgb_to_lab(chip.color)).collect();
		Self { chips, labs }
	}

	/// The number of chips in the palette
	#[must_use]
	pub fn len(&self) -> usize {
		self.chips.len()
	}

	/// Whether the palette contains no chips
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.chips.is_empty()
	}

	/// The chips in this palette, in insertion order
	#[must_use]
	pub fn chips(&self) -> &[ReferenceColor] {
		&self.chips
	}

	/// Find the closest chips to `color`, sorted by increasing distance
	///
	/// At most `min(limit, len)` matches are returned,
	/// so an empty palette always returns no matches.
	#[must_use]
	pub fn find_closest(&self, color: Srgb<u8>, metric: DeltaE, limit: usize) -> Vec<Match<'_>> {
		let query = rgb_to_lab(color);
		let mut matches = self
			.chips
			.iter()
			.zip(&self.labs)
			.map(|(chip, &lab)| Match {
				chip,
				distance: metric.between(query, lab),
			})
			.collect::<Vec<_>>();

		matches.sort_by(|x, y| f64::total_cmp(&x.distance, &y.distance));
		matches.truncate(limit);
		matches
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn test_palette() -> ReferencePalette {
		ReferencePalette::new(vec![
			ReferenceColor::new("19-1664", "19-1664 TCX", "True Red", Srgb::new(191, 25, 50)),
			ReferenceColor::new("19-4052", "19-4052 TCX", "Classic Blue", Srgb::new(15, 76, 129)),
			ReferenceColor::new("15-0343", "15-0343 TCX", "Greenery", Srgb::new(136, 176, 75)),
			ReferenceColor::new("13-1520", "13-1520 TCX", "Rose Quartz", Srgb::new(247, 202, 201)),
			ReferenceColor::new("11-0601", "11-0601 TCX", "Bright White", Srgb::new(244, 249, 255)),
		])
	}

	fn signal_red(hex: &str) -> Result<ReferenceColor, FromHexError> {
		ReferenceColor::from_hex("red", "RED", "Signal Red", hex)
	}

	#[test]
	fn exact_chip_color_matches_at_distance_zero() {
		let palette = test_palette();
		for metric in [DeltaE::Cie76, DeltaE::Ciede2000] {
			let matches = palette.find_closest(Srgb::new(191, 25, 50), metric, 1);
			assert_eq!(matches.len(), 1);
			assert_eq!(matches[0].chip.id, "19-1664");
			assert!(matches[0].distance.abs() < 1e-9);
		}
	}

	#[test]
	fn matches_come_back_in_ascending_distance_order() {
		let palette = test_palette();
		let matches = palette.find_closest(Srgb::new(200, 30, 30), DeltaE::Ciede2000, palette.len());

		assert_eq!(matches.len(), palette.len());
		for pair in matches.windows(2) {
			assert!(pair[0].distance <= pair[1].distance);
		}
	}

	#[test]
	fn limit_caps_the_number_of_matches() {
		let palette = test_palette();
		assert_eq!(palette.find_closest(Srgb::new(0, 0, 0), DeltaE::Cie76, 2).len(), 2);
		assert_eq!(palette.find_closest(Srgb::new(0, 0, 0), DeltaE::Cie76, 100).len(), palette.len());
		assert!(palette.find_closest(Srgb::new(0, 0, 0), DeltaE::Cie76, 0).is_empty());
	}

	#[test]
	fn empty_palette_gives_no_matches() {
		let palette = ReferencePalette::new(Vec::new());
		assert!(palette.is_empty());
		assert!(palette.find_closest(Srgb::new(200, 30, 30), DeltaE::Ciede2000, 3).is_empty());
	}

	#[test]
	fn metrics_disagree_on_magnitude() {
		let palette = test_palette();
		let query = Srgb::new(120, 130, 90);

		let cie76 = palette.find_closest(query, DeltaE::Cie76, 1);
		let ciede2000 = palette.find_closest(query, DeltaE::Ciede2000, 1);

		assert!((cie76[0].distance - ciede2000[0].distance).abs() > 1e-3);
	}

	#[test]
	fn hex_chips_parse_with_or_without_the_hash() {
		match (signal_red("#C81E1E"), signal_red("C81E1E")) {
			(Ok(with_hash), Ok(without)) => {
				assert_eq!(with_hash.color, Srgb::new(200, 30, 30));
				assert_eq!(with_hash, without);
			},
			(with_hash, without) => panic!("hex chips failed to parse: {with_hash:?}, {without:?}"),
		}
	}

	#[test]
	fn invalid_hex_chips_are_rejected() {
		assert!(signal_red("#C81E").is_err());
		assert!(signal_red("garbage").is_err());
	}
}
