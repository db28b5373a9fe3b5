//! Conversion from sRGB to the CIE L*a*b* color space

use palette::Srgb;

/// A color in the CIE L*a*b* color space, relative to the D65 reference white
///
/// `l` is nominally in `0.0..=100.0`, while `a` and `b` are unbounded but typically fall within `-128.0..=127.0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Lab {
	/// Lightness
	pub l: f64,
	/// Green-red axis
	pub a: f64,
	/// Blue-yellow axis
	pub b: f64,
}

impl Lab {
	/// Create a [`Lab`] color from its components
	#[must_use]
	pub const fn new(l: f64, a: f64, b: f64) -> Self {
		Self { l, a, b }
	}
}

/// D65 reference white, X component
const D65_X: f64 = 0.95047;
/// D65 reference white, Y component
const D65_Y: f64 = 1.0;
/// D65 reference white, Z component
const D65_Z: f64 = 1.08883;

/// Row-major matrix taking linear sRGB to XYZ under the D65 illuminant
const SRGB_TO_XYZ: [[f64; 3]; 3] = [
	[0.4124564, 0.3575761, 0.1804375],
	[0.2126729, 0.7151522, 0.0721750],
	[0.0193339, 0.1191920, 0.9503041],
];

/// Inverse breakpoint of the piecewise sRGB transfer function
const SRGB_LINEAR_BREAKPOINT: f64 = 0.04045;

/// Threshold between the cube root and linear segments of the Lab nonlinearity
const LAB_THRESHOLD: f64 = 0.008856;

/// Slope of the linear segment of the Lab nonlinearity
const LAB_SLOPE: f64 = 7.787;

/// Undo the sRGB gamma encoding of a normalized channel value
fn srgb_to_linear(c: f64) -> f64 {
	if c <= SRGB_LINEAR_BREAKPOINT {
		c / 12.92
	} else {
		((c + 0.055) / 1.055).powf(2.4)
	}
}

/// The Lab nonlinearity applied to each white-normalized XYZ component
fn lab_f(t: f64) -> f64 {
	if t > LAB_THRESHOLD {
		t.cbrt()
	} else {
		LAB_SLOPE * t + 16.0 / 116.0
	}
}

/// Convert an sRGB color to [`Lab`]
///
/// This is a total, deterministic function: every byte triple maps to a finite Lab color.
/// The constants above are fixed so that distances computed from the result
/// stay reproducible against other implementations of the same pipeline.
#[must_use]
pub fn rgb_to_lab(rgb: Srgb<u8>) -> Lab {
	let r = srgb_to_linear(f64::from(rgb.red) / 255.0);
	let g = srgb_to_linear(f64::from(rgb.green) / 255.0);
	let b = srgb_to_linear(f64::from(rgb.blue) / 255.0);

	let [xr, yr, zr] = SRGB_TO_XYZ;
	let x = xr[0] * r + xr[1] * g + xr[2] * b;
	let y = yr[0] * r + yr[1] * g + yr[2] * b;
	let z = zr[0] * r + zr[1] * g + zr[2] * b;

	let fx = lab_f(x / D65_X);
	let fy = lab_f(y / D65_Y);
	let fz = lab_f(z / D65_Z);

	Lab {
		l: 116.0 * fy - 16.0,
		a: 500.0 * (fx - fy),
		b: 200.0 * (fy - fz),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn black_is_the_lab_origin() {
		let black = rgb_to_lab(Srgb::new(0, 0, 0));
		assert!(black.l.abs() < 1e-9);
		assert!(black.a.abs() < 1e-9);
		assert!(black.b.abs() < 1e-9);
	}

	#[test]
	fn white_is_full_lightness_with_neutral_axes() {
		let white = rgb_to_lab(Srgb::new(255, 255, 255));
		assert!((white.l - 100.0).abs() < 0.1);
		assert!(white.a.abs() < 0.1);
		assert!(white.b.abs() < 0.1);
	}

	#[test]
	fn grays_stay_on_the_neutral_axis() {
		for v in [32, 64, 128, 192, 224] {
			let gray = rgb_to_lab(Srgb::new(v, v, v));
			assert!(gray.a.abs() < 0.01, "a = {} for gray {v}", gray.a);
			assert!(gray.b.abs() < 0.01, "b = {} for gray {v}", gray.b);
		}
	}

	#[test]
	fn lightness_increases_with_gray_level() {
		let mut last = -1.0;
		for v in (0..=255).step_by(15) {
			let l = rgb_to_lab(Srgb::new(v, v, v)).l;
			assert!(l > last);
			last = l;
		}
	}

	#[test]
	fn primaries_land_in_expected_ranges() {
		let red = rgb_to_lab(Srgb::new(255, 0, 0));
		assert!((50.0..=56.0).contains(&red.l));
		assert!((75.0..=85.0).contains(&red.a));
		assert!((60.0..=72.0).contains(&red.b));

		let green = rgb_to_lab(Srgb::new(0, 255, 0));
		assert!((85.0..=90.0).contains(&green.l));
		assert!((-90.0..=-80.0).contains(&green.a));
		assert!((78.0..=88.0).contains(&green.b));

		let blue = rgb_to_lab(Srgb::new(0, 0, 255));
		assert!((29.0..=35.0).contains(&blue.l));
		assert!((75.0..=85.0).contains(&blue.a));
		assert!((-112.0..=-103.0).contains(&blue.b));
	}

	#[test]
	fn lab_nonlinearity_is_continuous_at_the_threshold() {
		let below = lab_f(LAB_THRESHOLD - 1e-9);
		let above = lab_f(LAB_THRESHOLD + 1e-9);
		assert!((below - above).abs() < 1e-4);
	}
}
