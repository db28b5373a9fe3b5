//! The CIE76 and CIEDE2000 perceptual color difference metrics

use crate::lab::Lab;

/// The perceptual distance metric used to compare two [`Lab`] colors
///
/// There is no `Default` impl, so every caller states which metric its results are built on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaE {
	/// CIE76, plain Euclidean distance in Lab space
	Cie76,
	/// CIEDE2000, the corrected anisotropic refinement of CIE76
	Ciede2000,
}

impl DeltaE {
	/// Compute the distance between two colors under this metric
	#[must_use]
	pub fn between(self, x: Lab, y: Lab) -> f64 {
		match self {
			Self::Cie76 => delta_e_76(x, y),
			Self::Ciede2000 => delta_e_2000(x, y),
		}
	}
}

/// The CIE76 color difference: Euclidean distance in Lab space
#[must_use]
pub fn delta_e_76(x: Lab, y: Lab) -> f64 {
	let dl = x.l - y.l;
	let da = x.a - y.a;
	let db = x.b - y.b;
	(dl * dl + da * da + db * db).sqrt()
}

/// The CIEDE2000 color difference, per CIE Technical Report 142-2001
///
/// Corrects the known non-uniformities of plain Euclidean Lab distance, most
/// notably in the blue region, which matters when "closest" must agree with
/// human judgment of physical color chips. Uses `kL` = `kC` = `kH` = 1.
#[must_use]
#[allow(clippy::float_cmp, clippy::similar_names)]
pub fn delta_e_2000(x: Lab, y: Lab) -> f64 {
	let c1 = x.a.hypot(x.b);
	let c2 = y.a.hypot(y.b);
	let c_mean = (c1 + c2) / 2.0;

	let c_mean_pow7 = c_mean.powi(7);
	let g = 0.5 * (1.0 - (c_mean_pow7 / (c_mean_pow7 + 25.0_f64.powi(7))).sqrt());

	let a1 = (1.0 + g) * x.a;
	let a2 = (1.0 + g) * y.a;
	let c1p = a1.hypot(x.b);
	let c2p = a2.hypot(y.b);
	let h1p = hue_angle(a1, x.b);
	let h2p = hue_angle(a2, y.b);

	let dl = y.l - x.l;
	let dc = c2p - c1p;

	// The hue difference is zero whenever either color has no chroma,
	// and is otherwise brought into [-180, 180] degrees.
	let dhp = if c1p * c2p == 0.0 {
		0.0
	} else {
		let d = h2p - h1p;
		if d > 180.0 {
			d - 360.0
		} else if d < -180.0 {
			d + 360.0
		} else {
			d
		}
	};
	let dh = 2.0 * (c1p * c2p).sqrt() * (dhp / 2.0).to_radians().sin();

	let l_mean = (x.l + y.l) / 2.0;
	let cp_mean = (c1p + c2p) / 2.0;

	let h_mean = if c1p * c2p == 0.0 {
		h1p + h2p
	} else if (h1p - h2p).abs() <= 180.0 {
		(h1p + h2p) / 2.0
	} else if h1p + h2p < 360.0 {
		(h1p + h2p + 360.0) / 2.0
	} else {
		(h1p + h2p - 360.0) / 2.0
	};

	let t = 1.0
		- 0.17 * (h_mean - 30.0).to_radians().cos()
		+ 0.24 * (2.0 * h_mean).to_radians().cos()
		+ 0.32 * (3.0 * h_mean + 6.0).to_radians().cos()
		- 0.20 * (4.0 * h_mean - 63.0).to_radians().cos();

	let l50 = (l_mean - 50.0) * (l_mean - 50.0);
	let sl = 1.0 + 0.015 * l50 / (20.0 + l50).sqrt();
	let sc = 1.0 + 0.045 * cp_mean;
	let sh = 1.0 + 0.015 * cp_mean * t;

	let dtheta = 30.0 * (-((h_mean - 275.0) / 25.0).powi(2)).exp();
	let cp_mean_pow7 = cp_mean.powi(7);
	let rc = 2.0 * (cp_mean_pow7 / (cp_mean_pow7 + 25.0_f64.powi(7))).sqrt();
	let rt = -rc * (2.0 * dtheta).to_radians().sin();

	let dl = dl / sl;
	let dc = dc / sc;
	let dh = dh / sh;

	(dl * dl + dc * dc + dh * dh + rt * dc * dh).sqrt()
}

/// The hue angle of an (a, b) pair in degrees, normalized to [0, 360)
///
/// Zero-chroma colors have no hue; their angle is defined as zero.
#[allow(clippy::float_cmp)]
fn hue_angle(a: f64, b: f64) -> f64 {
	if a == 0.0 && b == 0.0 {
		0.0
	} else {
		let h = b.atan2(a).to_degrees();
		if h < 0.0 {
			h + 360.0
		} else {
			h
		}
	}
}
