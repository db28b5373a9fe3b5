use chipmatch::{BackgroundFilter, ClusterOptions, DeltaE, PixelSamples, ReferenceColor, ReferencePalette};
use criterion::{
	black_box, criterion_group, criterion_main, measurement::WallTime, BenchmarkGroup, BenchmarkId, Criterion,
	SamplingMode,
};
use palette::Srgb;
use std::time::Duration;

/// Deterministic stand-in for a product photo: two color blocks over a white sweep
fn synthetic_photo(width: usize, height: usize) -> Vec<Srgb<u8>> {
	let mut pixels = Vec::with_capacity(width * height);
	for y in 0..height {
		for x in 0..width {
			let color = if x < width / 3 {
				Srgb::new(180 + (x % 40) as u8, 30 + (y % 20) as u8, 30)
			} else if x > (2 * width) / 3 {
				Srgb::new(30, 40 + (y % 25) as u8, 170 + (x % 50) as u8)
			} else {
				Srgb::new(244 + (x % 8) as u8, 244 + (y % 8) as u8, 246)
			};
			pixels.push(color);
		}
	}
	pixels
}

fn synthetic_palette(chips: usize) -> ReferencePalette {
	ReferencePalette::new(
		(0..chips)
			.map(|i| {
				let color = Srgb::new(((i * 37) % 256) as u8, ((i * 73) % 256) as u8, ((i * 151) % 256) as u8);
				ReferenceColor::new(format!("chip-{i}"), format!("CHIP {i}"), format!("Chip {i}"), color)
			})
			.collect(),
	)
}

fn create_group<'a>(c: &'a mut Criterion, name: &'a str) -> BenchmarkGroup<'a, WallTime> {
	let mut group = c.benchmark_group(name);
	group
		.sample_size(30)
		.noise_threshold(0.05)
		.sampling_mode(SamplingMode::Flat)
		.warm_up_time(Duration::from_millis(500));
	group
}

fn conversion(c: &mut Criterion) {
	let mut group = create_group(c, "conversion");

	let mut grid = Vec::new();
	for r in (0..u8::MAX).step_by(16) {
		for g in (0..u8::MAX).step_by(16) {
			for b in (0..u8::MAX).step_by(16) {
				grid.push(Srgb::new(r, g, b));
			}
		}
	}

	group.bench_function("rgb_to_lab", |b| {
		b.iter(|| {
			grid.iter()
				.map(|&srgb| chipmatch::rgb_to_lab(black_box(srgb)))
				.collect::<Vec<_>>()
		});
	});

	let labs = grid.iter().map(|&srgb| chipmatch::rgb_to_lab(srgb)).collect::<Vec<_>>();
	for metric in [DeltaE::Cie76, DeltaE::Ciede2000] {
		group.bench_with_input(BenchmarkId::new("delta_e", format!("{metric:?}")), &metric, |b, &metric| {
			b.iter(|| {
				labs.windows(2)
					.map(|pair| metric.between(black_box(pair[0]), black_box(pair[1])))
					.sum::<f64>()
			});
		});
	}
}

fn preprocessing(c: &mut Criterion) {
	let mut group = create_group(c, "preprocessing");

	for (width, height) in [(480, 270), (1920, 1080)] {
		let pixels = synthetic_photo(width, height);
		group.bench_with_input(
			BenchmarkId::from_parameter(format!("{width}x{height}")),
			&pixels,
			|b, pixels| {
				b.iter(|| PixelSamples::from_pixels(black_box(pixels), &BackgroundFilter::new()));
			},
		);
	}
}

fn kmeans(c: &mut Criterion) {
	let mut group = create_group(c, "kmeans");
	group.measurement_time(Duration::from_secs(2));

	let pixels = synthetic_photo(1920, 1080);
	let samples = PixelSamples::from_pixels(&pixels, &BackgroundFilter::new());

	for k in [4, 8, 16] {
		group.bench_with_input(BenchmarkId::new("k", k), &samples, |b, samples| {
			b.iter(|| chipmatch::dominant_colors(samples, &ClusterOptions::new().with_k(black_box(k))));
		});
	}
}

fn matching(c: &mut Criterion) {
	let mut group = create_group(c, "matching");

	let palette = synthetic_palette(1000);
	for metric in [DeltaE::Cie76, DeltaE::Ciede2000] {
		group.bench_with_input(
			BenchmarkId::new("find_closest", format!("{metric:?}")),
			&metric,
			|b, &metric| {
				b.iter(|| palette.find_closest(black_box(Srgb::new(200, 30, 30)), metric, black_box(3)));
			},
		);
	}
}

criterion_group!(benches, conversion, preprocessing, kmeans, matching);
criterion_main!(benches);
