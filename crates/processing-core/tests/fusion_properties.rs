use proptest::prelude::*;
use sal360_common::KernelKind;
use sal360_processing_core::fusion::{back_project, FusionAccumulator, TileContribution};
use sal360_processing_core::tiling;
use sal360_sphere_model::ImageBuffer;

fn contributions(values: &[u32], w: usize, h: usize) -> Vec<TileContribution> {
    let schedule = tiling::schedule(w, 90.0, None, false).unwrap();
    schedule
        .orientations
        .iter()
        .zip(values)
        .map(|(o, v)| {
            let field = ImageBuffer::filled(
                schedule.tile_width,
                schedule.tile_height,
                1,
                *v as f32 / 1_000_000.0,
            )
            .unwrap();
            back_project(&field, o, w, h, KernelKind::Nearest).unwrap()
        })
        .collect()
}

fn accumulate(
    parts: &[TileContribution],
    order: &[usize],
    w: usize,
    h: usize,
) -> FusionAccumulator {
    let mut acc = FusionAccumulator::new(w, h).unwrap();
    for i in order {
        acc.add(&parts[*i]);
    }
    acc
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn fusion_is_order_independent(
        values in prop::collection::vec(0u32..=1_000_000, 40),
        order in Just((0..40).collect::<Vec<usize>>()).prop_shuffle(),
    ) {
        let (w, h) = (64, 32);
        let parts = contributions(&values, w, h);
        prop_assert_eq!(parts.len(), 40);

        let natural: Vec<usize> = (0..parts.len()).collect();
        let a = accumulate(&parts, &natural, w, h);
        let b = accumulate(&parts, &order, w, h);

        prop_assert_eq!(a.counts(), b.counts());
        prop_assert_eq!(a.finalize().unwrap(), b.finalize().unwrap());
    }
}

#[test]
fn default_tiling_covers_every_non_pole_pixel() {
    let (w, h) = (256, 128);
    for fov in [60.0, 90.0, 120.0] {
        let schedule = tiling::schedule(w, fov, None, false).unwrap();
        let field = ImageBuffer::filled(schedule.tile_width, schedule.tile_height, 1, 1.0).unwrap();

        let mut acc = FusionAccumulator::new(w, h).unwrap();
        for o in &schedule.orientations {
            acc.add(&back_project(&field, o, w, h, KernelKind::Bilinear).unwrap());
        }

        let counts = acc.counts();
        for y in 1..h - 1 {
            for x in 0..w {
                assert!(
                    counts[y * w + x] >= 1,
                    "fov {fov}: pixel ({x}, {y}) has no contribution"
                );
            }
        }
        let fused = acc.finalize().unwrap();
        assert!(fused.data()[w..w * (h - 1)].iter().all(|v| (v - 1.0).abs() < 1e-5));
    }
}

#[test]
fn equatorial_only_leaves_polar_caps_uncovered() {
    let (w, h) = (128, 64);
    let schedule = tiling::schedule(w, 90.0, None, true).unwrap();
    let field = ImageBuffer::filled(schedule.tile_width, schedule.tile_height, 1, 1.0).unwrap();
    let mut acc = FusionAccumulator::new(w, h).unwrap();
    for o in &schedule.orientations {
        acc.add(&back_project(&field, o, w, h, KernelKind::Bilinear).unwrap());
    }

    let counts = acc.counts();
    // equator row covered, top row not
    assert!((0..w).all(|x| counts[(h / 2) * w + x] >= 1));
    assert!((0..w).all(|x| counts[x] == 0));
}
