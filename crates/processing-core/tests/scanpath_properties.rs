use proptest::prelude::*;
use sal360_common::ScanPathConfig;
use sal360_processing_core::scanpath::{ScanPath, ScanPathPredictor, REVISIT_WINDOW};
use sal360_sphere_model::ImageBuffer;

fn config(repetitions: usize, fixations: usize, seed: u64) -> ScanPathConfig {
    ScanPathConfig {
        experiment_repetition: repetitions,
        number_fixations: fixations,
        duration_secs: 12.5,
        seed,
        grid_width: 16,
        pyramid_levels: 2,
        ..Default::default()
    }
}

fn assert_shape(path: &ScanPath, repetitions: usize, fixations: usize, duration: f64) {
    assert_eq!(path.observers.len(), repetitions);
    assert_eq!(path.rows().len(), repetitions * fixations);
    for observer in &path.observers {
        assert_eq!(observer.fixations.len(), fixations);
        assert_eq!(observer.fixations[0].timestamp_start, 0.0);
        for pair in observer.fixations.windows(2) {
            assert!(pair[0].timestamp_end <= pair[1].timestamp_start + 1e-12);
            assert!(pair[1].timestamp_start <= pair[1].timestamp_end);
        }
        let last = observer.fixations.last().unwrap();
        assert!((last.timestamp_end - duration).abs() < 1e-9);
    }
}

fn assert_no_recent_revisit(path: &ScanPath) {
    for observer in path.observers.iter().filter(|o| o.fallbacks == 0) {
        for (i, node) in observer.nodes.iter().enumerate() {
            let window = &observer.nodes[i + 1..(i + REVISIT_WINDOW).min(observer.nodes.len())];
            assert!(!window.contains(node), "node {node} revisited within {REVISIT_WINDOW} steps");
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    #[test]
    fn random_fields_give_well_formed_paths(
        values in prop::collection::vec(0.0f32..1.0, 64 * 32),
        repetitions in 1usize..5,
        fixations in 1usize..40,
        seed in any::<u64>(),
    ) {
        let field = ImageBuffer::from_raw(64, 32, 1, values).unwrap();
        let predictor = ScanPathPredictor::new(config(repetitions, fixations, seed));
        let path = predictor.predict(&field).unwrap();

        assert_shape(&path, repetitions, fixations, 12.5);
        assert_no_recent_revisit(&path);
        let all_in_bounds = path.rows().iter().all(|r| {
            let f = r.fixation;
            (0.0..64.0).contains(&(f.x + 0.5)) && (0.0..32.0).contains(&(f.y + 0.5))
        });
        prop_assert!(all_in_bounds);
    }
}

#[test]
fn all_zero_field_terminates_with_full_shape() {
    let field = ImageBuffer::new(64, 32, 1).unwrap();
    let predictor = ScanPathPredictor::new(config(3, 30, 1));
    let path = predictor.predict(&field).unwrap();

    assert_shape(&path, 3, 30, 12.5);
    assert_no_recent_revisit(&path);
    // zero weights share the duration equally
    let first = path.observers[0].fixations[0];
    assert!((first.duration() - 12.5 / 30.0).abs() < 1e-9);
}

#[test]
fn tiny_grid_falls_back_instead_of_failing() {
    // 4 × 2 base grid has fewer nodes than the revisit window
    let field = ImageBuffer::filled(8, 4, 1, 1.0).unwrap();
    let predictor = ScanPathPredictor::new(ScanPathConfig {
        grid_width: 4,
        pyramid_levels: 1,
        ..config(1, 15, 3)
    });
    let path = predictor.predict(&field).unwrap();
    assert_shape(&path, 1, 15, 12.5);
    assert!(path.degenerate_fallbacks > 0);
}

#[test]
fn fixations_are_scaled_to_the_source_panorama() {
    let field = ImageBuffer::filled(64, 32, 1, 0.5).unwrap();
    let predictor = ScanPathPredictor::new(config(2, 10, 9));
    let path = predictor.predict_scaled(&field, 4096, 2048).unwrap();
    assert!(path.rows().iter().any(|r| r.fixation.x > 64.0));
    assert!(path
        .rows()
        .iter()
        .all(|r| r.fixation.x < 4096.0 && r.fixation.y < 2048.0));
}
