use sal360_common::{ModelKind, PipelineConfig, PriorMode, ScanPathConfig};
use sal360_processing_core::saliency::ConstantModel;
use sal360_processing_core::{PipelineStatus, SaliencyPipeline, ScanPathPredictor};
use sal360_sphere_model::ImageBuffer;

fn uniform_gray() -> ImageBuffer {
    ImageBuffer::filled(64, 32, 3, 0.5).expect("panorama should allocate")
}

#[test]
fn uniform_gray_with_constant_model_stays_finite() {
    let model = Box::new(ConstantModel::new(1.0));
    let pipeline = SaliencyPipeline::new(PipelineConfig::default(), model);
    let outcome = pipeline.run(&uniform_gray());

    assert_eq!(outcome.status, PipelineStatus::Ok);
    assert!(outcome.error.is_none());
    let field = &outcome.output.saliency;
    assert_eq!((field.width(), field.height()), (64, 32));
    // max == min during normalization must not divide by zero
    assert!(field.data().iter().all(|v| v.is_finite()));
    assert!(field.data().iter().all(|v| (0.0..=1.0).contains(v)));
}

#[test]
fn every_model_and_prior_handles_a_flat_panorama() {
    for kind in [ModelKind::Contrast, ModelKind::Constant, ModelKind::Passthrough] {
        for prior in [PriorMode::Off, PriorMode::Fixed, PriorMode::Adaptive] {
            let mut config = PipelineConfig {
                threads: 3,
                blur_sigma: 2.0,
                prior,
                ..Default::default()
            };
            config.model.kind = kind;

            let outcome = SaliencyPipeline::from_config(config).run(&uniform_gray());
            assert_ne!(outcome.status, PipelineStatus::Failed, "{kind}/{prior}");
            assert!(
                outcome.output.saliency.data().iter().all(|v| v.is_finite()),
                "{kind}/{prior} produced non-finite output"
            );
        }
    }
}

#[test]
fn fused_map_feeds_the_scan_path_predictor() {
    let pano = ImageBuffer::from_fn(128, 64, 3, |x, y, _| {
        if (40..50).contains(&x) && (28..36).contains(&y) {
            1.0
        } else {
            0.2
        }
    })
    .unwrap();
    let config = PipelineConfig {
        threads: 2,
        ..Default::default()
    };
    let output = SaliencyPipeline::from_config(config)
        .estimate(&pano)
        .expect("pipeline should succeed");

    let scan = ScanPathPredictor::new(ScanPathConfig {
        experiment_repetition: 4,
        number_fixations: 8,
        grid_width: 16,
        ..Default::default()
    })
    .predict_scaled(&output.saliency, pano.width(), pano.height())
    .expect("scan path should succeed");

    assert_eq!(scan.rows().len(), 32);
    let csv = scan.to_csv();
    assert_eq!(csv.lines().count(), 33);
}
