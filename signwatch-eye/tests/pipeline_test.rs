//! Detection pipeline from raw model output to dashboard analysis

use image::{Rgb, RgbImage};
use mockall::mock;
use signwatch_eye::advice::RecommendationKind;
use signwatch_eye::models::yolo::{decode_output, non_max_suppression};
use signwatch_eye::utils::Letterbox;
use signwatch_eye::{
    analyze, AnnotationOptions, Annotator, BoundingBox, Detection, DetectionParams, DetectionPipeline, Detector,
    VisionError,
};
use std::sync::Arc;

mock! {
    pub Model {}
    impl Detector for Model {
        fn detect(&self, image: &RgbImage, params: &DetectionParams) -> Result<Vec<Detection>, VisionError>;
    }
}

// Three anchors, two classes, channel-major
const ROWS: [[f32; 3]; 6] = [
    [32.0, 33.0, 10.0],
    [32.0, 32.0, 30.0],
    [20.0, 20.0, 4.0],
    [10.0, 10.0, 4.0],
    [0.9, 0.7, 0.1],
    [0.05, 0.1, 0.3],
];

fn channel_major() -> Vec<f32> {
    ROWS.iter().flatten().copied().collect()
}

fn anchor_major() -> Vec<f32> {
    (0..3).flat_map(|a| ROWS.iter().map(move |row| row[a])).collect()
}

fn assert_close(actual: f32, expected: f32) {
    assert!((actual - expected).abs() < 1e-3, "{} != {}", actual, expected);
}

#[test]
fn test_decode_and_suppress() {
    let placement = Letterbox::fit(200, 100, 64).unwrap();
    assert_eq!((placement.pad_x, placement.pad_y), (0, 16));

    let candidates = decode_output(&[1, 6, 3], &channel_major(), 2, &placement, (200, 100), 0.5).unwrap();
    assert_eq!(candidates.len(), 2);

    let kept = non_max_suppression(candidates, 0.4, 300);
    assert_eq!(kept.len(), 1);
    let best = kept[0];
    assert_eq!(best.class_id, 0);
    assert_close(best.score, 0.9);
    assert_close(best.x1, 68.75);
    assert_close(best.y1, 34.375);
    assert_close(best.x2, 131.25);
    assert_close(best.y2, 65.625);
}

#[test]
fn test_both_output_layouts_agree() {
    let placement = Letterbox::fit(200, 100, 64).unwrap();
    let a = decode_output(&[1, 6, 3], &channel_major(), 2, &placement, (200, 100), 0.2).unwrap();
    let b = decode_output(&[1, 3, 6], &anchor_major(), 2, &placement, (200, 100), 0.2).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.len(), 3);
}

#[test]
fn test_lenient_iou_keeps_overlapping_boxes() {
    let placement = Letterbox::fit(200, 100, 64).unwrap();
    let candidates = decode_output(&[1, 6, 3], &channel_major(), 2, &placement, (200, 100), 0.5).unwrap();
    assert_eq!(non_max_suppression(candidates, 1.0, 300).len(), 2);
}

#[test]
fn test_mismatched_class_count_is_rejected() {
    let placement = Letterbox::fit(64, 64, 64).unwrap();
    let result = decode_output(&[1, 6, 3], &channel_major(), 15, &placement, (64, 64), 0.5);
    assert!(matches!(result, Err(VisionError::Model(_))));
}

#[test]
fn test_analysis_forwards_params_and_builds_panels() {
    let params = DetectionParams::new(0.25, 0.6, 480);

    let mut model = MockModel::new();
    model
        .expect_detect()
        .withf(move |image, p| image.dimensions() == (120, 80) && *p == params)
        .times(1)
        .returning(|_, _| {
            Ok(vec![
                Detection {
                    bbox: BoundingBox::new(10, 30, 40, 60),
                    confidence: 0.93,
                    class_id: 7,
                    class_name: "Speed Limit 30".to_string(),
                },
                Detection {
                    bbox: BoundingBox::new(70, 30, 100, 60),
                    confidence: 0.55,
                    class_id: 0,
                    class_name: "Green Light".to_string(),
                },
            ])
        });

    let pipeline = DetectionPipeline::new(Arc::new(model), signwatch_eye::classes::default_class_names());
    let image = RgbImage::from_pixel(120, 80, Rgb([200, 200, 200]));

    let analysis = analyze(
        &pipeline,
        &Annotator::without_font(),
        &image,
        &params,
        &AnnotationOptions::default(),
    )
    .unwrap();

    assert_eq!(analysis.report.image_shape, (80, 120, 3));
    assert_eq!(analysis.report.model_info, params);
    assert_eq!(analysis.rows[0].coordinates, "(10, 30)");
    assert_eq!(analysis.rows[1].confidence, "55.00%");

    // Only the confident speed limit produces advice
    assert_eq!(analysis.recommendations.len(), 1);
    assert_eq!(analysis.recommendations[0].kind, RecommendationKind::Warning);
    assert_eq!(analysis.recommendations[0].message, "Speed limit: 30 km/h");

    let chart = analysis.chart.as_ref().unwrap();
    assert_eq!(chart.data[0].x, vec!["Speed Limit 30".to_string(), "Green Light".to_string()]);

    // Speed limits are drawn in cyan
    assert_eq!(analysis.annotated_image.get_pixel(10, 45), &Rgb([0, 255, 255]));
    assert!(analysis.annotated_png_data_url().unwrap().starts_with("data:image/png;base64,"));
}

#[test]
fn test_detector_failure_propagates() {
    let mut model = MockModel::new();
    model
        .expect_detect()
        .returning(|_, _| Err(VisionError::Model("session crashed".to_string())));

    let pipeline = DetectionPipeline::new(Arc::new(model), vec![]);
    let result = analyze(
        &pipeline,
        &Annotator::without_font(),
        &RgbImage::new(16, 16),
        &DetectionParams::default(),
        &AnnotationOptions::default(),
    );
    assert!(matches!(result, Err(VisionError::Model(_))));
}
