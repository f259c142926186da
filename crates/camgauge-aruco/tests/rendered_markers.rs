use camgauge_aruco::{
    builtin_dictionary, detect_markers, render_marker, Dictionary, MarkerDetector, MarkerDetectorParams,
};
use image::{imageops, GrayImage, Luma};
use nalgebra::Point2;

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Paste `marker` onto a white canvas at `(ox, oy)`.
fn scene(marker: &GrayImage, ox: u32, oy: u32) -> GrayImage {
    let mut canvas = GrayImage::from_pixel(360, 300, Luma([255]));
    imageops::replace(&mut canvas, marker, ox as i64, oy as i64);
    canvas
}

fn close(a: Point2<f64>, b: Point2<f64>, tol: f64) -> bool {
    (a - b).norm() < tol
}

#[test]
fn marker_found_under_all_rotations() {
    init();
    let dict = builtin_dictionary("GEN_4X4_50").unwrap();
    let detector = MarkerDetector::new(dict.clone(), MarkerDetectorParams::default()).unwrap();
    let marker = render_marker(dict, 7, 12, 2).unwrap();
    let (ox, oy) = (100.0, 80.0);
    // Marker frame spans pixels 24..96 of the rendered tile.
    let square = [
        Point2::new(ox + 24.0, oy + 24.0),
        Point2::new(ox + 96.0, oy + 24.0),
        Point2::new(ox + 96.0, oy + 96.0),
        Point2::new(ox + 24.0, oy + 96.0),
    ];

    let mut rotations = Vec::new();
    let mut tile = marker;
    for k in 0..4 {
        let dets = detector.detect(&scene(&tile, ox as u32, oy as u32));
        assert_eq!(dets.len(), 1, "rotation {k}: {dets:?}");
        let det = &dets[0];
        assert_eq!(det.id, 7);
        assert_eq!(det.hamming, 0);
        // Each clockwise quarter turn carries the marker's own top-left one
        // corner further around the image square.
        for i in 0..4 {
            assert!(
                close(det.corners[i], square[(i + k) % 4], 2.0),
                "rotation {k}, corner {i}: {:?}",
                det.corners[i]
            );
        }
        rotations.push(det.rotation);
        tile = imageops::rotate90(&tile);
    }
    rotations.sort_unstable();
    rotations.dedup();
    assert_eq!(rotations.len(), 4);
}

#[test]
fn refined_corners_sit_on_frame_edges() {
    init();
    let dict = builtin_dictionary("GEN_4X4_50").unwrap();
    let marker = render_marker(dict, 11, 12, 2).unwrap();
    let img = scene(&marker, 100, 80);
    // Pixel centers are integral, so the frame's outer edge is half a pixel
    // outside the first and last dark pixel.
    let expected = [
        Point2::new(123.5, 103.5),
        Point2::new(195.5, 103.5),
        Point2::new(195.5, 175.5),
        Point2::new(123.5, 175.5),
    ];

    let refined = MarkerDetector::new(dict.clone(), MarkerDetectorParams::default())
        .unwrap()
        .detect(&img);
    assert_eq!(refined.len(), 1);
    let mut corners = refined[0].corners.to_vec();
    let raw_params = MarkerDetectorParams {
        corner_refinement: false,
        ..Default::default()
    };
    let raw = MarkerDetector::new(dict.clone(), raw_params).unwrap().detect(&img);
    assert_eq!(raw.len(), 1);

    corners.sort_by(|a, b| (a.y, a.x).partial_cmp(&(b.y, b.x)).unwrap());
    let mut want = expected.to_vec();
    want.sort_by(|a, b| (a.y, a.x).partial_cmp(&(b.y, b.x)).unwrap());
    for (got, want) in corners.iter().zip(&want) {
        assert!(close(*got, *want, 0.05), "{got:?} vs {want:?}");
    }
    assert_ne!(raw[0].corners, refined[0].corners);
}

#[test]
fn opencv_dictionary_export_detects() {
    init();
    // OpenCV DICT_4X4_50 id 0; '1' is a white cell.
    let bits = "1011010100110010";
    let json = format!(r#"{{"nmarkers":1,"markersize":4,"maxCorrectionBits":1,"marker_0":"{bits}"}}"#);
    let dict = Dictionary::from_opencv_json_str("DICT_4X4_50", &json).unwrap();
    let marker = render_marker(&dict, 0, 12, 2).unwrap();
    // Inner cell (r, c) is centered (3 + c) * 12 + 6 pixels in.
    for (idx, ch) in bits.chars().enumerate() {
        let (r, c) = ((idx / 4) as u32, (idx % 4) as u32);
        let level = marker.get_pixel((3 + c) * 12 + 6, (3 + r) * 12 + 6)[0];
        assert_eq!(level == 255, ch == '1', "cell {idx}");
    }

    let dets = detect_markers(&scene(&marker, 60, 40), &dict, &MarkerDetectorParams::default()).unwrap();
    assert_eq!(dets.len(), 1);
    assert_eq!((dets[0].id, dets[0].hamming), (0, 0));
}

#[test]
fn several_markers_sorted_by_id() {
    init();
    let dict = builtin_dictionary("GEN_5X5_100").unwrap();
    let mut canvas = GrayImage::from_pixel(400, 200, Luma([255]));
    for (slot, id) in [42u32, 5].into_iter().enumerate() {
        let m = render_marker(dict, id, 10, 1).unwrap();
        imageops::replace(&mut canvas, &m, 40 + slot as i64 * 180, 50);
    }
    let dets = detect_markers(&canvas, dict, &MarkerDetectorParams::default()).unwrap();
    let ids: Vec<u32> = dets.iter().map(|d| d.id).collect();
    assert_eq!(ids, vec![5, 42]);
}

#[test]
fn blank_frame_has_no_markers() {
    init();
    let dict = builtin_dictionary("GEN_4X4_50").unwrap();
    let img = GrayImage::from_pixel(200, 150, Luma([128]));
    assert!(detect_markers(&img, dict, &MarkerDetectorParams::default())
        .unwrap()
        .is_empty());
}

#[test]
fn dictionary_round_trips_through_json_file() {
    let dict = builtin_dictionary("GEN_4X4_50").unwrap();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dict.json");
    std::fs::write(&path, serde_json::to_string(dict).unwrap()).unwrap();
    let loaded = Dictionary::load_json(&path).unwrap();
    assert_eq!(&loaded, dict);

    std::fs::write(&path, r#"{"name":"bad","marker_size":4,"max_correction_bits":0,"codes":[]}"#).unwrap();
    assert!(Dictionary::load_json(&path).is_err());
}
