use assert_cmd::Command;
use camgauge::aruco::{builtin_dictionary, render_marker};
use image::{imageops, GrayImage, Luma, Rgb, RgbImage};
use predicates::prelude::*;

fn camgauge() -> Command {
    Command::cargo_bin("camgauge").unwrap()
}

#[test]
fn distance_between_points_in_centimeters() {
    camgauge()
        .args(["measure-distance", "[[0, 0, 1], [0, 0, 2]]"])
        .assert()
        .success()
        .stdout(predicate::str::contains("100.00 cm"));
}

#[test]
fn area_of_a_square_decimeter() {
    camgauge()
        .args([
            "measure-area",
            "[[0, 0, 1], [0.1, 0, 1], [0.1, 0.1, 1], [0, 0.1, 1]]",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("100.00 cm²"));
}

#[test]
fn area_needs_three_vertices() {
    camgauge()
        .args(["measure-area", "[[0, 0, 1], [0.1, 0, 1]]"])
        .assert()
        .failure()
        .stderr(predicate::str::starts_with("error:"));
}

#[test]
fn points_read_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("points.json");
    std::fs::write(&path, "[[0.5, 0, 1], [0.5, 0.3, 1.4]]").unwrap();
    camgauge()
        .arg("measure-distance")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("50.00 cm"));
}

#[test]
fn identity_calibration_leaves_image_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let calib = dir.path().join("calibration_results.csv");
    std::fs::write(
        &calib,
        "Camera Matrix:\n1,0,0,\n0,1,0,\n0,0,1,\n\nDistortion Coefficients:\n0,0,0,0,0,\n",
    )
    .unwrap();
    let input = dir.path().join("in.png");
    let output = dir.path().join("out.png");
    let frame = RgbImage::from_fn(40, 30, |x, y| Rgb([(x * 6) as u8, (y * 8) as u8, ((x + y) * 3) as u8]));
    frame.save(&input).unwrap();

    camgauge()
        .arg("undistort")
        .arg("--calibration")
        .arg(&calib)
        .arg("--input")
        .arg(&input)
        .arg("--output")
        .arg(&output)
        .assert()
        .success();
    assert_eq!(image::open(&output).unwrap().to_rgb8(), frame);
}

#[test]
fn zero_camera_matrix_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let calib = dir.path().join("zero.csv");
    std::fs::write(
        &calib,
        "Camera Matrix:\n0,0,0,\n0,0,0,\n0,0,1,\n\nDistortion Coefficients:\n0,0,0,0,0,\n",
    )
    .unwrap();
    let input = dir.path().join("in.png");
    RgbImage::from_pixel(8, 8, Rgb([10, 20, 30])).save(&input).unwrap();

    camgauge()
        .arg("undistort")
        .arg("--calibration")
        .arg(&calib)
        .arg("--input")
        .arg(&input)
        .arg("--output")
        .arg(dir.path().join("out.png"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("error:"));
}

#[test]
fn markers_printed_as_json() {
    let dict = builtin_dictionary("GEN_4X4_50").unwrap();
    let tile = render_marker(dict, 7, 12, 2).unwrap();
    let mut canvas = GrayImage::from_pixel(360, 300, Luma([255]));
    imageops::replace(&mut canvas, &tile, 100, 80);

    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("marker.png");
    let annotated = dir.path().join("annotated.png");
    canvas.save(&input).unwrap();

    camgauge()
        .arg("detect-markers")
        .arg("--input")
        .arg(&input)
        .args(["--dictionary", "GEN_4X4_50"])
        .arg("--annotated")
        .arg(&annotated)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"id\": 7"));
    assert_eq!(image::open(&annotated).unwrap().dimensions(), (360, 300));
}

#[test]
fn calibrate_without_images_fails() {
    let dir = tempfile::tempdir().unwrap();
    camgauge()
        .arg("calibrate")
        .arg("--images")
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("no images found"));
}

#[test]
fn default_config_round_trips_through_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("camgauge.json");
    camgauge()
        .arg("default-config")
        .arg("--output")
        .arg(&path)
        .assert()
        .success();
    let cfg = camgauge::AppConfig::load_json(&path).unwrap();
    assert_eq!(cfg, camgauge::AppConfig::default());

    camgauge()
        .arg("--config")
        .arg(&path)
        .args(["measure-distance", "[[0, 0, 0], [0, 0.25, 0]]"])
        .assert()
        .success()
        .stdout(predicate::str::contains("25.00 cm"));
}
