//! Frame annotations drawn with `imageproc::drawing`.

use camgauge_aruco::MarkerDetection;
use camgauge_chessboard::ChessboardDetection;
use camgauge_core::{CameraModel, Pose};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_cross_mut, draw_filled_circle_mut, draw_hollow_circle_mut, draw_line_segment_mut};
use nalgebra::{Point2, Point3};

pub const RED: Rgb<u8> = Rgb([230, 40, 40]);
pub const GREEN: Rgb<u8> = Rgb([40, 200, 60]);
pub const BLUE: Rgb<u8> = Rgb([50, 90, 240]);
pub const YELLOW: Rgb<u8> = Rgb([250, 210, 30]);
pub const MAGENTA: Rgb<u8> = Rgb([220, 50, 220]);

fn to_f32(p: Point2<f64>) -> (f32, f32) {
    (p.x as f32, p.y as f32)
}

fn to_i32(p: Point2<f64>) -> (i32, i32) {
    (p.x.round() as i32, p.y.round() as i32)
}

fn line(frame: &mut RgbImage, a: Point2<f64>, b: Point2<f64>, color: Rgb<u8>) {
    draw_line_segment_mut(frame, to_f32(a), to_f32(b), color);
}

/// Corners as circles joined in detection order, one color per row.
pub fn draw_chessboard(frame: &mut RgbImage, detection: &ChessboardDetection) {
    const ROW_COLORS: [Rgb<u8>; 4] = [RED, YELLOW, GREEN, BLUE];
    let cols = detection.spec.cols as usize;
    for (k, p) in detection.corners.iter().enumerate() {
        let color = ROW_COLORS[(k / cols.max(1)) % ROW_COLORS.len()];
        draw_hollow_circle_mut(frame, to_i32(*p), 4, color);
        if let Some(next) = detection.corners.get(k + 1) {
            line(frame, *p, *next, color);
        }
    }
}

/// Marker outline with its first (top-left) corner marked.
pub fn draw_marker(frame: &mut RgbImage, marker: &MarkerDetection) {
    let c = &marker.corners;
    for i in 0..4 {
        line(frame, c[i], c[(i + 1) % 4], GREEN);
    }
    draw_filled_circle_mut(frame, to_i32(c[0]), 3, RED);
    let center = marker.center();
    draw_cross_mut(frame, MAGENTA, center.x.round() as i32, center.y.round() as i32);
}

/// Local x, y and z axes of `pose`, `length` long, in red, green and blue.
/// Axes that do not project are skipped.
pub fn draw_axes(frame: &mut RgbImage, camera: &CameraModel, pose: &Pose, length: f64) {
    let Some(origin) = camera.project(pose, &Point3::origin()) else {
        return;
    };
    let tips = [
        (Point3::new(length, 0.0, 0.0), RED),
        (Point3::new(0.0, length, 0.0), GREEN),
        (Point3::new(0.0, 0.0, length), BLUE),
    ];
    for (tip, color) in tips {
        if let Some(end) = camera.project(pose, &tip) {
            line(frame, origin, end, color);
        }
    }
}

/// A camera-frame point as a filled dot.
pub fn draw_point(frame: &mut RgbImage, camera: &CameraModel, point: &Point3<f64>, color: Rgb<u8>) {
    if let Some(p) = camera.project_camera_point(point) {
        draw_filled_circle_mut(frame, to_i32(p), 4, color);
    }
}

/// Camera-frame points joined in order, closing the loop when `closed`.
pub fn draw_polyline(frame: &mut RgbImage, camera: &CameraModel, points: &[Point3<f64>], closed: bool, color: Rgb<u8>) {
    let projected: Vec<Option<Point2<f64>>> = points.iter().map(|p| camera.project_camera_point(p)).collect();
    for p in projected.iter().flatten() {
        draw_filled_circle_mut(frame, to_i32(*p), 3, color);
    }
    let n = projected.len();
    let edges = if closed && n > 2 { n } else { n.saturating_sub(1) };
    for i in 0..edges {
        if let (Some(a), Some(b)) = (projected[i], projected[(i + 1) % n]) {
            line(frame, a, b, color);
        }
    }
}
