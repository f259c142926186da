use std::f32::consts::{FRAC_PI_2, FRAC_PI_4, PI};

/// Absolute difference of two angles in radians, in `[0, π]`.
pub fn angle_diff_abs(a: f32, b: f32) -> f32 {
    let two_pi = 2.0 * PI;
    let mut diff = (b - a).rem_euclid(two_pi);
    if diff >= PI {
        diff -= two_pi;
    }
    diff.abs()
}

/// Angle between an undirected axis (modulo π) and a directed angle, in `[0, π/2]`.
pub fn axis_vec_diff(axis_angle: f32, vec_angle: f32) -> f32 {
    let d = angle_diff_abs(axis_angle, vec_angle);
    d.min(PI - d)
}

/// Whether an edge between two ChESS corners looks like a grid edge.
///
/// ChESS orientations follow the square diagonals, so a grid edge sits at
/// ~45° to the orientation of both endpoints, and neighboring corners have
/// orientations ~90° apart.
pub fn is_grid_edge(
    orientation_a: f32,
    orientation_b: f32,
    edge_angle: f32,
    tolerance: f32,
) -> bool {
    let ortho = (FRAC_PI_2 - axis_vec_diff(orientation_a, orientation_b)).abs();
    let ea = (axis_vec_diff(orientation_a, edge_angle) - FRAC_PI_4).abs();
    let eb = (axis_vec_diff(orientation_b, edge_angle) - FRAC_PI_4).abs();
    ortho <= tolerance && ea <= tolerance && eb <= tolerance
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn axis_difference_ignores_direction() {
        assert!(axis_vec_diff(0.0, PI).abs() < 1e-6);
        assert!((axis_vec_diff(0.0, 3.0 * FRAC_PI_4) - FRAC_PI_4).abs() < 1e-6);
        assert!((angle_diff_abs(-3.0, 3.0) - (2.0 * PI - 6.0)).abs() < 1e-5);
    }

    #[test]
    fn grid_edge_requires_diagonal_relation() {
        let tol = 22.5f32.to_radians();
        assert!(is_grid_edge(FRAC_PI_4, 3.0 * FRAC_PI_4, 0.0, tol));
        assert!(is_grid_edge(FRAC_PI_4, 3.0 * FRAC_PI_4, FRAC_PI_2, tol));
        // Same orientation on both ends: not adjacent corners.
        assert!(!is_grid_edge(FRAC_PI_4, FRAC_PI_4, 0.0, tol));
        // Edge along a diagonal.
        assert!(!is_grid_edge(FRAC_PI_4, 3.0 * FRAC_PI_4, FRAC_PI_4, tol));
    }
}
