use crate::dictionary::Dictionary;
use image::{GrayImage, Luma};

/// Render marker `id` with a one-cell black frame and `quiet_cells` of white
/// margin, `px_per_cell` pixels per cell. `None` for an unknown id or zero
/// cell size.
pub fn render_marker(dict: &Dictionary, id: u32, px_per_cell: u32, quiet_cells: u32) -> Option<GrayImage> {
    let code = dict.code(id)?;
    if px_per_cell == 0 {
        return None;
    }
    let bits = dict.marker_size as u32;
    let cells = bits + 2;
    let total = cells + 2 * quiet_cells;
    let side = total * px_per_cell;

    Some(GrayImage::from_fn(side, side, |x, y| {
        let cx = (x / px_per_cell) as i64 - quiet_cells as i64;
        let cy = (y / px_per_cell) as i64 - quiet_cells as i64;
        let cells = cells as i64;
        if cx < 0 || cy < 0 || cx >= cells || cy >= cells {
            return Luma([255]);
        }
        let frame = cx == 0 || cy == 0 || cx == cells - 1 || cy == cells - 1;
        let black = frame || {
            let bit = (cy - 1) as u32 * bits + (cx - 1) as u32;
            (code >> bit) & 1 == 1
        };
        Luma([if black { 0 } else { 255 }])
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::builtin_dictionary;

    #[test]
    fn layout_has_frame_and_quiet_zone() {
        let dict = builtin_dictionary("GEN_4X4_50").unwrap();
        let img = render_marker(dict, 0, 10, 1).unwrap();
        assert_eq!(img.dimensions(), (80, 80));
        assert_eq!(img.get_pixel(5, 5)[0], 255);
        assert_eq!(img.get_pixel(15, 15)[0], 0);
        assert_eq!(img.get_pixel(64, 40)[0], 0);

        // First code bit maps to the cell right inside the frame corner.
        let first_black = dict.codes[0] & 1 == 1;
        assert_eq!(img.get_pixel(25, 25)[0] == 0, first_black);
    }

    #[test]
    fn unknown_id_renders_nothing() {
        let dict = builtin_dictionary("GEN_4X4_50").unwrap();
        assert!(render_marker(dict, 50, 10, 1).is_none());
        assert!(render_marker(dict, 0, 0, 1).is_none());
    }
}
