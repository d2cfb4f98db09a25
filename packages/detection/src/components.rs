//! 4-connected component labelling on pixel masks.

use std::collections::VecDeque;

use damage_map_raster_models::RasterGrid;

/// A connected group of mask pixels with its bounding box.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Component {
    /// Row-major pixel indices, in discovery order.
    pub pixels: Vec<usize>,
    /// Leftmost column.
    pub min_col: u32,
    /// Rightmost column.
    pub max_col: u32,
    /// Top row.
    pub min_row: u32,
    /// Bottom row.
    pub max_row: u32,
}

impl Component {
    /// Bounding box width in pixels.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.max_col - self.min_col + 1
    }

    /// Bounding box height in pixels.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.max_row - self.min_row + 1
    }

    /// Longer bounding box side.
    #[must_use]
    pub fn length(&self) -> u32 {
        self.width().max(self.height())
    }

    /// Mean cross-section: pixel count over length.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn mean_width(&self) -> f64 {
        self.pixels.len() as f64 / f64::from(self.length())
    }

    /// Length over mean cross-section.
    #[must_use]
    pub fn elongation(&self) -> f64 {
        f64::from(self.length()) / self.mean_width()
    }

    /// Whether any 4-neighbour of the component is set in `other`.
    #[must_use]
    pub fn touches(&self, grid: &RasterGrid, other: &[bool]) -> bool {
        self.pixels
            .iter()
            .flat_map(|pixel| neighbours(grid, *pixel))
            .any(|n| other.get(n).copied().unwrap_or(false))
    }
}

fn neighbours(grid: &RasterGrid, pixel: usize) -> impl Iterator<Item = usize> {
    let (col, row) = grid.position(pixel);
    let width = grid.width;
    let height = grid.height;
    [
        (col > 0).then(|| (col - 1, row)),
        (col + 1 < width).then_some((col + 1, row)),
        (row > 0).then(|| (col, row - 1)),
        (row + 1 < height).then_some((col, row + 1)),
    ]
    .into_iter()
    .flatten()
    .map(move |(c, r)| r as usize * width as usize + c as usize)
}

/// Labels the 4-connected components of `mask`.
///
/// Components are returned in scan order of their first pixel.
#[must_use]
pub fn label(grid: &RasterGrid, mask: &[bool]) -> Vec<Component> {
    let mut visited = vec![false; mask.len()];
    let mut components = Vec::new();
    let mut queue = VecDeque::new();

    for start in 0..mask.len() {
        if !mask[start] || visited[start] {
            continue;
        }

        let (col, row) = grid.position(start);
        let mut component = Component {
            pixels: Vec::new(),
            min_col: col,
            max_col: col,
            min_row: row,
            max_row: row,
        };

        visited[start] = true;
        queue.push_back(start);

        while let Some(pixel) = queue.pop_front() {
            let (col, row) = grid.position(pixel);
            component.min_col = component.min_col.min(col);
            component.max_col = component.max_col.max(col);
            component.min_row = component.min_row.min(row);
            component.max_row = component.max_row.max(row);
            component.pixels.push(pixel);

            for next in neighbours(grid, pixel) {
                if mask.get(next).copied().unwrap_or(false) && !visited[next] {
                    visited[next] = true;
                    queue.push_back(next);
                }
            }
        }

        components.push(component);
    }

    components
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(width: u32, height: u32) -> RasterGrid {
        RasterGrid {
            width,
            height,
            origin_lon: 0.0,
            origin_lat: 0.0,
            pixel_width_deg: 0.0001,
            pixel_height_deg: 0.0001,
            resolution_m: 10.0,
            crs: "EPSG:4326".to_string(),
        }
    }

    fn mask_from(rows: &[&str]) -> Vec<bool> {
        rows.iter()
            .flat_map(|row| row.chars().map(|c| c == '#'))
            .collect()
    }

    #[test]
    fn diagonal_pixels_are_separate_components() {
        let g = grid(3, 3);
        let mask = mask_from(&["#..", ".#.", "..#"]);
        assert_eq!(label(&g, &mask).len(), 3);
    }

    #[test]
    fn components_carry_bounding_boxes() {
        let g = grid(6, 3);
        let mask = mask_from(&["##....", "##..##", "......"]);
        let components = label(&g, &mask);
        assert_eq!(components.len(), 2);

        let square = &components[0];
        assert_eq!(square.pixels.len(), 4);
        assert_eq!((square.width(), square.height()), (2, 2));

        let bar = &components[1];
        assert_eq!((bar.min_col, bar.max_col, bar.min_row), (4, 5, 1));
        assert!((bar.mean_width() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn touches_detects_adjacent_pixels() {
        let g = grid(4, 1);
        let mask = mask_from(&["##.."]);
        let water = mask_from(&["..#."]);
        let far = mask_from(&["...#"]);
        let component = &label(&g, &mask)[0];
        assert!(component.touches(&g, &water));
        assert!(!component.touches(&g, &far));
    }
}
