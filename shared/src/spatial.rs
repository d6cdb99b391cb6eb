const GRID_COLS: usize = 64;
const GRID_ROWS: usize = 64;

/// A flat 2D bucket grid over game space for point hit-testing.
/// Rebuilt whenever the indexed positions change.
#[derive(Debug, Clone, Default)]
pub struct PointIndex {
    cells: Vec<Vec<usize>>,
    xs: Vec<f64>,
    ys: Vec<f64>,
    min_x: f64,
    min_y: f64,
    cell_w: f64,
    cell_h: f64,
}

impl PointIndex {
    pub fn build(points: impl IntoIterator<Item = (f64, f64)>) -> Self {
        let (xs, ys): (Vec<f64>, Vec<f64>) = points.into_iter().unzip();
        if xs.is_empty() {
            return Self::default();
        }

        let (mut min_x, mut min_y, mut max_x, mut max_y) = (f64::MAX, f64::MAX, f64::MIN, f64::MIN);
        for (&x, &y) in xs.iter().zip(&ys) {
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }

        // Padding keeps single-point and collinear sets from collapsing a cell to zero
        min_x -= 1.0;
        min_y -= 1.0;
        max_x += 1.0;
        max_y += 1.0;

        let cell_w = (max_x - min_x) / GRID_COLS as f64;
        let cell_h = (max_y - min_y) / GRID_ROWS as f64;

        let mut cells = vec![Vec::new(); GRID_COLS * GRID_ROWS];
        for (idx, (&x, &y)) in xs.iter().zip(&ys).enumerate() {
            let col = (((x - min_x) / cell_w) as usize).min(GRID_COLS - 1);
            let row = (((y - min_y) / cell_h) as usize).min(GRID_ROWS - 1);
            cells[row * GRID_COLS + col].push(idx);
        }

        Self {
            cells,
            xs,
            ys,
            min_x,
            min_y,
            cell_w,
            cell_h,
        }
    }

    pub fn len(&self) -> usize {
        self.xs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.xs.is_empty()
    }

    fn clamp_col(&self, x: f64) -> usize {
        (((x - self.min_x) / self.cell_w).floor().max(0.0) as usize).min(GRID_COLS - 1)
    }

    fn clamp_row(&self, y: f64) -> usize {
        (((y - self.min_y) / self.cell_h).floor().max(0.0) as usize).min(GRID_ROWS - 1)
    }

    /// Nearest indexed point whose box of half-size `(half_w, half_h)` contains `(x, y)`.
    pub fn find_at(&self, x: f64, y: f64, half_w: f64, half_h: f64) -> Option<usize> {
        if self.cells.is_empty() {
            return None;
        }
        if x + half_w < self.min_x
            || y + half_h < self.min_y
            || x - half_w > self.min_x + self.cell_w * GRID_COLS as f64
            || y - half_h > self.min_y + self.cell_h * GRID_ROWS as f64
        {
            return None;
        }

        let col_start = self.clamp_col(x - half_w);
        let col_end = self.clamp_col(x + half_w);
        let row_start = self.clamp_row(y - half_h);
        let row_end = self.clamp_row(y + half_h);

        let mut best: Option<(usize, f64)> = None;
        for row in row_start..=row_end {
            for col in col_start..=col_end {
                for &idx in &self.cells[row * GRID_COLS + col] {
                    let dx = self.xs[idx] - x;
                    let dy = self.ys[idx] - y;
                    if dx.abs() > half_w || dy.abs() > half_h {
                        continue;
                    }
                    let dist = dx * dx + dy * dy;
                    if best.is_none_or(|(_, d)| dist < d) {
                        best = Some((idx, dist));
                    }
                }
            }
        }
        best.map(|(idx, _)| idx)
    }
}

#[cfg(test)]
mod tests {
    use super::PointIndex;

    #[test]
    fn empty_index_finds_nothing() {
        let index = PointIndex::build(std::iter::empty());
        assert!(index.is_empty());
        assert_eq!(index.find_at(0.0, 0.0, 10.0, 10.0), None);
    }

    #[test]
    fn finds_nearest_within_box() {
        let index = PointIndex::build([(100.0, 100.0), (130.0, 100.0), (5000.0, 9000.0)]);
        assert_eq!(index.find_at(120.0, 102.0, 20.0, 5.0), Some(1));
        assert_eq!(index.find_at(101.0, 100.0, 20.0, 5.0), Some(0));
        assert_eq!(index.find_at(4990.0, 9003.0, 20.0, 5.0), Some(2));
        assert_eq!(index.find_at(300.0, 300.0, 20.0, 5.0), None);
    }

    #[test]
    fn single_point_is_hittable() {
        let index = PointIndex::build([(42.0, 42.0)]);
        assert_eq!(index.len(), 1);
        assert_eq!(index.find_at(45.0, 40.0, 5.0, 5.0), Some(0));
    }
}
