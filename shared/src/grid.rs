use crate::config::MapConfig;

/// Index of the cell of size `step` containing `meters`.
pub fn cell_index(meters: f64, step: f64) -> i64 {
    (meters / step).floor() as i64
}

/// Zero-padded cell index text. Three digits minimum; larger indices keep
/// all their digits.
pub fn format_index(index: i64) -> String {
    format!("{index:03}")
}

/// Grid reference of a game position, row (northing) first: `"002 015"`.
pub fn cell_reference(x: f64, y: f64, hm_step: f64) -> String {
    format!(
        "{} {}",
        format_index(cell_index(y, hm_step)),
        format_index(cell_index(x, hm_step))
    )
}

/// Positions `0, step, 2*step, ...` up to and including `extent`.
pub fn line_positions(extent: f64, step: f64) -> Vec<f64> {
    if step <= 0.0 || extent < 0.0 {
        return Vec::new();
    }
    let count = (extent / step).floor() as usize;
    (0..=count).map(|i| i as f64 * step).collect()
}

/// Fine-step positions that do not coincide with a coarse line.
pub fn fine_positions(extent: f64, fine: f64, coarse: f64) -> Vec<f64> {
    if fine <= 0.0 || extent < 0.0 {
        return Vec::new();
    }
    let count = (extent / fine).floor() as usize;
    // Compare in whole fine steps to avoid float remainders
    let ratio = coarse / fine;
    let per_coarse = ratio.round() as usize;
    let integral = per_coarse > 0 && (ratio - per_coarse as f64).abs() < 1e-9;
    (0..=count)
        .filter(|&i| {
            if integral {
                i % per_coarse != 0
            } else {
                let pos = i as f64 * fine;
                (pos / coarse - (pos / coarse).round()).abs() > 1e-9
            }
        })
        .map(|i| i as f64 * fine)
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AxisLines {
    pub coarse: Vec<f64>,
    pub fine: Vec<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GridLines {
    pub x: AxisLines,
    pub y: AxisLines,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AxisLabel {
    /// Game-meter position of the cell midpoint along the axis.
    pub position: f64,
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AxisLabels {
    pub step: f64,
    pub x: Vec<AxisLabel>,
    pub y: Vec<AxisLabel>,
}

/// Label text for every fine cell, stored per column and per row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CellLabels {
    pub step: f64,
    columns: Vec<String>,
    rows: Vec<String>,
}

impl CellLabels {
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Game-meter centre of cell `(column, row)`.
    pub fn center(&self, column: usize, row: usize) -> (f64, f64) {
        (
            column as f64 * self.step + self.step / 2.0,
            row as f64 * self.step + self.step / 2.0,
        )
    }

    pub fn column_text(&self, column: usize) -> Option<&str> {
        self.columns.get(column).map(String::as_str)
    }

    pub fn row_text(&self, row: usize) -> Option<&str> {
        self.rows.get(row).map(String::as_str)
    }

    /// Both text lines of the cell containing `(x, y)`: row then column.
    pub fn texts_at(&self, x: f64, y: f64) -> Option<(&str, &str)> {
        let column = usize::try_from(cell_index(x, self.step)).ok()?;
        let row = usize::try_from(cell_index(y, self.step)).ok()?;
        Some((self.row_text(row)?, self.column_text(column)?))
    }
}

fn cell_texts(extent: f64, step: f64, hm_step: f64) -> Vec<String> {
    line_positions(extent, step)
        .into_iter()
        .filter(|&start| start < extent)
        .map(|start| format_index(cell_index(start + step / 2.0, hm_step)))
        .collect()
}

fn axis_labels_for(extent: f64, step: f64, hm_step: f64) -> Vec<AxisLabel> {
    line_positions(extent, step)
        .into_iter()
        .filter(|&start| start < extent)
        .map(|start| AxisLabel {
            position: start + step / 2.0,
            text: format_index(cell_index(start, hm_step)),
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct LinesKey {
    width: f64,
    height: f64,
    coarse: f64,
    fine: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct AxisKey {
    width: f64,
    height: f64,
    active_step: f64,
    hm_step: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct CellKey {
    width: f64,
    height: f64,
    fine: f64,
}

/// Number of times each derived set has been rebuilt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheBuilds {
    pub lines: u64,
    pub axis_labels: u64,
    pub cell_labels: u64,
}

/// Borrowed view of up-to-date grid geometry.
#[derive(Debug, Clone, Copy)]
pub struct GridGeometry<'a> {
    pub lines: &'a GridLines,
    pub axis_labels: &'a AxisLabels,
    pub cell_labels: &'a CellLabels,
}

/// Grid geometry derived from the configuration, rebuilt only when its
/// inputs change.
///
/// Lines depend on extents and both steps. Axis labels additionally depend on
/// which step is active (coarse below the LOD threshold, fine at or above).
/// Cell labels depend on extents and the fine step.
#[derive(Debug, Default)]
pub struct GridGeometryCache {
    lines_key: Option<LinesKey>,
    lines: GridLines,
    axis_key: Option<AxisKey>,
    axis_labels: AxisLabels,
    cell_key: Option<CellKey>,
    cell_labels: CellLabels,
    builds: CacheBuilds,
}

impl GridGeometryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bring every derived set up to date and borrow them together.
    pub fn prepare(&mut self, config: &MapConfig, fine_active: bool) -> GridGeometry<'_> {
        self.refresh_lines(config);
        self.refresh_axis_labels(config, fine_active);
        self.refresh_cell_labels(config);
        GridGeometry {
            lines: &self.lines,
            axis_labels: &self.axis_labels,
            cell_labels: &self.cell_labels,
        }
    }

    /// Drop all cached geometry. The next `prepare` rebuilds everything.
    pub fn invalidate(&mut self) {
        self.lines_key = None;
        self.axis_key = None;
        self.cell_key = None;
    }

    pub fn builds(&self) -> CacheBuilds {
        self.builds
    }

    fn refresh_lines(&mut self, config: &MapConfig) {
        let key = LinesKey {
            width: config.island_width,
            height: config.island_height,
            coarse: config.km_step,
            fine: config.hm_step,
        };
        if self.lines_key == Some(key) {
            return;
        }
        self.lines = GridLines {
            x: AxisLines {
                coarse: line_positions(key.width, key.coarse),
                fine: fine_positions(key.width, key.fine, key.coarse),
            },
            y: AxisLines {
                coarse: line_positions(key.height, key.coarse),
                fine: fine_positions(key.height, key.fine, key.coarse),
            },
        };
        self.lines_key = Some(key);
        self.builds.lines += 1;
    }

    fn refresh_axis_labels(&mut self, config: &MapConfig, fine_active: bool) {
        let key = AxisKey {
            width: config.island_width,
            height: config.island_height,
            active_step: if fine_active {
                config.hm_step
            } else {
                config.km_step
            },
            hm_step: config.hm_step,
        };
        if self.axis_key == Some(key) {
            return;
        }
        self.axis_labels = AxisLabels {
            step: key.active_step,
            x: axis_labels_for(key.width, key.active_step, key.hm_step),
            y: axis_labels_for(key.height, key.active_step, key.hm_step),
        };
        self.axis_key = Some(key);
        self.builds.axis_labels += 1;
    }

    fn refresh_cell_labels(&mut self, config: &MapConfig) {
        let key = CellKey {
            width: config.island_width,
            height: config.island_height,
            fine: config.hm_step,
        };
        if self.cell_key == Some(key) {
            return;
        }
        self.cell_labels = CellLabels {
            step: key.fine,
            columns: cell_texts(key.width, key.fine, key.fine),
            rows: cell_texts(key.height, key.fine, key.fine),
        };
        self.cell_key = Some(key);
        self.builds.cell_labels += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::{
        GridGeometryCache, cell_reference, fine_positions, format_index, line_positions,
    };
    use crate::config::MapConfig;

    #[test]
    fn coarse_lines_cover_island_inclusively() {
        let lines = line_positions(15360.0, 1000.0);
        assert_eq!(lines.len(), 16);
        assert_eq!(lines.first(), Some(&0.0));
        assert_eq!(lines.last(), Some(&15000.0));
        assert_eq!(line_positions(2000.0, 1000.0), vec![0.0, 1000.0, 2000.0]);
    }

    #[test]
    fn fine_lines_never_coincide_with_coarse() {
        let coarse = line_positions(15360.0, 1000.0);
        let fine = fine_positions(15360.0, 100.0, 1000.0);
        assert!(fine.iter().all(|f| !coarse.contains(f)));
        // 154 fine positions in total, 16 of them coarse
        assert_eq!(fine.len(), 154 - 16);
        assert_eq!(fine.first(), Some(&100.0));
        assert_eq!(fine.last(), Some(&15300.0));
    }

    #[test]
    fn index_formatting_pads_and_overflows() {
        assert_eq!(format_index(0), "000");
        assert_eq!(format_index(2), "002");
        assert_eq!(format_index(153), "153");
        assert_eq!(format_index(1024), "1024");
    }

    #[test]
    fn cell_labels_for_point_in_cell_two_zero() {
        let mut cache = GridGeometryCache::new();
        let config = MapConfig::default();
        let geometry = cache.prepare(&config, true);
        let (row, column) = geometry.cell_labels.texts_at(250.0, 50.0).unwrap();
        assert_eq!(column, "002");
        assert_eq!(row, "000");
        assert_eq!(geometry.cell_labels.column_count(), 154);
        assert_eq!(cell_reference(250.0, 50.0, 100.0), "000 002");
    }

    #[test]
    fn axis_labels_follow_active_step() {
        let mut cache = GridGeometryCache::new();
        let config = MapConfig::default();

        let coarse = cache.prepare(&config, false).axis_labels.clone();
        assert_eq!(coarse.step, 1000.0);
        assert_eq!(coarse.x.len(), 16);
        assert_eq!(coarse.x[1].position, 1500.0);
        assert_eq!(coarse.x[1].text, "010");

        let fine = cache.prepare(&config, true).axis_labels.clone();
        assert_eq!(fine.step, 100.0);
        assert_eq!(fine.y.len(), 154);
        assert_eq!(fine.y[2].text, "002");
    }

    #[test]
    fn rebuilds_only_on_relevant_change() {
        let mut cache = GridGeometryCache::new();
        let mut config = MapConfig::default();

        cache.prepare(&config, false);
        cache.prepare(&config, false);
        let builds = cache.builds();
        assert_eq!((builds.lines, builds.axis_labels, builds.cell_labels), (1, 1, 1));

        // LOD toggle: axis labels only
        cache.prepare(&config, true);
        let builds = cache.builds();
        assert_eq!((builds.lines, builds.axis_labels, builds.cell_labels), (1, 2, 1));

        // Style change: nothing
        config.km_line_style.color = "#00ff00".to_string();
        cache.prepare(&config, true);
        assert_eq!(cache.builds().lines, 1);

        // Coarse step change: lines and axis labels are keyed on it, cells are not
        config.km_step = 500.0;
        cache.prepare(&config, false);
        let builds = cache.builds();
        assert_eq!((builds.lines, builds.axis_labels, builds.cell_labels), (2, 3, 1));

        // Extent change: everything
        config.island_width = 12800.0;
        cache.prepare(&config, false);
        let builds = cache.builds();
        assert_eq!((builds.lines, builds.axis_labels, builds.cell_labels), (3, 4, 2));
    }

    #[test]
    fn invalidate_forces_rebuild() {
        let mut cache = GridGeometryCache::new();
        let config = MapConfig::default();
        cache.prepare(&config, false);
        cache.invalidate();
        cache.prepare(&config, false);
        assert_eq!(cache.builds().lines, 2);
        assert_eq!(cache.builds().cell_labels, 2);
    }
}
