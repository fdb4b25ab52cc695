// Rowspan/colspan reconciliation into a rectangular cell grid.

use tracing::debug;

/// Spans above this are treated as this.
pub const MAX_SPAN: usize = 1000;

/// Upper bound on `rows x cols` of a built grid.
pub const MAX_CELLS: usize = 1_000_000;

/// `rowspan`/`colspan` attribute value: missing, non-integer and
/// non-positive values are 1.
pub fn parse_span(raw: Option<&str>) -> usize {
    raw.and_then(|v| v.trim().parse::<i64>().ok())
        .map(|n| n.clamp(1, MAX_SPAN as i64) as usize)
        .unwrap_or(1)
}

/// A source cell as found in a `<tr>`.
#[derive(Debug, Clone, PartialEq)]
pub struct CellSpec<T> {
    pub rowspan: usize,
    pub colspan: usize,
    pub content: T,
}

impl<T> CellSpec<T> {
    pub fn new(content: T) -> Self {
        Self {
            rowspan: 1,
            colspan: 1,
            content,
        }
    }

    pub fn spanning(rowspan: usize, colspan: usize, content: T) -> Self {
        Self {
            rowspan,
            colspan,
            content,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GridCell<T> {
    /// Origin of the cell covering this slot; `None` for padding.
    pub occupied_by: Option<(usize, usize)>,
    pub rowspan: usize,
    pub colspan: usize,
    /// Only origin slots carry content.
    pub content: Option<T>,
}

impl<T> GridCell<T> {
    fn empty(occupied_by: Option<(usize, usize)>) -> Self {
        Self {
            occupied_by,
            rowspan: 1,
            colspan: 1,
            content: None,
        }
    }
}

/// Row-major arena of cells addressed by `(row, col)`.
#[derive(Debug, Clone, PartialEq)]
pub struct TableGrid<T> {
    rows: usize,
    cols: usize,
    cells: Vec<GridCell<T>>,
    /// Slots no source cell covers.
    padded: usize,
    /// Cells cut short or dropped, by an earlier cell or by [`MAX_CELLS`].
    truncated: usize,
}

impl<T> TableGrid<T> {
    /// Place cells row by row. Each cell goes to the first free column of its
    /// row and claims `rowspan x colspan` slots; rows grow to cover every
    /// rowspan and the grid is padded to a rectangle.
    pub fn build(rows: Vec<Vec<CellSpec<T>>>) -> Self {
        let mut occupancy: Vec<Vec<Option<(usize, usize)>>> = Vec::new();
        let mut origins: Vec<(usize, usize, usize, usize, T)> = Vec::new();
        let mut truncated = 0;
        let mut width = 0;
        let source_rows = rows.len();
        if occupancy.len() < source_rows {
            occupancy.resize_with(source_rows, Vec::new);
        }

        for (r, row) in rows.into_iter().enumerate() {
            let mut c = 0;
            for spec in row {
                while occupancy[r].get(c).copied().flatten().is_some() {
                    c += 1;
                }
                let wanted_cols = spec.colspan.clamp(1, MAX_SPAN);
                let wanted_rows = spec.rowspan.clamp(1, MAX_SPAN);

                // width x height stays within MAX_CELLS
                let col_room = MAX_CELLS / occupancy.len().max(1);
                if c >= col_room {
                    truncated += 1;
                    debug!(row = r, col = c, "cell beyond grid limit dropped");
                    continue;
                }

                // A span never overlaps a slot an earlier cell already claimed.
                let colspan = (c..c + wanted_cols.min(col_room - c))
                    .take_while(|&cc| occupancy[r].get(cc).copied().flatten().is_none())
                    .count();
                let row_room = MAX_CELLS / width.max(c + colspan);
                let rowspan = (r..r + wanted_rows.min(row_room - r))
                    .take_while(|&rr| {
                        occupancy.get(rr).map_or(true, |line| {
                            (c..c + colspan).all(|cc| line.get(cc).copied().flatten().is_none())
                        })
                    })
                    .count();
                if colspan != wanted_cols || rowspan != wanted_rows {
                    truncated += 1;
                    debug!(row = r, col = c, rowspan, colspan, "span truncated");
                }

                if occupancy.len() < r + rowspan {
                    occupancy.resize_with(r + rowspan, Vec::new);
                }
                for line in &mut occupancy[r..r + rowspan] {
                    if line.len() < c + colspan {
                        line.resize(c + colspan, None);
                    }
                    for slot in &mut line[c..c + colspan] {
                        *slot = Some((r, c));
                    }
                }
                width = width.max(c + colspan);
                origins.push((r, c, rowspan, colspan, spec.content));
                c += colspan;
            }
        }

        let rows = occupancy.len();
        let cols = occupancy.iter().map(Vec::len).max().unwrap_or(0);
        let mut cells = Vec::with_capacity(rows * cols);
        let mut padded = 0;
        for line in &occupancy {
            for col in 0..cols {
                let occupied_by = line.get(col).copied().flatten();
                if occupied_by.is_none() {
                    padded += 1;
                }
                cells.push(GridCell::empty(occupied_by));
            }
        }
        for (r, c, rowspan, colspan, content) in origins {
            let cell = &mut cells[r * cols + c];
            cell.rowspan = rowspan;
            cell.colspan = colspan;
            cell.content = Some(content);
        }

        Self {
            rows,
            cols,
            cells,
            padded,
            truncated,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0 || self.cols == 0
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&GridCell<T>> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        self.cells.get(row * self.cols + col)
    }

    pub fn row(&self, row: usize) -> &[GridCell<T>] {
        if row >= self.rows {
            return &[];
        }
        &self.cells[row * self.cols..(row + 1) * self.cols]
    }

    /// Whether `(row, col)` is where its covering cell starts.
    pub fn is_origin(&self, row: usize, col: usize) -> bool {
        self.cell(row, col)
            .and_then(|cell| cell.occupied_by)
            .map_or(false, |origin| origin == (row, col))
    }

    /// Slots synthesized to make ragged rows rectangular.
    pub fn padded(&self) -> usize {
        self.padded
    }

    pub fn truncated(&self) -> usize {
        self.truncated
    }
}
