//! Masonry column layout.
//!
//! Each image goes to the column whose rendered height is currently the
//! smallest, ties going to the lowest index. Heights follow the image's
//! aspect ratio at the column width, so placement only needs dimensions.

use crate::imaging::scaled_height;

/// Viewport width → column count.
#[derive(Debug, Clone, PartialEq)]
pub struct Breakpoints {
    /// `(max_width_exclusive, columns)`, ascending by width.
    steps: Vec<(f64, usize)>,
    widest: usize,
}

impl Default for Breakpoints {
    fn default() -> Self {
        Self::new(vec![(576.0, 1), (768.0, 2), (1200.0, 3)], 4)
    }
}

impl Breakpoints {
    pub fn new(mut steps: Vec<(f64, usize)>, widest: usize) -> Self {
        steps.sort_by(|a, b| a.0.total_cmp(&b.0));
        Self {
            steps,
            widest: widest.max(1),
        }
    }

    pub fn columns_for(&self, viewport_width: f64) -> usize {
        self.steps
            .iter()
            .find(|(max, _)| viewport_width < *max)
            .map(|(_, columns)| (*columns).max(1))
            .unwrap_or(self.widest)
    }
}

/// Width of one column when `columns` share `viewport_width` with `gap` between them.
pub fn column_width(viewport_width: f64, columns: usize, gap: f64) -> f64 {
    let columns = columns.max(1) as f64;
    ((viewport_width - gap * (columns + 1.0)) / columns).max(1.0)
}

/// One placed image.
#[derive(Debug, Clone, PartialEq)]
pub struct Tile {
    pub id: String,
    pub dimensions: (u32, u32),
    pub top: f64,
    pub height: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnLayout {
    column_width: f64,
    gap: f64,
    columns: Vec<Vec<Tile>>,
    heights: Vec<f64>,
}

impl ColumnLayout {
    pub fn new(columns: usize, column_width: f64, gap: f64) -> Self {
        let columns = columns.max(1);
        Self {
            column_width,
            gap,
            columns: vec![Vec::new(); columns],
            heights: vec![0.0; columns],
        }
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column_width(&self) -> f64 {
        self.column_width
    }

    pub fn columns(&self) -> &[Vec<Tile>] {
        &self.columns
    }

    pub fn heights(&self) -> &[f64] {
        &self.heights
    }

    pub fn len(&self) -> usize {
        self.columns.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Index of the shortest column; the lowest index wins ties.
    pub fn shortest_column(&self) -> usize {
        let mut best = 0;
        for (i, height) in self.heights.iter().enumerate() {
            if *height < self.heights[best] {
                best = i;
            }
        }
        best
    }

    /// Append an image to the shortest column. Returns the column index.
    pub fn place(&mut self, id: impl Into<String>, dimensions: (u32, u32)) -> usize {
        let column = self.shortest_column();
        let height = scaled_height(dimensions, self.column_width);
        let top = self.heights[column];
        self.columns[column].push(Tile {
            id: id.into(),
            dimensions,
            top,
            height,
        });
        self.heights[column] = top + height + self.gap;
        column
    }

    /// Scale every height to a new column width. Assignment is unchanged.
    pub fn rescale(&mut self, column_width: f64) {
        if column_width == self.column_width {
            return;
        }
        let gap = self.gap;
        for (column, height) in self.columns.iter_mut().zip(self.heights.iter_mut()) {
            let mut top = 0.0;
            for tile in column.iter_mut() {
                tile.height = scaled_height(tile.dimensions, column_width);
                tile.top = top;
                top += tile.height + gap;
            }
            *height = top;
        }
        self.column_width = column_width;
    }

    /// A fresh layout holding `tiles` placed again, in the order given.
    ///
    /// Deterministic: the same order, column count and width always produce
    /// the same assignment.
    pub fn redistribute<'a, I>(tiles: I, columns: usize, column_width: f64, gap: f64) -> Self
    where
        I: IntoIterator<Item = (&'a str, (u32, u32))>,
    {
        let mut layout = Self::new(columns, column_width, gap);
        for (id, dimensions) in tiles {
            layout.place(id, dimensions);
        }
        layout
    }

    /// Column holding `id`, if any.
    pub fn column_of(&self, id: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|column| column.iter().any(|tile| tile.id == id))
    }
}
