//! Dense, row-major 2D storage.
//!
//! [`Grid2D`] backs every grid in the crate: the tracked tile grid, the
//! regions of a compressed image and per-region change maps. It owns a single
//! `Vec<T>` and exposes index arithmetic on top of it; it has no behaviour of
//! its own beyond storage and bounds queries.

use std::ops::{Index, IndexMut};

use crate::error::TilecastError;

/// A `width × height` grid stored row-major in one backing vector.
///
/// The cell at `(x, y)` lives at index `y * width + x`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid2D<T> {
    width: usize,
    height: usize,
    cells: Vec<T>,
}

impl<T: Default> Grid2D<T> {
    /// Create a grid with every cell default-initialised.
    pub fn new(width: usize, height: usize) -> Self {
        Self::from_fn(width, height, |_, _| T::default())
    }
}

impl<T> Grid2D<T> {
    /// Create a grid by evaluating `f(x, y)` for every cell in row-major order.
    pub fn from_fn(width: usize, height: usize, mut f: impl FnMut(usize, usize) -> T) -> Self {
        let mut cells = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                cells.push(f(x, y));
            }
        }
        Self {
            width,
            height,
            cells,
        }
    }

    /// Wrap an existing vector.
    ///
    /// Fails with [`TilecastError::DimensionMismatch`] when
    /// `cells.len() != width * height`.
    pub fn from_vec(cells: Vec<T>, width: usize, height: usize) -> Result<Self, TilecastError> {
        let expected = width * height;
        if cells.len() != expected {
            return Err(TilecastError::DimensionMismatch {
                expected,
                actual: cells.len(),
            });
        }
        Ok(Self {
            width,
            height,
            cells,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Number of cells (`width * height`).
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Convert a 2D coordinate to its backing index.
    #[inline]
    pub fn index_of(&self, x: usize, y: usize) -> usize {
        y * self.width + x
    }

    /// Convert a backing index back to `(x, y)`.
    ///
    /// A zero-width grid has no cells; its indices map to `(index, 0)` so
    /// that `index_of` still inverts the conversion.
    #[inline]
    pub fn coords_of(&self, index: usize) -> (usize, usize) {
        match self.width {
            0 => (index, 0),
            width => (index % width, index / width),
        }
    }

    /// Whether `(x, y)` names a cell of this grid.
    #[inline]
    pub fn in_bounds(&self, x: usize, y: usize) -> bool {
        x < self.width && y < self.height
    }

    pub fn get(&self, x: usize, y: usize) -> Option<&T> {
        if self.in_bounds(x, y) {
            self.cells.get(self.index_of(x, y))
        } else {
            None
        }
    }

    pub fn get_mut(&mut self, x: usize, y: usize) -> Option<&mut T> {
        if self.in_bounds(x, y) {
            let index = self.index_of(x, y);
            self.cells.get_mut(index)
        } else {
            None
        }
    }

    /// The cell at `(x, y)`, or `T::default()` when out of bounds.
    pub fn value_or_default(&self, x: usize, y: usize) -> T
    where
        T: Clone + Default,
    {
        self.get(x, y).cloned().unwrap_or_default()
    }

    /// Overwrite every cell with `f(x, y)`.
    pub fn populate(&mut self, mut f: impl FnMut(usize, usize) -> T) {
        let width = self.width;
        for (index, cell) in self.cells.iter_mut().enumerate() {
            *cell = f(index % width, index / width);
        }
    }

    /// Row-major iterator over the cells.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.cells.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.cells.iter_mut()
    }

    /// Row-major iterator yielding `(x, y, &cell)`.
    pub fn enumerate(&self) -> impl Iterator<Item = (usize, usize, &T)> + '_ {
        let width = self.width;
        self.cells
            .iter()
            .enumerate()
            .map(move |(i, cell)| (i % width, i / width, cell))
    }

    pub fn as_slice(&self) -> &[T] {
        &self.cells
    }

    pub fn into_vec(self) -> Vec<T> {
        self.cells
    }
}

// ── Indexing ─────────────────────────────────────────────────────

impl<T> Index<(usize, usize)> for Grid2D<T> {
    type Output = T;

    fn index(&self, (x, y): (usize, usize)) -> &T {
        assert!(self.in_bounds(x, y), "({x}, {y}) out of bounds");
        &self.cells[y * self.width + x]
    }
}

impl<T> IndexMut<(usize, usize)> for Grid2D<T> {
    fn index_mut(&mut self, (x, y): (usize, usize)) -> &mut T {
        assert!(self.in_bounds(x, y), "({x}, {y}) out of bounds");
        &mut self.cells[y * self.width + x]
    }
}

impl<T> Index<usize> for Grid2D<T> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        &self.cells[index]
    }
}

impl<T> IndexMut<usize> for Grid2D<T> {
    fn index_mut(&mut self, index: usize) -> &mut T {
        &mut self.cells[index]
    }
}

impl<'a, T> IntoIterator for &'a Grid2D<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.cells.iter()
    }
}

// ── Tests ────────────────────────────────────────────────────────
