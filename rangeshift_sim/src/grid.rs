// Dense 2D and 3D numeric fields over the simulation grid.
//
// `Grid` is a single (row, col) field stored as a flat row-major
// `Vec<f64>` indexed by `row * cols + col`. `GridStack` is a stack of such
// fields, (row, col, layer), stored layer-major so that every layer is one
// contiguous row-major slice: index = `layer * rows * cols + row * cols + col`.
//
// The same two types carry every array in the engine: population fields
// (layers = stages), environment frames (layers = variables), seed fields,
// the neighborhood kernel (a `Grid`), the transition intercepts `alpha`
// (a `Grid` indexed [target, source]) and the density/environment
// coefficients `beta`/`gamma` (a `GridStack` indexed [target, source, term]).
//
// Indexing is bounds-checked; a dimension mismatch between arrays is a caller
// precondition violation and panics. `Scenario::validate()` in `config.rs`
// checks shapes up front for runs assembled from JSON.
//
// **Critical constraint: determinism.** Cell iteration order is always
// row-major, layers ascending. Sums are accumulated in that order.

use serde::{Deserialize, Serialize};
use std::ops::{AddAssign, Index, IndexMut};

/// A dense 2D field of `f64`, row-major.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Grid {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Grid {
    /// Create a grid filled with zeros.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self::filled(rows, cols, 0.0)
    }

    /// Create a grid with every cell set to `value`.
    pub fn filled(rows: usize, cols: usize, value: f64) -> Self {
        Self {
            rows,
            cols,
            data: vec![value; rows * cols],
        }
    }

    /// Wrap row-major data. Panics if `data.len() != rows * cols`.
    pub fn from_vec(rows: usize, cols: usize, data: Vec<f64>) -> Self {
        assert_eq!(
            data.len(),
            rows * cols,
            "Grid::from_vec: expected {rows}x{cols} values"
        );
        Self { rows, cols, data }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Number of cells.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// True when the backing storage matches the declared dimensions.
    /// Always true for grids built through the constructors; deserialized
    /// grids may violate it.
    pub fn is_consistent(&self) -> bool {
        self.data.len() == self.rows * self.cols
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }

    /// Sum of all cells, accumulated in row-major order.
    pub fn sum(&self) -> f64 {
        self.data.iter().sum()
    }

    fn offset(&self, row: usize, col: usize) -> usize {
        assert!(
            row < self.rows && col < self.cols,
            "Grid index ({row}, {col}) out of bounds for {}x{}",
            self.rows,
            self.cols
        );
        row * self.cols + col
    }
}

/// Cell-wise addition. Panics on dimension mismatch.
impl AddAssign<&Grid> for Grid {
    fn add_assign(&mut self, other: &Grid) {
        assert_eq!((self.rows, self.cols), (other.rows, other.cols));
        for (a, b) in self.data.iter_mut().zip(&other.data) {
            *a += b;
        }
    }
}

impl Index<(usize, usize)> for Grid {
    type Output = f64;

    fn index(&self, (row, col): (usize, usize)) -> &f64 {
        &self.data[self.offset(row, col)]
    }
}

impl IndexMut<(usize, usize)> for Grid {
    fn index_mut(&mut self, (row, col): (usize, usize)) -> &mut f64 {
        let i = self.offset(row, col);
        &mut self.data[i]
    }
}

/// A stack of `Grid`-shaped layers, (row, col, layer), stored layer-major.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GridStack {
    rows: usize,
    cols: usize,
    layers: usize,
    data: Vec<f64>,
}

impl GridStack {
    /// Create a stack filled with zeros.
    pub fn zeros(rows: usize, cols: usize, layers: usize) -> Self {
        Self {
            rows,
            cols,
            layers,
            data: vec![0.0; rows * cols * layers],
        }
    }

    /// Wrap layer-major data. Panics if `data.len() != rows * cols * layers`.
    pub fn from_vec(rows: usize, cols: usize, layers: usize, data: Vec<f64>) -> Self {
        assert_eq!(
            data.len(),
            rows * cols * layers,
            "GridStack::from_vec: expected {rows}x{cols}x{layers} values"
        );
        Self {
            rows,
            cols,
            layers,
            data,
        }
    }

    /// Stack equally-sized grids as consecutive layers.
    /// Panics if the grids differ in shape.
    pub fn from_layers(layers: &[Grid]) -> Self {
        let (rows, cols) = layers.first().map_or((0, 0), |g| (g.rows, g.cols));
        let mut data = Vec::with_capacity(rows * cols * layers.len());
        for layer in layers {
            assert_eq!(
                (layer.rows, layer.cols),
                (rows, cols),
                "GridStack::from_layers: layers differ in shape"
            );
            data.extend_from_slice(&layer.data);
        }
        Self {
            rows,
            cols,
            layers: layers.len(),
            data,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn layers(&self) -> usize {
        self.layers
    }

    /// Cells per layer.
    pub fn cells(&self) -> usize {
        self.rows * self.cols
    }

    pub fn is_consistent(&self) -> bool {
        self.data.len() == self.rows * self.cols * self.layers
    }

    /// One layer as a row-major slice.
    pub fn layer(&self, layer: usize) -> &[f64] {
        assert!(layer < self.layers, "layer {layer} out of {}", self.layers);
        let n = self.cells();
        &self.data[layer * n..(layer + 1) * n]
    }

    pub fn layer_mut(&mut self, layer: usize) -> &mut [f64] {
        assert!(layer < self.layers, "layer {layer} out of {}", self.layers);
        let n = self.cells();
        &mut self.data[layer * n..(layer + 1) * n]
    }

    /// Copy one layer out as a standalone `Grid`.
    pub fn layer_grid(&self, layer: usize) -> Grid {
        Grid::from_vec(self.rows, self.cols, self.layer(layer).to_vec())
    }

    /// Add a grid cell-wise into one layer.
    pub fn add_to_layer(&mut self, layer: usize, grid: &Grid) {
        assert_eq!((self.rows, self.cols), (grid.rows, grid.cols));
        for (a, b) in self.layer_mut(layer).iter_mut().zip(grid.as_slice()) {
            *a += b;
        }
    }

    /// All values along the layer axis at one (row, col), in layer order.
    pub fn tube(&self, row: usize, col: usize) -> impl Iterator<Item = f64> + '_ {
        self.cell_tube(self.offset(row, col, 0))
    }

    /// Like `tube()`, addressed by flat row-major cell index.
    pub fn cell_tube(&self, cell: usize) -> impl Iterator<Item = f64> + '_ {
        assert!(cell < self.cells(), "cell {cell} out of {}", self.cells());
        let step = self.cells();
        (0..self.layers).map(move |k| self.data[cell + k * step])
    }

    /// Sum of every value in the stack.
    pub fn total(&self) -> f64 {
        self.data.iter().sum()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    fn offset(&self, row: usize, col: usize, layer: usize) -> usize {
        assert!(
            row < self.rows && col < self.cols && layer < self.layers.max(1),
            "GridStack index ({row}, {col}, {layer}) out of bounds for {}x{}x{}",
            self.rows,
            self.cols,
            self.layers
        );
        layer * self.cells() + row * self.cols + col
    }
}

impl Index<(usize, usize, usize)> for GridStack {
    type Output = f64;

    fn index(&self, (row, col, layer): (usize, usize, usize)) -> &f64 {
        &self.data[self.offset(row, col, layer)]
    }
}

impl IndexMut<(usize, usize, usize)> for GridStack {
    fn index_mut(&mut self, (row, col, layer): (usize, usize, usize)) -> &mut f64 {
        let i = self.offset(row, col, layer);
        &mut self.data[i]
    }
}
