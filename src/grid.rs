//! Structured, vertically extruded grids and the rectangular patches owned by each process.
//!
//! Horizontal node `(i, j)` is at `x = x0 - Lx + i dx`, `y = y0 - Ly + j dy` with
//! `dx = 2 Lx / (Mx - 1)`. Vertically, node `k` of a column with bed `b` and height `h` is at
//! `z = b + h k / (Mz - 1)`. Degrees of freedom are numbered with `k` varying fastest, then `i`,
//! then `j`, so that every column is contiguous.
use crate::error::{require_positive, SetupError};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// The ghost halo width of a [`Patch`].
pub const GHOST_WIDTH: usize = 1;

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Grid {
    mx: usize,
    my: usize,
    mz: usize,
    x0: f64,
    y0: f64,
    lx: f64,
    ly: f64,
}

/// Global indices of a grid node.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct NodeIndex {
    pub i: usize,
    pub j: usize,
    pub k: usize,
}

impl NodeIndex {
    pub fn new(i: usize, j: usize, k: usize) -> Self {
        Self { i, j, k }
    }
}

impl Grid {
    /// A grid with `mx x my x mz` nodes covering `[x0 - lx, x0 + lx] x [y0 - ly, y0 + ly]`.
    pub fn new(mx: usize, my: usize, mz: usize, x0: f64, y0: f64, lx: f64, ly: f64) -> Result<Self, SetupError> {
        for (dimension, nodes) in [("x", mx), ("y", my), ("z", mz)] {
            if nodes < 2 {
                return Err(SetupError::GridTooSmall {
                    dimension,
                    nodes,
                    minimum: 2,
                });
            }
        }
        require_positive("lx", lx)?;
        require_positive("ly", ly)?;
        for (name, value) in [("x0", x0), ("y0", y0)] {
            if !value.is_finite() {
                return Err(SetupError::InvalidParameter { name, value });
            }
        }
        Ok(Self {
            mx,
            my,
            mz,
            x0,
            y0,
            lx,
            ly,
        })
    }

    pub fn mx(&self) -> usize {
        self.mx
    }

    pub fn my(&self) -> usize {
        self.my
    }

    pub fn mz(&self) -> usize {
        self.mz
    }

    pub fn x0(&self) -> f64 {
        self.x0
    }

    pub fn y0(&self) -> f64 {
        self.y0
    }

    /// Domain half-width in the x direction.
    pub fn lx(&self) -> f64 {
        self.lx
    }

    /// Domain half-width in the y direction.
    pub fn ly(&self) -> f64 {
        self.ly
    }

    pub fn dx(&self) -> f64 {
        2.0 * self.lx / (self.mx - 1) as f64
    }

    pub fn dy(&self) -> f64 {
        2.0 * self.ly / (self.my - 1) as f64
    }

    pub fn x_min(&self) -> f64 {
        self.x0 - self.lx
    }

    pub fn y_min(&self) -> f64 {
        self.y0 - self.ly
    }

    pub fn x(&self, i: usize) -> f64 {
        self.x_min() + i as f64 * self.dx()
    }

    pub fn y(&self, j: usize) -> f64 {
        self.y_min() + j as f64 * self.dy()
    }

    /// Normalized vertical coordinate of level `k`, from 0 at the base to 1 at the surface.
    pub fn sigma(&self, k: usize) -> f64 {
        if k + 1 == self.mz {
            1.0
        } else {
            k as f64 / (self.mz - 1) as f64
        }
    }

    pub fn num_columns(&self) -> usize {
        self.mx * self.my
    }

    pub fn num_nodes(&self) -> usize {
        self.mx * self.my * self.mz
    }

    pub fn num_elements(&self) -> usize {
        (self.mx - 1) * (self.my - 1) * (self.mz - 1)
    }

    /// Index of column `(i, j)` in 2D fields.
    pub fn column_index(&self, i: usize, j: usize) -> usize {
        debug_assert!(i < self.mx && j < self.my);
        j * self.mx + i
    }

    /// Index of node `(i, j, k)` in 3D fields.
    pub fn node_index(&self, i: usize, j: usize, k: usize) -> usize {
        debug_assert!(k < self.mz);
        self.column_index(i, j) * self.mz + k
    }

    /// Pads the grid so that it can be coarsened `n_levels` times by `factor`.
    ///
    /// Padding extends the domain in the positive x and y directions, keeping the grid spacing
    /// and the position of node `(0, 0)`. The vertical node count is padded as well. With
    /// `horizontally == false` only the vertical direction is padded.
    pub fn padded(&self, n_levels: usize, factor: usize, horizontally: bool) -> Result<Grid, SetupError> {
        let mut padded = *self;
        padded.mz += pad(self.mz, n_levels, factor)?;
        if horizontally {
            let (dx, dy) = (self.dx(), self.dy());
            let px = pad(self.mx, n_levels, factor)?;
            let py = pad(self.my, n_levels, factor)?;
            padded.mx += px;
            padded.my += py;
            padded.lx += 0.5 * px as f64 * dx;
            padded.x0 += 0.5 * px as f64 * dx;
            padded.ly += 0.5 * py as f64 * dy;
            padded.y0 += 0.5 * py as f64 * dy;
        }
        Ok(padded)
    }

    /// The grid formed by the first `mx x my` columns, keeping the spacing, the position of
    /// node `(0, 0)` and the vertical node count.
    pub fn sub_grid(&self, mx: usize, my: usize) -> Result<Grid, SetupError> {
        if mx > self.mx || my > self.my {
            return Err(SetupError::ShapeMismatch {
                field: "sub-grid",
                expected: (self.mx, self.my, self.mz),
                actual: (mx, my, self.mz),
            });
        }
        if (mx, my) == (self.mx, self.my) {
            return Ok(*self);
        }
        let lx = 0.5 * mx.saturating_sub(1) as f64 * self.dx();
        let ly = 0.5 * my.saturating_sub(1) as f64 * self.dy();
        Grid::new(mx, my, self.mz, self.x(0) + lx, self.y(0) + ly, lx, ly)
    }

    /// The next coarser grid, covering the same domain.
    pub fn coarsen(&self, factor: usize, horizontally: bool) -> Result<Grid, SetupError> {
        let mut coarse = *self;
        coarse.mz = coarsen_count(self.mz, factor)?;
        if horizontally {
            coarse.mx = coarsen_count(self.mx, factor)?;
            coarse.my = coarsen_count(self.my, factor)?;
        }
        Ok(coarse)
    }
}

fn coarsen_count(nodes: usize, factor: usize) -> Result<usize, SetupError> {
    if factor < 2 || nodes < 2 || (nodes - 1) % factor != 0 || nodes - 1 < factor {
        return Err(SetupError::NotCoarsenable { nodes, factor });
    }
    Ok((nodes - 1) / factor + 1)
}

/// Number of nodes to add to `nodes` so that `nodes + pad - 1` is divisible by `factor^n_levels`.
///
/// Fails if `nodes` is zero or if the padded count does not fit in a `usize`.
///
/// ```
/// # use icefem::grid::pad;
/// assert_eq!(pad(10, 2, 2).unwrap(), 3);
/// assert_eq!(pad(9, 2, 2).unwrap(), 0);
/// assert!(pad(3, 64, 2).is_err());
/// ```
pub fn pad(nodes: usize, n_levels: usize, factor: usize) -> Result<usize, SetupError> {
    if nodes < 1 {
        return Err(SetupError::GridTooSmall {
            dimension: "padded",
            nodes,
            minimum: 1,
        });
    }
    let overflow = SetupError::PaddingOverflow {
        nodes,
        n_levels,
        factor,
    };
    let c = u32::try_from(n_levels)
        .ok()
        .and_then(|n| factor.checked_pow(n))
        .filter(|&c| c > 0)
        .ok_or_else(|| overflow.clone())?;
    let elements = nodes - 1;
    let padded_elements = (elements / c + usize::from(elements % c != 0))
        .max(1)
        .checked_mul(c)
        .filter(|&n| n < usize::MAX)
        .ok_or(overflow)?;
    Ok(padded_elements - elements)
}

/// Elevation of node `k` in a column with base `bed` and height `height`.
pub fn grid_z(bed: f64, height: f64, mz: usize, k: usize) -> f64 {
    bed + height * k as f64 / (mz - 1) as f64
}

/// A rectangular set of horizontal grid columns owned by one process.
///
/// Every patch sees a ghost halo of width [`GHOST_WIDTH`] around its owned columns, clipped at
/// the domain boundary. Each patch owns complete vertical columns.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Patch {
    xs: usize,
    xm: usize,
    ys: usize,
    ym: usize,
}

impl Patch {
    /// The patch owning all of `grid`.
    pub fn whole(grid: &Grid) -> Self {
        Self {
            xs: 0,
            xm: grid.mx(),
            ys: 0,
            ym: grid.my(),
        }
    }

    /// Columns `[xs, xs + xm) x [ys, ys + ym)`.
    pub fn new(grid: &Grid, xs: usize, xm: usize, ys: usize, ym: usize) -> Result<Self, SetupError> {
        if xm == 0 || ym == 0 || xs + xm > grid.mx() || ys + ym > grid.my() {
            return Err(SetupError::InvalidPatch { xs, xm, ys, ym });
        }
        Ok(Self { xs, xm, ys, ym })
    }

    /// Splits the grid into `px x py` patches of nearly equal size.
    pub fn partition(grid: &Grid, px: usize, py: usize) -> Result<Vec<Self>, SetupError> {
        let x_ranges = split(grid.mx(), px);
        let y_ranges = split(grid.my(), py);
        let mut patches = Vec::with_capacity(px * py);
        for y_range in &y_ranges {
            for x_range in &x_ranges {
                patches.push(Self::new(
                    grid,
                    x_range.start,
                    x_range.len(),
                    y_range.start,
                    y_range.len(),
                )?);
            }
        }
        Ok(patches)
    }

    pub fn xs(&self) -> usize {
        self.xs
    }

    pub fn xm(&self) -> usize {
        self.xm
    }

    pub fn ys(&self) -> usize {
        self.ys
    }

    pub fn ym(&self) -> usize {
        self.ym
    }

    pub fn owns(&self, i: usize, j: usize) -> bool {
        self.owned_x().contains(&i) && self.owned_y().contains(&j)
    }

    pub fn owned_x(&self) -> Range<usize> {
        self.xs..self.xs + self.xm
    }

    pub fn owned_y(&self) -> Range<usize> {
        self.ys..self.ys + self.ym
    }

    /// Owned and ghost columns in the x direction.
    pub fn ghosted_x(&self, grid: &Grid) -> Range<usize> {
        self.xs.saturating_sub(GHOST_WIDTH)..(self.xs + self.xm + GHOST_WIDTH).min(grid.mx())
    }

    pub fn ghosted_y(&self, grid: &Grid) -> Range<usize> {
        self.ys.saturating_sub(GHOST_WIDTH)..(self.ys + self.ym + GHOST_WIDTH).min(grid.my())
    }

    /// Lower-corner x indices of all elements that have at least one owned node.
    pub fn elements_x(&self, grid: &Grid) -> Range<usize> {
        let ghosted = self.ghosted_x(grid);
        ghosted.start..ghosted.end - 1
    }

    pub fn elements_y(&self, grid: &Grid) -> Range<usize> {
        let ghosted = self.ghosted_y(grid);
        ghosted.start..ghosted.end - 1
    }
}

fn split(n: usize, parts: usize) -> Vec<Range<usize>> {
    let parts = parts.clamp(1, n);
    let base = n / parts;
    let remainder = n % parts;
    let mut start = 0;
    (0..parts)
        .map(|p| {
            let len = base + usize::from(p < remainder);
            let range = start..start + len;
            start += len;
            range
        })
        .collect()
}
