//! Bounds-checked 2D and 3D fields on a [`Grid`](crate::grid::Grid), and the per-column model
//! parameters read during assembly.
use crate::error::SetupError;
use crate::grid::Grid;
use serde::{Deserialize, Serialize};
use std::ops::{Index, IndexMut};

/// Classification of a horizontal grid node by the ice cover of its neighborhood.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeType {
    /// All incident elements are icy.
    Interior,
    /// Some, but not all, incident elements are icy.
    Boundary,
    /// No incident element is icy.
    Exterior,
}

/// A field with one value per horizontal grid node, stored row by row (`i` varying fastest).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Field2<T> {
    mx: usize,
    my: usize,
    data: Vec<T>,
}

impl<T: Clone> Field2<T> {
    pub fn from_element(mx: usize, my: usize, value: T) -> Self {
        Self {
            mx,
            my,
            data: vec![value; mx * my],
        }
    }
}

impl<T> Field2<T> {
    pub fn from_fn(mx: usize, my: usize, mut f: impl FnMut(usize, usize) -> T) -> Self {
        let mut data = Vec::with_capacity(mx * my);
        for j in 0..my {
            for i in 0..mx {
                data.push(f(i, j));
            }
        }
        Self { mx, my, data }
    }

    pub fn from_vec(mx: usize, my: usize, data: Vec<T>) -> Result<Self, SetupError> {
        if data.len() != mx * my {
            return Err(SetupError::ShapeMismatch {
                field: "2D field",
                expected: (mx, my, 1),
                actual: (data.len(), 1, 1),
            });
        }
        Ok(Self { mx, my, data })
    }

    pub fn mx(&self) -> usize {
        self.mx
    }

    pub fn my(&self) -> usize {
        self.my
    }

    pub fn get(&self, i: usize, j: usize) -> Option<&T> {
        (i < self.mx && j < self.my).then(|| &self.data[j * self.mx + i])
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn map<U>(&self, f: impl FnMut(&T) -> U) -> Field2<U> {
        Field2 {
            mx: self.mx,
            my: self.my,
            data: self.data.iter().map(f).collect(),
        }
    }

    /// Fails unless the field covers exactly the columns of `grid`.
    pub fn check_shape(&self, grid: &Grid, field: &'static str) -> Result<(), SetupError> {
        if self.mx != grid.mx() || self.my != grid.my() {
            return Err(SetupError::ShapeMismatch {
                field,
                expected: (grid.mx(), grid.my(), 1),
                actual: (self.mx, self.my, 1),
            });
        }
        Ok(())
    }

    fn offset(&self, i: usize, j: usize) -> usize {
        assert!(
            i < self.mx && j < self.my,
            "index ({}, {}) out of bounds for {}x{} field",
            i,
            j,
            self.mx,
            self.my
        );
        j * self.mx + i
    }
}

impl<T> Index<(usize, usize)> for Field2<T> {
    type Output = T;

    fn index(&self, (i, j): (usize, usize)) -> &T {
        &self.data[self.offset(i, j)]
    }
}

impl<T> IndexMut<(usize, usize)> for Field2<T> {
    fn index_mut(&mut self, (i, j): (usize, usize)) -> &mut T {
        let offset = self.offset(i, j);
        &mut self.data[offset]
    }
}

/// A field with one value per 3D grid node. Columns are contiguous.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Field3<T> {
    mx: usize,
    my: usize,
    mz: usize,
    data: Vec<T>,
}

impl<T: Clone> Field3<T> {
    pub fn from_element(mx: usize, my: usize, mz: usize, value: T) -> Self {
        Self {
            mx,
            my,
            mz,
            data: vec![value; mx * my * mz],
        }
    }
}

impl<T> Field3<T> {
    pub fn from_fn(mx: usize, my: usize, mz: usize, mut f: impl FnMut(usize, usize, usize) -> T) -> Self {
        let mut data = Vec::with_capacity(mx * my * mz);
        for j in 0..my {
            for i in 0..mx {
                for k in 0..mz {
                    data.push(f(i, j, k));
                }
            }
        }
        Self { mx, my, mz, data }
    }

    pub fn from_vec(mx: usize, my: usize, mz: usize, data: Vec<T>) -> Result<Self, SetupError> {
        if data.len() != mx * my * mz {
            return Err(SetupError::ShapeMismatch {
                field: "3D field",
                expected: (mx, my, mz),
                actual: (data.len(), 1, 1),
            });
        }
        Ok(Self { mx, my, mz, data })
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

    pub fn get(&self, i: usize, j: usize, k: usize) -> Option<&T> {
        (i < self.mx && j < self.my && k < self.mz).then(|| &self.data[(j * self.mx + i) * self.mz + k])
    }

    /// The vertical column at `(i, j)`, from the base up.
    pub fn column(&self, i: usize, j: usize) -> &[T] {
        let start = self.offset(i, j, 0);
        &self.data[start..start + self.mz]
    }

    pub fn column_mut(&mut self, i: usize, j: usize) -> &mut [T] {
        let start = self.offset(i, j, 0);
        &mut self.data[start..start + self.mz]
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn check_shape(&self, grid: &Grid, field: &'static str) -> Result<(), SetupError> {
        if self.mx != grid.mx() || self.my != grid.my() || self.mz != grid.mz() {
            return Err(SetupError::ShapeMismatch {
                field,
                expected: (grid.mx(), grid.my(), grid.mz()),
                actual: (self.mx, self.my, self.mz),
            });
        }
        Ok(())
    }

    fn offset(&self, i: usize, j: usize, k: usize) -> usize {
        assert!(
            i < self.mx && j < self.my && k < self.mz,
            "index ({}, {}, {}) out of bounds for {}x{}x{} field",
            i,
            j,
            k,
            self.mx,
            self.my,
            self.mz
        );
        (j * self.mx + i) * self.mz + k
    }
}

impl<T> Index<(usize, usize, usize)> for Field3<T> {
    type Output = T;

    fn index(&self, (i, j, k): (usize, usize, usize)) -> &T {
        &self.data[self.offset(i, j, k)]
    }
}

impl<T> IndexMut<(usize, usize, usize)> for Field3<T> {
    fn index_mut(&mut self, (i, j, k): (usize, usize, usize)) -> &mut T {
        let offset = self.offset(i, j, k);
        &mut self.data[offset]
    }
}

/// Geometry-derived parameters of one horizontal node, replicated along its column.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Parameters {
    /// Bed elevation.
    pub bed: f64,
    /// Ice thickness.
    pub thickness: f64,
    pub node_type: NodeType,
    /// Positive where the ice is floating.
    pub floatation: f64,
    /// Basal yield stress.
    pub tauc: f64,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            bed: 0.0,
            thickness: 0.0,
            node_type: NodeType::Exterior,
            floatation: 0.0,
            tauc: 0.0,
        }
    }
}

/// An ice geometry snapshot supplied once per solve.
///
/// All 2D fields cover the unpadded horizontal grid. If `floatation` is absent it is derived
/// from bed, thickness and sea level. `hardness` holds the ice hardness on the unpadded
/// vertical levels; solvers that do not need it ignore it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    pub bed: Field2<f64>,
    pub thickness: Field2<f64>,
    pub tauc: Field2<f64>,
    pub floatation: Option<Field2<f64>>,
    pub hardness: Option<Field3<f64>>,
}

impl Geometry {
    /// Geometry with zero yield stress and no explicit floatation or hardness.
    pub fn new(bed: Field2<f64>, thickness: Field2<f64>) -> Self {
        let tauc = Field2::from_element(bed.mx(), bed.my(), 0.0);
        Self {
            bed,
            thickness,
            tauc,
            floatation: None,
            hardness: None,
        }
    }

    pub fn with_tauc(self, tauc: Field2<f64>) -> Self {
        Self { tauc, ..self }
    }

    pub fn with_floatation(self, floatation: Field2<f64>) -> Self {
        Self {
            floatation: Some(floatation),
            ..self
        }
    }

    pub fn with_hardness(self, hardness: Field3<f64>) -> Self {
        Self {
            hardness: Some(hardness),
            ..self
        }
    }

    /// Fails unless all 2D fields cover the columns of `grid`.
    pub fn check_shape(&self, grid: &Grid) -> Result<(), SetupError> {
        self.bed.check_shape(grid, "bed")?;
        self.thickness.check_shape(grid, "thickness")?;
        self.tauc.check_shape(grid, "tauc")?;
        if let Some(floatation) = &self.floatation {
            floatation.check_shape(grid, "floatation")?;
        }
        if let Some(hardness) = &self.hardness {
            if hardness.mx() != grid.mx() || hardness.my() != grid.my() || hardness.mz() < 2 {
                return Err(SetupError::ShapeMismatch {
                    field: "hardness",
                    expected: (grid.mx(), grid.my(), grid.mz()),
                    actual: (hardness.mx(), hardness.my(), hardness.mz()),
                });
            }
        }
        Ok(())
    }
}
