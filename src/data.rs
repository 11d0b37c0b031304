use crate::errors::SaplingError;

/// Contiguous Row Major Matrix data container.
///
/// This structure is a view over a dense matrix of values held in a single
/// contiguous slice, where each row holds the attributes of one sample.
/// Rows are therefore cheap to slice, and columns are read with a stride.
///
/// # Type Parameters
/// * `T` - The numeric type of the data (e.g., `f32`).
#[derive(Clone, Copy, Debug)]
pub struct Matrix<'a, T> {
    /// The raw data stored in a single slice.
    pub data: &'a [T],
    /// Number of rows in the matrix.
    pub rows: usize,
    /// Number of columns in the matrix.
    pub cols: usize,
}

impl<'a, T> Matrix<'a, T> {
    /// Create a new Matrix. The caller guarantees `data.len() == rows * cols`,
    /// see [`Matrix::try_new`] for a checked constructor.
    pub fn new(data: &'a [T], rows: usize, cols: usize) -> Self {
        Matrix { data, rows, cols }
    }

    /// Create a new Matrix, checking the buffer length against the shape.
    pub fn try_new(data: &'a [T], rows: usize, cols: usize) -> Result<Self, SaplingError> {
        if data.len() != rows * cols {
            return Err(SaplingError::ShapeMismatch(
                "matrix buffer".to_string(),
                rows * cols,
                data.len(),
            ));
        }
        Ok(Matrix::new(data, rows, cols))
    }

    /// Get a single reference to an item in the matrix.
    ///
    /// * `i` - The ith row of the data to get.
    /// * `j` - the jth column of the data to get.
    #[inline]
    pub fn get(&self, i: usize, j: usize) -> &T {
        &self.data[i * self.cols + j]
    }

    /// Get a row of the matrix as a slice.
    #[inline]
    pub fn get_row(&self, row: usize) -> &'a [T] {
        let start = row * self.cols;
        &self.data[start..start + self.cols]
    }

    /// Iterate over the rows of the matrix.
    pub fn row_iter(&self) -> impl Iterator<Item = &'a [T]> + '_ {
        (0..self.rows).map(move |r| self.get_row(r))
    }
}

/// Training targets. Classification trees are trained on integer class
/// labels, regression trees on continuous values.
#[derive(Clone, Copy, Debug)]
pub enum Labels<'a> {
    Classes(&'a [i32]),
    Values(&'a [f32]),
}

impl Labels<'_> {
    pub fn len(&self) -> usize {
        match self {
            Labels::Classes(y) => y.len(),
            Labels::Values(y) => y.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Labels::Classes(_) => "class",
            Labels::Values(_) => "continuous",
        }
    }
}
