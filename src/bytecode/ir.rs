use serde::{Deserialize, Serialize};

use crate::bytecode::cell::Cell;

/// Highest array rank the language accepts.
pub const MAX_ARRAY_DIMS: usize = 8;

/// A compiled postfix program.
///
/// Operands appear in source order and every operator consumes the cells
/// below it. A well-formed program leaves exactly one value behind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IcodeVector {
    cells: Vec<Cell>,
}

impl IcodeVector {
    pub fn new() -> Self {
        Self { cells: Vec::new() }
    }

    /// A program that just pushes `cell`.
    pub fn literal(cell: Cell) -> Self {
        Self { cells: vec![cell] }
    }

    pub fn push(&mut self, cell: Cell) {
        self.cells.push(cell);
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// The literal this program pushes, when it is nothing more than that.
    pub fn as_literal(&self) -> Option<&Cell> {
        match self.cells.as_slice() {
            [cell] if cell.is_literal() => Some(cell),
            _ => None,
        }
    }
}

impl From<Vec<Cell>> for IcodeVector {
    fn from(cells: Vec<Cell>) -> Self {
        Self { cells }
    }
}

impl FromIterator<Cell> for IcodeVector {
    fn from_iter<I: IntoIterator<Item = Cell>>(iter: I) -> Self {
        Self {
            cells: iter.into_iter().collect(),
        }
    }
}

/// Why an index tuple does not address an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexFault {
    Rank { expected: usize, found: usize },
    OutOfRange { axis: usize, index: i64, size: usize },
}

impl std::fmt::Display for IndexFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexFault::Rank { expected, found } => {
                write!(f, "expected {} indices, got {}", expected, found)
            }
            IndexFault::OutOfRange { axis, index, size } => write!(
                f,
                "index {} on dimension {} is outside the valid range 0..{}",
                index,
                axis,
                size.saturating_sub(1)
            ),
        }
    }
}

/// Dimension vector plus one program per element, stored row-major.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ArrayParts")]
pub struct ArrayInfo {
    dims: Vec<usize>,
    elements: Vec<IcodeVector>,
}

/// Deserialized form of [`ArrayInfo`], checked before it is accepted.
#[derive(Deserialize)]
struct ArrayParts {
    dims: Vec<usize>,
    elements: Vec<IcodeVector>,
}

impl TryFrom<ArrayParts> for ArrayInfo {
    type Error = String;

    fn try_from(parts: ArrayParts) -> Result<Self, String> {
        let ArrayParts { dims, elements } = parts;
        if dims.is_empty() || dims.len() > MAX_ARRAY_DIMS {
            return Err(format!(
                "array has {} dimensions, expected 1 to {}",
                dims.len(),
                MAX_ARRAY_DIMS
            ));
        }
        let total = dims.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d));
        if dims.contains(&0) || total != Some(elements.len()) {
            return Err(format!(
                "array dimensions {:?} do not match its {} elements",
                dims,
                elements.len()
            ));
        }
        Ok(Self { dims, elements })
    }
}

impl ArrayInfo {
    /// Builds an array of the given shape; unlisted trailing elements are `0`.
    ///
    /// The caller guarantees `elements.len()` does not exceed the product of
    /// `dims`.
    pub fn new(dims: Vec<usize>, mut elements: Vec<IcodeVector>) -> Self {
        let total: usize = dims.iter().product();
        elements.resize_with(total, || IcodeVector::literal(Cell::Int(0)));
        Self { dims, elements }
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Total number of elements.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn elements(&self) -> &[IcodeVector] {
        &self.elements
    }

    /// Resolves an index tuple to a row-major offset (leftmost index varies
    /// slowest).
    pub fn linear_index(&self, indices: &[i64]) -> Result<usize, IndexFault> {
        if indices.len() != self.dims.len() {
            return Err(IndexFault::Rank {
                expected: self.dims.len(),
                found: indices.len(),
            });
        }

        let mut offset = 0usize;
        for (axis, (&index, &size)) in indices.iter().zip(&self.dims).enumerate() {
            if index < 0 || index as usize >= size {
                return Err(IndexFault::OutOfRange { axis, index, size });
            }
            offset = offset * size + index as usize;
        }
        Ok(offset)
    }

    /// Inverse of [`ArrayInfo::linear_index`].
    pub fn index_tuple(&self, mut offset: usize) -> Vec<usize> {
        let mut tuple = vec![0; self.dims.len()];
        for (slot, &size) in tuple.iter_mut().zip(&self.dims).rev() {
            *slot = offset % size;
            offset /= size;
        }
        tuple
    }

    pub fn element(&self, indices: &[i64]) -> Result<&IcodeVector, IndexFault> {
        let offset = self.linear_index(indices)?;
        Ok(&self.elements[offset])
    }

    pub fn set(&mut self, indices: &[i64], code: IcodeVector) -> Result<(), IndexFault> {
        let offset = self.linear_index(indices)?;
        self.elements[offset] = code;
        Ok(())
    }
}

/// Breakpoints of a piecewise-linear table, `x` strictly increasing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PwlParts")]
pub struct PiecewiseLinear {
    points: Vec<(f64, f64)>,
}

#[derive(Deserialize)]
struct PwlParts {
    points: Vec<(f64, f64)>,
}

impl TryFrom<PwlParts> for PiecewiseLinear {
    type Error = String;

    fn try_from(parts: PwlParts) -> Result<Self, String> {
        Self::new(parts.points)
    }
}

impl PiecewiseLinear {
    pub fn new(points: Vec<(f64, f64)>) -> Result<Self, String> {
        if points.is_empty() {
            return Err("a piecewise-linear table needs at least one point".to_string());
        }
        if let Some(i) = points.iter().position(|(x, y)| !x.is_finite() || !y.is_finite()) {
            return Err(format!("point {} is not finite", i));
        }
        for (i, pair) in points.windows(2).enumerate() {
            if pair[1].0 <= pair[0].0 {
                return Err(format!(
                    "x values must be strictly increasing, but point {} has x = {} after x = {}",
                    i + 1,
                    pair[1].0,
                    pair[0].0
                ));
            }
        }
        Ok(Self { points })
    }

    pub fn points(&self) -> &[(f64, f64)] {
        &self.points
    }
}

/// What a declared name is bound to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EntryKind {
    /// Evaluated afresh on every run.
    Scalar(IcodeVector),
    Array(ArrayInfo),
    Function {
        params: Vec<String>,
        body: IcodeVector,
    },
    Pwl(PiecewiseLinear),
}

/// One declared name and its compiled form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolTableEntry {
    pub name: String,
    pub kind: EntryKind,
}

impl SymbolTableEntry {
    pub fn scalar(name: impl Into<String>, code: IcodeVector) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::Scalar(code),
        }
    }

    pub fn array(name: impl Into<String>, info: ArrayInfo) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::Array(info),
        }
    }

    pub fn function(name: impl Into<String>, params: Vec<String>, body: IcodeVector) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::Function { params, body },
        }
    }

    pub fn pwl(name: impl Into<String>, table: PiecewiseLinear) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::Pwl(table),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            EntryKind::Scalar(_) => "scalar",
            EntryKind::Array(_) => "array",
            EntryKind::Function { .. } => "function",
            EntryKind::Pwl(_) => "piecewise-linear table",
        }
    }

    pub fn as_array(&self) -> Option<&ArrayInfo> {
        match &self.kind {
            EntryKind::Array(info) => Some(info),
            _ => None,
        }
    }

    /// Number of arguments a call must supply, for callable entries.
    pub fn arity(&self) -> Option<usize> {
        match &self.kind {
            EntryKind::Function { params, .. } => Some(params.len()),
            EntryKind::Pwl(_) => Some(1),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(dims: Vec<usize>) -> ArrayInfo {
        let total: usize = dims.iter().product();
        let elements = (0..total as i64)
            .map(|n| IcodeVector::literal(Cell::Int(n)))
            .collect();
        ArrayInfo::new(dims, elements)
    }

    #[test]
    fn test_row_major_offsets() {
        let a = grid(vec![2, 3]);
        assert_eq!(a.linear_index(&[0, 0]), Ok(0));
        assert_eq!(a.linear_index(&[0, 2]), Ok(2));
        assert_eq!(a.linear_index(&[1, 0]), Ok(3));
        assert_eq!(a.linear_index(&[1, 2]), Ok(5));
        assert_eq!(a.index_tuple(4), vec![1, 1]);
    }

    #[test]
    fn test_index_faults() {
        let a = grid(vec![2, 3]);
        assert_eq!(
            a.linear_index(&[1]),
            Err(IndexFault::Rank {
                expected: 2,
                found: 1
            })
        );
        assert_eq!(
            a.linear_index(&[0, 3]),
            Err(IndexFault::OutOfRange {
                axis: 1,
                index: 3,
                size: 3
            })
        );
        assert!(a.linear_index(&[-1, 0]).is_err());
    }

    #[test]
    fn test_short_initializer_zero_fills() {
        let a = ArrayInfo::new(vec![3], vec![IcodeVector::literal(Cell::Int(7))]);
        assert_eq!(a.len(), 3);
        assert_eq!(a.elements()[2].as_literal(), Some(&Cell::Int(0)));
    }

    #[test]
    fn test_set_element() {
        let mut a = grid(vec![2, 2]);
        a.set(&[1, 1], IcodeVector::literal(Cell::Bool(true))).unwrap();
        assert_eq!(
            a.element(&[1, 1]).unwrap().as_literal(),
            Some(&Cell::Bool(true))
        );
    }

    #[test]
    fn test_pwl_needs_increasing_x() {
        assert!(PiecewiseLinear::new(vec![(0.0, 1.0), (1.0, 2.0)]).is_ok());
        assert!(PiecewiseLinear::new(vec![]).is_err());
        let err = PiecewiseLinear::new(vec![(0.0, 1.0), (0.0, 2.0)]).unwrap_err();
        assert!(err.contains("strictly increasing"));
    }

    #[test]
    fn test_pwl_rejects_non_finite_points() {
        let err = PiecewiseLinear::new(vec![(0.0, 1.0), (f64::INFINITY, 2.0)]).unwrap_err();
        assert!(err.contains("point 1 is not finite"));
    }

    #[derive(Serialize)]
    struct RawArray {
        dims: Vec<usize>,
        elements: Vec<IcodeVector>,
    }

    #[derive(Serialize)]
    struct RawPwl {
        points: Vec<(f64, f64)>,
    }

    #[test]
    fn test_deserialize_checks_arrays() {
        let good = grid(vec![2, 2]);
        let bytes = postcard::to_allocvec(&good).unwrap();
        assert_eq!(postcard::from_bytes::<ArrayInfo>(&bytes).unwrap(), good);

        let bad = [
            RawArray { dims: vec![3], elements: vec![IcodeVector::literal(Cell::Int(1))] },
            RawArray { dims: vec![], elements: vec![] },
            RawArray { dims: vec![0], elements: vec![] },
            RawArray { dims: vec![usize::MAX, 2], elements: vec![] },
        ];
        for raw in bad {
            let bytes = postcard::to_allocvec(&raw).unwrap();
            assert!(postcard::from_bytes::<ArrayInfo>(&bytes).is_err(), "{:?}", raw.dims);
        }
    }

    #[test]
    fn test_deserialize_checks_tables() {
        let bytes = postcard::to_allocvec(&RawPwl {
            points: vec![(1.0, 0.0), (0.0, 1.0)],
        })
        .unwrap();
        assert!(postcard::from_bytes::<PiecewiseLinear>(&bytes).is_err());

        let bytes = postcard::to_allocvec(&RawPwl { points: vec![] }).unwrap();
        assert!(postcard::from_bytes::<PiecewiseLinear>(&bytes).is_err());
    }

    #[test]
    fn test_entry_arity() {
        let f = SymbolTableEntry::function(
            "f",
            vec!["a".into(), "b".into()],
            IcodeVector::literal(Cell::Int(1)),
        );
        assert_eq!(f.arity(), Some(2));
        assert_eq!(f.kind_name(), "function");
        assert_eq!(
            SymbolTableEntry::scalar("x", IcodeVector::new()).arity(),
            None
        );
    }
}
