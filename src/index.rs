//! Index expressions and their normalisation against an array shape.
//!
//! An index expression is a list of [`IndexItem`]s in axis order, following
//! the usual conventions of n-dimensional arrays: integers select one
//! position and drop the axis, slices select an ordered subset, and a single
//! ellipsis stands in for every axis not otherwise addressed.

use std::ops::{Range, RangeFrom, RangeFull, RangeTo};

/// One item of an index expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexItem {
    /// A single position; negative values count from the end.
    Int(i64),
    Slice(Slice),
    Ellipsis,
}

/// A `start:stop:step` slice; negative bounds count from the end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Slice {
    pub start: Option<i64>,
    pub stop: Option<i64>,
    pub step: Option<i64>,
}

impl Slice {
    pub fn new(start: Option<i64>, stop: Option<i64>, step: Option<i64>) -> Self {
        Self { start, stop, step }
    }

    /// The slice selecting everything.
    pub fn full() -> Self {
        Self::default()
    }
}

impl From<i64> for IndexItem {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<Slice> for IndexItem {
    fn from(value: Slice) -> Self {
        Self::Slice(value)
    }
}

impl From<Range<i64>> for IndexItem {
    fn from(value: Range<i64>) -> Self {
        Self::Slice(Slice::new(Some(value.start), Some(value.end), None))
    }
}

impl From<RangeFrom<i64>> for IndexItem {
    fn from(value: RangeFrom<i64>) -> Self {
        Self::Slice(Slice::new(Some(value.start), None, None))
    }
}

impl From<RangeTo<i64>> for IndexItem {
    fn from(value: RangeTo<i64>) -> Self {
        Self::Slice(Slice::new(None, Some(value.end), None))
    }
}

impl From<RangeFull> for IndexItem {
    fn from(_: RangeFull) -> Self {
        Self::Slice(Slice::full())
    }
}

/// A normalised selection along one axis, in absolute coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AxisSelection {
    /// Select one position and drop the axis.
    Index(u64),
    /// Select `len` positions `start, start + step, ...`; the axis is kept.
    Range { start: u64, step: u64, len: u64 },
}

impl AxisSelection {
    pub fn full(len: u64) -> Self {
        Self::Range {
            start: 0,
            step: 1,
            len,
        }
    }

    /// Whether the axis survives this selection.
    pub fn keeps_axis(&self) -> bool {
        matches!(self, Self::Range { .. })
    }

    /// Number of positions selected.
    pub fn len(&self) -> u64 {
        match self {
            Self::Index(_) => 1,
            Self::Range { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self, extent: u64) -> bool {
        matches!(self, Self::Range { start: 0, step: 1, len } if *len == extent)
    }

    /// The selected positions, in order.
    pub fn positions(&self) -> impl Iterator<Item = u64> + '_ {
        let (start, step, len) = match *self {
            Self::Index(i) => (i, 1, 1),
            Self::Range { start, step, len } => (start, step, len),
        };
        (0..len).map(move |i| start + i * step)
    }

    /// Apply `inner`, expressed relative to the positions this selection
    /// keeps, and return the equivalent selection in absolute coordinates.
    ///
    /// Returns `None` if `self` already dropped its axis.
    pub fn compose(&self, inner: &AxisSelection) -> Option<AxisSelection> {
        let Self::Range { start, step, .. } = *self else {
            return None;
        };
        let out = match *inner {
            Self::Index(i) => Self::Index(start + i * step),
            Self::Range {
                start: s,
                step: st,
                len,
            } => Self::Range {
                start: start + s * step,
                step: step * st,
                len,
            },
        };
        Some(out)
    }
}

/// `value`, counted from the end when negative; `i128` holds every
/// `i64 + u64` sum.
fn from_end(value: i64, extent: u64) -> i128 {
    let value = i128::from(value);
    if value < 0 {
        value + i128::from(extent)
    } else {
        value
    }
}

fn normalize_int(value: i64, extent: u64, axis: usize) -> crate::Result<u64> {
    let idx = from_end(value, extent);
    if idx < 0 || idx >= i128::from(extent) {
        return Err(crate::Error::index(format!(
            "index {value} is out of bounds for axis {axis} with size {extent}"
        )));
    }
    Ok(idx as u64)
}

fn normalize_bound(value: i64, extent: u64, axis: usize) -> crate::Result<u64> {
    let idx = from_end(value, extent);
    if idx < 0 || idx > i128::from(extent) {
        return Err(crate::Error::index(format!(
            "slice bound {value} is out of bounds for axis {axis} with size {extent}"
        )));
    }
    Ok(idx as u64)
}

fn normalize_slice(slice: &Slice, extent: u64, axis: usize) -> crate::Result<AxisSelection> {
    let step = slice.step.unwrap_or(1);
    if step <= 0 {
        return Err(crate::Error::index(format!(
            "slice step must be positive, got {step} on axis {axis}"
        )));
    }
    let start = match slice.start {
        Some(s) => normalize_bound(s, extent, axis)?,
        None => 0,
    };
    let stop = match slice.stop {
        Some(s) => normalize_bound(s, extent, axis)?,
        None => extent,
    };
    let step = step as u64;
    let len = if stop > start {
        (stop - start).div_ceil(step)
    } else {
        0
    };
    Ok(AxisSelection::Range { start, step, len })
}

/// Resolve an index expression against `shape`, producing one
/// [`AxisSelection`] per axis.
///
/// Out-of-range integers and slice bounds are rejected rather than clamped.
pub fn normalize(items: &[IndexItem], shape: &[u64]) -> crate::Result<Vec<AxisSelection>> {
    let n_ellipsis = items
        .iter()
        .filter(|it| matches!(it, IndexItem::Ellipsis))
        .count();
    if n_ellipsis > 1 {
        return Err(crate::Error::index("only one ellipsis is allowed"));
    }
    let n_explicit = items.len() - n_ellipsis;
    if n_explicit > shape.len() {
        return Err(crate::Error::index(format!(
            "too many indices: {n_explicit} given for {} dimensions",
            shape.len()
        )));
    }

    let mut expanded = Vec::with_capacity(shape.len());
    for item in items {
        if let IndexItem::Ellipsis = item {
            let fill = shape.len() - n_explicit;
            expanded.extend(std::iter::repeat_n(IndexItem::Slice(Slice::full()), fill));
        } else {
            expanded.push(*item);
        }
    }
    while expanded.len() < shape.len() {
        expanded.push(IndexItem::Slice(Slice::full()));
    }

    expanded
        .iter()
        .zip(shape)
        .enumerate()
        .map(|(axis, (item, &extent))| match item {
            IndexItem::Int(i) => normalize_int(*i, extent, axis).map(AxisSelection::Index),
            IndexItem::Slice(s) => normalize_slice(s, extent, axis),
            IndexItem::Ellipsis => unreachable!("ellipsis was expanded"),
        })
        .collect()
}

/// Shape remaining after applying `selections`.
pub fn selected_shape(selections: &[AxisSelection]) -> Vec<u64> {
    selections
        .iter()
        .filter(|s| s.keeps_axis())
        .map(AxisSelection::len)
        .collect()
}

/// Row-major linear indices into an array of `shape` picked out by
/// `selections`, in output order.
pub(crate) fn select_linear(shape: &[u64], selections: &[AxisSelection]) -> Vec<usize> {
    debug_assert_eq!(shape.len(), selections.len());
    let positions: Vec<Vec<u64>> = selections.iter().map(|s| s.positions().collect()).collect();
    if positions.iter().any(Vec::is_empty) {
        return Vec::new();
    }

    let mut strides = vec![1u64; shape.len()];
    for ax in (0..shape.len().saturating_sub(1)).rev() {
        strides[ax] = strides[ax + 1] * shape[ax + 1];
    }

    let total: usize = positions.iter().map(Vec::len).product();
    let mut out = Vec::with_capacity(total);
    let mut counter = vec![0usize; shape.len()];
    loop {
        let linear: u64 = counter
            .iter()
            .zip(&positions)
            .zip(&strides)
            .map(|((&c, pos), &stride)| pos[c] * stride)
            .sum();
        out.push(linear as usize);

        // odometer increment, last axis fastest
        let mut ax = shape.len();
        loop {
            if ax == 0 {
                return out;
            }
            ax -= 1;
            counter[ax] += 1;
            if counter[ax] < positions[ax].len() {
                break;
            }
            counter[ax] = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ellipsis_expands_to_unaddressed_axes() {
        let sel = normalize(&[IndexItem::Ellipsis, 5.into()], &[11, 128, 128]).unwrap();
        assert_eq!(
            sel,
            vec![
                AxisSelection::full(11),
                AxisSelection::full(128),
                AxisSelection::Index(5)
            ]
        );
    }

    #[test]
    fn trailing_axes_default_to_full() {
        let sel = normalize(&[(2..4).into()], &[10, 3]).unwrap();
        assert_eq!(
            sel,
            vec![
                AxisSelection::Range {
                    start: 2,
                    step: 1,
                    len: 2
                },
                AxisSelection::full(3)
            ]
        );
    }

    #[test]
    fn negative_indices_count_from_end() {
        let sel = normalize(&[(-1).into(), (-3..).into()], &[4, 5]).unwrap();
        assert_eq!(sel[0], AxisSelection::Index(3));
        assert_eq!(
            sel[1],
            AxisSelection::Range {
                start: 2,
                step: 1,
                len: 3
            }
        );
    }

    #[test]
    fn stepped_slice_length() {
        let s = Slice::new(Some(1), Some(8), Some(3));
        let sel = normalize(&[s.into()], &[10]).unwrap();
        assert_eq!(sel[0].positions().collect::<Vec<_>>(), vec![1, 4, 7]);
    }

    #[test]
    fn rejects_out_of_bounds() {
        assert!(normalize(&[10.into()], &[10]).is_err());
        assert!(normalize(&[(0..11).into()], &[10]).is_err());
        assert!(normalize(&[0.into(), 0.into()], &[10]).is_err());
        assert!(normalize(&[IndexItem::Ellipsis, IndexItem::Ellipsis], &[10]).is_err());
        let zero_step = Slice::new(None, None, Some(0));
        assert!(normalize(&[zero_step.into()], &[10]).is_err());
    }

    #[test]
    fn extents_beyond_i64_range() {
        let extent = u64::MAX - 1;
        let sel = normalize(&[(-1).into()], &[extent]).unwrap();
        assert_eq!(sel[0], AxisSelection::Index(extent - 1));
        let sel = normalize(&[5.into()], &[extent]).unwrap();
        assert_eq!(sel[0], AxisSelection::Index(5));
        let sel = normalize(&[(i64::MIN..).into()], &[extent]).unwrap();
        assert_eq!(
            sel[0].positions().next(),
            Some(extent - i64::MIN.unsigned_abs())
        );
    }

    #[test]
    fn empty_slice_is_allowed() {
        let sel = normalize(&[(3..3).into()], &[10]).unwrap();
        assert!(sel[0].is_empty());
    }

    #[test]
    fn compose_maps_to_absolute_positions() {
        let outer = AxisSelection::Range {
            start: 2,
            step: 2,
            len: 4,
        };
        assert_eq!(
            outer.compose(&AxisSelection::Index(1)),
            Some(AxisSelection::Index(4))
        );
        let inner = AxisSelection::Range {
            start: 1,
            step: 1,
            len: 2,
        };
        assert_eq!(
            outer.compose(&inner).unwrap().positions().collect::<Vec<_>>(),
            vec![4, 6]
        );
        assert_eq!(AxisSelection::Index(3).compose(&inner), None);
    }

    #[test]
    fn linear_selection_is_row_major() {
        let shape = [2, 3];
        let sel = [AxisSelection::full(2), AxisSelection::Index(1)];
        assert_eq!(select_linear(&shape, &sel), vec![1, 4]);
        assert_eq!(select_linear(&[], &[]), vec![0]);
    }
}
