//! Buffer marshaling between native result buffers and owned Rust values.
//!
//! Every array-returning native call fills an output pointer plus a
//! four-slot count quad `[elements, bytes, rows, cols]`. The helpers here
//! copy that memory into owned buffers; callers dispose the native side
//! immediately after the copy, so returned values never alias engine
//! memory. A nonzero `cols` slot marks a column-major matrix.

use std::ffi::{c_char, CStr};

use ndarray::{Array2, ShapeBuilder};
use num_complex::Complex64;

use crate::error::{Error, Result};

/// An owned copy of a numeric native result, with its optional matrix
/// shape.
#[derive(Debug, Clone, PartialEq)]
pub struct NumericBuffer<T> {
    data: Vec<T>,
    shape: Option<(usize, usize)>,
}

/// float64 result buffer.
pub type Float64Buffer = NumericBuffer<f64>;
/// int32 result buffer.
pub type Int32Buffer = NumericBuffer<i32>;
/// int8 result buffer.
pub type Int8Buffer = NumericBuffer<i8>;

impl<T> NumericBuffer<T> {
    /// Number of elements.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True when the native call produced no data.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// `(rows, cols)` when the engine flagged the result as a matrix.
    pub fn shape(&self) -> Option<(usize, usize)> {
        self.shape
    }

    /// The flat data, in the order the engine produced it.
    pub fn into_vec(self) -> Vec<T> {
        self.data
    }

    /// Convert a matrix-flagged result into a column-major [`Array2`].
    pub fn into_matrix(self) -> Result<Array2<T>> {
        let (rows, cols) = self.shape.ok_or(Error::NotAMatrix)?;
        Array2::from_shape_vec((rows, cols).f(), self.data).map_err(|_| Error::ShapeMismatch {
            expected: rows * cols,
            got: 0,
        })
    }
}

/// Copy a native numeric buffer described by its count quad.
///
/// A null pointer or non-positive element count yields an empty buffer.
/// When the quad flags a matrix, `rows * cols` must equal the element
/// count.
///
/// # Safety
///
/// `ptr`, when non-null, must point at at least `cnt[0]` readable elements.
pub(crate) unsafe fn copy_numeric<T: Copy>(ptr: *const T, cnt: [i32; 4]) -> Result<NumericBuffer<T>> {
    if ptr.is_null() || cnt[0] <= 0 {
        return Ok(NumericBuffer { data: Vec::new(), shape: None });
    }
    let n = cnt[0] as usize;
    let data = std::slice::from_raw_parts(ptr, n).to_vec();
    let shape = if cnt[3] != 0 {
        let rows = cnt[2].max(0) as usize;
        let cols = cnt[3].max(0) as usize;
        if rows * cols != n {
            return Err(Error::ShapeMismatch { expected: rows * cols, got: n });
        }
        Some((rows, cols))
    } else {
        None
    };
    Ok(NumericBuffer { data, shape })
}

/// A complex-capable result: either `Complex64` values, or the raw
/// interleaved float pairs, depending on the context's `complex_arrays`
/// option.
#[derive(Debug, Clone, PartialEq)]
pub enum ComplexArray {
    /// Pairs reinterpreted as complex values.
    Complex(Vec<Complex64>),
    /// Raw interleaved re/im pairs.
    Pairs(Vec<f64>),
}

impl ComplexArray {
    /// Number of complex values represented.
    pub fn len(&self) -> usize {
        match self {
            ComplexArray::Complex(v) => v.len(),
            ComplexArray::Pairs(v) => v.len() / 2,
        }
    }

    /// True when no values are present.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Convert to complex values regardless of the carried representation.
    pub fn into_complex(self) -> Result<Vec<Complex64>> {
        match self {
            ComplexArray::Complex(v) => Ok(v),
            ComplexArray::Pairs(v) => pairs_to_complex(v),
        }
    }

    /// Flatten to interleaved re/im pairs.
    pub fn into_pairs(self) -> Vec<f64> {
        match self {
            ComplexArray::Complex(v) => {
                let mut out = Vec::with_capacity(v.len() * 2);
                for c in v {
                    out.push(c.re);
                    out.push(c.im);
                }
                out
            }
            ComplexArray::Pairs(v) => v,
        }
    }
}

/// Pair up interleaved floats into complex values.
pub(crate) fn pairs_to_complex(pairs: Vec<f64>) -> Result<Vec<Complex64>> {
    if pairs.len() % 2 != 0 {
        return Err(Error::OddPairCount { len: pairs.len() });
    }
    Ok(pairs
        .chunks_exact(2)
        .map(|p| Complex64::new(p[0], p[1]))
        .collect())
}

/// Wrap interleaved floats per the `complex_arrays` option.
pub(crate) fn to_complex_array(pairs: Vec<f64>, complex: bool) -> Result<ComplexArray> {
    if complex {
        Ok(ComplexArray::Complex(pairs_to_complex(pairs)?))
    } else {
        Ok(ComplexArray::Pairs(pairs))
    }
}

/// Decode a native string with lossy UTF-8. Null decodes to an empty
/// string. The caller still owns (and must dispose) the native pointer.
pub(crate) unsafe fn decode_string(ptr: *const c_char) -> String {
    if ptr.is_null() {
        String::new()
    } else {
        CStr::from_ptr(ptr).to_string_lossy().into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad(n: i32, rows: i32, cols: i32) -> [i32; 4] {
        [n, n * 8, rows, cols]
    }

    #[test]
    fn flat_copy_has_native_length() {
        let data = [1.0f64, 2.0, 3.0, 4.0, 5.0];
        let buf = unsafe { copy_numeric(data.as_ptr(), quad(5, 0, 0)) }.unwrap();
        assert_eq!(buf.len(), 5);
        assert_eq!(buf.shape(), None);
        assert_eq!(buf.into_vec(), data.to_vec());
    }

    #[test]
    fn matrix_copy_is_column_major() {
        // Two rows, three columns, stored column-by-column.
        let data = [1.0f64, 2.0, 3.0, 4.0, 5.0, 6.0];
        let buf = unsafe { copy_numeric(data.as_ptr(), quad(6, 2, 3)) }.unwrap();
        assert_eq!(buf.shape(), Some((2, 3)));
        let m = buf.into_matrix().unwrap();
        assert_eq!(m[[0, 0]], 1.0);
        assert_eq!(m[[1, 0]], 2.0);
        assert_eq!(m[[0, 1]], 3.0);
        assert_eq!(m[[1, 1]], 4.0);
        assert_eq!(m[[0, 2]], 5.0);
        assert_eq!(m[[1, 2]], 6.0);
    }

    #[test]
    fn matrix_shape_must_cover_all_elements() {
        let data = [1.0f64; 5];
        let err = unsafe { copy_numeric(data.as_ptr(), quad(5, 2, 3)) }.unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { expected: 6, got: 5 }));
    }

    #[test]
    fn null_pointer_yields_empty_buffer() {
        let buf = unsafe { copy_numeric::<f64>(std::ptr::null(), quad(0, 0, 0)) }.unwrap();
        assert!(buf.is_empty());
        // A null pointer wins even over a bogus nonzero count.
        let buf = unsafe { copy_numeric::<f64>(std::ptr::null(), quad(3, 0, 0)) }.unwrap();
        assert!(buf.is_empty());
    }

    #[test]
    fn int8_and_int32_copies_work() {
        let bytes = [1i8, 0, 1];
        let buf = unsafe { copy_numeric(bytes.as_ptr(), [3, 3, 0, 0]) }.unwrap();
        assert_eq!(buf.into_vec(), vec![1i8, 0, 1]);

        let ints = [10i32, 20, 30];
        let buf = unsafe { copy_numeric(ints.as_ptr(), [3, 12, 0, 0]) }.unwrap();
        assert_eq!(buf.into_vec(), vec![10, 20, 30]);
    }

    #[test]
    fn flat_buffer_refuses_matrix_conversion() {
        let data = [1.0f64, 2.0];
        let buf = unsafe { copy_numeric(data.as_ptr(), quad(2, 0, 0)) }.unwrap();
        assert!(matches!(buf.into_matrix(), Err(Error::NotAMatrix)));
    }

    #[test]
    fn pairing_floats_into_complex() {
        let v = vec![1.0, 2.0, 3.0, -4.0];
        let c = pairs_to_complex(v).unwrap();
        assert_eq!(c, vec![Complex64::new(1.0, 2.0), Complex64::new(3.0, -4.0)]);

        let err = pairs_to_complex(vec![1.0, 2.0, 3.0]).unwrap_err();
        assert!(matches!(err, Error::OddPairCount { len: 3 }));
    }

    #[test]
    fn complex_array_follows_the_option() {
        let pairs = vec![1.0, -1.0];
        let a = to_complex_array(pairs.clone(), true).unwrap();
        assert_eq!(a, ComplexArray::Complex(vec![Complex64::new(1.0, -1.0)]));
        let b = to_complex_array(pairs.clone(), false).unwrap();
        assert_eq!(b, ComplexArray::Pairs(pairs));
        // Same bytes either way.
        assert_eq!(a.into_pairs(), b.into_pairs());
    }

    #[test]
    fn null_string_decodes_empty() {
        assert_eq!(unsafe { decode_string(std::ptr::null()) }, "");
    }
}
