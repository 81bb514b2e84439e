//! Dense matrix multiply primitives
//!
//! Every higher-level kernel is composed from [`dot`] and the two multiply
//! forms below. Products are formed in the accumulator type of the operand
//! kind and narrowed once per output element.

use crate::error::{KernelError, Result};
use crate::matrix::Matrix;
use crate::numeric::Element;

/// Inner product of two equal-length rows in the accumulator type.
#[inline]
pub fn dot<T: Element>(a: &[T], b: &[T]) -> T::Acc {
    debug_assert_eq!(a.len(), b.len());
    let mut acc = T::Acc::default();
    for (&x, &y) in a.iter().zip(b) {
        acc += x.widen() * y.widen();
    }
    acc
}

/// `C = A · B` for `A[p, q]`, `B[q, r]`.
pub fn multiply<T: Element>(a: &Matrix<T>, b: &Matrix<T>) -> Result<Matrix<T>> {
    if a.cols() != b.rows() {
        return Err(KernelError::shape("multiply rhs", (a.cols(), b.cols()), b.shape()));
    }
    let (p, q, r) = (a.rows(), a.cols(), b.cols());
    let mut acc = vec![T::Acc::default(); r];
    let mut out = Matrix::zeros(p, r);
    for i in 0..p {
        acc.fill(T::Acc::default());
        let a_row = a.row(i);
        for k in 0..q {
            let lhs = a_row[k].widen();
            for (slot, &rhs) in acc.iter_mut().zip(b.row(k)) {
                *slot += lhs * rhs.widen();
            }
        }
        for (dst, &sum) in out.row_mut(i).iter_mut().zip(&acc) {
            *dst = T::narrow(sum);
        }
    }
    Ok(out)
}

/// `C = A · Bᵗ` for `A[p, q]`, `B[r, q]`, without materialising `Bᵗ`.
pub fn multiply_transposed<T: Element>(a: &Matrix<T>, b: &Matrix<T>) -> Result<Matrix<T>> {
    let mut acc = vec![T::Acc::default(); a.rows() * b.rows()];
    multiply_transposed_accumulate(a, b, &mut acc)?;
    Matrix::from_vec(a.rows(), b.rows(), acc.into_iter().map(T::narrow).collect())
}

/// Add `A · Bᵗ` into a caller-owned `[p, r]` accumulator buffer.
///
/// Used where several products must be summed before a single narrowing,
/// such as the per-head output projection.
pub fn multiply_transposed_accumulate<T: Element>(
    a: &Matrix<T>,
    b: &Matrix<T>,
    acc: &mut [T::Acc],
) -> Result<()> {
    if a.cols() != b.cols() {
        return Err(KernelError::shape(
            "multiply_transposed rhs",
            (b.rows(), a.cols()),
            b.shape(),
        ));
    }
    let r = b.rows();
    if acc.len() != a.rows() * r {
        return Err(KernelError::shape("accumulator", (a.rows(), r), (acc.len() / r.max(1), r)));
    }
    for i in 0..a.rows() {
        let a_row = a.row(i);
        for (j, slot) in acc[i * r..(i + 1) * r].iter_mut().enumerate() {
            *slot += dot(a_row, b.row(j));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::numeric::I4;

    #[test]
    fn test_multiply_f32() {
        let a = Matrix::from_vec(2, 3, vec![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let b = Matrix::from_vec(3, 2, vec![7.0f32, 8.0, 9.0, 10.0, 11.0, 12.0]).unwrap();
        let c = multiply(&a, &b).unwrap();
        assert_eq!(c.as_slice(), &[58.0, 64.0, 139.0, 154.0]);
    }

    #[test]
    fn test_multiply_transposed_matches_multiply() {
        let a = Matrix::<i16>::from_fn(4, 5, |i, j| (i as i16 - 2) * (j as i16 + 1));
        let b = Matrix::<i16>::from_fn(3, 5, |i, j| (i + j) as i16 % 4 - 1);
        let bt = Matrix::<i16>::from_fn(5, 3, |i, j| *b.get(j, i));
        assert_eq!(multiply_transposed(&a, &b).unwrap(), multiply(&a, &bt).unwrap());
    }

    #[test]
    fn test_int8_accumulates_wide() {
        // 4 * 127 * 127 overflows i8 and i16 but not the i32 accumulator
        let a = Matrix::<i8>::from_vec(1, 4, vec![127; 4]).unwrap();
        let b = Matrix::<i8>::from_vec(1, 4, vec![127; 4]).unwrap();
        let mut acc = vec![0i32; 1];
        multiply_transposed_accumulate(&a, &b, &mut acc).unwrap();
        assert_eq!(acc[0], 4 * 127 * 127);
        assert_eq!(*multiply_transposed(&a, &b).unwrap().get(0, 0), 127);
    }

    #[test]
    fn test_int4_dot() {
        let a = [I4::new(-8), I4::new(7), I4::new(3)];
        let b = [I4::new(-8), I4::new(-1), I4::new(2)];
        assert_eq!(dot(&a, &b), 64 - 7 + 6);
    }

    #[test]
    fn test_shape_mismatch() {
        let a = Matrix::<f64>::zeros(2, 3);
        let b = Matrix::<f64>::zeros(2, 3);
        assert!(multiply(&a, &b).is_err());
        assert!(multiply_transposed(&a, &b).is_ok());
        let c = Matrix::<f64>::zeros(2, 4);
        assert!(matches!(
            multiply_transposed(&a, &c),
            Err(KernelError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_accumulate_adds_into_buffer() {
        let a = Matrix::<f64>::from_vec(1, 2, vec![1.0, 2.0]).unwrap();
        let b = Matrix::<f64>::from_vec(1, 2, vec![3.0, 4.0]).unwrap();
        let mut acc = vec![1.5];
        multiply_transposed_accumulate(&a, &b, &mut acc).unwrap();
        multiply_transposed_accumulate(&a, &b, &mut acc).unwrap();
        assert_eq!(acc, vec![23.5]);
    }

    #[test]
    fn test_inputs_untouched() {
        let a = Matrix::<f32>::from_fn(3, 3, |i, j| (i * 3 + j) as f32);
        let before = a.clone();
        let _ = multiply(&a, &a).unwrap();
        assert_eq!(a, before);
    }
}
