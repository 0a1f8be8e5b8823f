//! Element types, the reduction operator abstraction, and the element-wise
//! combine used by every exchange step.
//!
//! # Operator contract
//!
//! A [`ReductionOperator`] must be associative and commutative, and its
//! identity must satisfy `combine(identity, a) == a`. None of this can be
//! checked at runtime for an arbitrary operator; violating it is a caller
//! error. The result is then deterministic for a given group size and
//! strategy, but it is not the mathematically reduced value.
//!
//! # Floating point
//!
//! Floating-point addition and multiplication are commutative but not
//! associative. Every rank of one collective computes the bit-identical
//! result (the engine fixes the operand order of each combine), yet the
//! result may differ in the last bits from a sequential left-to-right
//! reduction or from the same reduction run under the other strategy.
//! This is an accepted approximation.

use crate::error::{ReduceError, Result};
use crate::types::{DataType, ReduceOp};

/// A fixed-width value that can be carried in an exchange frame.
pub trait Element: Copy + Send + Sync + std::fmt::Debug + 'static {
    const DTYPE: DataType;

    /// Write `self` little-endian into exactly `DTYPE.size_in_bytes()` bytes.
    fn write_le(self, out: &mut [u8]);

    /// Read a value from exactly `DTYPE.size_in_bytes()` little-endian bytes.
    fn read_le(bytes: &[u8]) -> Self;
}

macro_rules! impl_element {
    ($($ty:ty => $dtype:expr),* $(,)?) => {
        $(
            impl Element for $ty {
                const DTYPE: DataType = $dtype;

                #[inline]
                fn write_le(self, out: &mut [u8]) {
                    out.copy_from_slice(&self.to_le_bytes());
                }

                #[inline]
                fn read_le(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(bytes);
                    <$ty>::from_le_bytes(raw)
                }
            }
        )*
    };
}

impl_element!(
    i8 => DataType::I8,
    i32 => DataType::I32,
    i64 => DataType::I64,
    u8 => DataType::U8,
    u32 => DataType::U32,
    u64 => DataType::U64,
    f32 => DataType::F32,
    f64 => DataType::F64,
);

impl Element for bool {
    const DTYPE: DataType = DataType::Bool;

    #[inline]
    fn write_le(self, out: &mut [u8]) {
        out[0] = self as u8;
    }

    #[inline]
    fn read_le(bytes: &[u8]) -> Self {
        bytes[0] != 0
    }
}

/// Encode a slice of elements as contiguous little-endian bytes.
pub(crate) fn encode_elements<T: Element>(values: &[T]) -> Vec<u8> {
    let width = T::DTYPE.size_in_bytes();
    let mut out = vec![0u8; values.len() * width];
    for (v, chunk) in values.iter().zip(out.chunks_exact_mut(width)) {
        v.write_le(chunk);
    }
    out
}

/// Decode exactly `count` elements from `bytes`.
pub(crate) fn decode_elements<T: Element>(bytes: &[u8], count: usize) -> Result<Vec<T>> {
    let width = T::DTYPE.size_in_bytes();
    if bytes.len() != count * width {
        return Err(ReduceError::DecodeFailed(format!(
            "expected {} bytes for {count} x {}, got {}",
            count * width,
            T::DTYPE,
            bytes.len()
        )));
    }
    Ok(bytes.chunks_exact(width).map(T::read_le).collect())
}

/// Built-in [`ReduceOp`] semantics for an element type.
pub trait Reducible: Element {
    /// Whether `op` has a meaning (and a lawful identity) for this type.
    fn supports(op: ReduceOp) -> bool;

    /// Combine two values. Unsupported ops return `a` unchanged; the engine
    /// rejects them before any communication.
    fn reduce(a: Self, b: Self, op: ReduceOp) -> Self;

    /// Neutral element of `op`.
    fn identity(op: ReduceOp) -> Self;
}

macro_rules! impl_reducible {
    (int: $($ty:ty),*) => {
        $(
            impl Reducible for $ty {
                fn supports(op: ReduceOp) -> bool {
                    !matches!(op, ReduceOp::LogicalAnd | ReduceOp::LogicalOr)
                }

                #[inline]
                fn reduce(a: Self, b: Self, op: ReduceOp) -> Self {
                    match op {
                        ReduceOp::Sum => a.wrapping_add(b),
                        ReduceOp::Prod => a.wrapping_mul(b),
                        ReduceOp::Min => a.min(b),
                        ReduceOp::Max => a.max(b),
                        ReduceOp::BitAnd => a & b,
                        ReduceOp::BitOr => a | b,
                        ReduceOp::BitXor => a ^ b,
                        ReduceOp::LogicalAnd | ReduceOp::LogicalOr => a,
                    }
                }

                fn identity(op: ReduceOp) -> Self {
                    match op {
                        ReduceOp::Sum | ReduceOp::BitOr | ReduceOp::BitXor => 0,
                        ReduceOp::Prod => 1,
                        ReduceOp::Min => <$ty>::MAX,
                        ReduceOp::Max => <$ty>::MIN,
                        ReduceOp::BitAnd => !0,
                        ReduceOp::LogicalAnd | ReduceOp::LogicalOr => 0,
                    }
                }
            }
        )*
    };
    (float: $($ty:ty),*) => {
        $(
            impl Reducible for $ty {
                fn supports(op: ReduceOp) -> bool {
                    matches!(op, ReduceOp::Sum | ReduceOp::Prod | ReduceOp::Min | ReduceOp::Max)
                }

                #[inline]
                fn reduce(a: Self, b: Self, op: ReduceOp) -> Self {
                    match op {
                        ReduceOp::Sum => a + b,
                        ReduceOp::Prod => a * b,
                        ReduceOp::Min => a.min(b),
                        ReduceOp::Max => a.max(b),
                        _ => a,
                    }
                }

                fn identity(op: ReduceOp) -> Self {
                    match op {
                        ReduceOp::Prod => 1.0,
                        ReduceOp::Min => <$ty>::INFINITY,
                        ReduceOp::Max => <$ty>::NEG_INFINITY,
                        _ => 0.0,
                    }
                }
            }
        )*
    };
}

impl_reducible!(int: i8, i32, i64, u8, u32, u64);
impl_reducible!(float: f32, f64);

impl Reducible for bool {
    fn supports(op: ReduceOp) -> bool {
        !matches!(op, ReduceOp::Sum | ReduceOp::Prod)
    }

    #[inline]
    fn reduce(a: Self, b: Self, op: ReduceOp) -> Self {
        match op {
            ReduceOp::Min | ReduceOp::BitAnd | ReduceOp::LogicalAnd => a && b,
            ReduceOp::Max | ReduceOp::BitOr | ReduceOp::LogicalOr => a || b,
            ReduceOp::BitXor => a ^ b,
            ReduceOp::Sum | ReduceOp::Prod => a,
        }
    }

    fn identity(op: ReduceOp) -> Self {
        matches!(op, ReduceOp::Min | ReduceOp::BitAnd | ReduceOp::LogicalAnd)
    }
}

/// An associative, commutative combining function with a neutral element.
///
/// Stateless from the engine's point of view and shared by reference across
/// the whole collective.
pub trait ReductionOperator<T>: Send + Sync {
    fn combine(&self, a: T, b: T) -> T;

    fn identity(&self) -> T;

    fn name(&self) -> &str {
        "custom"
    }

    /// Reject operator/type pairs that have no meaning. Runs before any
    /// communication.
    fn check_supported(&self) -> Result<()> {
        Ok(())
    }
}

impl<T: Reducible> ReductionOperator<T> for ReduceOp {
    #[inline]
    fn combine(&self, a: T, b: T) -> T {
        T::reduce(a, b, *self)
    }

    fn identity(&self) -> T {
        T::identity(*self)
    }

    fn name(&self) -> &str {
        ReduceOp::name(*self)
    }

    fn check_supported(&self) -> Result<()> {
        if T::supports(*self) {
            Ok(())
        } else {
            Err(ReduceError::UnsupportedOperation {
                op: *self,
                dtype: T::DTYPE,
            })
        }
    }
}

/// Caller-defined operator built from a closure and its identity.
///
/// ```
/// use groupreduce::CustomOp;
/// use groupreduce::reduce::ReductionOperator;
///
/// let gcd = CustomOp::new("gcd", 0u64, |mut a: u64, mut b: u64| {
///     while b != 0 {
///         (a, b) = (b, a % b);
///     }
///     a
/// });
/// assert_eq!(gcd.combine(12, 18), 6);
/// assert_eq!(gcd.combine(gcd.identity(), 7), 7);
/// ```
pub struct CustomOp<T, F> {
    name: &'static str,
    identity: T,
    combine: F,
}

impl<T, F> CustomOp<T, F>
where
    T: Copy,
    F: Fn(T, T) -> T,
{
    pub fn new(name: &'static str, identity: T, combine: F) -> Self {
        Self {
            name,
            identity,
            combine,
        }
    }
}

impl<T, F> ReductionOperator<T> for CustomOp<T, F>
where
    T: Copy + Send + Sync,
    F: Fn(T, T) -> T + Send + Sync,
{
    #[inline]
    fn combine(&self, a: T, b: T) -> T {
        (self.combine)(a, b)
    }

    fn identity(&self) -> T {
        self.identity
    }

    fn name(&self) -> &str {
        self.name
    }
}

/// Element-wise `acc[i] = combine(left[i], right[i])` where `acc` is one
/// side. `acc_is_left` fixes the operand order so both partners of an
/// exchange compute bit-identical values.
pub(crate) fn combine_into<T, O>(acc: &mut [T], other: &[T], op: &O, acc_is_left: bool)
where
    T: Copy,
    O: ReductionOperator<T> + ?Sized,
{
    debug_assert_eq!(acc.len(), other.len());
    for (a, &b) in acc.iter_mut().zip(other) {
        *a = if acc_is_left {
            op.combine(*a, b)
        } else {
            op.combine(b, *a)
        };
    }
}
