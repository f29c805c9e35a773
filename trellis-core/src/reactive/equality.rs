//! Equality Policies
//!
//! Every cell carries a policy deciding whether a candidate value counts as
//! "the same" as the current one. Writes and recomputations that produce a
//! same value are no-ops: no dependents are notified, nothing is scheduled.
//!
//! The default policy is [`SameValue`], which is strict identity-style
//! comparison rather than `PartialEq`: `NaN` equals `NaN` (rewriting `NaN`
//! is a no-op instead of an endless stream of updates), and `0.0` does not
//! equal `-0.0`. For types where `PartialEq` is what you want, use
//! [`Equality::partial_eq`]; for always-notify semantics use
//! [`Equality::never`].

use std::sync::Arc;

/// Identity-style value comparison.
///
/// Mirrors `PartialEq` for most types but treats floats by bit pattern:
/// `NaN` is the same as `NaN`, and positive and negative zero are distinct.
/// This is the comparison cells use by default, so a cell holding `NaN`
/// does not wake its dependents every time `NaN` is written back.
pub trait SameValue {
    /// Whether `self` and `other` are the same value.
    fn same_value(&self, other: &Self) -> bool;
}

macro_rules! same_value_via_eq {
    ($($ty:ty),* $(,)?) => {
        $(
            impl SameValue for $ty {
                fn same_value(&self, other: &Self) -> bool {
                    self == other
                }
            }
        )*
    };
}

same_value_via_eq!(
    (),
    bool,
    char,
    u8,
    u16,
    u32,
    u64,
    u128,
    usize,
    i8,
    i16,
    i32,
    i64,
    i128,
    isize,
    String,
);

impl SameValue for f32 {
    fn same_value(&self, other: &Self) -> bool {
        self.to_bits() == other.to_bits()
    }
}

impl SameValue for f64 {
    fn same_value(&self, other: &Self) -> bool {
        self.to_bits() == other.to_bits()
    }
}

impl SameValue for str {
    fn same_value(&self, other: &Self) -> bool {
        self == other
    }
}

impl<T: SameValue + ?Sized> SameValue for &T {
    fn same_value(&self, other: &Self) -> bool {
        T::same_value(self, other)
    }
}

/// Shared handles compare by reference identity, not contents. Two `Arc`s
/// to equal but distinct allocations are different values.
impl<T: ?Sized> SameValue for Arc<T> {
    fn same_value(&self, other: &Self) -> bool {
        Arc::ptr_eq(self, other)
    }
}

impl<T: SameValue> SameValue for Option<T> {
    fn same_value(&self, other: &Self) -> bool {
        match (self, other) {
            (Some(a), Some(b)) => a.same_value(b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl<T: SameValue> SameValue for [T] {
    fn same_value(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().zip(other).all(|(a, b)| a.same_value(b))
    }
}

impl<T: SameValue> SameValue for Vec<T> {
    fn same_value(&self, other: &Self) -> bool {
        self.as_slice().same_value(other.as_slice())
    }
}

impl<T: SameValue, const N: usize> SameValue for [T; N] {
    fn same_value(&self, other: &Self) -> bool {
        self.as_slice().same_value(other.as_slice())
    }
}

macro_rules! same_value_for_tuples {
    ($(($($name:ident : $idx:tt),+))+) => {
        $(
            impl<$($name: SameValue),+> SameValue for ($($name,)+) {
                fn same_value(&self, other: &Self) -> bool {
                    $(self.$idx.same_value(&other.$idx))&&+
                }
            }
        )+
    };
}

same_value_for_tuples! {
    (A: 0)
    (A: 0, B: 1)
    (A: 0, B: 1, C: 2)
    (A: 0, B: 1, C: 2, D: 3)
}

/// A cell's comparison policy, stored as a shared closure.
///
/// Cloning an `Equality` shares the underlying comparator. The comparator
/// must be pure; it runs on every write to the owning cell.
pub struct Equality<T> {
    same: Arc<dyn Fn(&T, &T) -> bool + Send + Sync>,
}

impl<T> Clone for Equality<T> {
    fn clone(&self) -> Self {
        Self {
            same: Arc::clone(&self.same),
        }
    }
}

impl<T> std::fmt::Debug for Equality<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Equality").finish_non_exhaustive()
    }
}

impl<T: SameValue + 'static> Default for Equality<T> {
    fn default() -> Self {
        Self::custom(T::same_value)
    }
}

impl<T> Equality<T> {
    /// Compare with an arbitrary predicate.
    pub fn custom(f: impl Fn(&T, &T) -> bool + Send + Sync + 'static) -> Self {
        Self { same: Arc::new(f) }
    }

    /// Treat every write as a change, even writes of the current value.
    pub fn never() -> Self {
        Self::custom(|_, _| false)
    }

    /// Whether `current` and `candidate` count as the same value.
    pub(crate) fn same(&self, current: &T, candidate: &T) -> bool {
        (self.same)(current, candidate)
    }
}

impl<T: PartialEq> Equality<T> {
    /// Compare with the type's `PartialEq`. For floats this makes `NaN`
    /// writes always count as changes.
    pub fn partial_eq() -> Self {
        Self::custom(|a, b| a == b)
    }
}

impl Equality<f32> {
    /// Explicit bit-pattern comparison; identical to the default policy.
    pub fn bitwise() -> Self {
        Self::custom(|a, b| a.to_bits() == b.to_bits())
    }
}

impl Equality<f64> {
    /// Explicit bit-pattern comparison; identical to the default policy.
    pub fn bitwise() -> Self {
        Self::custom(|a, b| a.to_bits() == b.to_bits())
    }
}
