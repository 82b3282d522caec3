//
// Copyright 2018 yvt, all rights reserved.
//
// This source code is a part of Nightingales.
//
//! Integer utilities used by the allocators.
use num_integer::Integer;
use num_traits::{CheckedAdd, CheckedSub, PrimInt, Zero};

/// Unsigned integers with bit-level manipulation helpers.
pub trait BinaryUInteger: PrimInt + Integer + CheckedAdd + CheckedSub + Zero {
    /// Return whether the value is a power of two (zero is not).
    fn is_power_of_two(&self) -> bool;

    /// Round the value up to the next multiple of `align`.
    ///
    /// `align` must be a power of two. Returns `None` on overflow.
    fn checked_round_up(&self, align: Self) -> Option<Self>;
}

macro_rules! impl_binary_uinteger {
    ($type:ty) => {
        impl BinaryUInteger for $type {
            fn is_power_of_two(&self) -> bool {
                Self::is_power_of_two(*self)
            }

            fn checked_round_up(&self, align: Self) -> Option<Self> {
                debug_assert!(BinaryUInteger::is_power_of_two(&align));
                (*self).checked_add(align - 1).map(|x| x & !(align - 1))
            }
        }
    };
}

impl_binary_uinteger!(u8);
impl_binary_uinteger!(u16);
impl_binary_uinteger!(u32);
impl_binary_uinteger!(u64);
impl_binary_uinteger!(usize);

/// Round `x` up to the next multiple of `align` (a power of two).
///
/// # Panics
///
/// Panics if `align` is not a power of two or the result overflows.
pub fn round_up<T: BinaryUInteger>(x: T, align: T) -> T {
    assert!(
        BinaryUInteger::is_power_of_two(&align),
        "alignment must be a power of two"
    );
    x.checked_round_up(align).expect("integer overflow")
}
