//! Typed atomic load/store/cmpxchg/fetch-op helpers with explicit orderings.
//!
//! Every call site in this crate names its ordering explicitly, the way the
//! teacher's ring buffer core never calls `.load()`/`.store()` bare. This
//! module exists so the containers read like the spec's vocabulary
//! (`acquire_load`, `release_store`, `relaxed_read`, `cas`) instead of
//! scattering raw `Ordering::Acquire` literals through every algorithm.

pub use std::sync::atomic::Ordering;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize};

/// A fixed-width atomic word this module knows how to operate on.
pub trait AtomicWord: Sized {
    type Value: Copy;

    fn load(&self, order: Ordering) -> Self::Value;
    fn store(&self, value: Self::Value, order: Ordering);
    fn compare_exchange(
        &self,
        current: Self::Value,
        new: Self::Value,
        success: Ordering,
        failure: Ordering,
    ) -> Result<Self::Value, Self::Value>;
    fn fetch_add(&self, value: Self::Value, order: Ordering) -> Self::Value;
    fn fetch_sub(&self, value: Self::Value, order: Ordering) -> Self::Value;
    fn fetch_and(&self, value: Self::Value, order: Ordering) -> Self::Value;
    fn fetch_or(&self, value: Self::Value, order: Ordering) -> Self::Value;
}

macro_rules! impl_atomic_word {
    ($atomic:ty, $value:ty) => {
        impl AtomicWord for $atomic {
            type Value = $value;

            #[inline(always)]
            fn load(&self, order: Ordering) -> Self::Value {
                <$atomic>::load(self, order)
            }

            #[inline(always)]
            fn store(&self, value: Self::Value, order: Ordering) {
                <$atomic>::store(self, value, order)
            }

            #[inline(always)]
            fn compare_exchange(
                &self,
                current: Self::Value,
                new: Self::Value,
                success: Ordering,
                failure: Ordering,
            ) -> Result<Self::Value, Self::Value> {
                <$atomic>::compare_exchange(self, current, new, success, failure)
            }

            #[inline(always)]
            fn fetch_add(&self, value: Self::Value, order: Ordering) -> Self::Value {
                <$atomic>::fetch_add(self, value, order)
            }

            #[inline(always)]
            fn fetch_sub(&self, value: Self::Value, order: Ordering) -> Self::Value {
                <$atomic>::fetch_sub(self, value, order)
            }

            #[inline(always)]
            fn fetch_and(&self, value: Self::Value, order: Ordering) -> Self::Value {
                <$atomic>::fetch_and(self, value, order)
            }

            #[inline(always)]
            fn fetch_or(&self, value: Self::Value, order: Ordering) -> Self::Value {
                <$atomic>::fetch_or(self, value, order)
            }
        }
    };
}

impl_atomic_word!(AtomicU32, u32);
impl_atomic_word!(AtomicU64, u64);
impl_atomic_word!(AtomicUsize, usize);

/// `load(Acquire)`. Use for any load whose value will be dereferenced, or
/// that gates reading a peer's payload.
#[inline(always)]
pub fn acquire_load<A: AtomicWord>(a: &A) -> A::Value {
    a.load(Ordering::Acquire)
}

/// `store(Release)`. Pairs with `acquire_load` to publish a structural
/// change or a payload write.
#[inline(always)]
pub fn release_store<A: AtomicWord>(a: &A, value: A::Value) {
    a.store(value, Ordering::Release)
}

/// `load(Relaxed)`. Use only for values not used to gate a dereference,
/// e.g. approximate counters.
#[inline(always)]
pub fn relaxed_read<A: AtomicWord>(a: &A) -> A::Value {
    a.load(Ordering::Relaxed)
}

/// `store(Relaxed)`.
#[inline(always)]
pub fn relaxed_write<A: AtomicWord>(a: &A, value: A::Value) {
    a.store(value, Ordering::Relaxed)
}

/// Compare-and-exchange returning `(prior_value, swapped)`, matching the
/// spec's primitive shape rather than `Result`'s Ok/Err framing.
#[inline(always)]
pub fn cas<A: AtomicWord>(
    a: &A,
    expected: A::Value,
    desired: A::Value,
    success: Ordering,
    failure: Ordering,
) -> (A::Value, bool) {
    match a.compare_exchange(expected, desired, success, failure) {
        Ok(prior) => (prior, true),
        Err(prior) => (prior, false),
    }
}

#[inline(always)]
pub fn fetch_add<A: AtomicWord>(a: &A, value: A::Value, order: Ordering) -> A::Value {
    a.fetch_add(value, order)
}

#[inline(always)]
pub fn fetch_sub<A: AtomicWord>(a: &A, value: A::Value, order: Ordering) -> A::Value {
    a.fetch_sub(value, order)
}

#[inline(always)]
pub fn fetch_and<A: AtomicWord>(a: &A, value: A::Value, order: Ordering) -> A::Value {
    a.fetch_and(value, order)
}

#[inline(always)]
pub fn fetch_or<A: AtomicWord>(a: &A, value: A::Value, order: Ordering) -> A::Value {
    a.fetch_or(value, order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;

    #[test]
    fn acquire_release_round_trip() {
        let a = AtomicU64::new(0);
        release_store(&a, 42);
        assert_eq!(acquire_load(&a), 42);
    }

    #[test]
    fn cas_reports_prior_and_swapped() {
        let a = AtomicU64::new(1);
        let (prior, swapped) = cas(&a, 1, 2, Ordering::AcqRel, Ordering::Acquire);
        assert_eq!(prior, 1);
        assert!(swapped);

        let (prior, swapped) = cas(&a, 1, 3, Ordering::AcqRel, Ordering::Acquire);
        assert_eq!(prior, 2);
        assert!(!swapped);
    }

    #[test]
    fn relaxed_counter_fetch_add() {
        let a = AtomicU64::new(0);
        fetch_add(&a, 1, Ordering::Relaxed);
        fetch_add(&a, 1, Ordering::Relaxed);
        assert_eq!(relaxed_read(&a), 2);
    }
}
