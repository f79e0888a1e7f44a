//! Combinators over [`Result`].
//!
//! `map` and `and_then` come from the standard library and already obey
//! the functor/monad laws; this module adds the few operations the rest of
//! the crate leans on (folding, side-effect taps, recovery) and the
//! collection helpers [`zip`], [`sequence`] and [`traverse`].

/// Extra combinators for [`Result`].
pub trait ResultExt<T, E>: Sized {
    /// Collapses the result by applying exactly one of the two functions.
    fn fold<R>(self, on_failure: impl FnOnce(E) -> R, on_success: impl FnOnce(T) -> R) -> R;

    /// Runs `f` on the success value and returns the result unchanged.
    #[must_use]
    fn tap(self, f: impl FnOnce(&T)) -> Self;

    /// Runs `f` on the failure and returns the result unchanged.
    #[must_use]
    fn tap_failure(self, f: impl FnOnce(&E)) -> Self;

    /// Turns a failure into a success using `f`.
    fn recover(self, f: impl FnOnce(E) -> T) -> T;
}

impl<T, E> ResultExt<T, E> for Result<T, E> {
    fn fold<R>(self, on_failure: impl FnOnce(E) -> R, on_success: impl FnOnce(T) -> R) -> R {
        match self {
            Ok(value) => on_success(value),
            Err(err) => on_failure(err),
        }
    }

    fn tap(self, f: impl FnOnce(&T)) -> Self {
        if let Ok(value) = &self {
            f(value);
        }
        self
    }

    fn tap_failure(self, f: impl FnOnce(&E)) -> Self {
        if let Err(err) = &self {
            f(err);
        }
        self
    }

    fn recover(self, f: impl FnOnce(E) -> T) -> T {
        self.unwrap_or_else(f)
    }
}

/// Pairs two results. When both failed, the first failure wins.
pub fn zip<A, B, E>(a: Result<A, E>, b: Result<B, E>) -> Result<(A, B), E> {
    Ok((a?, b?))
}

/// Collects results into a vector, stopping at the first failure.
///
/// Items after the first failure are not consumed.
pub fn sequence<T, E, I>(results: I) -> Result<Vec<T>, E>
where
    I: IntoIterator<Item = Result<T, E>>,
{
    results.into_iter().collect()
}

/// Applies `f` to every item and collects, stopping at the first failure.
pub fn traverse<A, T, E, I, F>(items: I, f: F) -> Result<Vec<T>, E>
where
    I: IntoIterator<Item = A>,
    F: FnMut(A) -> Result<T, E>,
{
    items.into_iter().map(f).collect()
}
