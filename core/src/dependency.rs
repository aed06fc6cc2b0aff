//! The protected operation seam
//!
//! A breaker guards exactly one `Dependency`. The breaker never looks inside
//! the value a dependency produces; it only observes success or failure.

use async_trait::async_trait;
use std::fmt;
use std::future::Future;

/// A remote call guarded by a circuit breaker
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use circuit_gate::Dependency;
///
/// struct Health;
///
/// #[async_trait]
/// impl Dependency for Health {
///     type Output = &'static str;
///     type Error = std::io::Error;
///
///     async fn call(&self) -> Result<Self::Output, Self::Error> {
///         Ok("healthy")
///     }
/// }
/// ```
#[async_trait]
pub trait Dependency: Send + Sync {
    type Output: Send;
    type Error: Send;

    /// Perform the protected action once
    async fn call(&self) -> Result<Self::Output, Self::Error>;
}

/// Dependency backed by a closure returning a future
///
/// Created with [`dependency_fn`].
pub struct DependencyFn<F> {
    f: F,
}

/// Wrap a closure as a `Dependency`
///
/// The closure is invoked once per admitted call.
pub fn dependency_fn<F, Fut, T, E>(f: F) -> DependencyFn<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
{
    DependencyFn { f }
}

#[async_trait]
impl<F, Fut, T, E> Dependency for DependencyFn<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    type Output = T;
    type Error = E;

    async fn call(&self) -> Result<T, E> {
        (self.f)().await
    }
}

impl<F> fmt::Debug for DependencyFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DependencyFn")
            .field("f", &"<closure>")
            .finish()
    }
}
