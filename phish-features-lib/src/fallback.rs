//! Ordered fallback chains.
//!
//! A [`FallbackChain`] tries alternates one after another and stops at the
//! first success. It backs both the DNS `www.` fallback and the HTTP
//! scheme/host probing.

use crate::error::PipelineError;
use std::fmt::Display;
use std::future::Future;
use tracing::debug;

/// Explicit ordered list of alternate query targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackChain<A> {
    alternates: Vec<A>,
}

impl<A> FallbackChain<A>
where
    A: Clone + Display,
{
    pub fn new(alternates: Vec<A>) -> Self {
        Self { alternates }
    }

    /// Primary target followed by an optional alternate.
    pub fn with_alternate(primary: A, alternate: Option<A>) -> Self {
        let mut alternates = vec![primary];
        alternates.extend(alternate);
        Self { alternates }
    }

    pub fn alternates(&self) -> &[A] {
        &self.alternates
    }

    /// Try each alternate in order and return the first that succeeds,
    /// together with its result. `None` when every alternate failed.
    pub async fn first_success<R, F, Fut>(&self, mut attempt: F) -> Option<(A, R)>
    where
        F: FnMut(A) -> Fut,
        Fut: Future<Output = Result<R, PipelineError>>,
    {
        for alternate in &self.alternates {
            match attempt(alternate.clone()).await {
                Ok(result) => return Some((alternate.clone(), result)),
                Err(err) => debug!("alternate '{}' failed: {}", alternate, err),
            }
        }
        None
    }
}
