//! Stabilization polling
//!
//! Re-invokes a cluster-state predicate at a fixed interval until it yields
//! an accepted value or the timeout elapses.
//!
//! A predicate error ends the poll immediately. Only "not there yet" values
//! are retried; the caller decides which API outcomes count as values
//! (see [`wait_for_object`], which folds `NotFound` into `None`).

use std::fmt::Debug;
use std::future::Future;
use std::time::Duration;

use anyhow::Context;
use kube::api::Api;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

/// Ways a poll can end without an accepted value
#[derive(Debug, Error)]
pub enum PollError {
    #[error(
        "timed out after {timeout:?} waiting for {description} ({attempts} attempts, last observed: {})",
        last_observed.as_deref().unwrap_or("nothing")
    )]
    Timeout {
        description: String,
        timeout: Duration,
        attempts: u32,
        last_observed: Option<String>,
    },

    #[error("{description}: {source:#}")]
    Predicate {
        description: String,
        #[source]
        source: anyhow::Error,
    },
}

impl PollError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, PollError::Timeout { .. })
    }
}

/// Fixed-interval poller with a hard deadline
#[derive(Clone, Debug)]
pub struct Poller {
    description: String,
    interval: Duration,
    timeout: Duration,
    attempt_timeout: Option<Duration>,
}

impl Poller {
    pub fn new(description: impl Into<String>, interval: Duration, timeout: Duration) -> Self {
        Self {
            description: description.into(),
            interval,
            timeout,
            attempt_timeout: None,
        }
    }

    /// Bound every single predicate call. Exceeding it is a predicate error.
    pub fn with_attempt_timeout(mut self, limit: Duration) -> Self {
        self.attempt_timeout = Some(limit);
        self
    }

    /// Poll until `accept` returns true for the observed value.
    ///
    /// The first call happens immediately. The predicate is called once more
    /// after the last sleep even if that lands exactly on the deadline.
    pub async fn until<T, F, Fut, A>(&self, mut predicate: F, accept: A) -> Result<T, PollError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
        A: Fn(&T) -> bool,
        T: Debug,
    {
        let start = Instant::now();
        let deadline = start + self.timeout;
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let value = self.attempt(&mut predicate).await?;

            if accept(&value) {
                info!(
                    "{} satisfied after {} attempt(s) in {}ms",
                    self.description,
                    attempts,
                    start.elapsed().as_millis()
                );
                return Ok(value);
            }

            debug!("{}: attempt {} observed {:?}", self.description, attempts, value);

            let now = Instant::now();
            if now >= deadline {
                warn!(
                    "{} not satisfied within {:?} ({} attempts)",
                    self.description, self.timeout, attempts
                );
                return Err(PollError::Timeout {
                    description: self.description.clone(),
                    timeout: self.timeout,
                    attempts,
                    last_observed: Some(format!("{value:?}")),
                });
            }

            sleep(self.interval.min(deadline - now)).await;
        }
    }

    /// Poll until the predicate returns `expected`
    pub async fn until_eq<T, F, Fut>(&self, predicate: F, expected: T) -> Result<T, PollError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
        T: PartialEq + Debug,
    {
        self.until(predicate, |value| *value == expected).await
    }

    /// Poll until the predicate returns `Some`, yielding the inner value
    pub async fn until_some<T, F, Fut>(&self, predicate: F) -> Result<T, PollError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<Option<T>>>,
        T: Debug,
    {
        match self.until(predicate, Option::is_some).await? {
            Some(value) => Ok(value),
            None => Err(PollError::Timeout {
                description: self.description.clone(),
                timeout: self.timeout,
                attempts: 0,
                last_observed: None,
            }),
        }
    }

    async fn attempt<T, F, Fut>(&self, predicate: &mut F) -> Result<T, PollError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let call = predicate();
        let outcome = match self.attempt_timeout {
            Some(limit) => match timeout(limit, call).await {
                Ok(outcome) => outcome,
                Err(_) => Err(anyhow::anyhow!("attempt did not finish within {limit:?}")),
            },
            None => call.await,
        };

        outcome.map_err(|source| PollError::Predicate {
            description: self.description.clone(),
            source,
        })
    }
}

/// Wait for a named object to exist. `NotFound` keeps polling, any other
/// API error ends the wait.
pub async fn wait_for_object<K>(api: &Api<K>, name: &str, poller: &Poller) -> Result<K, PollError>
where
    K: Clone + DeserializeOwned + Debug,
{
    poller
        .until_some(move || async move {
            api.get_opt(name)
                .await
                .with_context(|| format!("Failed to get {name}"))
        })
        .await
}

/// Wait for a named object to be gone
pub async fn wait_for_object_absent<K>(
    api: &Api<K>,
    name: &str,
    poller: &Poller,
) -> Result<(), PollError>
where
    K: Clone + DeserializeOwned + Debug,
{
    poller
        .until_eq(
            move || async move {
                let current = api
                    .get_opt(name)
                    .await
                    .with_context(|| format!("Failed to get {name}"))?;
                Ok(current.is_none())
            },
            true,
        )
        .await?;
    Ok(())
}
