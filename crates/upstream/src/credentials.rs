//! Round-robin credential rotation.
//!
//! Spreads outbound calls across several API tokens so the pipeline can
//! exceed a single token's rate limit.

use pulse_core::{Error, Result};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A bearer token. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Hands out credentials from a fixed pool in round-robin order.
pub struct CredentialRotator {
    credentials: Vec<Credential>,
    next: AtomicUsize,
}

impl CredentialRotator {
    /// Creates a rotator. An empty pool is a fatal configuration error.
    pub fn new<I, S>(tokens: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let credentials: Vec<Credential> = tokens
            .into_iter()
            .map(Into::into)
            .filter(|t: &String| !t.trim().is_empty())
            .map(Credential::new)
            .collect();

        if credentials.is_empty() {
            return Err(Error::config("at least one upstream credential is required"));
        }

        Ok(Self {
            credentials,
            next: AtomicUsize::new(0),
        })
    }

    /// Returns the next credential. Starts at the first one and wraps.
    pub fn next(&self) -> &Credential {
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.credentials.len();
        &self.credentials[index]
    }

    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }
}

impl fmt::Debug for CredentialRotator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialRotator")
            .field("credentials", &self.credentials.len())
            .finish()
    }
}
