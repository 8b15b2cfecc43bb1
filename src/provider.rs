//! Metadata provider boundary.
//!
//! The resolver only knows about [`MetadataProvider`] and [`Candidate`].
//! Concrete HTTP clients live with the binary.

use std::fmt;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use governor::Quota;
use governor::clock::{Clock, DefaultClock};
use governor::state::{InMemoryState, NotKeyed};

/// Default minimum wait before an authenticate request.
pub const DEFAULT_AUTH_INTERVAL: Duration = Duration::from_secs(30);

/// Default minimum wait before a search request.
pub const DEFAULT_QUERY_INTERVAL: Duration = Duration::from_secs(4);

/// One search hit returned by a provider.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Candidate {
    pub title: String,
    pub release_date: Option<String>,
}

/// External title and release date lookup.
pub trait MetadataProvider {
    /// Search for a title.
    ///
    /// An empty list means no match for this query.
    /// Errors are transport failures and are treated the same way by the resolver.
    fn search(&self, query: &str) -> Result<Vec<Candidate>>;
}

impl<P: MetadataProvider + ?Sized> MetadataProvider for &P {
    fn search(&self, query: &str) -> Result<Vec<Candidate>> {
        (**self).search(query)
    }
}

/// Kind of outgoing request, which decides the minimum spacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Authenticate,
    Query,
}

type DirectLimiter = governor::RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Spaces out requests to an external service.
///
/// Each request waits until at least the interval for its kind
/// has passed since the previous request of any kind.
/// Requests are delayed, never dropped.
pub struct RateLimiter {
    auth_interval: Duration,
    query_interval: Duration,
    /// `None` when the interval is zero.
    auth: Option<DirectLimiter>,
    query: Option<DirectLimiter>,
    clock: DefaultClock,
}

impl Candidate {
    pub fn new(title: impl Into<String>, release_date: Option<&str>) -> Self {
        Self {
            title: title.into(),
            release_date: release_date.map(ToString::to_string),
        }
    }
}

impl RequestKind {
    const fn other(self) -> Self {
        match self {
            Self::Authenticate => Self::Query,
            Self::Query => Self::Authenticate,
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_AUTH_INTERVAL, DEFAULT_QUERY_INTERVAL)
    }
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("auth_interval", &self.auth_interval)
            .field("query_interval", &self.query_interval)
            .finish_non_exhaustive()
    }
}

impl RateLimiter {
    /// One permit per interval with no burst.
    #[must_use]
    pub fn new(auth_interval: Duration, query_interval: Duration) -> Self {
        Self {
            auth_interval,
            query_interval,
            auth: Quota::with_period(auth_interval).map(governor::RateLimiter::direct),
            query: Quota::with_period(query_interval).map(governor::RateLimiter::direct),
            clock: DefaultClock::default(),
        }
    }

    /// Limiter that never waits.
    #[must_use]
    pub fn unlimited() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    #[must_use]
    pub const fn interval(&self, kind: RequestKind) -> Duration {
        match kind {
            RequestKind::Authenticate => self.auth_interval,
            RequestKind::Query => self.query_interval,
        }
    }

    const fn limiter(&self, kind: RequestKind) -> Option<&DirectLimiter> {
        match kind {
            RequestKind::Authenticate => self.auth.as_ref(),
            RequestKind::Query => self.query.as_ref(),
        }
    }

    /// Block the calling thread until a request of the given kind is allowed,
    /// then record it as sent. Returns how long the call slept.
    pub fn wait(&self, kind: RequestKind) -> Duration {
        let mut slept = Duration::ZERO;
        if let Some(limiter) = self.limiter(kind) {
            while let Err(not_until) = limiter.check() {
                let delay = not_until.wait_time_from(self.clock.now());
                thread::sleep(delay);
                slept += delay;
            }
        }
        // The request also starts the other kind's interval.
        // A failed check means that interval is already running.
        if let Some(other) = self.limiter(kind.other()) {
            let _ = other.check();
        }
        slept
    }
}
