//! Origin allow-list for WebSocket upgrades.
//!
//! Browsers send an `Origin` header with every upgrade request. Only pages
//! served from one of the configured hostnames may open a connection.

use std::collections::HashSet;

/// Set of exact `Origin` header values accepted for an upgrade.
#[derive(Debug, Clone, Default)]
pub struct OriginPolicy {
    /// Accepted origins, e.g. `http://localhost` and `https://localhost`.
    allowed: HashSet<String>,
}

impl OriginPolicy {
    /// Builds a policy accepting `http://<host>` and `https://<host>` for
    /// every hostname in `hosts`.
    #[must_use]
    pub fn from_hosts<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let allowed = hosts
            .into_iter()
            .flat_map(|host| {
                let host = host.as_ref();
                [format!("http://{host}"), format!("https://{host}")]
            })
            .collect();
        Self { allowed }
    }

    /// Returns `true` if the upgrade request's origin is allowed. A missing
    /// header is refused.
    #[must_use]
    pub fn allows(&self, origin: Option<&str>) -> bool {
        origin.is_some_and(|origin| self.allowed.contains(origin))
    }

    /// Returns `true` if no origin can ever be accepted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.allowed.is_empty()
    }
}
