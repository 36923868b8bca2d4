//! Registry diagnostics
//!
//! Builds a point-in-time report of every known identity and whether a live
//! connection currently backs it. Collecting a report never mutates registry
//! state; the periodic task that logs it lives in the server binary.

use core::fmt;

use crate::registry::ClientRegistry;
use crate::types::ClientIdentity;

// ----------------------------------------------------------------------------
// Identity State
// ----------------------------------------------------------------------------

/// Liveness of one known identity at report time
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityState {
    /// A connection is bound and its writer is still open
    Active { remote: String },
    /// A connection is bound but its writer has gone away
    Closed { remote: String },
    /// The device index knows this identity but no connection is bound
    Unbound,
}

impl IdentityState {
    pub fn is_active(&self) -> bool {
        matches!(self, IdentityState::Active { .. })
    }
}

// ----------------------------------------------------------------------------
// Registry Report
// ----------------------------------------------------------------------------

/// Point-in-time diagnostics over the registry
#[derive(Debug, Clone)]
pub struct RegistryReport {
    entries: Vec<(ClientIdentity, IdentityState)>,
}

impl RegistryReport {
    /// Collect a report from the registry's snapshots
    pub fn collect(registry: &ClientRegistry) -> Self {
        let forward = registry.snapshot();
        let mut identities: Vec<ClientIdentity> =
            registry.all_known_identities().into_iter().collect();
        identities.sort_by_key(|id| id.to_string());

        let entries = identities
            .into_iter()
            .map(|identity| {
                let state = match forward.get(&identity) {
                    Some(conn) if conn.is_open() => IdentityState::Active {
                        remote: conn.remote().to_string(),
                    },
                    Some(conn) => IdentityState::Closed {
                        remote: conn.remote().to_string(),
                    },
                    None => IdentityState::Unbound,
                };
                (identity, state)
            })
            .collect();

        Self { entries }
    }

    pub fn entries(&self) -> &[(ClientIdentity, IdentityState)] {
        &self.entries
    }

    pub fn total(&self) -> usize {
        self.entries.len()
    }

    pub fn active(&self) -> usize {
        self.entries.iter().filter(|(_, s)| s.is_active()).count()
    }

    pub fn inactive(&self) -> usize {
        self.total() - self.active()
    }
}

impl fmt::Display for RegistryReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.entries.is_empty() {
            return write!(f, "registry status: no clients known");
        }

        writeln!(f, "registry status:")?;
        for (identity, state) in &self.entries {
            match state {
                IdentityState::Active { remote } => {
                    writeln!(f, " - {identity} -> ACTIVE [remote={remote}]")?
                }
                IdentityState::Closed { remote } => {
                    writeln!(f, " - {identity} -> CLOSED [remote={remote}]")?
                }
                IdentityState::Unbound => {
                    writeln!(f, " - {identity} -> INACTIVE [no connection bound]")?
                }
            }
        }
        write!(
            f,
            "totals: active={}, inactive={}",
            self.active(),
            self.inactive()
        )
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ConnectionHandle;
    use tokio::sync::mpsc;

    #[test]
    fn empty_registry_reports_no_clients() {
        let registry = ClientRegistry::new();
        let report = RegistryReport::collect(&registry);
        assert_eq!(report.total(), 0);
        assert_eq!(report.to_string(), "registry status: no clients known");
    }

    #[test]
    fn report_counts_active_and_closed_connections() {
        let registry = ClientRegistry::new();

        let (tx_open, _rx_open) = mpsc::unbounded_channel();
        let open = ConnectionHandle::new("10.0.0.1:1", tx_open);
        registry.bind("alice:phone".parse().unwrap(), open);

        let (tx_closed, rx_closed) = mpsc::unbounded_channel();
        let closed = ConnectionHandle::new("10.0.0.2:2", tx_closed);
        registry.bind("bob:laptop".parse().unwrap(), closed);
        drop(rx_closed);

        let report = RegistryReport::collect(&registry);
        assert_eq!(report.total(), 2);
        assert_eq!(report.active(), 1);
        assert_eq!(report.inactive(), 1);

        let rendered = report.to_string();
        assert!(rendered.contains("alice:phone -> ACTIVE"));
        assert!(rendered.contains("bob:laptop -> CLOSED"));

        // Collecting a report must not change registry state.
        assert_eq!(registry.len(), 2);
    }
}
