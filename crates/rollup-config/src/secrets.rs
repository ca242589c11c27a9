//! Secret resolution.
//!
//! Config/env stores only env var *names*; this module resolves values once
//! per process and `Debug` never prints them. Never scatter
//! `std::env::var` calls for credentials outside here.

/// Secrets resolved from the environment for one process lifetime.
#[derive(Clone)]
pub struct ResolvedSecrets {
    /// Optional bearer token for an external partition-manager service,
    /// when it is fronted by an authenticated HTTP API rather than
    /// colocated in the same database.
    pub partition_manager_token: Option<String>,
}

impl std::fmt::Debug for ResolvedSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedSecrets")
            .field(
                "partition_manager_token",
                &self.partition_manager_token.as_ref().map(|_| "<REDACTED>"),
            )
            .finish()
    }
}

fn resolve_env(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

/// Resolve all optional secrets from well-known environment variable names.
pub fn resolve_secrets() -> ResolvedSecrets {
    ResolvedSecrets {
        partition_manager_token: resolve_env("ROLLUP_PARTITION_MANAGER_TOKEN"),
    }
}
