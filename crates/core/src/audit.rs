//! Audit log vocabulary.
//!
//! This module lives in `core` (zero internal deps) so it can be used by
//! both the API layer and any future worker or CLI tooling. The audit
//! trail is append-only; entries are never updated or deleted.

/// Known action types for audit log entries.
pub mod actions {
    pub const CREATE: &str = "create";
    pub const UPDATE: &str = "update";
    pub const DELETE: &str = "delete";
    pub const RUN_FINALIZED: &str = "run_finalized";
    pub const RUN_CANCELLED: &str = "run_cancelled";
    pub const RESULT_RECORDED: &str = "result_recorded";
    pub const AGENT_LEASE_EXPIRED: &str = "agent_lease_expired";
    pub const AGENT_RUN_FAILED: &str = "agent_run_failed";
    pub const LICENSE_IMPORTED: &str = "license_imported";
    pub const REPORT_EMIT_FAILED: &str = "report_emit_failed";
}

/// Known entity types referenced by audit entries.
pub mod entities {
    pub const CLUSTER: &str = "cluster";
    pub const INSPECTION_ITEM: &str = "inspection_item";
    pub const INSPECTION_RUN: &str = "inspection_run";
    pub const INSPECTION_RESULT: &str = "inspection_result";
    pub const INSPECTION_AGENT: &str = "inspection_agent";
    pub const LICENSE: &str = "license";
}

/// Actor recorded when no operator identity is available.
pub const ACTOR_SYSTEM: &str = "system";
