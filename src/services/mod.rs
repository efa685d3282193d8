/// Progressive closing: admission stop, drain wait and finish.
pub mod closing_service;
/// Outside collaborators: active-work query, notifier and admission gate.
pub mod collaborators;
/// Inbound trigger deduplication.
pub mod dedup_guard;
/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Festival creation, scheduling, phase timers and recovery.
pub mod lifecycle_service;
/// Human-facing festival notices.
pub mod notices;
/// Bulk purge and duplicate reconciliation of tagged records.
pub mod purge_service;
/// Server-Sent Events message generation.
pub mod sse_events;
/// Server-Sent Events broadcasting service.
pub mod sse_service;
/// Storage connection supervisor and degraded-mode switch.
pub mod storage_supervisor;
