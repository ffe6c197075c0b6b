//! Structured observability hooks for dataset operations.
//!
//! This module provides:
//! - Dataset-scoped tracing spans via the `DatasetSpan` RAII guard
//! - Emission functions for scan, graph, history, restore and cache events
//!
//! Events are emitted at `info!` level unless they report a problem.

use tracing::{info, warn};

use crate::domain::{RestoreFailure, RestoreStatus};

/// RAII guard that enters a dataset-scoped span for one operation.
///
/// # Example
///
/// ```ignore
/// let _span = DatasetSpan::enter("/data/study-1", "graph");
/// // every event below carries dataset and operation fields
/// ```
pub struct DatasetSpan {
    _span: tracing::span::EnteredSpan,
}

impl DatasetSpan {
    pub fn enter(dataset: &str, operation: &str) -> Self {
        let span = tracing::info_span!("lineage.dataset", dataset = %dataset, operation = %operation);
        Self {
            _span: span.entered(),
        }
    }
}

pub fn emit_scan_finished(dataset: &str, nodes: usize, unreadable: usize, injected_deleted: usize) {
    info!(
        event = "scan.finished",
        dataset = %dataset,
        nodes = nodes,
        unreadable = unreadable,
        injected_deleted = injected_deleted,
    );
}

pub fn emit_graph_built(dataset: &str, nodes: usize, edges: usize, stages: usize) {
    info!(
        event = "graph.built",
        dataset = %dataset,
        nodes = nodes,
        edges = edges,
        stages = stages,
    );
}

pub fn emit_history_loaded(dataset: &str, commits: usize, limit: usize) {
    info!(event = "history.loaded", dataset = %dataset, commits = commits, limit = limit);
}

pub fn emit_restore_transition(request_id: &str, path: &str, status: RestoreStatus) {
    info!(
        event = "restore.transition",
        request_id = %request_id,
        path = %path,
        status = %status,
    );
}

pub fn emit_restore_failed(request_id: &str, path: &str, failure: &RestoreFailure) {
    warn!(
        event = "restore.failed",
        request_id = %request_id,
        path = %path,
        reached = %failure.reached,
        operation = %failure.operation,
        exit_code = ?failure.exit_code,
        message = %failure.message,
    );
}

pub fn emit_command_timed_out(operation: &str, command: &str, timeout_ms: u64) {
    warn!(
        event = "command.timed_out",
        operation = %operation,
        command = %command,
        timeout_ms = timeout_ms,
    );
}

pub fn emit_cache_hit(dataset: &str) {
    info!(event = "cache.hit", dataset = %dataset);
}

pub fn emit_cache_miss(dataset: &str, replaced: bool) {
    info!(event = "cache.miss", dataset = %dataset, replaced = replaced);
}
