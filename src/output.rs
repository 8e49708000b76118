//! Results returned by the end-to-end portal flows.

use crate::models::{ComparisonReport, Metadata};
use crate::session::SessionId;
use serde::Serialize;
use std::path::PathBuf;

/// Timing for one run of a flow.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunStats {
    /// Pages read across all documents.
    pub total_pages: usize,
    pub extract_duration_ms: u64,
    /// Model time, including the repair call if one was made.
    pub llm_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Result of analysing one document.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisOutput {
    pub session_id: SessionId,
    /// Where the uploaded PDF was stored.
    pub document_path: PathBuf,
    pub page_count: usize,
    pub metadata: Metadata,
    pub stats: RunStats,
}

/// Result of comparing a reference document with an actual one.
#[derive(Debug, Clone, Serialize)]
pub struct ComparisonOutput {
    pub session_id: SessionId,
    pub reference_path: PathBuf,
    pub actual_path: PathBuf,
    pub report: ComparisonReport,
    /// Older comparison sessions removed by this run's cleanup sweep.
    pub removed_sessions: Vec<SessionId>,
    pub stats: RunStats,
}
