//! History records: read-only views of past runs.
//!
//! These are immutable once fetched. A new fetch replaces, never merges.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ids::WorkflowId;
use super::state::{StepStatus, WorkflowStatus};
use super::step::StepName;

/// Default page size for listings.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Parameters of one listing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryQuery {
    limit: u32,
    pub cursor: Option<String>,
    pub ticker: Option<String>,
}

impl HistoryQuery {
    /// First page. A zero limit is raised to one.
    pub fn first_page(limit: u32) -> Self {
        Self {
            limit: limit.max(1),
            cursor: None,
            ticker: None,
        }
    }

    /// Blank filters are treated as no filter.
    pub fn with_ticker(mut self, ticker: Option<String>) -> Self {
        self.ticker = ticker
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        self
    }

    pub fn with_cursor(mut self, cursor: Option<String>) -> Self {
        self.cursor = cursor;
        self
    }

    /// Same query, next page.
    pub fn next_page(&self, cursor: String) -> Self {
        Self {
            cursor: Some(cursor),
            ..self.clone()
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }
}

impl Default for HistoryQuery {
    fn default() -> Self {
        Self::first_page(DEFAULT_PAGE_SIZE)
    }
}

/// One row of a listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub workflow_id: WorkflowId,
    pub ticker: String,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    pub status: WorkflowStatus,
}

/// One page of a listing.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RunPage {
    pub runs: Vec<RunSummary>,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

/// LLM accounting attached to a step result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmUsage {
    pub model: String,
    #[serde(default)]
    pub prompt_tokens: Option<u64>,
    #[serde(default)]
    pub completion_tokens: Option<u64>,
    #[serde(default)]
    pub total_tokens: Option<u64>,
    #[serde(default)]
    pub latency_ms: Option<u64>,
}

/// Stored result of one step.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StepResult {
    #[serde(default)]
    pub step_name: Option<StepName>,
    #[serde(default)]
    pub status: Option<StepStatus>,
    #[serde(default)]
    pub output: Option<Value>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub llm_usage: Vec<LlmUsage>,
}

/// Full detail of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub workflow_id: WorkflowId,
    pub ticker: String,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    pub status: WorkflowStatus,
    /// Keyed by step name as sent by the server.
    #[serde(default)]
    pub results: BTreeMap<String, StepResult>,
}

impl RunRecord {
    /// Results in canonical step order; keys that are not known steps are skipped.
    pub fn ordered_results(&self) -> Vec<(StepName, &StepResult)> {
        StepName::ALL
            .into_iter()
            .filter_map(|step| self.results.get(step.as_str()).map(|r| (step, r)))
            .collect()
    }
}

/// One entry of a run's event timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunEvent {
    #[serde(default)]
    pub workflow_id: Option<WorkflowId>,
    pub timestamp: DateTime<Utc>,
    pub event: String,
    #[serde(default)]
    pub step: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub payload: Option<Value>,
}

/// Order a timeline for display: newest first, ties keep store order.
pub fn sort_newest_first(events: &mut [RunEvent]) {
    events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
}

/// Record and timeline of one run, fetched together.
#[derive(Debug, Clone, PartialEq)]
pub struct RunDetail {
    pub record: RunRecord,
    /// As returned by the store; order is not guaranteed.
    pub events: Vec<RunEvent>,
}

impl RunDetail {
    pub fn events_newest_first(&self) -> Vec<RunEvent> {
        let mut events = self.events.clone();
        sort_newest_first(&mut events);
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn event_at(second: u32, name: &str) -> RunEvent {
        RunEvent {
            workflow_id: None,
            timestamp: Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, second).unwrap(),
            event: name.to_string(),
            step: None,
            status: None,
            payload: None,
        }
    }

    #[test]
    fn query_limit_is_at_least_one_and_blank_ticker_is_dropped() {
        let query = HistoryQuery::first_page(0).with_ticker(Some("  ".to_string()));
        assert_eq!(query.limit(), 1);
        assert_eq!(query.ticker, None);

        let query = HistoryQuery::default().with_ticker(Some(" NVDA ".to_string()));
        assert_eq!(query.limit(), DEFAULT_PAGE_SIZE);
        assert_eq!(query.ticker.as_deref(), Some("NVDA"));

        let next = query.next_page("c1".to_string());
        assert_eq!(next.cursor.as_deref(), Some("c1"));
        assert_eq!(next.ticker.as_deref(), Some("NVDA"));
    }

    #[test]
    fn run_page_decodes_without_cursor() {
        let page: RunPage = serde_json::from_value(json!({
            "runs": [{
                "workflow_id": "wf-1",
                "ticker": "AAPL",
                "completed_at": "2025-03-01T12:00:00.123456+00:00",
                "status": "completed"
            }]
        }))
        .unwrap();

        assert_eq!(page.runs.len(), 1);
        assert_eq!(page.runs[0].workflow_id.as_str(), "wf-1");
        assert_eq!(page.next_cursor, None);
    }

    #[test]
    fn run_record_orders_results_canonically() {
        let record: RunRecord = serde_json::from_value(json!({
            "workflow_id": "wf-1",
            "ticker": "AAPL",
            "started_at": "2025-03-01T12:00:00+00:00",
            "status": "partial",
            "results": {
                "investment": {"status": "skipped"},
                "retrieval": {"status": "completed", "duration_ms": 4200, "output": {"answer": "x"}},
                "bogus": {}
            }
        }))
        .unwrap();

        let ordered = record.ordered_results();
        let steps: Vec<StepName> = ordered.iter().map(|(s, _)| *s).collect();
        assert_eq!(steps, vec![StepName::Retrieval, StepName::Investment]);
        assert_eq!(ordered[0].1.duration_ms, Some(4200));
        assert_eq!(ordered[1].1.status, Some(StepStatus::Skipped));
    }

    #[test]
    fn timeline_sorts_newest_first() {
        let detail = RunDetail {
            record: RunRecord {
                workflow_id: WorkflowId::new("wf-1"),
                ticker: "AAPL".to_string(),
                started_at: Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap(),
                completed_at: None,
                status: WorkflowStatus::Running,
                results: BTreeMap::new(),
            },
            events: vec![
                event_at(1, "step_start"),
                event_at(9, "workflow_complete"),
                event_at(5, "step_complete"),
            ],
        };

        let names: Vec<String> = detail
            .events_newest_first()
            .into_iter()
            .map(|e| e.event)
            .collect();
        assert_eq!(names, vec!["workflow_complete", "step_complete", "step_start"]);
        // 元の順序は変えない
        assert_eq!(detail.events[0].event, "step_start");
    }
}
