//! Workflow request: the body sent to the stream endpoint.

use serde::{Deserialize, Serialize};

use super::ids::WorkflowId;
use super::step::StepName;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidRequest {
    #[error("ticker must not be empty")]
    EmptyTicker,

    #[error("query must not be empty")]
    EmptyQuery,

    #[error("only_steps must name at least one step")]
    EmptyOnlySteps,

    #[error("only_steps must follow the canonical order: {0:?}")]
    OutOfOrder(Vec<StepName>),
}

/// Request for one streamed run.
///
/// Only `ticker` and `query` are required; the rest tune the server's
/// execution and are omitted from the body when unset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowRequest {
    pub ticker: String,
    pub query: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<WorkflowId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub only_steps: Option<Vec<StepName>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub until_step: Option<StepName>,

    pub news_limit: u32,
    pub search_limit: u32,
    pub force_refresh: bool,
    pub temp_workflow: bool,
}

impl WorkflowRequest {
    pub fn new(ticker: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            ticker: ticker.into(),
            query: query.into(),
            workflow_id: None,
            company_name: None,
            only_steps: None,
            until_step: None,
            news_limit: 5,
            search_limit: 5,
            force_refresh: false,
            temp_workflow: false,
        }
    }

    pub fn with_workflow_id(mut self, id: WorkflowId) -> Self {
        self.workflow_id = Some(id);
        self
    }

    pub fn with_company_name(mut self, name: impl Into<String>) -> Self {
        self.company_name = Some(name.into());
        self
    }

    pub fn with_only_steps(mut self, steps: Vec<StepName>) -> Self {
        self.only_steps = Some(steps);
        self
    }

    pub fn with_until_step(mut self, step: StepName) -> Self {
        self.until_step = Some(step);
        self
    }

    pub fn with_force_refresh(mut self, force: bool) -> Self {
        self.force_refresh = force;
        self
    }

    /// 送信前の検証（サーバ側と同じ規則）
    pub fn validate(&self) -> Result<(), InvalidRequest> {
        if self.ticker.trim().is_empty() {
            return Err(InvalidRequest::EmptyTicker);
        }
        if self.query.trim().is_empty() {
            return Err(InvalidRequest::EmptyQuery);
        }
        if let Some(steps) = &self.only_steps {
            if steps.is_empty() {
                return Err(InvalidRequest::EmptyOnlySteps);
            }
            if steps.windows(2).any(|pair| pair[0] >= pair[1]) {
                return Err(InvalidRequest::OutOfOrder(steps.clone()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_request_serializes_without_optional_fields() {
        let request = WorkflowRequest::new("AAPL", "Should I buy?");
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["ticker"], "AAPL");
        assert_eq!(json["query"], "Should I buy?");
        assert_eq!(json["news_limit"], 5);
        assert!(json.get("until_step").is_none());
        assert!(json.get("only_steps").is_none());
    }

    #[test]
    fn builder_fields_reach_the_wire() {
        let request = WorkflowRequest::new("MSFT", "q")
            .with_only_steps(vec![StepName::Retrieval, StepName::News])
            .with_until_step(StepName::Research)
            .with_force_refresh(true);
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["only_steps"], serde_json::json!(["retrieval", "news"]));
        assert_eq!(json["until_step"], "research");
        assert_eq!(json["force_refresh"], true);
    }

    #[test]
    fn validate_rejects_blank_ticker_and_query() {
        assert_eq!(
            WorkflowRequest::new("  ", "q").validate(),
            Err(InvalidRequest::EmptyTicker)
        );
        assert_eq!(
            WorkflowRequest::new("AAPL", "").validate(),
            Err(InvalidRequest::EmptyQuery)
        );
    }

    #[test]
    fn validate_requires_canonical_order_for_only_steps() {
        let ok = WorkflowRequest::new("AAPL", "q")
            .with_only_steps(vec![StepName::Fundamental, StepName::Investment]);
        assert!(ok.validate().is_ok());

        let backwards = WorkflowRequest::new("AAPL", "q")
            .with_only_steps(vec![StepName::News, StepName::Retrieval]);
        assert!(matches!(
            backwards.validate(),
            Err(InvalidRequest::OutOfOrder(_))
        ));

        let empty = WorkflowRequest::new("AAPL", "q").with_only_steps(vec![]);
        assert_eq!(empty.validate(), Err(InvalidRequest::EmptyOnlySteps));
    }
}
