//! EventParser: one raw record -> one `StreamEvent`.
//!
//! Only a record that is not a JSON object, or has no string
//! `event` tag, is a `FrameError`. Unknown tags, unknown steps and
//! oddly-typed optional fields still decode, into `Ignored` or `None`.

use serde::Deserialize;
use serde_json::Value;

use crate::domain::errors::excerpt;
use crate::domain::{
    CompletionPayload, DomainEvent, FrameError, IgnoreReason, StepCompletion, StepName,
    StepStatus, StreamEvent, WorkflowId, WorkflowStatus,
};

/// レコードの wire 形状
///
/// 型が合わなくてもレコード全体を落とさないよう、フィールドはすべて
/// `Value` のまま受けて `EventParser::parse` で解釈します。
#[derive(Debug, Deserialize)]
struct RawRecord {
    #[serde(default)]
    event: Option<Value>,
    #[serde(default)]
    workflow_id: Option<Value>,
    #[serde(default)]
    step: Option<Value>,
    #[serde(default)]
    status: Option<Value>,
    #[serde(default)]
    payload: Option<Value>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EventParser;

impl EventParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse(&self, record: &str) -> Result<StreamEvent, FrameError> {
        let value: Value = serde_json::from_str(record).map_err(|source| FrameError::Json {
            excerpt: excerpt(record),
            source,
        })?;
        if !value.is_object() {
            return Err(FrameError::NotAnObject {
                excerpt: excerpt(record),
            });
        }
        let raw: RawRecord = serde_json::from_value(value).map_err(|source| FrameError::Json {
            excerpt: excerpt(record),
            source,
        })?;

        let Some(tag) = str_field(raw.event.as_ref()) else {
            return Err(FrameError::MissingTag {
                excerpt: excerpt(record),
            });
        };

        // 文字列でない workflow_id は無いものとして扱う
        let workflow_id = str_field(raw.workflow_id.as_ref())
            .filter(|id| !id.is_empty())
            .map(WorkflowId::new);

        let kind = match tag {
            "step_start" => match step_of(&raw) {
                Ok(step) => DomainEvent::StepStart { step },
                Err(reason) => DomainEvent::Ignored(reason),
            },
            "step_complete" => match step_of(&raw) {
                Ok(step) => DomainEvent::StepComplete(completion(step, &raw)),
                Err(reason) => DomainEvent::Ignored(reason),
            },
            "workflow_complete" => DomainEvent::WorkflowComplete {
                status: str_field(raw.status.as_ref()).and_then(|s| s.parse::<WorkflowStatus>().ok()),
            },
            "error" => DomainEvent::Error {
                message: error_message(raw.payload.as_ref()),
            },
            other => DomainEvent::Ignored(IgnoreReason::UnknownTag(other.to_string())),
        };

        Ok(StreamEvent { workflow_id, kind })
    }
}

fn step_of(raw: &RawRecord) -> Result<StepName, IgnoreReason> {
    match raw.step.as_ref() {
        None | Some(Value::Null) => Err(IgnoreReason::MissingStep),
        Some(Value::String(step)) => step
            .parse::<StepName>()
            .map_err(|_| IgnoreReason::UnknownStep(step.clone())),
        Some(other) => Err(IgnoreReason::UnknownStep(other.to_string())),
    }
}

fn completion(step: StepName, raw: &RawRecord) -> StepCompletion {
    let payload = raw.payload.as_ref().and_then(Value::as_object);

    // status はトップレベル優先、なければ payload.status
    let status = str_field(raw.status.as_ref())
        .or_else(|| payload.and_then(|p| str_field(p.get("status"))))
        .and_then(|s| s.parse::<StepStatus>().ok());

    let payload = payload.map(|p| CompletionPayload {
        output: p.get("output").cloned().unwrap_or(Value::Null),
        duration_ms: p.get("duration_ms").and_then(Value::as_f64),
        warnings: p
            .get("warnings")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|w| w.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default(),
    });

    StepCompletion {
        step,
        status,
        payload,
    }
}

fn str_field(value: Option<&Value>) -> Option<&str> {
    value.and_then(Value::as_str)
}

fn error_message(payload: Option<&Value>) -> String {
    match payload {
        Some(Value::Object(map)) => map
            .get("error")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| Value::Object(map.clone()).to_string()),
        Some(Value::String(message)) => message.clone(),
        Some(other) => other.to_string(),
        None => "unknown error".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn parse(record: &str) -> StreamEvent {
        EventParser::new().parse(record).unwrap()
    }

    #[test]
    fn step_start() {
        let event = parse(r#"{"event":"step_start","step":"retrieval","workflow_id":"wf-9"}"#);
        assert_eq!(event.workflow_id, Some(WorkflowId::new("wf-9")));
        assert_eq!(
            event.kind,
            DomainEvent::StepStart {
                step: StepName::Retrieval
            }
        );
    }

    #[test]
    fn step_complete_with_top_level_status() {
        let event = parse(
            r#"{"event":"step_complete","step":"retrieval","status":"completed","payload":{"output":{"answer":"x"},"duration_ms":4200}}"#,
        );
        let DomainEvent::StepComplete(completion) = event.kind else {
            panic!("expected step_complete, got {:?}", event.kind);
        };
        assert_eq!(completion.step, StepName::Retrieval);
        assert_eq!(completion.status, Some(StepStatus::Completed));
        let payload = completion.payload.unwrap();
        assert_eq!(payload.output, json!({"answer": "x"}));
        assert_eq!(payload.duration_ms, Some(4200.0));
    }

    #[test]
    fn step_complete_falls_back_to_payload_status() {
        let event = parse(
            r#"{"event":"step_complete","step":"news","payload":{"status":"skipped","warnings":["no articles",3],"duration_ms":"n/a"}}"#,
        );
        let DomainEvent::StepComplete(completion) = event.kind else {
            panic!("expected step_complete");
        };
        assert_eq!(completion.status, Some(StepStatus::Skipped));
        let payload = completion.payload.unwrap();
        assert_eq!(payload.output, Value::Null);
        assert_eq!(payload.duration_ms, None);
        assert_eq!(payload.warnings, vec!["no articles".to_string()]);
    }

    #[test]
    fn step_complete_without_payload_keeps_it_absent() {
        let event = parse(r#"{"event":"step_complete","step":"news","status":"failed"}"#);
        let DomainEvent::StepComplete(completion) = event.kind else {
            panic!("expected step_complete");
        };
        assert_eq!(completion.payload, None);
    }

    #[test]
    fn workflow_complete_and_error() {
        assert_eq!(
            parse(r#"{"event":"workflow_complete","status":"partial"}"#).kind,
            DomainEvent::WorkflowComplete {
                status: Some(WorkflowStatus::Partial)
            }
        );
        assert_eq!(
            parse(r#"{"event":"workflow_complete"}"#).kind,
            DomainEvent::WorkflowComplete { status: None }
        );
        assert_eq!(
            parse(r#"{"event":"error","status":"failed","payload":{"error":"upstream timeout"}}"#)
                .kind,
            DomainEvent::Error {
                message: "upstream timeout".to_string()
            }
        );
    }

    #[rstest]
    #[case::unknown_tag(r#"{"event":"heartbeat"}"#, IgnoreReason::UnknownTag("heartbeat".into()))]
    #[case::unknown_step(r#"{"event":"step_start","step":"summary"}"#, IgnoreReason::UnknownStep("summary".into()))]
    #[case::missing_step(r#"{"event":"step_complete","status":"completed"}"#, IgnoreReason::MissingStep)]
    #[case::null_step(r#"{"event":"step_start","step":null}"#, IgnoreReason::MissingStep)]
    #[case::numeric_step(r#"{"event":"step_start","step":42}"#, IgnoreReason::UnknownStep("42".into()))]
    #[case::object_step(
        r#"{"event":"step_complete","step":{"name":"news"},"status":"completed"}"#,
        IgnoreReason::UnknownStep(r#"{"name":"news"}"#.into())
    )]
    fn tolerated_records_are_ignored(#[case] record: &str, #[case] reason: IgnoreReason) {
        assert_eq!(parse(record).kind, DomainEvent::Ignored(reason));
    }

    #[rstest]
    #[case::number("7")]
    #[case::empty_string("\"\"")]
    #[case::object(r#"{"id":"wf-1"}"#)]
    #[case::null("null")]
    fn odd_workflow_id_keeps_the_completion(#[case] workflow_id: &str) {
        let record = format!(
            r#"{{"event":"step_complete","step":"retrieval","status":"completed","workflow_id":{workflow_id},"payload":{{"output":{{"answer":"x"}},"duration_ms":4200}}}}"#
        );
        let event = parse(&record);

        assert_eq!(event.workflow_id, None);
        let DomainEvent::StepComplete(completion) = event.kind else {
            panic!("expected step_complete, got {:?}", event.kind);
        };
        assert_eq!(completion.status, Some(StepStatus::Completed));
        let payload = completion.payload.unwrap();
        assert_eq!(payload.output, json!({"answer": "x"}));
        assert_eq!(payload.duration_ms, Some(4200.0));
    }

    #[rstest]
    #[case::truncated("{not json")]
    #[case::array("[1,2]")]
    #[case::no_tag(r#"{"step":"news"}"#)]
    #[case::tag_not_a_string(r#"{"event":42}"#)]
    #[case::null_tag(r#"{"event":null,"step":"news"}"#)]
    fn malformed_records_are_frame_errors(#[case] record: &str) {
        assert!(EventParser::new().parse(record).is_err());
    }

    #[test]
    fn non_string_tag_is_a_missing_tag() {
        let err = EventParser::new().parse(r#"{"event":42}"#).unwrap_err();
        assert!(matches!(err, FrameError::MissingTag { .. }));
    }

    #[test]
    fn frame_error_names_the_record() {
        let err = EventParser::new().parse("{not json").unwrap_err();
        assert!(matches!(err, FrameError::Json { .. }));
        assert!(err.to_string().contains("{not json"));
    }
}
