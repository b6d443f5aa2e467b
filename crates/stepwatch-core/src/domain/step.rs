//! Pipeline steps and the fixed-order map keyed by them.

use std::fmt;
use std::str::FromStr;

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

/// One named stage of the pipeline.
///
/// The set is closed and ordered; `ALL` is the canonical execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepName {
    Retrieval,
    Fundamental,
    News,
    Research,
    Investment,
}

impl StepName {
    pub const ALL: [StepName; 5] = [
        StepName::Retrieval,
        StepName::Fundamental,
        StepName::News,
        StepName::Research,
        StepName::Investment,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StepName::Retrieval => "retrieval",
            StepName::Fundamental => "fundamental",
            StepName::News => "news",
            StepName::Research => "research",
            StepName::Investment => "investment",
        }
    }

    /// Position in the canonical order.
    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for StepName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown step: {0}")]
pub struct UnknownStep(pub String);

impl FromStr for StepName {
    type Err = UnknownStep;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StepName::ALL
            .into_iter()
            .find(|step| step.as_str() == s)
            .ok_or_else(|| UnknownStep(s.to_string()))
    }
}

/// StepMap は StepName をキーとする固定長の arena
///
/// # 設計
/// - キー集合は StepName::ALL で固定（挿入・削除はない）
/// - 内部は `[T; 5]`、StepName::index() で直接引く
/// - Serialize はステップ名をキーとする map として出力
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StepMap<T> {
    slots: [T; 5],
}

impl<T: Copy> StepMap<T> {
    /// Every step starts with the same value.
    pub fn filled(value: T) -> Self {
        Self { slots: [value; 5] }
    }
}

impl<T> StepMap<T> {
    pub fn get(&self, step: StepName) -> &T {
        &self.slots[step.index()]
    }

    pub fn get_mut(&mut self, step: StepName) -> &mut T {
        &mut self.slots[step.index()]
    }

    pub fn set(&mut self, step: StepName, value: T) {
        self.slots[step.index()] = value;
    }

    /// Entries in canonical step order.
    pub fn iter(&self) -> impl Iterator<Item = (StepName, &T)> {
        StepName::ALL.into_iter().zip(self.slots.iter())
    }
}

impl<T: Serialize> Serialize for StepMap<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.slots.len()))?;
        for (step, value) in self.iter() {
            map.serialize_entry(step.as_str(), value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::retrieval("retrieval", StepName::Retrieval)]
    #[case::fundamental("fundamental", StepName::Fundamental)]
    #[case::news("news", StepName::News)]
    #[case::research("research", StepName::Research)]
    #[case::investment("investment", StepName::Investment)]
    fn parses_known_step_names(#[case] raw: &str, #[case] expected: StepName) {
        assert_eq!(raw.parse::<StepName>().unwrap(), expected);
        assert_eq!(expected.to_string(), raw);
    }

    #[test]
    fn rejects_unknown_step_name() {
        let err = "summary".parse::<StepName>().unwrap_err();
        assert_eq!(err, UnknownStep("summary".to_string()));
    }

    #[test]
    fn canonical_order_matches_index() {
        for (i, step) in StepName::ALL.into_iter().enumerate() {
            assert_eq!(step.index(), i);
        }
        assert!(StepName::Retrieval < StepName::Investment);
    }

    #[test]
    fn step_map_serializes_as_named_map_in_order() {
        let mut map = StepMap::filled(0u64);
        map.set(StepName::News, 7);
        *map.get_mut(StepName::Retrieval) += 2;

        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(
            json,
            r#"{"retrieval":2,"fundamental":0,"news":7,"research":0,"investment":0}"#
        );
    }
}
