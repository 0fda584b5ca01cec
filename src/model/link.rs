use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkReference {
    pub id: i64,
}

/// One parent -> child edge of an iteration's relation graph. Top-level
/// entries come back with no source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    #[serde(default)]
    pub source: Option<LinkReference>,
    #[serde(default)]
    pub target: Option<LinkReference>,
}

impl Link {
    pub fn new(source: Option<i64>, target: Option<i64>) -> Self {
        Self {
            source: source.map(|id| LinkReference { id }),
            target: target.map(|id| LinkReference { id }),
        }
    }

    pub fn source_id(&self) -> Option<i64> {
        self.source.map(|r| r.id)
    }

    pub fn target_id(&self) -> Option<i64> {
        self.target.map(|r| r.id)
    }
}
