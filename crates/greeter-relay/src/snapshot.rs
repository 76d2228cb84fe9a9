//! Read-only snapshot of the published group commitments.

use chrono::{DateTime, Utc};
use greeter_crypto::{FieldElement, MembershipTree};
use greeter_types::{GreeterError, GreeterResult};
use std::path::Path;
use tracing::debug;

/// The commitment list at one point in time, in publication order.
#[derive(Clone, Debug)]
pub struct CommitmentSnapshot {
    commitments: Vec<FieldElement>,
    taken_at: DateTime<Utc>,
}

impl CommitmentSnapshot {
    pub fn from_commitments(commitments: Vec<FieldElement>) -> Self {
        Self {
            commitments,
            taken_at: Utc::now(),
        }
    }

    /// Parse a JSON array of decimal or `0x` hex strings.
    pub fn from_json(json: &str) -> GreeterResult<Self> {
        let commitments: Vec<FieldElement> = serde_json::from_str(json)
            .map_err(|e| GreeterError::Serialization(format!("invalid commitment list: {}", e)))?;
        Ok(Self::from_commitments(commitments))
    }

    pub fn load(path: &Path) -> GreeterResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            GreeterError::Storage(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let snapshot = Self::from_json(&contents)?;
        debug!(path = %path.display(), commitments = snapshot.len(), "Loaded commitment snapshot");
        Ok(snapshot)
    }

    pub fn save(&self, path: &Path) -> GreeterResult<()> {
        let json = serde_json::to_string_pretty(&self.commitments)
            .map_err(|e| GreeterError::Serialization(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| GreeterError::Storage(e.to_string()))?;
        }
        std::fs::write(path, json).map_err(|e| GreeterError::Storage(e.to_string()))
    }

    pub fn commitments(&self) -> &[FieldElement] {
        &self.commitments
    }

    pub fn len(&self) -> usize {
        self.commitments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commitments.is_empty()
    }

    pub fn taken_at(&self) -> DateTime<Utc> {
        self.taken_at
    }

    /// A new snapshot with `commitment` appended.
    pub fn with_appended(&self, commitment: FieldElement) -> Self {
        let mut commitments = self.commitments.clone();
        commitments.push(commitment);
        Self::from_commitments(commitments)
    }

    pub fn build_tree(&self, depth: usize) -> GreeterResult<MembershipTree> {
        MembershipTree::build_with_depth(&self.commitments, depth)
    }
}
