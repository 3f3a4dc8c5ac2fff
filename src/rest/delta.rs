//! Delta payload decoding.
//!
//! The feed posts a two-element array where exactly one element carries
//! `inserts`; the other lists deletions, which this service ignores. The
//! order of the two objects is not guaranteed.

use std::collections::HashSet;

use serde::Deserialize;

use crate::error::DeltaError;
use crate::model::ContainerStatus;

const STATUS_PREDICATE_SHORT: &str = "docker:status";
const STATUS_PREDICATE_FULL: &str = "https://w3.org/ns/bde/docker#status";

#[derive(Debug, Deserialize)]
struct DeltaEntry {
    #[serde(default)]
    inserts: Vec<Triple>,
    #[serde(default)]
    #[allow(dead_code)]
    deletes: Vec<Triple>,
}

#[derive(Debug, Clone, Deserialize)]
struct Triple {
    subject: String,
    predicate: String,
    object: String,
}

/// A container status change extracted from the feed. The subject of the
/// triple is the container's state node, not the container itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub state_uri: String,
    pub status: ContainerStatus,
}

/// Decode a raw delta body into status changes, deduplicated within the
/// batch by `(state, new status)`.
pub fn parse_status_changes(body: &str) -> Result<Vec<StatusChange>, DeltaError> {
    let entries: Vec<DeltaEntry> = serde_json::from_str(body)?;

    let entry = entries
        .into_iter()
        .find(|e| !e.inserts.is_empty())
        .ok_or(DeltaError::NoInserts)?;

    let mut seen = HashSet::new();
    let mut changes = Vec::new();

    for triple in entry.inserts {
        if triple.predicate != STATUS_PREDICATE_SHORT && triple.predicate != STATUS_PREDICATE_FULL
        {
            continue;
        }
        if !seen.insert((triple.subject.clone(), triple.object.clone())) {
            continue;
        }

        changes.push(StatusChange {
            state_uri: triple.subject,
            status: ContainerStatus::from_literal(&triple.object),
        });
    }

    Ok(changes)
}
