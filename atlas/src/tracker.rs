//! Content-address & source tracker (§4.F): decides, for a file event,
//! whether to ingest, skip, or re-ingest with a delta against the
//! previously known chunk set.

use atlas_core::model::Source;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::path::Path;

pub fn source_id_for_path(canonical_path: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_path.as_bytes());
    hex_digest(hasher)
}

pub fn content_hash_for_chunks<'a>(chunk_texts: impl Iterator<Item = &'a str>) -> String {
    let mut hasher = Sha256::new();
    for text in chunk_texts {
        hasher.update(text.as_bytes());
        hasher.update(b"\0");
    }
    hex_digest(hasher)
}

fn hex_digest(hasher: Sha256) -> String {
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Canonicalise `path`, failing loudly rather than silently treating a
/// missing file as a fresh source — the caller is expected to have just
/// observed a filesystem event for this path.
pub fn canonicalize_path(path: &Path) -> anyhow::Result<String> {
    let canonical = std::fs::canonicalize(path)
        .map_err(|e| anyhow::anyhow!("failed to canonicalise {}: {e}", path.display()))?;
    Ok(canonical.to_string_lossy().into_owned())
}

/// What the tracker decided to do about a modify/create event, given the
/// previously known source row (if any).
#[derive(Debug, Clone, PartialEq)]
pub enum IngestDecision {
    /// No previous row for this path: ingest every chunk.
    IngestAll,
    /// Same `content_hash` and `file_mtime` as before: no-op (I5).
    NoOp,
    /// Content changed: `new_chunk_indices` should be upserted,
    /// `stale_chunk_indices` (present before, absent now) should be marked
    /// `deletion_eligible`.
    Reingest {
        new_chunk_indices: Vec<i64>,
        stale_chunk_indices: Vec<i64>,
    },
}

/// Decide what to do with a set of freshly-computed chunk texts for `path`,
/// given the previous [`Source`] row (if any) and the previous chunk texts
/// indexed by `chunk_index`.
pub fn decide(
    previous: Option<&Source>,
    new_content_hash: &str,
    new_file_mtime: DateTime<Utc>,
    previous_chunk_texts: &[(i64, String)],
    new_chunk_texts: &[(i64, String)],
) -> IngestDecision {
    let Some(previous) = previous else {
        return IngestDecision::IngestAll;
    };

    if previous.content_hash == new_content_hash && previous.file_mtime == new_file_mtime {
        return IngestDecision::NoOp;
    }

    let new_set: std::collections::HashSet<&str> =
        new_chunk_texts.iter().map(|(_, t)| t.as_str()).collect();
    let prev_set: std::collections::HashMap<&str, i64> = previous_chunk_texts
        .iter()
        .map(|(idx, t)| (t.as_str(), *idx))
        .collect();

    let new_chunk_indices: Vec<i64> = new_chunk_texts
        .iter()
        .filter(|(_, t)| !prev_set.contains_key(t.as_str()))
        .map(|(idx, _)| *idx)
        .collect();

    let stale_chunk_indices: Vec<i64> = previous_chunk_texts
        .iter()
        .filter(|(_, t)| !new_set.contains(t.as_str()))
        .map(|(idx, _)| *idx)
        .collect();

    IngestDecision::Reingest {
        new_chunk_indices,
        stale_chunk_indices,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atlas_core::model::SourceStatus;

    fn sample_source(content_hash: &str, mtime: DateTime<Utc>) -> Source {
        Source {
            source_id: "s1".into(),
            path: "/a.md".into(),
            content_hash: content_hash.into(),
            file_mtime: mtime,
            status: SourceStatus::Active,
            created_at: mtime,
            updated_at: mtime,
        }
    }

    #[test]
    fn source_id_is_deterministic() {
        assert_eq!(source_id_for_path("/a/b"), source_id_for_path("/a/b"));
        assert_ne!(source_id_for_path("/a/b"), source_id_for_path("/a/c"));
    }

    #[test]
    fn no_previous_row_ingests_all() {
        let decision = decide(None, "h1", Utc::now(), &[], &[(0, "x".into())]);
        assert_eq!(decision, IngestDecision::IngestAll);
    }

    #[test]
    fn unchanged_hash_and_mtime_is_noop() {
        let mtime = Utc::now();
        let previous = sample_source("h1", mtime);
        let decision = decide(Some(&previous), "h1", mtime, &[(0, "x".into())], &[(0, "x".into())]);
        assert_eq!(decision, IngestDecision::NoOp);
    }

    #[test]
    fn changed_content_computes_delta() {
        let mtime = Utc::now();
        let previous = sample_source("h1", mtime);
        let new_mtime = mtime + chrono::Duration::seconds(1);
        let prev_chunks = vec![(0, "old one".to_string()), (1, "old two".to_string())];
        let new_chunks = vec![(0, "old one".to_string()), (1, "new two".to_string())];

        let decision = decide(Some(&previous), "h2", new_mtime, &prev_chunks, &new_chunks);
        match decision {
            IngestDecision::Reingest {
                new_chunk_indices,
                stale_chunk_indices,
            } => {
                assert_eq!(new_chunk_indices, vec![1]);
                assert_eq!(stale_chunk_indices, vec![1]);
            }
            other => panic!("expected Reingest, got {other:?}"),
        }
    }
}
