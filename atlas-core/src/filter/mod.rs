//! Typed filter AST shared by every search path, and the per-backend
//! lowering logic in [`translate`].
//!
//! The three logical clause kinds (`must`/`must_not`/`should`) and the
//! condition vocabulary mirror spec'd search semantics exactly; in
//! particular `is_null`, `is_absent`, and `is_empty` are kept as three
//! distinct [`Condition`] variants and must never be collapsed into one
//! another — doing so is the regression this crate exists to prevent (see
//! the field-absence test in [`translate`]).

pub mod translate;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single predicate over one payload field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Condition {
    /// Field equals a scalar value exactly.
    Eq { key: String, value: Value },
    /// Field's value is one of `values`.
    MatchAny { key: String, values: Vec<Value> },
    /// Field's value is none of `values`.
    MatchExcept { key: String, values: Vec<Value> },
    /// Numeric/date range with optional open or closed bounds.
    Range {
        key: String,
        gt: Option<Value>,
        gte: Option<Value>,
        lt: Option<Value>,
        lte: Option<Value>,
    },
    /// Chunk id is a member of the given set.
    IdInSet { ids: Vec<String> },
    /// Field exists and its value is null. Distinct from [`Condition::IsAbsent`]:
    /// a document missing the field entirely must NOT match this.
    IsNull { key: String },
    /// Field does not exist on the document at all. Internal-only: never
    /// emitted by the fixed search-inclusion policy, and not exposed to
    /// filter-building call sites outside this crate's own logic — kept as
    /// a distinct variant precisely so it's never confused with `IsNull`.
    IsAbsent { key: String },
    /// Field is absent, or present but an empty collection/string.
    IsEmpty { key: String },
}

/// A filter as three independently-combined clause lists: all of `must`
/// hold (AND), none of `must_not` hold (NOT), at least one of `should`
/// holds when non-empty (OR). A filter with all three lists empty means
/// "no filter" and must be translated as such, not as an always-false or
/// always-true predicate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    #[serde(default)]
    pub must: Vec<Condition>,
    #[serde(default)]
    pub must_not: Vec<Condition>,
    #[serde(default)]
    pub should: Vec<Condition>,
}

impl Filter {
    pub fn is_empty(&self) -> bool {
        self.must.is_empty() && self.must_not.is_empty() && self.should.is_empty()
    }

    /// The fixed, non-user-supplied search-inclusion policy: exclude
    /// chunks marked deletion-eligible. Deliberately does **not** add an
    /// `is_null("superseded_by")` clause — see [`Condition::IsAbsent`] and
    /// the regression test in [`translate`].
    pub fn deletion_eligible_exclusion() -> Filter {
        Filter {
            must: vec![],
            must_not: vec![Condition::Eq {
                key: "deletion_eligible".to_string(),
                value: Value::Bool(true),
            }],
            should: vec![],
        }
    }
}
