//! Per-backend lowering of the [`Filter`](super::Filter) IR.
//!
//! Each translator is a pure function; the concrete backends in the app
//! crate call these and only need to walk the resulting tree into their own
//! client's types.

use super::{Condition, Filter};
use serde_json::Value;

/// Backend-agnostic tree the vector-backend client walks into its native
/// filter type. Shaped after Qdrant's `must`/`must_not`/`should` filter, but
/// kept free of any `qdrant-client` dependency so it stays usable from a
/// WASM-safe crate.
#[derive(Debug, Clone, PartialEq)]
pub enum VectorCondition {
    MatchValue { key: String, value: Value },
    MatchAny { key: String, values: Vec<Value> },
    MatchExcept { key: String, values: Vec<Value> },
    Range {
        key: String,
        gt: Option<Value>,
        gte: Option<Value>,
        lt: Option<Value>,
        lte: Option<Value>,
    },
    IdInSet { ids: Vec<String> },
    /// Field exists and is null. Never emitted for [`Condition::IsAbsent`].
    FieldIsNull { key: String },
    /// Field does not exist on the point's payload at all.
    FieldIsAbsent { key: String },
    /// OR of "is null" and "is an empty array/string", per spec: absence or
    /// emptiness both satisfy `is_empty`.
    Or(Vec<VectorCondition>),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VectorFilterPlan {
    pub must: Vec<VectorCondition>,
    pub must_not: Vec<VectorCondition>,
    pub should: Vec<VectorCondition>,
}

impl VectorFilterPlan {
    pub fn is_empty(&self) -> bool {
        self.must.is_empty() && self.must_not.is_empty() && self.should.is_empty()
    }
}

fn lower_condition(c: &Condition) -> VectorCondition {
    match c {
        Condition::Eq { key, value } => VectorCondition::MatchValue {
            key: key.clone(),
            value: value.clone(),
        },
        Condition::MatchAny { key, values } => VectorCondition::MatchAny {
            key: key.clone(),
            values: values.clone(),
        },
        Condition::MatchExcept { key, values } => VectorCondition::MatchExcept {
            key: key.clone(),
            values: values.clone(),
        },
        Condition::Range {
            key,
            gt,
            gte,
            lt,
            lte,
        } => VectorCondition::Range {
            key: key.clone(),
            gt: gt.clone(),
            gte: gte.clone(),
            lt: lt.clone(),
            lte: lte.clone(),
        },
        Condition::IdInSet { ids } => VectorCondition::IdInSet { ids: ids.clone() },
        // Load-bearing: IsNull means "field present with null value", and
        // must never be lowered to a field-absence predicate.
        Condition::IsNull { key } => VectorCondition::FieldIsNull { key: key.clone() },
        Condition::IsAbsent { key } => VectorCondition::FieldIsAbsent { key: key.clone() },
        Condition::IsEmpty { key } => VectorCondition::Or(vec![
            VectorCondition::FieldIsNull { key: key.clone() },
            VectorCondition::FieldIsAbsent { key: key.clone() },
        ]),
    }
}

/// Lower the IR to a vector-backend filter plan. An IR with every clause
/// list empty lowers to an empty plan, which callers must send as *no
/// filter* rather than an always-true/always-false condition.
pub fn to_vector_filter(filter: &Filter) -> VectorFilterPlan {
    VectorFilterPlan {
        must: filter.must.iter().map(lower_condition).collect(),
        must_not: filter.must_not.iter().map(lower_condition).collect(),
        should: filter.should.iter().map(lower_condition).collect(),
    }
}

/// Lower the IR to a query-string fragment the full-text backend's opaque
/// `filter` parameter accepts. Range/id-in-set/is-null clauses that a bare
/// keyword index can't express are rendered as best-effort tag filters;
/// anything genuinely inexpressible should be caught by the caller before
/// reaching here (full-text filtering is advisory, not authoritative).
pub fn to_fulltext_filter(filter: &Filter) -> String {
    let mut parts = Vec::new();
    for c in &filter.must {
        if let Some(frag) = fulltext_fragment(c, false) {
            parts.push(frag);
        }
    }
    for c in &filter.must_not {
        if let Some(frag) = fulltext_fragment(c, true) {
            parts.push(frag);
        }
    }
    if !filter.should.is_empty() {
        let should_parts: Vec<String> = filter
            .should
            .iter()
            .filter_map(|c| fulltext_fragment(c, false))
            .collect();
        if !should_parts.is_empty() {
            parts.push(format!("({})", should_parts.join(" OR ")));
        }
    }
    parts.join(" AND ")
}

fn fulltext_fragment(c: &Condition, negate: bool) -> Option<String> {
    let prefix = if negate { "-" } else { "" };
    match c {
        Condition::Eq { key, value } => Some(format!("{prefix}{key}:{}", value_to_str(value))),
        Condition::MatchAny { key, values } => {
            let joined = values.iter().map(value_to_str).collect::<Vec<_>>().join(",");
            Some(format!("{prefix}{key}:[{joined}]"))
        }
        Condition::MatchExcept { key, values } => {
            let joined = values.iter().map(value_to_str).collect::<Vec<_>>().join(",");
            Some(format!("-{key}:[{joined}]"))
        }
        Condition::IsNull { key } => Some(format!("{prefix}{key}:__null__")),
        Condition::IsAbsent { key } => Some(format!("{prefix}{key}:__absent__")),
        Condition::IsEmpty { key } => Some(format!("{prefix}{key}:__empty_or_absent__")),
        Condition::IdInSet { ids } => Some(format!("{prefix}id:[{}]", ids.join(","))),
        Condition::Range { .. } => None,
    }
}

fn value_to_str(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Lower the IR to a parameterised SQL `WHERE` fragment plus bind values,
/// for the metadata backend's relational store. SQL columns always exist
/// (possibly `NULL`), so `IsAbsent` has no meaning here and is translated
/// identically to `IsNull`; callers should never construct an `IsAbsent`
/// condition when targeting this translator (it is reserved for the vector
/// backend's schemaless payload).
pub fn to_metadata_sql(filter: &Filter) -> (String, Vec<Value>) {
    let mut clauses = Vec::new();
    let mut binds = Vec::new();

    for c in &filter.must {
        clauses.push(sql_fragment(c, false, &mut binds));
    }
    for c in &filter.must_not {
        clauses.push(sql_fragment(c, true, &mut binds));
    }
    if !filter.should.is_empty() {
        let should_clauses: Vec<String> = filter
            .should
            .iter()
            .map(|c| sql_fragment(c, false, &mut binds))
            .collect();
        clauses.push(format!("({})", should_clauses.join(" OR ")));
    }

    if clauses.is_empty() {
        ("1=1".to_string(), binds)
    } else {
        (clauses.join(" AND "), binds)
    }
}

fn sql_fragment(c: &Condition, negate: bool, binds: &mut Vec<Value>) -> String {
    let not_kw = if negate { "NOT " } else { "" };
    match c {
        Condition::Eq { key, value } => {
            binds.push(value.clone());
            format!("{not_kw}{key} = ?")
        }
        Condition::MatchAny { key, values } => {
            let placeholders = values.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
            binds.extend(values.iter().cloned());
            format!("{not_kw}{key} IN ({placeholders})")
        }
        Condition::MatchExcept { key, values } => {
            let placeholders = values.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
            binds.extend(values.iter().cloned());
            format!("{key} NOT IN ({placeholders})")
        }
        Condition::Range {
            key,
            gt,
            gte,
            lt,
            lte,
        } => {
            let mut parts = Vec::new();
            if let Some(v) = gt {
                binds.push(v.clone());
                parts.push(format!("{key} > ?"));
            }
            if let Some(v) = gte {
                binds.push(v.clone());
                parts.push(format!("{key} >= ?"));
            }
            if let Some(v) = lt {
                binds.push(v.clone());
                parts.push(format!("{key} < ?"));
            }
            if let Some(v) = lte {
                binds.push(v.clone());
                parts.push(format!("{key} <= ?"));
            }
            if parts.is_empty() {
                "1=1".to_string()
            } else {
                format!("{not_kw}({})", parts.join(" AND "))
            }
        }
        Condition::IdInSet { ids } => {
            let placeholders = ids.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
            binds.extend(ids.iter().cloned().map(Value::String));
            format!("{not_kw}id IN ({placeholders})")
        }
        // IsAbsent collapses into IsNull for a relational column.
        Condition::IsNull { key } | Condition::IsAbsent { key } => {
            format!("{key} IS {}NULL", if negate { "NOT " } else { "" })
        }
        Condition::IsEmpty { key } => {
            format!("({key} IS NULL OR {key} = '')")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::Filter;

    #[test]
    fn empty_filter_lowers_to_empty_vector_plan() {
        let plan = to_vector_filter(&Filter::default());
        assert!(plan.is_empty());
    }

    #[test]
    fn is_null_never_lowers_to_field_absent() {
        let filter = Filter {
            must: vec![Condition::IsNull {
                key: "superseded_by".to_string(),
            }],
            ..Default::default()
        };
        let plan = to_vector_filter(&filter);
        assert_eq!(
            plan.must,
            vec![VectorCondition::FieldIsNull {
                key: "superseded_by".to_string()
            }]
        );
    }

    #[test]
    fn is_empty_lowers_to_null_or_absent_disjunction() {
        let filter = Filter {
            must: vec![Condition::IsEmpty {
                key: "qntm_keys".to_string(),
            }],
            ..Default::default()
        };
        let plan = to_vector_filter(&filter);
        match &plan.must[0] {
            VectorCondition::Or(parts) => {
                assert!(parts.contains(&VectorCondition::FieldIsNull {
                    key: "qntm_keys".to_string()
                }));
                assert!(parts.contains(&VectorCondition::FieldIsAbsent {
                    key: "qntm_keys".to_string()
                }));
            }
            other => panic!("expected Or, got {other:?}"),
        }
    }

    /// S2 regression: the fixed deletion-eligibility exclusion filter must
    /// not translate into a mandatory `is_null("superseded_by")` clause —
    /// that would reject every freshly-ingested chunk, which never has the
    /// field at all.
    #[test]
    fn deletion_eligible_exclusion_does_not_imply_superseded_by_is_null() {
        let filter = Filter::deletion_eligible_exclusion();
        let plan = to_vector_filter(&filter);
        for cond in plan.must.iter().chain(plan.must_not.iter()) {
            if let VectorCondition::FieldIsNull { key } = cond {
                assert_ne!(key, "superseded_by");
            }
        }
    }

    #[test]
    fn metadata_sql_absent_collapses_to_is_null() {
        let filter = Filter {
            must: vec![Condition::IsAbsent {
                key: "consolidation_level".to_string(),
            }],
            ..Default::default()
        };
        let (sql, binds) = to_metadata_sql(&filter);
        assert_eq!(sql, "consolidation_level IS NULL");
        assert!(binds.is_empty());
    }

    #[test]
    fn metadata_sql_empty_filter_is_always_true() {
        let (sql, binds) = to_metadata_sql(&Filter::default());
        assert_eq!(sql, "1=1");
        assert!(binds.is_empty());
    }

    #[test]
    fn fulltext_must_not_negates_fragment() {
        let filter = Filter {
            must_not: vec![Condition::Eq {
                key: "deletion_eligible".to_string(),
                value: Value::Bool(true),
            }],
            ..Default::default()
        };
        let q = to_fulltext_filter(&filter);
        assert_eq!(q, "-deletion_eligible:true");
    }
}
