//! Evaluation of the query, sort and aggregation subset the engine emits.
//!
//! Supported leaf queries: `match_all`, `match_none`, `term`, `terms`,
//! `ids`, `exists`, `match`, `range`. `bool` combines them. Anything else is
//! rejected so tests fail loudly instead of matching silently.
use anyhow::{anyhow, bail, Result};
use scout_core::types::Meta;
use serde_json::{json, Value};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// A document as the evaluator sees it.
pub struct DocRef<'a> {
    pub id: &'a str,
    pub seq: u64,
    pub source: &'a Meta,
}

pub fn matches(query: &Value, doc: &DocRef<'_>) -> Result<bool> {
    let (kind, body) = single_entry(query)?;
    match kind {
        "match_all" => Ok(true),
        "match_none" => Ok(false),
        "term" => {
            let (field, expected) = single_entry(body)?;
            let expected = expected.get("value").unwrap_or(expected);
            Ok(field_values(doc, field).iter().any(|v| same_value(v, expected)))
        }
        "terms" => {
            let (field, expected) = single_entry(body)?;
            let expected = expected
                .as_array()
                .ok_or_else(|| anyhow!("terms on '{field}' needs an array"))?;
            let values = field_values(doc, field);
            Ok(expected.iter().any(|e| values.iter().any(|v| same_value(v, e))))
        }
        "ids" => {
            let ids = body.get("values").and_then(Value::as_array).cloned().unwrap_or_default();
            Ok(ids.iter().any(|id| id.as_str() == Some(doc.id)))
        }
        "exists" => {
            let field = body
                .get("field")
                .and_then(Value::as_str)
                .ok_or_else(|| anyhow!("exists needs a field"))?;
            Ok(field_values(doc, field).iter().any(|v| !v.is_null()))
        }
        "match" => {
            let (field, text) = single_entry(body)?;
            let text = text.get("query").unwrap_or(text);
            let wanted = tokens(&scalar_text(text));
            let present: Vec<String> = field_values(doc, field)
                .iter()
                .flat_map(|v| tokens(&scalar_text(v)))
                .collect();
            Ok(wanted.iter().any(|t| present.contains(t)))
        }
        "range" => {
            let (field, bounds) = single_entry(body)?;
            let values = field_values(doc, field);
            Ok(values.iter().any(|v| within(v, bounds)))
        }
        "bool" => matches_bool(body, doc),
        other => bail!("unsupported query type '{other}'"),
    }
}

fn matches_bool(body: &Value, doc: &DocRef<'_>) -> Result<bool> {
    for occur in ["must", "filter"] {
        for clause in clauses(body.get(occur)) {
            if !matches(clause, doc)? {
                return Ok(false);
            }
        }
    }
    for clause in clauses(body.get("must_not")) {
        if matches(clause, doc)? {
            return Ok(false);
        }
    }

    let should = clauses(body.get("should"));
    if should.is_empty() {
        return Ok(true);
    }
    let has_required = body.get("must").is_some() || body.get("filter").is_some();
    let minimum = match body.get("minimum_should_match") {
        Some(Value::Number(n)) => n.as_u64().unwrap_or(1),
        Some(Value::String(s)) => s.parse().unwrap_or(1),
        _ if has_required => 0,
        _ => 1,
    };
    let mut satisfied = 0;
    for clause in should {
        if matches(clause, doc)? {
            satisfied += 1;
        }
    }
    Ok(satisfied >= minimum)
}

fn clauses(value: Option<&Value>) -> Vec<&Value> {
    match value {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(Value::Null) | None => Vec::new(),
        Some(single) => vec![single],
    }
}

fn single_entry(value: &Value) -> Result<(&str, &Value)> {
    let object = value.as_object().ok_or_else(|| anyhow!("expected an object, got {value}"))?;
    let mut entries = object.iter();
    match (entries.next(), entries.next()) {
        (Some((k, v)), None) => Ok((k.as_str(), v)),
        _ => bail!("expected exactly one key in {value}"),
    }
}

/// Values at a dotted path; arrays along the way are flattened.
pub fn field_values<'a>(doc: &DocRef<'a>, path: &str) -> Vec<&'a Value> {
    let source: &'a Meta = doc.source;
    let mut current: Vec<&'a Value> = Vec::new();
    let mut parts = path.split('.');
    let Some(first) = parts.next() else { return current };
    if let Some(v) = source.get(first) {
        current.push(v);
    }
    for part in parts {
        current = current
            .into_iter()
            .flat_map(|v| match v {
                Value::Array(items) => items.iter().filter_map(|i| i.get(part)).collect::<Vec<_>>(),
                other => other.get(part).into_iter().collect(),
            })
            .collect();
    }
    current
        .into_iter()
        .flat_map(|v| match v {
            Value::Array(items) => items.iter().collect::<Vec<_>>(),
            other => vec![other],
        })
        .collect()
}

fn same_value(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (Value::String(a), Value::Number(b)) | (Value::Number(b), Value::String(a)) => {
            a.parse::<f64>().ok() == b.as_f64()
        }
        _ => actual == expected,
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn tokens(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn within(value: &Value, bounds: &Value) -> bool {
    let checks = [
        ("gt", Ordering::Greater, false),
        ("gte", Ordering::Greater, true),
        ("lt", Ordering::Less, false),
        ("lte", Ordering::Less, true),
    ];
    checks.iter().all(|(op, wanted, inclusive)| match bounds.get(op) {
        None => true,
        Some(bound) => match compare_values(value, bound) {
            Ordering::Equal => *inclusive,
            ordering => ordering == *wanted,
        },
    })
}

/// Total order used by sorting and range checks: null < numbers < strings.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) | Value::Object(_) => 4,
        }
    }
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

/// One parsed sort clause.
#[derive(Debug, Clone, PartialEq)]
pub struct SortKey {
    pub field: String,
    pub descending: bool,
}

pub fn parse_sort(sort: &[Value]) -> Result<Vec<SortKey>> {
    sort.iter()
        .map(|entry| match entry {
            Value::String(field) => Ok(SortKey { field: field.clone(), descending: field == "_score" }),
            Value::Object(_) => {
                let (field, spec) = single_entry(entry)?;
                let order = spec.as_str().or_else(|| spec.get("order").and_then(Value::as_str));
                Ok(SortKey { field: field.to_string(), descending: order == Some("desc") })
            }
            other => bail!("unsupported sort clause {other}"),
        })
        .collect()
}

/// The values a document is sorted by, one per sort key.
pub fn sort_values(keys: &[SortKey], doc: &DocRef<'_>, score: f64) -> Vec<Value> {
    keys.iter()
        .map(|key| match key.field.as_str() {
            "_shard_doc" | "_doc" => json!(doc.seq),
            "_id" => json!(doc.id),
            "_score" => json!(score),
            field => field_values(doc, field).first().map_or(Value::Null, |v| (*v).clone()),
        })
        .collect()
}

pub fn compare_sort_values(keys: &[SortKey], a: &[Value], b: &[Value]) -> Ordering {
    for (i, key) in keys.iter().enumerate() {
        let (Some(x), Some(y)) = (a.get(i), b.get(i)) else { break };
        let ordering = compare_values(x, y);
        let ordering = if key.descending { ordering.reverse() } else { ordering };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Evaluate named `terms` aggregations over the matched documents.
pub fn aggregate(aggregations: &Meta, docs: &[DocRef<'_>]) -> Result<Meta> {
    let mut out = Meta::new();
    for (name, spec) in aggregations {
        let (kind, body) = single_entry(spec)?;
        if kind != "terms" {
            bail!("unsupported aggregation type '{kind}'");
        }
        let field = body
            .get("field")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("terms aggregation '{name}' needs a field"))?;
        let size = body.get("size").and_then(Value::as_u64).map_or(10, |s| s as usize);

        let mut counts: BTreeMap<String, (Value, u64)> = BTreeMap::new();
        for doc in docs {
            for value in field_values(doc, field) {
                let entry = counts.entry(scalar_text(value)).or_insert_with(|| (value.clone(), 0));
                entry.1 += 1;
            }
        }
        let mut buckets: Vec<(Value, u64)> = counts.into_values().collect();
        buckets.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| compare_values(&a.0, &b.0)));
        let buckets: Vec<Value> = buckets
            .into_iter()
            .take(size)
            .map(|(key, count)| json!({ "key": key, "doc_count": count }))
            .collect();
        out.insert(name.clone(), json!({ "buckets": buckets }));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(source: Value) -> Meta {
        source.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn soft_delete_filter_shapes_evaluate() {
        let live = doc(json!({ "title": "Dune" }));
        let marked_live = doc(json!({ "title": "Emma", "__soft_deleted": 0 }));
        let trashed = doc(json!({ "title": "Ubik", "__soft_deleted": 1 }));
        let exclude = json!({ "bool": {
            "should": [
                { "term": { "__soft_deleted": 0 } },
                { "bool": { "must_not": [ { "exists": { "field": "__soft_deleted" } } ] } }
            ],
            "minimum_should_match": 1
        }});

        let check = |source: &Meta| matches(&exclude, &DocRef { id: "1", seq: 0, source }).unwrap();
        assert!(check(&live));
        assert!(check(&marked_live));
        assert!(!check(&trashed));
    }

    #[test]
    fn match_is_token_and_case_insensitive() {
        let source = doc(json!({ "title": "The Left Hand of Darkness" }));
        let d = DocRef { id: "1", seq: 0, source: &source };
        assert!(matches(&json!({ "match": { "title": "darkness" } }), &d).unwrap());
        assert!(!matches(&json!({ "match": { "title": { "query": "dark" } } }), &d).unwrap());
    }

    #[test]
    fn range_and_nested_paths() {
        let source = doc(json!({ "year": 1969, "author": { "name": "Le Guin" } }));
        let d = DocRef { id: "1", seq: 0, source: &source };
        assert!(matches(&json!({ "range": { "year": { "gte": 1969, "lt": 1970 } } }), &d).unwrap());
        assert!(!matches(&json!({ "range": { "year": { "gt": 1969 } } }), &d).unwrap());
        assert!(matches(&json!({ "term": { "author.name": "Le Guin" } }), &d).unwrap());
    }

    #[test]
    fn unknown_query_type_is_an_error() {
        let source = Meta::new();
        let d = DocRef { id: "1", seq: 0, source: &source };
        assert!(matches(&json!({ "fuzzy": { "title": "x" } }), &d).is_err());
    }

    #[test]
    fn descending_sort_reverses_order() {
        let keys = parse_sort(&[json!({ "year": { "order": "desc" } }), json!({ "_shard_doc": "asc" })]).unwrap();
        let a = vec![json!(2000), json!(1)];
        let b = vec![json!(1990), json!(2)];
        assert_eq!(compare_sort_values(&keys, &a, &b), Ordering::Less);
    }
}
