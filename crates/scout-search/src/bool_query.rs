//! Boolean clause container.
//!
//! Accumulates `must` / `should` / `must_not` / `filter` clauses. A clause may
//! carry a dedup key; adding another clause under the same key and occurrence
//! replaces the earlier one instead of appending. The container also carries
//! the soft-delete visibility mode the final query is composed with.
use scout_core::types::SoftDeleteMode;
use serde_json::{json, Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Occur {
    Must,
    Should,
    MustNot,
    Filter,
}

impl Occur {
    pub fn as_str(self) -> &'static str {
        match self {
            Occur::Must => "must",
            Occur::Should => "should",
            Occur::MustNot => "must_not",
            Occur::Filter => "filter",
        }
    }

    const ALL: [Occur; 4] = [Occur::Must, Occur::Should, Occur::MustNot, Occur::Filter];
}

#[derive(Debug, Clone, PartialEq)]
struct Clause {
    key: Option<String>,
    query: Value,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoolQuery {
    must: Vec<Clause>,
    should: Vec<Clause>,
    must_not: Vec<Clause>,
    filter: Vec<Clause>,
    minimum_should_match: Option<Value>,
    boost: Option<f64>,
    soft_delete_mode: SoftDeleteMode,
}

impl BoolQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, occur: Occur, query: Value, key: Option<&str>) -> &mut Self {
        let clauses = self.clauses_mut(occur);
        if let Some(key) = key {
            if let Some(existing) = clauses.iter_mut().find(|c| c.key.as_deref() == Some(key)) {
                existing.query = query;
                return self;
            }
        }
        clauses.push(Clause { key: key.map(str::to_string), query });
        self
    }

    pub fn must(&mut self, query: Value) -> &mut Self {
        self.add(Occur::Must, query, None)
    }

    pub fn should(&mut self, query: Value) -> &mut Self {
        self.add(Occur::Should, query, None)
    }

    pub fn must_not(&mut self, query: Value) -> &mut Self {
        self.add(Occur::MustNot, query, None)
    }

    pub fn filter(&mut self, query: Value) -> &mut Self {
        self.add(Occur::Filter, query, None)
    }

    pub fn minimum_should_match(&mut self, value: impl Into<Value>) -> &mut Self {
        self.minimum_should_match = Some(value.into());
        self
    }

    pub fn boost(&mut self, boost: f64) -> &mut Self {
        self.boost = Some(boost);
        self
    }

    pub fn with_trashed(&mut self) -> &mut Self {
        self.soft_delete_mode = SoftDeleteMode::WithTrashed;
        self
    }

    pub fn only_trashed(&mut self) -> &mut Self {
        self.soft_delete_mode = SoftDeleteMode::OnlyTrashed;
        self
    }

    pub fn exclude_trashed(&mut self) -> &mut Self {
        self.soft_delete_mode = SoftDeleteMode::ExcludeTrashed;
        self
    }

    pub fn soft_delete_mode(&self) -> SoftDeleteMode {
        self.soft_delete_mode
    }

    /// True when no clause of any kind has been added.
    pub fn is_empty(&self) -> bool {
        Occur::ALL.iter().all(|o| self.clauses(*o).is_empty())
    }

    pub fn clause_count(&self, occur: Occur) -> usize {
        self.clauses(occur).len()
    }

    pub fn queries(&self, occur: Occur) -> impl Iterator<Item = &Value> {
        self.clauses(occur).iter().map(|c| &c.query)
    }

    pub fn to_value(&self) -> Value {
        let mut body = Map::new();
        for occur in Occur::ALL {
            let clauses = self.clauses(occur);
            if !clauses.is_empty() {
                let list: Vec<Value> = clauses.iter().map(|c| c.query.clone()).collect();
                body.insert(occur.as_str().to_string(), Value::Array(list));
            }
        }
        if let Some(msm) = &self.minimum_should_match {
            body.insert("minimum_should_match".to_string(), msm.clone());
        }
        if let Some(boost) = self.boost {
            body.insert("boost".to_string(), json!(boost));
        }
        json!({ "bool": body })
    }

    fn clauses(&self, occur: Occur) -> &Vec<Clause> {
        match occur {
            Occur::Must => &self.must,
            Occur::Should => &self.should,
            Occur::MustNot => &self.must_not,
            Occur::Filter => &self.filter,
        }
    }

    fn clauses_mut(&mut self, occur: Occur) -> &mut Vec<Clause> {
        match occur {
            Occur::Must => &mut self.must,
            Occur::Should => &mut self.should,
            Occur::MustNot => &mut self.must_not,
            Occur::Filter => &mut self.filter,
        }
    }
}
