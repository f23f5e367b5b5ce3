//! Model answer → [`Filter`].
//!
//! Conditions that cannot be expressed against the schema are dropped one by
//! one, so a partially usable answer still yields its usable predicates.

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use litrag_core::filter::{FieldSpec, FieldType, RangePredicate, RangeUnit, TermPredicate};
use litrag_core::Filter;

#[derive(Debug, Clone, Deserialize)]
pub struct ModelAnswer {
    #[serde(default)]
    pub filters: Vec<Condition>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Condition {
    pub field: String,
    pub comparator: String,
    pub value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Comparator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Contain,
    Like,
}

impl Comparator {
    fn parse(raw: &str) -> Option<Self> {
        Some(match raw.trim().to_ascii_lowercase().as_str() {
            "eq" => Comparator::Eq,
            "ne" => Comparator::Ne,
            "gt" => Comparator::Gt,
            "gte" => Comparator::Gte,
            "lt" => Comparator::Lt,
            "lte" => Comparator::Lte,
            "contain" => Comparator::Contain,
            "like" => Comparator::Like,
            _ => return None,
        })
    }
}

pub fn translate(answer: &ModelAnswer, fields: &[FieldSpec]) -> Filter {
    answer.filters.iter().fold(Filter::default(), |filter, c| match predicate(c, fields) {
        Some(Predicate::Range(r)) => filter.with_range(r),
        Some(Predicate::Term(t)) => filter.with_term(t),
        None => {
            debug!(field = %c.field, comparator = %c.comparator, value = %c.value, "dropping filter condition");
            filter
        }
    })
}

enum Predicate {
    Range(RangePredicate),
    Term(TermPredicate),
}

fn predicate(c: &Condition, fields: &[FieldSpec]) -> Option<Predicate> {
    let name = c.field.strip_prefix("metadata.").unwrap_or(&c.field);
    let declared = fields.iter().find(|f| f.name == name)?;
    let comparator = Comparator::parse(&c.comparator)?;

    if declared.field_type.is_numeric() {
        let unit = if declared.field_type == FieldType::Year { RangeUnit::Year } else { RangeUnit::Number };
        let v = numeric_value(&c.value, declared.field_type)?;
        let mut r = RangePredicate::new(name, unit);
        match comparator {
            Comparator::Eq => return Some(Predicate::Range(RangePredicate::between(name, v, v, unit))),
            Comparator::Gt => r.gt = Some(v),
            Comparator::Gte => r.gte = Some(v),
            Comparator::Lt => r.lt = Some(v),
            Comparator::Lte => r.lte = Some(v),
            Comparator::Ne | Comparator::Contain | Comparator::Like => return None,
        }
        return Some(Predicate::Range(r));
    }

    let value = text_value(&c.value)?;
    match (declared.field_type, comparator) {
        (FieldType::Text, Comparator::Eq | Comparator::Contain | Comparator::Like) => {
            Some(Predicate::Term(TermPredicate::matching(name, value)))
        }
        (FieldType::Keyword, Comparator::Eq) => Some(Predicate::Term(TermPredicate::exact(name, value))),
        (FieldType::Keyword, Comparator::Contain | Comparator::Like) => {
            Some(Predicate::Term(TermPredicate::matching(name, value)))
        }
        _ => None,
    }
}

fn numeric_value(v: &Value, field_type: FieldType) -> Option<f64> {
    let n = match v {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => {
            let s = s.trim();
            match s.parse::<f64>() {
                Ok(n) => n,
                // "2015-06-01" for a year field
                Err(_) if field_type == FieldType::Year => s.get(..4)?.parse::<f64>().ok()?,
                Err(_) => return None,
            }
        }
        _ => return None,
    };
    if !n.is_finite() {
        return None;
    }
    match field_type {
        FieldType::Integer | FieldType::Year if n.fract() != 0.0 => None,
        _ => Some(n),
    }
}

fn text_value(v: &Value) -> Option<String> {
    let s = match v {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!s.is_empty()).then_some(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use litrag_core::config::SelfQuerySettings;
    use serde_json::json;

    fn answer(v: Value) -> ModelAnswer {
        serde_json::from_value(v).expect("answer")
    }

    fn fields() -> Vec<FieldSpec> {
        SelfQuerySettings::default().fields
    }

    #[test]
    fn year_comparators_become_ranges() {
        let f = translate(
            &answer(json!({"filters": [
                {"field": "publication_date", "comparator": "gt", "value": 2015},
                {"field": "metadata.publication_date", "comparator": "lte", "value": "2020"},
                {"field": "publication_date", "comparator": "eq", "value": "2018-03-01"}
            ]})),
            &fields(),
        );
        assert_eq!(f.ranges.len(), 3);
        assert_eq!(f.ranges[0].gt, Some(2015.0));
        assert_eq!(f.ranges[0].unit, RangeUnit::Year);
        assert_eq!(f.ranges[1].lte, Some(2020.0));
        assert_eq!(f.ranges[2], RangePredicate::between("publication_date", 2018.0, 2018.0, RangeUnit::Year));
    }

    #[test]
    fn term_fields_follow_their_type() {
        let f = translate(
            &answer(json!({"filters": [
                {"field": "authors", "comparator": "eq", "value": "Smith J"},
                {"field": "keywords", "comparator": "contain", "value": "sleep"},
                {"field": "title", "comparator": "like", "value": "caffeine"}
            ]})),
            &fields(),
        );
        assert_eq!(
            f.terms,
            vec![
                TermPredicate::exact("authors", "Smith J"),
                TermPredicate::matching("keywords", "sleep"),
                TermPredicate::matching("title", "caffeine"),
            ]
        );
    }

    #[test]
    fn unusable_conditions_are_dropped() {
        let f = translate(
            &answer(json!({"filters": [
                {"field": "publication_date", "comparator": "ne", "value": 2015},
                {"field": "journal", "comparator": "eq", "value": "Nature"},
                {"field": "publication_date", "comparator": "gt", "value": "recent"},
                {"field": "publication_date", "comparator": "gt", "value": 2015.5},
                {"field": "authors", "comparator": "gt", "value": "A"},
                {"field": "title", "comparator": "between", "value": "x"},
                {"field": "title", "comparator": "eq", "value": ""},
                {"field": "keywords", "comparator": "eq", "value": "insomnia"}
            ]})),
            &fields(),
        );
        assert!(f.ranges.is_empty());
        assert_eq!(f.terms, vec![TermPredicate::exact("keywords", "insomnia")]);
    }

    #[test]
    fn empty_answer_is_empty_filter() {
        assert!(translate(&answer(json!({"filters": []})), &fields()).is_empty());
        assert!(translate(&answer(json!({})), &fields()).is_empty());
    }
}
