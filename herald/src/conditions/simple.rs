//! Built-in condition expressions.
//!
//! Supports clauses of the form
//!
//! ```text
//! priority >= high
//! title == 'Door open'
//! 'alarm' in applied_scenarios
//! 'person.alice' not in occupancy.home
//! ```
//!
//! joined by `and` (binds tighter) and `or`, plus the bare literals `true`
//! and `false`. Quoted strings may not contain the words `and` / `or`
//! surrounded by spaces.

use std::cmp::Ordering;
use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;

use super::{ConditionEvaluator, ConditionVariables};
use crate::notification::Priority;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Term {
    Literal(bool),
    Clause { lhs: String, op: Op, rhs: String },
}

fn clause_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"^\s*(?P<lhs>'[^']*'|"[^"]*"|[^\s=!<>'"]+)(?:\s*(?P<cmp>==|!=|>=|<=|>|<)\s*|\s+(?P<member>not\s+in|in)\s+)(?P<rhs>'[^']*'|"[^"]*"|[^\s'"]+)\s*$"#,
        )
        .unwrap()
    })
}

/// Evaluator for the built-in expression language.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleConditionEvaluator;

impl SimpleConditionEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// Parse into disjunctions of conjunctions.
    fn parse(expr: &str) -> Result<Vec<Vec<Term>>> {
        if expr.trim().is_empty() {
            return Err(Error::evaluation("Empty condition"));
        }
        expr.split(" or ")
            .map(|alternative| alternative.split(" and ").map(parse_term).collect())
            .collect()
    }
}

fn parse_term(raw: &str) -> Result<Term> {
    let trimmed = raw.trim();
    match trimmed {
        "true" => return Ok(Term::Literal(true)),
        "false" => return Ok(Term::Literal(false)),
        _ => {}
    }

    let captures = clause_regex()
        .captures(trimmed)
        .ok_or_else(|| Error::evaluation(format!("Cannot parse condition clause: {trimmed}")))?;

    let op = if let Some(cmp) = captures.name("cmp") {
        match cmp.as_str() {
            "==" => Op::Eq,
            "!=" => Op::Ne,
            ">=" => Op::Ge,
            "<=" => Op::Le,
            ">" => Op::Gt,
            _ => Op::Lt,
        }
    } else if captures
        .name("member")
        .is_some_and(|m| m.as_str().starts_with("not"))
    {
        Op::NotIn
    } else {
        Op::In
    };

    Ok(Term::Clause {
        lhs: captures["lhs"].to_string(),
        op,
        rhs: captures["rhs"].to_string(),
    })
}

fn unquote(s: &str) -> &str {
    let quoted = s.len() >= 2
        && ((s.starts_with('\'') && s.ends_with('\'')) || (s.starts_with('"') && s.ends_with('"')));
    if quoted { &s[1..s.len() - 1] } else { s }
}

fn variable(vars: &ConditionVariables, name: &str) -> Result<Value> {
    vars.lookup(name)
        .ok_or_else(|| Error::evaluation(format!("Unknown condition variable: {name}")))
}

fn matches_literal(value: &Value, literal: &str) -> bool {
    match value {
        Value::String(s) => s == literal,
        Value::Bool(b) => b.to_string() == literal,
        Value::Number(n) => {
            n.to_string() == literal
                || literal
                    .parse::<f64>()
                    .is_ok_and(|l| n.as_f64().is_some_and(|v| v == l))
        }
        Value::Null => literal == "null" || literal == "none",
        Value::Array(_) | Value::Object(_) => false,
    }
}

fn contains_literal(value: &Value, literal: &str) -> bool {
    match value {
        Value::Array(items) => items.iter().any(|item| matches_literal(item, literal)),
        Value::String(s) => s.contains(literal),
        Value::Object(map) => map.contains_key(literal),
        _ => false,
    }
}

fn compare(name: &str, value: &Value, literal: &str) -> Result<Ordering> {
    if name == "priority" {
        let current: Priority = value
            .as_str()
            .ok_or_else(|| Error::evaluation("priority is not a string"))?
            .parse()?;
        let other: Priority = literal.parse()?;
        return Ok(current.cmp(&other));
    }

    let current = value
        .as_f64()
        .ok_or_else(|| Error::evaluation(format!("{name} is not a number")))?;
    let other: f64 = literal
        .parse()
        .map_err(|_| Error::evaluation(format!("{literal} is not a number")))?;
    current
        .partial_cmp(&other)
        .ok_or_else(|| Error::evaluation(format!("Cannot compare {name} with {literal}")))
}

fn evaluate_term(term: &Term, vars: &ConditionVariables) -> Result<bool> {
    let (lhs, op, rhs) = match term {
        Term::Literal(value) => return Ok(*value),
        Term::Clause { lhs, op, rhs } => (lhs.as_str(), *op, rhs.as_str()),
    };

    match op {
        Op::Eq => Ok(matches_literal(&variable(vars, lhs)?, unquote(rhs))),
        Op::Ne => Ok(!matches_literal(&variable(vars, lhs)?, unquote(rhs))),
        Op::In => Ok(contains_literal(&variable(vars, rhs)?, unquote(lhs))),
        Op::NotIn => Ok(!contains_literal(&variable(vars, rhs)?, unquote(lhs))),
        Op::Lt | Op::Le | Op::Gt | Op::Ge => {
            let ordering = compare(lhs, &variable(vars, lhs)?, unquote(rhs))?;
            Ok(match op {
                Op::Lt => ordering == Ordering::Less,
                Op::Le => ordering != Ordering::Greater,
                Op::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            })
        }
    }
}

#[async_trait]
impl ConditionEvaluator for SimpleConditionEvaluator {
    async fn evaluate(&self, expr: &str, vars: &ConditionVariables) -> Result<bool> {
        for alternative in Self::parse(expr)? {
            let mut all = true;
            for term in &alternative {
                if !evaluate_term(term, vars)? {
                    all = false;
                    break;
                }
            }
            if all {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn validate(&self, expr: &str) -> Result<()> {
        Self::parse(expr).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conditions::OccupancySummary;
    use rstest::rstest;

    fn vars() -> ConditionVariables {
        ConditionVariables {
            applied_scenarios: vec!["alarm".into()],
            priority: Priority::High,
            title: Some("Door open".into()),
            occupancy: OccupancySummary {
                home: vec!["person.alice".into()],
                away: vec!["person.bob".into()],
            },
            ..Default::default()
        }
    }

    #[rstest]
    #[case("true", true)]
    #[case("priority == high", true)]
    #[case("priority != high", false)]
    #[case("priority >= medium", true)]
    #[case("priority > critical", false)]
    #[case("title == 'Door open'", true)]
    #[case("'alarm' in applied_scenarios", true)]
    #[case("'person.bob' not in occupancy.home", true)]
    #[case("'person.bob' in occupancy.home or priority == high", true)]
    #[case("'alarm' in applied_scenarios and priority < medium", false)]
    #[case("false or 'person.alice' in occupancy.home and priority <= high", true)]
    #[tokio::test]
    async fn test_evaluate(#[case] expr: &str, #[case] expected: bool) {
        let evaluator = SimpleConditionEvaluator::new();
        assert_eq!(evaluator.evaluate(expr, &vars()).await.unwrap(), expected);
    }

    #[tokio::test]
    async fn test_unknown_variable_is_error() {
        let evaluator = SimpleConditionEvaluator::new();
        assert!(evaluator.evaluate("weather == sunny", &vars()).await.is_err());
    }

    #[rstest]
    #[case("")]
    #[case("priority ==")]
    #[case("just some words")]
    fn test_validate_rejects(#[case] expr: &str) {
        assert!(SimpleConditionEvaluator::new().validate(expr).is_err());
    }

    #[test]
    fn test_validate_accepts() {
        let evaluator = SimpleConditionEvaluator::new();
        assert!(evaluator.validate("priority >= high and 'x' in applied_scenarios").is_ok());
    }
}
