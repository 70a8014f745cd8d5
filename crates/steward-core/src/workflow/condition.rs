//! JEXL condition evaluator for action gating.
//!
//! Conditions are evaluated against the execution's expression context
//! (`trigger`, `subjects`, `payload`, `variables`, `actions`). Evaluation is
//! pure and fail-closed: an absent or blank condition is `true`, and any
//! evaluation error or non-boolean result is `false`.
//!
//! Context values are always passed as the evaluation context, never
//! interpolated into expression strings.

use serde_json::{Value, json};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConditionError {
    #[error("condition evaluation failed: {0}")]
    EvalFailed(String),

    #[error("invalid context: {0}")]
    InvalidContext(String),

    #[error("condition did not evaluate to a boolean: {0}")]
    NotBoolean(String),
}

// ---------------------------------------------------------------------------
// ConditionEvaluator
// ---------------------------------------------------------------------------

/// Boolean predicate evaluator with string and collection transforms.
///
/// Supported transforms: `lower`, `upper`, `trim`, `length`, `contains`,
/// `startsWith`, `endsWith`, `not`.
///
/// Stateless; the underlying JEXL evaluator is built per evaluation so the
/// evaluator can be shared freely across runner tasks.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConditionEvaluator;

impl ConditionEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// Gate decision for an action.
    ///
    /// Never fails: a malformed condition or one that errors at evaluation
    /// time is logged and treated as `false`.
    pub fn evaluate(&self, condition: Option<&str>, context: &Value) -> bool {
        let Some(expression) = condition.map(str::trim).filter(|c| !c.is_empty()) else {
            return true;
        };

        match self.evaluate_bool(expression, context) {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(
                    condition = expression,
                    error = %e,
                    "condition evaluation failed, treating as false"
                );
                false
            }
        }
    }

    /// Evaluate an expression that must produce a boolean.
    pub fn evaluate_bool(&self, expression: &str, context: &Value) -> Result<bool, ConditionError> {
        if !context.is_object() {
            return Err(ConditionError::InvalidContext(
                "context must be a JSON object".to_string(),
            ));
        }

        let result = build_evaluator()
            .eval_in_context(expression, context)
            .map_err(|e| ConditionError::EvalFailed(e.to_string()))?;

        match result {
            Value::Bool(b) => Ok(b),
            other => Err(ConditionError::NotBoolean(other.to_string())),
        }
    }
}

fn build_evaluator() -> jexl_eval::Evaluator<'static> {
    jexl_eval::Evaluator::new()
        .with_transform("lower", |args: &[Value]| {
            let s = args.first().and_then(|v| v.as_str()).unwrap_or("");
            Ok(json!(s.to_lowercase()))
        })
        .with_transform("upper", |args: &[Value]| {
            let s = args.first().and_then(|v| v.as_str()).unwrap_or("");
            Ok(json!(s.to_uppercase()))
        })
        .with_transform("trim", |args: &[Value]| {
            let s = args.first().and_then(|v| v.as_str()).unwrap_or("");
            Ok(json!(s.trim()))
        })
        .with_transform("not", |args: &[Value]| {
            let val = args.first().cloned().unwrap_or(Value::Null);
            Ok(json!(!truthy(&val)))
        })
        .with_transform("contains", |args: &[Value]| {
            let found = match (args.first(), args.get(1)) {
                (Some(Value::Array(items)), Some(needle)) => items.contains(needle),
                (Some(Value::String(s)), Some(Value::String(needle))) => s.contains(needle.as_str()),
                _ => false,
            };
            Ok(json!(found))
        })
        .with_transform("startsWith", |args: &[Value]| {
            let subject = args.first().and_then(|v| v.as_str()).unwrap_or("");
            let prefix = args.get(1).and_then(|v| v.as_str()).unwrap_or("");
            Ok(json!(subject.starts_with(prefix)))
        })
        .with_transform("endsWith", |args: &[Value]| {
            let subject = args.first().and_then(|v| v.as_str()).unwrap_or("");
            let suffix = args.get(1).and_then(|v| v.as_str()).unwrap_or("");
            Ok(json!(subject.ends_with(suffix)))
        })
        .with_transform("length", |args: &[Value]| {
            let len = match args.first() {
                Some(Value::String(s)) => s.chars().count(),
                Some(Value::Array(a)) => a.len(),
                Some(Value::Object(o)) => o.len(),
                _ => 0,
            };
            Ok(json!(len as f64))
        })
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Null => false,
        Value::Number(n) => n.as_f64().unwrap_or(0.0) != 0.0,
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> Value {
        json!({
            "trigger": {"type": "donation-completed"},
            "subjects": {"member_id": "m1"},
            "payload": {"amount": 250, "fund": "Building", "tags": ["first-time"]},
            "variables": {"status": "visited"},
            "actions": {}
        })
    }

    #[test]
    fn absent_or_blank_condition_is_true() {
        let eval = ConditionEvaluator::new();
        assert!(eval.evaluate(None, &context()));
        assert!(eval.evaluate(Some(""), &context()));
        assert!(eval.evaluate(Some("   "), &context()));
    }

    #[test]
    fn equality_on_variables() {
        let eval = ConditionEvaluator::new();
        assert!(eval.evaluate(Some("variables.status == 'visited'"), &context()));
        assert!(!eval.evaluate(Some("variables.status == 'new'"), &context()));
    }

    #[test]
    fn numeric_comparison_on_payload() {
        let eval = ConditionEvaluator::new();
        assert!(eval.evaluate(Some("payload.amount > 100"), &context()));
        assert!(!eval.evaluate(Some("payload.amount >= 1000"), &context()));
        assert!(eval.evaluate(
            Some("payload.amount > 100 && subjects.member_id == 'm1'"),
            &context()
        ));
    }

    #[test]
    fn transforms() {
        let eval = ConditionEvaluator::new();
        assert!(eval.evaluate(Some("payload.fund|lower == 'building'"), &context()));
        assert!(eval.evaluate(Some("payload.fund|startsWith('Bui')"), &context()));
        assert!(eval.evaluate(Some("payload.tags|contains('first-time')"), &context()));
        assert!(eval.evaluate(Some("payload.tags|length == 1"), &context()));
    }

    #[test]
    fn malformed_condition_fails_closed() {
        let eval = ConditionEvaluator::new();
        assert!(!eval.evaluate(Some("variables.status =="), &context()));
        assert!(!eval.evaluate(Some("((("), &context()));
    }

    #[test]
    fn non_object_context_fails_closed() {
        let eval = ConditionEvaluator::new();
        assert!(eval.evaluate_bool("true", &json!([1, 2])).is_err());
        assert!(!eval.evaluate(Some("true"), &json!("string")));
    }

    #[test]
    fn non_boolean_result_fails_closed() {
        let eval = ConditionEvaluator::new();
        assert!(matches!(
            eval.evaluate_bool("payload.amount", &context()),
            Err(ConditionError::NotBoolean(_))
        ));
        assert!(!eval.evaluate(Some("payload.amount"), &context()));
        assert!(!eval.evaluate(Some("subjects.member_id"), &context()));
        assert!(eval.evaluate(Some("subjects.member_id != null"), &context()));
    }

    #[test]
    fn truthiness_coercion() {
        assert!(!truthy(&Value::Null));
        assert!(!truthy(&json!(0)));
        assert!(!truthy(&json!("")));
        assert!(truthy(&json!("x")));
        assert!(truthy(&json!([])));
    }
}
