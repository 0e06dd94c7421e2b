use crate::Value;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A declared activity parameter: a name bound to an evaluation strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityParameter {
    pub name: String,
    pub evaluator: ParameterEvaluator,
}

impl ActivityParameter {
    pub fn value(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            evaluator: ParameterEvaluator::Value(value.into()),
        }
    }

    pub fn property(
        name: impl Into<String>,
        activity: impl Into<String>,
        property: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            evaluator: ParameterEvaluator::Property {
                activity: activity.into(),
                property: property.into(),
            },
        }
    }

    pub fn list(name: impl Into<String>, items: Vec<ParameterEvaluator>) -> Self {
        Self {
            name: name.into(),
            evaluator: ParameterEvaluator::List(items),
        }
    }
}

/// How a parameter value is produced. Evaluation is always on demand,
/// never cached across calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ParameterEvaluator {
    /// A plain literal.
    Value(Value),
    /// The current value of a configuration property on another activity.
    Property { activity: String, property: String },
    /// An ordered list of nested evaluators, each resolved independently.
    List(Vec<ParameterEvaluator>),
}

/// Resolves property references during parameter evaluation. Implemented by
/// the execution context, which layers runtime overrides over the static
/// property declarations of the scheme.
pub trait PropertySource {
    fn property(&self, activity: &str, property: &str) -> Option<Value>;
}

impl ParameterEvaluator {
    pub fn evaluate(&self, source: &dyn PropertySource) -> Value {
        match self {
            ParameterEvaluator::Value(v) => v.clone(),
            ParameterEvaluator::Property { activity, property } => {
                match source.property(activity, property) {
                    Some(v) => v,
                    None => {
                        tracing::warn!(activity, property, "unresolved property reference");
                        Value::Null
                    }
                }
            }
            ParameterEvaluator::List(items) => {
                Value::Array(items.iter().map(|e| e.evaluate(source)).collect())
            }
        }
    }
}

/// Build the effective parameter set for one execution: the activity's own
/// declared parameters first, then each override replacing or adding by name.
pub fn effective_parameters(
    declared: &[ActivityParameter],
    overrides: &HashMap<String, Value>,
    source: &dyn PropertySource,
) -> HashMap<String, Value> {
    let mut set: HashMap<String, Value> = declared
        .iter()
        .map(|p| (p.name.clone(), p.evaluator.evaluate(source)))
        .collect();
    for (name, value) in overrides {
        set.insert(name.clone(), value.clone());
    }
    set
}
