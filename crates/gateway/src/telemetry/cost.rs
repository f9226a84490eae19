//! Cost evaluator (§4.5): each configured `llmRequestCosts` entry is either a
//! fixed token count or a CEL expression evaluated once per completed
//! request. Expressions are compiled once when a config snapshot is
//! validated and reused, read-only, for every request that snapshot serves.

use cel_interpreter::{Context, Program, Value};
use thiserror::Error;
use tracing::warn;

use crate::config::{CostDescriptor, CostKind, CostTokenKind};

enum CompiledCost {
	Fixed(CostTokenKind),
	Cel(Program),
}

/// A compiled `llmRequestCosts` list. `Program` holds no config-snapshot
/// state beyond the parsed expression, so one evaluator is shared across
/// every request the owning [`crate::config::Config`] serves.
pub struct CostEvaluator {
	entries: Vec<(String, CompiledCost)>,
}

impl std::fmt::Debug for CostEvaluator {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("CostEvaluator")
			.field("metadata_keys", &self.entries.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>())
			.finish()
	}
}

#[derive(Debug, Error)]
#[error("cost `{metadata_key}`: {reason}")]
pub struct CostCompileError {
	metadata_key: String,
	reason: String,
}

/// The variables a cost expression may reference, per the fixed set named in
/// §4.5: `{model, backend, input_tokens, cached_input_tokens, output_tokens,
/// total_tokens}`.
#[derive(Debug, Clone, Copy)]
pub struct CostVars<'a> {
	pub model: &'a str,
	pub backend: &'a str,
	pub input_tokens: u64,
	pub cached_input_tokens: u64,
	pub output_tokens: u64,
}

impl CostVars<'_> {
	fn total_tokens(&self) -> u64 {
		self.input_tokens.saturating_add(self.output_tokens)
	}
}

impl CostEvaluator {
	pub fn compile(descriptors: &[CostDescriptor]) -> Result<Self, CostCompileError> {
		let mut entries = Vec::with_capacity(descriptors.len());
		for descriptor in descriptors {
			let compiled = match &descriptor.kind {
				CostKind::Fixed(kind) => CompiledCost::Fixed(*kind),
				CostKind::Cel(expression) => {
					let program = Program::compile(expression).map_err(|err| CostCompileError {
						metadata_key: descriptor.metadata_key.clone(),
						reason: err.to_string(),
					})?;
					CompiledCost::Cel(program)
				},
			};
			entries.push((descriptor.metadata_key.clone(), compiled));
		}
		Ok(CostEvaluator { entries })
	}

	pub fn empty() -> Self {
		CostEvaluator { entries: Vec::new() }
	}

	/// Evaluates every configured cost. An entry whose CEL expression errors,
	/// resolves to a negative number, or overflows `u64` is dropped (and
	/// warned about) rather than published, per §4.5: "reported to the
	/// fronting proxy as dynamic metadata absence".
	pub fn evaluate(&self, vars: &CostVars<'_>) -> Vec<(String, u64)> {
		let mut published = Vec::with_capacity(self.entries.len());
		for (metadata_key, compiled) in &self.entries {
			let outcome = match compiled {
				CompiledCost::Fixed(kind) => Ok(fixed_value(*kind, vars)),
				CompiledCost::Cel(program) => evaluate_cel(program, vars),
			};
			match outcome {
				Ok(value) => published.push((metadata_key.clone(), value)),
				Err(reason) => warn!(metadata_key, reason = %reason, "cost expression did not publish a value"),
			}
		}
		published
	}
}

fn fixed_value(kind: CostTokenKind, vars: &CostVars<'_>) -> u64 {
	match kind {
		CostTokenKind::InputToken => vars.input_tokens,
		CostTokenKind::OutputToken => vars.output_tokens,
		CostTokenKind::CachedInputToken => vars.cached_input_tokens,
		CostTokenKind::TotalToken => vars.total_tokens(),
	}
}

fn evaluate_cel(program: &Program, vars: &CostVars<'_>) -> Result<u64, String> {
	let mut context = Context::default();
	context
		.add_variable("model", vars.model.to_string())
		.map_err(|e| e.to_string())?;
	context
		.add_variable("backend", vars.backend.to_string())
		.map_err(|e| e.to_string())?;
	context
		.add_variable("input_tokens", vars.input_tokens as i64)
		.map_err(|e| e.to_string())?;
	context
		.add_variable("cached_input_tokens", vars.cached_input_tokens as i64)
		.map_err(|e| e.to_string())?;
	context
		.add_variable("output_tokens", vars.output_tokens as i64)
		.map_err(|e| e.to_string())?;
	context
		.add_variable("total_tokens", vars.total_tokens() as i64)
		.map_err(|e| e.to_string())?;

	let result = program.execute(&context).map_err(|e| e.to_string())?;
	match result {
		Value::Int(i) if i >= 0 => Ok(i as u64),
		Value::Int(_) => Err("cost expression produced a negative result".to_string()),
		Value::UInt(u) => Ok(u),
		Value::Float(f) if f.is_finite() && f >= 0.0 => {
			if f > u64::MAX as f64 {
				Err("cost expression overflowed an unsigned integer".to_string())
			} else {
				Ok(f as u64)
			}
		},
		Value::Float(_) => Err("cost expression produced a negative result".to_string()),
		other => Err(format!("cost expression returned a non-numeric value: {other:?}")),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::CostKind;

	fn vars() -> CostVars<'static> {
		CostVars {
			model: "gpt-4o",
			backend: "openai-primary",
			input_tokens: 10,
			cached_input_tokens: 2,
			output_tokens: 5,
		}
	}

	#[test]
	fn fixed_cost_reads_the_named_counter() {
		let evaluator = CostEvaluator::compile(&[CostDescriptor {
			metadata_key: "output_count".to_string(),
			kind: CostKind::Fixed(CostTokenKind::OutputToken),
		}])
		.unwrap();
		assert_eq!(evaluator.evaluate(&vars()), vec![("output_count".to_string(), 5)]);
	}

	#[test]
	fn cel_cost_evaluates_an_expression_over_the_fixed_variables() {
		let evaluator = CostEvaluator::compile(&[CostDescriptor {
			metadata_key: "billed_units".to_string(),
			kind: CostKind::Cel("input_tokens + output_tokens * 2".to_string()),
		}])
		.unwrap();
		assert_eq!(evaluator.evaluate(&vars()), vec![("billed_units".to_string(), 20)]);
	}

	#[test]
	fn negative_cel_result_is_dropped_not_published() {
		let evaluator = CostEvaluator::compile(&[CostDescriptor {
			metadata_key: "negative".to_string(),
			kind: CostKind::Cel("0 - total_tokens".to_string()),
		}])
		.unwrap();
		assert!(evaluator.evaluate(&vars()).is_empty());
	}

	#[test]
	fn compile_rejects_an_unparseable_expression() {
		let err = CostEvaluator::compile(&[CostDescriptor {
			metadata_key: "broken".to_string(),
			kind: CostKind::Cel("(".to_string()),
		}])
		.unwrap_err();
		assert_eq!(err.metadata_key, "broken");
	}
}
