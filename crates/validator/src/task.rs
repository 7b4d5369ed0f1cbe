//! Task definitions: parameter schemas, prompt templates and generated instances.

use quest_types::{ContractKey, ContractRegistry};
use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

use crate::{
    engine::Validator,
    generator::ParameterGenerator,
    params::Params,
    registry::{parse_task, TaskId},
    ValidatorError,
};

/// Static definition of one task as shipped in the task catalog.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Task id, also the validator key.
    pub id: String,
    /// Free-form difficulty label.
    #[serde(default)]
    pub difficulty: String,
    /// Longer description shown in naive mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Prompt templates with `{param}` placeholders; one is picked per generation.
    #[serde(default)]
    pub natural_language_templates: Vec<String>,
    /// Declared parameters, generated in name order.
    #[serde(default)]
    pub parameters: BTreeMap<String, ParamSchema>,
    /// Whether the task needs fixture contracts deployed first.
    #[serde(default)]
    pub requires_contract: bool,
}

impl TaskSpec {
    /// Registered task id.
    pub fn task_id(&self) -> Result<TaskId, ValidatorError> {
        parse_task(&self.id)
    }

    /// Parameters resolved from the deployment environment.
    pub fn env_parameters(&self) -> impl Iterator<Item = (&str, &ParamSchema)> {
        self.parameters
            .iter()
            .filter(|(_, schema)| schema.generation.needs_env())
            .map(|(name, schema)| (name.as_str(), schema))
    }

    /// Renders template `index` with `params`.
    pub fn render(&self, index: usize, params: &Params) -> Result<String, ValidatorError> {
        let template =
            self.natural_language_templates
                .get(index)
                .ok_or_else(|| ValidatorError::Generation {
                    param: "natural_language_templates".into(),
                    reason: format!("no template at index {index}"),
                })?;
        render_prompt(template, params, self.parameters.keys().map(String::as_str))
    }
}

/// JSON type of a generated parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    /// Hex address.
    Address,
    /// Human decimal amount.
    Number,
    /// Whole number.
    Integer,
    /// Text.
    String,
    /// Flag.
    Boolean,
}

/// Declared parameter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParamSchema {
    /// Value type.
    #[serde(rename = "type")]
    pub kind: ParamType,
    /// How the value is produced.
    #[serde(default)]
    pub generation: GenerationRule,
    /// Human description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Display unit such as `BNB`; never rendered into prompts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

/// Generation method, tagged by `method`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum GenerationRule {
    /// Always `value`.
    Fixed {
        /// The value.
        #[serde(default)]
        value: Value,
    },
    /// Random within type specific bounds.
    Random {
        /// Lower bound, numbers and integers.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min: Option<Value>,
        /// Upper bound, numbers and integers.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max: Option<Value>,
        /// Fractional digits kept, numbers.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        decimals: Option<u32>,
        /// Length, strings.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        length: Option<usize>,
        /// Named charset or literal characters, strings.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        charset: Option<String>,
        /// Chance of `true`, booleans.
        #[serde(
            default,
            skip_serializing_if = "Option::is_none",
            deserialize_with = "deserialize_opt_f64"
        )]
        probability: Option<f64>,
    },
    /// Uniform pick from `values`.
    FromList {
        /// Candidates.
        #[serde(alias = "addresses")]
        values: Vec<Value>,
    },
    /// Address of a deployed contract or account.
    FromEnv {
        /// Registry slot.
        env_key: ContractKey,
    },
    /// The signing account itself.
    AgentAddress,
}

/// Tagged content is buffered before the variant is known, and buffered floats only
/// survive as [`Value`]s.
fn deserialize_opt_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_f64()
            .map(Some)
            .ok_or_else(|| de::Error::custom(format!("expected a number, got {value}"))),
    }
}

impl Default for GenerationRule {
    fn default() -> Self {
        Self::Random {
            min: None,
            max: None,
            decimals: None,
            length: None,
            charset: None,
            probability: None,
        }
    }
}

impl GenerationRule {
    /// Whether the value depends on the deployment environment.
    pub const fn needs_env(&self) -> bool {
        matches!(self, Self::FromEnv { .. } | Self::AgentAddress)
    }
}

/// Prompt text of one parameter value. Strings are bare, booleans lower-case.
pub fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Substitutes `{name}` placeholders in `template`.
///
/// Fails if a placeholder naming one of the `declared` parameters survives, i.e. the
/// parameter was declared but not generated.
pub fn render_prompt<'a>(
    template: &str,
    params: &Params,
    declared: impl IntoIterator<Item = &'a str>,
) -> Result<String, ValidatorError> {
    let mut rendered = template.to_string();
    for (name, value) in params {
        rendered = rendered.replace(&format!("{{{name}}}"), &format_value(value));
    }
    for name in declared {
        if rendered.contains(&format!("{{{name}}}")) {
            return Err(ValidatorError::UnresolvedPlaceholder(name.to_string()));
        }
    }
    Ok(rendered)
}

/// A task instance: parameters drawn and a prompt rendered.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GeneratedTask {
    /// Definition the instance was drawn from.
    pub spec: TaskSpec,
    /// Generated parameters.
    pub params: Params,
    /// Template the prompt was rendered from.
    pub template_index: usize,
    /// Rendered prompt.
    pub prompt: String,
}

impl GeneratedTask {
    /// Draws parameters and picks a template.
    ///
    /// Without `env`, environment parameters get placeholder addresses until
    /// [`Self::refresh_environment`] is called.
    pub fn generate(
        spec: TaskSpec,
        generator: &mut ParameterGenerator,
        env: Option<&ContractRegistry>,
    ) -> Result<Self, ValidatorError> {
        let params = generator.generate(&spec, env)?;
        let template_index = generator.pick_template(&spec)?;
        let prompt = spec.render(template_index, &params)?;
        debug!(task = %spec.id, template_index, "generated task");
        Ok(Self { spec, params, template_index, prompt })
    }

    /// Re-resolves environment parameters once contracts are deployed and re-renders the
    /// prompt from the same template. Everything else is left as drawn.
    pub fn refresh_environment(
        &mut self,
        generator: &mut ParameterGenerator,
        env: &ContractRegistry,
    ) -> Result<(), ValidatorError> {
        generator.regenerate_env(&self.spec, &mut self.params, env)?;
        self.prompt = self.spec.render(self.template_index, &self.params)?;
        Ok(())
    }

    /// Validator for this instance.
    pub fn validator(&self) -> Result<Box<dyn Validator>, ValidatorError> {
        self.spec.task_id()?.build(&self.params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn transfer_spec() -> TaskSpec {
        serde_json::from_value(json!({
            "id": "bnb_transfer_basic",
            "difficulty": "basic",
            "natural_language_templates": [
                "Send {amount} BNB to {to_address}",
                "Transfer {amount} BNB to address {to_address}"
            ],
            "parameters": {
                "amount": {
                    "type": "number",
                    "unit": "BNB",
                    "generation": {"method": "random", "min": 0.001, "max": 0.1, "decimals": 3}
                },
                "to_address": {"type": "address", "generation": {"method": "random"}},
                "from_address": {"type": "address", "generation": {"method": "agent_address"}}
            }
        }))
        .unwrap()
    }

    #[test]
    fn spec_shape() {
        let spec = transfer_spec();
        assert_eq!(spec.task_id(), Ok(TaskId::BnbTransferBasic));
        assert_eq!(spec.parameters["amount"].kind, ParamType::Number);
        assert!(!spec.requires_contract);
        let env: Vec<_> = spec.env_parameters().map(|(name, _)| name).collect();
        assert_eq!(env, ["from_address"]);
    }

    #[test]
    fn missing_method_defaults_to_random() {
        let schema: ParamSchema = serde_json::from_value(json!({"type": "integer"})).unwrap();
        assert_eq!(schema.generation, GenerationRule::default());
        let schema: ParamSchema = serde_json::from_value(json!({
            "type": "address",
            "generation": {"method": "from_list", "addresses": ["0x01"]}
        }))
        .unwrap();
        assert_eq!(schema.generation, GenerationRule::FromList { values: vec![json!("0x01")] });
    }

    #[test]
    fn renders_placeholders() {
        let Value::Object(params) = json!({"amount": 0.05, "to_address": "0xabc", "flag": true}) else {
            unreachable!()
        };
        let rendered = render_prompt("Send {amount} to {to_address} ({flag})", &params, ["amount"]).unwrap();
        assert_eq!(rendered, "Send 0.05 to 0xabc (true)");
    }

    #[test]
    fn unresolved_declared_placeholder() {
        let params = Params::new();
        assert_eq!(
            render_prompt("Send {amount} BNB", &params, ["amount"]),
            Err(ValidatorError::UnresolvedPlaceholder("amount".into()))
        );
        // Braces that name no parameter are prose.
        assert_eq!(render_prompt("Return {balance}", &params, ["amount"]).unwrap(), "Return {balance}");
    }
}
