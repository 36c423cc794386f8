use serde_json::json;
use std::{fmt, str::FromStr};

use crate::config::AppConfig;
use crate::construct::{self, Environment, Stack};
use crate::resources::{ParameterTier, Resource, StringParameterDefinition};

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    #[error("Module name {0} has to be spinal-case, e.g. `user-service`")]
    InvalidModuleName(String),

    #[error(transparent)]
    Construct(#[from] construct::Error),
}

/// Name of an infrastructure module in spinal-case, e.g. `user-service`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModuleName(String);

impl ModuleName {
    pub fn spinal_case(&self) -> &str {
        &self.0
    }

    /// `user-service` -> `UserService`
    pub fn camel_case(&self) -> String {
        self.0
            .split('-')
            .map(|segment| {
                let mut chars = segment.chars();
                match chars.next() {
                    Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                    None => String::new(),
                }
            })
            .collect()
    }
}

impl FromStr for ModuleName {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let valid = !name.is_empty()
            && name.split('-').all(|segment| {
                !segment.is_empty()
                    && segment
                        .chars()
                        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
            })
            && name.starts_with(|c: char| c.is_ascii_lowercase());
        if !valid {
            return Err(Error::InvalidModuleName(name.to_string()));
        }

        return Ok(Self(name.to_string()));
    }
}

impl fmt::Display for ModuleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Starting point for a new infrastructure module: a single example parameter
/// meant to be replaced with the module's own resources.
pub struct ModuleStack;

impl ModuleStack {
    pub const PARAMETER_SCOPE: &'static str = "Parameter";

    pub fn stack_id(config: &AppConfig, module: &ModuleName) -> String {
        format!(
            "{}-{}-{}",
            config.base.app_name,
            config.base.env_name,
            module.spinal_case()
        )
    }

    pub fn parameter_name(config: &AppConfig, module: &ModuleName) -> String {
        format!(
            "/{}/{}/cdk-{}-param",
            config.base.app_name,
            config.base.env_name,
            module.spinal_case()
        )
    }

    pub fn build(config: &AppConfig, module: &ModuleName) -> Result<Stack, Error> {
        let env = Environment::new(
            config.base.aws_account_id.clone(),
            config.base.aws_default_region.clone(),
        );
        let mut stack = Stack::new(
            Self::stack_id(config, module),
            env,
            config.synthesizer.unwrap_or_default(),
        );
        stack.description = Some(format!("{} module stack", module.camel_case()));

        let parameter = StringParameterDefinition {
            parameter_name: Self::parameter_name(config, module),
            string_value: "bar".to_string(),
            description: Some("The value Foo".to_string()),
            allowed_pattern: Some(".*".to_string()),
            tier: ParameterTier::Standard,
        };
        let logical_id = stack.add_resource(
            &[Self::PARAMETER_SCOPE, "Resource"],
            Resource::StringParameter(parameter),
        )?;

        stack.add_output("ParameterName", json!({ "Ref": logical_id }), None);

        tracing::debug!(stack = %stack.id, module = %module, "built module stack");
        return Ok(stack);
    }
}
