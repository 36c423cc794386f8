use serde::{Deserialize, Serialize};
use std::{collections::HashMap, env, fmt, str::FromStr};
use validator::{Validate, ValidationError};

pub const APP_NAME: &str = "APP_NAME";
pub const ENV_NAME: &str = "ENV_NAME";
pub const AWS_ACCOUNT_ID: &str = "AWS_ACCOUNT_ID";
pub const AWS_DEFAULT_REGION: &str = "AWS_DEFAULT_REGION";
pub const GIT_PROJECT_GROUP: &str = "gitProjectGroup";
pub const GIT_PROJECT_NAME: &str = "gitProjectName";
pub const STACK_SYNTHESIZER: &str = "STACK_SYNTHESIZER";

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    #[error("Required environment variable {0} is not set")]
    MissingVariable(String),

    #[error("Environment variable {name} has an unsupported value: {value}")]
    InvalidValue { name: String, value: String },

    #[error("Environment variable {0} is not valid unicode")]
    NotUnicode(String),

    #[error("Validation errors: {0}")]
    ValidationError(String),
}

/// Selects how stack templates are wrapped at synthesis time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SynthesizerKind {
    /// Adds the bootstrap version parameter and rule expected by bootstrapped environments.
    #[default]
    Default,
    /// Plain template, no bootstrap checks.
    Legacy,
}

impl FromStr for SynthesizerKind {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "default" => Ok(SynthesizerKind::Default),
            "legacy" => Ok(SynthesizerKind::Legacy),
            _ => Err(()),
        }
    }
}

impl fmt::Display for SynthesizerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SynthesizerKind::Default => write!(f, "default"),
            SynthesizerKind::Legacy => write!(f, "legacy"),
        }
    }
}

/// Fields shared by every deployable unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BaseConfig {
    #[validate(custom = "validate_name")]
    pub app_name: String,

    #[validate(custom = "validate_name")]
    pub env_name: String,

    #[validate(custom = "validate_account_id")]
    pub aws_account_id: String,

    pub aws_default_region: String,
}

/// Configuration of the CICD role stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CicdConfig {
    #[serde(flatten)]
    #[validate]
    pub base: BaseConfig,

    pub git_lab_group: String,

    pub git_lab_project: String,
}

/// Configuration of a module stack created from the template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    #[serde(flatten)]
    #[validate]
    pub base: BaseConfig,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub synthesizer: Option<SynthesizerKind>,
}

impl BaseConfig {
    pub fn from_lookup<F>(lookup: &F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        return Ok(Self {
            app_name: required(lookup, APP_NAME)?,
            env_name: required(lookup, ENV_NAME)?,
            aws_account_id: required(lookup, AWS_ACCOUNT_ID)?,
            aws_default_region: required(lookup, AWS_DEFAULT_REGION)?,
        });
    }
}

impl CicdConfig {
    pub const VARIABLES: &'static [&'static str] = &[
        APP_NAME,
        ENV_NAME,
        AWS_ACCOUNT_ID,
        AWS_DEFAULT_REGION,
        GIT_PROJECT_GROUP,
        GIT_PROJECT_NAME,
    ];

    pub fn from_lookup<F>(lookup: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Self {
            base: BaseConfig::from_lookup(&lookup)?,
            git_lab_group: required(&lookup, GIT_PROJECT_GROUP)?,
            git_lab_project: required(&lookup, GIT_PROJECT_NAME)?,
        };

        check(&config)?;
        return Ok(config);
    }
}

impl AppConfig {
    pub const VARIABLES: &'static [&'static str] = &[
        APP_NAME,
        ENV_NAME,
        AWS_ACCOUNT_ID,
        AWS_DEFAULT_REGION,
        STACK_SYNTHESIZER,
    ];

    pub fn from_lookup<F>(lookup: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base = BaseConfig::from_lookup(&lookup)?;
        let synthesizer = match lookup(STACK_SYNTHESIZER) {
            None => None,
            Some(value) if value.is_empty() => None,
            Some(value) => match value.parse::<SynthesizerKind>() {
                Ok(kind) => Some(kind),
                Err(_) => {
                    return Err(Error::InvalidValue {
                        name: STACK_SYNTHESIZER.to_string(),
                        value,
                    })
                }
            },
        };

        let config = Self { base, synthesizer };
        check(&config)?;
        return Ok(config);
    }
}

/// Reads the given variables from the process environment, once.
/// Unset variables are left out; values that are not unicode are an error.
pub fn read_env(names: &[&str]) -> Result<HashMap<String, String>, Error> {
    let mut vars = HashMap::new();
    for name in names {
        match env::var(name) {
            Ok(value) => {
                vars.insert(name.to_string(), value);
            }
            Err(env::VarError::NotPresent) => {}
            Err(env::VarError::NotUnicode(_)) => return Err(Error::NotUnicode(name.to_string())),
        }
    }

    return Ok(vars);
}

pub async fn get_cicd_config() -> Result<CicdConfig, Error> {
    let vars = read_env(CicdConfig::VARIABLES)?;
    CicdConfig::from_lookup(|name| vars.get(name).cloned())
}

pub async fn get_config() -> Result<AppConfig, Error> {
    let vars = read_env(AppConfig::VARIABLES)?;
    AppConfig::from_lookup(|name| vars.get(name).cloned())
}

fn required<F>(lookup: &F, name: &str) -> Result<String, Error>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(Error::MissingVariable(name.to_string())),
    }
}

fn check<T: Validate>(config: &T) -> Result<(), Error> {
    match config.validate() {
        Ok(_) => Ok(()),
        Err(error) => Err(Error::ValidationError(error.to_string())),
    }
}

fn validate_name(name: &str) -> Result<(), ValidationError> {
    let valid = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.');
    if !valid {
        return Err(ValidationError::new(
            "Names may only contain alphanumerics, `-`, `_` and `.`",
        ));
    }

    return Ok(());
}

fn validate_account_id(account_id: &str) -> Result<(), ValidationError> {
    if account_id.len() != 12 || !account_id.chars().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::new(
            "The AWS account id has to be exactly 12 digits",
        ));
    }

    return Ok(());
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::get_config;
    use super::read_env;
    use super::AppConfig;
    use super::CicdConfig;
    use super::Error;
    use super::SynthesizerKind;

    fn cicd_vars() -> HashMap<String, String> {
        [
            ("APP_NAME", "demo"),
            ("ENV_NAME", "prod"),
            ("AWS_ACCOUNT_ID", "123456789012"),
            ("AWS_DEFAULT_REGION", "eu-west-1"),
            ("gitProjectGroup", "platform"),
            ("gitProjectName", "demo-service"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    #[test]
    fn resolves_cicd_config_verbatim() {
        let vars = cicd_vars();
        let config = CicdConfig::from_lookup(|name| vars.get(name).cloned()).unwrap();

        assert_eq!(config.base.app_name, "demo");
        assert_eq!(config.base.env_name, "prod");
        assert_eq!(config.base.aws_account_id, "123456789012");
        assert_eq!(config.base.aws_default_region, "eu-west-1");
        assert_eq!(config.git_lab_group, "platform");
        assert_eq!(config.git_lab_project, "demo-service");
    }

    #[test]
    fn does_not_trim_values() {
        let mut vars = cicd_vars();
        vars.insert("gitProjectGroup".to_string(), " platform ".to_string());
        let config = CicdConfig::from_lookup(|name| vars.get(name).cloned()).unwrap();

        assert_eq!(config.git_lab_group, " platform ");
    }

    #[test]
    fn names_the_missing_variable() {
        for name in [
            "APP_NAME",
            "ENV_NAME",
            "AWS_ACCOUNT_ID",
            "AWS_DEFAULT_REGION",
            "gitProjectGroup",
            "gitProjectName",
        ] {
            let mut vars = cicd_vars();
            vars.remove(name);

            let result = CicdConfig::from_lookup(|key| vars.get(key).cloned());
            assert_eq!(result, Err(Error::MissingVariable(name.to_string())));
        }
    }

    #[test]
    fn empty_variable_counts_as_missing() {
        let mut vars = cicd_vars();
        vars.insert("ENV_NAME".to_string(), String::new());

        let result = CicdConfig::from_lookup(|name| vars.get(name).cloned());
        assert_eq!(result, Err(Error::MissingVariable("ENV_NAME".to_string())));
    }

    #[test]
    fn variable_names_are_case_sensitive() {
        let mut vars = cicd_vars();
        let value = vars.remove("gitProjectName").unwrap();
        vars.insert("GITPROJECTNAME".to_string(), value);

        let result = CicdConfig::from_lookup(|name| vars.get(name).cloned());
        assert_eq!(
            result,
            Err(Error::MissingVariable("gitProjectName".to_string()))
        );
    }

    #[test]
    fn rejects_malformed_account_id() {
        let mut vars = cicd_vars();
        vars.insert("AWS_ACCOUNT_ID".to_string(), "12345".to_string());

        let result = CicdConfig::from_lookup(|name| vars.get(name).cloned());
        match result.err().unwrap() {
            Error::ValidationError(_) => {}
            _ => panic!("Expected `ValidationError` error"),
        }
    }

    #[test]
    fn rejects_app_name_with_slash() {
        let mut vars = cicd_vars();
        vars.insert("APP_NAME".to_string(), "demo/app".to_string());

        let result = CicdConfig::from_lookup(|name| vars.get(name).cloned());
        match result.err().unwrap() {
            Error::ValidationError(_) => {}
            _ => panic!("Expected `ValidationError` error"),
        }
    }

    #[test]
    fn app_config_ignores_git_variables() {
        let mut vars = cicd_vars();
        vars.remove("gitProjectGroup");
        vars.remove("gitProjectName");

        let config = AppConfig::from_lookup(|name| vars.get(name).cloned()).unwrap();
        assert_eq!(config.base.app_name, "demo");
        assert_eq!(config.synthesizer, None);
    }

    #[test]
    fn app_config_reads_synthesizer() {
        let mut vars = cicd_vars();
        vars.insert("STACK_SYNTHESIZER".to_string(), "legacy".to_string());

        let config = AppConfig::from_lookup(|name| vars.get(name).cloned()).unwrap();
        assert_eq!(config.synthesizer, Some(SynthesizerKind::Legacy));
    }

    #[test]
    fn app_config_rejects_unknown_synthesizer() {
        let mut vars = cicd_vars();
        vars.insert("STACK_SYNTHESIZER".to_string(), "fancy".to_string());

        let result = AppConfig::from_lookup(|name| vars.get(name).cloned());
        assert_eq!(
            result,
            Err(Error::InvalidValue {
                name: "STACK_SYNTHESIZER".to_string(),
                value: "fancy".to_string(),
            })
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn unrelated_binary_variable_does_not_break_resolution() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        std::env::set_var("IAC_ROOTS_TEST_UNRELATED_BINARY", OsStr::from_bytes(b"\xff\xfe"));
        std::env::set_var("IAC_ROOTS_TEST_PLAIN", "plain");

        let vars = read_env(&["IAC_ROOTS_TEST_PLAIN", "IAC_ROOTS_TEST_UNSET"]).unwrap();
        assert_eq!(vars.get("IAC_ROOTS_TEST_PLAIN").map(String::as_str), Some("plain"));
        assert!(!vars.contains_key("IAC_ROOTS_TEST_UNSET"));

        match get_config().await {
            Ok(_)
            | Err(Error::MissingVariable(_))
            | Err(Error::InvalidValue { .. })
            | Err(Error::ValidationError(_)) => {}
            Err(error) => panic!("Unexpected error: {}", error),
        }
    }

    #[cfg(unix)]
    #[test]
    fn binary_variable_that_is_read_is_named() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        std::env::set_var("IAC_ROOTS_TEST_BINARY", OsStr::from_bytes(b"\xff\xfe"));

        let result = read_env(&["IAC_ROOTS_TEST_BINARY"]);
        assert_eq!(result, Err(Error::NotUnicode("IAC_ROOTS_TEST_BINARY".to_string())));
    }

    #[test]
    fn serializes_as_camel_case() {
        let vars = cicd_vars();
        let config = CicdConfig::from_lookup(|name| vars.get(name).cloned()).unwrap();
        let json = serde_json::to_value(&config).unwrap();

        assert_eq!(json["appName"], "demo");
        assert_eq!(json["gitLabGroup"], "platform");
        assert_eq!(json["awsDefaultRegion"], "eu-west-1");
    }
}
