use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;

use crate::iam::{PolicyDocument, PrincipalWithConditions};

pub const ROLE_TYPE: &str = "AWS::IAM::Role";
pub const PARAMETER_TYPE: &str = "AWS::SSM::Parameter";

#[derive(Debug, Clone, PartialEq)]
pub enum Resource {
    Role(RoleDefinition),
    StringParameter(StringParameterDefinition),
}

impl Resource {
    pub fn cfn_type(&self) -> &'static str {
        match self {
            Resource::Role(_) => ROLE_TYPE,
            Resource::StringParameter(_) => PARAMETER_TYPE,
        }
    }

    /// CloudFormation `Properties` of the resource with the given tags applied.
    pub fn properties(
        &self,
        tags: &BTreeMap<String, String>,
    ) -> Result<Value, serde_json::Error> {
        match self {
            Resource::Role(role) => serde_json::to_value(RoleProperties::new(role, tags)),
            Resource::StringParameter(parameter) => {
                serde_json::to_value(ParameterProperties::new(parameter, tags))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoleDefinition {
    pub role_name: String,
    pub description: Option<String>,
    pub assumed_by: PrincipalWithConditions,
    pub inline_policies: BTreeMap<String, PolicyDocument>,
    pub managed_policies: Vec<String>,
}

impl RoleDefinition {
    pub fn trust_policy(&self) -> PolicyDocument {
        self.assumed_by.assume_role_policy()
    }
}

/// `arn:${AWS::Partition}:iam::aws:policy/<name>`
pub fn aws_managed_policy_arn(name: &str) -> Value {
    json!({
        "Fn::Join": [
            "",
            ["arn:", { "Ref": "AWS::Partition" }, format!(":iam::aws:policy/{}", name)]
        ]
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ParameterTier {
    Standard,
    Advanced,
    #[serde(rename = "Intelligent-Tiering")]
    IntelligentTiering,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StringParameterDefinition {
    pub parameter_name: String,
    pub string_value: String,
    pub description: Option<String>,
    pub allowed_pattern: Option<String>,
    pub tier: ParameterTier,
}

#[derive(Serialize)]
struct CfnTag<'a> {
    #[serde(rename = "Key")]
    key: &'a str,
    #[serde(rename = "Value")]
    value: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct InlinePolicy<'a> {
    policy_document: &'a PolicyDocument,
    policy_name: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct RoleProperties<'a> {
    assume_role_policy_document: PolicyDocument,

    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    managed_policy_arns: Vec<Value>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    policies: Vec<InlinePolicy<'a>>,

    role_name: &'a str,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    tags: Vec<CfnTag<'a>>,
}

impl<'a> RoleProperties<'a> {
    fn new(role: &'a RoleDefinition, tags: &'a BTreeMap<String, String>) -> Self {
        Self {
            assume_role_policy_document: role.trust_policy(),
            description: role.description.as_deref(),
            managed_policy_arns: role
                .managed_policies
                .iter()
                .map(|name| aws_managed_policy_arn(name))
                .collect(),
            policies: role
                .inline_policies
                .iter()
                .map(|(name, document)| InlinePolicy {
                    policy_document: document,
                    policy_name: name,
                })
                .collect(),
            role_name: &role.role_name,
            tags: tags
                .iter()
                .map(|(key, value)| CfnTag { key, value })
                .collect(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct ParameterProperties<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    allowed_pattern: Option<&'a str>,

    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,

    name: &'a str,

    #[serde(skip_serializing_if = "no_tags")]
    tags: &'a BTreeMap<String, String>,

    tier: ParameterTier,

    #[serde(rename = "Type")]
    parameter_type: &'static str,

    value: &'a str,
}

fn no_tags(tags: &&BTreeMap<String, String>) -> bool {
    tags.is_empty()
}

impl<'a> ParameterProperties<'a> {
    fn new(parameter: &'a StringParameterDefinition, tags: &'a BTreeMap<String, String>) -> Self {
        Self {
            allowed_pattern: parameter.allowed_pattern.as_deref(),
            description: parameter.description.as_deref(),
            name: &parameter.parameter_name,
            tags,
            tier: parameter.tier,
            parameter_type: "String",
            value: &parameter.string_value,
        }
    }
}
