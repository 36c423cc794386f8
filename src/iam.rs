//! IAM policy documents as they are declared in templates, plus a small local
//! evaluator used to check what a declared document actually permits.

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use std::collections::BTreeMap;

pub const POLICY_VERSION: &str = "2012-10-17";
pub const PRINCIPAL_TAG_PREFIX: &str = "aws:PrincipalTag/";

/// Condition operator -> condition key -> expected value.
pub type Conditions = BTreeMap<String, BTreeMap<String, String>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Effect {
    Allow,
    Deny,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArnPrincipal {
    pub arn: String,
}

impl ArnPrincipal {
    pub fn new(arn: impl Into<String>) -> Self {
        Self { arn: arn.into() }
    }

    pub fn with_conditions(self, conditions: Conditions) -> PrincipalWithConditions {
        PrincipalWithConditions {
            principal: self,
            conditions,
            session_tags: false,
        }
    }
}

impl Serialize for ArnPrincipal {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry("AWS", &self.arn)?;
        map.end()
    }
}

/// A principal that may assume a role only while the conditions hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalWithConditions {
    pub principal: ArnPrincipal,
    pub conditions: Conditions,
    pub session_tags: bool,
}

impl PrincipalWithConditions {
    /// Lets the assumed-role session carry over the caller's tags.
    pub fn with_session_tags(mut self) -> Self {
        self.session_tags = true;
        self
    }

    /// The trust policy a role assumed by this principal gets.
    pub fn assume_role_policy(&self) -> PolicyDocument {
        let mut actions = vec!["sts:AssumeRole".to_string()];
        if self.session_tags {
            actions.push("sts:TagSession".to_string());
        }

        PolicyDocument::new(vec![PolicyStatement {
            effect: Effect::Allow,
            actions,
            resources: Vec::new(),
            principal: Some(self.principal.clone()),
            conditions: self.conditions.clone(),
        }])
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyStatement {
    #[serde(rename = "Action", serialize_with = "one_or_many")]
    pub actions: Vec<String>,

    #[serde(rename = "Condition", skip_serializing_if = "BTreeMap::is_empty")]
    pub conditions: Conditions,

    pub effect: Effect,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub principal: Option<ArnPrincipal>,

    #[serde(
        rename = "Resource",
        serialize_with = "one_or_many",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub resources: Vec<String>,
}

impl PolicyStatement {
    pub fn allow(actions: &[&str], resources: &[String]) -> Self {
        Self {
            effect: Effect::Allow,
            actions: actions.iter().map(|a| a.to_string()).collect(),
            resources: resources.to_vec(),
            principal: None,
            conditions: Conditions::new(),
        }
    }

    pub fn has_wildcard(&self) -> bool {
        self.actions.iter().any(|a| a.contains('*'))
            || self.resources.iter().any(|r| r.contains('*'))
    }

    fn applies_to(&self, request: &RequestContext<'_>) -> bool {
        let action_matches = self
            .actions
            .iter()
            .any(|pattern| {
                wildcard_match(
                    &pattern.to_ascii_lowercase(),
                    &request.action.to_ascii_lowercase(),
                )
            });
        if !action_matches {
            return false;
        }

        if let Some(principal) = &self.principal {
            match request.principal_arn {
                Some(arn) if wildcard_match(&principal.arn, arn) => {}
                _ => return false,
            }
        }

        if !self.resources.is_empty() {
            match request.resource {
                Some(resource) if self.resources.iter().any(|p| wildcard_match(p, resource)) => {}
                _ => return false,
            }
        }

        return conditions_hold(&self.conditions, request);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyDocument {
    #[serde(rename = "Statement")]
    pub statements: Vec<PolicyStatement>,

    pub version: &'static str,
}

impl PolicyDocument {
    pub fn new(statements: Vec<PolicyStatement>) -> Self {
        Self {
            statements,
            version: POLICY_VERSION,
        }
    }

    pub fn evaluate(&self, request: &RequestContext<'_>) -> Decision {
        let mut decision = Decision::ImplicitDeny;
        for statement in self.statements.iter().filter(|s| s.applies_to(request)) {
            match statement.effect {
                Effect::Deny => return Decision::ExplicitDeny,
                Effect::Allow => decision = Decision::Allow,
            }
        }

        return decision;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    ExplicitDeny,
    ImplicitDeny,
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        *self == Decision::Allow
    }
}

/// The parts of an API call a policy is evaluated against.
#[derive(Debug, Clone, Default)]
pub struct RequestContext<'a> {
    pub action: &'a str,
    pub principal_arn: Option<&'a str>,
    pub resource: Option<&'a str>,
    pub principal_tags: BTreeMap<String, String>,
}

impl<'a> RequestContext<'a> {
    pub fn new(action: &'a str) -> Self {
        Self {
            action,
            ..Default::default()
        }
    }

    pub fn principal(mut self, arn: &'a str) -> Self {
        self.principal_arn = Some(arn);
        self
    }

    pub fn resource(mut self, resource: &'a str) -> Self {
        self.resource = Some(resource);
        self
    }

    pub fn tag(mut self, key: &str, value: &str) -> Self {
        self.principal_tags.insert(key.to_string(), value.to_string());
        self
    }
}

fn conditions_hold(conditions: &Conditions, request: &RequestContext<'_>) -> bool {
    conditions.iter().all(|(operator, entries)| {
        entries.iter().all(|(key, expected)| {
            let actual = match key.strip_prefix(PRINCIPAL_TAG_PREFIX) {
                Some(tag) => request.principal_tags.get(tag),
                None => None,
            };
            match (operator.as_str(), actual) {
                ("StringEquals", Some(actual)) => actual == expected,
                ("StringLike", Some(actual)) => wildcard_match(expected, actual),
                _ => false,
            }
        })
    })
}

/// IAM style glob: `*` matches any run of characters, `?` exactly one.
pub fn wildcard_match(pattern: &str, value: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let value: Vec<char> = value.chars().collect();

    let (mut p, mut v) = (0, 0);
    let mut star: Option<usize> = None;
    let mut resume = 0;

    while v < value.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == value[v]) {
            p += 1;
            v += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            star = Some(p);
            p += 1;
            resume = v;
        } else if let Some(star_at) = star {
            p = star_at + 1;
            resume += 1;
            v = resume;
        } else {
            return false;
        }
    }

    while p < pattern.len() && pattern[p] == '*' {
        p += 1;
    }

    return p == pattern.len();
}

#[allow(clippy::ptr_arg)]
fn one_or_many<S: Serializer>(values: &Vec<String>, serializer: S) -> Result<S::Ok, S::Error> {
    match values.as_slice() {
        [single] => serializer.serialize_str(single),
        _ => values.serialize(serializer),
    }
}
