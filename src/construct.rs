//! In-memory construct graph: an app holds stacks, a stack holds resource nodes.
//! Nothing here talks to AWS; the graph is built once and then synthesized.

use md5::{Digest, Md5};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};

use crate::config::SynthesizerKind;
use crate::nag::Aspect;
use crate::resources::Resource;

/// Node ids hidden from both the logical id and its hash.
const HIDDEN_ID: &str = "Default";
/// Node ids hidden from the human readable part of a logical id only.
const HIDDEN_FROM_HUMAN_ID: &str = "Resource";
const MAX_ID_LEN: usize = 255;
const MAX_HUMAN_LEN: usize = 240;
const HASH_LEN: usize = 8;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    #[error("Construct path {0} is already taken")]
    DuplicatePath(String),

    #[error("Construct path of stack {0} has no visible component")]
    EmptyPath(String),

    #[error("Stack {0} is already part of the app")]
    DuplicateStack(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment {
    pub account: String,
    pub region: String,
}

impl Environment {
    pub fn new(account: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            region: region.into(),
        }
    }

    pub fn uri(&self) -> String {
        format!("aws://{}/{}", self.account, self.region)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// Path relative to the owning stack.
    pub path: Vec<String>,
    pub logical_id: String,
    pub resource: Resource,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Output {
    pub value: Value,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stack {
    pub id: String,
    pub env: Environment,
    pub synthesizer: SynthesizerKind,
    pub description: Option<String>,
    nodes: Vec<Node>,
    outputs: BTreeMap<String, Output>,
}

impl Stack {
    pub fn new(id: impl Into<String>, env: Environment, synthesizer: SynthesizerKind) -> Self {
        Self {
            id: id.into(),
            env,
            synthesizer,
            description: None,
            nodes: Vec::new(),
            outputs: BTreeMap::new(),
        }
    }

    /// Adds a resource under `path` and returns its logical id.
    /// A path made only of hidden components has no logical id and is rejected.
    pub fn add_resource(&mut self, path: &[&str], resource: Resource) -> Result<String, Error> {
        if path.iter().all(|component| *component == HIDDEN_ID) {
            return Err(Error::EmptyPath(self.id.clone()));
        }

        let path: Vec<String> = path.iter().map(|c| c.to_string()).collect();
        if self.nodes.iter().any(|node| node.path == path) {
            return Err(Error::DuplicatePath(format!("{}/{}", self.id, path.join("/"))));
        }

        let logical_id = make_unique_id(&path);
        self.nodes.push(Node {
            path,
            logical_id: logical_id.clone(),
            resource,
        });

        return Ok(logical_id);
    }

    pub fn add_output(&mut self, name: &str, value: Value, description: Option<String>) {
        self.outputs
            .insert(name.to_string(), Output { value, description });
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn outputs(&self) -> &BTreeMap<String, Output> {
        &self.outputs
    }

    pub fn node_path(&self, node: &Node) -> String {
        format!("{}/{}", self.id, node.path.join("/"))
    }
}

pub struct App {
    stacks: Vec<Stack>,
    tags: BTreeMap<String, String>,
    aspects: Vec<Box<dyn Aspect>>,
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

impl App {
    pub fn new() -> Self {
        Self {
            stacks: Vec::new(),
            tags: BTreeMap::new(),
            aspects: Vec::new(),
        }
    }

    pub fn add_stack(&mut self, stack: Stack) -> Result<(), Error> {
        let ids: HashSet<&str> = self.stacks.iter().map(|s| s.id.as_str()).collect();
        if ids.contains(stack.id.as_str()) {
            return Err(Error::DuplicateStack(stack.id));
        }

        self.stacks.push(stack);
        return Ok(());
    }

    /// Tags every taggable resource of every stack, and the stacks themselves on deploy.
    pub fn add_tag(&mut self, key: &str, value: &str) {
        self.tags.insert(key.to_string(), value.to_string());
    }

    pub fn add_aspect(&mut self, aspect: Box<dyn Aspect>) {
        self.aspects.push(aspect);
    }

    pub fn stacks(&self) -> &[Stack] {
        &self.stacks
    }

    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    pub fn aspects(&self) -> &[Box<dyn Aspect>] {
        &self.aspects
    }
}

/// Logical id of a node from its stack-relative path.
pub fn make_unique_id(components: &[String]) -> String {
    let components: Vec<&str> = components
        .iter()
        .map(|c| c.as_str())
        .filter(|c| *c != HIDDEN_ID)
        .collect();

    if components.len() == 1 {
        let candidate = remove_non_alphanumeric(components[0]);
        if candidate.len() <= MAX_ID_LEN {
            return candidate;
        }
    }

    let digest = Md5::digest(components.join("/").as_bytes());
    let hash = hex::encode(digest)[..HASH_LEN].to_ascii_uppercase();

    let mut kept: Vec<&str> = Vec::new();
    for component in components.iter().copied() {
        match kept.last() {
            Some(last) if last.ends_with(component) => {}
            _ => kept.push(component),
        }
    }

    let mut human: String = kept
        .into_iter()
        .filter(|c| *c != HIDDEN_FROM_HUMAN_ID)
        .map(remove_non_alphanumeric)
        .collect();
    human.truncate(MAX_HUMAN_LEN);

    return format!("{}{}", human, hash);
}

fn remove_non_alphanumeric(s: &str) -> String {
    s.chars().filter(|c| c.is_ascii_alphanumeric()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::{ParameterTier, StringParameterDefinition};

    fn parameter() -> Resource {
        Resource::StringParameter(StringParameterDefinition {
            parameter_name: "/a/b/c".to_string(),
            string_value: "v".to_string(),
            description: None,
            allowed_pattern: None,
            tier: ParameterTier::Standard,
        })
    }

    fn path(components: &[&str]) -> Vec<String> {
        components.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn single_component_is_used_verbatim() {
        assert_eq!(make_unique_id(&path(&["my-bucket"])), "mybucket");
        assert_eq!(make_unique_id(&path(&["Default", "Queue"])), "Queue");
    }

    #[test]
    fn single_component_up_to_the_id_limit_has_no_hash() {
        let long = "a".repeat(250);
        assert_eq!(make_unique_id(&path(&[long.as_str()])), long);

        let too_long = "a".repeat(MAX_ID_LEN + 1);
        let id = make_unique_id(&path(&[too_long.as_str()]));
        assert_eq!(id.len(), MAX_HUMAN_LEN + HASH_LEN);
    }

    #[test]
    fn rejects_paths_without_visible_components() {
        let mut stack = Stack::new("s", Environment::new("1", "r"), SynthesizerKind::Default);

        assert_eq!(
            stack.add_resource(&["Default"], parameter()),
            Err(Error::EmptyPath("s".to_string()))
        );
        assert_eq!(
            stack.add_resource(&[], parameter()),
            Err(Error::EmptyPath("s".to_string()))
        );
        assert!(stack.nodes().is_empty());
    }

    #[test]
    fn nested_components_get_a_hash_suffix() {
        let id = make_unique_id(&path(&["Parameter", "Resource"]));

        assert!(id.starts_with("Parameter"));
        assert_eq!(id.len(), "Parameter".len() + HASH_LEN);
        assert!(id["Parameter".len()..]
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
    }

    #[test]
    fn hash_depends_on_the_full_path() {
        let a = make_unique_id(&path(&["a-b", "Resource"]));
        let b = make_unique_id(&path(&["ab", "Resource"]));

        assert_eq!(&a[..2], "ab");
        assert_eq!(&b[..2], "ab");
        assert_ne!(a, b);
    }

    #[test]
    fn consecutive_duplicates_are_dropped_from_the_human_part() {
        let id = make_unique_id(&path(&["Role", "Role", "Resource"]));
        assert!(id.starts_with("Role"));
        assert!(!id.starts_with("RoleRole"));
    }

    #[test]
    fn rejects_duplicate_paths() {
        let mut stack = Stack::new("s", Environment::new("1", "r"), SynthesizerKind::Default);
        stack.add_resource(&["Parameter", "Resource"], parameter()).unwrap();

        let result = stack.add_resource(&["Parameter", "Resource"], parameter());
        assert_eq!(
            result,
            Err(Error::DuplicatePath("s/Parameter/Resource".to_string()))
        );
    }

    #[test]
    fn rejects_duplicate_stacks() {
        let mut app = App::new();
        let env = Environment::new("1", "r");
        app.add_stack(Stack::new("s", env.clone(), SynthesizerKind::Default)).unwrap();

        let result = app.add_stack(Stack::new("s", env, SynthesizerKind::Legacy));
        assert_eq!(result, Err(Error::DuplicateStack("s".to_string())));
    }

    #[test]
    fn environment_uri() {
        assert_eq!(
            Environment::new("123456789012", "eu-west-1").uri(),
            "aws://123456789012/eu-west-1"
        );
    }
}
