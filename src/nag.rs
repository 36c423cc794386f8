//! Compliance checks run over the construct graph once it is fully built.

use std::fmt;

use crate::construct::{Node, Stack};
use crate::resources::Resource;

/// A rule violation. Every finding fails synthesis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub rule_id: &'static str,
    pub path: String,
    pub message: String,
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.rule_id, self.path, self.message)
    }
}

/// Visitor applied to every node of every stack before synthesis.
pub trait Aspect: Send + Sync {
    fn visit(&self, stack: &Stack, node: &Node) -> Vec<Finding>;
}

/// Runs every aspect over every node of `stack`.
pub fn check(stack: &Stack, aspects: &[Box<dyn Aspect>]) -> Vec<Finding> {
    let mut findings = Vec::new();
    for node in stack.nodes() {
        for aspect in aspects {
            findings.extend(aspect.visit(stack, node));
        }
    }

    findings
}

/// A subset of the AWS Solutions rule pack covering the resource types used here.
#[derive(Debug, Default)]
pub struct SolutionsChecks;

impl SolutionsChecks {
    pub const IAM4: &'static str = "AwsSolutions-IAM4";
    pub const IAM5: &'static str = "AwsSolutions-IAM5";
}

impl Aspect for SolutionsChecks {
    fn visit(&self, stack: &Stack, node: &Node) -> Vec<Finding> {
        let role = match &node.resource {
            Resource::Role(role) => role,
            Resource::StringParameter(_) => return Vec::new(),
        };

        let mut findings = Vec::new();
        for policy in &role.managed_policies {
            findings.push(Finding {
                rule_id: Self::IAM4,
                path: stack.node_path(node),
                message: format!(
                    "The IAM user, role, or group uses AWS managed policies: \
                     Policy::arn:<AWS::Partition>:iam::aws:policy/{}",
                    policy
                ),
            });
        }

        for (name, document) in &role.inline_policies {
            for statement in document.statements.iter().filter(|s| s.has_wildcard()) {
                let wildcards = statement
                    .actions
                    .iter()
                    .chain(statement.resources.iter())
                    .filter(|entry| entry.contains('*'))
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", ");
                findings.push(Finding {
                    rule_id: Self::IAM5,
                        path: stack.node_path(node),
                    message: format!(
                        "The IAM entity contains wildcard permissions in policy {}: {}",
                        name, wildcards
                    ),
                });
            }
        }

        findings
    }
}
