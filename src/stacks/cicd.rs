use serde_json::json;
use std::collections::BTreeMap;

use crate::config::{CicdConfig, SynthesizerKind};
use crate::construct::{self, Environment, Stack};
use crate::iam::{ArnPrincipal, Conditions, PolicyDocument, PolicyStatement, PRINCIPAL_TAG_PREFIX};
use crate::resources::{Resource, RoleDefinition};

/// AWS private GitLab runners.
pub const GITLAB_RUNNER_ROLE_ARN: &str = "arn:aws:iam::979517299116:role/gitlab-runners-prod";

pub const GROUP_TAG: &str = "GitLab:Group";
pub const PROJECT_TAG: &str = "GitLab:Project";
pub const POWER_USER_POLICY: &str = "PowerUserAccess";

/// IAM role the GitLab pipeline assumes to deploy the application.
#[derive(Debug, Clone, PartialEq)]
pub struct GitLabIamRole {
    pub role: RoleDefinition,
}

impl GitLabIamRole {
    pub fn new(config: &CicdConfig, assume_role_arn: &str) -> Self {
        let base = &config.base;

        let inline_policy = PolicyDocument::new(vec![
            PolicyStatement::allow(
                &["sts:AssumeRole", "sts:TagSession", "iam:PassRole"],
                &[format!("arn:aws:iam::{}:role/cdk-*", base.aws_account_id)],
            ),
            PolicyStatement::allow(
                &["ssm:*"],
                &[format!(
                    "arn:aws:ssm:*:{}:parameter/{}-*",
                    base.aws_account_id, base.app_name
                )],
            ),
        ]);

        let mut tag_equals = BTreeMap::new();
        tag_equals.insert(
            format!("{}{}", PRINCIPAL_TAG_PREFIX, GROUP_TAG),
            config.git_lab_group.clone(),
        );
        tag_equals.insert(
            format!("{}{}", PRINCIPAL_TAG_PREFIX, PROJECT_TAG),
            config.git_lab_project.clone(),
        );
        let mut conditions = Conditions::new();
        conditions.insert("StringEquals".to_string(), tag_equals);

        let mut inline_policies = BTreeMap::new();
        inline_policies.insert(
            format!("{}-{}-gitlab-policy", base.app_name, base.env_name),
            inline_policy,
        );

        let role = RoleDefinition {
            role_name: Self::role_name(config),
            description: Some(format!("CICD role for use by the {} project", base.app_name)),
            assumed_by: ArnPrincipal::new(assume_role_arn)
                .with_conditions(conditions)
                .with_session_tags(),
            inline_policies,
            managed_policies: vec![POWER_USER_POLICY.to_string()],
        };

        Self { role }
    }

    pub fn role_name(config: &CicdConfig) -> String {
        format!("{}-{}-cicd-role", config.base.app_name, config.base.env_name)
    }
}

pub struct CicdStack;

impl CicdStack {
    pub const ROLE_SCOPE: &'static str = "gitlab-iam-role";

    pub fn stack_id(config: &CicdConfig) -> String {
        format!("{}-{}-cicd", config.base.app_name, config.base.env_name)
    }

    pub fn build(config: &CicdConfig) -> Result<Stack, construct::Error> {
        let env = Environment::new(
            config.base.aws_account_id.clone(),
            config.base.aws_default_region.clone(),
        );
        let mut stack = Stack::new(Self::stack_id(config), env, SynthesizerKind::Default);

        let role_name = GitLabIamRole::role_name(config);
        let construct = GitLabIamRole::new(config, GITLAB_RUNNER_ROLE_ARN);
        let logical_id = stack.add_resource(
            &[Self::ROLE_SCOPE, role_name.as_str(), "Resource"],
            Resource::Role(construct.role),
        )?;

        stack.add_output(
            "RoleArn",
            json!({ "Fn::GetAtt": [logical_id, "Arn"] }),
            Some(format!("ARN of {}", role_name)),
        );

        tracing::debug!(stack = %stack.id, resources = stack.nodes().len(), "built cicd stack");
        return Ok(stack);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BaseConfig;
    use crate::iam::{Decision, RequestContext};

    fn config() -> CicdConfig {
        CicdConfig {
            base: BaseConfig {
                app_name: "demo".to_string(),
                env_name: "prod".to_string(),
                aws_account_id: "123456789012".to_string(),
                aws_default_region: "eu-west-1".to_string(),
            },
            git_lab_group: "platform".to_string(),
            git_lab_project: "demo-service".to_string(),
        }
    }

    fn role() -> RoleDefinition {
        GitLabIamRole::new(&config(), GITLAB_RUNNER_ROLE_ARN).role
    }

    fn assume(group: &str, project: &str) -> Decision {
        role().trust_policy().evaluate(
            &RequestContext::new("sts:AssumeRole")
                .principal(GITLAB_RUNNER_ROLE_ARN)
                .tag(GROUP_TAG, group)
                .tag(PROJECT_TAG, project),
        )
    }

    #[test]
    fn names_follow_app_and_env() {
        let role = role();

        assert_eq!(role.role_name, "demo-prod-cicd-role");
        assert_eq!(CicdStack::stack_id(&config()), "demo-prod-cicd");
        assert!(role.inline_policies.contains_key("demo-prod-gitlab-policy"));
        assert_eq!(
            role.description.as_deref(),
            Some("CICD role for use by the demo project")
        );
    }

    #[test]
    fn trust_requires_both_tags() {
        assert_eq!(assume("platform", "demo-service"), Decision::Allow);
        assert_eq!(assume("platform", "other"), Decision::ImplicitDeny);
        assert_eq!(assume("other", "demo-service"), Decision::ImplicitDeny);
        assert_eq!(assume("other", "other"), Decision::ImplicitDeny);
    }

    #[test]
    fn trust_is_limited_to_the_runner_role() {
        let request = RequestContext::new("sts:AssumeRole")
            .principal("arn:aws:iam::979517299116:role/gitlab-runners-dev")
            .tag(GROUP_TAG, "platform")
            .tag(PROJECT_TAG, "demo-service");

        assert!(!role().trust_policy().evaluate(&request).is_allowed());
    }

    #[test]
    fn trust_forwards_session_tags() {
        let request = RequestContext::new("sts:TagSession")
            .principal(GITLAB_RUNNER_ROLE_ARN)
            .tag(GROUP_TAG, "platform")
            .tag(PROJECT_TAG, "demo-service");

        assert!(role().trust_policy().evaluate(&request).is_allowed());
    }

    #[test]
    fn ssm_access_is_scoped_to_the_app_prefix() {
        let policy = role().inline_policies["demo-prod-gitlab-policy"].clone();
        let put =
            |arn: &str| policy.evaluate(&RequestContext::new("ssm:PutParameter").resource(arn));

        assert!(put("arn:aws:ssm:eu-west-1:123456789012:parameter/demo-prod-db-url").is_allowed());
        assert!(
            !put("arn:aws:ssm:eu-west-1:123456789012:parameter/other-prod-db-url").is_allowed()
        );
        assert!(!put("arn:aws:ssm:eu-west-1:123456789012:parameter/demoapp").is_allowed());
        assert!(!put("arn:aws:ssm:eu-west-1:210987654321:parameter/demo-prod-db-url").is_allowed());
    }

    #[test]
    fn can_pass_only_bootstrap_roles() {
        let policy = role().inline_policies["demo-prod-gitlab-policy"].clone();
        let pass = |arn: &str| policy.evaluate(&RequestContext::new("iam:PassRole").resource(arn));

        let deploy_role =
            "arn:aws:iam::123456789012:role/cdk-hnb659fds-deploy-role-123456789012-eu-west-1";
        assert!(pass(deploy_role).is_allowed());
        assert!(!pass("arn:aws:iam::123456789012:role/admin").is_allowed());
    }

    #[test]
    fn attaches_power_user_access() {
        assert_eq!(role().managed_policies, vec!["PowerUserAccess".to_string()]);
    }

    #[test]
    fn stack_has_one_role_and_an_output() {
        let stack = CicdStack::build(&config()).unwrap();

        assert_eq!(stack.nodes().len(), 1);
        let node = &stack.nodes()[0];
        assert_eq!(
            stack.node_path(node),
            "demo-prod-cicd/gitlab-iam-role/demo-prod-cicd-role/Resource"
        );
        assert!(node.logical_id.starts_with("gitlabiamroledemoprodcicdrole"));
        assert_eq!(
            stack.outputs()["RoleArn"].value,
            json!({ "Fn::GetAtt": [node.logical_id.clone(), "Arn"] })
        );
    }

    #[test]
    fn building_twice_is_identical() {
        assert_eq!(CicdStack::build(&config()).unwrap(), CicdStack::build(&config()).unwrap());
    }
}
