pub mod cicd;
pub mod module;

pub use cicd::{CicdStack, GitLabIamRole, GITLAB_RUNNER_ROLE_ARN};
pub use module::{ModuleName, ModuleStack};
