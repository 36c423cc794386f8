use std::collections::BTreeMap;
use std::time::Duration;

use aws_sdk_cloudformation::model::{Capability, Tag};
use aws_sdk_cloudformation::types::SdkError;
use aws_types::region::Region;

use crate::synth::{SynthesizedStack, TemplateFormat};

pub type StackOutputs = BTreeMap<String, String>;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    #[error("Service error ocurred: {0}.")]
    ServiceError(String),

    #[error("Unknown error ocurred: {0}.")]
    UnknownError(String),

    #[error("Stack not found")]
    NotFoundError(String),

    #[error("Stack {stack} ended in {status}: {reason}")]
    DeploymentFailed {
        stack: String,
        status: String,
        reason: String,
    },

    #[error("Unable to render template of {0}: {1}")]
    Template(String, String),
}

/// Where a stack's status leaves a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    InProgress,
    Succeeded,
    Failed,
}

pub fn classify(status: &str) -> Progress {
    if status.ends_with("_IN_PROGRESS") {
        return Progress::InProgress;
    }

    match status {
        "CREATE_COMPLETE" | "UPDATE_COMPLETE" | "IMPORT_COMPLETE" => Progress::Succeeded,
        _ => Progress::Failed,
    }
}

fn sdk_error<E>(error: SdkError<E>) -> Error
where
    E: std::error::Error + 'static,
{
    match error {
        SdkError::ServiceError { err, .. } => Error::ServiceError(err.to_string()),
        err => Error::UnknownError(err.to_string()),
    }
}

fn is_missing_stack(error: &Error) -> bool {
    match error {
        Error::ServiceError(message) => message.contains("does not exist"),
        _ => false,
    }
}

fn is_no_op_update(error: &Error) -> bool {
    match error {
        Error::ServiceError(message) => message.contains("No updates are to be performed"),
        _ => false,
    }
}

#[derive(Debug, Clone)]
struct StackState {
    status: String,
    reason: String,
    outputs: StackOutputs,
}

pub struct Deployer {
    client: aws_sdk_cloudformation::Client,
    poll_interval: Duration,
}

impl Deployer {
    pub async fn new(region: &str, poll_interval: Duration) -> Self {
        let sdk_config = aws_config::from_env()
            .region(Region::new(region.to_string()))
            .load()
            .await;
        let client = aws_sdk_cloudformation::Client::new(&sdk_config);

        return Self {
            client,
            poll_interval,
        };
    }

    /// Creates or updates the stack, waits for it to settle and returns its outputs.
    pub async fn deploy(
        &self,
        stack: &SynthesizedStack,
        format: TemplateFormat,
    ) -> Result<StackOutputs, Error> {
        let body = match stack.template.render(format) {
            Ok(body) => body,
            Err(error) => return Err(Error::Template(stack.stack_name.clone(), error.to_string())),
        };
        let tags: Vec<Tag> = stack
            .tags
            .iter()
            .map(|(key, value)| Tag::builder().key(key).value(value).build())
            .collect();

        let exists = match self.describe(&stack.stack_name).await {
            Ok(_) => true,
            Err(error) if is_missing_stack(&error) => false,
            Err(error) => return Err(error),
        };

        if exists {
            tracing::info!(stack = %stack.stack_name, "updating stack");
            let result = self
                .client
                .update_stack()
                .stack_name(&stack.stack_name)
                .template_body(body)
                .capabilities(Capability::CapabilityNamedIam)
                .set_tags(Some(tags))
                .send()
                .await
                .map_err(sdk_error);
            match result {
                Ok(_) => {}
                Err(error) if is_no_op_update(&error) => {
                    tracing::info!(stack = %stack.stack_name, "no changes");
                    return Ok(self.describe(&stack.stack_name).await?.outputs);
                }
                Err(error) => return Err(error),
            }
        } else {
            tracing::info!(stack = %stack.stack_name, "creating stack");
            self.client
                .create_stack()
                .stack_name(&stack.stack_name)
                .template_body(body)
                .capabilities(Capability::CapabilityNamedIam)
                .set_tags(Some(tags))
                .send()
                .await
                .map_err(sdk_error)?;
        }

        return self.wait(&stack.stack_name).await;
    }

    async fn wait(&self, stack_name: &str) -> Result<StackOutputs, Error> {
        loop {
            let state = self.describe(stack_name).await?;
            match classify(&state.status) {
                Progress::InProgress => {
                    tracing::debug!(stack = %stack_name, status = %state.status, "waiting");
                    tokio::time::sleep(self.poll_interval).await;
                }
                Progress::Succeeded => {
                    tracing::info!(stack = %stack_name, status = %state.status, "deployed");
                    return Ok(state.outputs);
                }
                Progress::Failed => {
                    return Err(Error::DeploymentFailed {
                        stack: stack_name.to_string(),
                        status: state.status,
                        reason: state.reason,
                    })
                }
            }
        }
    }

    async fn describe(&self, stack_name: &str) -> Result<StackState, Error> {
        let result = self
            .client
            .describe_stacks()
            .stack_name(stack_name)
            .send()
            .await
            .map_err(sdk_error)?;

        let stacks = result.stacks().unwrap_or_else(|| &[]);
        let stack = match stacks.first() {
            Some(stack) => stack,
            None => return Err(Error::NotFoundError(stack_name.to_string())),
        };

        let outputs = stack
            .outputs()
            .unwrap_or_else(|| &[])
            .iter()
            .fold(StackOutputs::new(), |mut acc, output| {
                if let (Some(key), Some(value)) = (output.output_key(), output.output_value()) {
                    acc.insert(key.to_string(), value.to_string());
                }
                acc
            });

        return Ok(StackState {
            status: stack
                .stack_status()
                .map(|status| status.as_str().to_string())
                .unwrap_or_default(),
            reason: stack.stack_status_reason().unwrap_or_default().to_string(),
            outputs,
        });
    }
}

/// Deploys every stack concurrently; outputs are keyed by stack name.
pub async fn deploy_all(
    stacks: &[SynthesizedStack],
    format: TemplateFormat,
    poll_interval: Duration,
) -> Result<BTreeMap<String, StackOutputs>, Error> {
    let deployments = stacks.iter().map(|stack| async move {
        let deployer = Deployer::new(&stack.region, poll_interval).await;
        let outputs = deployer.deploy(stack, format).await?;
        Ok::<_, Error>((stack.stack_name.clone(), outputs))
    });

    let results = futures::future::try_join_all(deployments).await?;
    return Ok(results.into_iter().collect());
}
