use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::SynthesizerKind;
use crate::construct::{App, Stack};
use crate::nag::{self, Finding};

pub const TEMPLATE_FORMAT_VERSION: &str = "2010-09-09";
pub const MANIFEST_FILE: &str = "manifest.json";
pub const BOOTSTRAP_VERSION_PARAMETER: &str = "/cdk-bootstrap/hnb659fds/version";

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Compliance checks failed:\n{0}")]
    Compliance(String),

    #[error("Unable to write {path}: {message}")]
    Io { path: String, message: String },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum TemplateFormat {
    #[default]
    Json,
    Yaml,
}

impl TemplateFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            TemplateFormat::Json => "json",
            TemplateFormat::Yaml => "yaml",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct TemplateResource {
    #[serde(rename = "Type")]
    pub resource_type: &'static str,

    pub properties: Value,

    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct TemplateOutput {
    pub value: Value,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Template {
    #[serde(rename = "AWSTemplateFormatVersion")]
    pub format_version: &'static str,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, Value>,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub rules: BTreeMap<String, Value>,

    pub resources: BTreeMap<String, TemplateResource>,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, TemplateOutput>,
}

impl Template {
    pub fn render(&self, format: TemplateFormat) -> Result<String, Error> {
        let rendered = match format {
            TemplateFormat::Json => serde_json::to_string_pretty(self).map_err(|e| e.to_string()),
            TemplateFormat::Yaml => serde_yaml::to_string(self).map_err(|e| e.to_string()),
        };

        rendered.map_err(Error::Serialization)
    }
}

/// A stack ready to be written out or deployed.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedStack {
    pub stack_name: String,
    pub environment: String,
    pub region: String,
    pub tags: BTreeMap<String, String>,
    pub template: Template,
}

impl SynthesizedStack {
    pub fn template_file(&self, format: TemplateFormat) -> String {
        format!("{}.template.{}", self.stack_name, format.extension())
    }
}

/// Runs the app's aspects, then renders every stack into a template.
pub fn synthesize(app: &App) -> Result<Vec<SynthesizedStack>, Error> {
    let mut errors: Vec<Finding> = Vec::new();
    for stack in app.stacks() {
        for finding in nag::check(stack, app.aspects()) {
            tracing::error!(rule = finding.rule_id, path = %finding.path, "{}", finding.message);
            errors.push(finding);
        }
    }

    if !errors.is_empty() {
        let report = errors
            .iter()
            .map(|finding| finding.to_string())
            .collect::<Vec<_>>()
            .join("\n");
        return Err(Error::Compliance(report));
    }

    let mut stacks = Vec::new();
    for stack in app.stacks() {
        stacks.push(SynthesizedStack {
            stack_name: stack.id.clone(),
            environment: stack.env.uri(),
            region: stack.env.region.clone(),
            tags: app.tags().clone(),
            template: template(stack, app.tags())?,
        });
    }

    return Ok(stacks);
}

pub fn template(stack: &Stack, tags: &BTreeMap<String, String>) -> Result<Template, Error> {
    let mut resources = BTreeMap::new();
    for node in stack.nodes() {
        let properties = match node.resource.properties(tags) {
            Ok(properties) => properties,
            Err(error) => return Err(Error::Serialization(error.to_string())),
        };
        let mut metadata = BTreeMap::new();
        metadata.insert("aws:cdk:path".to_string(), stack.node_path(node));
        let resource = TemplateResource {
            resource_type: node.resource.cfn_type(),
            properties,
            metadata,
        };
        resources.insert(node.logical_id.clone(), resource);
    }

    let outputs = stack
        .outputs()
        .iter()
        .map(|(name, output)| {
            let output = TemplateOutput {
                value: output.value.clone(),
                description: output.description.clone(),
            };
            (name.clone(), output)
        })
        .collect();

    let (parameters, rules) = match stack.synthesizer {
        SynthesizerKind::Default => bootstrap_checks(),
        SynthesizerKind::Legacy => (BTreeMap::new(), BTreeMap::new()),
    };

    Ok(Template {
        format_version: TEMPLATE_FORMAT_VERSION,
        description: stack.description.clone(),
        parameters,
        rules,
        resources,
        outputs,
    })
}

fn bootstrap_checks() -> (BTreeMap<String, Value>, BTreeMap<String, Value>) {
    let mut parameters = BTreeMap::new();
    parameters.insert(
        "BootstrapVersion".to_string(),
        json!({
            "Type": "AWS::SSM::Parameter::Value<String>",
            "Default": BOOTSTRAP_VERSION_PARAMETER,
            "Description": "Version of the CDK Bootstrap resources in this environment, automatically retrieved from SSM Parameter Store. [cdk:skip]"
        }),
    );

    let mut rules = BTreeMap::new();
    rules.insert(
        "CheckBootstrapVersion".to_string(),
        json!({
            "Assertions": [{
                "Assert": {
                    "Fn::Not": [{
                        "Fn::Contains": [["1", "2", "3", "4", "5"], { "Ref": "BootstrapVersion" }]
                    }]
                },
                "AssertDescription": "CDK bootstrap stack version 6 required. Please run 'cdk bootstrap' with a recent version of the CDK CLI."
            }]
        }),
    );

    (parameters, rules)
}

#[derive(Serialize)]
struct ArtifactProperties<'a> {
    #[serde(rename = "templateFile")]
    template_file: String,
    #[serde(rename = "stackName")]
    stack_name: &'a str,
    tags: &'a BTreeMap<String, String>,
}

#[derive(Serialize)]
struct Artifact<'a> {
    #[serde(rename = "type")]
    artifact_type: &'static str,
    environment: &'a str,
    properties: ArtifactProperties<'a>,
}

#[derive(Serialize)]
struct Manifest<'a> {
    version: &'static str,
    artifacts: BTreeMap<&'a str, Artifact<'a>>,
}

/// Writes every template plus a manifest into `outdir`, returns the manifest path.
pub fn write(
    stacks: &[SynthesizedStack],
    outdir: &Path,
    format: TemplateFormat,
) -> Result<PathBuf, Error> {
    create_dir(outdir)?;

    let mut artifacts = BTreeMap::new();
    for stack in stacks {
        let file_name = stack.template_file(format);
        let path = outdir.join(&file_name);
        write_file(&path, &stack.template.render(format)?)?;
        tracing::info!(stack = %stack.stack_name, path = %path.display(), "wrote template");

        artifacts.insert(
            stack.stack_name.as_str(),
            Artifact {
                artifact_type: "aws:cloudformation:stack",
                environment: &stack.environment,
                properties: ArtifactProperties {
                    template_file: file_name,
                    stack_name: &stack.stack_name,
                    tags: &stack.tags,
                },
            },
        );
    }

    let manifest = Manifest {
        version: env!("CARGO_PKG_VERSION"),
        artifacts,
    };
    let contents = match serde_json::to_string_pretty(&manifest) {
        Ok(contents) => contents,
        Err(error) => return Err(Error::Serialization(error.to_string())),
    };

    let manifest_path = outdir.join(MANIFEST_FILE);
    write_file(&manifest_path, &contents)?;
    return Ok(manifest_path);
}

fn create_dir(path: &Path) -> Result<(), Error> {
    match fs::create_dir_all(path) {
        Ok(_) => Ok(()),
        Err(error) => Err(Error::Io {
            path: path.display().to_string(),
            message: error.to_string(),
        }),
    }
}

fn write_file(path: &Path, contents: &str) -> Result<(), Error> {
    match fs::write(path, contents) {
        Ok(_) => Ok(()),
        Err(error) => Err(Error::Io {
            path: path.display().to_string(),
            message: error.to_string(),
        }),
    }
}
