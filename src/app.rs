//! Wires resolved configuration into an app: stacks, tags and aspects.

use crate::config::{self, AppConfig, CicdConfig};
use crate::construct::{self, App};
use crate::nag::SolutionsChecks;
use crate::stacks::{module, CicdStack, ModuleName, ModuleStack};

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    #[error("Config not defined: {0}")]
    Config(#[from] config::Error),

    #[error(transparent)]
    Construct(#[from] construct::Error),

    #[error(transparent)]
    Module(#[from] module::Error),
}

/// Which deployable unit to build.
#[derive(Debug, Clone, PartialEq, Eq, clap::Subcommand)]
pub enum Target {
    /// IAM role assumed by the GitLab pipeline.
    Cicd,
    /// Stack of a single infrastructure module.
    Module {
        /// Module name in spinal-case, e.g. `user-service`.
        #[arg(long)]
        name: ModuleName,
    },
}

impl Target {
    pub fn variables(&self) -> &'static [&'static str] {
        match self {
            Target::Cicd => CicdConfig::VARIABLES,
            Target::Module { .. } => AppConfig::VARIABLES,
        }
    }
}

pub fn cicd_app(config: &CicdConfig) -> Result<App, Error> {
    let mut app = App::new();
    app.add_tag("App", &config.base.app_name);
    app.add_stack(CicdStack::build(config)?)?;

    Ok(app)
}

pub fn module_app(config: &AppConfig, module: &ModuleName) -> Result<App, Error> {
    let mut app = App::new();
    app.add_aspect(Box::new(SolutionsChecks));
    app.add_tag("App", &config.base.app_name);
    app.add_tag("Env", &config.base.env_name);
    app.add_stack(ModuleStack::build(config, module)?)?;

    Ok(app)
}

/// Resolves the target's configuration through `lookup`, then builds its app.
/// Nothing is constructed unless the configuration resolves.
pub fn build_app<F>(target: &Target, lookup: F) -> Result<App, Error>
where
    F: Fn(&str) -> Option<String>,
{
    tracing::info!("Loading Configurations...");
    match target {
        Target::Cicd => {
            let config = CicdConfig::from_lookup(lookup)?;
            log_config(&config);
            cicd_app(&config)
        }
        Target::Module { name } => {
            let config = AppConfig::from_lookup(lookup)?;
            log_config(&config);
            module_app(&config, name)
        }
    }
}

/// [`build_app`] over the process environment.
pub async fn load_app(target: &Target) -> Result<App, Error> {
    let vars = config::read_env(target.variables())?;
    build_app(target, |name| vars.get(name).cloned())
}

fn log_config<T: serde::Serialize>(config: &T) {
    match serde_json::to_string(config) {
        Ok(json) => tracing::info!("{}", json),
        Err(error) => tracing::warn!(%error, "unable to render config"),
    }
    tracing::info!("DONE");
}
