use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::deploy::StackOutputs;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    #[error("Unable to write outputs file {0}: {1}")]
    Io(String, String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Writes `{ stackName: { outputKey: outputValue } }` to `path`.
pub fn write_outputs(path: &Path, outputs: &BTreeMap<String, StackOutputs>) -> Result<(), Error> {
    let contents = match serde_json::to_string_pretty(outputs) {
        Ok(contents) => contents,
        Err(error) => return Err(Error::Serialization(error.to_string())),
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Err(error) = fs::create_dir_all(parent) {
            return Err(Error::Io(parent.display().to_string(), error.to_string()));
        }
    }

    match fs::write(path, contents) {
        Ok(_) => Ok(()),
        Err(error) => Err(Error::Io(path.display().to_string(), error.to_string())),
    }
}
