//! External transformation steps
//!
//! A collaborator is handed input file paths and an output path and either
//! leaves a file at the output path or fails. Only the outcome is recorded:
//! a derived artifact on success, a `processing/stage` audit entry on failure.

use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info, warn};

use crate::audit::{actions, operations, AuditEntry};
use crate::manager::{ArtifactManager, CreateArtifact, ManagerError};
use crate::model::{Artifact, ArtifactType};

/// Argument placeholder replaced by every input path, in order.
///
/// An argument containing it is repeated once per input, so `--in={inputs}`
/// becomes `--in=a --in=b`.
pub const INPUTS_PLACEHOLDER: &str = "{inputs}";

/// Argument placeholder replaced by the output path.
pub const OUTPUT_PLACEHOLDER: &str = "{output}";

/// Errors from running a collaborator stage
#[derive(Debug, thiserror::Error)]
pub enum CollaboratorError {
    #[error("Input artifact has no stored file: {0}")]
    MissingInput(String),

    #[error("Failed to start {program}: {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Collaborator exited with status {code:?}")]
    ExitFailure { code: Option<i32> },

    #[error("Collaborator produced no output at {0}")]
    MissingOutput(PathBuf),

    #[error(transparent)]
    Manager(#[from] ManagerError),
}

/// An opaque transformation step.
pub trait Collaborator {
    /// Recorded as the derived artifact's `processing_module`.
    fn name(&self) -> &str;

    fn version(&self) -> Option<&str> {
        None
    }

    /// Transform `inputs` into a file at `output`.
    fn run(&self, inputs: &[PathBuf], output: &Path) -> Result<(), CollaboratorError>;
}

/// A collaborator backed by a subprocess.
///
/// `args` may contain [`INPUTS_PLACEHOLDER`] and [`OUTPUT_PLACEHOLDER`];
/// without either, input paths and then the output path are appended.
#[derive(Debug, Clone)]
pub struct CommandCollaborator {
    name: String,
    version: Option<String>,
    program: PathBuf,
    args: Vec<String>,
}

impl CommandCollaborator {
    pub fn new(name: impl Into<String>, program: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            version: None,
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Concrete argument vector for one invocation.
    pub fn command_args(&self, inputs: &[PathBuf], output: &Path) -> Vec<String> {
        let input_args: Vec<String> = inputs.iter().map(|p| p.display().to_string()).collect();
        let output_arg = output.display().to_string();

        let templated = self
            .args
            .iter()
            .any(|a| a.contains(INPUTS_PLACEHOLDER) || a.contains(OUTPUT_PLACEHOLDER));
        if !templated {
            let mut args = self.args.clone();
            args.extend(input_args);
            args.push(output_arg);
            return args;
        }

        let mut args = Vec::with_capacity(self.args.len() + inputs.len());
        for arg in &self.args {
            let arg = arg.replace(OUTPUT_PLACEHOLDER, &output_arg);
            if arg.contains(INPUTS_PLACEHOLDER) {
                args.extend(
                    input_args
                        .iter()
                        .map(|input| arg.replace(INPUTS_PLACEHOLDER, input)),
                );
            } else {
                args.push(arg);
            }
        }
        args
    }
}

impl Collaborator for CommandCollaborator {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    fn run(&self, inputs: &[PathBuf], output: &Path) -> Result<(), CollaboratorError> {
        let args = self.command_args(inputs, output);
        debug!(program = %self.program.display(), ?args, "spawning collaborator");

        let result = Command::new(&self.program)
            .args(&args)
            .output()
            .map_err(|source| CollaboratorError::SpawnFailed {
                program: self.program.display().to_string(),
                source,
            })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            warn!(
                collaborator = %self.name,
                code = ?result.status.code(),
                stderr = %stderr.trim(),
                "collaborator failed"
            );
            return Err(CollaboratorError::ExitFailure {
                code: result.status.code(),
            });
        }
        Ok(())
    }
}

/// Run `collaborator` over the files of `input_ids` and register its output.
///
/// On success the output becomes an artifact of `output_type` whose sources
/// are `input_ids` and whose module is the collaborator's name. Any failure
/// after the inputs resolve is written to the audit trail before returning.
pub fn run_stage<C: Collaborator + ?Sized>(
    manager: &ArtifactManager,
    collaborator: &C,
    input_ids: &[String],
    output_type: ArtifactType,
    output_path: &Path,
) -> Result<Artifact, CollaboratorError> {
    let mut inputs = Vec::with_capacity(input_ids.len());
    for id in input_ids {
        let path = manager
            .get_artifact_file(id)?
            .ok_or_else(|| CollaboratorError::MissingInput(id.clone()))?;
        inputs.push(path);
    }

    let outcome = collaborator.run(&inputs, output_path).and_then(|()| {
        if output_path.is_file() {
            Ok(())
        } else {
            Err(CollaboratorError::MissingOutput(output_path.to_path_buf()))
        }
    });

    if let Err(e) = outcome {
        manager.record(
            AuditEntry::new(operations::PROCESSING, actions::STAGE)
                .module(Some(collaborator.name().to_string()))
                .detail("input_artifacts", input_ids)
                .detail("output_path", output_path.display().to_string())
                .detail("output_type", output_type.as_str())
                .failed(e.to_string()),
        );
        return Err(e);
    }

    let mut request = CreateArtifact::new(output_type)
        .source_path(output_path)
        .sources(input_ids.iter().cloned())
        .module(collaborator.name());
    if let Some(version) = collaborator.version() {
        request = request.version(version);
    }
    let artifact = manager.create_artifact(request)?;

    info!(
        collaborator = collaborator.name(),
        artifact_id = %artifact.artifact_id,
        "stage completed"
    );
    Ok(artifact)
}
