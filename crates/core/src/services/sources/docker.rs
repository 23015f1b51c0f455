use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use serde::Deserialize;
use tracing::{debug, warn};

use crate::model::{Map, Value};
use crate::services::sources::{ExtractError, ImageExtractor, ImageResolver, ResolveError};

/// Image source backed by the `docker` command line client.
///
/// Resolution uses `docker image inspect`; extraction exports the filesystem
/// of a throwaway container through `tar` and collects config and history
/// into the metadata mapping:
///
/// ```json
/// { "Id": "...", "config": { ... }, "history": ["oldest command", "..."],
///   "architecture": "amd64", "os": "linux", "created": "..." }
/// ```
#[derive(Debug, Clone)]
pub struct DockerCli {
    pub binary: PathBuf,
    /// `tar` used to unpack the exported filesystem.
    pub tar: PathBuf,
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new(resolve_docker_path())
    }
}

impl DockerCli {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self { binary: binary.into(), tar: PathBuf::from("tar") }
    }

    pub fn with_tar(mut self, tar: impl Into<PathBuf>) -> Self {
        self.tar = tar.into();
        self
    }

    fn output(&self, args: &[&str]) -> Result<Output, String> {
        debug!(binary = %self.binary.display(), ?args, "running docker");
        Command::new(&self.binary)
            .args(args)
            .output()
            .map_err(|e| format!("failed to spawn {}: {e}", self.binary.display()))
    }

    fn checked(&self, args: &[&str]) -> Result<String, String> {
        let output = self.output(args)?;
        if !output.status.success() {
            return Err(format!(
                "docker {} exited with {}: {}",
                args.first().copied().unwrap_or_default(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn inspect(&self, id: &str) -> Result<DockerInspect, String> {
        let body = self.checked(&["image", "inspect", id])?;
        let mut images: Vec<DockerInspect> = serde_json::from_str(&body)
            .map_err(|e| format!("failed to parse docker inspect JSON: {e}"))?;
        if images.is_empty() {
            return Err("docker inspect returned no images".to_string());
        }
        Ok(images.swap_remove(0))
    }

    /// Layer-creation commands, oldest first.
    ///
    /// Each command is printed as a JSON string so multi-line commands
    /// (heredocs) stay on one line.
    fn history(&self, id: &str) -> Result<Vec<String>, String> {
        let body =
            self.checked(&["history", "--no-trunc", "--format", "{{json .CreatedBy}}", id])?;
        let mut commands = body
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                serde_json::from_str::<String>(line)
                    .map_err(|e| format!("failed to parse docker history line {line:?}: {e}"))
            })
            .collect::<Result<Vec<_>, _>>()?;
        commands.reverse();
        Ok(commands)
    }

    fn export_filesystem(&self, id: &str, dest: &Path) -> Result<(), String> {
        // The command is never executed; `create` only needs one for images without CMD.
        let container = self.checked(&["create", id, "/containerdiff-export"])?.trim().to_string();
        let exported = self.pipe_export(&container, dest);
        if let Err(err) = self.checked(&["rm", "-f", &container]) {
            warn!(container = %container, error = %err, "failed to remove export container");
        }
        exported
    }

    fn pipe_export(&self, container: &str, dest: &Path) -> Result<(), String> {
        let mut export = Command::new(&self.binary)
            .args(["export", container])
            .stdout(Stdio::piped())
            .spawn()
            .map_err(|e| format!("failed to spawn docker export: {e}"))?;
        let stdout = export.stdout.take().ok_or("docker export has no stdout")?;

        let unpacked = Command::new(&self.tar)
            .args(["-x", "-f", "-", "-C"])
            .arg(dest)
            .stdin(Stdio::from(stdout))
            .status();
        let tar_status = match unpacked {
            Ok(status) => status,
            Err(err) => {
                // Nobody reads the export stream any more; stop it and reap it.
                if let Err(kill_err) = export.kill() {
                    debug!(error = %kill_err, "docker export already exited");
                }
                if let Err(wait_err) = export.wait() {
                    warn!(error = %wait_err, "failed to reap docker export");
                }
                return Err(format!("failed to spawn {}: {err}", self.tar.display()));
            }
        };
        let export_status =
            export.wait().map_err(|e| format!("failed to wait for docker export: {e}"))?;

        if !export_status.success() {
            return Err(format!("docker export exited with {export_status}"));
        }
        if !tar_status.success() {
            return Err(format!("tar exited with {tar_status}"));
        }
        Ok(())
    }
}

impl ImageResolver for DockerCli {
    fn resolve(&self, identifier: &str) -> Result<String, ResolveError> {
        let failed = |reason: String| ResolveError::Failed { identifier: identifier.into(), reason };

        let output = self.output(&["image", "inspect", "--format", "{{.Id}}", identifier])
            .map_err(failed)?;
        if output.status.success() {
            let id = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if id.is_empty() {
                return Err(ResolveError::NotFound(identifier.to_string()));
            }
            return Ok(id);
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("No such image") || stderr.contains("No such object") {
            Err(ResolveError::NotFound(identifier.to_string()))
        } else {
            Err(failed(format!("docker image inspect exited with {}: {}", output.status, stderr.trim())))
        }
    }
}

impl ImageExtractor for DockerCli {
    fn extract(&self, id: &str, dest: &Path) -> Result<Value, ExtractError> {
        let inspect = self.inspect(id).map_err(|reason| ExtractError::failed(id, reason))?;
        let history = self.history(id).map_err(|reason| ExtractError::failed(id, reason))?;
        self.export_filesystem(id, dest).map_err(|reason| ExtractError::failed(id, reason))?;

        let mut metadata = Map::new();
        metadata.insert("Id".into(), Value::String(inspect.id));
        metadata.insert("config".into(), inspect.config);
        metadata.insert("history".into(), Value::Array(history.into_iter().map(Value::String).collect()));
        if let Some(arch) = inspect.architecture {
            metadata.insert("architecture".into(), Value::String(arch));
        }
        if let Some(os) = inspect.os {
            metadata.insert("os".into(), Value::String(os));
        }
        if let Some(created) = inspect.created {
            metadata.insert("created".into(), Value::String(created));
        }
        Ok(Value::Object(metadata))
    }
}

fn resolve_docker_path() -> PathBuf {
    std::env::var_os("CONTAINERDIFF_DOCKER")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("docker"))
}

#[derive(Debug, Deserialize)]
struct DockerInspect {
    #[serde(rename = "Id")]
    id: String,
    #[serde(rename = "Config", default)]
    config: Value,
    #[serde(rename = "Architecture", default)]
    architecture: Option<String>,
    #[serde(rename = "Os", default)]
    os: Option<String>,
    #[serde(rename = "Created", default)]
    created: Option<String>,
}
