#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use containerdiff_core::services::sources::{
    DockerCli, ExtractError, ImageExtractor, ImageResolver, ResolveError,
};
use serde_json::json;
use tempfile::tempdir;

const SCRIPT: &str = r##"#!/bin/sh
last=""
for arg in "$@"; do last="$arg"; done
case "$1" in
  image)
    if [ "$3" = "--format" ]; then
      if [ "$last" = "httpd:2.4" ]; then
        echo "sha256:0123456789abcdef"
        exit 0
      fi
      if [ "$last" = "broken" ]; then
        echo "Cannot connect to the Docker daemon" >&2
        exit 1
      fi
      echo "Error: No such image: $last" >&2
      exit 1
    fi
    printf '[{"Id":"%s","Config":{"Cmd":["httpd"],"Env":["PATH=/usr/bin"]},"Architecture":"amd64","Os":"linux","Created":"2024-01-01T00:00:00Z"}]\n' "$last"
    ;;
  history)
    printf '%s\n' '"RUN <<EOF\necho hi\nEOF"'
    printf '%s\n' '"/bin/sh -c #(nop) ADD file:1 in /"'
    ;;
  create)
    if [ "$2" = "sha256:badexport" ]; then echo "c-bad"; else echo "c-good"; fi
    ;;
  export)
    if [ "$2" = "c-bad" ]; then
      echo "Error: export failed" >&2
      exit 1
    fi
    tar -c -f - -C "@ROOTFS@" .
    ;;
  rm)
    echo "$3" >> "@RMLOG@"
    ;;
  *)
    exit 2
    ;;
esac
"##;

/// Stand-in `docker` that knows one image, `httpd:2.4`, whose filesystem is
/// `dir/rootfs`. Removed containers are appended to `dir/rm.log`.
fn fake_docker(dir: &Path) -> PathBuf {
    let rootfs = dir.join("rootfs");
    fs::create_dir_all(rootfs.join("etc")).unwrap();
    fs::create_dir_all(rootfs.join("usr/sbin")).unwrap();
    fs::write(rootfs.join("etc/os-release"), "ID=fake").unwrap();
    fs::write(rootfs.join("usr/sbin/httpd"), "binary").unwrap();

    let body = SCRIPT
        .replace("@ROOTFS@", &rootfs.to_string_lossy())
        .replace("@RMLOG@", &dir.join("rm.log").to_string_lossy());
    let script = dir.join("docker");
    fs::write(&script, body).unwrap();
    let mut perms = fs::metadata(&script).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&script, perms).unwrap();
    script
}

fn removed_containers(dir: &Path) -> String {
    fs::read_to_string(dir.join("rm.log")).unwrap_or_default()
}

#[test]
fn resolves_known_image_to_id() {
    let temp = tempdir().unwrap();
    let docker = DockerCli::new(fake_docker(temp.path()));
    assert_eq!(docker.resolve("httpd:2.4").unwrap(), "sha256:0123456789abcdef");
}

#[test]
fn missing_image_is_not_found() {
    let temp = tempdir().unwrap();
    let docker = DockerCli::new(fake_docker(temp.path()));
    let err = docker.resolve("nginx:latest").unwrap_err();
    assert!(matches!(err, ResolveError::NotFound(_)), "unexpected error: {err}");
}

#[test]
fn daemon_errors_are_not_reported_as_missing_images() {
    let temp = tempdir().unwrap();
    let docker = DockerCli::new(fake_docker(temp.path()));
    let err = docker.resolve("broken").unwrap_err();
    assert!(matches!(err, ResolveError::Failed { .. }), "unexpected error: {err}");
    assert!(err.to_string().contains("Cannot connect"), "unexpected error: {err}");
}

#[test]
fn missing_binary_fails_to_resolve() {
    let temp = tempdir().unwrap();
    let docker = DockerCli::new(temp.path().join("no-such-docker"));
    assert!(matches!(docker.resolve("httpd:2.4"), Err(ResolveError::Failed { .. })));
}

#[test]
fn extract_returns_metadata_and_unpacks_filesystem() {
    let temp = tempdir().unwrap();
    let docker = DockerCli::new(fake_docker(temp.path()));
    let dest = tempdir().unwrap();

    let metadata = docker.extract("sha256:0123456789abcdef", dest.path()).unwrap();
    assert_eq!(metadata["Id"], json!("sha256:0123456789abcdef"));
    assert_eq!(metadata["config"], json!({"Cmd": ["httpd"], "Env": ["PATH=/usr/bin"]}));
    assert_eq!(metadata["architecture"], json!("amd64"));
    assert_eq!(metadata["os"], json!("linux"));

    assert_eq!(fs::read_to_string(dest.path().join("etc/os-release")).unwrap(), "ID=fake");
    assert_eq!(fs::read_to_string(dest.path().join("usr/sbin/httpd")).unwrap(), "binary");
    assert_eq!(removed_containers(temp.path()).trim(), "c-good");
}

#[test]
fn multi_line_history_commands_stay_whole_and_oldest_first() {
    let temp = tempdir().unwrap();
    let docker = DockerCli::new(fake_docker(temp.path()));
    let dest = tempdir().unwrap();

    let metadata = docker.extract("sha256:0123456789abcdef", dest.path()).unwrap();
    assert_eq!(
        metadata["history"],
        json!(["/bin/sh -c #(nop) ADD file:1 in /", "RUN <<EOF\necho hi\nEOF"])
    );
}

#[test]
fn failed_export_is_an_error_and_container_is_removed() {
    let temp = tempdir().unwrap();
    let docker = DockerCli::new(fake_docker(temp.path()));
    let dest = tempdir().unwrap();

    let err = docker.extract("sha256:badexport", dest.path()).unwrap_err();
    assert!(matches!(err, ExtractError::Failed { .. }), "unexpected error: {err}");
    assert!(err.to_string().contains("docker export exited"), "unexpected error: {err}");
    assert_eq!(removed_containers(temp.path()).trim(), "c-bad");
}

#[test]
fn missing_tar_is_an_error_and_container_is_removed() {
    let temp = tempdir().unwrap();
    let docker =
        DockerCli::new(fake_docker(temp.path())).with_tar(temp.path().join("no-such-tar"));
    let dest = tempdir().unwrap();

    let err = docker.extract("sha256:0123456789abcdef", dest.path()).unwrap_err();
    assert!(err.to_string().contains("failed to spawn"), "unexpected error: {err}");
    assert!(err.to_string().contains("no-such-tar"), "unexpected error: {err}");
    assert_eq!(removed_containers(temp.path()).trim(), "c-good");
}
