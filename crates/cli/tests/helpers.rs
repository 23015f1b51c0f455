#![allow(dead_code)]

use std::fs;
use std::path::Path;

use serde_json::{json, Value};

/// Writes `store/NAME/metadata.json` and the given files under `rootfs/`.
pub fn add_image(store: &Path, name: &str, metadata: Value, files: &[(&str, &str)]) {
    let dir = store.join(name);
    fs::create_dir_all(dir.join("rootfs")).unwrap();
    fs::write(dir.join("metadata.json"), serde_json::to_vec_pretty(&metadata).unwrap()).unwrap();
    for (rel, body) in files {
        let path = dir.join("rootfs").join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, body).unwrap();
    }
}

/// A store with `base` and `httpd`, the latter adding one layer on top.
pub fn sample_store(store: &Path) {
    add_image(
        store,
        "base",
        json!({
            "Id": "sha256:base0001",
            "config": {"Env": ["PATH=/usr/bin"], "Cmd": ["sh"]},
            "history": ["/bin/sh -c #(nop) ADD file:1 in /"]
        }),
        &[("etc/os-release", "ID=base")],
    );
    add_image(
        store,
        "httpd",
        json!({
            "Id": "sha256:httpd001",
            "config": {"Env": ["PATH=/usr/bin"], "Cmd": ["httpd"]},
            "history": [
                "/bin/sh -c #(nop) ADD file:1 in /",
                "/bin/sh -c yum -y install httpd"
            ]
        }),
        &[("etc/os-release", "ID=base"), ("usr/sbin/httpd", "binary"), ("tmp/yum.log", "log")],
    );
}

pub fn expected_report() -> Value {
    json!({
        "files": {
            "added": ["/tmp", "/tmp/yum.log", "/usr", "/usr/sbin", "/usr/sbin/httpd"],
            "removed": [],
            "modified": []
        },
        "history": ["+/bin/sh -c yum -y install httpd"],
        "metadata": ["Cmd: [\"sh\"] -> [\"httpd\"]"]
    })
}
