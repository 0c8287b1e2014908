//! Every workspace member inherits the workspace version, and internal
//! dependency declarations pin that same version.

use std::path::{Path, PathBuf};

fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .ancestors()
        .nth(2)
        .unwrap()
        .to_path_buf()
}

fn read_toml(path: &Path) -> toml::Value {
    let raw = std::fs::read_to_string(path)
        .unwrap_or_else(|e| panic!("cannot read {}: {e}", path.display()));
    raw.parse().unwrap()
}

#[test]
fn members_inherit_workspace_version() {
    let root = workspace_root();
    let doc = read_toml(&root.join("Cargo.toml"));
    let members = doc["workspace"]["members"].as_array().unwrap();
    assert!(!members.is_empty());

    for member in members {
        let member = member.as_str().unwrap();
        let manifest = read_toml(&root.join(member).join("Cargo.toml"));
        let inherits = manifest["package"]["version"]
            .get("workspace")
            .and_then(toml::Value::as_bool);
        assert_eq!(inherits, Some(true), "{member} must use version.workspace = true");
    }
}

#[test]
fn internal_dependencies_pin_workspace_version() {
    let doc = read_toml(&workspace_root().join("Cargo.toml"));
    let version = doc["workspace"]["package"]["version"].as_str().unwrap();
    assert_eq!(version, env!("CARGO_PKG_VERSION"));

    let deps = doc["workspace"]["dependencies"].as_table().unwrap();
    for (name, spec) in deps.iter().filter(|(_, spec)| spec.get("path").is_some()) {
        assert_eq!(
            spec.get("version").and_then(toml::Value::as_str),
            Some(version),
            "internal dependency {name} must pin the workspace version"
        );
    }
}
