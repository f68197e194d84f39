use serde::Deserialize;
use std::path::PathBuf;

/// Configuration of the dispatch service edge.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct DispatchConfig {
    /// Root directory of all handler-set directories.
    #[serde(default = "default_script_root")]
    pub script_root: PathBuf,

    /// URL prefix under which procedures are mounted.
    #[serde(default = "default_mount_prefix")]
    pub mount_prefix: String,

    /// Skips authentication enforcement (debug builds only).
    #[serde(default)]
    pub disable_auth: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            script_root: default_script_root(),
            mount_prefix: default_mount_prefix(),
            disable_auth: false,
        }
    }
}

fn default_script_root() -> PathBuf {
    PathBuf::from("./user-script-root")
}

fn default_mount_prefix() -> String {
    "/pys".to_string()
}
