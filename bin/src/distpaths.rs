//! Files shipped next to the executable in a distribution.

use std::path::PathBuf;

/// Tabula jar, used when the configuration names none.
pub fn tabula_jar() -> Option<PathBuf> {
    beside_executable("tabula.jar")
}

/// Configuration file, used when `--config` is not given.
pub fn default_config() -> Option<PathBuf> {
    beside_executable("codetables.yaml")
}

fn beside_executable(file_name: &str) -> Option<PathBuf> {
    std::env::current_exe()
        .ok()
        .map(|exe| exe.with_file_name(file_name))
        .filter(|path| path.is_file())
}
