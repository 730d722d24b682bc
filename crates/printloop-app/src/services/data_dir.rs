// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Data directory resolution.

use std::path::PathBuf;

/// Return the application data directory, creating it if needed.
pub fn data_dir() -> PathBuf {
    let dir = resolve(|key| std::env::var(key).ok());
    std::fs::create_dir_all(&dir).ok();
    dir
}

/// `$PRINTLOOP_DATA_DIR`, else `$XDG_DATA_HOME/printloop`, else
/// `~/.local/share/printloop`.
fn resolve(env: impl Fn(&str) -> Option<String>) -> PathBuf {
    if let Some(dir) = env("PRINTLOOP_DATA_DIR").filter(|d| !d.is_empty()) {
        return PathBuf::from(dir);
    }
    let base = if let Some(xdg) = env("XDG_DATA_HOME").filter(|d| !d.is_empty()) {
        PathBuf::from(xdg)
    } else if let Some(home) = env("HOME") {
        PathBuf::from(home).join(".local").join("share")
    } else {
        // Last resort
        PathBuf::from("/tmp")
    };
    base.join("printloop")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env_of(vars: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |key| vars.iter().find(|(k, _)| *k == key).map(|(_, v)| v.to_string())
    }

    #[test]
    fn explicit_dir_wins() {
        let env = env_of(&[("PRINTLOOP_DATA_DIR", "/srv/printloop"), ("XDG_DATA_HOME", "/x")]);
        assert_eq!(resolve(env), PathBuf::from("/srv/printloop"));
    }

    #[test]
    fn xdg_then_home() {
        assert_eq!(
            resolve(env_of(&[("XDG_DATA_HOME", "/x"), ("HOME", "/home/p")])),
            PathBuf::from("/x/printloop")
        );
        assert_eq!(
            resolve(env_of(&[("HOME", "/home/p")])),
            PathBuf::from("/home/p/.local/share/printloop")
        );
        assert_eq!(resolve(env_of(&[])), PathBuf::from("/tmp/printloop"));
    }
}
