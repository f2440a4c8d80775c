use std::env;
use std::path::Path;
use std::process::Command;

/// Current `HEAD` commit of the checkout at `repo_root`, if it is one.
pub fn head_commit(repo_root: &Path) -> Option<String> {
    let output = Command::new(git_program())
        .arg("rev-parse")
        .arg("HEAD")
        .current_dir(repo_root)
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    let sha = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!sha.is_empty()).then_some(sha)
}

fn git_program() -> String {
    env::var("MODSHIP_GIT_BIN").unwrap_or_else(|_| "git".to_string())
}
