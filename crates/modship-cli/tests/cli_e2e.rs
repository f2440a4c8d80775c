use std::fs;
use std::path::Path;

use assert_cmd::Command;
use insta::assert_snapshot;
use predicates::str::contains;
use tempfile::tempdir;

const BUILD_SCRIPT: &str = r#"#!/usr/bin/env sh
set -e
echo "$1" >> build.log
mkdir -p "versions/$1/build/libs"
printf 'jar for %s' "$1" > "versions/$1/build/libs/$2"
"#;

fn write_file(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("mkdir");
    }
    fs::write(path, content).expect("write");
}

#[cfg(not(windows))]
fn write_script(root: &Path, body: &str) -> std::path::PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = root.join("fake-build.sh");
    write_file(&path, body);
    let mut perms = fs::metadata(&path).expect("meta").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).expect("chmod");
    path
}

fn create_project(root: &Path, program: &str) {
    write_file(
        &root.join("modship.toml"),
        &format!(
            r#"
[mod]
id = "demo"
name = "Demo"
version = "1.0.0"
group = "com.example"

[tree]
runtimes = ["1.20.1", "1.21.1"]

[[tree.branch]]
loader = ""

[[tree.branch]]
loader = "forge"
runtimes = ["1.20.1"]

[[tree.branch]]
loader = "neoforge"
runtimes = ["1.21.1"]

[build]
program = "{program}"
args = ["{{runtime}}-{{loader}}", "{{archive_name}}-{{project_version}}.jar"]

[changelog]
enabled = false

[publish.modrinth]
id = "AABBCCDD"
"#
        ),
    );
}

fn modship_cmd(root: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("modship"));
    cmd.current_dir(root)
        .arg("-C")
        .arg(root)
        .env_remove("MODSHIP_BUILD_BIN")
        .env_remove("PUBLISH_DRY_RUN")
        .env_remove("MODRINTH_API_KEY")
        .env_remove("CF_API_KEY")
        .env_remove("GITHUB_TOKEN")
        .env_remove("DISCORD_WEBHOOK")
        .env("MODSHIP_GIT_BIN", "modship-no-such-git");
    cmd
}

#[test]
fn config_template_needs_no_project() {
    let td = tempdir().expect("tempdir");
    modship_cmd(td.path())
        .args(["config", "--template"])
        .assert()
        .success()
        .stdout(contains("[mod]"))
        .stdout(contains("[[tree.branch]]"));
}

#[test]
fn tree_lists_nodes_in_build_order() {
    let td = tempdir().expect("tempdir");
    create_project(td.path(), "true");

    let out = modship_cmd(td.path())
        .arg("tree")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let stdout = String::from_utf8(out).expect("utf8");
    let lines: Vec<&str> = stdout.lines().map(str::trim).collect();
    assert_eq!(
        lines,
        vec![
            "1. 1.20.1-common 1.0.0+1.20.1 [common]",
            "2. 1.20.1-forge 1.0.0+1.20.1",
            "3. 1.21.1-common 1.0.0+1.21.1 [common]",
            "4. 1.21.1-neoforge 1.0.0+1.21.1",
        ]
    );
}

#[test]
fn plan_for_build_stage_orders_common_first() {
    let td = tempdir().expect("tempdir");
    create_project(td.path(), "true");

    let out = modship_cmd(td.path())
        .args(["plan", "--stage", "build"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    assert_snapshot!(String::from_utf8(out).expect("utf8"), @r"
level 1:
  - build 1.20.1-common
  - build 1.21.1-common
level 2:
  - build 1.20.1-forge
  - build 1.21.1-neoforge
level 3:
  - relocate 1.20.1-forge
  - relocate 1.21.1-neoforge
");
}

#[test]
fn config_prints_resolved_nodes() {
    let td = tempdir().expect("tempdir");
    create_project(td.path(), "true");

    modship_cmd(td.path())
        .arg("config")
        .assert()
        .success()
        .stdout(contains("\"artifact_name\": \"demo-forge-1.0.0+1.20.1.jar\""))
        .stdout(contains("\"group\": \"com.example.neoforge\""));
}

#[test]
fn missing_config_fails() {
    let td = tempdir().expect("tempdir");
    modship_cmd(td.path()).arg("tree").assert().failure();
}

#[test]
fn missing_common_branch_is_rejected() {
    let td = tempdir().expect("tempdir");
    write_file(
        &td.path().join("modship.toml"),
        r#"
[mod]
id = "demo"
name = "Demo"
version = "1.0.0"
group = "com.example"

[tree]
runtimes = ["1.20.1"]

[[tree.branch]]
loader = "forge"
"#,
    );

    modship_cmd(td.path())
        .arg("plan")
        .assert()
        .failure()
        .stderr(contains("no common project for 1.20.1-forge"));
}

#[cfg(not(windows))]
#[test]
fn build_then_dry_run_publish() {
    let td = tempdir().expect("tempdir");
    let script = write_script(td.path(), BUILD_SCRIPT);
    create_project(td.path(), &script.display().to_string());

    modship_cmd(td.path())
        .args(["--jobs", "2", "build"])
        .assert()
        .success()
        .stdout(contains("1.20.1-forge:"))
        .stdout(contains("Written"));
    assert!(
        td.path()
            .join("output/1.0.0/neoforge/demo-neoforge-1.0.0+1.21.1.jar")
            .is_file()
    );

    modship_cmd(td.path())
        .args(["--dry-run", "publish"])
        .assert()
        .success()
        .stdout(contains("1.20.1-forge -> modrinth: dry-run"))
        .stdout(contains("1.21.1-neoforge -> modrinth: dry-run"))
        .stdout(contains("phase: Done"))
        .stderr(contains("[warn]"));

    assert!(td.path().join("output/1.0.0/report.json").is_file());
}

#[cfg(not(windows))]
#[test]
fn dry_run_env_is_honoured() {
    let td = tempdir().expect("tempdir");
    let script = write_script(td.path(), BUILD_SCRIPT);
    create_project(td.path(), &script.display().to_string());

    modship_cmd(td.path())
        .env("PUBLISH_DRY_RUN", "1")
        .arg("release")
        .assert()
        .success()
        .stdout(contains("phase: Done"));
}

#[test]
fn publish_without_artifacts_exits_non_zero() {
    let td = tempdir().expect("tempdir");
    create_project(td.path(), "true");

    modship_cmd(td.path())
        .args(["--dry-run", "publish"])
        .assert()
        .failure()
        .stdout(contains("phase: Failed"))
        .stderr(contains("release did not complete"));
}

#[cfg(not(windows))]
#[test]
fn failing_build_stops_release() {
    let td = tempdir().expect("tempdir");
    let script = write_script(td.path(), "#!/usr/bin/env sh\necho broken >&2\nexit 3\n");
    create_project(td.path(), &script.display().to_string());

    modship_cmd(td.path())
        .args(["--dry-run", "release"])
        .assert()
        .failure()
        .stderr(contains("exited with code 3"));
    assert!(!td.path().join("output/1.0.0/forge").exists());
}
