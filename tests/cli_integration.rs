//! CLI integration tests for kiln.
//!
//! These tests drive the real binary. Build tests replace cmake, python, the
//! CLI entry point and the repair tool with shell-script stubs configured
//! through kiln.toml, so no toolchain is needed.

use std::fs;
use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use tempfile::TempDir;

const KILN_VARS: &[&str] = &[
    "KILN_BACKEND",
    "KILN_THREADS",
    "KILN_RUN_TESTS",
    "KILN_BUILD_WHEEL",
    "KILN_BUILD_TYPE",
    "KILN_CPU_SHIM",
    "KILN_SOURCE_ROOT",
    "KILN_BUILD_DIR",
    "KILN_OUT_DIR",
    "KILN_FORMAT",
    "RUST_LOG",
];

/// Get the kiln binary command, isolated from the caller's environment.
fn kiln(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("kiln").unwrap();
    cmd.current_dir(dir).env("HOME", dir);
    for var in KILN_VARS {
        cmd.env_remove(var);
    }
    cmd
}

/// Create a temporary directory for test projects.
fn temp_dir() -> TempDir {
    TempDir::new().unwrap()
}

// ============================================================================
// kiln --help / settings
// ============================================================================

#[test]
fn test_help_lists_commands() {
    let tmp = temp_dir();

    kiln(tmp.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("build"))
        .stdout(predicate::str::contains("settings"))
        .stdout(predicate::str::contains("doctor"));
}

#[test]
fn test_settings_prints_cmake_cache() {
    let tmp = temp_dir();

    kiln(tmp.path())
        .args(["settings", "--backend", "cuda"])
        .assert()
        .success()
        .stdout(predicate::str::contains("set(GGML_CUDA ON CACHE BOOL"))
        .stdout(predicate::str::contains("set(GGML_VULKAN OFF CACHE BOOL"))
        .stdout(predicate::str::contains("CMAKE_CUDA_ARCHITECTURES"));

    // Printing settings never writes them
    assert!(!tmp.path().join("build").exists());
}

#[test]
fn test_settings_json_reads_env() {
    let tmp = temp_dir();

    let output = kiln(tmp.path())
        .args(["settings", "--json"])
        .env("KILN_BACKEND", "Vulkan")
        .output()
        .unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["backend"], "vulkan");
    assert_eq!(json["settings"]["GGML_VULKAN"], "ON");
    assert_eq!(json["digest"].as_str().unwrap().len(), 64);
}

#[test]
fn test_settings_reads_project_config() {
    let tmp = temp_dir();
    fs::write(
        tmp.path().join("kiln.toml"),
        "[build]\nbackend = \"metal\"\nbuild_type = \"Debug\"\n",
    )
    .unwrap();

    kiln(tmp.path())
        .arg("settings")
        .assert()
        .success()
        .stdout(predicate::str::contains("set(GGML_METAL ON CACHE BOOL"))
        .stdout(predicate::str::contains("set(CMAKE_BUILD_TYPE \"Debug\""));
}

// ============================================================================
// configuration errors
// ============================================================================

#[test]
fn test_unknown_backend_exits_2() {
    let tmp = temp_dir();

    kiln(tmp.path())
        .args(["build", "--backend", "quantum"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("invalid backend `quantum`"));

    assert!(!tmp.path().join("build").exists());
}

#[test]
fn test_invalid_threads_exits_2() {
    let tmp = temp_dir();

    kiln(tmp.path())
        .args(["settings", "--threads", "0"])
        .assert()
        .code(2);
}

#[test]
fn test_malformed_project_config_exits_2() {
    let tmp = temp_dir();
    fs::write(
        tmp.path().join("kiln.toml"),
        "[build]\nbackend = \"cuda\"\nthreads = -2\n",
    )
    .unwrap();

    kiln(tmp.path())
        .args(["build", "--dry-run"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("invalid config file"));
}

#[test]
fn test_empty_library_list_exits_2() {
    let tmp = temp_dir();
    fs::write(tmp.path().join("kiln.toml"), "[package]\nlibraries = []\n").unwrap();

    kiln(tmp.path())
        .args(["build", "--backend", "cpu"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("invalid package.libraries"));

    assert!(!tmp.path().join("build").exists());
}

#[test]
fn test_dry_run_runs_nothing() {
    let tmp = temp_dir();

    kiln(tmp.path())
        .args(["build", "--dry-run", "--backend", "cpu", "--run-tests"])
        .assert()
        .success()
        .stdout(predicate::str::contains("configure"))
        .stdout(predicate::str::contains("-m pytest"))
        .stdout(predicate::str::contains("pip wheel").not());

    assert!(!tmp.path().join("build").exists());
}

#[test]
fn test_clean_removes_build_dir() {
    let tmp = temp_dir();
    fs::create_dir_all(tmp.path().join("build/bin")).unwrap();
    fs::write(tmp.path().join("build/bin/libllama.so"), b"x").unwrap();

    kiln(tmp.path()).arg("clean").assert().success();

    assert!(!tmp.path().join("build").exists());
}

#[test]
fn test_completions_bash() {
    let tmp = temp_dir();

    kiln(tmp.path())
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("kiln"));
}

// ============================================================================
// kiln build against stub tools
// ============================================================================

#[cfg(target_os = "linux")]
mod stubbed {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    const CMAKE: &str = r#"#!/bin/sh
echo "cmake $*" >> "$STUB_LOG"
if [ "$1" = "--build" ]; then
    if [ -n "$STUB_COMPILE_FAIL" ]; then
        echo "nvcc fatal : Unsupported gpu architecture 'compute_52'" >&2
        exit 1
    fi
    mkdir -p "$2/bin"
    printf 'ELF' > "$2/bin/libllama.so"
    printf 'ELF' > "$2/bin/libggml.so"
    echo "[100%] Built target llama"
else
    echo "-- Configuring done"
fi
"#;

    const PYTHON: &str = r#"#!/bin/sh
echo "python $*" >> "$STUB_LOG"
case "$1 $2 $3" in
    "--version"*) echo "Python 3.11.6" ;;
    "-m pip --version") echo "pip 24.0" ;;
    "-m pip install") echo "Successfully installed llama_chat" ;;
    "-m pytest "*) echo "3 passed" ;;
    "-m pip wheel")
        out=""
        prev=""
        for arg in "$@"; do
            if [ "$prev" = "-w" ]; then out="$arg"; fi
            prev="$arg"
        done
        mkdir -p "$out"
        printf 'PK raw' > "$out/llama_chat-0.1.0-cp311-cp311-linux_x86_64.whl"
        ;;
    "-c "*) echo "kiln-import-ok" ;;
    *) echo "unexpected: $*" >&2; exit 2 ;;
esac
"#;

    const CLI: &str = r#"#!/bin/sh
echo "usage: llama-chat [-h]"
"#;

    const AUDITWHEEL: &str = r#"#!/bin/sh
echo "auditwheel $*" >> "$STUB_LOG"
if [ -n "$STUB_REPAIR_FAIL" ]; then
    echo "cannot repair: too-recent versioned symbols" >&2
    exit 1
fi
mkdir -p "$4"
printf 'PK fixed' > "$4/llama_chat-0.1.0-cp311-cp311-manylinux_2_28_x86_64.whl"
"#;

    struct StubProject {
        dir: TempDir,
    }

    impl StubProject {
        fn new() -> Self {
            let dir = temp_dir();
            let stubs = dir.path().join("stubs");
            fs::create_dir_all(&stubs).unwrap();
            for (name, body) in [
                ("cmake", CMAKE),
                ("python", PYTHON),
                ("llama-chat", CLI),
                ("auditwheel", AUDITWHEEL),
            ] {
                let path = stubs.join(name);
                fs::write(&path, body).unwrap();
                fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
            }

            fs::write(dir.path().join("CMakeLists.txt"), "project(llama_chat)\n").unwrap();
            fs::write(
                dir.path().join("kiln.toml"),
                format!(
                    "[tools]\ncmake = \"{s}/cmake\"\npython = \"{s}/python\"\ncli = \"{s}/llama-chat\"\nrepair = \"{s}/auditwheel\"\n",
                    s = stubs.display()
                ),
            )
            .unwrap();

            StubProject { dir }
        }

        fn path(&self) -> &Path {
            self.dir.path()
        }

        fn kiln(&self) -> Command {
            let mut cmd = kiln(self.path());
            cmd.env("STUB_LOG", self.log_path());
            cmd.env_remove("STUB_COMPILE_FAIL");
            cmd.env_remove("STUB_REPAIR_FAIL");
            cmd
        }

        fn log_path(&self) -> std::path::PathBuf {
            self.path().join("calls.log")
        }

        fn log(&self) -> String {
            fs::read_to_string(self.log_path()).unwrap_or_default()
        }
    }

    #[test]
    fn test_unknown_backend_invokes_nothing() {
        let project = StubProject::new();

        project
            .kiln()
            .args(["build", "--backend", "quantum"])
            .assert()
            .code(2);

        assert_eq!(project.log(), "");
    }

    #[test]
    fn test_cpu_build_succeeds() {
        let project = StubProject::new();

        project
            .kiln()
            .args(["build", "--backend", "cpu", "--threads", "2"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Result: SUCCEEDED (4/4 stages passed)"));

        let settings =
            fs::read_to_string(project.path().join("build/kiln/settings.cmake")).unwrap();
        assert!(settings.contains("set(GGML_VULKAN ON CACHE BOOL"));
        assert!(project.log().contains("--parallel 2"));
        assert!(!project.log().contains("pytest"));
    }

    #[test]
    fn test_compile_failure_exits_4() {
        let project = StubProject::new();

        project
            .kiln()
            .args(["build", "--backend", "cuda", "--build-wheel"])
            .env("STUB_COMPILE_FAIL", "1")
            .assert()
            .code(4)
            .stdout(predicate::str::contains("[FAIL] compile"))
            .stderr(predicate::str::contains("nvcc fatal"));

        assert!(!project.log().contains("pip wheel"));
        assert!(!project.path().join("dist").exists());
    }

    #[test]
    fn test_full_build_json_report() {
        let project = StubProject::new();

        let output = project
            .kiln()
            .args([
                "build",
                "--backend",
                "vulkan",
                "--run-tests",
                "--build-wheel",
                "--format",
                "json",
            ])
            .output()
            .unwrap();
        assert_eq!(output.status.code(), Some(0));

        let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(json["state"], "succeeded");
        assert_eq!(json["stages"].as_array().unwrap().len(), 6);
        assert!(json["warnings"].as_array().unwrap().is_empty());
        assert!(project
            .path()
            .join("dist/llama_chat-0.1.0-cp311-cp311-manylinux_2_28_x86_64.whl")
            .exists());
        assert!(project.log().contains("--exclude libvulkan"));
    }

    #[test]
    fn test_repair_failure_falls_back() {
        let project = StubProject::new();

        project
            .kiln()
            .args(["build", "--backend", "cpu", "--build-wheel"])
            .env("STUB_REPAIR_FAIL", "1")
            .assert()
            .success()
            .stdout(predicate::str::contains("Warnings:"))
            .stdout(predicate::str::contains("too-recent versioned symbols"));

        assert!(project
            .path()
            .join("dist/llama_chat-0.1.0-cp311-cp311-linux_x86_64.whl")
            .exists());
    }

    #[test]
    fn test_doctor_finds_stubs() {
        let project = StubProject::new();

        project
            .kiln()
            .arg("doctor")
            .assert()
            .stdout(predicate::str::contains("[OK] CMake"))
            .stdout(predicate::str::contains("[OK] Source tree"));
    }
}
