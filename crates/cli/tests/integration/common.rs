//! Shared test helpers for CLI integration tests.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use tempfile::TempDir;

/// Stand-in for the compiler, archiver and linker.
///
/// - `-MM <src>` prints a make rule listing the quoted includes of `src`
/// - `rcs <out> ...` touches `out`
/// - anything else touches the argument after `-o`, failing first if the
///   last argument is a source containing `#error`
const STUB_TOOL: &str = r#"#!/bin/sh
case "$1" in
  -MM)
    src="$2"
    printf '%s.o: %s' "$(basename "${src%.*}")" "$src"
    for h in $(sed -n 's/^#include "\(.*\)"/\1/p' "$src"); do printf ' %s' "$h"; done
    printf '\n'
    exit 0
    ;;
  rcs)
    touch "$2"
    exit 0
    ;;
esac
for last; do :; done
if [ "$1" = "-c" ] && grep -q '#error' "$last"; then
  echo "$last:1:2: error: #error stop" >&2
  exit 1
fi
prev=""
for a in "$@"; do
  if [ "$prev" = "-o" ]; then touch "$a"; fi
  prev="$a"
done
echo "$*" >> invocations.log
exit 0
"#;

/// Isolated project directory with a stub toolchain.
pub struct TestEnv {
  pub temp: TempDir,
  pub build_file: PathBuf,
}

impl TestEnv {
  /// Create a project whose `[defaults]` point every tool at the stub.
  ///
  /// `targets` is appended to the generated build file verbatim.
  pub fn new(targets: &str) -> Self {
    let temp = TempDir::new().unwrap();
    let tool = temp.path().join("stub-tool.sh");
    std::fs::write(&tool, STUB_TOOL).unwrap();
    make_executable(&tool);

    let tool = tool.display().to_string();
    let content = format!(
      "[defaults]\ncc = \"{tool}\"\ncxx = \"{tool}\"\nar = \"{tool}\"\nparallelism = 2\n\n{targets}"
    );
    let build_file = temp.path().join("kiln.toml");
    std::fs::write(&build_file, content).unwrap();

    Self { temp, build_file }
  }

  /// Write a file relative to the project directory.
  pub fn write_file(&self, relative_path: &str, content: &str) {
    let path = self.temp.path().join(relative_path);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
  }

  pub fn path(&self, relative_path: &str) -> PathBuf {
    self.temp.path().join(relative_path)
  }

  /// Lines the stub appended for each compile and link it performed.
  pub fn invocations(&self) -> Vec<String> {
    std::fs::read_to_string(self.path("invocations.log"))
      .unwrap_or_default()
      .lines()
      .map(String::from)
      .collect()
  }

  pub fn clear_invocations(&self) {
    let _ = std::fs::remove_file(self.path("invocations.log"));
  }

  /// Get a Command for the kiln binary pointed at this project.
  pub fn kiln_cmd(&self) -> Command {
    let mut cmd: Command = cargo_bin_cmd!("kiln");
    cmd.arg("-f").arg(&self.build_file);
    cmd.env_remove("RUST_LOG");
    cmd
  }
}

#[cfg(unix)]
fn make_executable(path: &Path) {
  use std::os::unix::fs::PermissionsExt;
  std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) {}
