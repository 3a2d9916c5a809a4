//! Build file to plan and clean through the public API. No process is started.

use std::path::Path;

use kiln_lib::config::{BuildFile, ConfigError, TaskKey};
use kiln_lib::execute::{self, ExecuteError, TaskId};
use kiln_lib::stale::StaleReason;
use tempfile::TempDir;

const BUILD_FILE: &str = r#"
[defaults]
cxx = "g++"
parallelism = 2

[groups.core]
sources = ["src/a.cpp", { path = "src/b.cpp", flags = ["-DB_ONLY"] }]

[targets.main]
groups = ["core"]
sources = ["main.cpp"]
flags = ["-DMAIN"]

[targets.ut]
groups = ["core"]
flags = ["-DUT"]
"#;

fn project() -> (TempDir, BuildFile) {
  let temp = TempDir::new().unwrap();
  let path = temp.path().join("kiln.toml");
  std::fs::write(&path, BUILD_FILE).unwrap();
  for source in ["src/a.cpp", "src/b.cpp", "main.cpp"] {
    let file = temp.path().join(source);
    std::fs::create_dir_all(file.parent().unwrap()).unwrap();
    std::fs::write(file, "int x;\n").unwrap();
  }
  let build_file = BuildFile::load(&path).unwrap();
  (temp, build_file)
}

fn compile_id(target: &str, source: &str) -> TaskId {
  TaskId::Compile(TaskKey::new(target, Path::new(source)))
}

#[test]
fn fresh_project_plans_every_task() {
  let (temp, build_file) = project();
  let registry = build_file.to_registry().unwrap();
  let config = build_file.execute_config(temp.path());

  let plan = execute::plan(&registry, &[], &config).unwrap();

  assert_eq!(plan.waves.len(), 2);
  assert_eq!(plan.stale_count(), 7);

  let b = plan.entry(&compile_id("main", "src/b.cpp")).unwrap();
  assert!(b.rescan);
  assert_eq!(b.staleness.reason(), Some(&StaleReason::MissingOutput));
  let invocation = b.invocation.as_deref().unwrap();
  assert!(invocation.contains("-DMAIN -DB_ONLY"));
  assert!(invocation.ends_with("src/b.cpp"));

  let link = plan.entry(&TaskId::Link("ut".to_string())).unwrap();
  assert_eq!(link.wave, 1);
}

#[test]
fn plan_honours_target_selection() {
  let (temp, build_file) = project();
  let registry = build_file.to_registry().unwrap();
  let config = build_file.execute_config(temp.path());

  let plan = execute::plan(&registry, &["ut".to_string()], &config).unwrap();

  assert_eq!(plan.entries().count(), 3);
  assert!(plan.entries().all(|e| e.id.target() == "ut"));
}

#[test]
fn unknown_target_is_a_config_error() {
  let (temp, build_file) = project();
  let registry = build_file.to_registry().unwrap();
  let config = build_file.execute_config(temp.path());

  let err = execute::plan(&registry, &["nope".to_string()], &config).unwrap_err();
  assert!(matches!(err, ExecuteError::Config(ConfigError::UnknownTarget(name)) if name == "nope"));
}

#[test]
fn clean_removes_only_selected_outputs() {
  let (temp, build_file) = project();
  let registry = build_file.to_registry().unwrap();
  let config = build_file.execute_config(temp.path());

  let artifact = format!("main{}", std::env::consts::EXE_SUFFIX);
  let outputs = [
    "build/obj/main/a.o",
    "build/obj/main/b.o",
    "build/obj/main/main.o",
    artifact.as_str(),
    "build/obj/ut/a.o",
  ];
  for output in outputs {
    let path = temp.path().join(output);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, "").unwrap();
  }

  let report = execute::clean(&registry, &["main".to_string()], &config).unwrap();

  assert_eq!(report.removed.len(), 4);
  assert_eq!(report.records, 0);
  assert!(!temp.path().join(&artifact).exists());
  assert!(temp.path().join("build/obj/ut/a.o").exists());
}
