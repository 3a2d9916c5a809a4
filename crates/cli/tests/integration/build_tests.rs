//! Build, plan and clean against a stub toolchain.

use predicates::prelude::*;

use super::common::TestEnv;

const APP: &str = r#"
[targets.app]
sources = ["main.cpp", "util.cpp"]
"#;

fn app_env() -> TestEnv {
  let env = TestEnv::new(APP);
  env.write_file("common.h", "#pragma once\n");
  env.write_file("main.cpp", "#include \"common.h\"\nint main() { return 0; }\n");
  env.write_file("util.cpp", "int util() { return 1; }\n");
  env
}

#[test]
fn build_compiles_and_links() {
  let env = app_env();

  env
    .kiln_cmd()
    .arg("build")
    .assert()
    .success()
    .stdout(predicate::str::contains("app built"));

  assert!(env.path("build/obj/app/main.o").exists());
  assert!(env.path("build/obj/app/util.o").exists());
  assert!(env.path("app").exists());
  assert!(env.path("build/.kiln/deps.json").exists());
  assert_eq!(env.invocations().len(), 3);
}

#[test]
fn second_build_is_a_no_op() {
  let env = app_env();
  env.kiln_cmd().arg("build").assert().success();
  env.clear_invocations();

  env
    .kiln_cmd()
    .arg("build")
    .assert()
    .success()
    .stdout(predicate::str::contains("app up to date"));

  assert!(env.invocations().is_empty());
}

#[test]
fn dependency_records_list_scanned_headers() {
  let env = app_env();
  env.kiln_cmd().arg("build").assert().success();

  let deps: serde_json::Value =
    serde_json::from_str(&std::fs::read_to_string(env.path("build/.kiln/deps.json")).unwrap()).unwrap();
  let headers = &deps["records"]["main.cpp@app"]["headers"];
  assert_eq!(headers.as_array().unwrap().len(), 1);
  assert_eq!(headers[0], "common.h");
  assert!(deps["records"]["util.cpp@app"]["headers"].as_array().unwrap().is_empty());
}

#[test]
fn failing_target_does_not_stop_others() {
  let env = TestEnv::new(
    r#"
[targets.good]
sources = ["good.cpp"]

[targets.bad]
sources = ["bad.cpp", "fine.cpp"]
"#,
  );
  env.write_file("good.cpp", "int main() { return 0; }\n");
  env.write_file("bad.cpp", "#error stop\n");
  env.write_file("fine.cpp", "int fine() { return 0; }\n");

  env
    .kiln_cmd()
    .arg("build")
    .assert()
    .failure()
    .stdout(predicate::str::contains("good built"))
    .stderr(predicate::str::contains("bad.cpp@bad"))
    .stderr(predicate::str::contains("#error stop"));

  assert!(env.path("good").exists());
  assert!(!env.path("bad").exists());
}

#[test]
fn json_report() {
  let env = app_env();

  let output = env.kiln_cmd().arg("--json").arg("build").output().unwrap();
  assert!(output.status.success());

  let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  assert_eq!(report["targets"]["app"], "built");
  let tasks = report["tasks"].as_array().unwrap();
  assert_eq!(tasks.len(), 3);
  assert!(tasks.iter().all(|t| t["status"] == "success"));
  assert_eq!(tasks[2]["id"], "link@app");
}

#[test]
fn extra_flags_reach_the_compiler() {
  let env = app_env();

  env
    .kiln_cmd()
    .args(["build", "--flag", "-DEXTRA", "-j", "1"])
    .assert()
    .success();

  let compiles: Vec<_> = env.invocations().into_iter().filter(|l| l.starts_with("-c")).collect();
  assert_eq!(compiles.len(), 2);
  assert!(compiles.iter().all(|l| l.contains("-DEXTRA")));
}

#[test]
fn plan_reports_pending_work_then_nothing() {
  let env = app_env();

  env
    .kiln_cmd()
    .arg("plan")
    .assert()
    .success()
    .stdout(predicate::str::contains("main.cpp@app"))
    .stdout(predicate::str::contains("link@app"));
  assert!(env.invocations().is_empty());

  env.kiln_cmd().arg("build").assert().success();

  env
    .kiln_cmd()
    .arg("plan")
    .assert()
    .success()
    .stdout(predicate::str::contains("up to date"));
}

#[test]
fn clean_removes_outputs_and_records() {
  let env = app_env();
  env.kiln_cmd().arg("build").assert().success();

  env
    .kiln_cmd()
    .arg("clean")
    .assert()
    .success()
    .stdout(predicate::str::contains("Clean complete"));

  assert!(!env.path("app").exists());
  assert!(!env.path("build/obj/app/main.o").exists());

  env.clear_invocations();
  env.kiln_cmd().arg("build").assert().success();
  assert_eq!(env.invocations().len(), 3);
}
