//! Platform-specific naming and linker conventions.

/// Suffix the OS expects on executables (`.exe` on Windows, empty elsewhere).
pub fn exe_suffix() -> &'static str {
  std::env::consts::EXE_SUFFIX
}

/// File name of a static library archive for `name`.
#[cfg(windows)]
pub fn static_library_name(name: &str) -> String {
  format!("{}.lib", name)
}

/// File name of a static library archive for `name`.
#[cfg(not(windows))]
pub fn static_library_name(name: &str) -> String {
  format!("lib{}.a", name)
}

/// Candidate file names the linker would accept for `-l<name>`.
pub fn library_file_names(name: &str) -> Vec<String> {
  let mut names = vec![static_library_name(name)];
  if cfg!(target_os = "macos") {
    names.push(format!("lib{}.dylib", name));
  } else if cfg!(windows) {
    names.push(format!("{}.dll", name));
  } else {
    names.push(format!("lib{}.so", name));
  }
  names
}

/// Whether the linker accepts `--start-group`/`--end-group`.
///
/// The macOS linker resolves archives regardless of order and rejects the flags.
pub fn supports_link_groups() -> bool {
  !cfg!(target_os = "macos")
}
