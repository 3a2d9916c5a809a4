//! Header extraction from dependency-listing output.
//!
//! The compiler prints a make rule such as
//!
//! ```text
//! obj.o: src/b.cpp src/common.h \
//!   include/util.hpp
//! ```
//!
//! Every token made of path characters and ending in a header suffix is taken
//! as a dependency. This is deliberately syntax-light: unusual file names may
//! be missed or over-matched, which only affects staleness input.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;

static HEADER_PATTERN: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"[\w./\\-]+\.(?:h|hh|hpp|hxx)\b").expect("header pattern is a valid regex"));

/// Extract header paths from make-rule output.
///
/// Returns `None` when the text does not look like a make rule at all.
pub fn parse_headers(output: &str) -> Option<BTreeSet<PathBuf>> {
  if !output.contains(':') {
    return None;
  }

  Some(
    HEADER_PATTERN
      .find_iter(output)
      .map(|m| PathBuf::from(m.as_str()))
      .collect(),
  )
}
