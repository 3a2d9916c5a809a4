mod common;

#[cfg(unix)]
mod build_tests;
