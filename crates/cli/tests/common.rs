// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

// Allow unused items: test helpers are shared across multiple test binaries,
// and not every test file uses every helper.
#![allow(dead_code)]
#![allow(unused_imports)]

use std::path::PathBuf;

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;

pub use predicates::prelude::*;
pub use tempfile::TempDir;

pub fn tether() -> Command {
    cargo_bin_cmd!("tether")
}

/// Writes `content` as `tether.toml` in `temp` and returns its path.
pub fn write_config(temp: &TempDir, content: &str) -> PathBuf {
    let path = temp.path().join("tether.toml");
    std::fs::write(&path, content).unwrap();
    path
}

/// Current wall clock in milliseconds since Unix epoch.
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64
}
