//! Build script for worker-pattern
//!
//! Stamps the build date into the binary so `--version` can report it.
//! Set `BUILD_DATE` to pin the value (e.g. for reproducible release builds).

use std::env;

fn main() {
    println!("cargo:rerun-if-env-changed=BUILD_DATE");

    let build_date = match env::var("BUILD_DATE") {
        Ok(date) if !date.trim().is_empty() => date,
        _ => chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
    };

    println!("cargo:rustc-env=WORKER_PATTERN_BUILD_DATE={}", build_date);
}
