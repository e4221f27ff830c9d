//! The tool's own version, used to check `terramate.required_version`.
//!
//! Production code always reads [`current`]; tests that need to pin a
//! version call [`set_test_override`] before any worker starts — this is
//! the one mutable global the concurrency model permits.

use std::sync::OnceLock;

static TEST_OVERRIDE: OnceLock<String> = OnceLock::new();

/// The running binary's semantic version.
pub fn current() -> &'static str {
    TEST_OVERRIDE
        .get()
        .map(String::as_str)
        .unwrap_or(env!("CARGO_PKG_VERSION"))
}

/// Pin the version reported by [`current`] for the remainder of the
/// process. Only meant for tests; must be called before any worker thread
/// starts since it is read without synchronization afterwards.
pub fn set_test_override(version: impl Into<String>) {
    let _ = TEST_OVERRIDE.set(version.into());
}

/// Check `required` (a semver range, e.g. `">= 0.5, < 1.0"`) against
/// [`current`]. Returns `Ok(())` when satisfied.
pub fn check_required(required: &str) -> crate::core::error::Result<()> {
    let req = semver::VersionReq::parse(required).map_err(|e| crate::core::error::TmError::VersionMismatch {
        tool_version: current().to_string(),
        required: format!("{required} ({e})"),
    })?;
    let version = semver::Version::parse(current()).map_err(|e| crate::core::error::TmError::VersionMismatch {
        tool_version: format!("{} ({e})", current()),
        required: required.to_string(),
    })?;
    if req.matches(&version) {
        Ok(())
    } else {
        Err(crate::core::error::TmError::VersionMismatch {
            tool_version: current().to_string(),
            required: required.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_version_checked_against_current() {
        let v = current().to_string();
        assert!(check_required(&format!(">= {v}")).is_ok());
        assert!(check_required("< 0.0.1").is_err());
    }
}
