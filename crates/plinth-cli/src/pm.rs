//! Package manager detection.
//!
//! When a bundler command fails to spawn, the error hint names the
//! project's package manager so the remediation uses the right tool.
//! The manager is inferred from the lockfile at the project root; npm is
//! the fallback when no lockfile is present.

use std::path::Path;

/// A JavaScript package manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    Npm,
    Yarn,
    Pnpm,
    Bun,
}

impl PackageManager {
    /// Detect the package manager for the project at `cwd`.
    ///
    /// Lockfiles are checked from most to least specific. Projects without
    /// any lockfile resolve to npm.
    pub fn detect(cwd: &Path) -> Self {
        if cwd.join("bun.lockb").exists() || cwd.join("bun.lock").exists() {
            PackageManager::Bun
        } else if cwd.join("pnpm-lock.yaml").exists() {
            PackageManager::Pnpm
        } else if cwd.join("yarn.lock").exists() {
            PackageManager::Yarn
        } else {
            PackageManager::Npm
        }
    }

    /// Manager name as invoked on the command line.
    pub fn name(&self) -> &'static str {
        match self {
            PackageManager::Npm => "npm",
            PackageManager::Yarn => "yarn",
            PackageManager::Pnpm => "pnpm",
            PackageManager::Bun => "bun",
        }
    }

    /// Hint appended to spawn failures.
    pub fn install_hint(&self) -> String {
        format!(
            "Run '{} install' to install the project's dependencies",
            self.name()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_no_lockfile_means_npm() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(PackageManager::detect(dir.path()), PackageManager::Npm);
    }

    #[test]
    fn test_lockfiles_resolve_their_manager() {
        let cases = [
            ("yarn.lock", PackageManager::Yarn),
            ("pnpm-lock.yaml", PackageManager::Pnpm),
            ("bun.lockb", PackageManager::Bun),
            ("bun.lock", PackageManager::Bun),
        ];
        for (lockfile, expected) in cases {
            let dir = tempfile::tempdir().unwrap();
            fs::write(dir.path().join(lockfile), "").unwrap();
            assert_eq!(PackageManager::detect(dir.path()), expected, "{lockfile}");
        }
    }

    #[test]
    fn test_bun_wins_over_yarn() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("bun.lockb"), "").unwrap();
        fs::write(dir.path().join("yarn.lock"), "").unwrap();
        assert_eq!(PackageManager::detect(dir.path()), PackageManager::Bun);
    }

    #[test]
    fn test_install_hint_names_the_manager() {
        assert!(PackageManager::Yarn.install_hint().contains("yarn install"));
    }
}
