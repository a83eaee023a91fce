//! Decides whether a package needs to be (re)installed.

use crate::catalog::PackageSpec;
use crate::registry::InstalledPackageRecord;

/// Per-operation install policy flags. Not persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InstallModifiers {
    /// Reinstall even when the requirement is already satisfied.
    pub force: bool,
    /// Compare installed vs catalog version; without this, mere presence
    /// satisfies the requirement.
    pub checkversion: bool,
}

/// Version resolver - pure functions for install decisions.
pub struct VersionResolver;

impl VersionResolver {
    /// Whether an install (or reinstall) is required.
    ///
    /// The checks run in this order, and the order is load-bearing:
    /// 1. no record: install, whatever the flags say;
    /// 2. force: reinstall unconditionally;
    /// 3. checkversion: reinstall iff the installed version differs;
    /// 4. otherwise presence alone satisfies the requirement.
    pub fn needs_install(
        spec: &PackageSpec,
        existing: Option<&InstalledPackageRecord>,
        modifiers: InstallModifiers,
    ) -> bool {
        let Some(existing) = existing else {
            return true;
        };
        if modifiers.force {
            return true;
        }
        if modifiers.checkversion {
            return existing.version != spec.version;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    fn spec(version: &str) -> PackageSpec {
        PackageSpec {
            name: "examples".to_string(),
            version: version.to_string(),
            description: None,
            artifacts: BTreeMap::new(),
        }
    }

    fn installed(version: &str) -> InstalledPackageRecord {
        InstalledPackageRecord {
            name: "examples".to_string(),
            version: version.to_string(),
            path: PathBuf::from("/root/examples"),
        }
    }

    fn modifiers(force: bool, checkversion: bool) -> InstallModifiers {
        InstallModifiers { force, checkversion }
    }

    #[test]
    fn test_absent_record_always_installs() {
        let spec = spec("2.0");
        for force in [false, true] {
            for checkversion in [false, true] {
                assert!(VersionResolver::needs_install(
                    &spec,
                    None,
                    modifiers(force, checkversion)
                ));
            }
        }
    }

    #[test]
    fn test_force_wins_regardless_of_version() {
        let spec = spec("2.0");
        let same = installed("2.0");
        let different = installed("1.0");

        assert!(VersionResolver::needs_install(
            &spec,
            Some(&same),
            modifiers(true, true)
        ));
        assert!(VersionResolver::needs_install(
            &spec,
            Some(&same),
            modifiers(true, false)
        ));
        assert!(VersionResolver::needs_install(
            &spec,
            Some(&different),
            modifiers(true, true)
        ));
    }

    #[test]
    fn test_checkversion_compares_versions() {
        let spec = spec("2.0");

        assert!(!VersionResolver::needs_install(
            &spec,
            Some(&installed("2.0")),
            modifiers(false, true)
        ));
        assert!(VersionResolver::needs_install(
            &spec,
            Some(&installed("1.0")),
            modifiers(false, true)
        ));
    }

    #[test]
    fn test_presence_alone_satisfies_without_checkversion() {
        // Preserved quirk: a stale version with neither flag set is left
        // alone; downstream tooling depends on this being a no-op.
        let spec = spec("2.0");
        assert!(!VersionResolver::needs_install(
            &spec,
            Some(&installed("1.0")),
            modifiers(false, false)
        ));
    }

    #[test]
    fn test_adopted_record_with_unknown_version_reinstalls_under_checkversion() {
        let spec = spec("2.0");
        let adopted = installed("");
        assert!(VersionResolver::needs_install(
            &spec,
            Some(&adopted),
            modifiers(false, true)
        ));
        assert!(!VersionResolver::needs_install(
            &spec,
            Some(&adopted),
            modifiers(false, false)
        ));
    }
}
