//! Version gate
//!
//! Closed-range membership of the host version in the entry's declared
//! bounds, with an early-access carve-out. Unparseable version strings
//! fail closed: they are reported, never silently allowed.

use plugget_errors::{Error, InstallError};
use plugget_manifest::ManifestEntry;
use plugget_types::HostVersion;

/// Check whether `host` may install `entry`, with a specific reason on
/// rejection
///
/// # Errors
///
/// `VersionError::UnknownVersion` if a bound does not parse,
/// `InstallError::IncompatibleVersion` if the host falls outside the
/// entry's range, `InstallError::EarlyAccessExcluded` if the host is an
/// early access build and the entry opts out of those.
pub fn check_compatibility(entry: &ManifestEntry, host: HostVersion) -> Result<(), Error> {
    let min: HostVersion = entry.min_version.parse()?;
    let max: HostVersion = entry.max_version.parse()?;

    if host.key() < min.key() || host.key() > max.key() {
        return Err(InstallError::IncompatibleVersion {
            id: entry.id.to_string(),
            host: host.to_string(),
            min: entry.min_version.clone(),
            max: entry.max_version.clone(),
        }
        .into());
    }

    if host.early_access && entry.exclude_early_access {
        return Err(InstallError::EarlyAccessExcluded {
            id: entry.id.to_string(),
        }
        .into());
    }

    Ok(())
}

/// Boolean view of [`check_compatibility`]
#[must_use]
pub fn is_compatible(entry: &ManifestEntry, host: HostVersion) -> bool {
    check_compatibility(entry, host).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use plugget_errors::VersionError;
    use plugget_types::PluginId;

    fn entry(min: &str, max: &str, exclude_early_access: bool) -> ManifestEntry {
        ManifestEntry {
            id: PluginId::new("foo").unwrap(),
            name: "Foo".to_string(),
            version: "1.0.0".to_string(),
            url: "https://packages.example.com/foo.zip".to_string(),
            checksum: "ab".repeat(32),
            min_version: min.to_string(),
            max_version: max.to_string(),
            exclude_early_access,
        }
    }

    #[test]
    fn host_inside_range_is_compatible() {
        let host: HostVersion = "5.3".parse().unwrap();
        assert!(is_compatible(&entry("5.0", "5.4", false), host));
    }

    #[test]
    fn bounds_are_inclusive() {
        let entry = entry("5.0", "5.4", false);
        assert!(is_compatible(&entry, "5.0".parse().unwrap()));
        assert!(is_compatible(&entry, "5.4".parse().unwrap()));
    }

    #[test]
    fn host_above_range_is_rejected() {
        let host: HostVersion = "5.5".parse().unwrap();
        let err = check_compatibility(&entry("5.0", "5.4", false), host).unwrap_err();
        assert!(matches!(
            err,
            Error::Install(InstallError::IncompatibleVersion { .. })
        ));
    }

    #[test]
    fn host_below_range_is_rejected() {
        let host: HostVersion = "4.9".parse().unwrap();
        assert!(!is_compatible(&entry("5.0", "5.4", false), host));
    }

    #[test]
    fn early_access_carve_out() {
        let ea_host: HostVersion = "5.3-ea".parse().unwrap();

        // In range, entry allows early access
        assert!(is_compatible(&entry("5.0", "5.4", false), ea_host));

        // In range, entry opts out
        let err = check_compatibility(&entry("5.0", "5.4", true), ea_host).unwrap_err();
        assert!(matches!(
            err,
            Error::Install(InstallError::EarlyAccessExcluded { .. })
        ));

        // Release hosts are unaffected by the carve-out
        assert!(is_compatible(&entry("5.0", "5.4", true), "5.3".parse().unwrap()));
    }

    #[test]
    fn unparseable_bound_fails_closed() {
        let host: HostVersion = "5.3".parse().unwrap();
        let err = check_compatibility(&entry("5.0", "whatever", false), host).unwrap_err();
        assert!(matches!(
            err,
            Error::Version(VersionError::UnknownVersion { .. })
        ));
        assert!(!is_compatible(&entry("5.0", "whatever", false), host));
    }
}
