//! Package version selection
//!
//! Requested versions may name only a major (`8`), a major.minor (`8.0`), a
//! full release (`8.0.31`) or a release with build (`8.0.31-24`). The newest
//! available package matching every given component wins.

use crate::error::{ClusterError, Result, StepContext};
use crate::node::Node;
use crate::scripts::{self, Distribution};
use std::cmp::Ordering;

/// Parsed `MAJOR.MINOR.PATCH-BUILD[-suffix]` package version
#[derive(Debug, Clone, PartialEq, Eq)]
struct PackageVersion {
    numbers: Vec<u64>,
    build: Option<u64>,
}

impl PackageVersion {
    fn parse(version: &str) -> Option<Self> {
        let (release, build) = match version.split_once('-') {
            Some((release, rest)) => (release, Some(rest)),
            None => (version, None),
        };
        let numbers = release
            .split('.')
            .map(|n| n.parse().ok())
            .collect::<Option<Vec<u64>>>()?;
        if numbers.is_empty() || numbers.len() > 3 {
            return None;
        }
        let build = match build {
            Some(rest) => {
                let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
                Some(digits.parse().ok()?)
            }
            None => None,
        };
        Some(Self { numbers, build })
    }

    /// Every component present in `requested` is equal here
    fn matches(&self, requested: &PackageVersion) -> bool {
        requested
            .numbers
            .iter()
            .enumerate()
            .all(|(i, n)| self.numbers.get(i) == Some(n))
            && requested.build.is_none_or(|b| self.build == Some(b))
    }

    fn cmp_newest(&self, other: &Self) -> Ordering {
        self.numbers
            .cmp(&other.numbers)
            .then_with(|| self.build.cmp(&other.build))
    }
}

/// Versions listed by `apt-cache show`, epoch stripped, in listing order
pub fn parse_version_list(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| line.trim().strip_prefix("Version:"))
        .map(|v| {
            let v = v.trim();
            v.split_once(':').map_or(v, |(_, rest)| rest).to_string()
        })
        .filter(|v| !v.is_empty())
        .collect()
}

/// Pick the package version to install.
///
/// Without a request the newest available version is used. A request that
/// matches nothing is an error listing what is available.
pub fn select_version(available: &[String], requested: Option<&str>) -> Result<String> {
    let parsed: Vec<(&String, PackageVersion)> = available
        .iter()
        .filter_map(|v| PackageVersion::parse(v).map(|p| (v, p)))
        .collect();

    let Some(requested) = requested.filter(|r| !r.is_empty()) else {
        return parsed
            .iter()
            .max_by(|a, b| a.1.cmp_newest(&b.1))
            .map(|(v, _)| (*v).clone())
            .or_else(|| available.first().cloned())
            .ok_or_else(|| ClusterError::NoVersions("package".to_string()));
    };

    let not_found = || ClusterError::VersionNotFound {
        requested: requested.to_string(),
        available: available.to_vec(),
    };
    let wanted = PackageVersion::parse(requested).ok_or_else(not_found)?;

    parsed
        .iter()
        .filter(|(_, p)| p.matches(&wanted))
        .max_by(|a, b| a.1.cmp_newest(&b.1))
        .map(|(v, _)| (*v).clone())
        .ok_or_else(not_found)
}

/// List the repository's versions on `node` and pick one
pub async fn resolve_version(
    node: &Node<'_>,
    distribution: Distribution,
    requested: Option<&str>,
) -> Result<String> {
    let output = node
        .run("list versions", &scripts::list_versions(distribution))
        .await?;
    let available = parse_version_list(&output);
    if available.is_empty() {
        return Err(ClusterError::NoVersions(
            distribution.server_package().to_string(),
        ))
        .step(node.name(), "select version");
    }
    let version = select_version(&available, requested).step(node.name(), "select version")?;
    tracing::debug!("{}: {} versions available, selected {}", node.name(), available.len(), version);
    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn available() -> Vec<String> {
        ["8.0.30-23", "8.0.31-24", "8.1.0-1"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn test_major_minor_picks_newest_match() {
        assert_eq!(select_version(&available(), Some("8.0")).unwrap(), "8.0.31-24");
    }

    #[test]
    fn test_major_only() {
        assert_eq!(select_version(&available(), Some("8")).unwrap(), "8.1.0-1");
    }

    #[test]
    fn test_exact() {
        assert_eq!(select_version(&available(), Some("8.0.30")).unwrap(), "8.0.30-23");
        assert_eq!(select_version(&available(), Some("8.0.30-23")).unwrap(), "8.0.30-23");
    }

    #[test]
    fn test_missing_version_is_error() {
        let err = select_version(&available(), Some("9.0")).unwrap_err();
        match err {
            ClusterError::VersionNotFound { requested, available } => {
                assert_eq!(requested, "9.0");
                assert_eq!(available.len(), 3);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_unspecified_picks_newest() {
        assert_eq!(select_version(&available(), None).unwrap(), "8.1.0-1");
    }

    #[test]
    fn test_empty_list_is_error() {
        assert!(select_version(&[], None).is_err());
        assert!(select_version(&[], Some("8.0")).is_err());
    }

    #[test]
    fn test_distribution_suffix() {
        let available = vec!["8.0.32-24-1.focal".to_string(), "8.0.31-23-1.focal".to_string()];
        assert_eq!(
            select_version(&available, Some("8.0.31")).unwrap(),
            "8.0.31-23-1.focal"
        );
    }

    #[test]
    fn test_parse_version_list_strips_epoch() {
        let output = "Version: 1:8.0.31-23.1.focal\nVersion: 1:8.0.30-22.1.focal\n\n";
        assert_eq!(
            parse_version_list(output),
            vec!["8.0.31-23.1.focal", "8.0.30-22.1.focal"]
        );

        let output = "Version: 8.0.31-23-1.focal\n";
        assert_eq!(parse_version_list(output), vec!["8.0.31-23-1.focal"]);
    }
}
