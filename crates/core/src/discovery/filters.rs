//! Domain filters: star range, license allow-list, size band, language share.

use std::collections::HashSet;
use std::fmt;

use crate::upstream::RepositoryCandidate;

use super::FilterConfig;

/// Long license names mapped to their SPDX id.
const LICENSE_ALIASES: &[(&str, &str)] = &[
    ("MIT License", "MIT"),
    ("The MIT License", "MIT"),
    ("Apache License 2.0", "Apache-2.0"),
    ("Apache License", "Apache-2.0"),
    ("Apache 2", "Apache-2.0"),
    ("BSD 3-Clause", "BSD-3-Clause"),
    ("BSD 3-Clause \"New\" or \"Revised\" License", "BSD-3-Clause"),
    ("BSD 2-Clause", "BSD-2-Clause"),
    ("BSD 2-Clause \"Simplified\" License", "BSD-2-Clause"),
    ("Boost Software License", "BSL-1.0"),
    ("Boost Software License 1.0", "BSL-1.0"),
    ("ISC License", "ISC"),
    ("The Unlicense", "Unlicense"),
    ("zlib License", "Zlib"),
];

/// Comparison key for a license: lowercase alphanumerics only.
fn license_key(license: &str) -> String {
    license
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Resolve a license id or display name to its comparison key.
pub fn normalize_license(license: &str) -> String {
    let key = license_key(license);
    LICENSE_ALIASES
        .iter()
        .find(|(alias, _)| license_key(alias) == key)
        .map(|(_, spdx)| license_key(spdx))
        .unwrap_or(key)
}

/// Why a candidate was filtered out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    StarRange,
    License,
    Size,
    Language,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Rejection::StarRange => "star_range",
            Rejection::License => "license",
            Rejection::Size => "size",
            Rejection::Language => "language",
        };
        f.write_str(s)
    }
}

/// Static eligibility checks applied before freshness and scoring.
#[derive(Debug, Clone)]
pub struct DomainFilter {
    allowed_licenses: HashSet<String>,
    language: Option<String>,
    min_language_share: f64,
    min_size_kb: u64,
    max_size_kb: u64,
}

impl DomainFilter {
    pub fn new(config: &FilterConfig) -> Self {
        Self {
            allowed_licenses: config
                .allowed_licenses
                .iter()
                .map(|l| normalize_license(l))
                .collect(),
            language: config.language.clone(),
            min_language_share: config.min_language_share,
            min_size_kb: config.min_size_kb,
            max_size_kb: config.max_size_kb,
        }
    }

    pub fn license_allowed(&self, license: Option<&str>) -> bool {
        if self.allowed_licenses.is_empty() {
            return true;
        }
        license.is_some_and(|l| self.allowed_licenses.contains(&normalize_license(l)))
    }

    /// Check a candidate against the requested star range and configured rules.
    pub fn check(
        &self,
        candidate: &RepositoryCandidate,
        min_stars: u32,
        max_stars: u32,
    ) -> Result<(), Rejection> {
        if candidate.stars < min_stars || candidate.stars > max_stars {
            return Err(Rejection::StarRange);
        }
        if !self.license_allowed(candidate.license.as_deref()) {
            return Err(Rejection::License);
        }
        if candidate.size_kb < self.min_size_kb || candidate.size_kb > self.max_size_kb {
            return Err(Rejection::Size);
        }
        if let Some(language) = &self.language {
            if candidate.language_share(language) < self.min_language_share {
                return Err(Rejection::Language);
            }
        }
        Ok(())
    }
}
