//! Backend version negotiation.
//!
//! The backend publishes the minimum client version it still serves, its own
//! protocol major version, and the current legal documents version. The
//! client compares those against a [`VersionPolicy`] and only switches its
//! [`ProtocolVersion`] to a backend major version it knows how to speak.

use std::str::FromStr;
use std::sync::atomic::{AtomicU16, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Backend major version this client speaks before any negotiation.
pub const DEFAULT_BACKEND_MAJOR_VERSION: u16 = 3;
pub const DEFAULT_MIN_BACKEND_MAJOR_VERSION: u16 = 3;
pub const DEFAULT_MAX_BACKEND_MAJOR_VERSION: u16 = 4;

// ==============================================================================
// Software Version
// ==============================================================================

/// A dotted numeric version such as `1.1.12` or `2.0`.
///
/// Up to four components are accepted; missing components count as zero, so
/// `2.0` and `2.0.0.0` compare equal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SoftwareVersion {
    version: semver::Version,
    revision: u64,
}

impl SoftwareVersion {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            version: semver::Version::new(major, minor, patch),
            revision: 0,
        }
    }

    pub fn major(&self) -> u64 {
        self.version.major
    }
}

impl FromStr for SoftwareVersion {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = s
            .trim()
            .split('.')
            .map(str::parse::<u64>)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| CoreError::InvalidResponse(format!("invalid version `{s}`: {e}")))?;
        if parts.len() > 4 {
            return Err(CoreError::InvalidResponse(format!(
                "invalid version `{s}`: more than four components"
            )));
        }

        let part = |idx: usize| parts.get(idx).copied().unwrap_or(0);
        Ok(Self {
            version: semver::Version::new(part(0), part(1), part(2)),
            revision: part(3),
        })
    }
}

impl std::fmt::Display for SoftwareVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.version)?;
        if self.revision > 0 {
            write!(f, ".{}", self.revision)?;
        }
        Ok(())
    }
}

impl Serialize for SoftwareVersion {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

// ==============================================================================
// Compatibility Window
// ==============================================================================

/// Inclusive range of backend major versions this client can talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompatibilityWindow {
    min: u16,
    max: u16,
}

impl CompatibilityWindow {
    pub fn new(min: u16, max: u16) -> Result<Self, CoreError> {
        if min > max {
            return Err(CoreError::Config(format!(
                "backend version window is empty: min {min} > max {max}"
            )));
        }
        Ok(Self { min, max })
    }

    pub fn min(&self) -> u16 {
        self.min
    }

    pub fn max(&self) -> u16 {
        self.max
    }

    pub fn contains(&self, major: u16) -> bool {
        (self.min..=self.max).contains(&major)
    }
}

impl Default for CompatibilityWindow {
    fn default() -> Self {
        Self {
            min: DEFAULT_MIN_BACKEND_MAJOR_VERSION,
            max: DEFAULT_MAX_BACKEND_MAJOR_VERSION,
        }
    }
}

// ==============================================================================
// Active Protocol Version
// ==============================================================================

/// Backend major version currently used in request paths (`/api/v{N}/...`).
///
/// Shared via `Arc<ProtocolVersion>` by every client that talks to the same
/// backend. Updates are last-writer-wins.
#[derive(Debug)]
pub struct ProtocolVersion(AtomicU16);

impl ProtocolVersion {
    pub fn new(major: u16) -> Self {
        Self(AtomicU16::new(major))
    }

    pub fn get(&self) -> u16 {
        self.0.load(Ordering::Acquire)
    }

    pub fn set(&self, major: u16) {
        self.0.store(major, Ordering::Release);
    }

    /// Prefix for versioned API paths, e.g. `/api/v3`.
    pub fn api_prefix(&self) -> String {
        format!("/api/v{}", self.get())
    }
}

impl Default for ProtocolVersion {
    fn default() -> Self {
        Self::new(DEFAULT_BACKEND_MAJOR_VERSION)
    }
}

// ==============================================================================
// Reports
// ==============================================================================

/// Versions as published by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionReport {
    /// Oldest client version the backend still considers current.
    pub client_version: SoftwareVersion,
    pub backend_major_version: u16,
    pub legal_documents_version: SoftwareVersion,
}

/// Wire shape of `GET /api/software/versions`.
#[derive(Debug, Deserialize)]
pub(crate) struct VersionsResponse {
    #[serde(rename = "ClientVersion")]
    client_version: String,
    #[serde(rename = "BackendMajorVersion")]
    backend_major_version: String,
    #[serde(rename = "LegalDocumentsVersion")]
    legal_documents_version: String,
}

impl TryFrom<VersionsResponse> for VersionReport {
    type Error = CoreError;

    fn try_from(resp: VersionsResponse) -> Result<Self, Self::Error> {
        let backend_major_version = resp.backend_major_version.trim().parse().map_err(|e| {
            CoreError::InvalidResponse(format!(
                "invalid backend major version `{}`: {e}",
                resp.backend_major_version
            ))
        })?;
        Ok(Self {
            client_version: resp.client_version.parse()?,
            backend_major_version,
            legal_documents_version: resp.legal_documents_version.parse()?,
        })
    }
}

/// Outcome of comparing a [`VersionReport`] with the local policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateStatus {
    pub backend_compatible: bool,
    pub client_up_to_date: bool,
    pub legal_documents_version: SoftwareVersion,
    pub current_backend_major_version: u16,
}

// ==============================================================================
// Policy
// ==============================================================================

/// What this client is and which backends it supports.
#[derive(Debug, Clone)]
pub struct VersionPolicy {
    pub local_client_version: SoftwareVersion,
    pub window: CompatibilityWindow,
}

impl VersionPolicy {
    pub fn evaluate(&self, report: &VersionReport) -> UpdateStatus {
        UpdateStatus {
            backend_compatible: self.window.contains(report.backend_major_version),
            client_up_to_date: self.local_client_version >= report.client_version,
            legal_documents_version: report.legal_documents_version.clone(),
            current_backend_major_version: report.backend_major_version,
        }
    }

    /// Evaluate `report` and move `active` to the backend's major version if
    /// that version is inside the window. An incompatible report leaves
    /// `active` untouched.
    pub fn apply(&self, report: &VersionReport, active: &ProtocolVersion) -> UpdateStatus {
        let status = self.evaluate(report);
        if status.backend_compatible {
            active.set(status.current_backend_major_version);
        }
        status
    }
}

impl Default for VersionPolicy {
    fn default() -> Self {
        Self {
            local_client_version: SoftwareVersion::new(
                parse_pkg_component(env!("CARGO_PKG_VERSION_MAJOR")),
                parse_pkg_component(env!("CARGO_PKG_VERSION_MINOR")),
                parse_pkg_component(env!("CARGO_PKG_VERSION_PATCH")),
            ),
            window: CompatibilityWindow::default(),
        }
    }
}

fn parse_pkg_component(component: &str) -> u64 {
    component.parse().unwrap_or(0)
}
