// ABOUTME: Per-file source control status, flags and the FileStatusInfo snapshot
// ABOUTME: Pure value types passed by copy between callers and providers

use bitflags::bitflags;
use std::path::{Path, PathBuf};

/// Outcome of a source control query or operation on a single file.
///
/// Error statuses sort strictly below [`SourceControlStatus::NUM_ERRORS`] and
/// success statuses strictly between it and [`SourceControlStatus::NUM_STATUSES`].
/// A status is always exactly one of the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SourceControlStatus {
    /// Source control provider is down or not bound
    ProviderDown = 0,
    /// Trust certificate for the backend is invalid
    CertificateInvalid = 1,
    /// The provider failed to process the request
    ProviderError = 2,

    /// File is under source control
    Tracked = 4,
    /// Source control is unaware of the file
    NotTracked = 5,
    /// File is currently open for checkout / staging by this user
    OpenByUser = 6,
}

impl Default for SourceControlStatus {
    fn default() -> Self {
        Self::ProviderDown
    }
}

impl SourceControlStatus {
    /// Boundary marker: every error code is below this value.
    pub const NUM_ERRORS: u8 = 3;
    /// Boundary marker: every success code is below this value.
    pub const NUM_STATUSES: u8 = 7;

    pub const ERRORS: [Self; 3] = [
        Self::ProviderDown,
        Self::CertificateInvalid,
        Self::ProviderError,
    ];

    pub const SUCCESSES: [Self; 3] = [Self::Tracked, Self::NotTracked, Self::OpenByUser];

    /// Stable numeric code, preserving the error/success boundary layout.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Returns true if this status reports a failure
    pub fn is_error(self) -> bool {
        self.code() < Self::NUM_ERRORS
    }

    /// Returns true if this status reports a successful query
    pub fn is_success(self) -> bool {
        let code = self.code();
        code > Self::NUM_ERRORS && code < Self::NUM_STATUSES
    }

    /// Returns a human-readable description of this status
    pub fn description(self) -> &'static str {
        match self {
            Self::ProviderDown => "Provider down",
            Self::CertificateInvalid => "Certificate invalid",
            Self::ProviderError => "Provider error",
            Self::Tracked => "Tracked",
            Self::NotTracked => "Not tracked",
            Self::OpenByUser => "Open by user",
        }
    }
}

impl std::fmt::Display for SourceControlStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.description())
    }
}

bitflags! {
    /// Independent per-file attributes reported alongside a status.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct SourceControlFlags: u32 {
        /// The local copy is behind the latest revision
        const OUT_OF_DATE = 1 << 0;
        /// The file is writable on disk
        const WRITEABLE = 1 << 1;
        /// The file allows multiple simultaneous owners
        const MULTI_CHECK_OUT = 1 << 2;
        /// Someone else has the file open
        const OTHER_OPEN = 1 << 3;
        /// The file is marked for add
        const PENDING_ADD = 1 << 4;
        /// The file is marked for removal
        const PENDING_DELETE = 1 << 5;
    }
}

impl Default for SourceControlFlags {
    fn default() -> Self {
        Self::empty()
    }
}

/// Snapshot of the source control state of one file.
///
/// Two values for the same path are independent snapshots; there is no
/// identity beyond the path itself.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FileStatusInfo {
    pub status: SourceControlStatus,
    pub flags: SourceControlFlags,
    pub path: PathBuf,
    /// User responsible for the current status (who checked it out, or who
    /// submitted the newer revision). Combined with `OTHER_OPEN` a non-empty
    /// value means other people hold the file right now.
    pub status_user: String,
}

impl FileStatusInfo {
    /// Create an info for `path` with the default `ProviderDown` status and no flags
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Create an info carrying the given status and flags
    pub fn with_status(
        path: impl Into<PathBuf>,
        status: SourceControlStatus,
        flags: SourceControlFlags,
    ) -> Self {
        Self {
            status,
            flags,
            path: path.into(),
            status_user: String::new(),
        }
    }

    /// Builder-style setter for the status user
    pub fn status_user(mut self, user: impl Into<String>) -> Self {
        self.status_user = user.into();
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn compare_status(&self, status: SourceControlStatus) -> bool {
        self.status == status
    }

    pub fn has_flag(&self, flag: SourceControlFlags) -> bool {
        self.flags.intersects(flag)
    }

    /// Returns true if the file is not writable on disk
    pub fn is_read_only(&self) -> bool {
        !self.has_flag(SourceControlFlags::WRITEABLE)
    }

    /// Returns true if someone else holds the file exclusively
    pub fn is_locked_by_other(&self) -> bool {
        self.has_flag(SourceControlFlags::OTHER_OPEN)
            && !self.has_flag(SourceControlFlags::MULTI_CHECK_OUT)
    }
}
