// ABOUTME: Connection setting status and the SettingInfo value returned by setting queries
// ABOUTME: Encodes which settings are usable and which can be changed in place

/// State of one named connection setting.
///
/// `Invalid` means the key is not recognized. The remaining variants live in a
/// sub-range reserved for backend-specific meaning, bounded by
/// [`SettingStatus::BACKEND_BEGIN`] and [`SettingStatus::BACKEND_END`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SettingStatus {
    /// Key is not recognized or cannot be queried
    #[default]
    Invalid = 0,
    /// Key is recognized but has no value
    Unset = 2,
    /// Backend reports the value as explicitly empty
    None = 3,
    /// Value was set through the backend's own settings store
    Set = 4,
    /// Value comes from a configuration file or environment
    Config = 5,
}

impl SettingStatus {
    pub const BACKEND_BEGIN: u8 = 1;
    pub const BACKEND_END: u8 = 6;

    pub const ALL: [Self; 5] = [Self::Invalid, Self::Unset, Self::None, Self::Set, Self::Config];

    pub fn code(self) -> u8 {
        self as u8
    }

    /// Returns true if the status is one of the backend-scoped states
    pub fn is_backend_scoped(self) -> bool {
        let code = self.code();
        code > Self::BACKEND_BEGIN && code < Self::BACKEND_END
    }
}

/// Result of a connection setting query or update.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SettingInfo {
    pub status: SettingStatus,
    pub value: String,
    pub context: String,
}

impl SettingInfo {
    pub fn new(status: SettingStatus, value: impl Into<String>) -> Self {
        Self {
            status,
            value: value.into(),
            context: String::new(),
        }
    }

    /// An unrecognized-key result
    pub fn invalid() -> Self {
        Self::default()
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    /// Is this value actually present and usable?
    pub fn is_available(&self) -> bool {
        !matches!(self.status, SettingStatus::Invalid | SettingStatus::Unset)
            && !self.value.is_empty()
    }

    /// Can this value be changed without touching the global environment or registry?
    pub fn is_settable(&self) -> bool {
        matches!(self.status, SettingStatus::Unset | SettingStatus::Set)
    }
}
