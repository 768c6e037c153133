// ABOUTME: Provider connectivity state shared by the connection and notification channels

/// Whether source control is switched off, misconfigured, or usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ConnectionState {
    #[default]
    Disabled,
    ConfigurationInvalid,
    Active,
}

impl ConnectionState {
    pub fn is_active(self) -> bool {
        self == Self::Active
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::Disabled => "Disabled",
            Self::ConfigurationInvalid => "Configuration invalid",
            Self::Active => "Active",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.description())
    }
}
