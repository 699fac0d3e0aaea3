//! Provider permission tiers

string_enum! {
    /// Permission tier of a group or project scoped token
    ///
    /// `Unknown` is the empty string and is the only level accepted by token
    /// types that carry no membership.
    #[derive(Default)]
    pub enum AccessLevel rejects UnknownAccessLevel {
        #[default]
        Unknown => "",
        NoPermissions => "no_permissions",
        MinimalAccess => "minimal_access",
        Guest => "guest",
        Planner => "planner",
        Reporter => "reporter",
        Developer => "developer",
        Maintainer => "maintainer",
        Owner => "owner",
    }
}

impl AccessLevel {
    /// Numeric level used by the provider API, `None` for `Unknown`
    #[must_use]
    pub const fn value(self) -> Option<u8> {
        match self {
            Self::Unknown => None,
            Self::NoPermissions => Some(0),
            Self::MinimalAccess => Some(5),
            Self::Guest => Some(10),
            Self::Planner => Some(15),
            Self::Reporter => Some(20),
            Self::Developer => Some(30),
            Self::Maintainer => Some(40),
            Self::Owner => Some(50),
        }
    }

    /// True for the empty level
    #[must_use]
    pub const fn is_unknown(self) -> bool {
        matches!(self, Self::Unknown)
    }
}
