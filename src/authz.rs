use std::collections::HashSet;

use crate::auth::Principal;

/// Capability
///
/// The closed set of named permissions a user can hold. These are the exact
/// names persisted in the `users.permissions` column, so the wire/storage form
/// is defined here once (`as_str`/`parse`) rather than scattered through
/// queries and handlers.
///
/// `Admin` is the umbrella capability: holding it satisfies every capability
/// check in the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Admin,
    ManagePosts,
    UploadImages,
}

impl Capability {
    pub const ALL: [Capability; 3] = [
        Capability::Admin,
        Capability::ManagePosts,
        Capability::UploadImages,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Capability::Admin => "admin",
            Capability::ManagePosts => "managePosts",
            Capability::UploadImages => "uploadImages",
        }
    }

    pub fn parse(name: &str) -> Option<Capability> {
        match name {
            "admin" => Some(Capability::Admin),
            "managePosts" => Some(Capability::ManagePosts),
            "uploadImages" => Some(Capability::UploadImages),
            _ => None,
        }
    }
}

/// CapabilitySet
///
/// A principal's granted capabilities. Membership is the primitive; `grants`
/// layers the admin umbrella on top. Rows migrated from older permission
/// schemes may contain names this build does not know; those are dropped on
/// read, so an unrecognized grant can never widen access.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilitySet(HashSet<Capability>);

impl CapabilitySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a set from stored permission names, ignoring unknown entries.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        CapabilitySet(
            names
                .into_iter()
                .filter_map(|n| Capability::parse(n.as_ref()))
                .collect(),
        )
    }

    pub fn insert(&mut self, cap: Capability) {
        self.0.insert(cap);
    }

    pub fn contains(&self, cap: Capability) -> bool {
        self.0.contains(&cap)
    }

    /// Whether this set satisfies a requirement for `cap`: either the
    /// capability itself or the `admin` umbrella.
    pub fn grants(&self, cap: Capability) -> bool {
        self.contains(Capability::Admin) || self.contains(cap)
    }

    /// Storage form, in a stable order.
    pub fn names(&self) -> Vec<String> {
        let mut out: Vec<String> = self.0.iter().map(|c| c.as_str().to_string()).collect();
        out.sort();
        out
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        CapabilitySet(iter.into_iter().collect())
    }
}

/// AccessPolicy
///
/// The declarative access rule for one operation: which capability it needs
/// (if any) and whether the resource owner may perform it without that
/// capability. Every mutating endpoint names exactly one of the consts below
/// and feeds it through `authorize`; access rules are never re-derived inline
/// in a handler.
#[derive(Debug, Clone, Copy)]
pub struct AccessPolicy {
    pub required: Option<Capability>,
    pub owner_bypass: bool,
}

// Posts
pub const CREATE_POST: AccessPolicy = AccessPolicy {
    required: Some(Capability::ManagePosts),
    owner_bypass: false,
};
pub const EDIT_OWN_POST: AccessPolicy = AccessPolicy {
    required: Some(Capability::ManagePosts),
    owner_bypass: true,
};
pub const DELETE_OWN_POST: AccessPolicy = AccessPolicy {
    required: Some(Capability::ManagePosts),
    owner_bypass: true,
};
pub const EDIT_ANY_POST: AccessPolicy = AccessPolicy {
    required: Some(Capability::Admin),
    owner_bypass: false,
};
pub const DELETE_ANY_POST: AccessPolicy = AccessPolicy {
    required: Some(Capability::Admin),
    owner_bypass: false,
};

// Users
pub const CREATE_USER: AccessPolicy = AccessPolicy {
    required: Some(Capability::Admin),
    owner_bypass: false,
};
pub const EDIT_OWN_PROFILE: AccessPolicy = AccessPolicy {
    required: None,
    owner_bypass: true,
};
pub const EDIT_ANY_USER: AccessPolicy = AccessPolicy {
    required: Some(Capability::Admin),
    owner_bypass: false,
};
pub const DELETE_OWN_ACCOUNT: AccessPolicy = AccessPolicy {
    required: None,
    owner_bypass: true,
};
pub const DELETE_ANY_USER: AccessPolicy = AccessPolicy {
    required: Some(Capability::Admin),
    owner_bypass: false,
};
pub const CHANGE_OWN_PASSWORD: AccessPolicy = AccessPolicy {
    required: None,
    owner_bypass: true,
};
pub const SET_ANY_PASSWORD: AccessPolicy = AccessPolicy {
    required: Some(Capability::Admin),
    owner_bypass: false,
};

// Images
pub const UPLOAD_IMAGE: AccessPolicy = AccessPolicy {
    required: Some(Capability::UploadImages),
    owner_bypass: false,
};
pub const DELETE_OWN_IMAGE: AccessPolicy = AccessPolicy {
    required: None,
    owner_bypass: true,
};
pub const DELETE_ANY_IMAGE: AccessPolicy = AccessPolicy {
    required: Some(Capability::Admin),
    owner_bypass: false,
};

/// Deny
///
/// Why an authorization check failed. `Unauthenticated` maps to 401 at the
/// route boundary, `Forbidden` to 403.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deny {
    Unauthenticated,
    Forbidden,
}

/// authorize
///
/// The single capability/ownership gate. Evaluation order:
/// 1. No principal at all → `Unauthenticated`.
/// 2. If the policy allows owner bypass and the caller owns the resource →
///    allow without looking at capabilities.
/// 3. Otherwise the policy's required capability must be granted (directly or
///    via the `admin` umbrella). A policy with no required capability grants
///    nothing here; such operations are reachable only through ownership.
pub fn authorize(
    principal: Option<&Principal>,
    policy: &AccessPolicy,
    resource_owner: Option<uuid::Uuid>,
) -> Result<(), Deny> {
    let Some(principal) = principal else {
        return Err(Deny::Unauthenticated);
    };

    if policy.owner_bypass {
        if let Some(owner) = resource_owner {
            if owner == principal.id {
                return Ok(());
            }
        }
    }

    match policy.required {
        Some(cap) if principal.capabilities.grants(cap) => Ok(()),
        _ => Err(Deny::Forbidden),
    }
}
