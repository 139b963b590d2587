//! Permission flags and the bitfield they are stored in.
//!
//! Bit positions are part of the storage contract and must never be
//! renumbered. `authenticate_users` is only meaningful on service
//! credentials; `manage_own_team` and `manage_awards` only on accounts.

use podium_core::{PodiumError, PodiumResult};
use serde::{Deserialize, Serialize};

/// A single permission flag with a fixed bit position.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub enum Permission {
    /// Grant or revoke permissions on accounts.
    ManagePermissions,
    /// Move accounts between teams.
    ManageAccountTeams,
    /// Create, edit and delete accounts.
    ManageAccountDetails,
    /// Create, edit and delete any team.
    ManageTeams,
    /// Issue user sessions. Service credentials only.
    AuthenticateUsers,
    /// Edit and delete the holder's own team. Accounts only.
    ManageOwnTeam,
    /// Give and revoke awards. Accounts only.
    ManageAwards,
}

impl Permission {
    /// Every flag, in bit order.
    pub const ALL: [Permission; 7] = [
        Permission::ManagePermissions,
        Permission::ManageAccountTeams,
        Permission::ManageAccountDetails,
        Permission::ManageTeams,
        Permission::AuthenticateUsers,
        Permission::ManageOwnTeam,
        Permission::ManageAwards,
    ];

    /// The flag's position in the bitfield.
    pub fn bit(self) -> u32 {
        match self {
            Permission::ManagePermissions => 0,
            Permission::ManageAccountTeams => 1,
            Permission::ManageAccountDetails => 2,
            Permission::ManageTeams => 3,
            Permission::AuthenticateUsers => 4,
            Permission::ManageOwnTeam => 5,
            Permission::ManageAwards => 6,
        }
    }

    fn mask(self) -> u32 {
        1 << self.bit()
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Permission::ManagePermissions => write!(f, "manage_permissions"),
            Permission::ManageAccountTeams => write!(f, "manage_account_teams"),
            Permission::ManageAccountDetails => write!(f, "manage_account_details"),
            Permission::ManageTeams => write!(f, "manage_teams"),
            Permission::AuthenticateUsers => write!(f, "authenticate_users"),
            Permission::ManageOwnTeam => write!(f, "manage_own_team"),
            Permission::ManageAwards => write!(f, "manage_awards"),
        }
    }
}

impl std::str::FromStr for Permission {
    type Err = PodiumError;

    /// Case-insensitive; hyphens and underscores are interchangeable.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "manage_permissions" => Ok(Permission::ManagePermissions),
            "manage_account_teams" => Ok(Permission::ManageAccountTeams),
            "manage_account_details" => Ok(Permission::ManageAccountDetails),
            "manage_teams" => Ok(Permission::ManageTeams),
            "authenticate_users" => Ok(Permission::AuthenticateUsers),
            "manage_own_team" => Ok(Permission::ManageOwnTeam),
            "manage_awards" => Ok(Permission::ManageAwards),
            _ => Err(PodiumError::validation_field(
                format!("unknown permission: {}", s),
                "permissions",
            )),
        }
    }
}

/// The kind of credential holding a permission set. Determines which
/// flags the holder may carry at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CredentialKind {
    /// A long-lived service credential ("app").
    Service,
    /// A user account (and the sessions that act for it).
    Account,
}

impl CredentialKind {
    /// The flags a credential of this kind may hold.
    pub fn allowed(self) -> PermissionSet {
        match self {
            CredentialKind::Service => PermissionSet::of(&[
                Permission::ManagePermissions,
                Permission::ManageAccountTeams,
                Permission::ManageAccountDetails,
                Permission::ManageTeams,
                Permission::AuthenticateUsers,
            ]),
            CredentialKind::Account => PermissionSet::of(&[
                Permission::ManagePermissions,
                Permission::ManageAccountTeams,
                Permission::ManageAccountDetails,
                Permission::ManageTeams,
                Permission::ManageOwnTeam,
                Permission::ManageAwards,
            ]),
        }
    }
}

/// A fixed-width set of permission flags.
///
/// All operations return a new set; a snapshot handed to authorization
/// code is never mutated underneath it. Serialized as the raw integer;
/// deserialization refuses bits outside the defined range, so an
/// out-of-range integer cannot smuggle future flags in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct PermissionSet(u32);

impl TryFrom<u32> for PermissionSet {
    type Error = PodiumError;

    fn try_from(bits: u32) -> Result<Self, Self::Error> {
        PermissionSet::from_bits(bits)
    }
}

impl From<PermissionSet> for u32 {
    fn from(set: PermissionSet) -> u32 {
        set.bits()
    }
}

impl PermissionSet {
    /// The empty set.
    pub const EMPTY: PermissionSet = PermissionSet(0);

    /// Every bit position that maps to a defined flag.
    pub const DEFINED: PermissionSet = PermissionSet((1 << Permission::ALL.len()) - 1);

    /// Build a set from raw bits, rejecting bits outside the defined range.
    pub fn from_bits(bits: u32) -> PodiumResult<Self> {
        if bits & !Self::DEFINED.0 != 0 {
            return Err(PodiumError::validation_field(
                format!("permission bits out of range: {:#x}", bits),
                "permissions",
            ));
        }
        Ok(PermissionSet(bits))
    }

    /// Build a set from a slice of flags.
    pub fn of(flags: &[Permission]) -> Self {
        PermissionSet(flags.iter().fold(0, |bits, flag| bits | flag.mask()))
    }

    /// The raw bits, for storage.
    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn has(self, flag: Permission) -> bool {
        self.0 & flag.mask() != 0
    }

    /// Set union.
    pub fn union(self, delta: PermissionSet) -> PermissionSet {
        PermissionSet(self.0 | delta.0)
    }

    /// Set difference.
    pub fn without(self, delta: PermissionSet) -> PermissionSet {
        PermissionSet(self.0 & !delta.0)
    }

    /// True if any flag is shared with `mask`.
    pub fn intersects(self, mask: PermissionSet) -> bool {
        self.0 & mask.0 != 0
    }

    /// True if every flag in `other` is also in `self`.
    pub fn contains(self, other: PermissionSet) -> bool {
        self.0 & other.0 == other.0
    }

    /// The flags in this set, in bit order.
    pub fn iter(self) -> impl Iterator<Item = Permission> {
        Permission::ALL.into_iter().filter(move |flag| self.has(*flag))
    }

    /// Check this set against the flags its holder kind may carry.
    pub fn validate_for(self, kind: CredentialKind) -> PodiumResult<()> {
        let disallowed = self.without(kind.allowed());
        if !disallowed.is_empty() {
            return Err(PodiumError::validation_field(
                format!(
                    "permission(s) not applicable to {:?} credentials: {}",
                    kind, disallowed
                ),
                "permissions",
            ));
        }
        Ok(())
    }

    /// Parse the external comma-separated flag-name list.
    ///
    /// Names are case-insensitive and may use hyphens for underscores.
    /// An unrecognised name is a hard validation error, never a silent
    /// no-op. An empty string is the empty set.
    pub fn parse_list(raw: &str) -> PodiumResult<Self> {
        let mut set = PermissionSet::EMPTY;
        for name in raw.split(',') {
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            set = set.union(PermissionSet::of(&[name.parse()?]));
        }
        Ok(set)
    }
}

impl std::fmt::Display for PermissionSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for flag in self.iter() {
            if !first {
                write!(f, ",")?;
            }
            write!(f, "{}", flag)?;
            first = false;
        }
        Ok(())
    }
}

impl From<Permission> for PermissionSet {
    fn from(flag: Permission) -> Self {
        PermissionSet::of(&[flag])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_positions_are_stable() {
        assert_eq!(Permission::ManagePermissions.bit(), 0);
        assert_eq!(Permission::ManageAccountTeams.bit(), 1);
        assert_eq!(Permission::ManageAccountDetails.bit(), 2);
        assert_eq!(Permission::ManageTeams.bit(), 3);
        assert_eq!(Permission::AuthenticateUsers.bit(), 4);
        assert_eq!(Permission::ManageOwnTeam.bit(), 5);
        assert_eq!(Permission::ManageAwards.bit(), 6);
    }

    #[test]
    fn set_operations() {
        let set = PermissionSet::of(&[Permission::ManageTeams, Permission::ManageOwnTeam]);
        assert!(set.has(Permission::ManageTeams));
        assert!(!set.has(Permission::ManagePermissions));

        let grown = set.union(Permission::ManageAwards.into());
        assert!(grown.has(Permission::ManageAwards));
        // The original is untouched.
        assert!(!set.has(Permission::ManageAwards));

        let shrunk = grown.without(Permission::ManageTeams.into());
        assert!(!shrunk.has(Permission::ManageTeams));
        assert!(shrunk.has(Permission::ManageOwnTeam));

        assert!(grown.intersects(Permission::ManageAwards.into()));
        assert!(!grown.intersects(Permission::AuthenticateUsers.into()));
        assert!(grown.contains(set));
        assert!(!set.contains(grown));
    }

    #[test]
    fn from_bits_rejects_out_of_range() {
        assert!(PermissionSet::from_bits(0b111_1111).is_ok());
        assert!(PermissionSet::from_bits(1 << 7).is_err());
        assert!(PermissionSet::from_bits(u32::MAX).is_err());
    }

    #[test]
    fn parse_list_accepts_name_variants() {
        let set = PermissionSet::parse_list("manage_teams,MANAGE-OWN-TEAM").unwrap();
        assert!(set.has(Permission::ManageTeams));
        assert!(set.has(Permission::ManageOwnTeam));

        assert_eq!(
            PermissionSet::parse_list("").unwrap(),
            PermissionSet::EMPTY
        );
        assert_eq!(
            PermissionSet::parse_list(" manage_awards ").unwrap(),
            Permission::ManageAwards.into()
        );
    }

    #[test]
    fn parse_list_rejects_unknown_names() {
        let err = PermissionSet::parse_list("manage_teams,rule_the_world").unwrap_err();
        assert!(err.to_string().contains("unknown permission"));
    }

    #[test]
    fn display_round_trips_through_parse() {
        let set = PermissionSet::of(&[
            Permission::ManagePermissions,
            Permission::ManageTeams,
            Permission::ManageAwards,
        ]);
        assert_eq!(PermissionSet::parse_list(&set.to_string()).unwrap(), set);
    }

    #[test]
    fn holder_masks_are_disjoint_where_it_matters() {
        assert!(CredentialKind::Service
            .allowed()
            .has(Permission::AuthenticateUsers));
        assert!(!CredentialKind::Service.allowed().has(Permission::ManageOwnTeam));
        assert!(!CredentialKind::Service.allowed().has(Permission::ManageAwards));

        assert!(CredentialKind::Account.allowed().has(Permission::ManageOwnTeam));
        assert!(!CredentialKind::Account
            .allowed()
            .has(Permission::AuthenticateUsers));
    }

    #[test]
    fn validate_for_rejects_inapplicable_flags() {
        let service_only = PermissionSet::of(&[Permission::AuthenticateUsers]);
        assert!(service_only.validate_for(CredentialKind::Service).is_ok());
        assert!(service_only.validate_for(CredentialKind::Account).is_err());

        let account_only = PermissionSet::of(&[Permission::ManageOwnTeam]);
        assert!(account_only.validate_for(CredentialKind::Account).is_ok());
        assert!(account_only.validate_for(CredentialKind::Service).is_err());
    }
}
