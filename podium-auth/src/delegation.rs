//! The delegation-safety algorithm.
//!
//! Deciding whether a scope may apply a permission delta (grant or
//! revoke) to some other entity's bitfield. The hard rule is the
//! ceiling: a caller can never hand out a flag it does not itself hold.
//! A single narrow carve-out lets a team lead delegate management of
//! their own team without holding the global permission-management bit.

use crate::directory::TeamId;
use crate::permissions::{Permission, PermissionSet};
use crate::scope::Scope;

/// Check whether `scope` may apply `delta` to a subject on
/// `target_team`.
///
/// Rules, evaluated in order:
/// 1. a delta with bits outside the defined flag range is rejected;
/// 2. `authenticate_users` is never grantable through this path;
/// 3. every requested flag except `manage_own_team` must be held by the
///    scope itself;
/// 4. if the delta is exactly `manage_own_team`, it is allowed when the
///    scope holds `manage_teams`, or holds `manage_own_team` for the
///    target team itself;
/// 5. anything else requires `manage_permissions`.
///
/// The ceiling (rule 3) is checked before the carve-out so the
/// carve-out cannot be combined with other bits to smuggle privilege.
pub fn can_alter_permissions(
    scope: &Scope,
    target_team: Option<TeamId>,
    delta: PermissionSet,
) -> bool {
    if !PermissionSet::DEFINED.contains(delta) {
        return false;
    }
    if delta.has(Permission::AuthenticateUsers) {
        return false;
    }

    let own_team_bit = PermissionSet::from(Permission::ManageOwnTeam);
    let ceiling_checked = delta.without(own_team_bit);
    if !scope.permissions().contains(ceiling_checked) {
        return false;
    }

    if delta == own_team_bit {
        if scope.has(Permission::ManageTeams) {
            return true;
        }
        let targets_own_team = match (target_team, scope.own_team()) {
            (Some(target), Some(own)) => target == own,
            _ => false,
        };
        if scope.has(Permission::ManageOwnTeam) && targets_own_team {
            return true;
        }
    }

    scope.has(Permission::ManagePermissions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::Account;
    use crate::permissions::PermissionSet;
    use chrono::Utc;

    fn account_scope(team: Option<TeamId>, permissions: PermissionSet) -> Scope {
        Scope::for_account(
            Account {
                id: 1,
                name: "lead".to_string(),
                discriminator: "0001".to_string(),
                avatar_url: None,
                team,
                permissions,
                created_at: Utc::now(),
            },
            10,
        )
    }

    #[test]
    fn future_bit_injection_is_stopped_at_the_parse_boundary() {
        // Raw integers from the outside world must pass from_bits, which
        // refuses anything beyond the defined flags; the guard re-checks
        // the same range as its first rule.
        assert!(PermissionSet::from_bits(1 << 7).is_err());
        assert!(PermissionSet::from_bits(u32::MAX).is_err());

        let scope = account_scope(
            None,
            PermissionSet::of(&[Permission::ManagePermissions, Permission::ManageTeams]),
        );
        // The full defined set still fails rule 2 (authenticate_users).
        assert!(!can_alter_permissions(&scope, None, PermissionSet::DEFINED));
    }

    #[test]
    fn service_only_flag_is_never_grantable() {
        let scope = account_scope(
            None,
            PermissionSet::of(&[Permission::ManagePermissions, Permission::ManageTeams]),
        );
        assert!(!can_alter_permissions(
            &scope,
            None,
            Permission::AuthenticateUsers.into(),
        ));
    }

    #[test]
    fn cannot_grant_what_you_do_not_hold() {
        let scope = account_scope(None, Permission::ManagePermissions.into());
        assert!(!can_alter_permissions(
            &scope,
            None,
            Permission::ManageTeams.into(),
        ));

        // Holding the flag (plus manage_permissions) is enough.
        let scope = account_scope(
            None,
            PermissionSet::of(&[Permission::ManagePermissions, Permission::ManageTeams]),
        );
        assert!(can_alter_permissions(
            &scope,
            None,
            Permission::ManageTeams.into(),
        ));
    }

    #[test]
    fn holding_flags_without_manage_permissions_is_not_enough() {
        let scope = account_scope(None, Permission::ManageTeams.into());
        assert!(!can_alter_permissions(
            &scope,
            None,
            Permission::ManageTeams.into(),
        ));
    }

    #[test]
    fn own_team_carve_out_applies_to_own_team_only() {
        let scope = account_scope(Some(4), Permission::ManageOwnTeam.into());
        assert!(can_alter_permissions(
            &scope,
            Some(4),
            Permission::ManageOwnTeam.into(),
        ));
        assert!(!can_alter_permissions(
            &scope,
            Some(5),
            Permission::ManageOwnTeam.into(),
        ));
        assert!(!can_alter_permissions(
            &scope,
            None,
            Permission::ManageOwnTeam.into(),
        ));
    }

    #[test]
    fn manage_teams_satisfies_the_carve_out_globally() {
        let scope = account_scope(None, Permission::ManageTeams.into());
        assert!(can_alter_permissions(
            &scope,
            Some(5),
            Permission::ManageOwnTeam.into(),
        ));
        assert!(can_alter_permissions(
            &scope,
            None,
            Permission::ManageOwnTeam.into(),
        ));
    }

    #[test]
    fn carve_out_cannot_smuggle_extra_bits() {
        let scope = account_scope(Some(4), Permission::ManageOwnTeam.into());
        let delta = PermissionSet::of(&[Permission::ManageOwnTeam, Permission::ManageTeams]);
        assert!(!can_alter_permissions(&scope, Some(4), delta));
    }

    #[test]
    fn teamless_caller_gets_no_carve_out() {
        let scope = account_scope(None, Permission::ManageOwnTeam.into());
        assert!(!can_alter_permissions(
            &scope,
            None,
            Permission::ManageOwnTeam.into(),
        ));
    }

    #[test]
    fn anonymous_scope_is_denied_every_delta() {
        let scope = Scope::anonymous();
        for flag in Permission::ALL {
            if flag == Permission::AuthenticateUsers {
                continue;
            }
            assert!(!can_alter_permissions(&scope, Some(1), flag.into()));
        }
        // The empty delta is a no-op grant; without manage_permissions
        // it is still refused.
        assert!(!can_alter_permissions(
            &scope,
            Some(1),
            PermissionSet::EMPTY,
        ));
    }

    #[test]
    fn manage_permissions_holder_can_delegate_held_flags() {
        let scope = account_scope(
            None,
            PermissionSet::of(&[
                Permission::ManagePermissions,
                Permission::ManageAccountTeams,
                Permission::ManageAwards,
            ]),
        );
        let delta = PermissionSet::of(&[
            Permission::ManageAccountTeams,
            Permission::ManageAwards,
        ]);
        assert!(can_alter_permissions(&scope, None, delta));
    }

    #[test]
    fn own_team_bit_is_exempt_from_the_ceiling_for_admins() {
        // A manage_permissions holder that does not itself hold
        // manage_own_team may still delegate it.
        let scope = account_scope(None, Permission::ManagePermissions.into());
        assert!(can_alter_permissions(
            &scope,
            Some(3),
            Permission::ManageOwnTeam.into(),
        ));
    }
}
