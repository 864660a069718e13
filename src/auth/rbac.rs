/*!
 * # Role-Based Access Control (RBAC) Module
 *
 * Maps each staff role to the permissions it is granted.
 * `admin` is also let through every permission check by the middleware.
 */

use super::permissions::{consts::*, ALL_PERMISSIONS};
use crate::entities::user::UserRole;
use lazy_static::lazy_static;
use std::collections::HashMap;

lazy_static! {
    pub static ref ROLE_PERMISSIONS: HashMap<UserRole, Vec<&'static str>> = {
        let mut roles = HashMap::new();

        roles.insert(UserRole::Admin, ALL_PERMISSIONS.to_vec());

        // Warehouse administrators run counts and imports but do not manage users
        roles.insert(
            UserRole::WhAdmin,
            vec![
                INVENTORY_READ,
                INVENTORY_MOVE,
                INVENTORY_ADJUST,
                INVENTORY_IMPORT,
                INVENTORY_EXPORT,
                STOCKCOUNTS_READ,
                STOCKCOUNTS_CREATE,
                STOCKCOUNTS_COUNT,
                STOCKCOUNTS_DELETE,
            ],
        );

        // Floor staff
        roles.insert(
            UserRole::Warehouse,
            vec![
                INVENTORY_READ,
                INVENTORY_MOVE,
                INVENTORY_ADJUST,
                STOCKCOUNTS_READ,
                STOCKCOUNTS_COUNT,
            ],
        );

        // Read and export only
        roles.insert(
            UserRole::Accounting,
            vec![INVENTORY_READ, INVENTORY_EXPORT, STOCKCOUNTS_READ],
        );

        roles
    };
}

/// Permissions granted to `role`, as carried in access tokens.
pub fn permissions_for(role: UserRole) -> Vec<String> {
    ROLE_PERMISSIONS
        .get(&role)
        .map(|perms| perms.iter().map(|p| p.to_string()).collect())
        .unwrap_or_default()
}

pub fn role_has_permission(role: UserRole, permission: &str) -> bool {
    role == UserRole::Admin
        || ROLE_PERMISSIONS
            .get(&role)
            .map_or(false, |perms| perms.contains(&permission))
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(UserRole::Admin, USERS_MANAGE, true)]
    #[test_case(UserRole::WhAdmin, USERS_MANAGE, false)]
    #[test_case(UserRole::WhAdmin, STOCKCOUNTS_CREATE, true)]
    #[test_case(UserRole::WhAdmin, INVENTORY_IMPORT, true)]
    #[test_case(UserRole::Warehouse, INVENTORY_MOVE, true)]
    #[test_case(UserRole::Warehouse, STOCKCOUNTS_COUNT, true)]
    #[test_case(UserRole::Warehouse, STOCKCOUNTS_CREATE, false)]
    #[test_case(UserRole::Warehouse, INVENTORY_IMPORT, false)]
    #[test_case(UserRole::Warehouse, INVENTORY_EXPORT, false)]
    #[test_case(UserRole::Accounting, INVENTORY_EXPORT, true)]
    #[test_case(UserRole::Accounting, INVENTORY_MOVE, false)]
    #[test_case(UserRole::Accounting, STOCKCOUNTS_COUNT, false)]
    fn permission_matrix(role: UserRole, permission: &str, allowed: bool) {
        assert_eq!(role_has_permission(role, permission), allowed);
    }

    #[test]
    fn every_role_can_read() {
        for role in [
            UserRole::Admin,
            UserRole::WhAdmin,
            UserRole::Warehouse,
            UserRole::Accounting,
        ] {
            assert!(role_has_permission(role, INVENTORY_READ));
            assert!(role_has_permission(role, STOCKCOUNTS_READ));
            assert!(!permissions_for(role).is_empty());
        }
    }
}
