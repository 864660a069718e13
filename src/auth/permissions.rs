/*!
 * # Permissions Module
 *
 * Permission strings gate routes. They take the form `resource:action`.
 */

/// Common permission string constants for compile-time safety
pub mod consts {
    // Inventory
    pub const INVENTORY_READ: &str = "inventory:read";
    pub const INVENTORY_MOVE: &str = "inventory:move";
    pub const INVENTORY_ADJUST: &str = "inventory:adjust";
    pub const INVENTORY_IMPORT: &str = "inventory:import";
    pub const INVENTORY_EXPORT: &str = "inventory:export";

    // Stock counts
    pub const STOCKCOUNTS_READ: &str = "stockcounts:read";
    pub const STOCKCOUNTS_CREATE: &str = "stockcounts:create";
    pub const STOCKCOUNTS_COUNT: &str = "stockcounts:count";
    pub const STOCKCOUNTS_DELETE: &str = "stockcounts:delete";

    // Administration
    pub const USERS_MANAGE: &str = "users:manage";
}

/// Every permission known to the service.
pub const ALL_PERMISSIONS: [&str; 10] = [
    consts::INVENTORY_READ,
    consts::INVENTORY_MOVE,
    consts::INVENTORY_ADJUST,
    consts::INVENTORY_IMPORT,
    consts::INVENTORY_EXPORT,
    consts::STOCKCOUNTS_READ,
    consts::STOCKCOUNTS_CREATE,
    consts::STOCKCOUNTS_COUNT,
    consts::STOCKCOUNTS_DELETE,
    consts::USERS_MANAGE,
];

/// Splits `resource:action`.
pub fn parse_permission(permission: &str) -> Option<(&str, &str)> {
    let (resource, action) = permission.split_once(':')?;
    (!resource.is_empty() && !action.is_empty()).then_some((resource, action))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_permission_is_well_formed() {
        for p in ALL_PERMISSIONS {
            assert!(parse_permission(p).is_some(), "{}", p);
        }
        assert_eq!(parse_permission("inventory"), None);
        assert_eq!(parse_permission(":read"), None);
    }
}
