use serde::Serialize;
use uuid::Uuid;

#[derive(sqlx::FromRow, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Permission {
    pub id: Uuid,
    pub codename: String,
    pub name: String,
}

/// Permission catalogue seeded on startup: `(codename, name)`.
pub const DEFAULT_PERMISSIONS: &[(&str, &str)] = &[
    ("add_department", "Can add department"),
    ("change_department", "Can change department"),
    ("delete_department", "Can delete department"),
    ("view_department", "Can view department"),
    ("can_view_department", "Can view department"),
    ("add_user", "Can add user"),
    ("change_user", "Can change user"),
    ("delete_user", "Can delete user"),
    ("view_user", "Can view user"),
    ("add_group", "Can add group"),
    ("change_group", "Can change group"),
    ("delete_group", "Can delete group"),
    ("view_group", "Can view group"),
    ("add_permission", "Can add permission"),
    ("change_permission", "Can change permission"),
    ("delete_permission", "Can delete permission"),
    ("view_permission", "Can view permission"),
];
