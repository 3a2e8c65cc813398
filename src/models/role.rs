use serde::Serialize;
use uuid::Uuid;

#[derive(sqlx::FromRow, Serialize, Debug, Clone)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
}

/// A role together with the ids of the permissions it grants.
#[derive(Serialize, Debug)]
pub struct RoleResponse {
    pub id: Uuid,
    pub name: String,
    pub permissions: Vec<Uuid>,
}

impl RoleResponse {
    pub fn new(role: Role, permissions: Vec<Uuid>) -> Self {
        RoleResponse { id: role.id, name: role.name, permissions }
    }
}

#[derive(Serialize, Debug)]
pub struct UserRolesResponse {
    pub user: String,
    pub roles: Vec<Role>,
}
