use std::collections::HashMap;

use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccessError {
    #[error("user '{user_id}' has no access to {scope} '{id}'")]
    NoAccess {
        user_id: String,
        scope: &'static str,
        id: String,
    },
    #[error("user '{user_id}' has no admin permission on {scope} '{id}'")]
    NoAdminPermission {
        user_id: String,
        scope: &'static str,
        id: String,
    },
}

/// Permission checks the engine runs before touching a scope. The engine
/// only consumes these decisions; roles and membership live elsewhere.
pub trait AccessControl {
    fn assert_can_access_environment(&self, user_id: &str, environment_id: &str)
        -> Result<(), AccessError>;

    fn assert_can_administer_environment(&self, user_id: &str, environment_id: &str)
        -> Result<(), AccessError>;

    fn assert_can_access_workspace(&self, user_id: &str, workspace_id: &str)
        -> Result<(), AccessError>;

    fn assert_can_access_schema(
        &self,
        user_id: &str,
        schema_id: &str,
        workspace_id: &str,
    ) -> Result<(), AccessError>;

    fn assert_can_modify_schema(
        &self,
        user_id: &str,
        schema_id: &str,
        workspace_id: &str,
    ) -> Result<(), AccessError>;

    fn assert_can_administer_workspace(&self, user_id: &str, workspace_id: &str)
        -> Result<(), AccessError>;

    /// Owning environment of a workspace, when known.
    fn workspace_environment(&self, workspace_id: &str) -> Option<String>;
}

/// Everyone may do everything. Used when no workspace policy is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct OpenAccess;

impl AccessControl for OpenAccess {
    fn assert_can_access_environment(&self, _: &str, _: &str) -> Result<(), AccessError> {
        Ok(())
    }

    fn assert_can_administer_environment(&self, _: &str, _: &str) -> Result<(), AccessError> {
        Ok(())
    }

    fn assert_can_access_workspace(&self, _: &str, _: &str) -> Result<(), AccessError> {
        Ok(())
    }

    fn assert_can_access_schema(&self, _: &str, _: &str, _: &str) -> Result<(), AccessError> {
        Ok(())
    }

    fn assert_can_modify_schema(&self, _: &str, _: &str, _: &str) -> Result<(), AccessError> {
        Ok(())
    }

    fn assert_can_administer_workspace(&self, _: &str, _: &str) -> Result<(), AccessError> {
        Ok(())
    }

    fn workspace_environment(&self, _: &str) -> Option<String> {
        None
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct WorkspaceGrant {
    pub id: String,
    pub environment: String,
    #[serde(default)]
    pub members: Vec<String>,
    #[serde(default)]
    pub admins: Vec<String>,
}

/// Membership table read from configuration. Admins may modify schemas and
/// purge the workspace; members may read and write items.
#[derive(Debug, Clone, Default)]
pub struct WorkspacePolicy {
    workspaces: HashMap<String, WorkspaceGrant>,
}

impl WorkspacePolicy {
    pub fn new(grants: &[WorkspaceGrant]) -> Self {
        let workspaces = grants
            .iter()
            .map(|grant| (grant.id.clone(), grant.clone()))
            .collect();
        Self { workspaces }
    }

    fn is_admin(&self, user_id: &str, workspace_id: &str) -> bool {
        self.workspaces
            .get(workspace_id)
            .is_some_and(|grant| grant.admins.iter().any(|admin| admin == user_id))
    }

    fn is_member(&self, user_id: &str, workspace_id: &str) -> bool {
        self.is_admin(user_id, workspace_id)
            || self
                .workspaces
                .get(workspace_id)
                .is_some_and(|grant| grant.members.iter().any(|member| member == user_id))
    }
}

fn no_access(user_id: &str, scope: &'static str, id: &str) -> AccessError {
    AccessError::NoAccess {
        user_id: user_id.to_string(),
        scope,
        id: id.to_string(),
    }
}

fn no_admin(user_id: &str, scope: &'static str, id: &str) -> AccessError {
    AccessError::NoAdminPermission {
        user_id: user_id.to_string(),
        scope,
        id: id.to_string(),
    }
}

impl AccessControl for WorkspacePolicy {
    fn assert_can_access_environment(
        &self,
        user_id: &str,
        environment_id: &str,
    ) -> Result<(), AccessError> {
        let allowed = self.workspaces.values().any(|grant| {
            grant.environment == environment_id
                && (grant.members.iter().any(|member| member == user_id)
                    || grant.admins.iter().any(|admin| admin == user_id))
        });
        if allowed {
            Ok(())
        } else {
            Err(no_access(user_id, "environment", environment_id))
        }
    }

    fn assert_can_administer_environment(
        &self,
        user_id: &str,
        environment_id: &str,
    ) -> Result<(), AccessError> {
        let admin = self.workspaces.values().any(|grant| {
            grant.environment == environment_id && grant.admins.iter().any(|a| a == user_id)
        });
        if admin {
            Ok(())
        } else {
            self.assert_can_access_environment(user_id, environment_id)?;
            Err(no_admin(user_id, "environment", environment_id))
        }
    }

    fn assert_can_access_workspace(
        &self,
        user_id: &str,
        workspace_id: &str,
    ) -> Result<(), AccessError> {
        if self.is_member(user_id, workspace_id) {
            Ok(())
        } else {
            Err(no_access(user_id, "workspace", workspace_id))
        }
    }

    fn assert_can_access_schema(
        &self,
        user_id: &str,
        schema_id: &str,
        workspace_id: &str,
    ) -> Result<(), AccessError> {
        if self.is_member(user_id, workspace_id) {
            Ok(())
        } else {
            Err(no_access(user_id, "app", schema_id))
        }
    }

    fn assert_can_modify_schema(
        &self,
        user_id: &str,
        schema_id: &str,
        workspace_id: &str,
    ) -> Result<(), AccessError> {
        if self.is_admin(user_id, workspace_id) {
            Ok(())
        } else if self.is_member(user_id, workspace_id) {
            Err(no_admin(user_id, "app", schema_id))
        } else {
            Err(no_access(user_id, "app", schema_id))
        }
    }

    fn assert_can_administer_workspace(
        &self,
        user_id: &str,
        workspace_id: &str,
    ) -> Result<(), AccessError> {
        if self.is_admin(user_id, workspace_id) {
            Ok(())
        } else if self.is_member(user_id, workspace_id) {
            Err(no_admin(user_id, "workspace", workspace_id))
        } else {
            Err(no_access(user_id, "workspace", workspace_id))
        }
    }

    fn workspace_environment(&self, workspace_id: &str) -> Option<String> {
        self.workspaces
            .get(workspace_id)
            .map(|grant| grant.environment.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::{AccessControl, AccessError, OpenAccess, WorkspaceGrant, WorkspacePolicy};

    fn policy() -> WorkspacePolicy {
        WorkspacePolicy::new(&[WorkspaceGrant {
            id: "W-sales".to_string(),
            environment: "E-acme".to_string(),
            members: vec!["bob".to_string()],
            admins: vec!["alice".to_string()],
        }])
    }

    #[test]
    fn open_access_allows_everything() {
        let open = OpenAccess;
        assert!(open.assert_can_modify_schema("anyone", "S-1", "W-1").is_ok());
        assert!(open.assert_can_access_environment("anyone", "E-1").is_ok());
        assert_eq!(open.workspace_environment("W-1"), None);
    }

    #[test]
    fn members_read_and_admins_modify() {
        let policy = policy();
        assert!(policy.assert_can_access_schema("bob", "S-1", "W-sales").is_ok());
        assert!(policy.assert_can_access_schema("alice", "S-1", "W-sales").is_ok());
        assert!(policy.assert_can_modify_schema("alice", "S-1", "W-sales").is_ok());
        assert!(matches!(
            policy.assert_can_modify_schema("bob", "S-1", "W-sales"),
            Err(AccessError::NoAdminPermission { .. })
        ));
        assert!(matches!(
            policy.assert_can_access_schema("eve", "S-1", "W-sales"),
            Err(AccessError::NoAccess { .. })
        ));
        assert!(matches!(
            policy.assert_can_access_workspace("bob", "W-other"),
            Err(AccessError::NoAccess { .. })
        ));
    }

    #[test]
    fn environment_access_follows_workspace_membership() {
        let policy = policy();
        assert!(policy.assert_can_access_environment("bob", "E-acme").is_ok());
        assert!(policy.assert_can_access_environment("eve", "E-acme").is_err());
        assert!(policy
            .assert_can_administer_environment("alice", "E-acme")
            .is_ok());
        assert!(matches!(
            policy.assert_can_administer_environment("bob", "E-acme"),
            Err(AccessError::NoAdminPermission { .. })
        ));
        assert!(matches!(
            policy.assert_can_administer_environment("eve", "E-acme"),
            Err(AccessError::NoAccess { .. })
        ));
        assert_eq!(
            policy.workspace_environment("W-sales").as_deref(),
            Some("E-acme")
        );
    }
}
