//! Request authorization context

/// Authorization context carried by every caller-facing operation.
///
/// Non-admin callers only see public flavors plus flavors their project
/// has been granted access to.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub project_id: Option<String>,
    pub is_admin: bool,
}

impl RequestContext {
    /// Context with unrestricted visibility
    pub fn admin() -> Self {
        Self {
            project_id: None,
            is_admin: true,
        }
    }

    /// Non-admin context scoped to a project
    pub fn for_project(project_id: impl Into<String>) -> Self {
        Self {
            project_id: Some(project_id.into()),
            is_admin: false,
        }
    }
}
