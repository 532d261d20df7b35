use jiff::Timestamp;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    auth::{self, Policy, Principal, Resource},
    files::FileStore,
    models::{
        project::{Project, ProjectMember},
        store::Store,
    },
    storage::{Storage, StorageError},
};

#[derive(Debug, Error)]
pub enum CreateProjectError {
    #[error("Project name must be at least 2 characters long")]
    NameTooShort,

    #[error("Not allowed")]
    NotAllowed,

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

pub struct CreateProjectParameters {
    pub name: String,
    pub description: Option<String>,
}

pub fn create_project(
    store: &mut Store,
    storage: &impl Storage,
    principal: &Principal,
    parameters: CreateProjectParameters,
) -> Result<Project, CreateProjectError> {
    let name = parameters.name.trim().to_string();
    if name.chars().count() < 2 {
        return Err(CreateProjectError::NameTooShort);
    }

    let Some(user_id) = principal.user_id() else {
        return Err(CreateProjectError::NotAllowed);
    };

    let description = parameters
        .description
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty());

    let project = Project {
        id: Uuid::new_v4(),
        name,
        description,
        owner_id: user_id.to_string(),
        created_at: Timestamp::now(),
    };

    store.add_project(project.clone());
    storage.save(store)?;

    Ok(project)
}

#[derive(Debug, Error)]
pub enum DeleteProjectError {
    #[error("Project not found")]
    NotFound,

    #[error("Not allowed")]
    NotAllowed,

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

pub struct DeleteProjectParameters {
    pub project_id: Uuid,
}

pub struct DeleteProjectResult {
    pub project: Project,
    pub cascaded_tasks_count: usize,
}

/// Deletes a project and everything it owns: member rows, tasks, their
/// comments and attachment rows. Blob deletion happens after the rows are
/// durably gone and is best-effort.
pub fn delete_project(
    store: &mut Store,
    storage: &impl Storage,
    files: &impl FileStore,
    principal: &Principal,
    parameters: DeleteProjectParameters,
) -> Result<DeleteProjectResult, DeleteProjectError> {
    let project = store
        .get_project(parameters.project_id)
        .cloned()
        .ok_or(DeleteProjectError::NotFound)?;

    if !auth::authorize(
        store,
        principal,
        Policy::IsProjectOwner,
        Resource::Project(&project),
    ) {
        return Err(DeleteProjectError::NotAllowed);
    }

    let task_ids: Vec<Uuid> = store
        .get_tasks_for_project(project.id)
        .map(|t| t.id)
        .collect();
    let cascaded_tasks_count = task_ids.len();

    let mut orphaned_paths = Vec::new();
    for task_id in &task_ids {
        let comment_ids: Vec<Uuid> = store
            .get_comments_for_task(*task_id)
            .map(|c| c.id)
            .collect();
        store.remove_comments(&comment_ids);

        let attachments: Vec<(Uuid, String)> = store
            .get_attachments_for_task(*task_id)
            .map(|a| (a.id, a.stored_path.clone()))
            .collect();
        for (attachment_id, stored_path) in attachments {
            store.remove_attachment(attachment_id);
            orphaned_paths.push(stored_path);
        }
    }

    for task_id in &task_ids {
        store.remove_task(*task_id);
    }

    let member_ids: Vec<Uuid> = store
        .get_members_for_project(project.id)
        .map(|m| m.id)
        .collect();
    for member_id in member_ids {
        store.remove_member(member_id);
    }

    store.projects.retain(|p| p.id != project.id);
    storage.save(store)?;

    for stored_path in orphaned_paths {
        if let Err(e) = files.delete(&stored_path) {
            tracing::warn!(path = %stored_path, error = %e, "failed to delete attachment blob during project cascade");
        }
    }

    Ok(DeleteProjectResult {
        project,
        cascaded_tasks_count,
    })
}

#[derive(Debug, Error)]
pub enum InviteMemberError {
    #[error("Project not found")]
    ProjectNotFound,

    #[error("Not allowed")]
    NotAllowed,

    #[error("User with email '{0}' not found")]
    UserNotFound(String),

    #[error("User is already a member of this project")]
    AlreadyMember,

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

pub struct InviteMemberParameters {
    pub project_id: Uuid,
    pub email: String,
}

pub fn invite_member(
    store: &mut Store,
    storage: &impl Storage,
    principal: &Principal,
    parameters: InviteMemberParameters,
) -> Result<ProjectMember, InviteMemberError> {
    let project = store
        .get_project(parameters.project_id)
        .cloned()
        .ok_or(InviteMemberError::ProjectNotFound)?;

    if !auth::authorize(
        store,
        principal,
        Policy::IsProjectOwner,
        Resource::Project(&project),
    ) {
        return Err(InviteMemberError::NotAllowed);
    }

    let email = parameters.email.trim();
    let target = store
        .get_user_by_email(email)
        .ok_or_else(|| InviteMemberError::UserNotFound(email.to_string()))?;
    let target_id = target.id.clone();

    // (project, user) pairs are unique; the owner joining as a member row is
    // also pointless and rejected the same way
    if store.has_member(project.id, &target_id) || project.owner_id == target_id {
        return Err(InviteMemberError::AlreadyMember);
    }

    let member = ProjectMember {
        id: Uuid::new_v4(),
        project_id: project.id,
        user_id: target_id,
        role: ProjectMember::DEFAULT_ROLE.to_string(),
    };

    store.add_member(member.clone());
    storage.save(store)?;

    Ok(member)
}

#[derive(Debug, Error)]
pub enum RemoveMemberError {
    #[error("Project not found")]
    ProjectNotFound,

    #[error("Not allowed")]
    NotAllowed,

    #[error("Member not found")]
    MemberNotFound,

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

pub struct RemoveMemberParameters {
    pub project_id: Uuid,
    pub member_id: Uuid,
}

pub fn remove_member(
    store: &mut Store,
    storage: &impl Storage,
    principal: &Principal,
    parameters: RemoveMemberParameters,
) -> Result<ProjectMember, RemoveMemberError> {
    let project = store
        .get_project(parameters.project_id)
        .cloned()
        .ok_or(RemoveMemberError::ProjectNotFound)?;

    if !auth::authorize(
        store,
        principal,
        Policy::IsProjectOwner,
        Resource::Project(&project),
    ) {
        return Err(RemoveMemberError::NotAllowed);
    }

    let member = store
        .get_member(parameters.member_id)
        .filter(|m| m.project_id == project.id)
        .cloned()
        .ok_or(RemoveMemberError::MemberNotFound)?;

    store.remove_member(member.id);
    storage.save(store)?;

    Ok(member)
}

/// Read path: every project the user owns or is a member of
pub fn visible_projects<'a>(store: &'a Store, principal: &Principal) -> Vec<&'a Project> {
    let Some(user_id) = principal.user_id() else {
        return vec![];
    };

    store
        .projects
        .iter()
        .filter(|p| p.owner_id == user_id || store.has_member(p.id, user_id))
        .collect()
}

pub fn get_project_if_visible<'a>(
    store: &'a Store,
    principal: &Principal,
    project_id: Uuid,
) -> Option<&'a Project> {
    let project = store.get_project(project_id)?;
    if auth::authorize(
        store,
        principal,
        Policy::IsProjectMember,
        Resource::Project(project),
    ) {
        Some(project)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::access;
    use crate::files::LocalFileStore;
    use crate::models::task::TaskItem;
    use crate::services::testing::{RecordingStorage, store_with_project};
    use std::path::PathBuf;

    fn null_files() -> LocalFileStore {
        LocalFileStore::new(PathBuf::from("/tmp/kanbo_projects_test_files"))
    }

    #[test]
    fn test_create_project_requires_authentication_and_name() {
        let mut store = Store::default();
        let storage = RecordingStorage::new();

        assert!(matches!(
            create_project(
                &mut store,
                &storage,
                &Principal::anonymous(),
                CreateProjectParameters {
                    name: String::from("Launch"),
                    description: None,
                }
            ),
            Err(CreateProjectError::NotAllowed)
        ));

        assert!(matches!(
            create_project(
                &mut store,
                &storage,
                &Principal::authenticated("u-owner"),
                CreateProjectParameters {
                    name: String::from(" x "),
                    description: None,
                }
            ),
            Err(CreateProjectError::NameTooShort)
        ));

        let project = create_project(
            &mut store,
            &storage,
            &Principal::authenticated("u-owner"),
            CreateProjectParameters {
                name: String::from("  Launch  "),
                description: Some(String::from("   ")),
            },
        )
        .unwrap();

        assert_eq!(project.name, "Launch");
        assert_eq!(project.owner_id, "u-owner");
        assert!(project.description.is_none(), "blank description becomes None");
    }

    #[test]
    fn test_invite_flips_membership_and_rejects_duplicates() {
        let (mut store, project_id) = store_with_project();
        let storage = RecordingStorage::new();
        let owner = Principal::authenticated("u-owner");

        assert!(!access::is_project_member(&store, "u-other", project_id));

        let member = invite_member(
            &mut store,
            &storage,
            &owner,
            InviteMemberParameters {
                project_id,
                email: String::from("other@example.com"),
            },
        )
        .unwrap();
        assert_eq!(member.role, "Member");
        assert!(access::is_project_member(&store, "u-other", project_id));

        assert!(matches!(
            invite_member(
                &mut store,
                &storage,
                &owner,
                InviteMemberParameters {
                    project_id,
                    email: String::from("other@example.com"),
                }
            ),
            Err(InviteMemberError::AlreadyMember)
        ));

        // Removing the row flips the predicate back
        remove_member(
            &mut store,
            &storage,
            &owner,
            RemoveMemberParameters {
                project_id,
                member_id: member.id,
            },
        )
        .unwrap();
        assert!(!access::is_project_member(&store, "u-other", project_id));
    }

    #[test]
    fn test_only_owner_administers_membership() {
        let (mut store, project_id) = store_with_project();
        let storage = RecordingStorage::new();

        assert!(matches!(
            invite_member(
                &mut store,
                &storage,
                &Principal::authenticated("u-member"),
                InviteMemberParameters {
                    project_id,
                    email: String::from("other@example.com"),
                }
            ),
            Err(InviteMemberError::NotAllowed)
        ));

        assert!(matches!(
            invite_member(
                &mut store,
                &storage,
                &Principal::authenticated("u-owner"),
                InviteMemberParameters {
                    project_id,
                    email: String::from("nobody@example.com"),
                }
            ),
            Err(InviteMemberError::UserNotFound(_))
        ));
    }

    #[test]
    fn test_visible_projects_filters_by_membership() {
        let (store, project_id) = store_with_project();

        let owner_view = visible_projects(&store, &Principal::authenticated("u-owner"));
        assert_eq!(owner_view.len(), 1);
        assert_eq!(owner_view[0].id, project_id);

        let member_view = visible_projects(&store, &Principal::authenticated("u-member"));
        assert_eq!(member_view.len(), 1);

        assert!(visible_projects(&store, &Principal::authenticated("u-other")).is_empty());
        assert!(visible_projects(&store, &Principal::anonymous()).is_empty());

        assert!(get_project_if_visible(&store, &Principal::authenticated("u-other"), project_id)
            .is_none());
    }

    #[test]
    fn test_delete_project_cascades_tasks_and_rows() {
        let (mut store, project_id) = store_with_project();
        let storage = RecordingStorage::new();

        for title in ["One", "Two"] {
            store.add_task(TaskItem {
                id: Uuid::new_v4(),
                project_id,
                title: title.to_string(),
                author_id: String::from("u-member"),
                ..TaskItem::default()
            });
        }

        assert!(matches!(
            delete_project(
                &mut store,
                &storage,
                &null_files(),
                &Principal::authenticated("u-member"),
                DeleteProjectParameters { project_id }
            ),
            Err(DeleteProjectError::NotAllowed)
        ));

        let result = delete_project(
            &mut store,
            &storage,
            &null_files(),
            &Principal::authenticated("u-owner"),
            DeleteProjectParameters { project_id },
        )
        .unwrap();

        assert_eq!(result.cascaded_tasks_count, 2);
        assert!(store.projects.is_empty());
        assert!(store.tasks.is_empty());
        assert!(store.members.is_empty(), "member rows removed with project");
    }
}
