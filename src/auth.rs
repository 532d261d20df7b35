use crate::models::{
    attachment::TaskAttachment, comment::TaskComment, project::Project, store::Store,
    task::TaskItem,
};

pub mod access;

/// Acting identity. Unauthenticated principals carry no user id and fail
/// every policy.
#[derive(Default, Clone)]
pub struct Principal {
    user_id: Option<String>,
}

impl Principal {
    pub fn authenticated(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
        }
    }

    pub fn anonymous() -> Self {
        Self { user_id: None }
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }
}

/// Named authorization requirement, resolved against a resource instance
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Policy {
    IsProjectMember,
    IsProjectOwner,
    CanModifyTask,
    IsCommentAuthor,
}

/// A resource instance a policy can be checked against
#[derive(Clone, Copy)]
pub enum Resource<'a> {
    Project(&'a Project),
    Task(&'a TaskItem),
    Attachment(&'a TaskAttachment),
    Comment(&'a TaskComment),
}

/// One registered handler. `None` means the handler does not apply to the
/// resource's type; `Some(granted)` is its verdict.
type Handler = fn(&Store, &str, Resource<'_>) -> Option<bool>;

/// Registry of (policy, handler) pairs. A single policy name is checked
/// against resources of different types with type-specific lookup paths.
static HANDLERS: &[(Policy, Handler)] = &[
    (Policy::IsProjectMember, access::member_for_project),
    (Policy::IsProjectMember, access::member_for_task),
    (Policy::IsProjectMember, access::member_for_attachment),
    (Policy::IsProjectOwner, access::owner_for_project),
    (Policy::IsProjectOwner, access::owner_for_task),
    (Policy::CanModifyTask, access::modify_for_task),
    (Policy::CanModifyTask, access::modify_for_attachment),
    (Policy::IsCommentAuthor, access::author_for_comment),
];

/// Resolve a policy against a resource: OR-reduction over every applicable
/// handler. Fails closed for unauthenticated principals and for resources no
/// handler covers.
pub fn authorize(store: &Store, principal: &Principal, policy: Policy, resource: Resource<'_>) -> bool {
    let Some(user_id) = principal.user_id() else {
        return false;
    };

    HANDLERS
        .iter()
        .filter(|(registered, _)| *registered == policy)
        .filter_map(|(_, handler)| handler(store, user_id, resource))
        .any(|granted| granted)
}
