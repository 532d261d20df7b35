use std::collections::{HashMap, HashSet};

use jiff::Timestamp;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    auth::{self, Policy, Principal, Resource},
    models::{
        comment::{CommentNode, TaskComment},
        store::Store,
    },
    storage::{Storage, StorageError},
};

/// Assemble the reply forest for a task.
///
/// A missing task and a failed membership check both come back as an empty
/// forest so an outsider cannot distinguish "no such task" from "not yours".
/// Replies sit under their parent oldest-first; root threads come back
/// newest-first, the only place ordering is reversed relative to storage
/// order.
pub fn build_tree(store: &Store, principal: &Principal, task_id: Uuid) -> Vec<CommentNode> {
    let Some(task) = store.get_task(task_id) else {
        return vec![];
    };

    if !auth::authorize(store, principal, Policy::IsProjectMember, Resource::Task(task)) {
        return vec![];
    }

    let comments = store.comments_for_task_sorted(task_id);
    let present: HashSet<Uuid> = comments.iter().map(|c| c.id).collect();

    // Group replies under their parent. Creation-ascending input keeps each
    // child list oldest-first. A parent id that does not resolve within this
    // task's comment set (possible only if the same-task invariant were
    // violated upstream) files the comment as a root rather than dropping it.
    let mut children_of: HashMap<Uuid, Vec<&TaskComment>> = HashMap::new();
    let mut root_comments: Vec<&TaskComment> = vec![];
    for &comment in &comments {
        match comment.parent_comment_id {
            Some(parent_id) if present.contains(&parent_id) && parent_id != comment.id => {
                children_of.entry(parent_id).or_default().push(comment);
            }
            _ => root_comments.push(comment),
        }
    }

    let mut roots: Vec<CommentNode> = root_comments
        .into_iter()
        .map(|comment| make_node(store, comment, &children_of))
        .collect();

    roots.sort_by(|a, b| b.comment.created_at.cmp(&a.comment.created_at));
    roots
}

fn make_node(
    store: &Store,
    comment: &TaskComment,
    children_of: &HashMap<Uuid, Vec<&TaskComment>>,
) -> CommentNode {
    let children = children_of
        .get(&comment.id)
        .map(|replies| {
            replies
                .iter()
                .map(|&reply| make_node(store, reply, children_of))
                .collect()
        })
        .unwrap_or_default();

    CommentNode {
        comment: comment.clone(),
        author_label: store.author_label(&comment.author_id),
        children,
    }
}

#[derive(Debug, Error)]
pub enum AddCommentError {
    #[error("Comment body cannot be empty")]
    EmptyBody,

    /// Missing task and failed membership collapse into this one variant
    #[error("Not allowed")]
    NotAllowed,

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

pub struct AddCommentParameters {
    pub task_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub body_markdown: String,
}

/// Any project member may comment. A supplied `parent_id` is trusted here;
/// the validation boundary (CLI argument resolution) guarantees it names a
/// comment on the same task.
pub fn add_comment(
    store: &mut Store,
    storage: &impl Storage,
    principal: &Principal,
    parameters: AddCommentParameters,
) -> Result<TaskComment, AddCommentError> {
    let body_markdown = parameters.body_markdown.trim().to_string();
    if body_markdown.is_empty() {
        return Err(AddCommentError::EmptyBody);
    }

    let Some(task) = store.get_task(parameters.task_id).cloned() else {
        return Err(AddCommentError::NotAllowed);
    };

    if !auth::authorize(store, principal, Policy::IsProjectMember, Resource::Task(&task)) {
        return Err(AddCommentError::NotAllowed);
    }

    let comment = TaskComment {
        id: Uuid::new_v4(),
        task_item_id: task.id,
        author_id: principal.user_id().unwrap_or_default().to_string(),
        body_markdown,
        parent_comment_id: parameters.parent_id,
        created_at: Timestamp::now(),
        edited_at: None,
    };

    store.add_comment(comment.clone());
    storage.save(store)?;

    Ok(comment)
}

#[derive(Debug, Error)]
pub enum EditCommentError {
    #[error("Comment body cannot be empty")]
    EmptyBody,

    /// Missing comment and failed authorship collapse into this one variant
    #[error("Not allowed")]
    NotAllowed,

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

pub struct EditCommentParameters {
    pub comment_id: Uuid,
    pub body_markdown: String,
}

/// Only the comment's author may edit it. No history of prior bodies is kept.
pub fn edit_comment(
    store: &mut Store,
    storage: &impl Storage,
    principal: &Principal,
    parameters: EditCommentParameters,
) -> Result<TaskComment, EditCommentError> {
    let body_markdown = parameters.body_markdown.trim().to_string();
    if body_markdown.is_empty() {
        return Err(EditCommentError::EmptyBody);
    }

    let Some(comment) = store.get_comment(parameters.comment_id).cloned() else {
        return Err(EditCommentError::NotAllowed);
    };

    if !auth::authorize(
        store,
        principal,
        Policy::IsCommentAuthor,
        Resource::Comment(&comment),
    ) {
        return Err(EditCommentError::NotAllowed);
    }

    let mut updated_comment = comment;
    updated_comment.body_markdown = body_markdown;
    updated_comment.edited_at = Some(Timestamp::now());

    if let Some(comment) = store.get_comment_mut(updated_comment.id) {
        *comment = updated_comment.clone();
    }
    storage.save(store)?;

    Ok(updated_comment)
}

#[derive(Debug, Error)]
pub enum DeleteThreadError {
    /// Missing comment and failed authorship collapse into this one variant
    #[error("Not allowed")]
    NotAllowed,

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

pub struct DeleteThreadParameters {
    pub root_comment_id: Uuid,
}

/// Deletes a comment and its entire reply subtree in one batch.
///
/// Only the root's author is consulted; replies are removed as a
/// consequence, not authorized one by one. The batch is ordered children
/// before parents so a referential-integrity-enforcing store would accept
/// the same sequence.
pub fn delete_thread(
    store: &mut Store,
    storage: &impl Storage,
    principal: &Principal,
    parameters: DeleteThreadParameters,
) -> Result<usize, DeleteThreadError> {
    let Some(root) = store.get_comment(parameters.root_comment_id).cloned() else {
        return Err(DeleteThreadError::NotAllowed);
    };

    if !auth::authorize(
        store,
        principal,
        Policy::IsCommentAuthor,
        Resource::Comment(&root),
    ) {
        return Err(DeleteThreadError::NotAllowed);
    }

    let task_comments: Vec<TaskComment> = store
        .get_comments_for_task(root.task_item_id)
        .cloned()
        .collect();

    let mut ordered_ids = Vec::new();
    collect_subtree_post_order(&task_comments, root.id, &mut ordered_ids);

    let deleted = ordered_ids.len();
    store.remove_comments(&ordered_ids);
    storage.save(store)?;

    Ok(deleted)
}

/// Post-order walk over the in-memory comment set: children land in the
/// output before their parent. Cycles cannot occur because a parent id must
/// reference a pre-existing row on the same task.
fn collect_subtree_post_order(comments: &[TaskComment], root_id: Uuid, out: &mut Vec<Uuid>) {
    for comment in comments {
        if comment.parent_comment_id == Some(root_id) {
            collect_subtree_post_order(comments, comment.id, out);
        }
    }
    out.push(root_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::task::TaskItem;
    use crate::services::testing::{RecordingStorage, store_with_project};

    fn store_with_task() -> (Store, Uuid) {
        let (mut store, project_id) = store_with_project();
        let task = TaskItem {
            id: Uuid::new_v4(),
            project_id,
            title: String::from("Ship it"),
            author_id: String::from("u-member"),
            created_at: Timestamp::now(),
            ..TaskItem::default()
        };
        let task_id = task.id;
        store.add_task(task);
        (store, task_id)
    }

    fn comment(
        store: &mut Store,
        task_id: Uuid,
        author: &str,
        body: &str,
        parent: Option<Uuid>,
        at_second: i64,
    ) -> Uuid {
        let comment = TaskComment {
            id: Uuid::new_v4(),
            task_item_id: task_id,
            author_id: author.to_string(),
            body_markdown: body.to_string(),
            parent_comment_id: parent,
            created_at: Timestamp::from_second(at_second).unwrap(),
            edited_at: None,
        };
        let id = comment.id;
        store.add_comment(comment);
        id
    }

    const T0: i64 = 1_700_000_000;

    #[test]
    fn test_tree_nests_a_b_c() {
        let (mut store, task_id) = store_with_task();
        let a = comment(&mut store, task_id, "u-owner", "A", None, T0);
        let b = comment(&mut store, task_id, "u-member", "B", Some(a), T0 + 10);
        let c = comment(&mut store, task_id, "u-owner", "C", Some(b), T0 + 20);

        let forest = build_tree(&store, &Principal::authenticated("u-member"), task_id);

        assert_eq!(forest.len(), 1);
        assert_eq!(forest[0].comment.id, a);
        assert_eq!(forest[0].author_label, "owner@example.com");
        assert_eq!(forest[0].children.len(), 1);
        assert_eq!(forest[0].children[0].comment.id, b);
        assert_eq!(forest[0].children[0].children[0].comment.id, c);
    }

    #[test]
    fn test_tree_sibling_and_root_ordering() {
        let (mut store, task_id) = store_with_task();
        // Two threads; the second thread is newer
        let old_root = comment(&mut store, task_id, "u-owner", "old", None, T0);
        let new_root = comment(&mut store, task_id, "u-owner", "new", None, T0 + 100);
        // Replies to the old thread, inserted newest first
        let late_reply = comment(&mut store, task_id, "u-member", "late", Some(old_root), T0 + 50);
        let early_reply = comment(&mut store, task_id, "u-member", "early", Some(old_root), T0 + 10);

        let forest = build_tree(&store, &Principal::authenticated("u-owner"), task_id);

        // Roots newest first
        assert_eq!(forest[0].comment.id, new_root);
        assert_eq!(forest[1].comment.id, old_root);
        // Siblings oldest first regardless of insertion order
        let replies: Vec<Uuid> = forest[1].children.iter().map(|n| n.comment.id).collect();
        assert_eq!(replies, vec![early_reply, late_reply]);
    }

    #[test]
    fn test_tree_is_empty_for_outsiders_and_missing_tasks() {
        let (mut store, task_id) = store_with_task();
        comment(&mut store, task_id, "u-owner", "A", None, T0);

        assert!(build_tree(&store, &Principal::authenticated("u-other"), task_id).is_empty());
        assert!(build_tree(&store, &Principal::anonymous(), task_id).is_empty());
        assert!(
            build_tree(&store, &Principal::authenticated("u-owner"), Uuid::new_v4()).is_empty()
        );
    }

    #[test]
    fn test_add_comment_collapses_not_found_and_forbidden() {
        let (mut store, task_id) = store_with_task();
        let storage = RecordingStorage::new();

        let added = add_comment(
            &mut store,
            &storage,
            &Principal::authenticated("u-member"),
            AddCommentParameters {
                task_id,
                parent_id: None,
                body_markdown: String::from("  first!  "),
            },
        )
        .unwrap();
        assert_eq!(added.body_markdown, "first!");
        assert!(added.edited_at.is_none());

        assert!(matches!(
            add_comment(
                &mut store,
                &storage,
                &Principal::authenticated("u-other"),
                AddCommentParameters {
                    task_id,
                    parent_id: None,
                    body_markdown: String::from("hi"),
                }
            ),
            Err(AddCommentError::NotAllowed)
        ));
        assert!(matches!(
            add_comment(
                &mut store,
                &storage,
                &Principal::authenticated("u-member"),
                AddCommentParameters {
                    task_id: Uuid::new_v4(),
                    parent_id: None,
                    body_markdown: String::from("hi"),
                }
            ),
            Err(AddCommentError::NotAllowed)
        ));
        assert!(matches!(
            add_comment(
                &mut store,
                &storage,
                &Principal::authenticated("u-member"),
                AddCommentParameters {
                    task_id,
                    parent_id: None,
                    body_markdown: String::from("   "),
                }
            ),
            Err(AddCommentError::EmptyBody)
        ));
    }

    #[test]
    fn test_edit_comment_author_only_sets_edited_at() {
        let (mut store, task_id) = store_with_task();
        let storage = RecordingStorage::new();
        let id = comment(&mut store, task_id, "u-member", "draft", None, T0);

        assert!(matches!(
            edit_comment(
                &mut store,
                &storage,
                &Principal::authenticated("u-owner"),
                EditCommentParameters {
                    comment_id: id,
                    body_markdown: String::from("hijack"),
                }
            ),
            Err(EditCommentError::NotAllowed)
        ));

        let edited = edit_comment(
            &mut store,
            &storage,
            &Principal::authenticated("u-member"),
            EditCommentParameters {
                comment_id: id,
                body_markdown: String::from("final"),
            },
        )
        .unwrap();
        assert_eq!(edited.body_markdown, "final");
        assert!(edited.edited_at.is_some());
    }

    #[test]
    fn test_delete_thread_is_transitive_and_all_or_nothing() {
        let (mut store, task_id) = store_with_task();
        let storage = RecordingStorage::new();
        let a = comment(&mut store, task_id, "u-owner", "A", None, T0);
        let b = comment(&mut store, task_id, "u-member", "B", Some(a), T0 + 10);
        let _c = comment(&mut store, task_id, "u-owner", "C", Some(b), T0 + 20);

        let deleted = delete_thread(
            &mut store,
            &storage,
            &Principal::authenticated("u-owner"),
            DeleteThreadParameters { root_comment_id: a },
        )
        .unwrap();

        assert_eq!(deleted, 3);
        assert!(store.comments.is_empty());
    }

    #[test]
    fn test_delete_subthread_keeps_ancestors() {
        let (mut store, task_id) = store_with_task();
        let storage = RecordingStorage::new();
        let a = comment(&mut store, task_id, "u-owner", "A", None, T0);
        let b = comment(&mut store, task_id, "u-member", "B", Some(a), T0 + 10);
        let _c = comment(&mut store, task_id, "u-owner", "C", Some(b), T0 + 20);

        // Only B's author may delete B's subtree, even though C is not theirs
        assert!(matches!(
            delete_thread(
                &mut store,
                &storage,
                &Principal::authenticated("u-other"),
                DeleteThreadParameters { root_comment_id: b },
            ),
            Err(DeleteThreadError::NotAllowed)
        ));

        let deleted = delete_thread(
            &mut store,
            &storage,
            &Principal::authenticated("u-member"),
            DeleteThreadParameters { root_comment_id: b },
        )
        .unwrap();

        assert_eq!(deleted, 2, "B and C removed");
        assert_eq!(store.comments.len(), 1);
        assert_eq!(store.comments[0].id, a);
    }
}
