use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use clap::{Parser, Subcommand};
use colored::*;
use uuid::Uuid;

use crate::{
    auth::Principal,
    files::{LocalFileStore, UploadLimits},
    models::{
        comment::TaskComment,
        project::Project,
        store::Store,
        task::{TaskItem, TaskStatus},
    },
    services::{
        attachments::{
            AddAttachmentError, AddAttachmentParameters, DeleteAttachmentError,
            DeleteAttachmentParameters, OpenAttachmentError, add_attachment, delete_attachment,
            open_attachment,
        },
        comments::{
            AddCommentError, AddCommentParameters, DeleteThreadError, DeleteThreadParameters,
            EditCommentError, EditCommentParameters, add_comment, build_tree, delete_thread,
            edit_comment,
        },
        projects::{
            CreateProjectError, CreateProjectParameters, DeleteProjectError,
            DeleteProjectParameters, InviteMemberError, InviteMemberParameters, RemoveMemberError,
            RemoveMemberParameters, create_project, delete_project, get_project_if_visible,
            invite_member, remove_member, visible_projects,
        },
        tasks::{
            ChangeStatusError, ChangeStatusParameters, CreateTaskError, CreateTaskParameters,
            DeleteTaskError, DeleteTaskParameters, UpdateTaskError, UpdateTaskParameters,
            change_status, create_task, delete_task, kanban_board, update_task,
        },
        users::{RegisterUserError, RegisterUserParameters, register_user},
    },
    storage::{Storage, json::JsonFileStorage},
};

mod auth;
mod files;
mod models;
mod services;
mod storage;
mod ui;

#[derive(Parser)]
#[command(
    name = "kanbo",
    about = "A multi-user kanban board for your terminal"
)]
struct Cli {
    /// Act as the user registered under this email
    #[arg(long, global = true, env = "KANBO_USER")]
    user: Option<String>,

    /// Override the data directory
    #[arg(long, global = true, env = "KANBO_DATA_DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage users
    #[command(subcommand)]
    User(UserCommands),

    /// Manage projects and their members
    #[command(subcommand)]
    Project(ProjectCommands),

    /// Manage tasks
    #[command(subcommand)]
    Task(TaskCommands),

    /// Show a project's kanban board
    Board {
        /// Project name (or a unique part of it)
        project: String,
    },

    /// Manage task comments
    #[command(subcommand)]
    Comment(CommentCommands),

    /// Manage task attachments
    #[command(subcommand)]
    Attach(AttachCommands),
}

#[derive(Subcommand)]
enum UserCommands {
    /// Register a new user
    Add { email: String },
    /// List registered users
    List,
}

#[derive(Subcommand)]
enum ProjectCommands {
    /// Create a new project
    New {
        name: String,

        /// Project description
        #[arg(short, long)]
        description: Option<String>,
    },
    /// List projects you own or belong to
    List,
    /// Delete a project and everything in it
    Delete { project: String },
    /// Invite a registered user to a project
    Invite { project: String, email: String },
    /// List a project's members
    Members { project: String },
    /// Remove a member from a project
    RemoveMember { project: String, email: String },
}

#[derive(Subcommand)]
enum TaskCommands {
    /// Add a task to a project
    Add {
        /// Project name (or a unique part of it)
        project: String,

        title: String,

        /// Markdown description
        #[arg(short, long)]
        description: Option<String>,

        /// Starting column (backlog, in-progress, blocked, done)
        #[arg(short, long)]
        status: Option<String>,
    },
    /// Edit a task's title or description
    Edit {
        /// Task id (or a unique prefix)
        task: String,

        #[arg(short, long)]
        title: Option<String>,

        #[arg(short, long)]
        description: Option<String>,
    },
    /// Move a task to another column
    Move {
        /// Task id (or a unique prefix)
        task: String,

        /// Target column (backlog, in-progress, blocked, done)
        status: String,
    },
    /// Delete a task with its comments and attachments
    Delete {
        /// Task id (or a unique prefix)
        task: String,
    },
    /// Show a task with its comment thread and attachments
    View {
        /// Task id (or a unique prefix)
        task: String,
    },
}

#[derive(Subcommand)]
enum CommentCommands {
    /// Comment on a task
    Add {
        /// Task id (or a unique prefix)
        task: String,

        /// Comment body (markdown)
        body: String,

        /// Reply to an existing comment on the same task
        #[arg(short, long)]
        reply_to: Option<String>,
    },
    /// Edit one of your comments
    Edit {
        /// Comment id (or a unique prefix)
        comment: String,

        body: String,
    },
    /// Delete one of your comments together with all replies under it
    Delete {
        /// Comment id (or a unique prefix)
        comment: String,
    },
}

#[derive(Subcommand)]
enum AttachCommands {
    /// Attach a local file to a task
    Add {
        /// Task id (or a unique prefix)
        task: String,

        /// File to upload
        path: PathBuf,

        /// Override the guessed content type
        #[arg(short, long)]
        content_type: Option<String>,
    },
    /// List a task's attachments
    List {
        /// Task id (or a unique prefix)
        task: String,
    },
    /// Download an attachment
    Get {
        /// Task id (or a unique prefix)
        task: String,

        /// Attachment id (or a unique prefix)
        attachment: String,

        /// Write to this path instead of the original file name
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Print to stdout instead of writing a file
        #[arg(long)]
        inline: bool,
    },
    /// Delete an attachment
    Delete {
        /// Task id (or a unique prefix)
        task: String,

        /// Attachment id (or a unique prefix)
        attachment: String,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let data_dir = cli.data_dir.unwrap_or_else(|| {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("kanbo")
    });

    std::fs::create_dir_all(&data_dir).unwrap_or_else(|e| {
        eprintln!("Error: Failed to create data directory: {}", e);
        std::process::exit(1);
    });

    let storage = JsonFileStorage::new(data_dir.join("store.json"));
    let files = LocalFileStore::new(data_dir.join("files"));
    let limits = UploadLimits::default();

    let mut store = match storage.load() {
        Ok(store) => store,
        Err(e) => {
            eprintln!("Error: Failed to load store: {}", e);
            std::process::exit(1);
        }
    };

    let principal = resolve_principal(&store, cli.user.as_deref());

    match cli.command {
        Commands::User(UserCommands::Add { email }) => {
            match register_user(&mut store, &storage, RegisterUserParameters { email }) {
                Ok(user) => {
                    println!("✓ User registered: {}", user.email);
                }
                Err(RegisterUserError::InvalidEmail(email)) => {
                    eprintln!("Error: '{}' is not a valid email address", email);
                    std::process::exit(1);
                }
                Err(RegisterUserError::AlreadyRegistered(email)) => {
                    eprintln!("Error: '{}' is already registered", email);
                    std::process::exit(1);
                }
                Err(RegisterUserError::Storage(e)) => {
                    eprintln!("Error: Failed to save user: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::User(UserCommands::List) => {
            if store.users.is_empty() {
                println!("No users registered");
            } else {
                let mut users: Vec<_> = store.users.iter().collect();
                users.sort_by(|a, b| a.email.to_lowercase().cmp(&b.email.to_lowercase()));

                ui::render_view_header("Users", users.len(), "user");
                for user in users {
                    println!("  {} {}", "•".green(), user.email.bold());
                }
            }
        }
        Commands::Project(ProjectCommands::New { name, description }) => {
            let params = CreateProjectParameters { name, description };
            match create_project(&mut store, &storage, &principal, params) {
                Ok(project) => {
                    println!("✓ Project created: {}", project.name);
                    println!("  {}", ui::short_id(project.id).dimmed());
                }
                Err(CreateProjectError::NameTooShort) => {
                    eprintln!("Error: Project name must be at least 2 characters long");
                    std::process::exit(1);
                }
                Err(CreateProjectError::NotAllowed) => {
                    exit_not_signed_in();
                }
                Err(CreateProjectError::Storage(e)) => {
                    eprintln!("Error: Failed to save project: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::Project(ProjectCommands::List) => {
            let mut projects = visible_projects(&store, &principal);

            if projects.is_empty() {
                println!("No projects found");
            } else {
                projects.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));

                ui::render_view_header("Projects", projects.len(), "project");

                for project in projects {
                    let task_count = store.get_tasks_for_project(project.id).count();
                    let member_count = store.get_members_for_project(project.id).count() + 1;

                    println!("  {} {}", "•".green(), project.name.bold());
                    if let Some(description) = &project.description {
                        println!("    {}", description.dimmed());
                    }
                    println!(
                        "    {}",
                        format!(
                            "{} task(s) • {} member(s) • owned by {}",
                            task_count,
                            member_count,
                            store.author_label(&project.owner_id)
                        )
                        .dimmed()
                    );
                    println!();
                }
            }
        }
        Commands::Project(ProjectCommands::Delete { project }) => {
            let project = resolve_project(&store, &principal, &project);
            let params = DeleteProjectParameters {
                project_id: project.id,
            };

            match delete_project(&mut store, &storage, &files, &principal, params) {
                Ok(result) => {
                    println!("✓ Project deleted: {}", result.project.name);
                    if result.cascaded_tasks_count > 0 {
                        println!("  └─ {} task(s) also deleted", result.cascaded_tasks_count);
                    }
                }
                Err(DeleteProjectError::NotFound) => {
                    eprintln!("Error: Project not found");
                    std::process::exit(1);
                }
                Err(DeleteProjectError::NotAllowed) => {
                    eprintln!("Error: Only the project owner can delete a project");
                    std::process::exit(1);
                }
                Err(DeleteProjectError::Storage(e)) => {
                    eprintln!("Error: Failed to delete project: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::Project(ProjectCommands::Invite { project, email }) => {
            let project = resolve_project(&store, &principal, &project);
            let params = InviteMemberParameters {
                project_id: project.id,
                email: email.clone(),
            };

            match invite_member(&mut store, &storage, &principal, params) {
                Ok(member) => {
                    println!("✓ {} invited to {}", email, project.name);
                    println!("  Role: {}", member.role);
                }
                Err(InviteMemberError::ProjectNotFound) => {
                    eprintln!("Error: Project not found");
                    std::process::exit(1);
                }
                Err(InviteMemberError::NotAllowed) => {
                    eprintln!("Error: Only the project owner can invite members");
                    std::process::exit(1);
                }
                Err(InviteMemberError::UserNotFound(email)) => {
                    eprintln!("Error: No user with email '{}'", email);
                    eprintln!("\nThey need to register first: kanbo user add {}", email);
                    std::process::exit(1);
                }
                Err(InviteMemberError::AlreadyMember) => {
                    eprintln!("Error: '{}' is already part of this project", email);
                    std::process::exit(1);
                }
                Err(InviteMemberError::Storage(e)) => {
                    eprintln!("Error: Failed to save member: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::Project(ProjectCommands::Members { project }) => {
            let project = resolve_project(&store, &principal, &project);
            let members: Vec<_> = store.get_members_for_project(project.id).collect();

            ui::render_view_header(&project.name, members.len() + 1, "member");
            println!(
                "  {} {} {}",
                "•".green(),
                store.author_label(&project.owner_id).bold(),
                "(Owner)".dimmed()
            );
            for member in members {
                println!(
                    "  {} {} {}",
                    "•".green(),
                    store.author_label(&member.user_id).bold(),
                    format!("({})", member.role).dimmed()
                );
            }
        }
        Commands::Project(ProjectCommands::RemoveMember { project, email }) => {
            let project = resolve_project(&store, &principal, &project);

            let Some(user) = store.get_user_by_email(&email) else {
                eprintln!("Error: No user with email '{}'", email);
                std::process::exit(1);
            };
            let Some(member) = store
                .get_members_for_project(project.id)
                .find(|m| m.user_id == user.id)
            else {
                eprintln!("Error: '{}' is not a member of {}", email, project.name);
                std::process::exit(1);
            };

            let params = RemoveMemberParameters {
                project_id: project.id,
                member_id: member.id,
            };

            match remove_member(&mut store, &storage, &principal, params) {
                Ok(_) => {
                    println!("✓ {} removed from {}", email, project.name);
                }
                Err(RemoveMemberError::ProjectNotFound) => {
                    eprintln!("Error: Project not found");
                    std::process::exit(1);
                }
                Err(RemoveMemberError::NotAllowed) => {
                    eprintln!("Error: Only the project owner can remove members");
                    std::process::exit(1);
                }
                Err(RemoveMemberError::MemberNotFound) => {
                    eprintln!("Error: '{}' is not a member of {}", email, project.name);
                    std::process::exit(1);
                }
                Err(RemoveMemberError::Storage(e)) => {
                    eprintln!("Error: Failed to remove member: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::Board { project } => {
            let project = resolve_project(&store, &principal, &project);

            match kanban_board(&store, &principal, project.id) {
                Some(board) => ui::render_board(&board),
                None => {
                    eprintln!("Error: Project not found");
                    std::process::exit(1);
                }
            }
        }
        Commands::Task(TaskCommands::Add {
            project,
            title,
            description,
            status,
        }) => {
            let project = resolve_project(&store, &principal, &project);
            let status = status
                .as_deref()
                .map(parse_status)
                .unwrap_or(TaskStatus::Backlog);

            let params = CreateTaskParameters {
                project_id: project.id,
                title,
                description_markdown: description,
                status,
            };

            match create_task(&mut store, &storage, &principal, params) {
                Ok(task) => {
                    println!("✓ Task added: {}", task.title);
                    println!("  {} · {}", ui::short_id(task.id), task.status);
                }
                Err(CreateTaskError::ProjectNotFound) => {
                    eprintln!("Error: Project not found");
                    std::process::exit(1);
                }
                Err(CreateTaskError::NotAllowed) => {
                    eprintln!("Error: You are not a member of this project");
                    std::process::exit(1);
                }
                Err(CreateTaskError::TitleTooShort) => {
                    eprintln!("Error: Task title must be at least 2 characters long");
                    std::process::exit(1);
                }
                Err(CreateTaskError::Storage(e)) => {
                    eprintln!("Error: Failed to save task: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::Task(TaskCommands::Edit {
            task,
            title,
            description,
        }) => {
            let task = resolve_task(&store, &principal, &task);

            // Unchanged fields keep their current value
            let params = UpdateTaskParameters {
                task_id: task.id,
                title: title.unwrap_or_else(|| task.title.clone()),
                description_markdown: description.or_else(|| task.description_markdown.clone()),
            };

            match update_task(&mut store, &storage, &principal, params) {
                Ok(task) => {
                    println!("✓ Task updated: {}", task.title);
                }
                Err(UpdateTaskError::NotFound) => {
                    eprintln!("Error: Task not found");
                    std::process::exit(1);
                }
                Err(UpdateTaskError::NotAllowed) => {
                    eprintln!("Error: Only the task author or project owner can edit a task");
                    std::process::exit(1);
                }
                Err(UpdateTaskError::TitleTooShort) => {
                    eprintln!("Error: Task title must be at least 2 characters long");
                    std::process::exit(1);
                }
                Err(UpdateTaskError::Storage(e)) => {
                    eprintln!("Error: Failed to save task: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::Task(TaskCommands::Move { task, status }) => {
            let task = resolve_task(&store, &principal, &task);
            let status = parse_status(&status);

            let params = ChangeStatusParameters {
                task_id: task.id,
                status,
            };

            match change_status(&mut store, &storage, &principal, params) {
                Ok(task) => {
                    println!("✓ Task moved: {}", task.title);
                    println!("  {}", ui::styled_status(task.status));
                }
                Err(ChangeStatusError::NotFound) => {
                    eprintln!("Error: Task not found");
                    std::process::exit(1);
                }
                Err(ChangeStatusError::NotAllowed) => {
                    eprintln!("Error: You are not a member of this project");
                    std::process::exit(1);
                }
                Err(ChangeStatusError::Storage(e)) => {
                    eprintln!("Error: Failed to save task: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::Task(TaskCommands::Delete { task }) => {
            let task = resolve_task(&store, &principal, &task);
            let params = DeleteTaskParameters { task_id: task.id };

            match delete_task(&mut store, &storage, &files, &principal, params) {
                Ok(result) => {
                    println!("✓ Task deleted: {}", result.task.title);
                    if result.cascaded_comments_count > 0 {
                        println!(
                            "  └─ {} comment(s) also deleted",
                            result.cascaded_comments_count
                        );
                    }
                    if result.cascaded_attachments_count > 0 {
                        println!(
                            "  └─ {} attachment(s) also deleted",
                            result.cascaded_attachments_count
                        );
                    }
                }
                Err(DeleteTaskError::NotFound) => {
                    eprintln!("Error: Task not found");
                    std::process::exit(1);
                }
                Err(DeleteTaskError::NotAllowed) => {
                    eprintln!("Error: Only the task author or project owner can delete a task");
                    std::process::exit(1);
                }
                Err(DeleteTaskError::Storage(e)) => {
                    eprintln!("Error: Failed to delete task: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::Task(TaskCommands::View { task }) => {
            let task = resolve_task(&store, &principal, &task);

            ui::render_task_detail(&store, &task);

            let attachments: Vec<_> = store.get_attachments_for_task(task.id).collect();
            if !attachments.is_empty() {
                ui::render_section_header(&"Attachments".bold());
                for attachment in &attachments {
                    ui::render_attachment_line(&store, attachment);
                }
            }

            let tree = build_tree(&store, &principal, task.id);
            if !tree.is_empty() {
                ui::render_section_header(&"Comments".bold());
                ui::render_comment_tree(&tree);
            }
            println!();
        }
        Commands::Comment(CommentCommands::Add {
            task,
            body,
            reply_to,
        }) => {
            let task = resolve_task(&store, &principal, &task);

            // A reply target must be a comment on the same task
            let parent_id = reply_to.map(|prefix| {
                let parent = resolve_comment(&store, &prefix);
                if parent.task_item_id != task.id {
                    eprintln!("Error: Comment '{}' belongs to a different task", prefix);
                    std::process::exit(1);
                }
                parent.id
            });

            let params = AddCommentParameters {
                task_id: task.id,
                parent_id,
                body_markdown: body,
            };

            match add_comment(&mut store, &storage, &principal, params) {
                Ok(comment) => {
                    println!("✓ Comment added");
                    println!("  {}", ui::short_id(comment.id).dimmed());
                }
                Err(AddCommentError::EmptyBody) => {
                    eprintln!("Error: Comment body cannot be empty");
                    std::process::exit(1);
                }
                Err(AddCommentError::NotAllowed) => {
                    eprintln!("Error: Task not found");
                    std::process::exit(1);
                }
                Err(AddCommentError::Storage(e)) => {
                    eprintln!("Error: Failed to save comment: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::Comment(CommentCommands::Edit { comment, body }) => {
            let comment = resolve_comment(&store, &comment);
            let params = EditCommentParameters {
                comment_id: comment.id,
                body_markdown: body,
            };

            match edit_comment(&mut store, &storage, &principal, params) {
                Ok(_) => {
                    println!("✓ Comment updated");
                }
                Err(EditCommentError::EmptyBody) => {
                    eprintln!("Error: Comment body cannot be empty");
                    std::process::exit(1);
                }
                Err(EditCommentError::NotAllowed) => {
                    eprintln!("Error: Only the comment's author can edit it");
                    std::process::exit(1);
                }
                Err(EditCommentError::Storage(e)) => {
                    eprintln!("Error: Failed to save comment: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::Comment(CommentCommands::Delete { comment }) => {
            let comment = resolve_comment(&store, &comment);
            let params = DeleteThreadParameters {
                root_comment_id: comment.id,
            };

            match delete_thread(&mut store, &storage, &principal, params) {
                Ok(removed) => {
                    println!("✓ Comment deleted");
                    if removed > 1 {
                        println!("  └─ {} repl(ies) also deleted", removed - 1);
                    }
                }
                Err(DeleteThreadError::NotAllowed) => {
                    eprintln!("Error: Only the comment's author can delete it");
                    std::process::exit(1);
                }
                Err(DeleteThreadError::Storage(e)) => {
                    eprintln!("Error: Failed to delete comment: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::Attach(AttachCommands::Add {
            task,
            path,
            content_type,
        }) => {
            let task = resolve_task(&store, &principal, &task);

            let metadata = std::fs::metadata(&path).unwrap_or_else(|e| {
                eprintln!("Error: Cannot read '{}': {}", path.display(), e);
                std::process::exit(1);
            });
            let mut content = File::open(&path).unwrap_or_else(|e| {
                eprintln!("Error: Cannot read '{}': {}", path.display(), e);
                std::process::exit(1);
            });
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| {
                    eprintln!("Error: '{}' is not a file", path.display());
                    std::process::exit(1);
                });
            let content_type = content_type.unwrap_or_else(|| guess_content_type(&path));

            let params = AddAttachmentParameters {
                task_id: task.id,
                file_name,
                content_type,
                size_bytes: metadata.len(),
                content: &mut content,
            };

            match add_attachment(&mut store, &storage, &files, &limits, &principal, params) {
                Ok(attachment) => {
                    println!("✓ Attached: {}", attachment.file_name);
                    println!(
                        "  {} · {}",
                        ui::short_id(attachment.id),
                        ui::format_size(attachment.size_bytes)
                    );
                }
                Err(AddAttachmentError::TaskNotFound) => {
                    eprintln!("Error: Task not found");
                    std::process::exit(1);
                }
                Err(AddAttachmentError::NotAllowed) => {
                    eprintln!(
                        "Error: Only the task author or project owner can attach files"
                    );
                    std::process::exit(1);
                }
                Err(AddAttachmentError::FileTooLarge {
                    size_bytes,
                    limit_bytes,
                }) => {
                    eprintln!(
                        "Error: File is too large ({}, limit {})",
                        ui::format_size(size_bytes),
                        ui::format_size(limit_bytes)
                    );
                    std::process::exit(1);
                }
                Err(AddAttachmentError::ContentTypeNotAllowed(content_type)) => {
                    eprintln!("Error: Content type '{}' is not allowed", content_type);
                    eprintln!("\nAllowed types:");
                    for allowed in limits.allowed_content_types {
                        eprintln!("  - {}", allowed);
                    }
                    std::process::exit(1);
                }
                Err(AddAttachmentError::Files(e)) => {
                    eprintln!("Error: Failed to store file: {}", e);
                    std::process::exit(1);
                }
                Err(AddAttachmentError::Storage(e)) => {
                    eprintln!("Error: Failed to save attachment: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::Attach(AttachCommands::List { task }) => {
            let task = resolve_task(&store, &principal, &task);
            let attachments: Vec<_> = store.get_attachments_for_task(task.id).collect();

            if attachments.is_empty() {
                println!("No attachments on '{}'", task.title);
            } else {
                ui::render_view_header(&task.title, attachments.len(), "attachment");
                for attachment in attachments {
                    ui::render_attachment_line(&store, attachment);
                }
            }
        }
        Commands::Attach(AttachCommands::Get {
            task,
            attachment,
            out,
            inline,
        }) => {
            let task = resolve_task(&store, &principal, &task);
            let attachment_id = resolve_attachment(&store, task.id, &attachment);

            match open_attachment(&store, &files, &principal, task.id, attachment_id, inline) {
                Ok(mut download) => {
                    if inline {
                        if let Err(e) = io::copy(&mut download.content, &mut io::stdout()) {
                            eprintln!("Error: Failed to read attachment: {}", e);
                            std::process::exit(1);
                        }
                    } else {
                        let out = out.unwrap_or_else(|| PathBuf::from(&download.file_name));
                        let mut target = File::create(&out).unwrap_or_else(|e| {
                            eprintln!("Error: Cannot write '{}': {}", out.display(), e);
                            std::process::exit(1);
                        });
                        if let Err(e) = io::copy(&mut download.content, &mut target) {
                            eprintln!("Error: Failed to write attachment: {}", e);
                            std::process::exit(1);
                        }
                        println!("✓ Saved {} to {}", download.file_name, out.display());
                    }
                }
                Err(OpenAttachmentError::NotFound) => {
                    eprintln!("Error: Attachment not found");
                    std::process::exit(1);
                }
                Err(OpenAttachmentError::NotAllowed) => {
                    eprintln!("Error: You are not a member of this project");
                    std::process::exit(1);
                }
                Err(OpenAttachmentError::Files(e)) => {
                    eprintln!("Error: Failed to open attachment: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::Attach(AttachCommands::Delete { task, attachment }) => {
            let task = resolve_task(&store, &principal, &task);
            let attachment_id = resolve_attachment(&store, task.id, &attachment);

            let params = DeleteAttachmentParameters {
                task_id: task.id,
                attachment_id,
            };

            match delete_attachment(&mut store, &storage, &files, &principal, params) {
                Ok(attachment) => {
                    println!("✓ Attachment deleted: {}", attachment.file_name);
                }
                Err(DeleteAttachmentError::NotFound) => {
                    eprintln!("Error: Attachment not found");
                    std::process::exit(1);
                }
                Err(DeleteAttachmentError::NotAllowed) => {
                    eprintln!(
                        "Error: Only the task author or project owner can delete attachments"
                    );
                    std::process::exit(1);
                }
                Err(DeleteAttachmentError::Storage(e)) => {
                    eprintln!("Error: Failed to delete attachment: {}", e);
                    std::process::exit(1);
                }
            }
        }
    }
}

fn exit_not_signed_in() -> ! {
    eprintln!("Error: This command requires a user");
    eprintln!("\nPass --user <email> or set KANBO_USER. Register with: kanbo user add <email>");
    std::process::exit(1);
}

fn resolve_principal(store: &Store, email: Option<&str>) -> Principal {
    match email {
        Some(email) => match store.get_user_by_email(email) {
            Some(user) => Principal::authenticated(user.id.clone()),
            None => {
                eprintln!("Error: No user with email '{}'", email);
                eprintln!("\nRegister first: kanbo user add {}", email);
                std::process::exit(1);
            }
        },
        None => Principal::anonymous(),
    }
}

/// Find a project among those visible to the principal, by exact name first,
/// then by case-insensitive substring.
fn resolve_project(store: &Store, principal: &Principal, name: &str) -> Project {
    if principal.user_id().is_none() {
        exit_not_signed_in();
    }

    let visible = visible_projects(store, principal);
    let needle = name.to_lowercase();

    if let Some(project) = visible.iter().find(|p| p.name.to_lowercase() == needle) {
        return (*project).clone();
    }

    let matches: Vec<_> = visible
        .iter()
        .filter(|p| p.name.to_lowercase().contains(&needle))
        .collect();

    match matches.as_slice() {
        [] => {
            eprintln!("Error: Project '{}' not found", name);
            if !visible.is_empty() {
                eprintln!("\nYour projects:");
                for project in &visible {
                    eprintln!("  - {}", project.name);
                }
            }
            std::process::exit(1);
        }
        [project] => (**project).clone(),
        _ => {
            eprintln!("Error: Project name is ambiguous. Multiple projects found:");
            for project in matches {
                eprintln!("  - {}", project.name);
            }
            eprintln!("\nPlease be more specific.");
            std::process::exit(1);
        }
    }
}

/// Find a task by id prefix among the projects visible to the principal
fn resolve_task(store: &Store, principal: &Principal, prefix: &str) -> TaskItem {
    let matches: Vec<_> = store
        .tasks
        .iter()
        .filter(|t| t.id.to_string().starts_with(prefix))
        .filter(|t| get_project_if_visible(store, principal, t.project_id).is_some())
        .collect();

    match matches.as_slice() {
        [] => {
            eprintln!("Error: Task '{}' not found", prefix);
            std::process::exit(1);
        }
        [task] => (**task).clone(),
        _ => {
            eprintln!("Error: Task id is ambiguous. Multiple tasks found:");
            for task in matches {
                eprintln!("  - {}  {}", ui::short_id(task.id), task.title);
            }
            eprintln!("\nPlease use a longer prefix.");
            std::process::exit(1);
        }
    }
}

fn resolve_comment(store: &Store, prefix: &str) -> TaskComment {
    let matches: Vec<_> = store
        .comments
        .iter()
        .filter(|c| c.id.to_string().starts_with(prefix))
        .collect();

    match matches.as_slice() {
        [] => {
            eprintln!("Error: Comment '{}' not found", prefix);
            std::process::exit(1);
        }
        [comment] => (**comment).clone(),
        _ => {
            eprintln!("Error: Comment id is ambiguous. Please use a longer prefix.");
            std::process::exit(1);
        }
    }
}

fn resolve_attachment(store: &Store, task_id: Uuid, prefix: &str) -> Uuid {
    let matches: Vec<_> = store
        .get_attachments_for_task(task_id)
        .filter(|a| a.id.to_string().starts_with(prefix))
        .collect();

    match matches.as_slice() {
        [] => {
            eprintln!("Error: Attachment '{}' not found", prefix);
            std::process::exit(1);
        }
        [attachment] => attachment.id,
        _ => {
            eprintln!("Error: Attachment id is ambiguous. Multiple attachments found:");
            for attachment in matches {
                eprintln!("  - {}  {}", ui::short_id(attachment.id), attachment.file_name);
            }
            eprintln!("\nPlease use a longer prefix.");
            std::process::exit(1);
        }
    }
}

fn parse_status(raw: &str) -> TaskStatus {
    TaskStatus::from_str(raw).unwrap_or_else(|_| {
        eprintln!("Error: Unknown column '{}'", raw);
        eprintln!("\nValid columns:");
        for status in TaskStatus::COLUMNS {
            eprintln!("  - {}", status);
        }
        std::process::exit(1);
    })
}

fn guess_content_type(path: &Path) -> String {
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "pdf" => "application/pdf",
        "txt" | "log" => "text/plain",
        "md" => "text/markdown",
        "zip" => "application/zip",
        _ => "application/octet-stream",
    }
    .to_string()
}
