use colored::*;

use crate::models::{
    attachment::TaskAttachment,
    comment::CommentNode,
    store::Store,
    task::{TaskItem, TaskStatus},
};
use crate::services::tasks::Board;

/// Get the terminal width, defaulting to 80 if unavailable
fn get_terminal_width() -> usize {
    term_size::dimensions().map(|(w, _)| w).unwrap_or(80)
}

/// Color a status label the way the board colors its columns
pub fn styled_status(status: TaskStatus) -> ColoredString {
    match status {
        TaskStatus::Backlog => status.label().normal(),
        TaskStatus::InProgress => status.label().yellow(),
        TaskStatus::Blocked => status.label().red(),
        TaskStatus::Done => status.label().green(),
    }
}

/// Render a view header with title and count
pub fn render_view_header(title: &str, count: usize, noun: &str) {
    let word = if count == 1 {
        noun.to_string()
    } else {
        format!("{noun}s")
    };
    println!("\n  {} ({} {})\n", title.cyan().bold(), count, word);
}

/// Render a section header (e.g., a board column or "Comments")
pub fn render_section_header(title: &ColoredString) {
    println!("\n  ─── {} ───\n", title);
}

pub fn render_board(board: &Board) {
    let total: usize = board.columns.iter().map(|c| c.cards.len()).sum();
    render_view_header(&board.project_name, total, "task");

    for column in &board.columns {
        render_section_header(&styled_status(column.status).bold());
        if column.cards.is_empty() {
            println!("  {}", "(empty)".dimmed());
            continue;
        }
        for card in &column.cards {
            render_task_line(&card.task, &card.author_label);
        }
    }
    println!();
}

/// Render a single task line with short id, title, and right-aligned author
pub fn render_task_line(task: &TaskItem, author_label: &str) {
    let terminal_width = get_terminal_width();

    let id_str = short_id(task.id);
    let left_section = format!("  {}  {}", id_str.dimmed(), task.title.bold());
    let left_visible_len = 2 + id_str.len() + 2 + task.title.chars().count();

    let right_section = format!("{}  ·  {}", author_label, format_date(task.created_at));
    let right_visible_len = right_section.chars().count();

    let total_content = left_visible_len + right_visible_len;
    if total_content + 4 < terminal_width {
        let padding = terminal_width - total_content - 2;
        println!("{}{}{}", left_section, " ".repeat(padding), right_section.dimmed());
    } else {
        println!("{}", left_section);
    }
}

pub fn render_task_detail(store: &Store, task: &TaskItem) {
    println!("\n  {}  {}", short_id(task.id).dimmed(), task.title.bold());
    println!(
        "  {}  ·  {}  ·  {}",
        styled_status(task.status),
        store.author_label(&task.author_id).dimmed(),
        format_date(task.created_at).dimmed()
    );
    if let Some(description) = &task.description_markdown {
        println!();
        for line in description.lines() {
            println!("  {}", line);
        }
    }
}

/// Render a comment forest with two-space indentation per reply level
pub fn render_comment_tree(nodes: &[CommentNode]) {
    for node in nodes {
        render_comment_node(node, 0);
    }
}

fn render_comment_node(node: &CommentNode, depth: usize) {
    let indent = "  ".repeat(depth + 1);
    let edited = if node.comment.edited_at.is_some() {
        " (edited)".dimmed()
    } else {
        "".normal()
    };

    println!(
        "{}{}  {}  ·  {}{}",
        indent,
        short_id(node.comment.id).dimmed(),
        node.author_label.bold(),
        format_date(node.comment.created_at).dimmed(),
        edited
    );
    for line in node.comment.body_markdown.lines() {
        println!("{}  {}", indent, line);
    }
    println!();

    for child in &node.children {
        render_comment_node(child, depth + 1);
    }
}

pub fn render_attachment_line(store: &Store, attachment: &TaskAttachment) {
    println!(
        "  {}  {}  {}",
        short_id(attachment.id).dimmed(),
        attachment.file_name.bold(),
        format!(
            "{}  ·  {}  ·  {}",
            format_size(attachment.size_bytes),
            attachment.content_type,
            store.author_label(&attachment.uploader_id)
        )
        .dimmed()
    );
}

/// First uuid segment, enough to disambiguate interactively
pub fn short_id(id: uuid::Uuid) -> String {
    id.to_string().chars().take(8).collect()
}

/// Format a byte count for display (e.g., "512 B", "18.2 KB", "1.5 MB")
pub fn format_size(size_bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = 1024.0 * 1024.0;

    let size = size_bytes as f64;
    if size >= MB {
        format!("{:.1} MB", size / MB)
    } else if size >= KB {
        format!("{:.1} KB", size / KB)
    } else {
        format!("{} B", size_bytes)
    }
}

/// Format a timestamp for display (e.g., "Today", "Yesterday", "Feb 15")
pub fn format_date(timestamp: jiff::Timestamp) -> String {
    let zoned = jiff::Zoned::new(timestamp, jiff::tz::TimeZone::system());
    let date = zoned.date();
    let today = jiff::Zoned::now().date();

    if date == today {
        "Today".to_string()
    } else if Some(date) == today.yesterday().ok() {
        "Yesterday".to_string()
    } else if date.year() == today.year() {
        date.strftime("%b %d").to_string()
    } else {
        date.strftime("%b %d, %Y").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size_units() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn test_short_id_is_first_segment() {
        let id = uuid::Uuid::new_v4();
        let short = short_id(id);
        assert_eq!(short.len(), 8);
        assert!(id.to_string().starts_with(&short));
    }
}
