//! Structural check for replies that should be a single table row.

/// Whether `reply` reads as comma-separated row data rather than prose:
/// non-empty, quotes balanced, no embedded NUL.
pub fn looks_like_row(reply: &str) -> bool {
    let trimmed = reply.trim();
    if trimmed.is_empty() || trimmed.contains('\0') {
        return false;
    }
    trimmed.matches('"').count() % 2 == 0
}

/// Instruction resent when a reply fails [`looks_like_row`].
pub fn no_explanation_prompt(input: &str) -> String {
    format!(
        "Do not include any explanation in your reply, please redo the \n\t\t{}.",
        input
    )
}

/// The text submitted for one input row.
pub fn compose_prompt(template: &str, input: &str) -> String {
    format!("{}\n\t\t{}", template, input)
}
