//! Post domain rules: draft validation and display helpers.

use uuid::Uuid;

use crate::domain::forms::FieldErrors;

/// Number of leading characters shown when a post stands in for itself in
/// compact listings (log lines, admin summaries).
pub const PREVIEW_CHARS: usize = 15;

/// Upper bound on post text length.
pub const MAX_TEXT_CHARS: usize = 10_000;

/// A validated post submission. `group_id` is verified against the store by
/// the publishing service; validation here only covers shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostDraft {
    pub text: String,
    pub group_id: Option<Uuid>,
}

pub fn validate_post_draft(text: &str, group_id: Option<Uuid>) -> Result<PostDraft, FieldErrors> {
    let mut errors = FieldErrors::new();
    let trimmed = text.trim();

    if trimmed.is_empty() {
        errors.push("text", "Post text must not be empty");
    } else if trimmed.chars().count() > MAX_TEXT_CHARS {
        errors.push(
            "text",
            format!("Post text exceeds {MAX_TEXT_CHARS} characters"),
        );
    }

    errors.into_result(PostDraft {
        text: trimmed.to_string(),
        group_id,
    })
}

/// First [`PREVIEW_CHARS`] characters of the text, character-aware so
/// multi-byte input never splits mid-glyph.
pub fn preview_text(text: &str) -> String {
    text.chars().take(PREVIEW_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draft_trims_and_accepts_plain_text() {
        let draft = validate_post_draft("  an ordinary post  ", None).expect("valid draft");
        assert_eq!(draft.text, "an ordinary post");
        assert_eq!(draft.group_id, None);
    }

    #[test]
    fn draft_rejects_empty_text() {
        let errors = validate_post_draft("   \n\t ", None).expect_err("empty text rejected");
        assert!(errors.for_field("text").is_some());
    }

    #[test]
    fn draft_rejects_oversized_text() {
        let text = "x".repeat(MAX_TEXT_CHARS + 1);
        let errors = validate_post_draft(&text, None).expect_err("oversized text rejected");
        assert!(errors.for_field("text").is_some());
    }

    #[test]
    fn preview_cuts_at_fifteen_characters() {
        assert_eq!(preview_text("a post that runs rather long"), "a post that run");
        assert_eq!(preview_text("short"), "short");
    }

    #[test]
    fn preview_respects_multibyte_boundaries() {
        let text = "写作是一种安静的练习，持续而缓慢";
        assert_eq!(preview_text(text).chars().count(), PREVIEW_CHARS);
    }
}
