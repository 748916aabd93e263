//! Domain-specific shared validations and formatting utilities

use crate::{errors::AppError, store::ObservationKind};

pub const DEFAULT_SEARCH_LIMIT: usize = 20;
pub const MAX_SEARCH_LIMIT: usize = 100;
pub const MAX_TITLE_CHARS: usize = 200;
pub const MAX_FILES: usize = 50;

pub fn normalize_session_id(session_id: &str) -> Result<String, AppError> {
    let normalized = session_id.trim();
    if normalized.is_empty()
        || !normalized.chars().all(|character| {
            character.is_ascii_alphanumeric()
                || character == '-'
                || character == '_'
                || character == '.'
                || character == ':'
        })
    {
        return Err(AppError::bad_request(
            "invalid_session_id",
            "session_id must contain only alphanumeric characters, dashes, underscores, dots, and :",
        ));
    }

    Ok(normalized.to_string())
}

pub fn normalize_kind(kind: &str) -> Result<ObservationKind, AppError> {
    kind.trim().to_ascii_lowercase().parse::<ObservationKind>().map_err(|()| {
        AppError::bad_request(
            "invalid_kind",
            "kind must be one of: decision, bugfix, feature, refactor, discovery, change",
        )
    })
}

pub fn normalize_title(title: &str) -> Result<String, AppError> {
    let normalized = title.trim();
    if normalized.is_empty() {
        return Err(AppError::bad_request("invalid_title", "title must not be empty"));
    }
    if normalized.chars().count() > MAX_TITLE_CHARS {
        return Err(AppError::bad_request(
            "invalid_title",
            "title must be at most 200 characters",
        ));
    }

    Ok(normalized.to_string())
}

pub fn normalize_content(content: &str) -> Result<String, AppError> {
    if content.trim().is_empty() {
        return Err(AppError::bad_request(
            "invalid_content",
            "content must not be empty",
        ));
    }

    Ok(content.to_string())
}

pub fn normalize_files(files: Option<Vec<String>>) -> Result<Vec<String>, AppError> {
    let files = files
        .unwrap_or_default()
        .into_iter()
        .map(|file| file.trim().to_string())
        .filter(|file| !file.is_empty())
        .collect::<Vec<_>>();

    if files.len() > MAX_FILES {
        return Err(AppError::bad_request(
            "invalid_files",
            "files must list at most 50 paths",
        ));
    }

    Ok(files)
}

pub fn normalize_query_text(text: Option<String>) -> Option<String> {
    text.map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub fn normalize_search_limit(limit: Option<u32>) -> Result<usize, AppError> {
    let Some(limit) = limit else {
        return Ok(DEFAULT_SEARCH_LIMIT);
    };

    let limit = limit as usize;
    if limit == 0 || limit > MAX_SEARCH_LIMIT {
        return Err(AppError::bad_request(
            "invalid_limit",
            "limit must be between 1 and 100",
        ));
    }

    Ok(limit)
}

/// Shortens `text` to `max_chars`, marking the cut with an ellipsis.
pub fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }

    let mut shortened = text.chars().take(max_chars).collect::<String>();
    shortened.push('…');
    shortened
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_session_id() {
        let session = normalize_session_id("  sess-2026.10:a_b ").expect("valid session");
        assert_eq!(session, "sess-2026.10:a_b");
    }

    #[test]
    fn rejects_session_id_with_disallowed_characters() {
        let error = normalize_session_id("sess/1").expect_err("expected invalid session");
        assert!(error.to_string().contains("bad request"));
    }

    #[test]
    fn normalizes_kind_case_insensitively() {
        assert_eq!(
            normalize_kind(" BugFix ").expect("valid kind"),
            ObservationKind::Bugfix
        );
        assert!(normalize_kind("chore").is_err());
    }

    #[test]
    fn rejects_overlong_title() {
        let title = "x".repeat(MAX_TITLE_CHARS + 1);
        let error = normalize_title(&title).expect_err("expected invalid title");
        assert!(error.to_string().contains("bad request"));
        assert!(normalize_title(&"x".repeat(MAX_TITLE_CHARS)).is_ok());
    }

    #[test]
    fn drops_blank_file_entries() {
        let files = normalize_files(Some(vec![
            " src/main.rs ".to_string(),
            "   ".to_string(),
        ]))
        .expect("valid files");
        assert_eq!(files, vec!["src/main.rs"]);
    }

    #[test]
    fn search_limit_bounds() {
        assert_eq!(normalize_search_limit(None).expect("default"), DEFAULT_SEARCH_LIMIT);
        assert_eq!(normalize_search_limit(Some(100)).expect("max"), 100);
        assert!(normalize_search_limit(Some(0)).is_err());
        assert!(normalize_search_limit(Some(101)).is_err());
    }

    #[test]
    fn preview_cuts_on_char_boundary() {
        assert_eq!(preview("héllo wörld", 5), "héllo…");
        assert_eq!(preview("short", 10), "short");
    }
}
