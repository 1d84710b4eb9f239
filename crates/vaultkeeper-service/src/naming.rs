//! Stored-name generation shared by uploads and restores.

use chrono::Utc;
use rand::Rng;

/// Characters used for the random token in stored names.
const TOKEN_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Length of the random token.
const TOKEN_LEN: usize = 8;

/// Build a collision-resistant stored name:
/// `<prefix>-<owner>-<yyyymmddHHMMSSmmm>-<token>.<ext>`.
pub fn stored_name(prefix: &str, owner_id: &str, original_name: &str) -> String {
    let stamp = Utc::now().format("%Y%m%d%H%M%S%3f");
    let owner = sanitize_component(owner_id);
    let token = random_token();
    match extension(original_name) {
        Some(ext) => format!("{prefix}-{owner}-{stamp}-{token}.{ext}"),
        None => format!("{prefix}-{owner}-{stamp}-{token}"),
    }
}

/// Lowercase alphanumeric random token.
pub fn random_token() -> String {
    let mut rng = rand::thread_rng();
    (0..TOKEN_LEN)
        .map(|_| TOKEN_ALPHABET[rng.gen_range(0..TOKEN_ALPHABET.len())] as char)
        .collect()
}

/// Replace everything except ASCII alphanumerics, `.`, `-`, `_` and `@`
/// with `_`, so the value is safe as a single path component.
pub fn sanitize_component(value: &str) -> String {
    let cleaned: String = value
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '@') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = cleaned.trim_matches('.');
    if trimmed.is_empty() {
        "_".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Lowercased extension of a file name, if it has a sane one.
pub fn extension(name: &str) -> Option<String> {
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() || ext.len() > 10 {
        return None;
    }
    if !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stored_name_layout() {
        let name = stored_name("cv", "42", "My CV.PDF");
        assert!(name.starts_with("cv-42-"));
        assert!(name.ends_with(".pdf"));

        let parts: Vec<&str> = name.trim_end_matches(".pdf").split('-').collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[2].len(), 17);
        assert_eq!(parts[3].len(), TOKEN_LEN);
    }

    #[test]
    fn test_stored_names_do_not_collide() {
        let a = stored_name("cv", "42", "a.pdf");
        let b = stored_name("cv", "42", "a.pdf");
        assert_ne!(a, b);
    }

    #[test]
    fn test_sanitize_component() {
        assert_eq!(sanitize_component("a@x.com"), "a@x.com");
        assert_eq!(sanitize_component("../../etc/passwd"), "_.._etc_passwd");
        assert_eq!(sanitize_component(".."), "_");
        assert_eq!(sanitize_component("jane doe/cv"), "jane_doe_cv");
    }

    #[test]
    fn test_extension() {
        assert_eq!(extension("a.PDF").as_deref(), Some("pdf"));
        assert_eq!(extension("archive"), None);
        assert_eq!(extension(".bashrc"), None);
    }
}
