use chrono::{DateTime, Utc};
use uuid::Uuid;

pub type Id = String;

pub type Timestamp = DateTime<Utc>;

pub fn generate_id() -> Id {
    Uuid::new_v4().to_string()
}

/// Lowercase, trimmed form used for every stored email address.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Minimal shape check: one `@`, non-empty local part, a dot in the domain.
pub fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };

    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.chars().any(char::is_whitespace)
}

/// Slugs are 3..=48 chars of `[a-z0-9-]`, not starting or ending with `-`.
pub fn is_valid_slug(slug: &str) -> bool {
    (3..=48).contains(&slug.len())
        && slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !slug.starts_with('-')
        && !slug.ends_with('-')
}

/// Derive a slug from a display name, e.g. "Acme Learning!" -> "acme-learning".
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_dash = true;

    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }

    while slug.ends_with('-') {
        slug.pop();
    }
    slug.truncate(48);
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

/// Slug for a name the caller gave no slug for. Names that reduce to fewer
/// than 3 slug characters ("Go", non-Latin scripts) get a short random
/// suffix, and `fallback` stands in when nothing is left at all.
pub fn derive_slug(name: &str, fallback: &str) -> String {
    let slug = slugify(name);
    if slug.len() >= 3 {
        return slug;
    }
    let stem = if slug.is_empty() { fallback } else { slug.as_str() };
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}", stem, &suffix[..6])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_validation() {
        assert!(is_valid_email("ada@example.com"));
        assert!(!is_valid_email("ada.example.com"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("ada@example"));
        assert!(!is_valid_email("ada@@example.com"));
        assert!(!is_valid_email("a da@example.com"));
        assert_eq!(normalize_email("  Ada@Example.COM "), "ada@example.com");
    }

    #[test]
    fn test_slugs() {
        assert_eq!(slugify("Acme Learning!"), "acme-learning");
        assert_eq!(slugify("  --Rust 101-- "), "rust-101");
        assert!(is_valid_slug("rust-101"));
        assert!(!is_valid_slug("ab"));
        assert!(!is_valid_slug("-abc"));
        assert!(!is_valid_slug("Abc"));
    }

    #[test]
    fn test_derived_slugs_for_short_names() {
        assert_eq!(derive_slug("Acme Learning", "org"), "acme-learning");

        let short = derive_slug("Go", "org");
        assert!(short.starts_with("go-"), "{}", short);
        assert!(is_valid_slug(&short));

        let empty = derive_slug("日本語学校", "org");
        assert!(empty.starts_with("org-"), "{}", empty);
        assert!(is_valid_slug(&empty));
    }
}
