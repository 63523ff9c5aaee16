//! URL slug generation shared by courses, programs, plans and posts

/// Lowercase, ASCII alphanumerics kept, everything else collapsed into
/// single hyphens with none at either end. Non-ASCII letters are kept.
pub fn generate_slug(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_hyphen = false;

    for c in title.trim().to_lowercase().chars() {
        if c.is_ascii_alphanumeric() || (!c.is_ascii() && c.is_alphanumeric()) {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c);
        } else {
            pending_hyphen = true;
        }
    }

    slug
}

/// Slug from an explicit value when given, otherwise from the title.
///
/// Returns `None` when neither produces anything usable.
pub fn resolve_slug(explicit: Option<&str>, title: &str) -> Option<String> {
    let slug = match explicit {
        Some(s) if !s.trim().is_empty() => generate_slug(s),
        _ => generate_slug(title),
    };
    (!slug.is_empty()).then_some(slug)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_slug() {
        assert_eq!(generate_slug("Intro to Rust"), "intro-to-rust");
        assert_eq!(generate_slug("  Startups: Zero -> One!  "), "startups-zero-one");
        assert_eq!(generate_slug("C++ & Systems"), "c-systems");
        assert_eq!(generate_slug("___"), "");
    }

    #[test]
    fn test_keeps_non_ascii_letters() {
        assert_eq!(generate_slug("Café Course"), "café-course");
    }

    #[test]
    fn test_resolve_slug() {
        assert_eq!(resolve_slug(Some("Custom Slug"), "Title"), Some("custom-slug".into()));
        assert_eq!(resolve_slug(Some("  "), "Title Here"), Some("title-here".into()));
        assert_eq!(resolve_slug(None, "!!!"), None);
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(20))]

            #[test]
            fn slug_has_no_edge_or_double_hyphens(title in "[ -~]{0,40}") {
                let slug = generate_slug(&title);
                prop_assert!(!slug.starts_with('-'));
                prop_assert!(!slug.ends_with('-'));
                prop_assert!(!slug.contains("--"));
                prop_assert!(slug.chars().all(|c| c == '-' || c.is_ascii_lowercase() || c.is_ascii_digit()));
            }
        }
    }
}
