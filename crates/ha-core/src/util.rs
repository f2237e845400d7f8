//! Small string helpers

/// Turn a display name into an identifier-safe slug
///
/// Lowercases ASCII letters, keeps digits, and collapses every other run of
/// characters into a single `_`. Leading and trailing separators are dropped,
/// so the result is always a valid entity `object_id` (or empty).
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_sep = false;

    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_sep && !slug.is_empty() {
                slug.push('_');
            }
            pending_sep = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_sep = true;
        }
    }

    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify_spaces() {
        assert_eq!(slugify("Main Door"), "main_door");
    }

    #[test]
    fn test_slugify_collapses_separators() {
        assert_eq!(slugify("  Garage -- North  "), "garage_north");
    }

    #[test]
    fn test_slugify_digits() {
        assert_eq!(slugify("Door 2"), "door_2");
    }

    #[test]
    fn test_slugify_empty() {
        assert_eq!(slugify("!!!"), "");
    }
}
