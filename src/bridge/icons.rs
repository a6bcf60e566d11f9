//! Toolbar icon selection.

use crate::config::IconOverride;

use super::protocol::IconPaths;

/// Pixel sizes tried, in order, when no platform override applies.
pub const PREFERRED_SIZES: [&str; 3] = ["16", "19", "32"];

/// Pick the resource to show for a `setIcon` request.
///
/// Platform overrides win when their size is offered at all, then the
/// preferred sizes, then whatever entry came first.
pub fn select_icon(paths: &IconPaths, overrides: &[IconOverride]) -> Option<String> {
    if let Some(hit) = overrides.iter().find(|o| paths.get(&o.size).is_some()) {
        return Some(hit.resource.clone());
    }

    PREFERRED_SIZES
        .iter()
        .find_map(|size| paths.get(size))
        .or_else(|| paths.first())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn over(size: &str, resource: &str) -> IconOverride {
        IconOverride {
            size: size.to_string(),
            resource: resource.to_string(),
        }
    }

    #[test]
    fn test_preferred_size_wins() {
        let paths = IconPaths::new([("16", "a.png"), ("32", "b.png")]);
        assert_eq!(select_icon(&paths, &[]).as_deref(), Some("a.png"));

        let paths = IconPaths::new([("32", "b.png"), ("19", "c.png")]);
        assert_eq!(select_icon(&paths, &[]).as_deref(), Some("c.png"));
    }

    #[test]
    fn test_falls_back_to_first_entry() {
        let paths = IconPaths::new([("40", "c.png")]);
        assert_eq!(select_icon(&paths, &[]).as_deref(), Some("c.png"));
    }

    #[test]
    fn test_override_matches_any_offered_size() {
        let paths = IconPaths::new([("16", "a.png"), ("38", "big.png")]);
        let overrides = [over("38", "toolbar@2x.pdf")];
        assert_eq!(
            select_icon(&paths, &overrides).as_deref(),
            Some("toolbar@2x.pdf")
        );
    }

    #[test]
    fn test_override_order_is_respected() {
        let paths = IconPaths::new([("16", "a.png"), ("32", "b.png")]);
        let overrides = [over("64", "never.pdf"), over("32", "second.pdf"), over("16", "third.pdf")];
        assert_eq!(select_icon(&paths, &overrides).as_deref(), Some("second.pdf"));
    }

    #[test]
    fn test_empty_map() {
        assert_eq!(select_icon(&IconPaths::default(), &[over("16", "x")]), None);
    }
}
