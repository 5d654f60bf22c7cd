/// Validates the remote store's page/database id shape: a dashed UUID
/// (`^[0-9a-f]{8}-([0-9a-f]{4}-){3}[0-9a-f]{12}$`) or the dashless 32-hex
/// equivalent. Written by hand rather than with a regex engine — the
/// grammar is small and fixed.
pub fn is_well_formed_page_id(id: &str) -> bool {
    let hex_only: String = id.chars().filter(|c| *c != '-').collect();
    if hex_only.len() != 32 || !hex_only.chars().all(|c| c.is_ascii_hexdigit()) {
        return false;
    }

    if !id.contains('-') {
        return true;
    }

    let groups: Vec<&str> = id.split('-').collect();
    let expected_lengths = [8, 4, 4, 4, 12];
    groups.len() == expected_lengths.len()
        && groups
            .iter()
            .zip(expected_lengths)
            .all(|(group, expected)| group.len() == expected && group.chars().all(|c| c.is_ascii_hexdigit()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_dashed_and_dashless_forms() {
        assert!(is_well_formed_page_id("550e8400-e29b-41d4-a716-446655440000"));
        assert!(is_well_formed_page_id("550e8400e29b41d4a716446655440000"));
    }

    #[test]
    fn rejects_malformed_ids() {
        assert!(!is_well_formed_page_id("not-a-page-id"));
        assert!(!is_well_formed_page_id("550e8400-e29b-41d4-a716"));
        assert!(!is_well_formed_page_id(""));
    }
}
