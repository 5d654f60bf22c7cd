/// Lowercase, strip punctuation, collapse whitespace — the normalization
/// every title comparison goes through before scoring.
pub fn normalize_title(name: &str) -> String {
    let lowered = name.to_lowercase();
    let stripped: String = lowered.chars().map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' }).collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Lowercased, punctuation-free token set, used for Jaccard comparisons.
pub fn tokenize(text: &str) -> std::collections::HashSet<String> {
    normalize_title(text).split(' ').filter(|t| !t.is_empty()).map(str::to_string).collect()
}

/// `true` when two names share at least one normalized token — the
/// candidate-set gate before any scoring happens.
pub fn has_token_overlap(a: &str, b: &str) -> bool {
    let tokens_a = tokenize(a);
    let tokens_b = tokenize(b);
    tokens_a.intersection(&tokens_b).next().is_some()
}

pub fn jaccard(a: &std::collections::HashSet<String>, b: &std::collections::HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count() as f64;
    let union = a.union(b).count() as f64;
    if union == 0.0 {
        0.0
    } else {
        intersection / union
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_punctuation_and_collapses_whitespace() {
        assert_eq!(normalize_title("A.  Smith,  Jr."), "a smith jr");
    }

    #[test]
    fn token_overlap_detects_shared_words() {
        assert!(has_token_overlap("Alice Smith", "A. Smith"));
        assert!(!has_token_overlap("Alice Smith", "Bob Jones"));
    }

    #[test]
    fn jaccard_of_identical_sets_is_one() {
        let a = tokenize("Alice Smith");
        assert_eq!(jaccard(&a, &a), 1.0);
    }
}
