use crate::models::AnchorOptions;
use crate::ranking::tokenize;

/// Display snippet for the top-ranked chunk: leading characters of the
/// trimmed text.
pub fn snippet(text: &str, max_chars: usize) -> String {
    text.trim().chars().take(max_chars).collect()
}

/// Distinctive trigram anchors from the top-ranked chunk, for client-side
/// fuzzy location of the answer's origin when exact snippet matching fails
/// (ligatures, hyphenation, rendering differences). Tokens shorter than
/// `min_token_chars` are dropped; windows of `window` consecutive tokens are
/// collected in order of first appearance, deduplicated, capped at
/// `max_anchors`.
pub fn anchors(text: &str, options: &AnchorOptions) -> Vec<String> {
    let tokens: Vec<String> = tokenize(text)
        .into_iter()
        .filter(|token| token.chars().count() >= options.min_token_chars)
        .collect();

    let mut collected = Vec::new();
    if options.window == 0 || tokens.len() < options.window {
        return collected;
    }

    for window in tokens.windows(options.window) {
        let anchor = window.join(" ");
        if !collected.contains(&anchor) {
            collected.push(anchor);
        }
        if collected.len() >= options.max_anchors {
            break;
        }
    }

    collected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snippet_is_trimmed_and_capped() {
        let text = format!("  {}  ", "x".repeat(300));
        let result = snippet(&text, 220);
        assert_eq!(result.chars().count(), 220);
        assert!(!result.starts_with(' '));
    }

    #[test]
    fn short_text_snippet_is_untouched() {
        assert_eq!(snippet(" short passage ", 220), "short passage");
    }

    #[test]
    fn anchors_are_bounded_trigrams_of_long_tokens() {
        let text = "The quick brown fox jumps over the lazy dog while the quick brown fox watches again carefully";
        let options = AnchorOptions::default();
        let result = anchors(text, &options);

        assert!(result.len() <= options.max_anchors);
        for anchor in &result {
            let words: Vec<&str> = anchor.split(' ').collect();
            assert_eq!(words.len(), 3);
            for word in words {
                assert!(word.chars().count() >= options.min_token_chars);
            }
        }
    }

    #[test]
    fn anchors_keep_first_appearance_order_and_dedupe() {
        let text = "alpha beta gamma alpha beta gamma delta";
        let result = anchors(text, &AnchorOptions::default());

        assert_eq!(result[0], "alpha beta gamma");
        let unique: std::collections::HashSet<&String> = result.iter().collect();
        assert_eq!(unique.len(), result.len());
    }

    #[test]
    fn too_few_long_tokens_yield_no_anchors() {
        assert!(anchors("a an of it", &AnchorOptions::default()).is_empty());
        assert!(anchors("only two tokens", &AnchorOptions::default()).len() <= 1);
    }
}
