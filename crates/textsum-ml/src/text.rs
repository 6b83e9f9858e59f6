//! Word splitting for ROUGE.

/// Lowercased alphanumeric words.
pub fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Consecutive `n`-word windows.
pub fn ngrams(words: &[String], n: usize) -> Vec<&[String]> {
    if n == 0 || words.len() < n {
        return Vec::new();
    }
    words.windows(n).collect()
}
