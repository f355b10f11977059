//! Query/document tokenizer shared by BM25 indexing and search.
//!
//! The normalizer must be byte-identical on both paths, so it lives in one
//! place and is a pure function: lowercase, split on non-alphanumerics,
//! drop stopwords and single characters.

/// English stopwords dropped from both documents and queries.
const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "from",
    "has", "have", "he", "her", "his", "i", "if", "in", "into", "is", "it",
    "its", "no", "not", "of", "on", "or", "our", "she", "so", "such", "that",
    "the", "their", "then", "there", "these", "they", "this", "to", "was",
    "we", "were", "what", "when", "where", "which", "who", "will", "with",
    "you", "your",
];

/// Tokenize text for lexical retrieval.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 1 && !STOPWORDS.contains(t))
        .map(|t| t.to_string())
        .collect()
}
