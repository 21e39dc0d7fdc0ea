//! Masking of sensitive words in error text before it reaches the logs.

use std::fmt::Display;

const SENSITIVE: [&str; 6] = ["sql", "database", "token", "password", "secret", "key"];
const MASK: &str = "[REDACTED]";

/// Replace every case-insensitive occurrence of a sensitive word with
/// `[REDACTED]`.
pub fn redact(text: &str) -> String {
    let lower = text.to_ascii_lowercase();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;

    while i < text.len() {
        let hit = SENSITIVE
            .iter()
            .find(|word| lower[i..].starts_with(*word));
        match hit {
            Some(word) => {
                out.push_str(MASK);
                i += word.len();
            }
            None => {
                // Advance one whole char; ASCII lowering keeps byte offsets aligned.
                let ch = text[i..].chars().next().unwrap_or_default();
                out.push(ch);
                i += ch.len_utf8().max(1);
            }
        }
    }
    out
}

/// Log `err` at error level with its text redacted.
pub fn log_error(err: &dyn Display, message: &str) {
    tracing::error!(sanitized_error = %redact(&err.to_string()), "{}", message);
}
