//! Text shaping helpers shared by the voice and SMS paths.

/// Truncate `text` so it fits in `max_chars`, ending on a complete sentence
/// where one exists, otherwise on a word boundary. Never cuts mid-word.
pub fn truncate_to_sentence(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max_chars {
        return text.to_string();
    }

    // Work on a char-boundary-safe prefix of max_chars characters.
    let prefix: String = text.chars().take(max_chars).collect();

    if let Some(end) = prefix.rfind(['.', '!', '?']) {
        let cut: String = prefix[..=end].to_string();
        let trimmed = cut.trim_end();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    if let Some(space) = prefix.rfind(char::is_whitespace) {
        let cut = prefix[..space].trim_end();
        if !cut.is_empty() {
            return cut.to_string();
        }
    }

    prefix
}

/// Mask a phone number for logging, keeping only the last four digits.
pub fn redact_phone(number: &str) -> String {
    let digits: Vec<char> = number.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() <= 4 {
        return "***".to_string();
    }
    let tail: String = digits[digits.len() - 4..].iter().collect();
    format!("***{}", tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_unchanged() {
        assert_eq!(truncate_to_sentence("Hello there.", 160), "Hello there.");
    }

    #[test]
    fn test_truncates_at_sentence_boundary() {
        let text = "First sentence. Second sentence that is quite a bit longer \
                    and keeps going on. Third sentence that definitely will not \
                    fit inside the budget we have here at all.";
        let out = truncate_to_sentence(text, 160);
        assert!(out.chars().count() <= 160);
        assert!(out.ends_with('.'));
        assert!(out.contains("Second sentence"));
        assert!(!out.contains("Third sentence"));
    }

    #[test]
    fn test_never_cuts_mid_word() {
        let text = "supercalifragilistic expialidocious and then some more words without punctuation at all in this run";
        let out = truncate_to_sentence(text, 40);
        assert!(out.chars().count() <= 40);
        // The cut must land on a word boundary of the original text.
        assert!(text.starts_with(&out));
        let rest = &text[out.len()..];
        assert!(rest.starts_with(' '), "cut mid-word: {:?}", out);
    }

    #[test]
    fn test_sms_budget() {
        let long: String = "This is a sentence. ".repeat(20);
        let out = truncate_to_sentence(&long, 160);
        assert!(out.chars().count() <= 160);
        assert!(out.ends_with('.'));
    }

    #[test]
    fn test_redact_phone() {
        assert_eq!(redact_phone("+14155550123"), "***0123");
        assert_eq!(redact_phone("123"), "***");
    }
}
