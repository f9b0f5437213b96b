//! Topic-exchange routing key matching.
//!
//! Keys and patterns are dot-separated words. In a pattern `*` matches
//! exactly one word and `#` matches zero or more words.

pub fn topic_matches(pattern: &str, routing_key: &str) -> bool {
    let pattern: Vec<&str> = pattern.split('.').collect();
    let key: Vec<&str> = routing_key.split('.').collect();
    matches_words(&pattern, &key)
}

fn matches_words(pattern: &[&str], key: &[&str]) -> bool {
    match pattern.split_first() {
        None => key.is_empty(),
        Some((&"#", rest)) => (0..=key.len()).any(|skip| matches_words(rest, &key[skip..])),
        Some((&word, rest)) => match key.split_first() {
            Some((&head, tail)) => (word == "*" || word == head) && matches_words(rest, tail),
            None => false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_key_matches_itself_only() {
        assert!(topic_matches("loan.created", "loan.created"));
        assert!(!topic_matches("loan.created", "loan.updated"));
        assert!(!topic_matches("loan.created", "loan.created.extra"));
    }

    #[test]
    fn star_matches_one_word() {
        assert!(topic_matches("loan.*", "loan.deleted"));
        assert!(topic_matches("*.created", "member.created"));
        assert!(!topic_matches("loan.*", "loan"));
        assert!(!topic_matches("loan.*", "loan.a.b"));
    }

    #[test]
    fn hash_matches_any_number_of_words() {
        assert!(topic_matches("#", "book.updated"));
        assert!(topic_matches("book.#", "book"));
        assert!(topic_matches("book.#", "book.updated"));
        assert!(topic_matches("#.deleted", "return.deleted"));
        assert!(!topic_matches("#.deleted", "return.created"));
    }
}
