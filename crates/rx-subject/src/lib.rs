//! NATS-style subject validation and matching.
//!
//! Grammar: `subject := token ('.' token)* ('.>')? | '>'`,
//! `token := [A-Za-z0-9_*~-]+`. `$` and whitespace are forbidden anywhere;
//! the empty string is invalid; reserved lifecycle names are invalid.
//!
//! Two grammars are distinguished rather than conflated: a subscription may
//! carry `*` / `>` wildcards, but a publish target must be concrete. This
//! crate separates "can this be subscribed to" from "can this be published
//! to" instead of validating every topic against one grammar.

fn is_token_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '*' || c == '~' || c == '-'
}

fn validate_grammar(topic: &str) -> bool {
    if topic.is_empty() {
        return false;
    }
    if topic.contains('$') || topic.chars().any(char::is_whitespace) {
        return false;
    }

    let tokens: Vec<&str> = topic.split('.').collect();
    let last = tokens.len() - 1;
    for (i, tok) in tokens.iter().enumerate() {
        if *tok == ">" {
            if i != last {
                return false;
            }
            continue;
        }
        if tok.is_empty() || !tok.chars().all(is_token_char) {
            return false;
        }
    }
    true
}

/// Permits `*` and `>` wildcards; rejects reserved lifecycle names.
pub fn is_valid_for_subscription(topic: &str) -> bool {
    !rx_domain::is_reserved_lifecycle_name(topic) && validate_grammar(topic)
}

/// As [`is_valid_for_subscription`], but rejects any token equal to `*` or
/// `>` — a publish target must name a concrete subject.
pub fn is_valid_for_publish(topic: &str) -> bool {
    if !is_valid_for_subscription(topic) {
        return false;
    }
    !topic.split('.').any(|tok| tok == "*" || tok == ">")
}

/// Whether some concrete subject is matched by both `a` and `b`.
///
/// Walks both token sequences in lockstep: identical literal tokens match;
/// `*` on either side consumes exactly one token on the other; `>` on
/// either side (must be the final token of its pattern) consumes one or
/// more trailing tokens on the other, with backtracking over the `>`
/// position so a later mismatch can retry with a longer or shorter span.
pub fn matches(pattern_a: &str, pattern_b: &str) -> bool {
    let a: Vec<&str> = pattern_a.split('.').collect();
    let b: Vec<&str> = pattern_b.split('.').collect();

    let (mut i, mut j) = (0usize, 0usize);
    // Resume index into `b`/`a` for backtracking past a `>` in `a`/`b`.
    let mut resume_in_b: Option<usize> = None;
    let mut resume_in_a: Option<usize> = None;

    loop {
        if i >= a.len() && j >= b.len() {
            return true;
        }

        let tok_a = a.get(i).copied();
        let tok_b = b.get(j).copied();

        let single_wildcard =
            (tok_a == Some("*") && j < b.len()) || (tok_b == Some("*") && i < a.len());

        if (tok_a.is_some() && tok_a == tok_b) || single_wildcard {
            i += 1;
            j += 1;
            continue;
        }

        if tok_a == Some(">") {
            if i != a.len() - 1 || j >= b.len() {
                return false;
            }
            resume_in_b = Some(j + 1);
            i += 1;
            j += 1;
            continue;
        }

        if tok_b == Some(">") {
            if j != b.len() - 1 || i >= a.len() {
                return false;
            }
            resume_in_a = Some(i + 1);
            j += 1;
            i += 1;
            continue;
        }

        if let Some(resume) = resume_in_b {
            j = resume;
            resume_in_b = Some(resume + 1);
            continue;
        }

        if let Some(resume) = resume_in_a {
            i = resume;
            resume_in_a = Some(resume + 1);
            continue;
        }

        return false;
    }
}

/// `"{hash}.{topic}"` — the concrete on-wire subject for a logical topic.
pub fn wire_topic(hash: &str, topic: &str) -> String {
    format!("{hash}.{topic}")
}

/// `"{wire_topic}_presence"` — the companion presence subject included in
/// every stream's subject set alongside a registered topic.
pub fn presence_variant(wire_topic: &str) -> String {
    format!("{wire_topic}_presence")
}

/// Strips the `"{hash}."` prefix from a wire subject, recovering the
/// logical topic the application registered. Returns the input unchanged
/// if the prefix is absent.
pub fn strip_hash<'a>(wire_topic: &'a str, hash: &str) -> &'a str {
    let prefix = format!("{hash}.");
    wire_topic.strip_prefix(prefix.as_str()).unwrap_or(wire_topic)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_whitespace_dollar_and_reserved() {
        assert!(!is_valid_for_subscription(""));
        assert!(!is_valid_for_subscription("a b"));
        assert!(!is_valid_for_subscription("a.$b"));
        assert!(!is_valid_for_subscription("CONNECTED"));
        assert!(!is_valid_for_subscription("RECONNECT"));
    }

    #[test]
    fn greater_than_alone_or_trailing_is_accepted_for_subscription() {
        assert!(is_valid_for_subscription(">"));
        assert!(is_valid_for_subscription("hello.>"));
        assert!(!is_valid_for_subscription("hello.>.world"));
    }

    #[test]
    fn publish_rejects_wildcards() {
        assert!(!is_valid_for_publish(">"));
        assert!(!is_valid_for_publish("hello.>"));
        assert!(!is_valid_for_publish("hello.*"));
        assert!(is_valid_for_publish("hello.world"));
    }

    #[test]
    fn matcher_routes_wildcard_subscriptions() {
        // Scenario: on("hello.>", h1) and on("hello.*", h2); a message on
        // "hello.world" triggers both, a message on "hello.a.b" only h1.
        assert!(matches("hello.>", "hello.world"));
        assert!(matches("hello.*", "hello.world"));
        assert!(matches("hello.>", "hello.a.b"));
        assert!(!matches("hello.*", "hello.a.b"));
    }

    #[test]
    fn matcher_is_symmetric_in_practice() {
        assert!(matches("a.*.c", "a.b.c"));
        assert!(matches("a.b.c", "a.*.c"));
        assert_eq!(matches("a.b", "a.b.c"), matches("a.b.c", "a.b"));
    }

    #[test]
    fn matcher_rejects_length_mismatch_without_wildcard() {
        assert!(!matches("a.b", "a.b.c"));
        assert!(!matches("a.b.c", "a.b"));
    }

    #[test]
    fn wire_topic_round_trips_through_strip_hash() {
        let hash = "h123";
        for topic in ["orders", "a.b.c", "q.>"] {
            let wire = wire_topic(hash, topic);
            assert_eq!(strip_hash(&wire, hash), topic);
        }
    }
}
