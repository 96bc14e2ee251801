//! Subject and durable-name conventions.
//!
//! ```text
//! scheme.<form>          -> reply on scheme.<correlation_id>
//! scheme                 -> reply on scheme.<correlation_id>
//! data.<form>            -> reply on data.<correlation_id>
//! data.<form>.create     -> error reply on data.<form>.<correlation_id>
//! ```
//!
//! Durable names are part of the deployment contract: renaming one orphans
//! its delivery position on the broker.

/// Base subject for schema requests and replies.
pub const SCHEME_BASE: &str = "scheme";
/// Base subject for entity requests and replies.
pub const DATA_BASE: &str = "data";
/// Base subject for dead letters.
pub const DLQ_BASE: &str = "dlq";

/// Stream covering `scheme` and `scheme.>`.
pub const SCHEME_STREAM: &str = "form_scheme_stream";
/// Stream covering `data` and `data.>`.
pub const DATA_STREAM: &str = "form_data_stream";
/// Stream covering `dlq.>`.
pub const DEAD_LETTER_STREAM: &str = "form_dead_letter_stream";

/// Suffix of the create subject.
pub const CREATE_SUFFIX: &str = "create";

pub fn scheme() -> String {
    SCHEME_BASE.to_string()
}

pub fn scheme_by_name(form: &str) -> String {
    format!("{}.{}", SCHEME_BASE, form)
}

pub fn data_list(form: &str) -> String {
    format!("{}.{}", DATA_BASE, form)
}

pub fn data_create(form: &str) -> String {
    format!("{}.{}.{}", DATA_BASE, form, CREATE_SUFFIX)
}

pub fn scheme_reply(correlation_id: &str) -> String {
    format!("{}.{}", SCHEME_BASE, correlation_id)
}

pub fn data_reply(correlation_id: &str) -> String {
    format!("{}.{}", DATA_BASE, correlation_id)
}

/// Subject for error replies (validation, integrity, create faults).
pub fn error_reply(form: &str, correlation_id: &str) -> String {
    format!("{}.{}.{}", DATA_BASE, form, correlation_id)
}

pub fn dead_letter(original_subject: &str) -> String {
    format!("{}.{}", DLQ_BASE, original_subject)
}

/// Subjects bound to a stream rooted at `base`: the bare base and everything below it.
pub fn stream_subjects(base: &str) -> Vec<String> {
    vec![base.to_string(), format!("{}.>", base)]
}

pub fn durable_scheme_by_name(form: &str) -> String {
    format!("form_data_{}_s_scheme", form)
}

pub fn durable_scheme(form: &str) -> String {
    format!("form_data_{}_scheme", form)
}

pub fn durable_list(form: &str) -> String {
    format!("form_data_{}_all", form)
}

pub fn durable_create(form: &str) -> String {
    format!("form_data_{}_create", form)
}

/// Whether `token` can be used as a single subject segment.
///
/// Rejects empty strings, separators, wildcards and whitespace, any of which
/// would make the derived reply subject address something else.
pub fn is_valid_token(token: &str) -> bool {
    !token.is_empty()
        && !token
            .chars()
            .any(|c| c == '.' || c == '*' || c == '>' || c.is_whitespace())
}

/// Match a concrete subject against a pattern with NATS wildcards.
///
/// - `*` matches exactly one token
/// - `>` matches one or more trailing tokens
pub fn matches(subject: &str, pattern: &str) -> bool {
    let mut subject_tokens = subject.split('.');
    let mut pattern_tokens = pattern.split('.');

    loop {
        match (pattern_tokens.next(), subject_tokens.next()) {
            (Some(">"), Some(_)) => return true,
            (Some("*"), Some(_)) => continue,
            (Some(p), Some(s)) if p == s => continue,
            (None, None) => return true,
            _ => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_subjects() {
        assert_eq!(scheme(), "scheme");
        assert_eq!(scheme_by_name("prisons"), "scheme.prisons");
        assert_eq!(data_list("prisons"), "data.prisons");
        assert_eq!(data_create("prisons"), "data.prisons.create");
    }

    #[test]
    fn test_reply_subjects_end_with_correlation_id() {
        assert_eq!(scheme_reply("abc"), "scheme.abc");
        assert_eq!(data_reply("abc"), "data.abc");
        assert_eq!(error_reply("prisons", "abc"), "data.prisons.abc");
        assert!(error_reply("prisons", "abc").ends_with(".abc"));
    }

    #[test]
    fn test_durable_names_are_stable() {
        assert_eq!(durable_scheme_by_name("prisons"), "form_data_prisons_s_scheme");
        assert_eq!(durable_scheme("prisons"), "form_data_prisons_scheme");
        assert_eq!(durable_list("prisons"), "form_data_prisons_all");
        assert_eq!(durable_create("prisons"), "form_data_prisons_create");
    }

    #[test]
    fn test_matches_exact() {
        assert!(matches("scheme", "scheme"));
        assert!(!matches("scheme.prisons", "scheme"));
        assert!(!matches("scheme", "scheme.prisons"));
    }

    #[test]
    fn test_matches_single_token_wildcard() {
        assert!(matches("data.prisons", "data.*"));
        assert!(!matches("data.prisons.create", "data.*"));
        assert!(!matches("data", "data.*"));
    }

    #[test]
    fn test_matches_tail_wildcard() {
        assert!(matches("data.prisons", "data.>"));
        assert!(matches("data.prisons.create", "data.>"));
        assert!(!matches("data", "data.>"));
        assert!(!matches("scheme.prisons", "data.>"));
    }

    #[test]
    fn test_stream_subjects_cover_all_routes() {
        let subjects = stream_subjects(DATA_BASE);
        for subject in [
            data_list("prisons"),
            data_create("prisons"),
            data_reply("abc"),
            error_reply("prisons", "abc"),
        ] {
            assert!(
                subjects.iter().any(|p| matches(&subject, p)),
                "{} not covered",
                subject
            );
        }
        assert!(stream_subjects(SCHEME_BASE)
            .iter()
            .any(|p| matches("scheme", p)));
    }

    #[test]
    fn test_valid_token() {
        assert!(is_valid_token("abc"));
        assert!(is_valid_token("0b6b1c9e-2f7a-4a53-9d6c-3b1c4d8f2a11"));
        assert!(!is_valid_token(""));
        assert!(!is_valid_token("a.b"));
        assert!(!is_valid_token("a*"));
        assert!(!is_valid_token(">"));
        assert!(!is_valid_token("a b"));
    }
}
