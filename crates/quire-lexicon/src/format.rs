//! String format checks.

use chrono::{DateTime, NaiveDateTime};
use quire_types::syntax::{is_valid_did, is_valid_handle, is_valid_nsid, is_valid_record_key};
use quire_types::Tid;

use crate::schema::StringFormat;

pub(crate) fn check(format: StringFormat, value: &str, lenient_datetime: bool) -> bool {
    match format {
        StringFormat::Datetime => is_datetime(value, lenient_datetime),
        StringFormat::Did => is_valid_did(value),
        StringFormat::Handle => is_valid_handle(value),
        StringFormat::Nsid => is_valid_nsid(value),
        StringFormat::Uri => is_uri(value),
        StringFormat::AtUri => is_at_uri(value),
        StringFormat::Language => is_language(value),
        StringFormat::Tid => Tid::parse(value).is_ok(),
        StringFormat::RecordKey => is_valid_record_key(value),
        StringFormat::AtIdentifier => is_valid_did(value) || is_valid_handle(value),
        StringFormat::Cid => is_cid(value),
    }
}

/// RFC 3339 timestamp. Lenient mode also takes timestamps with no offset.
fn is_datetime(value: &str, lenient: bool) -> bool {
    if DateTime::parse_from_rfc3339(value).is_ok() {
        return true;
    }
    lenient && NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
}

/// Generic URI: a scheme followed by a non-empty, whitespace-free remainder.
fn is_uri(value: &str) -> bool {
    let Some((scheme, rest)) = value.split_once(':') else {
        return false;
    };
    let scheme_ok = scheme.starts_with(|c: char| c.is_ascii_alphabetic())
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '.' | '-'));
    scheme_ok && !rest.is_empty() && !value.chars().any(char::is_whitespace) && value.len() <= 8192
}

/// `at://<did|handle>[/<collection>[/<rkey>]]`
fn is_at_uri(value: &str) -> bool {
    let Some(rest) = value.strip_prefix("at://") else {
        return false;
    };
    let mut parts = rest.splitn(3, '/');
    let authority = parts.next().unwrap_or_default();
    if !(is_valid_did(authority) || is_valid_handle(authority)) {
        return false;
    }
    match (parts.next(), parts.next()) {
        (None, _) => true,
        (Some(collection), None) => is_valid_nsid(collection),
        (Some(collection), Some(rkey)) => is_valid_nsid(collection) && is_valid_record_key(rkey),
    }
}

/// BCP 47 tag shape: a 2-3 letter primary subtag (or `i`/`x`) then
/// alphanumeric subtags of up to eight characters.
fn is_language(value: &str) -> bool {
    let mut subtags = value.split('-');
    let primary = subtags.next().unwrap_or_default();
    let primary_ok = matches!(primary, "i" | "x")
        || ((2..=3).contains(&primary.len()) && primary.chars().all(|c| c.is_ascii_alphabetic()));
    primary_ok
        && subtags.all(|s| (1..=8).contains(&s.len()) && s.chars().all(|c| c.is_ascii_alphanumeric()))
}

/// Content identifier: a multibase string or a hex block address.
fn is_cid(value: &str) -> bool {
    (8..=256).contains(&value.len()) && value.chars().all(|c| c.is_ascii_alphanumeric())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn datetimes() {
        assert!(check(StringFormat::Datetime, "2024-01-15T10:30:00Z", false));
        assert!(check(StringFormat::Datetime, "2024-01-15T10:30:00.123+02:00", false));
        assert!(!check(StringFormat::Datetime, "2024-01-01T00:00:00", false));
        assert!(check(StringFormat::Datetime, "2024-01-01T00:00:00", true));
        assert!(!check(StringFormat::Datetime, "yesterday", true));
    }

    #[test]
    fn uris() {
        assert!(check(StringFormat::Uri, "https://example.com/a?b=c", false));
        assert!(!check(StringFormat::Uri, "no scheme", false));
        assert!(check(StringFormat::AtUri, "at://did:plc:abc/social.coves.post.record/3jzfcijpj2z2a", false));
        assert!(check(StringFormat::AtUri, "at://alice.example.com", false));
        assert!(!check(StringFormat::AtUri, "at://did:plc:abc/not a collection", false));
        assert!(!check(StringFormat::AtUri, "https://example.com", false));
    }

    #[test]
    fn identifiers() {
        assert!(check(StringFormat::AtIdentifier, "did:plc:abc", false));
        assert!(check(StringFormat::AtIdentifier, "alice.example.com", false));
        assert!(!check(StringFormat::AtIdentifier, "alice", false));
        assert!(check(StringFormat::Language, "en", false));
        assert!(check(StringFormat::Language, "pt-BR", false));
        assert!(!check(StringFormat::Language, "english-", false));
        assert!(check(StringFormat::Tid, "3jzfcijpj2z2a", false));
        assert!(!check(StringFormat::Tid, "not-a-tid", false));
        assert!(check(StringFormat::Cid, "bafyreihyrpefhacm6kkp4ql6j6udakdit7g3dmkzfriqfykhjw6cad5lrm", false));
    }
}
