//! Syntax checks for identifiers that appear in record paths and schema
//! string formats.

/// Maximum length of a namespaced identifier.
pub const MAX_NSID_LEN: usize = 317;

/// Maximum length of a record key.
pub const MAX_RECORD_KEY_LEN: usize = 512;

/// Namespaced identifier: at least three dot-separated segments of ASCII
/// letters, digits and hyphens. The final segment (the name) may not contain
/// hyphens and may not start with a digit.
pub fn is_valid_nsid(s: &str) -> bool {
    if s.is_empty() || s.len() > MAX_NSID_LEN {
        return false;
    }
    let segments: Vec<&str> = s.split('.').collect();
    if segments.len() < 3 {
        return false;
    }
    let (name, authority) = match segments.split_last() {
        Some(parts) => parts,
        None => return false,
    };
    let authority_ok = authority.iter().all(|seg| {
        !seg.is_empty()
            && seg.len() <= 63
            && !seg.starts_with('-')
            && !seg.ends_with('-')
            && seg.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    });
    let name_ok = !name.is_empty()
        && name.len() <= 63
        && name.chars().all(|c| c.is_ascii_alphanumeric())
        && !name.starts_with(|c: char| c.is_ascii_digit());
    authority_ok && name_ok
}

/// Record key: 1-512 characters from `[A-Za-z0-9._:~-]`, excluding `.` and `..`.
pub fn is_valid_record_key(s: &str) -> bool {
    if s.is_empty() || s.len() > MAX_RECORD_KEY_LEN || s == "." || s == ".." {
        return false;
    }
    s.chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | ':' | '~' | '-'))
}

/// DID syntax: `did:<method>:<identifier>` with a lowercase method.
pub fn is_valid_did(s: &str) -> bool {
    let mut parts = s.splitn(3, ':');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("did"), Some(method), Some(id)) => {
            !method.is_empty()
                && method.chars().all(|c| c.is_ascii_lowercase())
                && !id.is_empty()
                && !id.ends_with(':')
                && id
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | ':' | '%' | '-'))
        }
        _ => false,
    }
}

/// Handle syntax: a DNS name with at least two labels and a non-numeric TLD.
pub fn is_valid_handle(s: &str) -> bool {
    if s.len() > 253 {
        return false;
    }
    let labels: Vec<&str> = s.split('.').collect();
    if labels.len() < 2 {
        return false;
    }
    let labels_ok = labels.iter().all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    });
    let tld_ok = labels
        .last()
        .map(|tld| tld.starts_with(|c: char| c.is_ascii_alphabetic()))
        .unwrap_or(false);
    labels_ok && tld_ok
}
