//! Username equivalence
//!
//! The remote reports identities as `group:user` while configuration may
//! name them either way, and it compares usernames case-insensitively.

/// Separator between the group prefix and the user part
pub const SEPARATOR: char = ':';

/// Whether two usernames denote the same account.
///
/// Equal ignoring case, or one is the other preceded by `<prefix>:`.
pub fn equivalent(a: &str, b: &str) -> bool {
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    a == b || is_prefixed_form(&a, &b) || is_prefixed_form(&b, &a)
}

fn is_prefixed_form(long: &str, short: &str) -> bool {
    !short.is_empty()
        && long
            .strip_suffix(short)
            .is_some_and(|prefix| prefix.ends_with(SEPARATOR))
}
