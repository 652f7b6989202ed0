//! Session blob naming.
//!
//! A blob lives under `temp_<phone>` while a login is in flight and is
//! published as `user_<owner>_<phone>` once the login is finalized.

/// Strip `+` and whitespace from a phone number.
pub fn normalize_phone(phone: &str) -> String {
    phone
        .chars()
        .filter(|c| *c != '+' && !c.is_whitespace())
        .collect()
}

/// Stored form of a phone number: `+` followed by its digits.
pub fn canonical_phone(phone: &str) -> String {
    format!("+{}", normalize_phone(phone))
}

/// Name of the blob used while a login for `phone` is in flight.
pub fn temp_session_name(phone: &str) -> String {
    format!("temp_{}", normalize_phone(phone))
}

/// Whether `name` is a login-in-flight blob rather than a published session.
pub fn is_temp_session_name(name: &str) -> bool {
    name.starts_with("temp_")
}

/// Owner-scoped name of a finalized session.
pub fn user_session_name(owner_id: &str, phone: &str) -> String {
    format!("user_{}_{}", owner_id, normalize_phone(phone))
}

/// Final name used when the caller does not supply one.
pub fn default_session_name(phone: &str) -> String {
    normalize_phone(phone)
}

/// Mask the middle of a phone number for log output.
pub fn mask_phone(phone: &str) -> String {
    let chars: Vec<char> = phone.chars().collect();
    let keep_head = if chars.first() == Some(&'+') { 2 } else { 1 };
    if chars.len() <= keep_head + 4 {
        return "*".repeat(chars.len());
    }
    let tail_start = chars.len() - 4;
    chars
        .iter()
        .enumerate()
        .map(|(i, c)| {
            if i < keep_head || i >= tail_start {
                *c
            } else {
                '*'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_phone() {
        assert_eq!(canonical_phone("1 000 000 0001"), "+10000000001");
        assert_eq!(canonical_phone("+10000000001"), "+10000000001");
    }

    #[test]
    fn test_normalize_strips_plus_and_spaces() {
        assert_eq!(normalize_phone("+1 000 000 0001"), "10000000001");
        assert_eq!(normalize_phone("10000000001"), "10000000001");
    }

    #[test]
    fn test_session_names() {
        assert_eq!(temp_session_name("+10000000001"), "temp_10000000001");
        assert_eq!(user_session_name("42", "+1 0000000001"), "user_42_10000000001");
        assert_eq!(default_session_name("+10000000001"), "10000000001");
        assert!(is_temp_session_name(&temp_session_name("+10000000001")));
        assert!(!is_temp_session_name("user_42_10000000001"));
    }

    #[test]
    fn test_mask_phone() {
        assert_eq!(mask_phone("+10000000001"), "+1******0001");
        assert_eq!(mask_phone("10000000001"), "1******0001");
        assert_eq!(mask_phone("+1234"), "*****");
    }
}
