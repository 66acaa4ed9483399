/// Parse a boolean flag from a string value, or return the given default value otherwise.
pub fn parse_boolean_flag(value: Option<String>, default: bool) -> bool {
    let value = match value {
        Some(v) => v,
        None => return default,
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

/// Normalize an Uzbek phone number into the bare `998XXXXXXXXX` form the SMS provider expects.
///
/// Accepts `+998 90 123 45 67`, `0901234567`, `901234567` and similar spellings. Numbers that
/// don't look Uzbek are returned with the non-digits stripped, and the provider gets to reject
/// them.
pub fn normalize_uz_phone(phone: &str) -> String {
    let cleaned: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
    if cleaned.starts_with("998") && cleaned.len() == 12 {
        return cleaned;
    }
    if cleaned.starts_with('0') && cleaned.len() == 10 {
        return format!("998{}", &cleaned[1..]);
    }
    if cleaned.starts_with('9') && cleaned.len() == 9 {
        return format!("998{cleaned}");
    }
    cleaned
}

#[cfg(test)]
mod test {
    use super::{normalize_uz_phone, parse_boolean_flag};

    #[test]
    fn boolean_flags() {
        assert!(parse_boolean_flag(Some("1".into()), false));
        assert!(parse_boolean_flag(Some(" TRUE ".into()), false));
        assert!(!parse_boolean_flag(Some("off".into()), true));
        assert!(parse_boolean_flag(None, true));
        assert!(parse_boolean_flag(Some("banana".into()), true));
    }

    #[test]
    fn phone_normalization() {
        assert_eq!(normalize_uz_phone("+998901234567"), "998901234567");
        assert_eq!(normalize_uz_phone("998 90 123 45 67"), "998901234567");
        assert_eq!(normalize_uz_phone("0901234567"), "998901234567");
        assert_eq!(normalize_uz_phone("901234567"), "998901234567");
        assert_eq!(normalize_uz_phone("+1-555-0100"), "15550100");
    }
}
