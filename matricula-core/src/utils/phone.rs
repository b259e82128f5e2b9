/// Normalize a payer phone number to its local 10-digit form.
///
/// The gateway reports Colombian numbers with the `57` country prefix glued
/// on (`"573001234567"`, sometimes with `+` or spaces); the school records
/// store the local number.
pub fn normalize_phone(raw: &str) -> String {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() > 10 && digits.starts_with("57") {
        digits[2..].to_string()
    } else {
        digits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_country_prefix() {
        assert_eq!(normalize_phone("573001234567"), "3001234567");
        assert_eq!(normalize_phone("+57 300 123 4567"), "3001234567");
    }

    #[test]
    fn keeps_local_numbers() {
        assert_eq!(normalize_phone("3001234567"), "3001234567");
        // A 10-digit number that happens to start with 57 is already local.
        assert_eq!(normalize_phone("5712345678"), "5712345678");
    }

    #[test]
    fn drops_formatting_noise() {
        assert_eq!(normalize_phone("(300) 123-4567"), "3001234567");
        assert_eq!(normalize_phone(""), "");
    }
}
