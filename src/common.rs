use itertools::Itertools;

pub fn eq_ignore_case(a: &str, b: &str) -> bool {
    a.chars()
        .map(std::primitive::char::to_lowercase)
        .flatten()
        .eq(b.chars().map(std::primitive::char::to_lowercase).flatten())
}

/// Space separated uppercase hex, e.g. `CA FE 00`.
pub fn hex_bytes(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02X}", b)).join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn helpers() {
        assert!(eq_ignore_case("CWS", "cws"));
        assert!(!eq_ignore_case("cws", "cwx"));
        assert_eq!(hex_bytes(&[0xCA, 0xFE, 0x00]), "CA FE 00");
        assert_eq!(hex_bytes(&[]), "");
    }
}
