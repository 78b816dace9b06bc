/// Render captured banner bytes as a single printable line.
///
/// Decodes as lossy UTF-8, escapes newline, carriage return and tab into their
/// two-character forms, trims surrounding spaces (only U+0020) and keeps at
/// most `cap` characters.
pub fn format_banner(bytes: &[u8], cap: usize) -> String {
    let text = String::from_utf8_lossy(bytes);
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            other => escaped.push(other),
        }
    }
    escaped.trim_matches(' ').chars().take(cap).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_control_whitespace() {
        assert_eq!(
            format_banner(b"SSH-2.0-OpenSSH_8.9\r\n", 512),
            "SSH-2.0-OpenSSH_8.9\\r\\n"
        );
        assert_eq!(format_banner(b"a\tb", 512), "a\\tb");
    }

    #[test]
    fn trims_spaces_only() {
        assert_eq!(format_banner(b"   login: ", 512), "login:");
        // Escaped tab survives the trim.
        assert_eq!(format_banner(b" \tx ", 512), "\\tx");
    }

    #[test]
    fn truncates_by_characters_after_escaping() {
        assert_eq!(format_banner(b"\n\n\n", 3), "\\n\\");
        assert_eq!(format_banner("héllo".as_bytes(), 2), "hé");
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        assert_eq!(format_banner(&[b'o', 0xFF, b'k'], 512), "o\u{FFFD}k");
    }

    #[test]
    fn deterministic() {
        let bytes = b"  220 mail.example.org ESMTP\r\n";
        assert_eq!(format_banner(bytes, 16), format_banner(bytes, 16));
    }

    #[test]
    fn empty_input() {
        assert_eq!(format_banner(b"", 512), "");
    }
}
