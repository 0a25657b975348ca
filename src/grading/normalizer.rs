const QUOTES: [char; 2] = ['"', '\''];

/// Cleans quoting noise the model tends to wrap answers in.
///
/// Backslash-escaped quotes are dropped first, then surrounding quote pairs are
/// peeled off one layer at a time. The order matters for idempotence: removing
/// an escape can expose a new outer pair, while peeling a pair cannot create a
/// new escape.
pub(crate) fn normalize(value: &str) -> String {
    let mut text = value.to_string();

    while text.contains("\\\"") || text.contains("\\'") {
        text = text.replace("\\\"", "").replace("\\'", "");
    }

    let mut text = text.trim();
    loop {
        let mut chars = text.chars();
        let (Some(first), Some(last)) = (chars.next(), chars.next_back()) else {
            break;
        };
        if first != last || !QUOTES.contains(&first) {
            break;
        }
        text = text[first.len_utf8()..text.len() - last.len_utf8()].trim();
    }

    text.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_nested_quote_pairs() {
        assert_eq!(normalize("  \"'Принтер'\"  "), "Принтер");
        assert_eq!(normalize("'\" 42 \"'"), "42");
    }

    #[test]
    fn keeps_unbalanced_quotes() {
        assert_eq!(normalize("\"abc"), "\"abc");
        assert_eq!(normalize("'"), "'");
        assert_eq!(normalize("\"x'"), "\"x'");
    }

    #[test]
    fn removes_escaped_quotes_anywhere() {
        assert_eq!(normalize("a\\\"b\\'c"), "abc");
        assert_eq!(normalize("\"\\\"ответ\\\"\""), "ответ");
    }

    #[test]
    fn is_idempotent() {
        let samples = [
            "",
            "  ",
            "\"",
            "''",
            "\\\"'x'",
            "\\\\\"\"\"",
            "\"a\\\"",
            "'  \"3 < x\" '",
            "«ёлка»",
            " 1) Стол ",
            "\"\"\"\"",
        ];
        for sample in samples {
            let once = normalize(sample);
            assert_eq!(normalize(&once), once, "sample: {sample:?}");
        }
    }
}
