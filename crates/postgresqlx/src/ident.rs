/// Double-quote a SQL identifier, doubling any embedded quote.
///
/// Role DDL and session directives cannot use bind parameters, so every
/// identifier that is interpolated into a statement goes through here.
pub fn quote_ident(raw: &str) -> String {
    format!("\"{}\"", raw.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("user_smith"), "\"user_smith\"");
        assert_eq!(quote_ident("odd\"name"), "\"odd\"\"name\"");
    }
}
