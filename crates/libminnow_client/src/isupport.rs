//! RPL_ISUPPORT (005) tokens. Servers advertise their capabilities as a list of `KEY` or
//! `KEY=value` parameters; we only care about the handful that change how the session interprets
//! other messages.

/// A recognized ISUPPORT token. Everything else a server advertises is ignored.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Token<'a> {
    /// `NETWORK=<name>`
    Network(&'a str),
    /// `CHANTYPES=<chars>`: the characters a channel name can start with.
    ChanTypes(&'a str),
    /// The display-character half of `PREFIX=(modes)chars`: the rank markers nicks can carry in
    /// name replies (e.g. `@+`).
    UserPrefixes(&'a str),
}

/// Tokenize the parameters of a 005 reply. The first parameter is our own nick and the final
/// human-readable trailing parameter ("are supported by this server") is skipped.
pub(crate) fn parse_tokens(params: &[String]) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    for param in params.iter().skip(1) {
        if param.is_empty() || param.contains(' ') {
            continue;
        }
        let (key, value) = match param.find('=') {
            Some(eq_idx) => (&param[..eq_idx], &param[eq_idx + 1..]),
            None => (param.as_str(), ""),
        };
        match key {
            "NETWORK" if !value.is_empty() => tokens.push(Token::Network(value)),
            "CHANTYPES" if !value.is_empty() => tokens.push(Token::ChanTypes(value)),
            "PREFIX" => {
                if let Some(prefixes) = parse_prefix_chars(value) {
                    tokens.push(Token::UserPrefixes(prefixes));
                }
            }
            _ => {}
        }
    }
    tokens
}

// `PREFIX=(modes)chars`; only the chars half matters to us.
fn parse_prefix_chars(value: &str) -> Option<&str> {
    let modes_and_chars = value.strip_prefix('(')?;
    let close_idx = modes_and_chars.find(')')?;
    let chars = &modes_and_chars[close_idx + 1..];
    if chars.is_empty() {
        None
    } else {
        Some(chars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(strs: &[&str]) -> Vec<String> {
        strs.iter().map(|s| (*s).to_owned()).collect()
    }

    #[test]
    fn test_parse_tokens() {
        let params = params(&[
            "minnow",
            "CHANTYPES=#&",
            "EXCEPTS",
            "INVEX",
            "CHANLIMIT=#:120",
            "PREFIX=(ov)@+",
            "NETWORK=freenode",
            "are supported by this server",
        ]);
        assert_eq!(
            parse_tokens(&params),
            vec![
                Token::ChanTypes("#&"),
                Token::UserPrefixes("@+"),
                Token::Network("freenode"),
            ]
        );
    }

    #[test]
    fn test_prefix_variants() {
        assert_eq!(parse_prefix_chars("(qaohv)~&@%+"), Some("~&@%+"));
        assert_eq!(parse_prefix_chars(""), None);
        assert_eq!(parse_prefix_chars("(ov)"), None);
        assert_eq!(parse_prefix_chars("@+"), None);
    }

    #[test]
    fn test_own_nick_is_not_a_token() {
        // The first parameter is the client's nick, even when it looks like a token
        let params = params(&["NETWORK=bogus", "NETWORK=real"]);
        assert_eq!(parse_tokens(&params), vec![Token::Network("real")]);
    }
}
