//! Command line option grammar.
//!
//! Splits a raw command line into an application name, a set of
//! `-Name:Value` style options, and the unresolved remainder (the command to
//! launch). Options are only recognized until the first token that does not
//! start with an option marker; from that token on the raw text is preserved
//! verbatim, quotes included, so the launched command line round-trips.

/// Prefixes that mark a token as an option. Longest marker first so `--x`
/// is the option `x` rather than `-x`.
const OPTION_MARKERS: [&str; 3] = ["--", "-", "/"];

/// Characters that separate an option name from its value.
const VALUE_SEPARATORS: [char; 2] = ['=', ':'];

/// An ordered multi-set of option name/value pairs.
///
/// Lookup is ASCII case-insensitive. When an option name occurs more than
/// once the last occurrence wins.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OptionSet {
    entries: Vec<(String, String)>,
}

impl OptionSet {
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Value of the last occurrence of `name`, if present. A presence-only
    /// option yields `Some("")`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Result of splitting a raw command line.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SplitCommandLine {
    /// First token of the raw command line (the launcher executable itself).
    pub application_name: String,
    pub options: OptionSet,
    /// Verbatim tail of the raw string starting at the first non-option
    /// token; empty when every token was consumed as an option.
    pub remainder: String,
}

/// Split `raw` into application name, options, and remainder.
///
/// A raw string with no option tokens is not an error: the option set is
/// empty and everything after the application name is remainder. That is the
/// common case (`nsudo notepad.exe`).
pub fn split_command_line(raw: &str) -> SplitCommandLine {
    let mut tokens = tokenize(raw).into_iter();

    let application_name = tokens.next().map(|t| t.text).unwrap_or_default();
    let mut options = OptionSet::default();
    let mut remainder = String::new();

    for token in tokens {
        match strip_option_marker(&token.text) {
            Some(body) => {
                let (name, value) = split_name_value(body);
                options.push(name, value);
            }
            None => {
                remainder = raw[token.start..].trim_end().to_string();
                break;
            }
        }
    }

    SplitCommandLine {
        application_name,
        options,
        remainder,
    }
}

struct RawToken {
    text: String,
    /// Byte offset of the token's first character in the raw string.
    start: usize,
}

/// Whitespace-separated tokens with double-quote grouping. Quotes toggle
/// grouping and are stripped from the token text; the offsets let the caller
/// recover the verbatim remainder.
fn tokenize(raw: &str) -> Vec<RawToken> {
    let mut tokens = Vec::new();
    let mut chars = raw.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        let mut text = String::new();
        let mut in_quotes = false;
        while let Some(&(_, c)) = chars.peek() {
            if c == '"' {
                in_quotes = !in_quotes;
                chars.next();
                continue;
            }
            if c.is_whitespace() && !in_quotes {
                break;
            }
            text.push(c);
            chars.next();
        }
        tokens.push(RawToken { text, start });
    }

    tokens
}

fn strip_option_marker(token: &str) -> Option<&str> {
    OPTION_MARKERS
        .iter()
        .find_map(|marker| token.strip_prefix(marker))
}

fn split_name_value(body: &str) -> (String, String) {
    match body.find(VALUE_SEPARATORS) {
        Some(idx) => (body[..idx].to_string(), body[idx + 1..].to_string()),
        None => (body.to_string(), String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn options_then_remainder() {
        let split = split_command_line("nsudo -U:T -P:E -ShowWindowMode=Hide cmd.exe /c dir");
        assert_eq!(split.application_name, "nsudo");
        assert_eq!(split.options.get("U"), Some("T"));
        assert_eq!(split.options.get("P"), Some("E"));
        assert_eq!(split.options.get("ShowWindowMode"), Some("Hide"));
        assert_eq!(split.options.len(), 3);
        assert_eq!(split.remainder, "cmd.exe /c dir");
    }

    #[test]
    fn no_options_is_the_common_case() {
        let split = split_command_line("nsudo notepad.exe");
        assert!(split.options.is_empty());
        assert_eq!(split.remainder, "notepad.exe");
    }

    #[test]
    fn empty_input() {
        let split = split_command_line("");
        assert_eq!(split.application_name, "");
        assert!(split.options.is_empty());
        assert_eq!(split.remainder, "");
    }

    #[test]
    fn all_marker_styles_are_recognized() {
        let split = split_command_line("nsudo -U:T /P:E --Wait cmd");
        assert_eq!(split.options.get("U"), Some("T"));
        assert_eq!(split.options.get("P"), Some("E"));
        assert_eq!(split.options.get("Wait"), Some(""));
        assert_eq!(split.remainder, "cmd");
    }

    #[test]
    fn double_dash_strips_both_characters() {
        let split = split_command_line("nsudo --U=T cmd");
        assert_eq!(split.options.get("U"), Some("T"));
    }

    #[test]
    fn both_separators_work() {
        let split = split_command_line("nsudo -U:T -M=L cmd");
        assert_eq!(split.options.get("U"), Some("T"));
        assert_eq!(split.options.get("M"), Some("L"));
    }

    #[test]
    fn value_may_contain_a_separator() {
        let split = split_command_line("nsudo -CurrentDirectory:C:\\Windows cmd");
        assert_eq!(split.options.get("CurrentDirectory"), Some("C:\\Windows"));
    }

    #[test]
    fn presence_only_option_maps_to_empty_value() {
        let split = split_command_line("nsudo -Wait cmd");
        assert_eq!(split.options.get("Wait"), Some(""));
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let split = split_command_line("nsudo -wait cmd");
        assert_eq!(split.options.get("Wait"), Some(""));
        assert_eq!(split.options.get("WAIT"), Some(""));
    }

    #[test]
    fn last_occurrence_wins() {
        let split = split_command_line("nsudo -U:T -U:S cmd");
        assert_eq!(split.options.get("U"), Some("S"));
    }

    #[test]
    fn option_like_text_after_first_plain_token_stays_in_remainder() {
        let split = split_command_line("nsudo -U:T cmd.exe /c dir");
        assert_eq!(split.options.len(), 1);
        assert_eq!(split.remainder, "cmd.exe /c dir");
    }

    #[test]
    fn remainder_preserves_quotes_verbatim() {
        let split = split_command_line("nsudo -U:T \"C:\\Program Files\\app.exe\" -x");
        assert_eq!(split.remainder, "\"C:\\Program Files\\app.exe\" -x");
    }

    #[test]
    fn quoted_option_value_with_spaces() {
        let split = split_command_line("nsudo \"-CurrentDirectory=C:\\Program Files\" cmd");
        assert_eq!(
            split.options.get("CurrentDirectory"),
            Some("C:\\Program Files")
        );
        assert_eq!(split.remainder, "cmd");
    }

    #[test]
    fn quoted_application_name_is_unquoted() {
        let split = split_command_line("\"C:\\Tools\\nsudo.exe\" -U:T cmd");
        assert_eq!(split.application_name, "C:\\Tools\\nsudo.exe");
        assert_eq!(split.options.get("U"), Some("T"));
    }

    #[test]
    fn trailing_whitespace_is_not_part_of_the_remainder() {
        let split = split_command_line("nsudo -U:T cmd.exe   ");
        assert_eq!(split.remainder, "cmd.exe");
    }
}
