//! Argument tokens and command-line escaping
//!
//! Arguments are kept as tokens tagged either as requiring escaping or as
//! raw, pre-formatted text. Rendering joins them into a single command line
//! using the quoting rules of Windows-style command lines (backslashes are
//! only special before a double quote); [`split_command_line`] applies the
//! inverse rules, so every escaped token survives a render/split cycle
//! unchanged while raw tokens are split wherever they contain whitespace.

use std::borrow::Cow;
use std::fmt;

/// A single argument token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Argument {
    value: String,
    escape: bool,
}

impl Argument {
    /// A token that must reach the process as exactly this string
    pub fn escaped(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            escape: true,
        }
    }

    /// A pre-formatted fragment passed through as-is
    pub fn raw(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            escape: false,
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn requires_escaping(&self) -> bool {
        self.escape
    }

    /// Render the token as it appears on the command line
    pub fn render(&self) -> Cow<'_, str> {
        if self.escape {
            escape(&self.value)
        } else {
            Cow::Borrowed(&self.value)
        }
    }
}

/// Ordered argument tokens of a command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Arguments {
    tokens: Vec<Argument>,
}

impl Arguments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from tokens that are all escaped
    pub fn from_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tokens: tokens.into_iter().map(Argument::escaped).collect(),
        }
    }

    /// Build from a single pre-formatted command line fragment
    pub fn raw(line: impl Into<String>) -> Self {
        let line = line.into();
        if line.is_empty() {
            return Self::default();
        }
        Self {
            tokens: vec![Argument::raw(line)],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Argument> {
        self.tokens.iter()
    }

    /// Join all tokens into a single command line
    pub fn render(&self) -> String {
        self.tokens
            .iter()
            .map(|t| t.render())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// The argument vector the process receives
    pub fn to_argv(&self) -> Vec<String> {
        if self.tokens.iter().all(Argument::requires_escaping) {
            return self.tokens.iter().map(|t| t.value.clone()).collect();
        }
        split_command_line(&self.render())
    }
}

impl fmt::Display for Arguments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render())
    }
}

impl FromIterator<Argument> for Arguments {
    fn from_iter<T: IntoIterator<Item = Argument>>(iter: T) -> Self {
        Self {
            tokens: iter.into_iter().collect(),
        }
    }
}

/// Incremental builder for [`Arguments`]
#[derive(Debug, Clone, Default)]
pub struct ArgumentsBuilder {
    tokens: Vec<Argument>,
}

impl ArgumentsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a token that is escaped when rendered
    pub fn add(&mut self, value: impl Into<String>) -> &mut Self {
        self.tokens.push(Argument::escaped(value));
        self
    }

    /// Add a token that is passed through without escaping
    pub fn add_raw(&mut self, value: impl Into<String>) -> &mut Self {
        self.tokens.push(Argument::raw(value));
        self
    }

    /// Add several escaped tokens
    pub fn add_all<I, S>(&mut self, values: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tokens.extend(values.into_iter().map(Argument::escaped));
        self
    }

    /// Add any displayable value as an escaped token
    pub fn add_display(&mut self, value: impl fmt::Display) -> &mut Self {
        self.add(value.to_string())
    }

    pub fn build(&self) -> Arguments {
        Arguments {
            tokens: self.tokens.clone(),
        }
    }
}

/// Quote a token so that [`split_command_line`] yields it back unchanged
pub fn escape(value: &str) -> Cow<'_, str> {
    if !value.is_empty() && !value.chars().any(|c| c.is_whitespace() || c == '"') {
        return Cow::Borrowed(value);
    }

    let mut buffer = String::with_capacity(value.len() + 2);
    buffer.push('"');

    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                let mut backslashes = 1;
                while chars.peek() == Some(&'\\') {
                    chars.next();
                    backslashes += 1;
                }

                match chars.peek() {
                    // Closing quote follows: every backslash must be doubled
                    None => push_repeated(&mut buffer, '\\', backslashes * 2),
                    Some('"') => {
                        chars.next();
                        push_repeated(&mut buffer, '\\', backslashes * 2 + 1);
                        buffer.push('"');
                    }
                    Some(_) => push_repeated(&mut buffer, '\\', backslashes),
                }
            }
            '"' => buffer.push_str("\\\""),
            other => buffer.push(other),
        }
    }

    buffer.push('"');
    Cow::Owned(buffer)
}

/// Split a command line into tokens
pub fn split_command_line(line: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut chars = line.chars().peekable();

    loop {
        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }
        if chars.peek().is_none() {
            break;
        }

        let mut current = String::new();
        let mut in_quotes = false;

        while let Some(&c) = chars.peek() {
            match c {
                c if c.is_whitespace() && !in_quotes => break,
                '\\' => {
                    let mut backslashes = 0;
                    while chars.peek() == Some(&'\\') {
                        chars.next();
                        backslashes += 1;
                    }
                    if chars.peek() == Some(&'"') {
                        push_repeated(&mut current, '\\', backslashes / 2);
                        if backslashes % 2 == 1 {
                            chars.next();
                            current.push('"');
                        }
                    } else {
                        push_repeated(&mut current, '\\', backslashes);
                    }
                }
                '"' => {
                    chars.next();
                    in_quotes = !in_quotes;
                }
                other => {
                    chars.next();
                    current.push(other);
                }
            }
        }

        args.push(current);
    }

    args
}

fn push_repeated(buffer: &mut String, c: char, count: usize) {
    buffer.extend(std::iter::repeat(c).take(count));
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_escape_plain_token_is_borrowed() {
        assert!(matches!(escape("--verbose"), Cow::Borrowed("--verbose")));
        assert_eq!(escape(""), "\"\"");
    }

    #[test]
    fn test_escape_whitespace_and_quotes() {
        assert_eq!(escape("hello world"), "\"hello world\"");
        assert_eq!(escape("say \"hi\""), "\"say \\\"hi\\\"\"");
        assert_eq!(escape("C:\\dir with space\\"), "\"C:\\dir with space\\\\\"");
    }

    #[test]
    fn test_split_basic() {
        assert_eq!(split_command_line("  a  b\tc "), vec!["a", "b", "c"]);
        assert_eq!(split_command_line("\"a b\" c"), vec!["a b", "c"]);
        assert_eq!(split_command_line("\"\""), vec![""]);
        assert_eq!(split_command_line("a\\\\b"), vec!["a\\\\b"]);
        assert!(split_command_line("   ").is_empty());
    }

    #[test]
    fn test_raw_tokens_are_split_on_whitespace() {
        let mut builder = ArgumentsBuilder::new();
        builder.add("one two").add_raw("three four");
        let args = builder.build();

        assert_eq!(args.render(), "\"one two\" three four");
        assert_eq!(args.to_argv(), vec!["one two", "three", "four"]);
    }

    #[test]
    fn test_builder_display_and_all() {
        let mut builder = ArgumentsBuilder::new();
        builder.add_all(["-n", "5"]).add_display(42);
        let args = builder.build();

        assert_eq!(args.len(), 3);
        assert_eq!(args.to_string(), "-n 5 42");
        assert!(args.iter().all(Argument::requires_escaping));
    }

    #[test]
    fn test_empty_raw_line_has_no_tokens() {
        assert!(Arguments::raw("").is_empty());
        assert!(Arguments::raw("").to_argv().is_empty());
    }

    proptest! {
        #[test]
        fn escaped_tokens_survive_render_and_split(
            tokens in proptest::collection::vec(any::<String>(), 0..8)
        ) {
            let args = Arguments::from_tokens(tokens.clone());
            prop_assert_eq!(split_command_line(&args.render()), tokens);
        }
    }
}
