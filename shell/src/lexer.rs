//! Whitespace tokenizer for command lines.
//!
//! Words are split on unquoted whitespace. Quote characters are kept in the
//! token text so the parser can decide whether a token was quoted as a whole.

use crate::error::ParseError;

/// A token produced by [`split_into_tokens`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Raw word text, including any quote characters it contained.
    Word(String),
    /// A lone unquoted `|`.
    Pipe,
    /// A lone unquoted `&`.
    Ampersand,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LexingState {
    Start,
    ReadingWord,
    ReadingQuote(char),
}

struct LexingFSM<'a> {
    input: std::str::Chars<'a>,
    state: LexingState,
    buffer: String,
}

impl<'a> LexingFSM<'a> {
    fn new(line: &'a str) -> Self {
        LexingFSM {
            input: line.chars(),
            state: LexingState::Start,
            buffer: String::new(),
        }
    }

    fn make_tokens(&mut self) -> Result<Vec<Token>, ParseError> {
        let mut out = Vec::new();

        while let Some(ch) = self.input.next() {
            match self.state {
                LexingState::Start => self.handle_start(ch),
                LexingState::ReadingWord => self.handle_word(ch, &mut out),
                LexingState::ReadingQuote(quote) => self.handle_quote(ch, quote),
            }
        }

        if let LexingState::ReadingQuote(quote) = self.state {
            return Err(ParseError::UnterminatedQuote(quote));
        }
        self.finish_word(&mut out);
        Ok(out)
    }

    fn handle_start(&mut self, ch: char) {
        if ch.is_whitespace() {
            return;
        }
        self.buffer.push(ch);
        self.state = match ch {
            '\'' | '"' => LexingState::ReadingQuote(ch),
            _ => LexingState::ReadingWord,
        };
    }

    fn handle_word(&mut self, ch: char, out: &mut Vec<Token>) {
        match ch {
            c if c.is_whitespace() => {
                self.finish_word(out);
                self.state = LexingState::Start;
            }
            '\'' | '"' => {
                self.buffer.push(ch);
                self.state = LexingState::ReadingQuote(ch);
            }
            c => self.buffer.push(c),
        }
    }

    fn handle_quote(&mut self, ch: char, quote: char) {
        self.buffer.push(ch);
        if ch == quote {
            self.state = LexingState::ReadingWord;
        }
    }

    fn finish_word(&mut self, out: &mut Vec<Token>) {
        if self.buffer.is_empty() {
            return;
        }
        let word = std::mem::take(&mut self.buffer);
        out.push(match word.as_str() {
            "|" => Token::Pipe,
            "&" => Token::Ampersand,
            _ => Token::Word(word),
        });
    }
}

/// Split a command line into tokens.
///
/// Fails only when a quote is left open.
pub fn split_into_tokens(line: &str) -> Result<Vec<Token>, ParseError> {
    LexingFSM::new(line).make_tokens()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(s: &str) -> Token {
        Token::Word(s.to_string())
    }

    #[test]
    fn splits_on_runs_of_whitespace() {
        let tokens = split_into_tokens("  ls \t -l   /tmp ").unwrap();
        assert_eq!(tokens, vec![word("ls"), word("-l"), word("/tmp")]);
    }

    #[test]
    fn quoted_whitespace_stays_in_one_token() {
        let tokens = split_into_tokens(r#"echo "a b" 'c  d'"#).unwrap();
        assert_eq!(tokens, vec![word("echo"), word("\"a b\""), word("'c  d'")]);
    }

    #[test]
    fn embedded_quotes_are_kept_verbatim() {
        let tokens = split_into_tokens(r#"x=a"b c"d"#).unwrap();
        assert_eq!(tokens, vec![word("x=a\"b c\"d")]);
    }

    #[test]
    fn other_quote_kind_is_literal_inside_quotes() {
        let tokens = split_into_tokens(r#""it's""#).unwrap();
        assert_eq!(tokens, vec![word("\"it's\"")]);
    }

    #[test]
    fn lone_operators_become_operator_tokens() {
        let tokens = split_into_tokens("a | b & c|d \"|\"").unwrap();
        assert_eq!(
            tokens,
            vec![
                word("a"),
                Token::Pipe,
                word("b"),
                Token::Ampersand,
                word("c|d"),
                word("\"|\""),
            ]
        );
    }

    #[test]
    fn unterminated_quote_is_an_error() {
        assert_eq!(
            split_into_tokens("echo 'oops"),
            Err(ParseError::UnterminatedQuote('\''))
        );
        assert_eq!(
            split_into_tokens("echo \"oops"),
            Err(ParseError::UnterminatedQuote('"'))
        );
    }

    #[test]
    fn empty_line_has_no_tokens() {
        assert!(split_into_tokens("   ").unwrap().is_empty());
    }
}
