use crate::error::ParseError;
use crate::lexer::{self, Token};
use std::fmt;
use std::iter::Peekable;
use std::vec::IntoIter;

/// Kind of redirection, doubling as the index into [`Stage::redirects`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectKind {
    /// `<file`: standard input is read from the file.
    Input = 0,
    /// `>file`: standard output truncates the file.
    Output = 1,
    /// `>>file`: standard output appends to the file.
    Append = 2,
}

impl RedirectKind {
    pub const ALL: [RedirectKind; 3] = [Self::Input, Self::Output, Self::Append];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn operator(self) -> &'static str {
        match self {
            Self::Input => "<",
            Self::Output => ">",
            Self::Append => ">>",
        }
    }

    fn split(word: &str) -> Option<(Self, &str)> {
        if let Some(rest) = word.strip_prefix(">>") {
            Some((Self::Append, rest))
        } else if let Some(rest) = word.strip_prefix('>') {
            Some((Self::Output, rest))
        } else {
            word.strip_prefix('<').map(|rest| (Self::Input, rest))
        }
    }
}

/// One command of a pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stage {
    /// Program or builtin name; empty for a blank line.
    pub name: String,
    /// Positional arguments, without the name.
    pub arguments: Vec<String>,
    /// Redirect targets indexed by [`RedirectKind`].
    pub redirects: [Option<String>; 3],
}

impl Stage {
    pub fn arg_count(&self) -> usize {
        self.arguments.len()
    }

    pub fn redirect(&self, kind: RedirectKind) -> Option<&str> {
        self.redirects[kind.index()].as_deref()
    }

    fn set_redirect(&mut self, kind: RedirectKind, path: String) -> Result<(), ParseError> {
        let other = match kind {
            RedirectKind::Output => Some(RedirectKind::Append),
            RedirectKind::Append => Some(RedirectKind::Output),
            RedirectKind::Input => None,
        };
        if other.is_some_and(|other| self.redirect(other).is_some()) {
            return Err(ParseError::ConflictingOutput);
        }
        self.redirects[kind.index()] = Some(path);
        Ok(())
    }

    fn is_blank(&self) -> bool {
        self.name.is_empty()
            && self.arguments.is_empty()
            && self.redirects.iter().all(Option::is_none)
    }
}

/// Stages of one input line, in execution order.
///
/// Stage `i` writes into stage `i + 1`; the last stage writes to the terminal
/// unless redirected. There is always at least one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    stages: Vec<Stage>,
    /// Line ended with `&`: do not wait for the last stage.
    pub background: bool,
    /// Line ended with `?`: complete instead of executing.
    pub auto_complete: bool,
}

impl Pipeline {
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn root(&self) -> &Stage {
        &self.stages[0]
    }

    /// The stage fed by stage `index`, if any.
    pub fn next(&self, index: usize) -> Option<&Stage> {
        self.stages.get(index + 1)
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// True for a blank line.
    pub fn is_noop(&self) -> bool {
        self.root().name.is_empty()
    }
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, stage) in self.stages.iter().enumerate() {
            if i > 0 {
                f.write_str(" | ")?;
            }
            f.write_str(&quote(&stage.name))?;
            for arg in &stage.arguments {
                write!(f, " {}", quote(arg))?;
            }
            for kind in RedirectKind::ALL {
                if let Some(path) = stage.redirect(kind) {
                    write!(f, " {}{}", kind.operator(), quote(path))?;
                }
            }
        }
        if self.background {
            f.write_str(" &")?;
        }
        Ok(())
    }
}

fn quote(word: &str) -> String {
    if word.chars().any(char::is_whitespace) {
        format!("\"{}\"", word)
    } else {
        word.to_string()
    }
}

/// Strip one pair of matching quotes wrapping the whole word.
fn unquote(word: &str) -> String {
    let bytes = word.as_bytes();
    let len = bytes.len();
    if len > 2 && (bytes[0] == b'"' || bytes[0] == b'\'') && bytes[0] == bytes[len - 1] {
        word[1..len - 1].to_string()
    } else {
        word.to_string()
    }
}

struct PipelineBuilder {
    tokens: Peekable<IntoIter<Token>>,
}

impl PipelineBuilder {
    fn from(tokens: Vec<Token>) -> Self {
        PipelineBuilder {
            tokens: tokens.into_iter().peekable(),
        }
    }

    fn build_stages(mut self) -> Result<Vec<Stage>, ParseError> {
        let mut stages = Vec::new();
        let mut stage = Stage::default();

        while let Some(token) = self.tokens.next() {
            match token {
                Token::Pipe => {
                    if stage.name.is_empty() {
                        return Err(ParseError::EmptyStage);
                    }
                    stages.push(std::mem::take(&mut stage));
                }
                Token::Ampersand => return Err(ParseError::MisplacedBackground),
                Token::Word(word) => self.push_word(&mut stage, word)?,
            }
        }

        if stages.is_empty() && stage.is_blank() {
            return Ok(vec![stage]);
        }
        if stage.name.is_empty() {
            return Err(ParseError::EmptyStage);
        }
        stages.push(stage);
        Ok(stages)
    }

    fn push_word(&mut self, stage: &mut Stage, word: String) -> Result<(), ParseError> {
        if let Some((kind, rest)) = RedirectKind::split(&word) {
            let path = if rest.is_empty() {
                self.redirect_target(kind)?
            } else {
                rest.to_string()
            };
            return stage.set_redirect(kind, unquote(&path));
        }

        if stage.name.is_empty() {
            stage.name = unquote(&word);
        } else {
            stage.arguments.push(unquote(&word));
        }
        Ok(())
    }

    /// A bare operator takes the following word as its path.
    fn redirect_target(&mut self, kind: RedirectKind) -> Result<String, ParseError> {
        let next = self
            .tokens
            .next_if(|token| {
                matches!(token, Token::Word(word) if RedirectKind::split(word).is_none())
            });
        match next {
            Some(Token::Word(path)) => Ok(path),
            _ => Err(ParseError::MalformedRedirect(kind.operator())),
        }
    }
}

/// Parse one input line.
///
/// A trailing `?` requests completion and a trailing `&` runs the pipeline in
/// the background; either marker is removed before tokenizing.
pub fn parse(line: &str) -> Result<Pipeline, ParseError> {
    let mut text = line.trim();
    let mut background = false;
    let mut auto_complete = false;

    if let Some(rest) = text.strip_suffix('?') {
        auto_complete = true;
        text = rest;
    } else if let Some(rest) = text.strip_suffix('&') {
        background = true;
        text = rest;
    }

    let tokens = lexer::split_into_tokens(text)?;
    let stages = PipelineBuilder::from(tokens).build_stages()?;
    Ok(Pipeline {
        stages,
        background,
        auto_complete,
    })
}
