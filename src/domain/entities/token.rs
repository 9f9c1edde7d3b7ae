//! Command line tokens

/// How a token was delimited in the raw command line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Plain whitespace-delimited word
    Word,
    /// `'...'` or `"..."` span, quotes stripped
    Quoted,
    /// `@**name**`, `@_**name**` or `@_*group*`
    UserMention,
    /// `#**channel**` or `#**channel>topic**`
    ChannelMention,
    /// Triple-backtick fenced block, kept verbatim
    CodeBlock,
}

/// A single fragment of a command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub text: String,
    pub kind: TokenKind,
}

impl Token {
    pub fn new(text: impl Into<String>, kind: TokenKind) -> Self {
        Self {
            text: text.into(),
            kind,
        }
    }

    pub fn word(text: impl Into<String>) -> Self {
        Self::new(text, TokenKind::Word)
    }

    pub fn quoted(text: impl Into<String>) -> Self {
        Self::new(text, TokenKind::Quoted)
    }

    /// Whether the token was quote-delimited
    pub fn is_quoted(&self) -> bool {
        self.kind == TokenKind::Quoted
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Content of a code block without the surrounding fences
    pub fn code_content(&self) -> Option<&str> {
        if self.kind != TokenKind::CodeBlock {
            return None;
        }
        self.text
            .strip_prefix("```")
            .and_then(|s| s.strip_suffix("```"))
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}
