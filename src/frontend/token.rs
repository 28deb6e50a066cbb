//! Token definitions for Verse

use std::fmt;

use crate::utils::Span;

/// A token produced by the lexer
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Self { kind, span }
    }

    pub fn eof(span: Span) -> Self {
        Self { kind: TokenKind::Eof, span }
    }
}

/// Token kinds
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // ============ Keywords ============
    /// fn
    Fn,
    /// type
    Type,
    /// struct
    Struct,
    /// enum
    Enum,
    /// impl
    Impl,
    /// if
    If,
    /// else
    Else,
    /// while
    While,
    /// for
    For,
    /// in
    In,
    /// return
    Return,
    /// break
    Break,
    /// continue
    Continue,
    /// defer
    Defer,
    /// use
    Use,
    /// new
    New,
    /// as
    As,
    /// true
    True,
    /// false
    False,
    /// null
    Null,
    /// typeinfo
    Typeinfo,

    // ============ Literals ============
    /// Identifier
    Ident(String),
    /// Integer literal
    IntLit(u64),
    /// Float literal
    FloatLit(f64),
    /// String literal
    StringLit(String),
    /// Character literal ('a'), a byte
    CharLit(u8),
    /// Directive (#import, #include, #extern)
    Directive(String),

    // ============ Operators ============
    /// +
    Plus,
    /// -
    Minus,
    /// *
    Star,
    /// /
    Slash,
    /// %
    Percent,
    /// ==
    EqEq,
    /// !=
    Ne,
    /// <
    Lt,
    /// <=
    Le,
    /// >
    Gt,
    /// >=
    Ge,
    /// &&
    AndAnd,
    /// ||
    OrOr,
    /// !
    Not,
    /// &
    And,
    /// |
    Or,
    /// ^
    Caret,
    /// ~
    Tilde,
    /// <<
    Shl,
    /// >>
    Shr,
    /// =
    Eq,
    /// +=
    PlusEq,
    /// -=
    MinusEq,
    /// *=
    StarEq,
    /// /=
    SlashEq,
    /// %=
    PercentEq,
    /// :=
    ColonEq,
    /// ::
    ColonColon,
    /// ->
    Arrow,
    /// .
    Dot,
    /// ...
    DotDotDot,
    /// ' (owned marker in `&'T` and `[]'T`)
    Quote,
    /// $ (type parameter marker)
    Dollar,

    // ============ Delimiters ============
    /// (
    LParen,
    /// )
    RParen,
    /// {
    LBrace,
    /// }
    RBrace,
    /// [
    LBracket,
    /// ]
    RBracket,
    /// ,
    Comma,
    /// :
    Colon,
    /// ;
    Semicolon,

    // ============ Special ============
    /// End of file
    Eof,
}

impl TokenKind {
    /// Try to convert an identifier to a keyword
    pub fn keyword_from_str(s: &str) -> Option<TokenKind> {
        match s {
            "fn" => Some(TokenKind::Fn),
            "type" => Some(TokenKind::Type),
            "struct" => Some(TokenKind::Struct),
            "enum" => Some(TokenKind::Enum),
            "impl" => Some(TokenKind::Impl),
            "if" => Some(TokenKind::If),
            "else" => Some(TokenKind::Else),
            "while" => Some(TokenKind::While),
            "for" => Some(TokenKind::For),
            "in" => Some(TokenKind::In),
            "return" => Some(TokenKind::Return),
            "break" => Some(TokenKind::Break),
            "continue" => Some(TokenKind::Continue),
            "defer" => Some(TokenKind::Defer),
            "use" => Some(TokenKind::Use),
            "new" => Some(TokenKind::New),
            "as" => Some(TokenKind::As),
            "true" => Some(TokenKind::True),
            "false" => Some(TokenKind::False),
            "null" => Some(TokenKind::Null),
            "typeinfo" => Some(TokenKind::Typeinfo),
            _ => None,
        }
    }

    /// Get the precedence of a binary operator (for Pratt parsing)
    /// Returns None if not a binary operator
    pub fn binary_precedence(&self) -> Option<u8> {
        match self {
            // Logical OR (lowest)
            TokenKind::OrOr => Some(1),

            // Logical AND
            TokenKind::AndAnd => Some(2),

            // Equality
            TokenKind::EqEq | TokenKind::Ne => Some(3),

            // Comparison
            TokenKind::Lt | TokenKind::Le | TokenKind::Gt | TokenKind::Ge => Some(4),

            // Bitwise OR
            TokenKind::Or => Some(5),

            // Bitwise XOR
            TokenKind::Caret => Some(6),

            // Bitwise AND
            TokenKind::And => Some(7),

            // Shift
            TokenKind::Shl | TokenKind::Shr => Some(8),

            // Additive
            TokenKind::Plus | TokenKind::Minus => Some(9),

            // Multiplicative (highest for binary)
            TokenKind::Star | TokenKind::Slash | TokenKind::Percent => Some(10),

            _ => None,
        }
    }

    /// Whether this token is an assignment operator
    pub fn is_assignment(&self) -> bool {
        matches!(
            self,
            TokenKind::Eq
                | TokenKind::PlusEq
                | TokenKind::MinusEq
                | TokenKind::StarEq
                | TokenKind::SlashEq
                | TokenKind::PercentEq
        )
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Ident(name) => write!(f, "identifier '{}'", name),
            TokenKind::IntLit(n) => write!(f, "integer {}", n),
            TokenKind::FloatLit(x) => write!(f, "float {}", x),
            TokenKind::StringLit(s) => write!(f, "string {:?}", s),
            TokenKind::CharLit(c) => write!(f, "char {:?}", *c as char),
            TokenKind::Directive(d) => write!(f, "#{}", d),
            TokenKind::Eof => write!(f, "end of file"),
            other => write!(f, "{:?}", other),
        }
    }
}
