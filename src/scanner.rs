use crate::diagnostics::Location;

#[derive(Debug, PartialEq, Clone)]
pub enum TokenKind {
    // punctuation
    LParen, RParen,
    LBracket, RBracket,
    LBrace, RBrace,
    Comma, Semicolon, Colon,
    Dot, DotDot,

    // assignment
    Equal, PlusEqual, MinusEqual, StarEqual, SlashEqual,

    // operators
    Plus, Minus, Star, Slash, SlashSlash, Percent, Caret,
    Amp, Bar, Tilde,
    LessLess, GreaterGreater, GreaterGreaterGreater,
    Less, LessEqual, Greater, GreaterEqual, LessEqualGreater,
    EqualEqual, BangEqual,
    LessGreater, Arrow,

    // literals
    Identifier, String, Int, Float,

    // keywords
    Var, Fn, Type,
    If, El, While, Match,
    Ref, Deref,
    And, Or, Not,
    This, Ret,
    True, False, Null,

    // special
    Error(String),
    Eof,
}

impl TokenKind {
    /// Tokens that may name an overloadable operator inside a type body.
    pub fn is_operator(&self) -> bool {
        use TokenKind as TK;
        matches!(
            self,
            TK::Plus | TK::Minus | TK::Star | TK::Slash | TK::SlashSlash | TK::Percent
                | TK::Caret | TK::Amp | TK::Bar | TK::Tilde | TK::LessLess
                | TK::GreaterGreater | TK::GreaterGreaterGreater | TK::Less | TK::LessEqual
                | TK::Greater | TK::GreaterEqual | TK::LessEqualGreater | TK::LessGreater
                | TK::Arrow
        )
    }
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub start: usize,
    pub end: usize,
    pub line: u32,
    pub column: u32,
}

impl Token {
    pub fn new(kind: TokenKind, start: usize, end: usize, line: u32, column: u32) -> Self {
        Self {
            kind,
            start,
            end,
            line,
            column,
        }
    }
    fn keyword_kind(text: &str) -> TokenKind {
        let mut chars = text.chars();
        match chars.next() {
            Some('a') => Token::check_keyword(chars.as_str(), "nd", TokenKind::And),
            Some('d') => Token::check_keyword(chars.as_str(), "eref", TokenKind::Deref),
            Some('e') => Token::check_keyword(chars.as_str(), "l", TokenKind::El),
            Some('f') => match chars.next() {
                Some('a') => Token::check_keyword(chars.as_str(), "lse", TokenKind::False),
                Some('n') => Token::check_keyword(chars.as_str(), "", TokenKind::Fn),
                _ => TokenKind::Identifier,
            },
            Some('i') => Token::check_keyword(chars.as_str(), "f", TokenKind::If),
            Some('m') => Token::check_keyword(chars.as_str(), "atch", TokenKind::Match),
            Some('n') => match chars.next() {
                Some('o') => Token::check_keyword(chars.as_str(), "t", TokenKind::Not),
                Some('u') => Token::check_keyword(chars.as_str(), "ll", TokenKind::Null),
                _ => TokenKind::Identifier,
            },
            Some('o') => Token::check_keyword(chars.as_str(), "r", TokenKind::Or),
            Some('r') => match chars.next() {
                Some('e') => match chars.next() {
                    Some('f') => Token::check_keyword(chars.as_str(), "", TokenKind::Ref),
                    Some('t') => Token::check_keyword(chars.as_str(), "", TokenKind::Ret),
                    _ => TokenKind::Identifier,
                },
                _ => TokenKind::Identifier,
            },
            Some('t') => match chars.next() {
                Some('h') => Token::check_keyword(chars.as_str(), "is", TokenKind::This),
                Some('r') => Token::check_keyword(chars.as_str(), "ue", TokenKind::True),
                Some('y') => Token::check_keyword(chars.as_str(), "pe", TokenKind::Type),
                _ => TokenKind::Identifier,
            },
            Some('v') => Token::check_keyword(chars.as_str(), "ar", TokenKind::Var),
            Some('w') => Token::check_keyword(chars.as_str(), "hile", TokenKind::While),
            _ => TokenKind::Identifier,
        }
    }
    fn check_keyword(rest: &str, check: &str, kind: TokenKind) -> TokenKind {
        if rest == check {kind}
        else {TokenKind::Identifier}
    }
    pub fn lexeme<'a>(&self, source: &'a str) -> &'a str {
        &source[self.start..self.end]
    }
    pub fn location(&self) -> Location {
        Location::new(self.line, self.column)
    }
}

pub struct Scanner<'a> {
    pub source: &'a str,
    start: usize,
    current: usize,
    line: u32,
    line_start: usize,
    token_line: u32,
    token_column: u32,
}

impl<'a> Scanner<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            start: 0,
            current: 0,
            line: 1,
            line_start: 0,
            token_line: 1,
            token_column: 1,
        }
    }
    pub fn scan_token(&mut self) -> Token {
        use TokenKind as TK;
        self.skip_whitespace();
        self.start = self.current;
        self.token_line = self.line;
        self.token_column = (self.start - self.line_start) as u32 + 1;

        let ch = match self.advance() {
            Some(ch) => ch,
            None => return self.make(TK::Eof),
        };

        let kind = match ch {
            '(' => TK::LParen,
            ')' => TK::RParen,
            '[' => TK::LBracket,
            ']' => TK::RBracket,
            '{' => TK::LBrace,
            '}' => TK::RBrace,
            ',' => TK::Comma,
            ';' => TK::Semicolon,
            ':' => TK::Colon,
            '^' => TK::Caret,
            '&' => TK::Amp,
            '|' => TK::Bar,
            '~' => TK::Tilde,
            '%' => TK::Percent,
            '.' => if self.compare('.') {TK::DotDot} else {TK::Dot},
            '+' => if self.compare('=') {TK::PlusEqual} else {TK::Plus},
            '*' => if self.compare('=') {TK::StarEqual} else {TK::Star},
            '-' => {
                if self.compare('=') {TK::MinusEqual}
                else if self.compare('>') {TK::Arrow}
                else {TK::Minus}
            },
            '/' => {
                if self.compare('/') {TK::SlashSlash}
                else if self.compare('=') {TK::SlashEqual}
                else {TK::Slash}
            },
            '=' => if self.compare('=') {TK::EqualEqual} else {TK::Equal},
            '!' => {
                if self.compare('=') {TK::BangEqual}
                else {TK::Error("Unexpected character '!', use 'not' for negation.".to_string())}
            },
            '<' => {
                if self.compare('<') {TK::LessLess}
                else if self.compare('>') {TK::LessGreater}
                else if self.compare('=') {
                    if self.compare('>') {TK::LessEqualGreater} else {TK::LessEqual}
                }
                else {TK::Less}
            },
            '>' => {
                if self.compare('>') {
                    if self.compare('>') {TK::GreaterGreaterGreater} else {TK::GreaterGreater}
                }
                else if self.compare('=') {TK::GreaterEqual}
                else {TK::Greater}
            },
            '"' => self.string(),
            c if c.is_ascii_digit() => self.number(),
            c if c.is_alphabetic() || c == '_' => self.identifier(),
            c => TK::Error(format!("Unexpected character '{}'.", c)),
        };
        self.make(kind)
    }
    fn make(&self, kind: TokenKind) -> Token {
        Token::new(kind, self.start, self.current, self.token_line, self.token_column)
    }
    fn string(&mut self) -> TokenKind {
        loop {
            match self.advance() {
                None => return TokenKind::Error("Unterminated string.".to_string()),
                Some('"') => return TokenKind::String,
                Some('\\') => {
                    self.advance();
                },
                Some('\n') => self.new_line(),
                Some(_) => (),
            }
        }
    }
    fn number(&mut self) -> TokenKind {
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }
        if self.peek() == Some('.') && self.peek_next().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
            }
            return TokenKind::Float;
        }
        TokenKind::Int
    }
    fn identifier(&mut self) -> TokenKind {
        while self.peek().is_some_and(|c| c.is_alphanumeric() || c == '_') {
            self.advance();
        }
        Token::keyword_kind(&self.source[self.start..self.current])
    }
    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek() {
            match ch {
                ' ' | '\r' | '\t' => {
                    self.advance();
                },
                '\n' => {
                    self.advance();
                    self.new_line();
                },
                '#' => {
                    while self.peek().is_some_and(|c| c != '\n') {
                        self.advance();
                    }
                },
                _ => return,
            }
        }
    }
    fn new_line(&mut self) {
        self.line += 1;
        self.line_start = self.current;
    }
    fn peek(&self) -> Option<char> {
        self.source[self.current..].chars().next()
    }
    fn peek_next(&self) -> Option<char> {
        let mut chars = self.source[self.current..].chars();
        chars.next();
        chars.next()
    }
    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.current += ch.len_utf8();
        Some(ch)
    }
    fn compare(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.current += expected.len_utf8();
            true
        }
        else {
            false
        }
    }
}

impl Iterator for Scanner<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        let token = self.scan_token();
        if token.kind == TokenKind::Eof {None} else {Some(token)}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Scanner::new(source).map(|t| t.kind).collect()
    }

    #[test]
    fn scans_multi_character_operators() {
        use TokenKind as TK;
        assert_eq!(
            kinds("// <=> <> -> >>> >> << <= != == += .."),
            vec![
                TK::SlashSlash, TK::LessEqualGreater, TK::LessGreater, TK::Arrow,
                TK::GreaterGreaterGreater, TK::GreaterGreater, TK::LessLess, TK::LessEqual,
                TK::BangEqual, TK::EqualEqual, TK::PlusEqual, TK::DotDot,
            ]
        );
    }

    #[test]
    fn keywords_and_identifiers() {
        use TokenKind as TK;
        assert_eq!(
            kinds("var fn type if el while match ref deref and or not this ret true false null"),
            vec![
                TK::Var, TK::Fn, TK::Type, TK::If, TK::El, TK::While, TK::Match, TK::Ref,
                TK::Deref, TK::And, TK::Or, TK::Not, TK::This, TK::Ret, TK::True, TK::False,
                TK::Null,
            ]
        );
        assert_eq!(kinds("refs return types _ nul"), vec![TK::Identifier; 5]);
    }

    #[test]
    fn numbers_and_field_access() {
        use TokenKind as TK;
        assert_eq!(kinds("1.5 3"), vec![TK::Float, TK::Int]);
        assert_eq!(kinds("5.hex"), vec![TK::Int, TK::Dot, TK::Identifier]);
    }

    #[test]
    fn tracks_lines_columns_and_comments() {
        let tokens: Vec<Token> = Scanner::new("a # comment\n  bb \"x\\\"y\"").collect();
        assert_eq!(tokens.len(), 3);
        assert_eq!((tokens[1].line, tokens[1].column), (2, 3));
        assert_eq!(tokens[2].kind, TokenKind::String);
        assert_eq!(tokens[2].lexeme("a # comment\n  bb \"x\\\"y\""), "\"x\\\"y\"");
    }

    #[test]
    fn reports_unterminated_string() {
        let kinds = kinds("\"abc");
        assert!(matches!(kinds[0], TokenKind::Error(_)));
    }
}
