use thiserror::Error;

use crate::{
    ast::{FunctionData, MatchArm, MatchPattern, Node, NodeKind, TypeData},
    diagnostics::{DiagnosticSink, Location},
    scanner::{Scanner, Token, TokenKind},
};

#[derive(Debug, Error)]
#[error("{message}")]
pub struct ParseError {
    pub location: Location,
    pub message: String,
}

type PResult<T> = Result<T, ParseError>;

/// Parses a whole program. Errors are reported to `diagnostics` and the
/// parser resynchronizes, so the returned tree may be partial.
pub fn parse(source: &str, diagnostics: &mut DiagnosticSink) -> Vec<Node> {
    Parser::new(source, diagnostics).parse_program()
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy)]
pub enum Precedence {
    None,
    Assignment,  // = += -= *= /=
    Or,          // or
    And,         // and
    Equality,    // == !=
    Comparison,  // < > <= >= <=>
    Concat,      // <> ->
    BitwiseOr,   // |
    BitwiseXor,  // ~
    BitwiseAnd,  // &
    Shift,       // << >> >>>
    Term,        // + -
    Factor,      // * / // %
    Power,       // ^
    Unary,       // not - + ~ ref deref
    Call,        // . () []
    Primary
}

impl Precedence {
    pub fn one_higher(&self) -> Self {
        use Precedence as P;
        match *self {
            P::None => P::Assignment,
            P::Assignment => P::Or,
            P::Or => P::And,
            P::And => P::Equality,
            P::Equality => P::Comparison,
            P::Comparison => P::Concat,
            P::Concat => P::BitwiseOr,
            P::BitwiseOr => P::BitwiseXor,
            P::BitwiseXor => P::BitwiseAnd,
            P::BitwiseAnd => P::Shift,
            P::Shift => P::Term,
            P::Term => P::Factor,
            P::Factor => P::Power,
            P::Power => P::Unary,
            P::Unary => P::Call,
            P::Call => P::Primary,
            P::Primary => P::Primary,
        }
    }
}

type PrefixRuleFn = fn(&mut Parser) -> PResult<Node>;
type InfixRuleFn = fn(&mut Parser, Node) -> PResult<Node>;
struct ParseRule {
    prefix: Option<PrefixRuleFn>,
    infix: Option<InfixRuleFn>,
    precedence: Precedence,
}

impl ParseRule {
    pub const fn new(prefix: Option<PrefixRuleFn>, infix: Option<InfixRuleFn>, precedence: Precedence) -> Self {
        Self {prefix, infix, precedence}
    }
}

pub struct Parser<'a, 'd> {
    scanner: Scanner<'a>,
    source: &'a str,
    current: Token,
    previous: Token,
    diagnostics: &'d mut DiagnosticSink,
}

impl<'a, 'd> Parser<'a, 'd> {
    pub fn new(source: &'a str, diagnostics: &'d mut DiagnosticSink) -> Self {
        Self {
            scanner: Scanner::new(source),
            source,
            current: Token::new(TokenKind::Eof, 0, 0, 1, 1),
            previous: Token::new(TokenKind::Eof, 0, 0, 1, 1),
            diagnostics,
        }
    }
    pub fn parse_program(&mut self) -> Vec<Node> {
        self.advance();
        let mut items = vec![];
        while !self.check(TokenKind::Eof) {
            match self.expression() {
                Ok(node) => items.push(node),
                Err(e) => self.synchronize(e),
            }
            while self.compare(TokenKind::Semicolon) {}
        }
        items
    }
}

// token handling
impl<'a, 'd> Parser<'a, 'd> {
    fn advance(&mut self) {
        self.previous = self.current.clone();
        loop {
            self.current = self.scanner.scan_token();
            if let TokenKind::Error(msg) = &self.current.kind {
                let msg = msg.clone();
                self.diagnostics.error(self.current.location(), msg);
            }
            else {
                break;
            }
        }
    }
    fn consume(&mut self, kind: TokenKind, msg: &str) -> PResult<()> {
        if self.current.kind == kind {
            self.advance();
            Ok(())
        }
        else {
            Err(self.error_at_current(msg))
        }
    }
    fn compare(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        }
        else {
            false
        }
    }
    fn check(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }
    fn check_identifier(&self, name: &str) -> bool {
        self.current.kind == TokenKind::Identifier && self.current.lexeme(self.source) == name
    }
    fn lexeme(&self) -> &'a str {
        self.previous.lexeme(self.source)
    }
    fn location(&self) -> Location {
        self.previous.location()
    }
    fn identifier(&mut self, msg: &str) -> PResult<String> {
        self.consume(TokenKind::Identifier, msg)?;
        Ok(self.lexeme().to_string())
    }
}

// expressions
impl<'a, 'd> Parser<'a, 'd> {
    pub fn expression(&mut self) -> PResult<Node> {
        self.parse_precedence(Precedence::Assignment)
    }
    fn parse_precedence(&mut self, prec: Precedence) -> PResult<Node> {
        self.advance();

        let mut node = match Parser::get_rule(&self.previous.kind).prefix {
            Some(prefix_rule) => prefix_rule(self)?,
            None => return Err(self.error("Expected expression.")),
        };
        while prec <= Parser::get_rule(&self.current.kind).precedence {
            self.advance();
            if let Some(infix_rule) = Parser::get_rule(&self.previous.kind).infix {
                node = infix_rule(self, node)?;
            }
        }
        if prec <= Precedence::Assignment {
            node = self.assignment(node)?;
        }
        Ok(node)
    }
    fn assignment(&mut self, target: Node) -> PResult<Node> {
        let op = match self.current.kind {
            TokenKind::Equal => None,
            TokenKind::PlusEqual => Some("+"),
            TokenKind::MinusEqual => Some("-"),
            TokenKind::StarEqual => Some("*"),
            TokenKind::SlashEqual => Some("/"),
            _ => return Ok(target),
        };
        self.advance();
        let location = self.location();
        let value = Box::new(self.parse_precedence(Precedence::Assignment)?);
        let target = Box::new(target);
        let kind = match op {
            Some(op) => NodeKind::CompoundAssign { op: op.to_string(), target, value },
            None => NodeKind::Assign { target, value },
        };
        Ok(Node::new(kind, location))
    }
    fn literal(&mut self) -> PResult<Node> {
        let location = self.location();
        let kind = match self.previous.kind {
            TokenKind::True => NodeKind::Bool(true),
            TokenKind::False => NodeKind::Bool(false),
            TokenKind::Null => NodeKind::Null,
            TokenKind::This => NodeKind::This,
            _ => return Err(self.error("Expected literal.")),
        };
        Ok(Node::new(kind, location))
    }
    fn number(&mut self) -> PResult<Node> {
        let location = self.location();
        let lexeme = self.lexeme();
        let kind = match self.previous.kind {
            TokenKind::Int => match lexeme.parse::<i64>() {
                Ok(i) => NodeKind::Int(i),
                Err(_) => return Err(self.error("Integer literal is too large.")),
            },
            _ => match lexeme.parse::<f64>() {
                Ok(f) => NodeKind::Float(f),
                Err(_) => return Err(self.error("Invalid float literal.")),
            },
        };
        Ok(Node::new(kind, location))
    }
    fn string(&mut self) -> PResult<Node> {
        let lexeme = self.lexeme();
        let body = &lexeme[1..lexeme.len() - 1];
        let mut value = String::with_capacity(body.len());
        let mut chars = body.chars();
        while let Some(ch) = chars.next() {
            if ch != '\\' {
                value.push(ch);
                continue;
            }
            match chars.next() {
                Some('n') => value.push('\n'),
                Some('t') => value.push('\t'),
                Some('r') => value.push('\r'),
                Some('0') => value.push('\0'),
                Some(other) => value.push(other),
                None => return Err(self.error("Invalid escape at end of string.")),
            }
        }
        Ok(Node::new(NodeKind::Str(value), self.location()))
    }
    fn variable(&mut self) -> PResult<Node> {
        Ok(Node::new(NodeKind::Identifier(self.lexeme().to_string()), self.location()))
    }
    fn grouping(&mut self) -> PResult<Node> {
        let location = self.location();
        if self.compare(TokenKind::RParen) {
            return Ok(Node::new(NodeKind::Tuple(vec![]), location));
        }
        let first = self.expression()?;
        if self.compare(TokenKind::RParen) {
            return Ok(first);
        }
        let mut elements = vec![first];
        while self.compare(TokenKind::Comma) {
            if self.check(TokenKind::RParen) {
                break;
            }
            elements.push(self.expression()?);
        }
        self.consume(TokenKind::RParen, "Expected ')' after tuple elements.")?;
        Ok(Node::new(NodeKind::Tuple(elements), location))
    }
    fn list(&mut self) -> PResult<Node> {
        let location = self.location();
        let elements = self.comma_separated(TokenKind::RBracket, "Expected ']' after list elements.")?;
        Ok(Node::new(NodeKind::List(elements), location))
    }
    fn comma_separated(&mut self, close: TokenKind, msg: &str) -> PResult<Vec<Node>> {
        let mut elements = vec![];
        if !self.check(close.clone()) {
            loop {
                elements.push(self.expression()?);
                if !self.compare(TokenKind::Comma) || self.check(close.clone()) {
                    break;
                }
            }
        }
        self.consume(close, msg)?;
        Ok(elements)
    }
    fn scope(&mut self) -> PResult<Node> {
        let location = self.location();
        let mut items = vec![];
        while !self.check(TokenKind::RBrace) && !self.check(TokenKind::Eof) {
            match self.expression() {
                Ok(node) => items.push(node),
                Err(e) => self.synchronize(e),
            }
            while self.compare(TokenKind::Semicolon) {}
        }
        self.consume(TokenKind::RBrace, "Expected '}' after block.")?;
        Ok(Node::new(NodeKind::Scope(items), location))
    }
    fn unary(&mut self) -> PResult<Node> {
        let location = self.location();
        let oper_kind = self.previous.kind.clone();
        let op = self.lexeme().to_string();
        let operand = Box::new(self.parse_precedence(Precedence::Unary)?);
        let kind = match oper_kind {
            TokenKind::Not => NodeKind::Not(operand),
            TokenKind::Ref => NodeKind::Ref(operand),
            TokenKind::Deref => NodeKind::Deref(operand),
            _ => NodeKind::Prefix { op, operand },
        };
        Ok(Node::new(kind, location))
    }
    fn binary(&mut self, left: Node) -> PResult<Node> {
        let location = self.location();
        let oper_kind = self.previous.kind.clone();
        let op = self.lexeme().to_string();
        let rule = Parser::get_rule(&oper_kind);
        let right_prec = match oper_kind {
            TokenKind::Caret => rule.precedence,
            _ => rule.precedence.one_higher(),
        };
        let right = Box::new(self.parse_precedence(right_prec)?);
        let left = Box::new(left);
        let kind = match oper_kind {
            TokenKind::And => NodeKind::And { left, right },
            TokenKind::Or => NodeKind::Or { left, right },
            _ => NodeKind::Infix { op, left, right },
        };
        Ok(Node::new(kind, location))
    }
    fn call(&mut self, target: Node) -> PResult<Node> {
        let location = self.location();
        let args = self.comma_separated(TokenKind::RParen, "Expected ')' after arguments.")?;
        Ok(Node::new(NodeKind::Invoke { target: Box::new(target), args }, location))
    }
    fn index(&mut self, target: Node) -> PResult<Node> {
        let location = self.location();
        let index = self.expression()?;
        self.consume(TokenKind::RBracket, "Expected ']' after index.")?;
        Ok(Node::new(NodeKind::Index { target: Box::new(target), index: Box::new(index) }, location))
    }
    fn field(&mut self, target: Node) -> PResult<Node> {
        let location = self.location();
        let name = self.identifier("Expected field name after '.'.")?;
        Ok(Node::new(NodeKind::Field { target: Box::new(target), name }, location))
    }
}

// keyword constructs
impl<'a, 'd> Parser<'a, 'd> {
    fn var_definition(&mut self) -> PResult<Node> {
        let location = self.location();
        let mut definitions = vec![];
        loop {
            let name = self.identifier("Expected variable name.")?;
            let name_location = self.location();
            let value = if self.compare(TokenKind::Equal) {
                self.parse_precedence(Precedence::Or)?
            }
            else {
                Node::new(NodeKind::Null, name_location)
            };
            definitions.push((name, value));
            if !self.compare(TokenKind::Comma) {
                break;
            }
        }
        Ok(Node::new(NodeKind::VarDef(definitions), location))
    }
    fn function(&mut self) -> PResult<Node> {
        let location = self.location();
        if self.compare(TokenKind::Identifier) {
            let name = self.lexeme().to_string();
            let function = self.function_data()?;
            return Ok(Node::new(NodeKind::FnDef { name, function }, location));
        }
        Ok(Node::new(NodeKind::Fn(self.function_data()?), location))
    }
    fn function_data(&mut self) -> PResult<FunctionData> {
        self.consume(TokenKind::LParen, "Expected '(' before parameters.")?;
        let mut params = vec![];
        let mut variadic = false;
        if !self.check(TokenKind::RParen) {
            loop {
                if variadic {
                    return Err(self.error_at_current("Only the last parameter can be variadic."));
                }
                params.push(self.identifier("Expected parameter name.")?);
                variadic = self.compare(TokenKind::DotDot);
                if !self.compare(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RParen, "Expected ')' after parameters.")?;
        let body = Box::new(self.expression()?);
        Ok(FunctionData { params, variadic, body })
    }
    fn type_definition(&mut self) -> PResult<Node> {
        let location = self.location();
        let name = self.identifier("Expected type name.")?;
        self.consume(TokenKind::LBrace, "Expected '{' after type name.")?;
        let mut data = TypeData {
            name,
            ctor: None,
            methods: vec![],
            prefix: vec![],
            infix: vec![],
            invoke: None,
        };
        while !self.check(TokenKind::RBrace) && !self.check(TokenKind::Eof) {
            if self.compare(TokenKind::Fn) {
                let name = self.identifier("Expected method name.")?;
                data.methods.push((name, self.function_data()?));
            }
            else if self.check_identifier("ctor") {
                self.advance();
                if data.ctor.is_some() {
                    return Err(self.error("Type already has a constructor."));
                }
                data.ctor = Some(self.function_data()?);
            }
            else if self.check_identifier("invoke") {
                self.advance();
                if data.invoke.is_some() {
                    return Err(self.error("Type already has an invoke member."));
                }
                data.invoke = Some(self.function_data()?);
            }
            else if self.check_identifier("prefix") || self.check_identifier("infix") {
                self.advance();
                let is_prefix = self.lexeme() == "prefix";
                if !self.current.kind.is_operator() {
                    return Err(self.error_at_current("Expected an operator."));
                }
                self.advance();
                let op = self.lexeme().to_string();
                let function = self.function_data()?;
                if is_prefix {
                    data.prefix.push((op, function));
                }
                else {
                    data.infix.push((op, function));
                }
            }
            else {
                return Err(self.error_at_current("Expected 'ctor', 'fn', 'prefix', 'infix' or 'invoke'."));
            }
            while self.compare(TokenKind::Semicolon) {}
        }
        self.consume(TokenKind::RBrace, "Expected '}' after type body.")?;
        Ok(Node::new(NodeKind::TypeDef(data), location))
    }
    fn if_expression(&mut self) -> PResult<Node> {
        let location = self.location();
        let condition = Box::new(self.expression()?);
        let pass = Box::new(self.expression()?);
        let fail = if self.compare(TokenKind::El) {
            Some(Box::new(self.expression()?))
        }
        else {
            None
        };
        Ok(Node::new(NodeKind::If { condition, pass, fail }, location))
    }
    fn while_expression(&mut self) -> PResult<Node> {
        let location = self.location();
        let condition = Box::new(self.expression()?);
        let body = Box::new(self.expression()?);
        let el = if self.compare(TokenKind::El) {
            Some(Box::new(self.expression()?))
        }
        else {
            None
        };
        Ok(Node::new(NodeKind::While { condition, body, el }, location))
    }
    fn match_expression(&mut self) -> PResult<Node> {
        let location = self.location();
        let scrutinee = Box::new(self.expression()?);
        self.consume(TokenKind::LBrace, "Expected '{' after match value.")?;
        let mut arms = vec![];
        while !self.check(TokenKind::RBrace) && !self.check(TokenKind::Eof) {
            let arm_location = self.current.location();
            let pattern = if self.check_identifier("_") {
                self.advance();
                MatchPattern::Wildcard
            }
            else {
                MatchPattern::Literal(self.parse_precedence(Precedence::Or)?)
            };
            self.consume(TokenKind::Colon, "Expected ':' after match pattern.")?;
            let body = self.expression()?;
            arms.push(MatchArm { pattern, body, location: arm_location });
            while self.compare(TokenKind::Comma) || self.compare(TokenKind::Semicolon) {}
        }
        self.consume(TokenKind::RBrace, "Expected '}' after match arms.")?;
        Ok(Node::new(NodeKind::Match { scrutinee, arms }, location))
    }
    fn ret(&mut self) -> PResult<Node> {
        let location = self.location();
        let has_value = !matches!(
            self.current.kind,
            TokenKind::RBrace | TokenKind::Semicolon | TokenKind::El | TokenKind::Comma | TokenKind::Eof
        );
        let value = if has_value {Some(Box::new(self.expression()?))} else {None};
        Ok(Node::new(NodeKind::Ret(value), location))
    }
}

impl<'a, 'd> Parser<'a, 'd> {
    fn get_rule(kind: &TokenKind) -> &'static ParseRule {
        use TokenKind as TK;
        static LPAREN_RULE: ParseRule = ParseRule::new(Some(|s| s.grouping()), Some(|s, n| s.call(n)), Precedence::Call);
        static LBRACKET_RULE: ParseRule = ParseRule::new(Some(|s| s.list()), Some(|s, n| s.index(n)), Precedence::Call);
        static DOT_RULE: ParseRule = ParseRule::new(None, Some(|s, n| s.field(n)), Precedence::Call);
        static SCOPE_RULE: ParseRule = ParseRule::new(Some(|s| s.scope()), None, Precedence::None);

        static OR_RULE: ParseRule = ParseRule::new(None, Some(|s, n| s.binary(n)), Precedence::Or);
        static AND_RULE: ParseRule = ParseRule::new(None, Some(|s, n| s.binary(n)), Precedence::And);
        static EQUALITY_RULE: ParseRule = ParseRule::new(None, Some(|s, n| s.binary(n)), Precedence::Equality);
        static COMPARISON_RULE: ParseRule = ParseRule::new(None, Some(|s, n| s.binary(n)), Precedence::Comparison);
        static CONCAT_RULE: ParseRule = ParseRule::new(None, Some(|s, n| s.binary(n)), Precedence::Concat);
        static BITWISE_OR_RULE: ParseRule = ParseRule::new(None, Some(|s, n| s.binary(n)), Precedence::BitwiseOr);
        static BITWISE_XOR_RULE: ParseRule = ParseRule::new(Some(|s| s.unary()), Some(|s, n| s.binary(n)), Precedence::BitwiseXor);
        static BITWISE_AND_RULE: ParseRule = ParseRule::new(None, Some(|s, n| s.binary(n)), Precedence::BitwiseAnd);
        static SHIFT_RULE: ParseRule = ParseRule::new(None, Some(|s, n| s.binary(n)), Precedence::Shift);
        static TERM_RULE: ParseRule = ParseRule::new(Some(|s| s.unary()), Some(|s, n| s.binary(n)), Precedence::Term);
        static FACTOR_RULE: ParseRule = ParseRule::new(None, Some(|s, n| s.binary(n)), Precedence::Factor);
        static POWER_RULE: ParseRule = ParseRule::new(None, Some(|s, n| s.binary(n)), Precedence::Power);
        static UNARY_RULE: ParseRule = ParseRule::new(Some(|s| s.unary()), None, Precedence::None);

        static NUMBER_RULE: ParseRule = ParseRule::new(Some(|s| s.number()), None, Precedence::None);
        static STRING_RULE: ParseRule = ParseRule::new(Some(|s| s.string()), None, Precedence::None);
        static LITERAL_RULE: ParseRule = ParseRule::new(Some(|s| s.literal()), None, Precedence::None);
        static VARIABLE_RULE: ParseRule = ParseRule::new(Some(|s| s.variable()), None, Precedence::None);

        static VAR_RULE: ParseRule = ParseRule::new(Some(|s| s.var_definition()), None, Precedence::None);
        static FN_RULE: ParseRule = ParseRule::new(Some(|s| s.function()), None, Precedence::None);
        static TYPE_RULE: ParseRule = ParseRule::new(Some(|s| s.type_definition()), None, Precedence::None);
        static IF_RULE: ParseRule = ParseRule::new(Some(|s| s.if_expression()), None, Precedence::None);
        static WHILE_RULE: ParseRule = ParseRule::new(Some(|s| s.while_expression()), None, Precedence::None);
        static MATCH_RULE: ParseRule = ParseRule::new(Some(|s| s.match_expression()), None, Precedence::None);
        static RET_RULE: ParseRule = ParseRule::new(Some(|s| s.ret()), None, Precedence::None);
        static DEFAULT_RULE: ParseRule = ParseRule::new(None, None, Precedence::None);

        match kind {
            TK::LParen => &LPAREN_RULE,
            TK::LBracket => &LBRACKET_RULE,
            TK::Dot => &DOT_RULE,
            TK::LBrace => &SCOPE_RULE,
            TK::Or => &OR_RULE,
            TK::And => &AND_RULE,
            TK::EqualEqual | TK::BangEqual => &EQUALITY_RULE,
            TK::Less | TK::LessEqual | TK::Greater | TK::GreaterEqual | TK::LessEqualGreater => &COMPARISON_RULE,
            TK::LessGreater | TK::Arrow => &CONCAT_RULE,
            TK::Bar => &BITWISE_OR_RULE,
            TK::Tilde => &BITWISE_XOR_RULE,
            TK::Amp => &BITWISE_AND_RULE,
            TK::LessLess | TK::GreaterGreater | TK::GreaterGreaterGreater => &SHIFT_RULE,
            TK::Plus | TK::Minus => &TERM_RULE,
            TK::Star | TK::Slash | TK::SlashSlash | TK::Percent => &FACTOR_RULE,
            TK::Caret => &POWER_RULE,
            TK::Not | TK::Ref | TK::Deref => &UNARY_RULE,
            TK::Int | TK::Float => &NUMBER_RULE,
            TK::String => &STRING_RULE,
            TK::True | TK::False | TK::Null | TK::This => &LITERAL_RULE,
            TK::Identifier => &VARIABLE_RULE,
            TK::Var => &VAR_RULE,
            TK::Fn => &FN_RULE,
            TK::Type => &TYPE_RULE,
            TK::If => &IF_RULE,
            TK::While => &WHILE_RULE,
            TK::Match => &MATCH_RULE,
            TK::Ret => &RET_RULE,
            _ => &DEFAULT_RULE,
        }
    }
}

// error handling
impl<'a, 'd> Parser<'a, 'd> {
    fn error_at_current(&self, msg: &str) -> ParseError {
        self.error_at(&self.current, msg)
    }
    fn error(&self, msg: &str) -> ParseError {
        self.error_at(&self.previous, msg)
    }
    fn error_at(&self, token: &Token, msg: &str) -> ParseError {
        let message = match token.kind {
            TokenKind::Eof => format!("Error at end: {}", msg),
            _ => format!("Error at '{}': {}", token.lexeme(self.source), msg),
        };
        ParseError { location: token.location(), message }
    }

    fn synchronize(&mut self, e: ParseError) {
        self.diagnostics.error(e.location, e.message);
        while self.current.kind != TokenKind::Eof {
            if self.previous.kind == TokenKind::Semicolon {return;}
            match self.current.kind {
                TokenKind::Var | TokenKind::Fn | TokenKind::Type | TokenKind::If | TokenKind::While
                    | TokenKind::Match | TokenKind::Ret | TokenKind::RBrace => return,
                _ => self.advance(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(source: &str) -> Vec<Node> {
        let mut sink = DiagnosticSink::new();
        let nodes = parse(source, &mut sink);
        assert_eq!(sink.error_count(), 0, "{:?}", sink.iter().collect::<Vec<_>>());
        nodes
    }

    #[test]
    fn precedence_of_arithmetic() {
        let nodes = parse_ok("1 + 2 * 3");
        match &nodes[0].kind {
            NodeKind::Infix { op, right, .. } => {
                assert_eq!(op, "+");
                assert!(matches!(&right.kind, NodeKind::Infix { op, .. } if op == "*"));
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn power_is_right_associative() {
        let nodes = parse_ok("2 ^ 3 ^ 2");
        match &nodes[0].kind {
            NodeKind::Infix { left, right, .. } => {
                assert_eq!(left.kind, NodeKind::Int(2));
                assert!(matches!(right.kind, NodeKind::Infix { .. }));
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn var_definition_with_multiple_names() {
        let nodes = parse_ok("var x = 1, y");
        match &nodes[0].kind {
            NodeKind::VarDef(defs) => {
                assert_eq!(defs.len(), 2);
                assert_eq!(defs[0].1.kind, NodeKind::Int(1));
                assert_eq!(defs[1].1.kind, NodeKind::Null);
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn compound_assignment_keeps_one_target() {
        let nodes = parse_ok("x += 2");
        match &nodes[0].kind {
            NodeKind::CompoundAssign { op, target, value } => {
                assert_eq!(op, "+");
                assert_eq!(target.kind, NodeKind::Identifier("x".into()));
                assert_eq!(value.kind, NodeKind::Int(2));
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn variadic_function_and_method_call() {
        let nodes = parse_ok("fn f(a, b..) a; list.append(1)");
        match &nodes[0].kind {
            NodeKind::FnDef { name, function } => {
                assert_eq!(name, "f");
                assert_eq!(function.params, vec!["a".to_string(), "b".to_string()]);
                assert!(function.variadic);
            },
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(&nodes[1].kind, NodeKind::Invoke { target, .. } if matches!(target.kind, NodeKind::Field { .. })));
    }

    #[test]
    fn match_arms_and_wildcard() {
        let nodes = parse_ok("match x { 1: \"a\", 2: \"b\", _: \"z\" }");
        match &nodes[0].kind {
            NodeKind::Match { arms, .. } => {
                assert_eq!(arms.len(), 3);
                assert_eq!(arms[2].pattern, MatchPattern::Wildcard);
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn type_definition_members() {
        let nodes = parse_ok("type P { ctor(x) this.x = x; fn get() this.x; infix +(o) o; prefix -() this; invoke(n) n }");
        match &nodes[0].kind {
            NodeKind::TypeDef(data) => {
                assert_eq!(data.name, "P");
                assert!(data.ctor.is_some());
                assert!(data.invoke.is_some());
                assert_eq!(data.methods[0].0, "get");
                assert_eq!(data.infix[0].0, "+");
                assert_eq!(data.prefix[0].0, "-");
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn tuples_and_grouping() {
        let nodes = parse_ok("(1); (1,); (1, 2); ()");
        assert_eq!(nodes[0].kind, NodeKind::Int(1));
        assert!(matches!(&nodes[1].kind, NodeKind::Tuple(e) if e.len() == 1));
        assert!(matches!(&nodes[2].kind, NodeKind::Tuple(e) if e.len() == 2));
        assert!(matches!(&nodes[3].kind, NodeKind::Tuple(e) if e.is_empty()));
    }

    #[test]
    fn recovers_after_error() {
        let mut sink = DiagnosticSink::new();
        let nodes = parse(") ; var y = 2", &mut sink);
        assert_eq!(sink.error_count(), 1);
        assert_eq!(nodes.len(), 1);
        assert!(matches!(nodes[0].kind, NodeKind::VarDef(_)));
    }
}
