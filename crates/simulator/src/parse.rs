// simulator/src/parse.rs

//! Contract source analysis.
//!
//! Understands enough of the contract language to validate its structure and
//! to extract the interface plus a small statement program per transition.
//! All positions are 1-indexed; a missing contract declaration is reported at
//! line 0, column 0.

use diagnostics::{CheckResult, Diagnostic};
use session::{Abi, AbiParam, Transition};
use std::collections::HashSet;

// ==================== TOKENS ====================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Ident(String),
    Number(String),
    Str(String),
    Punct(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: u32,
    pub column: u32,
}

impl Token {
    fn ident(&self) -> Option<&str> {
        match &self.kind {
            TokenKind::Ident(name) => Some(name),
            _ => None,
        }
    }

    fn is_ident(&self, word: &str) -> bool {
        self.ident() == Some(word)
    }

    fn is_punct(&self, punct: &str) -> bool {
        matches!(&self.kind, TokenKind::Punct(p) if p == punct)
    }

    fn text(&self) -> String {
        match &self.kind {
            TokenKind::Ident(s) | TokenKind::Number(s) | TokenKind::Punct(s) => s.clone(),
            TokenKind::Str(s) => format!("\"{}\"", s),
        }
    }

    fn diagnostic(&self, message: impl Into<String>) -> Diagnostic {
        Diagnostic::new(self.line, self.column, message)
    }
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: u32,
    column: u32,
    tokens: Vec<Token>,
    diagnostics: Vec<Diagnostic>,
}

impl Lexer {
    fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
            tokens: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    fn peek(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek(0)?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> String {
        let mut text = String::new();
        while let Some(c) = self.peek(0).filter(|c| pred(*c)) {
            text.push(c);
            self.bump();
        }
        text
    }

    fn push(&mut self, kind: TokenKind, line: u32, column: u32) {
        self.tokens.push(Token { kind, line, column });
    }

    fn run(mut self) -> (Vec<Token>, Vec<Diagnostic>) {
        while let Some(c) = self.peek(0) {
            let (line, column) = (self.line, self.column);
            match c {
                c if c.is_whitespace() => {
                    self.bump();
                }
                '(' if self.peek(1) == Some('*') => self.comment(line, column),
                '"' => self.string(line, column),
                c if c.is_ascii_digit() => {
                    let text = self.take_while(|c| c.is_ascii_alphanumeric());
                    self.push(TokenKind::Number(text), line, column);
                }
                c if c.is_alphabetic() || c == '_' => {
                    let text = self.take_while(|c| c.is_alphanumeric() || c == '_' || c == '\'');
                    self.push(TokenKind::Ident(text), line, column);
                }
                _ => {
                    let pair = match (c, self.peek(1)) {
                        (':', Some('=')) => Some(":="),
                        ('<', Some('-')) => Some("<-"),
                        ('=', Some('>')) => Some("=>"),
                        _ => None,
                    };
                    let text = match pair {
                        Some(op) => {
                            self.bump();
                            self.bump();
                            op.to_string()
                        }
                        None => {
                            self.bump();
                            c.to_string()
                        }
                    };
                    self.push(TokenKind::Punct(text), line, column);
                }
            }
        }
        (self.tokens, self.diagnostics)
    }

    /// Comments nest
    fn comment(&mut self, line: u32, column: u32) {
        self.bump();
        self.bump();
        let mut depth = 1;
        while depth > 0 {
            match (self.peek(0), self.peek(1)) {
                (Some('*'), Some(')')) => {
                    self.bump();
                    self.bump();
                    depth -= 1;
                }
                (Some('('), Some('*')) => {
                    self.bump();
                    self.bump();
                    depth += 1;
                }
                (Some(_), _) => {
                    self.bump();
                }
                (None, _) => {
                    self.diagnostics
                        .push(Diagnostic::new(line, column, "Unterminated comment"));
                    return;
                }
            }
        }
    }

    fn string(&mut self, line: u32, column: u32) {
        self.bump();
        let mut text = String::new();
        loop {
            match self.bump() {
                Some('"') => {
                    self.push(TokenKind::Str(text), line, column);
                    return;
                }
                Some('\\') => {
                    if let Some(escaped) = self.bump() {
                        text.push(escaped);
                    }
                }
                Some('\n') | None => {
                    self.diagnostics
                        .push(Diagnostic::new(line, column, "Unterminated string literal"));
                    return;
                }
                Some(c) => text.push(c),
            }
        }
    }
}

pub fn tokenize(source: &str) -> (Vec<Token>, Vec<Diagnostic>) {
    Lexer::new(source).run()
}

// ==================== STRUCTURE CHECKS ====================

fn closing_bracket(open: &str) -> Option<&'static str> {
    match open {
        "(" => Some(")"),
        "[" => Some("]"),
        "{" => Some("}"),
        _ => None,
    }
}

fn check_brackets(tokens: &[Token], diagnostics: &mut Vec<Diagnostic>) {
    let mut open: Vec<(&Token, &'static str)> = Vec::new();

    for token in tokens {
        let TokenKind::Punct(punct) = &token.kind else {
            continue;
        };
        if let Some(close) = closing_bracket(punct) {
            open.push((token, close));
            continue;
        }
        if !matches!(punct.as_str(), ")" | "]" | "}") {
            continue;
        }
        match open.pop() {
            Some((_, close)) if close == punct.as_str() => {}
            Some((opener, _)) => diagnostics.push(token.diagnostic(format!(
                "Mismatched '{}': '{}' opened at line {}, column {} is not closed",
                punct,
                opener.text(),
                opener.line,
                opener.column
            ))),
            None => diagnostics.push(token.diagnostic(format!("Unmatched '{}'", punct))),
        }
    }

    for (opener, _) in open {
        diagnostics.push(opener.diagnostic(format!("Unclosed '{}'", opener.text())));
    }
}

fn check_blocks(tokens: &[Token], diagnostics: &mut Vec<Diagnostic>) {
    fn unclosed(opener: &Token, diagnostics: &mut Vec<Diagnostic>) {
        diagnostics.push(opener.diagnostic(format!("'{}' is missing its 'end'", opener.text())));
    }

    let mut open: Vec<&Token> = Vec::new();

    for token in tokens {
        match token.ident() {
            // Components do not nest; a new one closes off anything still open
            Some("transition" | "procedure") => {
                for opener in open.drain(..) {
                    unclosed(opener, diagnostics);
                }
                open.push(token);
            }
            Some("match") => open.push(token),
            Some("end") => {
                if open.pop().is_none() {
                    diagnostics.push(token.diagnostic("Unexpected 'end'"));
                }
            }
            _ => {}
        }
    }

    for opener in open {
        unclosed(opener, diagnostics);
    }
}

fn check_declarations(tokens: &[Token], diagnostics: &mut Vec<Diagnostic>) {
    if !tokens.iter().any(|t| t.is_ident("contract")) {
        diagnostics.push(Diagnostic::new(0, 0, "No contract declaration found"));
    }

    let mut components = HashSet::new();
    let mut fields = HashSet::new();
    for pair in tokens.windows(2) {
        let (keyword, name) = (&pair[0], &pair[1]);
        let Some(ident) = name.ident() else {
            continue;
        };
        let seen: &mut HashSet<String> = match keyword.ident() {
            Some("transition" | "procedure") => &mut components,
            Some("field") => &mut fields,
            _ => continue,
        };
        if !seen.insert(ident.to_string()) {
            diagnostics.push(name.diagnostic(format!(
                "Duplicate {} '{}'",
                keyword.text(),
                ident
            )));
        }
    }
}

// ==================== CONTRACT MODEL ====================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    Ident(String),
    Literal(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    /// Take the message amount into the contract balance
    Accept,
    Throw(Option<String>),
    /// `field := operand`
    Store { field: String, value: Operand },
    /// `local <- field`
    Load { local: String, field: String },
    /// Not executed by the simulator
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Initializer {
    Literal(String),
    EmptyMap,
    Param(String),
    Expr(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    pub name: String,
    pub ty: String,
    pub init: Initializer,
}

/// Transition or procedure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentDef {
    pub name: String,
    pub params: Vec<AbiParam>,
    pub body: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractDef {
    pub name: String,
    pub params: Vec<AbiParam>,
    pub fields: Vec<FieldDef>,
    pub transitions: Vec<ComponentDef>,
    pub procedures: Vec<ComponentDef>,
}

impl ContractDef {
    pub fn abi(&self) -> Abi {
        Abi {
            name: self.name.clone(),
            params: self.params.clone(),
            fields: self
                .fields
                .iter()
                .map(|f| AbiParam {
                    name: f.name.clone(),
                    ty: f.ty.clone(),
                })
                .collect(),
            transitions: self
                .transitions
                .iter()
                .map(|t| Transition {
                    name: t.name.clone(),
                    params: t.params.clone(),
                })
                .collect(),
        }
    }

    pub fn transition(&self, name: &str) -> Option<&ComponentDef> {
        self.transitions.iter().find(|t| t.name == name)
    }
}

// ==================== PARSER ====================

/// Join tokens back into readable source
fn render(tokens: &[Token]) -> String {
    let mut out = String::new();
    let mut prev: Option<&Token> = None;
    for token in tokens {
        if let Some(prev) = prev {
            let glued = prev.is_punct("(")
                || prev.is_punct("[")
                || [")", "]", ",", ";"].iter().any(|p| token.is_punct(p));
            if !glued {
                out.push(' ');
            }
        }
        out.push_str(&token.text());
        prev = Some(token);
    }
    out
}

fn operand(tokens: &[Token]) -> Option<Operand> {
    match tokens {
        [single] => match &single.kind {
            TokenKind::Ident(name) => Some(Operand::Ident(name.clone())),
            TokenKind::Number(value) | TokenKind::Str(value) => Some(Operand::Literal(value.clone())),
            TokenKind::Punct(_) => None,
        },
        // Typed literal such as `Uint32 0`
        [ty, value] if ty.ident().is_some() => match &value.kind {
            TokenKind::Number(value) | TokenKind::Str(value) => Some(Operand::Literal(value.clone())),
            _ => None,
        },
        _ => None,
    }
}

fn initializer(tokens: &[Token], params: &[AbiParam]) -> Initializer {
    if tokens.first().is_some_and(|t| t.is_ident("Emp")) {
        return Initializer::EmptyMap;
    }
    match operand(tokens) {
        Some(Operand::Literal(value)) => Initializer::Literal(value),
        Some(Operand::Ident(name)) if params.iter().any(|p| p.name == name) => {
            Initializer::Param(name)
        }
        _ => Initializer::Expr(render(tokens)),
    }
}

fn statement(tokens: &[Token]) -> Statement {
    let other = || Statement::Other(render(tokens));
    match tokens {
        [only] if only.is_ident("accept") => Statement::Accept,
        [first, rest @ ..] if first.is_ident("throw") => {
            Statement::Throw((!rest.is_empty()).then(|| render(rest)))
        }
        [target, op, value @ ..] if op.is_punct(":=") => match (target.ident(), operand(value)) {
            (Some(field), Some(value)) => Statement::Store {
                field: field.to_string(),
                value,
            },
            _ => other(),
        },
        [local, op, field] if op.is_punct("<-") => match (local.ident(), field.ident()) {
            (Some(local), Some(field)) => Statement::Load {
                local: local.to_string(),
                field: field.to_string(),
            },
            _ => other(),
        },
        _ => other(),
    }
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(tokens: &'a [Token]) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<&'a Token> {
        let token = self.tokens.get(self.pos);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eof(&self, expected: &str) -> Diagnostic {
        let (line, column) = self
            .tokens
            .last()
            .map(|t| (t.line, t.column))
            .unwrap_or((0, 0));
        Diagnostic::new(
            line,
            column,
            format!("Expected {}, found end of input", expected),
        )
    }

    fn expect_ident(&mut self, expected: &str) -> Result<String, Diagnostic> {
        match self.next() {
            Some(token) => token.ident().map(str::to_string).ok_or_else(|| {
                token.diagnostic(format!("Expected {}, found '{}'", expected, token.text()))
            }),
            None => Err(self.eof(expected)),
        }
    }

    fn expect_punct(&mut self, punct: &str) -> Result<(), Diagnostic> {
        match self.next() {
            Some(token) if token.is_punct(punct) => Ok(()),
            Some(token) => Err(token.diagnostic(format!(
                "Expected '{}', found '{}'",
                punct,
                token.text()
            ))),
            None => Err(self.eof(&format!("'{}'", punct))),
        }
    }

    fn contract(mut self) -> Result<ContractDef, Diagnostic> {
        while let Some(token) = self.next() {
            if token.is_ident("contract") {
                break;
            }
        }

        let name = self.expect_ident("contract name")?;
        self.expect_punct("(")?;
        let params = self.params()?;

        let mut def = ContractDef {
            name,
            params,
            fields: Vec::new(),
            transitions: Vec::new(),
            procedures: Vec::new(),
        };

        while let Some(token) = self.next() {
            match token.ident() {
                Some("field") => {
                    let field = self.field(&def.params)?;
                    def.fields.push(field);
                }
                Some("transition") => {
                    let transition = self.component()?;
                    def.transitions.push(transition);
                }
                Some("procedure") => {
                    let procedure = self.component()?;
                    def.procedures.push(procedure);
                }
                _ => {}
            }
        }

        Ok(def)
    }

    /// Parameter list; the opening parenthesis is already consumed
    fn params(&mut self) -> Result<Vec<AbiParam>, Diagnostic> {
        let mut params = Vec::new();
        if self.peek().is_some_and(|t| t.is_punct(")")) {
            self.pos += 1;
            return Ok(params);
        }
        loop {
            let name = self.expect_ident("parameter name")?;
            self.expect_punct(":")?;
            let (ty, terminator) = self.type_until(&[",", ")"])?;
            params.push(AbiParam { name, ty });
            if terminator == ")" {
                return Ok(params);
            }
        }
    }

    /// Type tokens up to one of `terminators` outside parentheses
    fn type_until(&mut self, terminators: &[&str]) -> Result<(String, &'a str), Diagnostic> {
        let start = self.pos;
        let mut depth = 0usize;
        while let Some(token) = self.next() {
            let TokenKind::Punct(punct) = &token.kind else {
                continue;
            };
            if depth == 0 && terminators.contains(&punct.as_str()) {
                let ty = render(&self.tokens[start..self.pos - 1]);
                if ty.is_empty() {
                    return Err(token.diagnostic("Expected a type"));
                }
                return Ok((ty, punct.as_str()));
            }
            match punct.as_str() {
                "(" => depth += 1,
                ")" => depth = depth.saturating_sub(1),
                _ => {}
            }
        }
        Err(self.eof(&format!("'{}'", terminators.join("' or '"))))
    }

    fn field(&mut self, contract_params: &[AbiParam]) -> Result<FieldDef, Diagnostic> {
        let name = self.expect_ident("field name")?;
        self.expect_punct(":")?;
        let (ty, _) = self.type_until(&["="])?;

        let start = self.pos;
        while let Some(token) = self.peek() {
            if ["field", "transition", "procedure"]
                .iter()
                .any(|k| token.is_ident(k))
            {
                break;
            }
            self.pos += 1;
        }

        Ok(FieldDef {
            name,
            ty,
            init: initializer(&self.tokens[start..self.pos], contract_params),
        })
    }

    fn component(&mut self) -> Result<ComponentDef, Diagnostic> {
        let name = self.expect_ident("transition name")?;
        self.expect_punct("(")?;
        let params = self.params()?;

        let mut body = Vec::new();
        let mut start = self.pos;
        // Nested match blocks and brackets
        let mut depth = 0usize;
        loop {
            let token = self.next().ok_or_else(|| self.eof("'end'"))?;
            let at_boundary = match &token.kind {
                TokenKind::Ident(word) if word == "match" => {
                    depth += 1;
                    false
                }
                TokenKind::Ident(word) if word == "end" => {
                    if depth == 0 {
                        true
                    } else {
                        depth -= 1;
                        false
                    }
                }
                TokenKind::Punct(p) if closing_bracket(p).is_some() => {
                    depth += 1;
                    false
                }
                TokenKind::Punct(p) if matches!(p.as_str(), ")" | "]" | "}") => {
                    depth = depth.saturating_sub(1);
                    false
                }
                TokenKind::Punct(p) => p == ";" && depth == 0,
                _ => false,
            };

            if at_boundary {
                let tokens = &self.tokens[start..self.pos - 1];
                if !tokens.is_empty() {
                    body.push(statement(tokens));
                }
                if token.is_ident("end") {
                    return Ok(ComponentDef { name, params, body });
                }
                start = self.pos;
            }
        }
    }
}

// ==================== ENTRY POINTS ====================

/// Analyse contract source, returning its definition or every problem found
pub fn analyze(source: &str) -> Result<ContractDef, Vec<Diagnostic>> {
    let (tokens, mut diagnostics) = tokenize(source);
    check_brackets(&tokens, &mut diagnostics);
    check_blocks(&tokens, &mut diagnostics);
    check_declarations(&tokens, &mut diagnostics);

    if !diagnostics.is_empty() {
        diagnostics.sort_by_key(|d| (d.line, d.column));
        return Err(diagnostics);
    }

    Parser::new(&tokens).contract().map_err(|d| vec![d])
}

/// Type-check `source` the way the checker service reports it
pub fn check_source(source: &str) -> CheckResult {
    match analyze(source) {
        Ok(_) => CheckResult::Success,
        Err(diagnostics) => CheckResult::fail(diagnostics),
    }
}
