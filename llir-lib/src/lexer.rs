use utils::DiagnosticEmitter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identifier(pub usize);

#[derive(Clone, Debug, Copy, Eq, PartialEq, Hash)]
pub struct Location(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenValue {
    /// `%name`, a local variable or temporary.
    Local(Identifier),
    /// `@name`, a function.
    Global(Identifier),
    /// A bare word that is not a keyword, used for block labels.
    Label(Identifier),
    Integer(i64),
    /// `!N`, overrides the source line of an instruction.
    LineMarker(u32),

    // Top level
    Define,
    Declare,

    // Instructions
    Alloca,
    Load,
    Store,
    Add,
    Sub,
    Icmp,
    Call,
    Branch,
    Return,
    Nop,

    // Comparison predicates
    Eq,
    Ne,
    Slt,
    Sle,
    Sgt,
    Sge,

    // Separators
    Assign,
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    Colon,
    Comma,

    EndOfFile,
}

use TokenValue::*;

fn from_char(c: char) -> Option<TokenValue> {
    match c {
        '(' => Some(LeftParen),
        ')' => Some(RightParen),
        '{' => Some(LeftBrace),
        '}' => Some(RightBrace),
        ':' => Some(Colon),
        '=' => Some(Assign),
        ',' => Some(Comma),
        _ => None,
    }
}

fn keyword(ident: &str) -> Option<TokenValue> {
    let kw = match ident {
        "define" => Define,
        "declare" => Declare,
        "alloca" => Alloca,
        "load" => Load,
        "store" => Store,
        "add" => Add,
        "sub" => Sub,
        "icmp" => Icmp,
        "call" => Call,
        "br" => Branch,
        "ret" => Return,
        "nop" => Nop,
        "eq" => Eq,
        "ne" => Ne,
        "slt" => Slt,
        "sle" => Sle,
        "sgt" => Sgt,
        "sge" => Sge,
        _ => return None,
    };
    Some(kw)
}

impl core::fmt::Display for TokenValue {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match *self {
            Local(i) => write!(f, "local_{}", i.0),
            Global(i) => write!(f, "global_{}", i.0),
            Label(i) => write!(f, "label_{}", i.0),
            Integer(i) => write!(f, "{i}"),
            LineMarker(l) => write!(f, "!{l}"),

            Define => write!(f, "define"),
            Declare => write!(f, "declare"),

            Alloca => write!(f, "alloca"),
            Load => write!(f, "load"),
            Store => write!(f, "store"),
            Add => write!(f, "add"),
            Sub => write!(f, "sub"),
            Icmp => write!(f, "icmp"),
            Call => write!(f, "call"),
            Branch => write!(f, "br"),
            Return => write!(f, "ret"),
            Nop => write!(f, "nop"),

            Eq => write!(f, "eq"),
            Ne => write!(f, "ne"),
            Slt => write!(f, "slt"),
            Sle => write!(f, "sle"),
            Sgt => write!(f, "sgt"),
            Sge => write!(f, "sge"),

            Assign => write!(f, "="),
            LeftParen => write!(f, "("),
            RightParen => write!(f, ")"),
            LeftBrace => write!(f, "{{"),
            RightBrace => write!(f, "}}"),
            Colon => write!(f, ":"),
            Comma => write!(f, ","),

            EndOfFile => write!(f, "END_OF_FILE"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub value: TokenValue,

    pub line_num: Location,
}

impl core::fmt::Display for Token {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "{}", self.value)
    }
}

/// Interned names. Locals, globals and labels share the table, the sigil is
/// not part of the stored name.
#[derive(Debug, Clone, Default)]
pub struct IdentifierTable(pub Vec<String>);

impl IdentifierTable {
    pub fn lookup(&self, ident: &str) -> Option<Identifier> {
        self.0.iter().position(|str| str == ident).map(Identifier)
    }

    pub fn get_identifier(&mut self, ident: &str) -> Identifier {
        if let Some(id) = self.lookup(ident) {
            id
        } else {
            self.0.push(ident.to_owned());
            Identifier(self.0.len() - 1)
        }
    }

    pub fn get_name(&self, id: Identifier) -> &str {
        &self.0[id.0]
    }
}

pub struct Lexer<'src> {
    source: &'src str,
    start: usize,
    current: usize,
    line_num: u32,
    has_error: bool,
    diagnostic_emitter: &'src mut DiagnosticEmitter,
    identifiers: IdentifierTable,
}

#[derive(Debug, Clone, Default)]
pub struct LexResult {
    pub tokens: Vec<Token>,
    pub identifiers: IdentifierTable,
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '.'
}

impl<'src> Lexer<'src> {
    pub fn new(source: &'src str, diagnostic_emitter: &'src mut DiagnosticEmitter) -> Self {
        Lexer {
            source,
            start: 0,
            current: 0,
            line_num: 1,
            has_error: false,
            diagnostic_emitter,
            identifiers: IdentifierTable::default(),
        }
    }

    /// Returns an empty token list after reporting the first error.
    pub fn lex_all(mut self) -> LexResult {
        if !self.source.is_ascii() {
            self.diagnostic_emitter
                .error(self.line_num, "Only ASCII input is supported.");
            return LexResult::default();
        }

        let mut tokens = Vec::new();
        while !self.is_at_end() {
            if let Some(tok) = self.lex() {
                tokens.push(tok);
            } else if self.has_error {
                return LexResult::default();
            }
        }

        tokens.push(Token {
            value: EndOfFile,
            line_num: Location(self.line_num),
        });

        LexResult {
            tokens,
            identifiers: self.identifiers,
        }
    }

    fn lex(&mut self) -> Option<Token> {
        loop {
            if self.is_at_end() {
                return None;
            }

            self.start = self.current;
            match self.advance() {
                // Unambiguous single character tokens.
                c @ ('=' | '(' | ')' | '{' | '}' | ':' | ',') => {
                    return from_char(c).map(|value| self.make_token(value));
                }

                // Whitespace
                '\n' => {
                    self.line_num += 1;
                    continue;
                }
                ' ' | '\t' | '\r' => continue,

                // Comments
                ';' => {
                    while self.peek() != '\n' && !self.is_at_end() {
                        self.advance();
                    }
                    continue;
                }

                // Negative numbers
                '-' => {
                    if self.peek().is_ascii_digit() {
                        return self.lex_number();
                    }
                    return self.fail("Expected number after '-'.");
                }
                '!' => {
                    if !self.peek().is_ascii_digit() {
                        return self.fail("Expected line number after '!'.");
                    }
                    while self.peek().is_ascii_digit() {
                        self.advance();
                    }
                    let Ok(line) = self.source[self.start + 1..self.current].parse() else {
                        return self.fail("Line number out of range.");
                    };
                    return Some(self.make_token(LineMarker(line)));
                }
                c @ ('%' | '@') => {
                    if !is_ident_char(self.peek()) {
                        return self.fail(&format!("Unexpected token: '{c}'."));
                    }
                    let ident = self.lex_identifier(self.start + 1);
                    let id = self.identifiers.get_identifier(ident);
                    let value = if c == '%' { Local(id) } else { Global(id) };
                    return Some(self.make_token(value));
                }
                c => {
                    if c.is_ascii_digit() {
                        return self.lex_number();
                    }
                    if c.is_ascii_alphabetic() || c == '_' {
                        let ident = self.lex_identifier(self.start);
                        let value = keyword(ident)
                            .unwrap_or_else(|| Label(self.identifiers.get_identifier(ident)));
                        return Some(self.make_token(value));
                    }
                    let source = self.source;
                    let unexpected = &source[self.start..self.current];
                    return self.fail(&format!("Unexpected token: '{unexpected}'."));
                }
            }
        }
    }

    fn make_token(&self, value: TokenValue) -> Token {
        Token {
            value,
            line_num: Location(self.line_num),
        }
    }

    fn fail(&mut self, message: &str) -> Option<Token> {
        self.diagnostic_emitter.error(self.line_num, message);
        self.has_error = true;
        None
    }

    fn lex_number(&mut self) -> Option<Token> {
        while self.peek().is_ascii_digit() {
            self.advance();
        }

        let Ok(value) = self.source[self.start..self.current].parse() else {
            return self.fail("Integer literal out of range.");
        };
        Some(self.make_token(Integer(value)))
    }

    fn lex_identifier(&mut self, from: usize) -> &'src str {
        while is_ident_char(self.peek()) {
            self.advance();
        }

        &self.source[from..self.current]
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.source.len()
    }

    /// The input is ASCII, every byte is a character.
    fn peek(&self) -> char {
        self.source
            .as_bytes()
            .get(self.current)
            .map_or('\0', |&b| b as char)
    }

    fn advance(&mut self) -> char {
        let prev = self.peek();
        self.current += 1;
        prev
    }
}
