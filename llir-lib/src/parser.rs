use std::collections::HashMap;

use analysis::cfg::{CfgBlock, ControlFlowGraph};
use utils::DiagnosticEmitter;

use crate::{
    ir::*,
    lexer::{Identifier, LexResult, Token, TokenValue},
};

/// Labels of a block terminator, resolved once the whole body is parsed.
type PendingTargets = Vec<(Token, Identifier)>;

pub struct Parser<'src> {
    current_tok: usize,
    tokens: Vec<Token>,
    unit: Unit,
    diag: &'src mut DiagnosticEmitter,
}

use TokenValue::*;

impl<'src> Parser<'src> {
    pub fn new(lexed: LexResult, diag: &'src mut DiagnosticEmitter) -> Self {
        let LexResult {
            tokens,
            identifiers,
        } = lexed;

        Parser {
            current_tok: 0,
            tokens,
            unit: Unit {
                functions: Vec::new(),
                identifiers,
            },
            diag,
        }
    }

    /// Returns `None` after reporting the first error.
    pub fn parse(mut self) -> Option<Unit> {
        while !self.is_at_end() {
            let func = if self.try_consume(Declare).is_some() {
                let (name_tok, name) = self.consume_global()?;
                let params = self.parse_params()?;
                (
                    name_tok,
                    Function::declaration(name, params, name_tok.line_num.0),
                )
            } else {
                self.consume(Define, "'define' or 'declare' expected.")?;
                self.parse_function()?
            };
            self.add_function(func)?;
        }
        Some(self.unit)
    }

    fn add_function(&mut self, (name_tok, func): (Token, Function)) -> Option<()> {
        if self.unit.functions.iter().any(|f| f.name == func.name) {
            let msg = format!("Redefinition of '@{}'.", self.unit.name(func.name));
            self.error(name_tok, &msg);
            return None;
        }
        self.unit.functions.push(func);
        Some(())
    }

    fn parse_params(&mut self) -> Option<Vec<Identifier>> {
        let mut result = Vec::new();
        if self.try_consume(LeftParen).is_none() {
            return Some(result);
        }
        if !self.check(RightParen) {
            loop {
                let (_, id) = self.consume_local()?;
                result.push(id);
                if self.try_consume(Comma).is_none() {
                    break;
                }
            }
        }
        self.consume(RightParen, "")?;
        Some(result)
    }

    fn parse_function(&mut self) -> Option<(Token, Function)> {
        let (name_tok, name) = self.consume_global()?;
        let params = self.parse_params()?;
        let mut func = Function::new(name, params, name_tok.line_num.0);
        self.consume(LeftBrace, "")?;

        let mut labels = HashMap::new();
        let mut pending: Vec<(usize, PendingTargets)> = Vec::new();
        let mut current: Option<usize> = None;
        while !self.check(RightBrace) {
            if let (Label(label), Colon) = (self.peek().value, self.peek_next().value) {
                let label_tok = self.advance();
                self.advance();
                if let Some(block) = current {
                    self.expect_terminated(&func, block, label_tok)?;
                }
                if labels.contains_key(&label) {
                    let msg = format!("Duplicate label '{}'.", self.unit.name(label));
                    self.error(label_tok, &msg);
                    return None;
                }
                let block = func.new_block(label);
                labels.insert(label, block);
                current = Some(block);
                continue;
            }

            let instr_tok = self.peek();
            let (instr, targets) = self.parse_instruction()?;
            let block = match current {
                Some(block) if !Self::is_terminated(&func, block) => block,
                _ => {
                    // Unlabelled blocks: the entry block or the code after a
                    // terminator.
                    let name = if func.blocks().is_empty() {
                        "entry".to_owned()
                    } else {
                        format!("bb.{}", func.blocks().len())
                    };
                    let label = self.unit.identifiers.get_identifier(&name);
                    if labels.contains_key(&label) {
                        let msg = format!("Duplicate label '{name}'.");
                        self.error(instr_tok, &msg);
                        return None;
                    }
                    let block = func.new_block(label);
                    labels.insert(label, block);
                    block
                }
            };
            current = Some(block);
            if !targets.is_empty() {
                pending.push((block, targets));
            }
            func.block_mut(block).push(instr);
        }
        let close = self.consume(RightBrace, "")?;
        let Some(last) = current else {
            self.error(close, "Function body cannot be empty.");
            return None;
        };
        self.expect_terminated(&func, last, close)?;

        for (block, targets) in pending {
            let mut resolved = Vec::with_capacity(targets.len());
            for (tok, label) in targets {
                let Some(&target) = labels.get(&label) else {
                    let msg = format!("Unknown label '{}'.", self.unit.name(label));
                    self.error(tok, &msg);
                    return None;
                };
                resolved.push(target);
            }
            if let Some(term) = func.block_mut(block).terminator_mut() {
                match (&mut term.kind, resolved.as_slice()) {
                    (InstrKind::Branch { then, els, .. }, &[t, e]) => {
                        *then = t;
                        *els = e;
                    }
                    (InstrKind::Jump(target), &[t]) => *target = t,
                    _ => {}
                }
            }
            resolved.dedup();
            for target in resolved {
                func.add_edge(block, target);
            }
        }

        Some((name_tok, func))
    }

    fn is_terminated(func: &Function, block: usize) -> bool {
        func.blocks()[block]
            .terminator()
            .is_some_and(Instruction::is_terminator)
    }

    fn expect_terminated(&mut self, func: &Function, block: usize, at: Token) -> Option<()> {
        if Self::is_terminated(func, block) {
            return Some(());
        }
        let msg = format!(
            "Block '{}' must end with br or ret.",
            self.unit.name(func.blocks()[block].label)
        );
        self.error(at, &msg);
        None
    }

    fn parse_instruction(&mut self) -> Option<(Instruction, PendingTargets)> {
        let first = self.peek();
        let mut targets = Vec::new();
        let kind = match first.value {
            Local(result) => {
                self.advance();
                self.consume(Assign, "")?;
                self.parse_definition(result)?
            }
            Store => {
                self.advance();
                let value = self.parse_operand()?;
                self.consume(Comma, "")?;
                let (_, ptr) = self.consume_local()?;
                InstrKind::Store { value, ptr }
            }
            Call => {
                self.advance();
                self.parse_call(None)?
            }
            Branch => {
                self.advance();
                if self.check(Local(Identifier(0))) {
                    let (_, cond) = self.consume_local()?;
                    self.consume(Comma, "")?;
                    targets.push(self.consume_label()?);
                    self.consume(Comma, "")?;
                    targets.push(self.consume_label()?);
                    InstrKind::Branch {
                        cond,
                        then: 0,
                        els: 0,
                    }
                } else {
                    targets.push(self.consume_label()?);
                    InstrKind::Jump(0)
                }
            }
            Return => {
                self.advance();
                // `ret` followed by the definition `%x = ...` has no value.
                let has_value = match (self.peek().value, self.peek_next().value) {
                    (Integer(_), _) => true,
                    (Local(_), next) => next != Assign,
                    _ => false,
                };
                let value = if has_value {
                    Some(self.parse_operand()?)
                } else {
                    None
                };
                InstrKind::Ret(value)
            }
            Nop => {
                self.advance();
                InstrKind::Nop
            }
            _ => {
                self.error(first, "Instruction expected.");
                return None;
            }
        };

        let mut line = first.line_num.0;
        if let Some(marker) = self.try_consume(LineMarker(0)) {
            if let LineMarker(l) = marker.value {
                line = l;
            }
        }
        Some((Instruction { kind, line }, targets))
    }

    fn parse_definition(&mut self, result: Identifier) -> Option<InstrKind> {
        let tok = self.advance();
        let kind = match tok.value {
            Alloca => InstrKind::Alloca { result },
            Load => {
                let (_, ptr) = self.consume_local()?;
                InstrKind::Load { result, ptr }
            }
            Add | Sub => {
                let (lhs, rhs) = self.parse_operand_pair()?;
                let op = if tok.value == Add {
                    BinaryOp::Add
                } else {
                    BinaryOp::Sub
                };
                InstrKind::Binary {
                    op,
                    result,
                    lhs,
                    rhs,
                }
            }
            Icmp => {
                let pred_tok = self.advance();
                let pred = match pred_tok.value {
                    Eq => CmpPredicate::Eq,
                    Ne => CmpPredicate::Ne,
                    Slt => CmpPredicate::Slt,
                    Sle => CmpPredicate::Sle,
                    Sgt => CmpPredicate::Sgt,
                    Sge => CmpPredicate::Sge,
                    _ => {
                        self.error(pred_tok, "Comparison predicate expected.");
                        return None;
                    }
                };
                let (lhs, rhs) = self.parse_operand_pair()?;
                InstrKind::Icmp {
                    pred,
                    result,
                    lhs,
                    rhs,
                }
            }
            Call => self.parse_call(Some(result))?,
            _ => {
                self.error(tok, "Instruction expected.");
                return None;
            }
        };
        Some(kind)
    }

    fn parse_call(&mut self, result: Option<Identifier>) -> Option<InstrKind> {
        let (_, callee) = self.consume_global()?;
        self.consume(LeftParen, "")?;
        let mut args = Vec::new();
        if !self.check(RightParen) {
            loop {
                args.push(self.parse_operand()?);
                if self.try_consume(Comma).is_none() {
                    break;
                }
            }
        }
        self.consume(RightParen, "")?;
        Some(InstrKind::Call {
            result,
            callee,
            args,
        })
    }

    fn parse_operand_pair(&mut self) -> Option<(Operand, Operand)> {
        let lhs = self.parse_operand()?;
        self.consume(Comma, "")?;
        let rhs = self.parse_operand()?;
        Some((lhs, rhs))
    }

    fn parse_operand(&mut self) -> Option<Operand> {
        let tok = self.peek();
        match tok.value {
            Local(id) => {
                self.advance();
                Some(Operand::Var(id))
            }
            Integer(value) => {
                self.advance();
                Some(Operand::Const(value))
            }
            _ => {
                self.error(tok, "Operand expected.");
                None
            }
        }
    }

    fn peek(&self) -> Token {
        self.tokens[self.current_tok]
    }

    fn peek_next(&self) -> Token {
        let next = (self.current_tok + 1).min(self.tokens.len() - 1);
        self.tokens[next]
    }

    fn previous(&self) -> Token {
        self.tokens[self.current_tok - 1]
    }

    fn is_at_end(&self) -> bool {
        matches!(self.peek().value, EndOfFile)
    }

    /// Only compares the kind of the token, not the payload.
    fn check(&self, tok_val: TokenValue) -> bool {
        if self.is_at_end() {
            false
        } else {
            core::mem::discriminant(&self.peek().value) == core::mem::discriminant(&tok_val)
        }
    }

    fn advance(&mut self) -> Token {
        if !self.is_at_end() {
            self.current_tok += 1;
        }
        self.previous()
    }

    fn consume(&mut self, tok_val: TokenValue, s: &str) -> Option<Token> {
        if self.check(tok_val) {
            return Some(self.advance());
        }
        let msg = if s.is_empty() {
            format!("'{tok_val}' expected.")
        } else {
            s.to_owned()
        };
        self.error(self.peek(), &msg);
        None
    }

    fn consume_local(&mut self) -> Option<(Token, Identifier)> {
        let tok = self.consume(Local(Identifier(0)), "Local identifier expected.")?;
        let Local(id) = tok.value else {
            return None;
        };
        Some((tok, id))
    }

    fn consume_global(&mut self) -> Option<(Token, Identifier)> {
        let tok = self.consume(Global(Identifier(0)), "Function name expected.")?;
        let Global(id) = tok.value else {
            return None;
        };
        Some((tok, id))
    }

    fn consume_label(&mut self) -> Option<(Token, Identifier)> {
        let tok = self.consume(Label(Identifier(0)), "Label expected.")?;
        let Label(id) = tok.value else {
            return None;
        };
        Some((tok, id))
    }

    fn try_consume(&mut self, tok_val: TokenValue) -> Option<Token> {
        if self.check(tok_val) {
            return Some(self.advance());
        }
        None
    }

    /// Tokens carrying identifiers are shown with their names.
    fn describe(&self, tok: Token) -> String {
        match tok.value {
            Local(id) => format!("%{}", self.unit.name(id)),
            Global(id) => format!("@{}", self.unit.name(id)),
            Label(id) => self.unit.name(id).to_owned(),
            _ => tok.to_string(),
        }
    }

    fn error(&mut self, tok: Token, s: &str) {
        if tok.value == EndOfFile {
            self.diag.report(tok.line_num.0, "at end of file", s);
        } else {
            let item = format!("at '{}'", self.describe(tok));
            self.diag.report(tok.line_num.0, &item, s);
        }
    }
}
