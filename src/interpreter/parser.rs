use std::sync::Arc;

use super::ast::{
    BinOp, CmpOp, ExceptHandler, Expr, FPart, FunctionDef, Param, Program, Stmt, StmtKind, Target,
    UnaryOp,
};
use super::lexer::{Tok, Token, tokenize};
use super::{Result, ScriptError};

const KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "break", "class", "continue", "def", "del", "elif",
    "else", "except", "finally", "for", "from", "global", "if", "import", "in", "is", "lambda",
    "nonlocal", "not", "or", "pass", "raise", "return", "try", "while", "with", "yield",
];

/// Parse guest source text into a [`Program`].
pub fn parse_program(source: &str) -> Result<Program> {
    let mut parser = Parser::new(tokenize(source)?);
    let mut body = Vec::new();
    while !parser.at_eof() {
        if parser.check(&Tok::Newline) {
            parser.advance();
            continue;
        }
        body.extend(parser.parse_statement()?);
    }
    Ok(Program::new(body, source))
}

/// Parse a single expression (used for f-string replacement fields).
pub fn parse_expression(source: &str, line: usize) -> Result<Expr> {
    let mut tokens = tokenize(source).map_err(|err| relocate(err, line))?;
    for token in &mut tokens {
        token.line = line;
    }
    let mut parser = Parser::new(tokens);
    let expr = parser.parse_test()?;
    while parser.check(&Tok::Newline) {
        parser.advance();
    }
    if !parser.at_eof() {
        return Err(ScriptError::syntax(line, "invalid expression in f-string"));
    }
    Ok(expr)
}

fn relocate(mut err: ScriptError, line: usize) -> ScriptError {
    err.line = Some(line);
    err
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> &Tok {
        self.tokens
            .get(self.pos)
            .map(|t| &t.tok)
            .unwrap_or(&Tok::Eof)
    }

    fn peek_at(&self, offset: usize) -> &Tok {
        self.tokens
            .get(self.pos + offset)
            .map(|t| &t.tok)
            .unwrap_or(&Tok::Eof)
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|t| t.line)
            .unwrap_or(1)
    }

    fn advance(&mut self) -> Tok {
        let tok = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek(), Tok::Eof)
    }

    fn check(&self, tok: &Tok) -> bool {
        self.peek() == tok
    }

    fn check_op(&self, op: &str) -> bool {
        matches!(self.peek(), Tok::Op(found) if *found == op)
    }

    fn eat_op(&mut self, op: &str) -> bool {
        if self.check_op(op) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_op(&mut self, op: &str) -> Result<()> {
        if self.eat_op(op) {
            Ok(())
        } else {
            Err(self.error(&format!("expected '{op}'")))
        }
    }

    fn check_kw(&self, kw: &str) -> bool {
        matches!(self.peek(), Tok::Name(name) if name == kw)
    }

    fn eat_kw(&mut self, kw: &str) -> bool {
        if self.check_kw(kw) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_kw(&mut self, kw: &str) -> Result<()> {
        if self.eat_kw(kw) {
            Ok(())
        } else {
            Err(self.error(&format!("expected '{kw}'")))
        }
    }

    fn expect_name(&mut self) -> Result<String> {
        match self.peek().clone() {
            Tok::Name(name) if !KEYWORDS.contains(&name.as_str()) => {
                self.advance();
                Ok(name)
            }
            _ => Err(self.error("expected identifier")),
        }
    }

    fn expect_end_of_statement(&mut self) -> Result<()> {
        match self.peek() {
            Tok::Newline => {
                self.advance();
                Ok(())
            }
            Tok::Eof | Tok::Dedent => Ok(()),
            _ => Err(self.error("invalid syntax")),
        }
    }

    fn error(&self, message: &str) -> ScriptError {
        let found = match self.peek() {
            Tok::Name(name) => format!("'{name}'"),
            Tok::Int(value) => format!("'{value}'"),
            Tok::Float(value) => format!("'{value}'"),
            Tok::Str(_) | Tok::FStr(_) => "string literal".to_string(),
            Tok::Op(op) => format!("'{op}'"),
            Tok::Newline => "end of line".to_string(),
            Tok::Indent => "indent".to_string(),
            Tok::Dedent => "dedent".to_string(),
            Tok::Eof => "end of input".to_string(),
        };
        ScriptError::syntax(self.line(), format!("{message}, found {found}"))
    }

    // ----- statements -------------------------------------------------------

    fn parse_statement(&mut self) -> Result<Vec<Stmt>> {
        let line = self.line();
        let head = match self.peek() {
            Tok::Name(name) => name.clone(),
            Tok::Indent => {
                return Err(
                    ScriptError::new("IndentationError", "unexpected indent").at_line(line)
                );
            }
            _ => return self.parse_simple_line(),
        };
        let kind = match head.as_str() {
            "if" => self.parse_if()?,
            "while" => self.parse_while()?,
            "for" => self.parse_for()?,
            "def" => self.parse_def()?,
            "try" => self.parse_try()?,
            "class" | "with" | "lambda" | "yield" | "del" | "nonlocal" => {
                return Err(ScriptError::syntax(
                    line,
                    format!("'{head}' is not supported in the sandbox"),
                ));
            }
            _ => return self.parse_simple_line(),
        };
        Ok(vec![Stmt { line, kind }])
    }

    /// Parses `simple (';' simple)* NEWLINE`.
    fn parse_simple_line(&mut self) -> Result<Vec<Stmt>> {
        let mut stmts = vec![self.parse_simple()?];
        while self.eat_op(";") {
            if matches!(self.peek(), Tok::Newline | Tok::Eof) {
                break;
            }
            stmts.push(self.parse_simple()?);
        }
        self.expect_end_of_statement()?;
        Ok(stmts)
    }

    fn parse_simple(&mut self) -> Result<Stmt> {
        let line = self.line();
        let kind = if self.eat_kw("pass") {
            StmtKind::Pass
        } else if self.eat_kw("break") {
            StmtKind::Break
        } else if self.eat_kw("continue") {
            StmtKind::Continue
        } else if self.eat_kw("return") {
            if self.at_statement_end() {
                StmtKind::Return(None)
            } else {
                StmtKind::Return(Some(self.parse_exprlist()?))
            }
        } else if self.eat_kw("raise") {
            if self.at_statement_end() {
                StmtKind::Raise(None)
            } else {
                StmtKind::Raise(Some(self.parse_test()?))
            }
        } else if self.eat_kw("global") {
            StmtKind::Global(self.parse_name_list()?)
        } else if self.eat_kw("import") {
            StmtKind::Import(self.parse_name_list()?)
        } else if self.eat_kw("from") {
            let module = self.expect_name()?;
            self.expect_kw("import")?;
            StmtKind::ImportFrom {
                module,
                names: self.parse_name_list()?,
            }
        } else {
            self.parse_expression_statement()?
        };
        Ok(Stmt { line, kind })
    }

    fn at_statement_end(&self) -> bool {
        matches!(self.peek(), Tok::Newline | Tok::Eof | Tok::Dedent) || self.check_op(";")
    }

    fn parse_name_list(&mut self) -> Result<Vec<String>> {
        let mut names = vec![self.expect_name()?];
        while self.eat_op(",") {
            names.push(self.expect_name()?);
        }
        Ok(names)
    }

    fn parse_expression_statement(&mut self) -> Result<StmtKind> {
        let first = self.parse_exprlist()?;

        if let Some(op) = self.aug_assign_op() {
            self.advance();
            let target = self.to_target(first)?;
            if matches!(target, Target::Unpack(_)) {
                return Err(self.error("illegal expression for augmented assignment"));
            }
            let value = self.parse_exprlist()?;
            return Ok(StmtKind::AugAssign { target, op, value });
        }

        if !self.check_op("=") {
            return Ok(StmtKind::Expr(first));
        }

        let mut exprs = vec![first];
        while self.eat_op("=") {
            exprs.push(self.parse_exprlist()?);
        }
        let value = exprs.pop().unwrap_or(Expr::None);
        let targets = exprs
            .into_iter()
            .map(|expr| self.to_target(expr))
            .collect::<Result<Vec<_>>>()?;
        Ok(StmtKind::Assign { targets, value })
    }

    fn aug_assign_op(&self) -> Option<BinOp> {
        match self.peek() {
            Tok::Op("+=") => Some(BinOp::Add),
            Tok::Op("-=") => Some(BinOp::Sub),
            Tok::Op("*=") => Some(BinOp::Mul),
            Tok::Op("/=") => Some(BinOp::Div),
            Tok::Op("//=") => Some(BinOp::FloorDiv),
            Tok::Op("%=") => Some(BinOp::Mod),
            Tok::Op("**=") => Some(BinOp::Pow),
            _ => None,
        }
    }

    fn to_target(&self, expr: Expr) -> Result<Target> {
        match expr {
            Expr::Name(name) => Ok(Target::Name(name)),
            Expr::Index { object, index } => Ok(Target::Index {
                object: *object,
                index: *index,
            }),
            Expr::Tuple(items) | Expr::List(items) => Ok(Target::Unpack(
                items
                    .into_iter()
                    .map(|item| self.to_target(item))
                    .collect::<Result<Vec<_>>>()?,
            )),
            _ => Err(ScriptError::syntax(self.line(), "cannot assign to expression")),
        }
    }

    fn parse_suite(&mut self) -> Result<Vec<Stmt>> {
        self.expect_op(":")?;
        if !self.check(&Tok::Newline) {
            return self.parse_simple_line();
        }
        self.advance();
        if !self.check(&Tok::Indent) {
            return Err(ScriptError::new("IndentationError", "expected an indented block")
                .at_line(self.line()));
        }
        self.advance();
        let mut body = Vec::new();
        while !self.check(&Tok::Dedent) && !self.at_eof() {
            if self.check(&Tok::Newline) {
                self.advance();
                continue;
            }
            body.extend(self.parse_statement()?);
        }
        if self.check(&Tok::Dedent) {
            self.advance();
        }
        Ok(body)
    }

    fn parse_if(&mut self) -> Result<StmtKind> {
        self.expect_kw("if")?;
        let mut branches = Vec::new();
        let cond = self.parse_test()?;
        branches.push((cond, self.parse_suite()?));
        let mut otherwise = None;
        loop {
            if self.eat_kw("elif") {
                let cond = self.parse_test()?;
                branches.push((cond, self.parse_suite()?));
            } else if self.eat_kw("else") {
                otherwise = Some(self.parse_suite()?);
                break;
            } else {
                break;
            }
        }
        Ok(StmtKind::If {
            branches,
            otherwise,
        })
    }

    fn parse_while(&mut self) -> Result<StmtKind> {
        self.expect_kw("while")?;
        let cond = self.parse_test()?;
        let body = self.parse_suite()?;
        Ok(StmtKind::While { cond, body })
    }

    fn parse_for(&mut self) -> Result<StmtKind> {
        self.expect_kw("for")?;
        let target = self.parse_target_list()?;
        self.expect_kw("in")?;
        let iter = self.parse_exprlist()?;
        let body = self.parse_suite()?;
        Ok(StmtKind::For { target, iter, body })
    }

    fn parse_target_list(&mut self) -> Result<Target> {
        // Targets are parsed below the comparison level so `in` ends the list.
        let mut items = vec![self.parse_postfix()?];
        let mut tuple = false;
        while self.eat_op(",") {
            tuple = true;
            if self.check_kw("in") {
                break;
            }
            items.push(self.parse_postfix()?);
        }
        if tuple {
            self.to_target(Expr::Tuple(items))
        } else {
            self.to_target(items.remove(0))
        }
    }

    fn parse_def(&mut self) -> Result<StmtKind> {
        self.expect_kw("def")?;
        let name = self.expect_name()?;
        self.expect_op("(")?;
        let mut params: Vec<Param> = Vec::new();
        while !self.check_op(")") {
            let param_name = self.expect_name()?;
            // Type annotations are accepted and ignored.
            if self.eat_op(":") {
                self.parse_test()?;
            }
            let default = if self.eat_op("=") {
                Some(self.parse_test()?)
            } else {
                if params.last().is_some_and(|p| p.default.is_some()) {
                    return Err(self.error("non-default argument follows default argument"));
                }
                None
            };
            params.push(Param {
                name: param_name,
                default,
            });
            if !self.eat_op(",") {
                break;
            }
        }
        self.expect_op(")")?;
        if self.eat_op("->") {
            self.parse_test()?;
        }
        let body = self.parse_suite()?;
        Ok(StmtKind::Def(Arc::new(FunctionDef { name, params, body })))
    }

    fn parse_try(&mut self) -> Result<StmtKind> {
        self.expect_kw("try")?;
        let body = self.parse_suite()?;
        let mut handlers = Vec::new();
        while self.eat_kw("except") {
            let kind = if self.check_op(":") {
                None
            } else {
                Some(self.expect_name()?)
            };
            let binding = if self.eat_kw("as") {
                Some(self.expect_name()?)
            } else {
                None
            };
            handlers.push(ExceptHandler {
                kind,
                binding,
                body: self.parse_suite()?,
            });
        }
        if handlers.is_empty() {
            return Err(self.error("expected 'except' block"));
        }
        if self.check_kw("finally") || self.check_kw("else") {
            return Err(self.error("'try' supports only 'except' clauses"));
        }
        Ok(StmtKind::Try { body, handlers })
    }

    // ----- expressions ------------------------------------------------------

    fn parse_exprlist(&mut self) -> Result<Expr> {
        let first = self.parse_test()?;
        if !self.check_op(",") {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_op(",") {
            if self.at_statement_end() || self.check_op("=") || self.check_op(")") {
                break;
            }
            items.push(self.parse_test()?);
        }
        Ok(Expr::Tuple(items))
    }

    fn parse_test(&mut self) -> Result<Expr> {
        let then = self.parse_or()?;
        if self.eat_kw("if") {
            let cond = self.parse_or()?;
            self.expect_kw("else")?;
            let otherwise = self.parse_test()?;
            return Ok(Expr::IfExp {
                cond: Box::new(cond),
                then: Box::new(then),
                otherwise: Box::new(otherwise),
            });
        }
        Ok(then)
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut left = self.parse_and()?;
        while self.eat_kw("or") {
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut left = self.parse_not()?;
        while self.eat_kw("and") {
            let right = self.parse_not()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr> {
        if self.eat_kw("not") {
            let operand = self.parse_not()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            });
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        let first = self.parse_arith()?;
        let mut rest = Vec::new();
        while let Some(op) = self.comparison_op() {
            rest.push((op, self.parse_arith()?));
        }
        if rest.is_empty() {
            Ok(first)
        } else {
            Ok(Expr::Compare {
                first: Box::new(first),
                rest,
            })
        }
    }

    fn comparison_op(&mut self) -> Option<CmpOp> {
        let next_is = |parser: &Self, word: &str| {
            matches!(parser.peek_at(1), Tok::Name(next) if next == word)
        };
        let op = match self.peek().clone() {
            Tok::Op("==") => CmpOp::Eq,
            Tok::Op("!=") => CmpOp::NotEq,
            Tok::Op("<") => CmpOp::Lt,
            Tok::Op("<=") => CmpOp::LtE,
            Tok::Op(">") => CmpOp::Gt,
            Tok::Op(">=") => CmpOp::GtE,
            Tok::Name(name) if name == "in" => CmpOp::In,
            Tok::Name(name) if name == "not" => {
                if next_is(self, "in") {
                    self.advance();
                    CmpOp::NotIn
                } else {
                    return None;
                }
            }
            Tok::Name(name) if name == "is" => {
                if next_is(self, "not") {
                    self.advance();
                    CmpOp::IsNot
                } else {
                    CmpOp::Is
                }
            }
            _ => return None,
        };
        self.advance();
        Some(op)
    }

    fn parse_arith(&mut self) -> Result<Expr> {
        let mut left = self.parse_term()?;
        loop {
            let op = if self.eat_op("+") {
                BinOp::Add
            } else if self.eat_op("-") {
                BinOp::Sub
            } else {
                break;
            };
            let right = self.parse_term()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> Result<Expr> {
        let mut left = self.parse_factor()?;
        loop {
            let op = if self.eat_op("*") {
                BinOp::Mul
            } else if self.eat_op("/") {
                BinOp::Div
            } else if self.eat_op("//") {
                BinOp::FloorDiv
            } else if self.eat_op("%") {
                BinOp::Mod
            } else {
                break;
            };
            let right = self.parse_factor()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_factor(&mut self) -> Result<Expr> {
        let op = if self.eat_op("-") {
            UnaryOp::Neg
        } else if self.eat_op("+") {
            UnaryOp::Pos
        } else {
            return self.parse_power();
        };
        let operand = self.parse_factor()?;
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    fn parse_power(&mut self) -> Result<Expr> {
        let base = self.parse_postfix()?;
        if self.eat_op("**") {
            let exponent = self.parse_factor()?;
            return Ok(binary(BinOp::Pow, base, exponent));
        }
        Ok(base)
    }

    fn parse_postfix(&mut self) -> Result<Expr> {
        let mut expr = self.parse_atom()?;
        loop {
            if self.eat_op("(") {
                let (args, kwargs) = self.parse_call_args()?;
                expr = Expr::Call {
                    func: Box::new(expr),
                    args,
                    kwargs,
                };
            } else if self.eat_op("[") {
                expr = self.parse_subscript(expr)?;
            } else if self.eat_op(".") {
                let name = self.expect_name()?;
                expr = Expr::Attribute {
                    object: Box::new(expr),
                    name,
                };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_call_args(&mut self) -> Result<(Vec<Expr>, Vec<(String, Expr)>)> {
        let mut args = Vec::new();
        let mut kwargs: Vec<(String, Expr)> = Vec::new();
        while !self.check_op(")") {
            let is_keyword = matches!(self.peek(), Tok::Name(_))
                && matches!(self.peek_at(1), Tok::Op("="));
            if is_keyword {
                let name = self.expect_name()?;
                self.expect_op("=")?;
                kwargs.push((name, self.parse_test()?));
            } else {
                if !kwargs.is_empty() {
                    return Err(self.error("positional argument follows keyword argument"));
                }
                args.push(self.parse_test()?);
            }
            if !self.eat_op(",") {
                break;
            }
        }
        self.expect_op(")")?;
        Ok((args, kwargs))
    }

    fn parse_subscript(&mut self, object: Expr) -> Result<Expr> {
        let start = if self.check_op(":") {
            None
        } else {
            Some(self.parse_test()?)
        };
        if self.eat_op(":") {
            let stop = if self.check_op("]") {
                None
            } else {
                Some(Box::new(self.parse_test()?))
            };
            self.expect_op("]")?;
            return Ok(Expr::Slice {
                object: Box::new(object),
                start: start.map(Box::new),
                stop,
            });
        }
        self.expect_op("]")?;
        let index = start.ok_or_else(|| self.error("expected subscript"))?;
        Ok(Expr::Index {
            object: Box::new(object),
            index: Box::new(index),
        })
    }

    fn parse_atom(&mut self) -> Result<Expr> {
        let line = self.line();
        match self.peek().clone() {
            Tok::Int(value) => {
                self.advance();
                Ok(Expr::Int(value))
            }
            Tok::Float(value) => {
                self.advance();
                Ok(Expr::Float(value))
            }
            Tok::Str(_) | Tok::FStr(_) => self.parse_string_run(line),
            Tok::Name(name) => match name.as_str() {
                "True" => {
                    self.advance();
                    Ok(Expr::Bool(true))
                }
                "False" => {
                    self.advance();
                    Ok(Expr::Bool(false))
                }
                "None" => {
                    self.advance();
                    Ok(Expr::None)
                }
                _ => Ok(Expr::Name(self.expect_name()?)),
            },
            Tok::Op("(") => {
                self.advance();
                if self.eat_op(")") {
                    return Ok(Expr::Tuple(Vec::new()));
                }
                let first = self.parse_test()?;
                if self.eat_op(")") {
                    return Ok(first);
                }
                let mut items = vec![first];
                while self.eat_op(",") {
                    if self.check_op(")") {
                        break;
                    }
                    items.push(self.parse_test()?);
                }
                self.expect_op(")")?;
                Ok(Expr::Tuple(items))
            }
            Tok::Op("[") => {
                self.advance();
                if self.eat_op("]") {
                    return Ok(Expr::List(Vec::new()));
                }
                let first = self.parse_test()?;
                if self.eat_kw("for") {
                    let target = self.parse_target_list()?;
                    self.expect_kw("in")?;
                    let iter = self.parse_or()?;
                    let cond = if self.eat_kw("if") {
                        Some(Box::new(self.parse_or()?))
                    } else {
                        None
                    };
                    self.expect_op("]")?;
                    return Ok(Expr::ListComp {
                        element: Box::new(first),
                        target: Box::new(target),
                        iter: Box::new(iter),
                        cond,
                    });
                }
                let mut items = vec![first];
                while self.eat_op(",") {
                    if self.check_op("]") {
                        break;
                    }
                    items.push(self.parse_test()?);
                }
                self.expect_op("]")?;
                Ok(Expr::List(items))
            }
            Tok::Op("{") => {
                self.advance();
                let mut entries = Vec::new();
                while !self.check_op("}") {
                    let key = self.parse_test()?;
                    self.expect_op(":")?;
                    let value = self.parse_test()?;
                    entries.push((key, value));
                    if !self.eat_op(",") {
                        break;
                    }
                }
                self.expect_op("}")?;
                Ok(Expr::Dict(entries))
            }
            _ => Err(self.error("invalid syntax")),
        }
    }

    /// Adjacent string literals concatenate, f-strings included.
    fn parse_string_run(&mut self, line: usize) -> Result<Expr> {
        let mut parts: Vec<FPart> = Vec::new();
        let mut formatted = false;
        loop {
            match self.peek().clone() {
                Tok::Str(text) => {
                    self.advance();
                    parts.push(FPart::Lit(text));
                }
                Tok::FStr(text) => {
                    self.advance();
                    formatted = true;
                    parts.extend(parse_fstring(&text, line)?);
                }
                _ => break,
            }
        }
        if formatted {
            return Ok(Expr::FString(parts));
        }
        let text = parts
            .into_iter()
            .map(|part| match part {
                FPart::Lit(text) => text,
                FPart::Expr(..) => String::new(),
            })
            .collect();
        Ok(Expr::Str(text))
    }
}

fn binary(op: BinOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

/// Split an f-string body into literal text and replacement fields.
fn parse_fstring(body: &str, line: usize) -> Result<Vec<FPart>> {
    let chars: Vec<char> = body.chars().collect();
    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut i = 0;
    while i < chars.len() {
        let ch = chars[i];
        if ch == '{' && chars.get(i + 1) == Some(&'{') {
            literal.push('{');
            i += 2;
            continue;
        }
        if ch == '}' && chars.get(i + 1) == Some(&'}') {
            literal.push('}');
            i += 2;
            continue;
        }
        if ch == '}' {
            return Err(ScriptError::syntax(
                line,
                "f-string: single '}' is not allowed",
            ));
        }
        if ch != '{' {
            literal.push(ch);
            i += 1;
            continue;
        }

        // Scan to the matching close brace, skipping nested brackets and quotes.
        let start = i + 1;
        let mut depth = 0usize;
        let mut quote: Option<char> = None;
        let mut spec_at: Option<usize> = None;
        let mut j = start;
        loop {
            let c = *chars
                .get(j)
                .ok_or_else(|| ScriptError::syntax(line, "f-string: expecting '}'"))?;
            match quote {
                Some(q) if c == q => quote = None,
                Some(_) => {}
                None => match c {
                    '\'' | '"' => quote = Some(c),
                    '(' | '[' | '{' => depth += 1,
                    ')' | ']' => depth = depth.saturating_sub(1),
                    '}' if depth > 0 => depth -= 1,
                    '}' => break,
                    ':' if depth == 0 && spec_at.is_none() => spec_at = Some(j),
                    _ => {}
                },
            }
            j += 1;
        }

        let expr_end = spec_at.unwrap_or(j);
        let expr_text: String = chars[start..expr_end].iter().collect();
        if expr_text.trim().is_empty() {
            return Err(ScriptError::syntax(
                line,
                "f-string: empty expression not allowed",
            ));
        }
        let spec = spec_at.map(|at| chars[at + 1..j].iter().collect::<String>());

        if !literal.is_empty() {
            parts.push(FPart::Lit(std::mem::take(&mut literal)));
        }
        parts.push(FPart::Expr(parse_expression(expr_text.trim(), line)?, spec));
        i = j + 1;
    }
    if !literal.is_empty() {
        parts.push(FPart::Lit(literal));
    }
    Ok(parts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_assignment_and_call() {
        let program = parse_program("answer = input('Q: ')\nprint(answer)\n").expect("parse");
        assert_eq!(program.body.len(), 2);
        assert!(matches!(program.body[0].kind, StmtKind::Assign { .. }));
        assert_eq!(program.body[1].line, 2);
    }

    #[test]
    fn parses_nested_blocks() {
        let src = "def f(n):\n    if n > 1:\n        return n\n    else:\n        return 0\nprint(f(3))\n";
        let program = parse_program(src).expect("parse");
        assert_eq!(program.body.len(), 2);
        match &program.body[0].kind {
            StmtKind::Def(def) => {
                assert_eq!(def.name, "f");
                assert_eq!(def.params.len(), 1);
                assert_eq!(def.body.len(), 1);
            }
            other => panic!("expected def, got {other:?}"),
        }
    }

    #[test]
    fn parses_fstring_fields_with_spec() {
        let program = parse_program("x = f'{a} and {b:.2f}!'\n").expect("parse");
        match &program.body[0].kind {
            StmtKind::Assign { value: Expr::FString(parts), .. } => {
                assert_eq!(parts.len(), 4);
                assert!(matches!(&parts[2], FPart::Expr(_, Some(spec)) if spec == ".2f"));
            }
            other => panic!("expected f-string assignment, got {other:?}"),
        }
    }

    #[test]
    fn rejects_assignment_to_call() {
        let err = parse_program("f() = 1\n").unwrap_err();
        assert_eq!(err.kind, "SyntaxError");
    }

    #[test]
    fn rejects_missing_block() {
        let err = parse_program("if x:\nprint(1)\n").unwrap_err();
        assert_eq!(err.kind, "IndentationError");
    }

    #[test]
    fn parses_tuple_unpacking_for_loop() {
        let program = parse_program("for k, v in d.items():\n    print(k, v)\n").expect("parse");
        assert!(matches!(
            &program.body[0].kind,
            StmtKind::For { target: Target::Unpack(items), .. } if items.len() == 2
        ));
    }
}
