//! Parser for the JSX subset accepted in component previews.
//!
//! The parser works directly on characters: JSX text and expression syntax
//! interleave too freely for a separate token pass. TypeScript annotations,
//! `interface` and `type` declarations, and `import` statements are skipped.
//! Unsupported constructs are reported as [`TransformError`]s with a position.

use std::sync::Arc;

use tracing::debug;

use super::render::ComponentFactory;
use super::syntax::{
    BinaryOp, Body, Expr, Function, Item, JsxAttribute, JsxChild, JsxElement, LogicalOp, Module,
    ObjectEntry, Param, Pattern, PropPattern, Stmt, TemplatePart, UnaryOp,
};
use super::{SourceLocation, Transform, TransformError};

type Result<T> = std::result::Result<T, TransformError>;

/// Longest operators first so that greedy matching picks `===` over `==`.
const OPERATORS: &[&str] = &[
    "===", "!==", "...", "=>", "==", "!=", "<=", ">=", "&&", "||", "??", "?.", "+", "-", "*",
    "/", "%", "<", ">", "=", "!", "?", ":", ".", ",", ";", "(", ")", "[", "]", "{", "}",
];

const UNSUPPORTED_STATEMENTS: &[&str] = &[
    "for", "while", "do", "switch", "class", "try", "throw", "with",
];

/// Default [`Transform`]: parses a JSX module and selects an export.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsxTransform;

impl Transform for JsxTransform {
    fn transform(
        &self,
        source: &str,
        export_name: Option<&str>,
    ) -> std::result::Result<ComponentFactory, TransformError> {
        let module = parse_module(source)?;
        let entry = select_export(&module, export_name)?;
        debug!(
            entry = %entry,
            components = module.components().len(),
            "component module transformed"
        );
        Ok(ComponentFactory::new(entry, Arc::new(module)))
    }
}

/// Parse component source into a [`Module`].
pub fn parse_module(source: &str) -> Result<Module> {
    Parser::new(source).module()
}

/// Resolve the local name to render.
///
/// A requested name is looked up as `default`, then among named exports,
/// then among top-level bindings. Without a name the default export is used,
/// or the only component when there is exactly one.
pub fn select_export(module: &Module, export_name: Option<&str>) -> Result<String> {
    let local = match export_name {
        Some("default") | None if module.default_export.is_some() => {
            module.default_export.clone().unwrap_or_default()
        }
        Some(name) => {
            if let Some((_, local)) = module.exports.iter().find(|(exported, _)| exported == name)
            {
                local.clone()
            } else if module.binds(name) {
                name.to_string()
            } else {
                return Err(TransformError::new(format!(
                    "Export '{name}' not found; available components: {}",
                    list_or_none(&module.components())
                )));
            }
        }
        None => match module.components().as_slice() {
            [only] => only.to_string(),
            [] => return Err(TransformError::new("No component found in module")),
            many => {
                return Err(TransformError::new(format!(
                    "Module has no default export; choose one of: {}",
                    many.join(", ")
                )));
            }
        },
    };
    if !module.binds(&local) {
        return Err(TransformError::new(format!("'{local}' is exported but never defined")));
    }
    Ok(local)
}

fn list_or_none(names: &[&str]) -> String {
    if names.is_empty() {
        "none".to_string()
    } else {
        names.join(", ")
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
        }
    }

    // ---- low-level scanning -------------------------------------------

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn starts_with(&self, text: &str) -> bool {
        let mut at = self.pos;
        for c in text.chars() {
            if self.chars.get(at) != Some(&c) {
                return false;
            }
            at += 1;
        }
        true
    }

    fn location(&self, pos: usize) -> SourceLocation {
        let before = &self.chars[..pos.min(self.chars.len())];
        let line = 1 + before.iter().filter(|&&c| c == '\n').count();
        let line_start = before
            .iter()
            .rposition(|&c| c == '\n')
            .map_or(0, |idx| idx + 1);
        SourceLocation {
            line,
            column: pos - line_start + 1,
        }
    }

    fn error(&self, message: impl Into<String>) -> TransformError {
        self.error_at(self.pos, message)
    }

    fn error_at(&self, pos: usize, message: impl Into<String>) -> TransformError {
        TransformError::at(message, self.location(pos))
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => self.pos += 1,
                Some('/') if self.peek_at(1) == Some('/') => {
                    while !matches!(self.peek(), None | Some('\n')) {
                        self.pos += 1;
                    }
                }
                Some('/') if self.peek_at(1) == Some('*') => {
                    self.pos += 2;
                    while self.peek().is_some() && !self.starts_with("*/") {
                        self.pos += 1;
                    }
                    self.pos = (self.pos + 2).min(self.chars.len());
                }
                _ => break,
            }
        }
    }

    fn at_end(&mut self) -> bool {
        self.skip_trivia();
        self.pos >= self.chars.len()
    }

    fn describe(&mut self) -> String {
        self.skip_trivia();
        match self.peek() {
            None => "end of input".to_string(),
            Some(c) => format!("'{c}'"),
        }
    }

    fn peek_op(&mut self) -> Option<&'static str> {
        self.skip_trivia();
        OPERATORS.iter().find(|op| self.starts_with(op)).copied()
    }

    fn eat_op(&mut self, op: &str) -> bool {
        if self.peek_op() == Some(op) {
            self.pos += op.len();
            true
        } else {
            false
        }
    }

    fn expect_op(&mut self, op: &str) -> Result<()> {
        if self.eat_op(op) {
            Ok(())
        } else {
            let found = self.describe();
            Err(self.error(format!("Expected '{op}' but found {found}")))
        }
    }

    fn expect_char(&mut self, c: char) -> Result<()> {
        self.skip_trivia();
        if self.peek() == Some(c) {
            self.pos += 1;
            Ok(())
        } else {
            let found = self.describe();
            Err(self.error(format!("Expected '{c}' but found {found}")))
        }
    }

    fn scan_ident(&self) -> Option<usize> {
        match self.peek() {
            Some(c) if is_ident_start(c) => {
                let mut end = self.pos + 1;
                while self.chars.get(end).is_some_and(|&c| is_ident_char(c)) {
                    end += 1;
                }
                Some(end)
            }
            _ => None,
        }
    }

    fn peek_ident(&mut self) -> Option<String> {
        self.skip_trivia();
        self.scan_ident()
            .map(|end| self.chars[self.pos..end].iter().collect())
    }

    fn ident(&mut self) -> Option<String> {
        let name = self.peek_ident()?;
        self.pos += name.chars().count();
        Some(name)
    }

    fn expect_ident(&mut self, what: &str) -> Result<String> {
        match self.ident() {
            Some(name) => Ok(name),
            None => {
                let found = self.describe();
                Err(self.error(format!("Expected {what} but found {found}")))
            }
        }
    }

    fn check_kw(&mut self, keyword: &str) -> bool {
        self.peek_ident().as_deref() == Some(keyword)
    }

    fn eat_kw(&mut self, keyword: &str) -> bool {
        if self.check_kw(keyword) {
            self.pos += keyword.len();
            true
        } else {
            false
        }
    }

    // ---- module level -------------------------------------------------

    fn module(mut self) -> Result<Module> {
        let mut module = Module::default();
        while !self.at_end() {
            if self.eat_op(";") {
                continue;
            }
            if self.eat_kw("import") {
                self.skip_import()?;
                continue;
            }
            if self.eat_kw("export") {
                self.export(&mut module)?;
                continue;
            }
            if self.skip_type_declaration()? {
                continue;
            }
            if let Some(items) = self.declaration()? {
                module.items.extend(items);
                continue;
            }
            self.reject_unsupported_statement()?;
            // Top-level expression statements (e.g. `ReactDOM.render(...)`)
            // are parsed for validity but never evaluated.
            self.expression()?;
            self.eat_op(";");
        }
        Ok(module)
    }

    fn skip_import(&mut self) -> Result<()> {
        let start = self.pos;
        loop {
            self.skip_trivia();
            match self.peek() {
                None => return Err(self.error_at(start, "Unterminated import statement")),
                Some('"') | Some('\'') => {
                    self.string_literal()?;
                    self.eat_op(";");
                    return Ok(());
                }
                Some(_) => {
                    if self.ident().is_none() {
                        self.pos += 1;
                    }
                }
            }
        }
    }

    fn export(&mut self, module: &mut Module) -> Result<()> {
        if self.eat_kw("default") {
            let start = self.pos;
            if self.eat_kw("async") && !self.check_kw("function") {
                self.pos = start;
            }
            if self.check_kw("function") {
                let func = self.function_declaration(true)?;
                let local = match &func.name {
                    Some(name) => {
                        module.items.push(Item::Function(func.clone()));
                        name.clone()
                    }
                    None => {
                        module.items.push(Item::Const {
                            pattern: Pattern::Ident("default".to_string()),
                            value: Expr::Arrow(func),
                        });
                        "default".to_string()
                    }
                };
                module.default_export = Some(local);
                return Ok(());
            }
            if self.check_kw("class") {
                return Err(self.error("Class components are not supported"));
            }
            let expr = self.assignment()?;
            self.eat_op(";");
            let local = match expr {
                Expr::Ident(name) => name,
                other => {
                    module.items.push(Item::Const {
                        pattern: Pattern::Ident("default".to_string()),
                        value: other,
                    });
                    "default".to_string()
                }
            };
            module.default_export = Some(local);
            return Ok(());
        }

        if self.eat_op("{") {
            loop {
                if self.eat_op("}") {
                    break;
                }
                let local = self.expect_ident("exported name")?;
                let exported = if self.eat_kw("as") {
                    self.expect_ident("export alias")?
                } else {
                    local.clone()
                };
                if exported == "default" {
                    module.default_export = Some(local.clone());
                }
                module.exports.push((exported, local));
                if !self.eat_op(",") {
                    self.expect_op("}")?;
                    break;
                }
            }
            if self.check_kw("from") {
                return Err(self.error("Re-exports from other modules are not supported"));
            }
            self.eat_op(";");
            return Ok(());
        }

        if self.skip_type_declaration()? {
            return Ok(());
        }
        if let Some(items) = self.declaration()? {
            for item in &items {
                let names: Vec<String> = match item {
                    Item::Function(func) => func.name.iter().cloned().collect(),
                    Item::Const { pattern, .. } => {
                        pattern.names().into_iter().map(str::to_string).collect()
                    }
                };
                module
                    .exports
                    .extend(names.into_iter().map(|name| (name.clone(), name)));
            }
            module.items.extend(items);
            return Ok(());
        }
        if self.check_kw("class") {
            return Err(self.error("Class components are not supported"));
        }
        let found = self.describe();
        Err(self.error(format!("Unsupported export starting at {found}")))
    }

    /// `interface X {...}` and `type X = ...;` are skipped entirely.
    fn skip_type_declaration(&mut self) -> Result<bool> {
        let start = self.pos;
        if self.eat_kw("interface") {
            self.expect_ident("interface name")?;
            while !self.at_end() && self.peek() != Some('{') {
                self.pos += 1;
            }
            self.skip_balanced('{', '}')?;
            return Ok(true);
        }
        if self.eat_kw("type") {
            if self.ident().is_some() {
                if self.peek_op() == Some("<") {
                    self.skip_balanced('<', '>')?;
                }
                if self.eat_op("=") {
                    self.skip_type(&[";"])?;
                    self.eat_op(";");
                    return Ok(true);
                }
            }
            self.pos = start;
        }
        Ok(false)
    }

    fn skip_balanced(&mut self, open: char, close: char) -> Result<()> {
        let start = self.pos;
        self.expect_char(open)?;
        let mut depth = 1usize;
        while depth > 0 {
            match self.peek() {
                None => return Err(self.error_at(start, format!("Unclosed '{open}'"))),
                Some(c) if c == open => depth += 1,
                Some(c) if c == close => depth -= 1,
                _ => {}
            }
            self.pos += 1;
        }
        Ok(())
    }

    /// Skip a type annotation up to one of `stops` at nesting depth zero.
    fn skip_type(&mut self, stops: &[&str]) -> Result<()> {
        let start = self.pos;
        let mut depth = 0usize;
        loop {
            self.skip_trivia();
            let Some(c) = self.peek() else {
                return Err(self.error_at(start, "Unterminated type annotation"));
            };
            if depth == 0 {
                if let Some(op) = self.peek_op() {
                    if stops.contains(&op) {
                        return Ok(());
                    }
                }
            }
            if self.starts_with("=>") {
                self.pos += 2;
                continue;
            }
            match c {
                '(' | '[' | '{' | '<' => depth += 1,
                ')' | ']' | '}' | '>' => {
                    if depth == 0 {
                        return Ok(());
                    }
                    depth -= 1;
                }
                '"' | '\'' => {
                    self.string_literal()?;
                    continue;
                }
                ';' if depth == 0 => return Ok(()),
                _ => {}
            }
            self.pos += 1;
        }
    }

    fn reject_unsupported_statement(&mut self) -> Result<()> {
        if let Some(word) = self.peek_ident() {
            if UNSUPPORTED_STATEMENTS.contains(&word.as_str()) {
                return Err(self.error(format!("Unsupported statement '{word}'")));
            }
        }
        Ok(())
    }

    /// `function`, `const`, `let` or `var` at the current position.
    fn declaration(&mut self) -> Result<Option<Vec<Item>>> {
        let start = self.pos;
        if self.eat_kw("async") && !self.check_kw("function") {
            self.pos = start;
        }
        if self.check_kw("function") {
            let func = self.function_declaration(false)?;
            return Ok(Some(vec![Item::Function(func)]));
        }
        if self.eat_kw("const") || self.eat_kw("let") || self.eat_kw("var") {
            let items = self
                .declarators()?
                .into_iter()
                .map(|(pattern, init)| Item::Const {
                    pattern,
                    value: init.unwrap_or(Expr::Undefined),
                })
                .collect();
            self.eat_op(";");
            return Ok(Some(items));
        }
        Ok(None)
    }

    fn declarators(&mut self) -> Result<Vec<(Pattern, Option<Expr>)>> {
        let mut out = Vec::new();
        loop {
            let pattern = self.pattern()?;
            if self.eat_op(":") {
                self.skip_type(&["=", ",", ";"])?;
            }
            let init = if self.eat_op("=") {
                Some(self.assignment()?)
            } else {
                None
            };
            out.push((pattern, init));
            if !self.eat_op(",") {
                return Ok(out);
            }
        }
    }

    fn function_declaration(&mut self, anonymous_ok: bool) -> Result<Arc<Function>> {
        if !self.eat_kw("function") {
            return Err(self.error("Expected 'function'"));
        }
        self.eat_op("*");
        let name = match self.ident() {
            Some(name) => Some(name),
            None if anonymous_ok => None,
            None => {
                let found = self.describe();
                return Err(self.error(format!("Expected function name but found {found}")));
            }
        };
        if self.peek_op() == Some("<") {
            self.skip_balanced('<', '>')?;
        }
        let params = self.params()?;
        if self.eat_op(":") {
            self.skip_type(&["{"])?;
        }
        let body = self.block()?;
        Ok(Arc::new(Function {
            name,
            params,
            body: Body::Block(body),
        }))
    }

    fn params(&mut self) -> Result<Vec<Param>> {
        self.expect_op("(")?;
        let mut params = Vec::new();
        loop {
            if self.eat_op(")") {
                return Ok(params);
            }
            let pattern = self.pattern()?;
            self.eat_op("?");
            if self.eat_op(":") {
                self.skip_type(&[",", ")", "="])?;
            }
            let default = if self.eat_op("=") {
                Some(self.assignment()?)
            } else {
                None
            };
            params.push(Param { pattern, default });
            if !self.eat_op(",") {
                self.expect_op(")")?;
                return Ok(params);
            }
        }
    }

    fn pattern(&mut self) -> Result<Pattern> {
        if self.eat_op("{") {
            let mut props = Vec::new();
            let mut rest = None;
            loop {
                if self.eat_op("}") {
                    break;
                }
                if self.eat_op("...") {
                    rest = Some(self.expect_ident("rest binding")?);
                    self.eat_op(",");
                    self.expect_op("}")?;
                    break;
                }
                let key = self.expect_ident("property name")?;
                let local = if self.eat_op(":") {
                    if matches!(self.peek_op(), Some("{") | Some("[")) {
                        return Err(self.error("Nested destructuring is not supported"));
                    }
                    self.expect_ident("binding name")?
                } else {
                    key.clone()
                };
                let default = if self.eat_op("=") {
                    Some(self.assignment()?)
                } else {
                    None
                };
                props.push(PropPattern {
                    key,
                    local,
                    default,
                });
                if !self.eat_op(",") {
                    self.expect_op("}")?;
                    break;
                }
            }
            return Ok(Pattern::Object { props, rest });
        }
        if self.eat_op("[") {
            let mut slots = Vec::new();
            loop {
                if self.eat_op("]") {
                    break;
                }
                if self.eat_op(",") {
                    slots.push(None);
                    continue;
                }
                slots.push(Some(self.expect_ident("binding name")?));
                if !self.eat_op(",") {
                    self.expect_op("]")?;
                    break;
                }
            }
            return Ok(Pattern::Array(slots));
        }
        Ok(Pattern::Ident(self.expect_ident("binding name")?))
    }

    // ---- statements ---------------------------------------------------

    fn block(&mut self) -> Result<Vec<Stmt>> {
        let start = self.pos;
        self.expect_op("{")?;
        let mut stmts = Vec::new();
        loop {
            if self.at_end() {
                return Err(self.error_at(start, "Unterminated block"));
            }
            if self.eat_op("}") {
                return Ok(stmts);
            }
            stmts.extend(self.statement()?);
        }
    }

    fn statement(&mut self) -> Result<Vec<Stmt>> {
        if self.eat_op(";") {
            return Ok(Vec::new());
        }
        if self.eat_kw("return") {
            self.skip_trivia();
            if matches!(self.peek(), Some(';') | Some('}') | None) {
                self.eat_op(";");
                return Ok(vec![Stmt::Return(None)]);
            }
            let value = self.expression()?;
            self.eat_op(";");
            return Ok(vec![Stmt::Return(Some(value))]);
        }
        if self.eat_kw("if") {
            self.expect_op("(")?;
            let cond = self.expression()?;
            self.expect_op(")")?;
            let then = self.branch()?;
            let otherwise = if self.eat_kw("else") {
                self.branch()?
            } else {
                Vec::new()
            };
            return Ok(vec![Stmt::If {
                cond,
                then,
                otherwise,
            }]);
        }
        if self.skip_type_declaration()? {
            return Ok(Vec::new());
        }
        if let Some(items) = self.declaration()? {
            return Ok(items
                .into_iter()
                .map(|item| match item {
                    Item::Function(func) => Stmt::Function(func),
                    Item::Const { pattern, value } => Stmt::Let {
                        pattern,
                        init: Some(value),
                    },
                })
                .collect());
        }
        self.reject_unsupported_statement()?;
        let expr = self.expression()?;
        self.eat_op(";");
        Ok(vec![Stmt::Expr(expr)])
    }

    fn branch(&mut self) -> Result<Vec<Stmt>> {
        if self.peek_op() == Some("{") {
            self.block()
        } else {
            self.statement()
        }
    }

    // ---- expressions --------------------------------------------------

    fn expression(&mut self) -> Result<Expr> {
        self.assignment()
    }

    fn assignment(&mut self) -> Result<Expr> {
        if let Some(arrow) = self.try_arrow()? {
            return Ok(arrow);
        }
        let cond = self.logical_or()?;
        if self.peek_op() == Some("?") {
            self.pos += 1;
            let then = self.assignment()?;
            self.expect_op(":")?;
            let otherwise = self.assignment()?;
            return Ok(Expr::Conditional {
                cond: Box::new(cond),
                then: Box::new(then),
                otherwise: Box::new(otherwise),
            });
        }
        if self.peek_op() == Some("=") {
            return Err(self.error("Assignment expressions are not supported"));
        }
        Ok(cond)
    }

    /// Arrow functions need lookahead; parse speculatively and rewind.
    fn try_arrow(&mut self) -> Result<Option<Expr>> {
        self.skip_trivia();
        let start = self.pos;
        if self.eat_kw("async") && self.peek_op() != Some("(") && self.peek_ident().is_none() {
            self.pos = start;
        }
        let after_async = self.pos;

        if let Some(name) = self.ident() {
            if self.eat_op("=>") {
                let body = self.arrow_body()?;
                return Ok(Some(Expr::Arrow(Arc::new(Function {
                    name: None,
                    params: vec![Param {
                        pattern: Pattern::Ident(name),
                        default: None,
                    }],
                    body,
                }))));
            }
            self.pos = start;
            return Ok(None);
        }

        self.pos = after_async;
        if self.peek_op() == Some("(") {
            if let Ok(params) = self.params() {
                let annotated = !self.eat_op(":") || self.skip_type(&["=>"]).is_ok();
                if annotated && self.eat_op("=>") {
                    let body = self.arrow_body()?;
                    return Ok(Some(Expr::Arrow(Arc::new(Function {
                        name: None,
                        params,
                        body,
                    }))));
                }
            }
        }
        self.pos = start;
        Ok(None)
    }

    fn arrow_body(&mut self) -> Result<Body> {
        if self.peek_op() == Some("{") {
            Ok(Body::Block(self.block()?))
        } else {
            Ok(Body::Expr(self.assignment()?))
        }
    }

    fn logical_or(&mut self) -> Result<Expr> {
        let mut left = self.logical_and()?;
        loop {
            let op = match self.peek_op() {
                Some("||") => LogicalOp::Or,
                Some("??") => LogicalOp::Nullish,
                _ => return Ok(left),
            };
            self.pos += 2;
            let right = self.logical_and()?;
            left = Expr::Logical {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
    }

    fn logical_and(&mut self) -> Result<Expr> {
        let mut left = self.equality()?;
        while self.eat_op("&&") {
            let right = self.equality()?;
            left = Expr::Logical {
                op: LogicalOp::And,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn binary_level(
        &mut self,
        table: &[(&str, BinaryOp)],
        next: fn(&mut Self) -> Result<Expr>,
    ) -> Result<Expr> {
        let mut left = next(self)?;
        loop {
            let Some(op) = self.peek_op() else {
                return Ok(left);
            };
            let Some(&(text, op)) = table.iter().find(|(text, _)| *text == op) else {
                return Ok(left);
            };
            self.pos += text.len();
            let right = next(self)?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
    }

    fn equality(&mut self) -> Result<Expr> {
        self.binary_level(
            &[
                ("===", BinaryOp::StrictEq),
                ("!==", BinaryOp::StrictNe),
                ("==", BinaryOp::LooseEq),
                ("!=", BinaryOp::LooseNe),
            ],
            Self::relational,
        )
    }

    fn relational(&mut self) -> Result<Expr> {
        self.binary_level(
            &[
                ("<", BinaryOp::Lt),
                (">", BinaryOp::Gt),
                ("<=", BinaryOp::Le),
                (">=", BinaryOp::Ge),
            ],
            Self::additive,
        )
    }

    fn additive(&mut self) -> Result<Expr> {
        self.binary_level(
            &[("+", BinaryOp::Add), ("-", BinaryOp::Sub)],
            Self::multiplicative,
        )
    }

    fn multiplicative(&mut self) -> Result<Expr> {
        self.binary_level(
            &[
                ("*", BinaryOp::Mul),
                ("/", BinaryOp::Div),
                ("%", BinaryOp::Rem),
            ],
            Self::unary,
        )
    }

    fn unary(&mut self) -> Result<Expr> {
        let op = match self.peek_op() {
            Some("!") => Some(UnaryOp::Not),
            Some("-") => Some(UnaryOp::Neg),
            Some("+") => Some(UnaryOp::Plus),
            _ => None,
        };
        if let Some(op) = op {
            self.pos += 1;
            let operand = self.unary()?;
            return Ok(Expr::Unary {
                op,
                operand: Box::new(operand),
            });
        }
        if self.eat_kw("typeof") {
            let operand = self.unary()?;
            return Ok(Expr::Unary {
                op: UnaryOp::TypeOf,
                operand: Box::new(operand),
            });
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr> {
        let mut expr = self.primary()?;
        loop {
            if self.check_kw("as") {
                self.pos += 2;
                self.skip_type(&[",", ";", ":", "?", "&&", "||", "??", "=>"])?;
                continue;
            }
            match self.peek_op() {
                Some(".") => {
                    self.pos += 1;
                    let property = self.expect_ident("property name")?;
                    expr = Expr::Member {
                        object: Box::new(expr),
                        property,
                        optional: false,
                    };
                }
                Some("?.") => {
                    self.pos += 2;
                    if self.peek_op() == Some("(") {
                        let args = self.arguments()?;
                        expr = Expr::Call {
                            callee: Box::new(expr),
                            args,
                        };
                    } else if self.eat_op("[") {
                        let index = self.expression()?;
                        self.expect_op("]")?;
                        expr = Expr::Index {
                            object: Box::new(expr),
                            index: Box::new(index),
                        };
                    } else {
                        let property = self.expect_ident("property name")?;
                        expr = Expr::Member {
                            object: Box::new(expr),
                            property,
                            optional: true,
                        };
                    }
                }
                Some("[") => {
                    self.pos += 1;
                    let index = self.expression()?;
                    self.expect_op("]")?;
                    expr = Expr::Index {
                        object: Box::new(expr),
                        index: Box::new(index),
                    };
                }
                Some("(") => {
                    let args = self.arguments()?;
                    expr = Expr::Call {
                        callee: Box::new(expr),
                        args,
                    };
                }
                // TypeScript non-null assertion
                Some("!") => self.pos += 1,
                _ => return Ok(expr),
            }
        }
    }

    fn arguments(&mut self) -> Result<Vec<Expr>> {
        self.expect_op("(")?;
        let mut args = Vec::new();
        loop {
            if self.eat_op(")") {
                return Ok(args);
            }
            if self.peek_op() == Some("...") {
                return Err(self.error("Spread arguments are not supported"));
            }
            args.push(self.assignment()?);
            if !self.eat_op(",") {
                self.expect_op(")")?;
                return Ok(args);
            }
        }
    }

    fn primary(&mut self) -> Result<Expr> {
        self.skip_trivia();
        let start = self.pos;
        let Some(c) = self.peek() else {
            return Err(self.error("Unexpected end of input"));
        };
        match c {
            '0'..='9' => self.number(),
            '.' if self.peek_at(1).is_some_and(|d| d.is_ascii_digit()) => self.number(),
            '"' | '\'' => Ok(Expr::Str(self.string_literal()?)),
            '`' => self.template(),
            '(' => {
                self.pos += 1;
                let inner = self.expression()?;
                self.expect_op(")")?;
                Ok(inner)
            }
            '[' => self.array_literal(),
            '{' => self.object_literal(),
            '<' => Ok(Expr::Element(Arc::new(self.jsx_element()?))),
            c if is_ident_start(c) => {
                let word = self.ident().unwrap_or_default();
                match word.as_str() {
                    "true" => Ok(Expr::Bool(true)),
                    "false" => Ok(Expr::Bool(false)),
                    "null" => Ok(Expr::Null),
                    "undefined" => Ok(Expr::Undefined),
                    "function" => {
                        self.pos = start;
                        Ok(Expr::Arrow(self.function_declaration(true)?))
                    }
                    "new" | "this" | "class" | "await" | "yield" => {
                        Err(self.error_at(start, format!("'{word}' is not supported")))
                    }
                    _ => Ok(Expr::Ident(word)),
                }
            }
            other => Err(self.error(format!("Unexpected character '{other}'"))),
        }
    }

    fn number(&mut self) -> Result<Expr> {
        let start = self.pos;
        if self.starts_with("0x") || self.starts_with("0X") {
            self.pos += 2;
            let digits_start = self.pos;
            while self.peek().is_some_and(|c| c.is_ascii_hexdigit() || c == '_') {
                self.pos += 1;
            }
            let digits: String = self.chars[digits_start..self.pos]
                .iter()
                .filter(|&&c| c != '_')
                .collect();
            return u64::from_str_radix(&digits, 16)
                .map(|n| Expr::Number(n as f64))
                .map_err(|_| self.error_at(start, "Invalid hexadecimal literal"));
        }
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_digit() || c == '.' || c == '_')
        {
            self.pos += 1;
        }
        if matches!(self.peek(), Some('e') | Some('E')) {
            self.pos += 1;
            if matches!(self.peek(), Some('+') | Some('-')) {
                self.pos += 1;
            }
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.pos += 1;
            }
        }
        let text: String = self.chars[start..self.pos]
            .iter()
            .filter(|&&c| c != '_')
            .collect();
        text.parse::<f64>()
            .map(Expr::Number)
            .map_err(|_| self.error_at(start, format!("Invalid number literal '{text}'")))
    }

    fn escape(&mut self, start: usize) -> Result<char> {
        let Some(c) = self.peek() else {
            return Err(self.error_at(start, "Unterminated string literal"));
        };
        self.pos += 1;
        Ok(match c {
            'n' => '\n',
            't' => '\t',
            'r' => '\r',
            '0' => '\0',
            'u' => {
                let braced = self.peek() == Some('{');
                if braced {
                    self.pos += 1;
                }
                let digits_start = self.pos;
                while self.peek().is_some_and(|c| c.is_ascii_hexdigit())
                    && (braced || self.pos - digits_start < 4)
                {
                    self.pos += 1;
                }
                let digits: String = self.chars[digits_start..self.pos].iter().collect();
                if braced && self.peek() == Some('}') {
                    self.pos += 1;
                }
                u32::from_str_radix(&digits, 16)
                    .ok()
                    .and_then(char::from_u32)
                    .ok_or_else(|| self.error_at(digits_start, "Invalid unicode escape"))?
            }
            other => other,
        })
    }

    fn string_literal(&mut self) -> Result<String> {
        let start = self.pos;
        let Some(quote) = self.peek() else {
            return Err(self.error("Expected string literal"));
        };
        self.pos += 1;
        let mut out = String::new();
        loop {
            match self.peek() {
                None | Some('\n') => {
                    return Err(self.error_at(start, "Unterminated string literal"));
                }
                Some(c) if c == quote => {
                    self.pos += 1;
                    return Ok(out);
                }
                Some('\\') => {
                    self.pos += 1;
                    out.push(self.escape(start)?);
                }
                Some(c) => {
                    out.push(c);
                    self.pos += 1;
                }
            }
        }
    }

    fn template(&mut self) -> Result<Expr> {
        let start = self.pos;
        self.pos += 1;
        let mut parts = Vec::new();
        let mut lit = String::new();
        loop {
            match self.peek() {
                None => return Err(self.error_at(start, "Unterminated template literal")),
                Some('`') => {
                    self.pos += 1;
                    break;
                }
                Some('\\') => {
                    self.pos += 1;
                    lit.push(self.escape(start)?);
                }
                Some('$') if self.peek_at(1) == Some('{') => {
                    self.pos += 2;
                    if !lit.is_empty() {
                        parts.push(TemplatePart::Lit(std::mem::take(&mut lit)));
                    }
                    parts.push(TemplatePart::Expr(self.expression()?));
                    self.expect_char('}')?;
                }
                Some(c) => {
                    lit.push(c);
                    self.pos += 1;
                }
            }
        }
        if !lit.is_empty() {
            parts.push(TemplatePart::Lit(lit));
        }
        Ok(Expr::Template(parts))
    }

    fn array_literal(&mut self) -> Result<Expr> {
        self.expect_op("[")?;
        let mut items = Vec::new();
        loop {
            if self.eat_op("]") {
                return Ok(Expr::Array(items));
            }
            if self.peek_op() == Some("...") {
                return Err(self.error("Array spread is not supported"));
            }
            items.push(self.assignment()?);
            if !self.eat_op(",") {
                self.expect_op("]")?;
                return Ok(Expr::Array(items));
            }
        }
    }

    fn object_literal(&mut self) -> Result<Expr> {
        self.expect_op("{")?;
        let mut entries = Vec::new();
        loop {
            if self.eat_op("}") {
                return Ok(Expr::Object(entries));
            }
            if self.eat_op("...") {
                entries.push(ObjectEntry::Spread(self.assignment()?));
            } else {
                self.skip_trivia();
                let key = match self.peek() {
                    Some('"') | Some('\'') => self.string_literal()?,
                    Some(c) if c.is_ascii_digit() => match self.number()? {
                        Expr::Number(n) => crate::component::render::number_to_string(n),
                        _ => String::new(),
                    },
                    _ => self.expect_ident("property name")?,
                };
                let value = if self.eat_op(":") {
                    self.assignment()?
                } else if self.peek_op() == Some("(") {
                    return Err(self.error("Method shorthand is not supported"));
                } else {
                    Expr::Ident(key.clone())
                };
                entries.push(ObjectEntry::Prop(key, value));
            }
            if !self.eat_op(",") {
                self.expect_op("}")?;
                return Ok(Expr::Object(entries));
            }
        }
    }

    // ---- JSX ----------------------------------------------------------

    fn jsx_name(&mut self) -> Result<String> {
        self.skip_trivia();
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| is_ident_char(c) || matches!(c, '-' | ':' | '.'))
        {
            self.pos += 1;
        }
        if self.pos == start {
            let found = self.describe();
            return Err(self.error(format!("Expected JSX tag name but found {found}")));
        }
        Ok(self.chars[start..self.pos].iter().collect())
    }

    fn jsx_element(&mut self) -> Result<JsxElement> {
        self.skip_trivia();
        let open = self.pos;
        self.expect_char('<')?;
        self.skip_trivia();
        if self.peek() == Some('>') {
            self.pos += 1;
            let children = self.jsx_children(None, open)?;
            return Ok(JsxElement {
                name: None,
                attributes: Vec::new(),
                children,
            });
        }
        let name = self.jsx_name()?;
        let mut attributes = Vec::new();
        loop {
            self.skip_trivia();
            match self.peek() {
                Some('/') if self.peek_at(1) == Some('>') => {
                    self.pos += 2;
                    return Ok(JsxElement {
                        name: Some(name),
                        attributes,
                        children: Vec::new(),
                    });
                }
                Some('>') => {
                    self.pos += 1;
                    break;
                }
                Some('{') => {
                    self.pos += 1;
                    self.expect_op("...")?;
                    let spread = self.assignment()?;
                    self.expect_char('}')?;
                    attributes.push(JsxAttribute::Spread(spread));
                }
                Some(c) if is_ident_start(c) => {
                    let attr = self.jsx_name()?;
                    self.skip_trivia();
                    let value = if self.peek() == Some('=') {
                        self.pos += 1;
                        self.skip_trivia();
                        Some(self.jsx_attribute_value()?)
                    } else {
                        None
                    };
                    attributes.push(JsxAttribute::Named { name: attr, value });
                }
                None => {
                    return Err(self.error_at(open, format!("Unterminated JSX element <{name}>")));
                }
                Some(c) => {
                    return Err(self.error(format!("Unexpected character '{c}' in <{name}> tag")));
                }
            }
        }
        let children = self.jsx_children(Some(&name), open)?;
        Ok(JsxElement {
            name: Some(name),
            attributes,
            children,
        })
    }

    fn jsx_attribute_value(&mut self) -> Result<Expr> {
        match self.peek() {
            Some(quote @ ('"' | '\'')) => {
                let start = self.pos;
                self.pos += 1;
                let mut raw = String::new();
                loop {
                    match self.peek() {
                        None => {
                            return Err(self.error_at(start, "Unterminated attribute string"));
                        }
                        Some(c) if c == quote => {
                            self.pos += 1;
                            return Ok(Expr::Str(decode_entities(&raw)));
                        }
                        Some(c) => {
                            raw.push(c);
                            self.pos += 1;
                        }
                    }
                }
            }
            Some('{') => {
                self.pos += 1;
                let value = self.assignment()?;
                self.expect_char('}')?;
                Ok(value)
            }
            Some('<') => Ok(Expr::Element(Arc::new(self.jsx_element()?))),
            _ => {
                let found = self.describe();
                Err(self.error(format!("Expected attribute value but found {found}")))
            }
        }
    }

    fn jsx_children(&mut self, name: Option<&str>, open: usize) -> Result<Vec<JsxChild>> {
        let mut children = Vec::new();
        let mut text = String::new();
        loop {
            match self.peek() {
                None => {
                    let what = match name {
                        Some(name) => format!("Unterminated JSX element <{name}>"),
                        None => "Unterminated JSX fragment".to_string(),
                    };
                    return Err(self.error_at(open, what));
                }
                Some('<') if self.peek_at(1) == Some('/') => {
                    flush_text(&mut text, &mut children);
                    let close = self.pos;
                    self.pos += 2;
                    self.skip_trivia();
                    let closing = if self.peek() == Some('>') {
                        None
                    } else {
                        Some(self.jsx_name()?)
                    };
                    self.expect_char('>')?;
                    if closing.as_deref() != name {
                        return Err(self.error_at(
                            close,
                            format!(
                                "Expected closing tag </{}> but found </{}>",
                                name.unwrap_or_default(),
                                closing.unwrap_or_default()
                            ),
                        ));
                    }
                    return Ok(children);
                }
                Some('<') => {
                    flush_text(&mut text, &mut children);
                    let element = self.jsx_element()?;
                    children.push(JsxChild::Expr(Expr::Element(Arc::new(element))));
                }
                Some('{') => {
                    flush_text(&mut text, &mut children);
                    self.pos += 1;
                    self.skip_trivia();
                    if self.peek() == Some('}') {
                        self.pos += 1;
                        continue;
                    }
                    let expr = self.expression()?;
                    self.expect_char('}')?;
                    children.push(JsxChild::Expr(expr));
                }
                Some(c) => {
                    text.push(c);
                    self.pos += 1;
                }
            }
        }
    }
}

fn flush_text(text: &mut String, children: &mut Vec<JsxChild>) {
    let normalized = normalize_jsx_text(text);
    if !normalized.is_empty() {
        children.push(JsxChild::Text(decode_entities(&normalized)));
    }
    text.clear();
}

/// Collapse JSX text the way React does: lines are trimmed at their inner
/// edges, blank lines vanish, and the survivors are joined by one space.
fn normalize_jsx_text(text: &str) -> String {
    if !text.contains('\n') {
        return text.to_string();
    }
    let lines: Vec<&str> = text.split('\n').collect();
    let last = lines.len() - 1;
    lines
        .iter()
        .enumerate()
        .map(|(idx, line)| {
            let line = if idx == 0 { *line } else { line.trim_start() };
            if idx == last { line } else { line.trim_end() }
        })
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let decoded = tail.find(';').filter(|&end| end <= 10).and_then(|end| {
            let entity = &tail[1..end];
            let c = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some('\u{a0}'),
                "copy" => Some('\u{a9}'),
                "hellip" => Some('\u{2026}'),
                "mdash" => Some('\u{2014}'),
                _ => entity
                    .strip_prefix("#x")
                    .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                    .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                    .and_then(char::from_u32),
            };
            c.map(|c| (c, end))
        });
        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = &tail[end + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element_of(source: &str) -> JsxElement {
        let module = parse_module(&format!("const x = {source};")).unwrap();
        match &module.items[0] {
            Item::Const {
                value: Expr::Element(el),
                ..
            } => (**el).clone(),
            other => panic!("expected element, got {other:?}"),
        }
    }

    #[test]
    fn test_default_export_function_is_selected() {
        let source = r#"
            import React from 'react';

            interface Props { title: string; count?: number }

            export default function Card({ title, count = 0 }: Props) {
                return <div className="card">{title}: {count}</div>;
            }
        "#;
        let module = parse_module(source).unwrap();
        assert_eq!(module.default_export.as_deref(), Some("Card"));
        assert_eq!(select_export(&module, None).unwrap(), "Card");
        assert_eq!(select_export(&module, Some("Card")).unwrap(), "Card");
    }

    #[test]
    fn test_named_exports_and_aliases() {
        let source = r#"
            const Inner = () => <span>inner</span>;
            export const Badge = ({ label }) => <b>{label}</b>;
            export { Inner as Renamed };
        "#;
        let module = parse_module(source).unwrap();
        assert_eq!(module.components(), vec!["Inner", "Badge"]);
        assert_eq!(select_export(&module, Some("Renamed")).unwrap(), "Inner");
        assert_eq!(select_export(&module, Some("Badge")).unwrap(), "Badge");
        let err = select_export(&module, None).unwrap_err();
        assert!(err.message.contains("Inner, Badge"), "{}", err.message);
        let err = select_export(&module, Some("Missing")).unwrap_err();
        assert!(err.message.contains("Missing"));
    }

    #[test]
    fn test_single_component_is_implicit_entry() {
        let module = parse_module("function Only() { return <p/>; }").unwrap();
        assert_eq!(select_export(&module, None).unwrap(), "Only");
    }

    #[test]
    fn test_syntax_error_has_message_and_location() {
        let err = parse_module("function Broken() {\n  return <div>;\n}").unwrap_err();
        assert!(!err.message.is_empty());
        assert!(err.location.is_some());

        let err = parse_module("const x = <a><b></a></b>;").unwrap_err();
        assert!(err.message.contains("</b>"), "{}", err.message);
    }

    #[test]
    fn test_unsupported_statements_are_rejected() {
        let err = parse_module("function F() { for (;;) {} }").unwrap_err();
        assert!(err.message.contains("for"));
        let err = parse_module("export default class App {}").unwrap_err();
        assert!(err.message.contains("Class"));
    }

    #[test]
    fn test_jsx_text_whitespace_is_normalized() {
        let el = element_of("<p>\n    Hello\n    world &amp; co\n  </p>");
        assert_eq!(
            el.children,
            vec![JsxChild::Text("Hello world & co".to_string())]
        );
        let el = element_of("<p>a {1} b</p>");
        assert_eq!(el.children.len(), 3);
        assert_eq!(el.children[0], JsxChild::Text("a ".to_string()));
    }

    #[test]
    fn test_jsx_attributes() {
        let el = element_of(r#"<input type="text" disabled value={v} {...rest} />"#);
        assert_eq!(el.name.as_deref(), Some("input"));
        assert_eq!(el.attributes.len(), 4);
        assert_eq!(
            el.attributes[1],
            JsxAttribute::Named {
                name: "disabled".to_string(),
                value: None
            }
        );
        assert!(matches!(el.attributes[3], JsxAttribute::Spread(_)));
    }

    #[test]
    fn test_fragments_and_arrow_bodies() {
        let module = parse_module(
            "const List = ({ items }) => (<>{items.map((item, i) => <li key={i}>{item}</li>)}</>);",
        )
        .unwrap();
        assert_eq!(module.components(), vec!["List"]);
    }

    #[test]
    fn test_parenthesized_expressions_are_not_arrows() {
        let module = parse_module("const n = (1 + 2) * 3; const c = (n) ? (n) : 0;").unwrap();
        assert!(matches!(
            module.items[0],
            Item::Const {
                value: Expr::Binary {
                    op: BinaryOp::Mul,
                    ..
                },
                ..
            }
        ));
        assert!(matches!(
            module.items[1],
            Item::Const {
                value: Expr::Conditional { .. },
                ..
            }
        ));
    }

    #[test]
    fn test_parsing_is_deterministic() {
        let source = "export default ({ n = 2 }) => <ul>{[1, 2].map(x => <li>{x * n}</li>)}</ul>;";
        assert_eq!(parse_module(source).unwrap(), parse_module(source).unwrap());
    }

    #[test]
    fn test_decode_entities() {
        assert_eq!(decode_entities("a &lt;b&gt; &#65;&#x42; &bogus"), "a <b> AB &bogus");
    }
}
