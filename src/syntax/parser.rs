//! Recursive-descent parser for the embedded module language

use super::ast::{
    AssignTarget, BinaryOp, ClassDef, Expr, FnDef, ModuleAst, Param, Stmt, UnaryOp,
};
use super::lexer::{lex, Token, TokenKind};
use crate::{Error, Result};

/// Parse a whole module source into a syntax tree.
pub fn parse_module(source: &str) -> Result<ModuleAst> {
    let tokens = lex(source)?;
    let mut parser = Parser { tokens, pos: 0 };
    parser.module()
}

/// Parse a single expression, e.g. a literal supplied on the command line.
pub fn parse_expression(source: &str) -> Result<Expr> {
    let tokens = lex(source)?;
    let mut parser = Parser { tokens, pos: 0 };
    parser.skip_newlines();
    let expr = parser.expression()?;
    parser.skip_newlines();
    parser.expect(TokenKind::Eof)?;
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn check(&self, kind: &TokenKind) -> bool {
        &self.peek().kind == kind
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token> {
        if self.check(&kind) {
            Ok(self.advance())
        } else {
            let found = self.peek();
            Err(Error::Parse {
                line: found.line,
                message: format!(
                    "expected {}, found {}",
                    kind.describe(),
                    found.kind.describe()
                ),
            })
        }
    }

    fn expect_ident(&mut self) -> Result<(String, u32)> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::Ident(name) => {
                self.advance();
                Ok((name, token.line))
            }
            other => Err(Error::Parse {
                line: token.line,
                message: format!("expected identifier, found {}", other.describe()),
            }),
        }
    }

    fn skip_newlines(&mut self) {
        while self.check(&TokenKind::Newline) {
            self.advance();
        }
    }

    fn error(&self, message: impl Into<String>) -> Error {
        Error::Parse {
            line: self.peek().line,
            message: message.into(),
        }
    }

    // ---- statements ----

    fn module(&mut self) -> Result<ModuleAst> {
        let mut stmts = Vec::new();
        self.skip_newlines();
        while !self.check(&TokenKind::Eof) {
            stmts.push(self.statement(true)?);
            self.end_of_statement()?;
            self.skip_newlines();
        }
        Ok(ModuleAst { stmts })
    }

    fn end_of_statement(&mut self) -> Result<()> {
        if self.check(&TokenKind::Eof) || self.check(&TokenKind::RBrace) {
            return Ok(());
        }
        self.expect(TokenKind::Newline)?;
        Ok(())
    }

    fn statement(&mut self, top_level: bool) -> Result<Stmt> {
        match &self.peek().kind {
            TokenKind::Import | TokenKind::From if !top_level => {
                Err(self.error("imports are only allowed at module level"))
            }
            TokenKind::Import => self.import_stmt(),
            TokenKind::From => self.from_import_stmt(),
            TokenKind::Fn => Ok(Stmt::Fn(self.fn_def()?)),
            TokenKind::Class => self.class_def(),
            TokenKind::Return => self.return_stmt(),
            TokenKind::If => self.if_stmt(),
            TokenKind::While => self.while_stmt(),
            _ => self.assign_or_expr(),
        }
    }

    fn import_stmt(&mut self) -> Result<Stmt> {
        let line = self.expect(TokenKind::Import)?.line;
        let (module, _) = self.expect_ident()?;
        Ok(Stmt::Import { module, line })
    }

    fn from_import_stmt(&mut self) -> Result<Stmt> {
        let line = self.expect(TokenKind::From)?.line;
        let (module, _) = self.expect_ident()?;
        self.expect(TokenKind::Import)?;
        let mut names = vec![self.expect_ident()?.0];
        while self.eat(&TokenKind::Comma) {
            names.push(self.expect_ident()?.0);
        }
        Ok(Stmt::FromImport {
            module,
            names,
            line,
        })
    }

    fn fn_def(&mut self) -> Result<FnDef> {
        let line_start = self.expect(TokenKind::Fn)?.line;
        let (name, _) = self.expect_ident()?;
        self.expect(TokenKind::LParen)?;
        let mut params = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                let (param_name, param_line) = self.expect_ident()?;
                let default = if self.eat(&TokenKind::Assign) {
                    Some(self.expression()?)
                } else {
                    None
                };
                params.push(Param {
                    name: param_name,
                    default,
                    line: param_line,
                });
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen)?;
        let (body, line_end) = self.block()?;
        Ok(FnDef {
            name,
            params,
            body,
            line_start,
            line_end,
        })
    }

    fn class_def(&mut self) -> Result<Stmt> {
        let line_start = self.expect(TokenKind::Class)?.line;
        let (name, _) = self.expect_ident()?;
        self.expect(TokenKind::LBrace)?;
        self.skip_newlines();
        let mut methods = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            if !self.check(&TokenKind::Fn) {
                return Err(self.error("class bodies may only contain method definitions"));
            }
            methods.push(self.fn_def()?);
            self.skip_newlines();
        }
        let line_end = self.expect(TokenKind::RBrace)?.line;
        Ok(Stmt::Class(ClassDef {
            name,
            methods,
            line_start,
            line_end,
        }))
    }

    fn return_stmt(&mut self) -> Result<Stmt> {
        let line = self.expect(TokenKind::Return)?.line;
        let value = if self.check(&TokenKind::Newline)
            || self.check(&TokenKind::RBrace)
            || self.check(&TokenKind::Eof)
        {
            None
        } else {
            Some(self.expression()?)
        };
        Ok(Stmt::Return { value, line })
    }

    fn if_stmt(&mut self) -> Result<Stmt> {
        let line = self.expect(TokenKind::If)?.line;
        let cond = self.expression()?;
        let (then_body, _) = self.block()?;
        let else_body = if self.eat(&TokenKind::Else) {
            if self.check(&TokenKind::If) {
                vec![self.if_stmt()?]
            } else {
                self.block()?.0
            }
        } else {
            Vec::new()
        };
        Ok(Stmt::If {
            cond,
            then_body,
            else_body,
            line,
        })
    }

    fn while_stmt(&mut self) -> Result<Stmt> {
        let line = self.expect(TokenKind::While)?.line;
        let cond = self.expression()?;
        let (body, _) = self.block()?;
        Ok(Stmt::While { cond, body, line })
    }

    /// `{ stmt* }`, returning the body and the closing brace line.
    fn block(&mut self) -> Result<(Vec<Stmt>, u32)> {
        self.expect(TokenKind::LBrace)?;
        self.skip_newlines();
        let mut stmts = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            if self.check(&TokenKind::Eof) {
                return Err(self.error("unterminated block, expected '}'"));
            }
            stmts.push(self.statement(false)?);
            self.end_of_statement()?;
            self.skip_newlines();
        }
        let line_end = self.expect(TokenKind::RBrace)?.line;
        Ok((stmts, line_end))
    }

    /// Expression statement or (possibly chained) assignment.
    fn assign_or_expr(&mut self) -> Result<Stmt> {
        let first = self.expression()?;
        if !self.check(&TokenKind::Assign) {
            return Ok(Stmt::Expr(first));
        }
        let line = first.line();
        let mut exprs = vec![first];
        while self.eat(&TokenKind::Assign) {
            exprs.push(self.expression()?);
        }
        // Everything before the final expression is an assignment target.
        let value = exprs.pop().expect("at least two expressions");
        let targets = exprs
            .into_iter()
            .map(expr_to_target)
            .collect::<Result<Vec<_>>>()?;
        Ok(Stmt::Assign {
            targets,
            value,
            line,
        })
    }

    // ---- expressions, lowest precedence first ----

    fn expression(&mut self) -> Result<Expr> {
        self.or_expr()
    }

    fn or_expr(&mut self) -> Result<Expr> {
        let mut left = self.and_expr()?;
        while self.check(&TokenKind::Or) {
            let line = self.advance().line;
            let right = self.and_expr()?;
            left = Expr::Binary {
                op: BinaryOp::Or,
                left: Box::new(left),
                right: Box::new(right),
                line,
            };
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expr> {
        let mut left = self.not_expr()?;
        while self.check(&TokenKind::And) {
            let line = self.advance().line;
            let right = self.not_expr()?;
            left = Expr::Binary {
                op: BinaryOp::And,
                left: Box::new(left),
                right: Box::new(right),
                line,
            };
        }
        Ok(left)
    }

    fn not_expr(&mut self) -> Result<Expr> {
        if self.check(&TokenKind::Not) {
            let line = self.advance().line;
            let operand = self.not_expr()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand),
                line,
            });
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr> {
        let left = self.additive()?;
        let op = match self.peek().kind {
            TokenKind::EqEq => BinaryOp::Eq,
            TokenKind::NotEq => BinaryOp::Ne,
            TokenKind::Lt => BinaryOp::Lt,
            TokenKind::Le => BinaryOp::Le,
            TokenKind::Gt => BinaryOp::Gt,
            TokenKind::Ge => BinaryOp::Ge,
            _ => return Ok(left),
        };
        let line = self.advance().line;
        let right = self.additive()?;
        Ok(Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
            line,
        })
    }

    fn additive(&mut self) -> Result<Expr> {
        let mut left = self.multiplicative()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            let line = self.advance().line;
            let right = self.multiplicative()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
                line,
            };
        }
        Ok(left)
    }

    fn multiplicative(&mut self) -> Result<Expr> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Mod,
                _ => break,
            };
            let line = self.advance().line;
            let right = self.unary()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
                line,
            };
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr> {
        if self.check(&TokenKind::Minus) {
            let line = self.advance().line;
            let operand = self.unary()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Neg,
                operand: Box::new(operand),
                line,
            });
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr> {
        let mut expr = self.primary()?;
        loop {
            if self.check(&TokenKind::Dot) {
                let line = self.advance().line;
                let (name, _) = self.expect_ident()?;
                expr = Expr::Attribute {
                    object: Box::new(expr),
                    name,
                    line,
                };
            } else if self.check(&TokenKind::LParen) {
                let line = self.advance().line;
                let mut args = Vec::new();
                if !self.check(&TokenKind::RParen) {
                    loop {
                        args.push(self.expression()?);
                        if !self.eat(&TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.expect(TokenKind::RParen)?;
                expr = Expr::Call {
                    callee: Box::new(expr),
                    args,
                    line,
                };
            } else {
                return Ok(expr);
            }
        }
    }

    fn primary(&mut self) -> Result<Expr> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::Int(value) => {
                self.advance();
                Ok(Expr::Int {
                    value,
                    line: token.line,
                })
            }
            TokenKind::Float(value) => {
                self.advance();
                Ok(Expr::Float {
                    value,
                    line: token.line,
                })
            }
            TokenKind::Str(value) => {
                self.advance();
                Ok(Expr::Str {
                    value,
                    line: token.line,
                })
            }
            TokenKind::True => {
                self.advance();
                Ok(Expr::Bool {
                    value: true,
                    line: token.line,
                })
            }
            TokenKind::False => {
                self.advance();
                Ok(Expr::Bool {
                    value: false,
                    line: token.line,
                })
            }
            TokenKind::Nil => {
                self.advance();
                Ok(Expr::Nil { line: token.line })
            }
            TokenKind::Ident(name) => {
                self.advance();
                Ok(Expr::Name {
                    name,
                    line: token.line,
                })
            }
            TokenKind::LParen => self.group_or_tuple(),
            TokenKind::LBracket => self.list(),
            TokenKind::LBrace => self.map(),
            other => Err(Error::Parse {
                line: token.line,
                message: format!("expected expression, found {}", other.describe()),
            }),
        }
    }

    fn group_or_tuple(&mut self) -> Result<Expr> {
        let line = self.expect(TokenKind::LParen)?.line;
        if self.eat(&TokenKind::RParen) {
            return Ok(Expr::Tuple {
                items: Vec::new(),
                line,
            });
        }
        let first = self.expression()?;
        if self.eat(&TokenKind::Comma) {
            let mut items = vec![first];
            while !self.check(&TokenKind::RParen) {
                items.push(self.expression()?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::RParen)?;
            Ok(Expr::Tuple { items, line })
        } else {
            self.expect(TokenKind::RParen)?;
            Ok(first)
        }
    }

    fn list(&mut self) -> Result<Expr> {
        let line = self.expect(TokenKind::LBracket)?.line;
        let mut items = Vec::new();
        while !self.check(&TokenKind::RBracket) {
            items.push(self.expression()?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RBracket)?;
        Ok(Expr::List { items, line })
    }

    fn map(&mut self) -> Result<Expr> {
        // Newlines are significant at brace depth, so skip them explicitly
        // between entries.
        let line = self.expect(TokenKind::LBrace)?.line;
        self.skip_newlines();
        let mut entries = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            let key = self.expression()?;
            self.expect(TokenKind::Colon)?;
            let value = self.expression()?;
            entries.push((key, value));
            self.skip_newlines();
            if !self.eat(&TokenKind::Comma) {
                break;
            }
            self.skip_newlines();
        }
        self.expect(TokenKind::RBrace)?;
        Ok(Expr::Map { entries, line })
    }
}

fn expr_to_target(expr: Expr) -> Result<AssignTarget> {
    match expr {
        Expr::Name { name, line } => Ok(AssignTarget::Name { name, line }),
        Expr::Attribute { object, name, line } => Ok(AssignTarget::Attribute {
            object: *object,
            name,
            line,
        }),
        other => Err(Error::Parse {
            line: other.line(),
            message: "invalid assignment target".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_assignment() {
        let module = parse_module("k = 10\n").unwrap();
        assert_eq!(module.stmts.len(), 1);
        match &module.stmts[0] {
            Stmt::Assign { targets, value, .. } => {
                assert_eq!(targets[0].as_name(), Some("k"));
                assert_eq!(
                    value,
                    &Expr::Int { value: 10, line: 1 }
                );
            }
            other => panic!("expected assignment, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_chained_assignment() {
        let module = parse_module("a = b = 1\n").unwrap();
        match &module.stmts[0] {
            Stmt::Assign { targets, .. } => {
                let names: Vec<_> = targets.iter().filter_map(|t| t.as_name()).collect();
                assert_eq!(names, vec!["a", "b"]);
            }
            other => panic!("expected assignment, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_function_with_default() {
        let source = "fn f(x, n = 1) {\n    k = 10\n    return n * k + x\n}\n";
        let module = parse_module(source).unwrap();
        match &module.stmts[0] {
            Stmt::Fn(def) => {
                assert_eq!(def.name, "f");
                assert_eq!(def.params.len(), 2);
                assert!(def.params[0].default.is_none());
                assert_eq!(
                    def.params[1].default,
                    Some(Expr::Int { value: 1, line: 1 })
                );
                assert_eq!(def.line_start, 1);
                assert_eq!(def.line_end, 4);
                assert_eq!(def.body.len(), 2);
            }
            other => panic!("expected fn, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_class() {
        let source = "class Greeter {\n    fn greet(self, name = \"world\") {\n        return name\n    }\n}\n";
        let module = parse_module(source).unwrap();
        match &module.stmts[0] {
            Stmt::Class(def) => {
                assert_eq!(def.name, "Greeter");
                assert_eq!(def.methods.len(), 1);
                assert_eq!(def.methods[0].name, "greet");
            }
            other => panic!("expected class, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_imports() {
        let module = parse_module("import util\nfrom util import helper, rate\n").unwrap();
        assert!(matches!(&module.stmts[0], Stmt::Import { module, .. } if module == "util"));
        match &module.stmts[1] {
            Stmt::FromImport { module, names, .. } => {
                assert_eq!(module, "util");
                assert_eq!(names, &["helper".to_string(), "rate".to_string()]);
            }
            other => panic!("expected from-import, got {:?}", other),
        }
    }

    #[test]
    fn test_imports_rejected_inside_functions() {
        let err = parse_module("fn f() {\n    import util\n}\n").unwrap_err();
        assert!(matches!(err, Error::Parse { line: 2, .. }));
    }

    #[test]
    fn test_parse_if_else_and_while() {
        let source = "fn f(n) {\n    total = 0\n    while n > 0 {\n        if n % 2 == 0 {\n            total = total + n\n        } else {\n            total = total - 1\n        }\n        n = n - 1\n    }\n    return total\n}\n";
        assert!(parse_module(source).is_ok());
    }

    #[test]
    fn test_parse_collections() {
        let expr = parse_expression("{\"a\": [1, 2], \"b\": (3, 4.5)}").unwrap();
        match expr {
            Expr::Map { entries, .. } => assert_eq!(entries.len(), 2),
            other => panic!("expected map, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_precedence() {
        let expr = parse_expression("1 + 2 * 3").unwrap();
        match expr {
            Expr::Binary { op: BinaryOp::Add, right, .. } => {
                assert!(matches!(*right, Expr::Binary { op: BinaryOp::Mul, .. }));
            }
            other => panic!("expected addition, got {:?}", other),
        }
    }

    #[test]
    fn test_attribute_and_call_chain() {
        let expr = parse_expression("util.helper(1)(2)").unwrap();
        assert!(matches!(expr, Expr::Call { .. }));
    }

    #[test]
    fn test_invalid_assignment_target() {
        assert!(parse_module("1 = 2\n").is_err());
    }
}
