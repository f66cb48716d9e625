//! Rule-text parser.
//!
//! Grammar (UTF-8, `%` line comments):
//!
//! ```text
//! program  := clause*
//! clause   := atom "."                      % ground fact
//!           | atom ":-" literal ("," literal)* "."
//! literal  := "not" atom | atom | expr CMP expr
//! atom     := IDENT "(" term ("," term)* ")" | IDENT
//! term     := VAR | "_" | IDENT | STRING | INT
//! expr     := mul (("+"|"-") mul)*
//! mul      := primary (("*"|"/") primary)*
//! primary  := INT | "-" INT | VAR | "(" expr ")"
//! ```
//!
//! Identifiers start lowercase (symbols/predicates); variables start
//! uppercase; `_`-prefixed names are anonymous. Every parsed rule is
//! safety-checked before it is returned.

use cairn_facts::{Symbol, Value};

use crate::ast::{ArithOp, Atom, CmpOp, Expr, Literal, Program, Rule, Term};
use crate::error::{RuleError, RuleResult};
use crate::safety;

/// Parse rule text into ground facts and rules.
pub fn parse(text: &str) -> RuleResult<Program> {
    let tokens = lex(text)?;
    let mut parser = Parser { tokens, pos: 0 };
    let program = parser.program()?;
    for rule in &program.rules {
        safety::check_rule(rule)?;
    }
    Ok(program)
}

// ── Lexer ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
enum Tok {
    Ident(String),
    Var(String),
    Wildcard,
    Int(i64),
    Str(String),
    LParen,
    RParen,
    Comma,
    Dot,
    Turnstile, // ":-"
    Lt,
    Le,
    Gt,
    Ge,
    EqEq,
    Ne,
    Plus,
    Minus,
    Star,
    Slash,
}

#[derive(Debug, Clone)]
struct Spanned {
    tok: Tok,
    line: usize,
}

fn lex(text: &str) -> RuleResult<Vec<Spanned>> {
    let mut tokens = Vec::new();
    let mut chars = text.chars().peekable();
    let mut line = 1;

    while let Some(&c) = chars.peek() {
        match c {
            '\n' => {
                line += 1;
                chars.next();
            }
            c if c.is_whitespace() => {
                chars.next();
            }
            '%' => {
                // Comment to end of line.
                for c in chars.by_ref() {
                    if c == '\n' {
                        line += 1;
                        break;
                    }
                }
            }
            '(' => {
                chars.next();
                tokens.push(Spanned { tok: Tok::LParen, line });
            }
            ')' => {
                chars.next();
                tokens.push(Spanned { tok: Tok::RParen, line });
            }
            ',' => {
                chars.next();
                tokens.push(Spanned { tok: Tok::Comma, line });
            }
            '.' => {
                chars.next();
                tokens.push(Spanned { tok: Tok::Dot, line });
            }
            '+' => {
                chars.next();
                tokens.push(Spanned { tok: Tok::Plus, line });
            }
            '-' => {
                chars.next();
                tokens.push(Spanned { tok: Tok::Minus, line });
            }
            '*' => {
                chars.next();
                tokens.push(Spanned { tok: Tok::Star, line });
            }
            '/' => {
                chars.next();
                tokens.push(Spanned { tok: Tok::Slash, line });
            }
            ':' => {
                chars.next();
                if chars.peek() == Some(&'-') {
                    chars.next();
                    tokens.push(Spanned { tok: Tok::Turnstile, line });
                } else {
                    return Err(RuleError::syntax(line, "expected ':-'"));
                }
            }
            '<' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Spanned { tok: Tok::Le, line });
                } else {
                    tokens.push(Spanned { tok: Tok::Lt, line });
                }
            }
            '>' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Spanned { tok: Tok::Ge, line });
                } else {
                    tokens.push(Spanned { tok: Tok::Gt, line });
                }
            }
            '=' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Spanned { tok: Tok::EqEq, line });
                } else {
                    return Err(RuleError::syntax(line, "expected '=='"));
                }
            }
            '!' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Spanned { tok: Tok::Ne, line });
                } else {
                    return Err(RuleError::syntax(line, "expected '!='"));
                }
            }
            '"' => {
                chars.next();
                let mut s = String::new();
                let mut closed = false;
                while let Some(c) = chars.next() {
                    match c {
                        '"' => {
                            closed = true;
                            break;
                        }
                        '\\' => match chars.next() {
                            Some('"') => s.push('"'),
                            Some('\\') => s.push('\\'),
                            Some(other) => {
                                return Err(RuleError::syntax(
                                    line,
                                    format!("unknown escape '\\{other}'"),
                                ));
                            }
                            None => break,
                        },
                        '\n' => {
                            return Err(RuleError::syntax(line, "unterminated string"));
                        }
                        c => s.push(c),
                    }
                }
                if !closed {
                    return Err(RuleError::syntax(line, "unterminated string"));
                }
                tokens.push(Spanned { tok: Tok::Str(s), line });
            }
            c if c.is_ascii_digit() => {
                let mut n: i64 = 0;
                while let Some(&d) = chars.peek() {
                    if let Some(digit) = d.to_digit(10) {
                        n = n
                            .checked_mul(10)
                            .and_then(|n| n.checked_add(digit as i64))
                            .ok_or_else(|| {
                                RuleError::syntax(line, "integer literal overflows i64")
                            })?;
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Spanned { tok: Tok::Int(n), line });
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut name = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' {
                        name.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let tok = if name.starts_with('_') {
                    Tok::Wildcard
                } else if name.chars().next().is_some_and(|c| c.is_uppercase()) {
                    Tok::Var(name)
                } else {
                    Tok::Ident(name)
                };
                tokens.push(Spanned { tok, line });
            }
            other => {
                return Err(RuleError::syntax(
                    line,
                    format!("unexpected character '{other}'"),
                ));
            }
        }
    }

    Ok(tokens)
}

// ── Parser ─────────────────────────────────────────────────────────

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos).map(|s| &s.tok)
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos.min(self.tokens.len().saturating_sub(1)))
            .map(|s| s.line)
            .unwrap_or(0)
    }

    fn next(&mut self) -> Option<Tok> {
        let tok = self.tokens.get(self.pos).map(|s| s.tok.clone());
        self.pos += 1;
        tok
    }

    fn expect(&mut self, expected: Tok, what: &str) -> RuleResult<()> {
        let line = self.line();
        match self.next() {
            Some(tok) if tok == expected => Ok(()),
            Some(_) | None => Err(RuleError::syntax(line, format!("expected {what}"))),
        }
    }

    fn program(&mut self) -> RuleResult<Program> {
        let mut program = Program::default();
        while self.peek().is_some() {
            let line = self.line();
            let head = self.atom()?;
            match self.peek() {
                Some(Tok::Dot) => {
                    self.next();
                    let fact = head.to_fact().ok_or_else(|| {
                        RuleError::syntax(line, format!("fact '{head}' contains variables"))
                    })?;
                    program.facts.push(fact);
                }
                Some(Tok::Turnstile) => {
                    self.next();
                    let body = self.body()?;
                    self.expect(Tok::Dot, "'.' after rule body")?;
                    program.rules.push(Rule { head, body });
                }
                _ => {
                    return Err(RuleError::syntax(line, "expected '.' or ':-' after atom"));
                }
            }
        }
        Ok(program)
    }

    fn body(&mut self) -> RuleResult<Vec<Literal>> {
        let mut literals = vec![self.literal()?];
        while self.peek() == Some(&Tok::Comma) {
            self.next();
            literals.push(self.literal()?);
        }
        Ok(literals)
    }

    fn literal(&mut self) -> RuleResult<Literal> {
        match self.peek() {
            Some(Tok::Ident(name)) if name == "not" => {
                self.next();
                Ok(Literal::Neg(self.atom()?))
            }
            Some(Tok::Ident(_)) => Ok(Literal::Pos(self.atom()?)),
            _ => {
                // Anything else starts a comparison.
                let line = self.line();
                let lhs = self.expr()?;
                let op = match self.next() {
                    Some(Tok::Lt) => CmpOp::Lt,
                    Some(Tok::Le) => CmpOp::Le,
                    Some(Tok::Gt) => CmpOp::Gt,
                    Some(Tok::Ge) => CmpOp::Ge,
                    Some(Tok::EqEq) => CmpOp::Eq,
                    Some(Tok::Ne) => CmpOp::Ne,
                    _ => {
                        return Err(RuleError::syntax(line, "expected comparison operator"));
                    }
                };
                let rhs = self.expr()?;
                Ok(Literal::Cmp(lhs, op, rhs))
            }
        }
    }

    fn atom(&mut self) -> RuleResult<Atom> {
        let line = self.line();
        let name = match self.next() {
            Some(Tok::Ident(name)) => name,
            _ => return Err(RuleError::syntax(line, "expected predicate name")),
        };
        let pred = Symbol::intern(&name);

        // Zero-arity atoms have no parenthesized argument list.
        if self.peek() != Some(&Tok::LParen) {
            return Ok(Atom {
                pred,
                args: Vec::new(),
            });
        }
        self.next();

        let mut args = vec![self.term()?];
        while self.peek() == Some(&Tok::Comma) {
            self.next();
            args.push(self.term()?);
        }
        self.expect(Tok::RParen, "')' after arguments")?;
        Ok(Atom { pred, args })
    }

    fn term(&mut self) -> RuleResult<Term> {
        let line = self.line();
        match self.next() {
            Some(Tok::Var(name)) => Ok(Term::Var(name)),
            Some(Tok::Wildcard) => Ok(Term::Wildcard),
            Some(Tok::Ident(name)) => Ok(Term::Const(Value::sym(&name))),
            Some(Tok::Str(s)) => Ok(Term::Const(Value::Str(s))),
            Some(Tok::Int(n)) => Ok(Term::Const(Value::Int(n))),
            Some(Tok::Minus) => match self.next() {
                Some(Tok::Int(n)) => Ok(Term::Const(Value::Int(-n))),
                _ => Err(RuleError::syntax(line, "expected integer after '-'")),
            },
            _ => Err(RuleError::syntax(line, "expected term")),
        }
    }

    fn expr(&mut self) -> RuleResult<Expr> {
        let mut lhs = self.mul_expr()?;
        loop {
            let op = match self.peek() {
                Some(Tok::Plus) => ArithOp::Add,
                Some(Tok::Minus) => ArithOp::Sub,
                _ => break,
            };
            self.next();
            let rhs = self.mul_expr()?;
            lhs = Expr::BinOp(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn mul_expr(&mut self) -> RuleResult<Expr> {
        let mut lhs = self.primary()?;
        loop {
            let op = match self.peek() {
                Some(Tok::Star) => ArithOp::Mul,
                Some(Tok::Slash) => ArithOp::Div,
                _ => break,
            };
            self.next();
            let rhs = self.primary()?;
            lhs = Expr::BinOp(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn primary(&mut self) -> RuleResult<Expr> {
        let line = self.line();
        match self.next() {
            Some(Tok::Int(n)) => Ok(Expr::Term(Term::Const(Value::Int(n)))),
            Some(Tok::Minus) => match self.next() {
                Some(Tok::Int(n)) => Ok(Expr::Term(Term::Const(Value::Int(-n)))),
                _ => Err(RuleError::syntax(line, "expected integer after '-'")),
            },
            Some(Tok::Var(name)) => Ok(Expr::Term(Term::Var(name))),
            Some(Tok::LParen) => {
                let expr = self.expr()?;
                self.expect(Tok::RParen, "')' in expression")?;
                Ok(expr)
            }
            _ => Err(RuleError::syntax(
                line,
                "expected integer, variable, or '(' in expression",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_facts::Fact;

    #[test]
    fn parses_ground_facts() {
        let program = parse("valid_transition(pending, starting).\n").unwrap();
        assert_eq!(program.rules.len(), 0);
        assert_eq!(
            program.facts,
            vec![Fact::new(
                "valid_transition",
                vec![Value::sym("pending"), Value::sym("starting")]
            )]
        );
    }

    #[test]
    fn parses_simple_rule() {
        let program =
            parse("can_transition(W, Next) :- workload(W, _, S), valid_transition(S, Next).")
                .unwrap();
        assert_eq!(program.rules.len(), 1);
        let rule = &program.rules[0];
        assert_eq!(rule.head.pred.as_str(), "can_transition");
        assert_eq!(rule.body.len(), 2);
    }

    #[test]
    fn parses_negation() {
        let program = parse(
            "orphaned(W) :- workload(W, _, running), workload_placement(W, N), not node(N, _, _).",
        )
        .unwrap();
        let rule = &program.rules[0];
        assert!(matches!(rule.body[2], Literal::Neg(_)));
    }

    #[test]
    fn parses_arithmetic_comparison() {
        let program = parse(
            "overloaded(N) :- node_resources(N, Total, _), node_resources_used(N, Used, _), \
             Total > 0, 100 * Used / Total > 90.",
        )
        .unwrap();
        let rule = &program.rules[0];
        assert!(matches!(rule.body[2], Literal::Cmp(_, CmpOp::Gt, _)));
        assert!(matches!(rule.body[3], Literal::Cmp(_, CmpOp::Gt, _)));
    }

    #[test]
    fn arithmetic_precedence_mul_before_add() {
        let program = parse("p(X) :- q(X, A, B, C), A + B * C < 10.").unwrap();
        let Literal::Cmp(lhs, _, _) = &program.rules[0].body[1] else {
            panic!("expected comparison");
        };
        // A + (B * C)
        let Expr::BinOp(ArithOp::Add, _, rhs) = lhs else {
            panic!("expected top-level addition, got {lhs:?}");
        };
        assert!(matches!(**rhs, Expr::BinOp(ArithOp::Mul, _, _)));
    }

    #[test]
    fn parses_strings_and_integers() {
        let program = parse(r#"pinned("w-123", 42)."#).unwrap();
        assert_eq!(
            program.facts[0].args,
            vec![Value::str("w-123"), Value::int(42)]
        );
    }

    #[test]
    fn parses_negative_integers() {
        let program = parse("offset(n1, -5).").unwrap();
        assert_eq!(program.facts[0].args[1], Value::int(-5));
    }

    #[test]
    fn comments_are_ignored() {
        let program = parse(
            "% lifecycle graph\nvalid_transition(pending, starting). % initial step\n",
        )
        .unwrap();
        assert_eq!(program.facts.len(), 1);
    }

    #[test]
    fn fact_with_variable_is_rejected() {
        let err = parse("node_healthy(N).").unwrap_err();
        assert!(matches!(err, RuleError::Syntax { .. }));
    }

    #[test]
    fn missing_dot_is_rejected() {
        let err = parse("a(x) :- b(x)").unwrap_err();
        assert!(matches!(err, RuleError::Syntax { .. }));
    }

    #[test]
    fn error_reports_line_number() {
        let err = parse("a(x).\nb(y.\n").unwrap_err();
        let RuleError::Syntax { line, .. } = err else {
            panic!("expected syntax error");
        };
        assert_eq!(line, 2);
    }

    #[test]
    fn unterminated_string_is_rejected() {
        let err = parse(r#"pinned("w-1"#).unwrap_err();
        assert!(matches!(err, RuleError::Syntax { .. }));
    }

    #[test]
    fn unsafe_rule_is_rejected_at_parse() {
        // Head variable N only appears under negation.
        let err = parse("bad(N) :- workload(W, _, _), not node(N, _, _).").unwrap_err();
        assert!(matches!(err, RuleError::Unsafe { .. }));
    }

    #[test]
    fn zero_arity_atom() {
        let program = parse("maintenance_mode.\nblocked(W) :- workload(W, _, pending), maintenance_mode.").unwrap();
        assert_eq!(program.facts[0].args.len(), 0);
        assert_eq!(program.rules.len(), 1);
    }

    #[test]
    fn empty_input_is_empty_program() {
        let program = parse("").unwrap();
        assert!(program.is_empty());
    }
}
