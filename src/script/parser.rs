//! Tokenizer and recursive-descent parser for the reduced script grammar.
//!
//! Recovery is per statement: when a statement fails to parse, tokens are
//! skipped up to the next `;` or `}` and parsing resumes, so one piece of
//! unsupported syntax never hides the links in the rest of the script.

use crate::script::ScriptNode;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Num(f64),
    /// Structural punctuation: ( ) { } [ ] , ; : .
    Punct(char),
    /// Operator run, e.g. "=", "+", "==", "&&".
    Op(String),
}

fn is_op_char(c: char) -> bool {
    matches!(
        c,
        '+' | '-' | '*' | '/' | '%' | '=' | '!' | '<' | '>' | '&' | '|' | '^' | '~' | '?'
    )
}

fn tokenize(src: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars = src.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c == '/' {
            // comment or operator
            chars.next();
            match chars.peek() {
                Some('/') => {
                    for d in chars.by_ref() {
                        if d == '\n' {
                            break;
                        }
                    }
                }
                Some('*') => {
                    chars.next();
                    let mut prev = ' ';
                    for d in chars.by_ref() {
                        if prev == '*' && d == '/' {
                            break;
                        }
                        prev = d;
                    }
                }
                _ => tokens.push(Token::Op("/".to_string())),
            }
        } else if c == '"' || c == '\'' {
            chars.next();
            let quote = c;
            let mut s = String::new();
            while let Some(d) = chars.next() {
                if d == '\\' {
                    match chars.next() {
                        Some('n') => s.push('\n'),
                        Some('t') => s.push('\t'),
                        Some(other) => s.push(other),
                        None => break,
                    }
                } else if d == quote {
                    break;
                } else {
                    s.push(d);
                }
            }
            tokens.push(Token::Str(s));
        } else if c.is_ascii_digit() {
            let mut s = String::new();
            while let Some(&d) = chars.peek() {
                if d.is_ascii_digit() || d == '.' {
                    s.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(Token::Num(s.parse().unwrap_or(0.0)));
        } else if c.is_alphabetic() || c == '_' || c == '$' {
            let mut s = String::new();
            while let Some(&d) = chars.peek() {
                if d.is_alphanumeric() || d == '_' || d == '$' {
                    s.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(Token::Ident(s));
        } else if is_op_char(c) {
            let mut s = String::new();
            while let Some(&d) = chars.peek() {
                if is_op_char(d) {
                    s.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(Token::Op(s));
        } else if matches!(c, '(' | ')' | '{' | '}' | '[' | ']' | ',' | ';' | ':' | '.') {
            chars.next();
            tokens.push(Token::Punct(c));
        } else {
            // unknown byte, drop it
            chars.next();
        }
    }
    tokens
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn eat_punct(&mut self, c: char) -> bool {
        if self.peek() == Some(&Token::Punct(c)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_op(&mut self, op: &str) -> bool {
        if matches!(self.peek(), Some(Token::Op(o)) if o == op) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Skip forward past the next `;` (or up to a `}` / end of input).
    fn recover(&mut self) {
        while let Some(t) = self.peek() {
            match t {
                Token::Punct(';') => {
                    self.pos += 1;
                    return;
                }
                Token::Punct('}') => return,
                _ => self.pos += 1,
            }
        }
    }

    fn parse_program(&mut self) -> ScriptNode {
        ScriptNode::Program(self.parse_statements(None))
    }

    /// Parse statements until `stop` (consumed) or end of input.
    fn parse_statements(&mut self, stop: Option<char>) -> Vec<ScriptNode> {
        let mut stmts = Vec::new();
        loop {
            if let Some(c) = stop {
                if self.eat_punct(c) {
                    break;
                }
            }
            if self.peek().is_none() {
                break;
            }
            match self.parse_statement() {
                Ok(Some(stmt)) => stmts.push(stmt),
                Ok(None) => {}
                Err(()) => self.recover(),
            }
        }
        stmts
    }

    fn parse_statement(&mut self) -> Result<Option<ScriptNode>, ()> {
        match self.peek() {
            Some(Token::Punct(';')) => {
                self.pos += 1;
                Ok(None)
            }
            Some(Token::Punct('{')) => {
                self.pos += 1;
                Ok(Some(ScriptNode::Program(self.parse_statements(Some('}')))))
            }
            Some(Token::Ident(kw)) if kw == "var" => {
                self.pos += 1;
                self.parse_var().map(Some)
            }
            Some(Token::Ident(kw)) if kw == "function" => {
                self.pos += 1;
                self.parse_function().map(Some)
            }
            Some(Token::Ident(kw)) if kw == "with" => {
                self.pos += 1;
                self.parse_with().map(Some)
            }
            _ => {
                let expr = self.parse_assign()?;
                self.eat_punct(';');
                Ok(Some(ScriptNode::ExprStmt(Box::new(expr))))
            }
        }
    }

    fn parse_var(&mut self) -> Result<ScriptNode, ()> {
        let mut decls = Vec::new();
        loop {
            let name = match self.next() {
                Some(Token::Ident(n)) => n,
                _ => return Err(()),
            };
            let init = if self.eat_op("=") {
                Some(self.parse_assign()?)
            } else {
                None
            };
            decls.push((name, init));
            if !self.eat_punct(',') {
                break;
            }
        }
        self.eat_punct(';');
        Ok(ScriptNode::Var(decls))
    }

    fn parse_function(&mut self) -> Result<ScriptNode, ()> {
        let name = match self.peek() {
            Some(Token::Ident(n)) => {
                let n = n.clone();
                self.pos += 1;
                Some(n)
            }
            _ => None,
        };
        if !self.eat_punct('(') {
            return Err(());
        }
        while let Some(t) = self.next() {
            if t == Token::Punct(')') {
                break;
            }
        }
        if !self.eat_punct('{') {
            return Err(());
        }
        let body = ScriptNode::Program(self.parse_statements(Some('}')));
        Ok(ScriptNode::Function {
            name,
            body: Box::new(body),
        })
    }

    fn parse_with(&mut self) -> Result<ScriptNode, ()> {
        if !self.eat_punct('(') {
            return Err(());
        }
        // subject expression is irrelevant for link discovery
        let mut depth = 1;
        while let Some(t) = self.next() {
            match t {
                Token::Punct('(') => depth += 1,
                Token::Punct(')') => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                _ => {}
            }
        }
        if !self.eat_punct('{') {
            return Err(());
        }
        Ok(ScriptNode::With(self.parse_statements(Some('}'))))
    }

    fn parse_assign(&mut self) -> Result<ScriptNode, ()> {
        let left = self.parse_additive()?;
        if self.eat_op("=") {
            let value = self.parse_assign()?;
            Ok(ScriptNode::Assign {
                target: Box::new(left),
                value: Box::new(value),
            })
        } else {
            Ok(left)
        }
    }

    fn parse_additive(&mut self) -> Result<ScriptNode, ()> {
        let mut terms = vec![self.parse_postfix()?];
        while self.eat_op("+") {
            terms.push(self.parse_postfix()?);
        }
        if terms.len() == 1 {
            Ok(terms.pop().ok_or(())?)
        } else {
            Ok(ScriptNode::Plus(terms))
        }
    }

    fn parse_postfix(&mut self) -> Result<ScriptNode, ()> {
        let mut node = self.parse_primary()?;
        while self.eat_punct('(') {
            let mut args = Vec::new();
            if !self.eat_punct(')') {
                loop {
                    args.push(self.parse_assign()?);
                    if self.eat_punct(',') {
                        continue;
                    }
                    if self.eat_punct(')') {
                        break;
                    }
                    return Err(());
                }
            }
            node = ScriptNode::Call {
                callee: Box::new(node),
                args,
            };
        }
        Ok(node)
    }

    fn parse_primary(&mut self) -> Result<ScriptNode, ()> {
        match self.next() {
            Some(Token::Num(n)) => Ok(ScriptNode::Number(n)),
            Some(Token::Str(s)) => Ok(ScriptNode::Str(s)),
            Some(Token::Ident(first)) => {
                let mut path = first;
                let mut dotted = false;
                while self.peek() == Some(&Token::Punct('.')) {
                    if let Some(Token::Ident(next)) = self.tokens.get(self.pos + 1) {
                        path.push('.');
                        path.push_str(next);
                        self.pos += 2;
                        dotted = true;
                    } else {
                        break;
                    }
                }
                if dotted {
                    Ok(ScriptNode::Member(path))
                } else {
                    Ok(ScriptNode::Identifier(path))
                }
            }
            Some(Token::Punct('(')) => {
                let inner = self.parse_assign()?;
                if !self.eat_punct(')') {
                    return Err(());
                }
                Ok(inner)
            }
            Some(Token::Punct('{')) => self.parse_object_init(),
            _ => Err(()),
        }
    }

    fn parse_object_init(&mut self) -> Result<ScriptNode, ()> {
        let mut props = Vec::new();
        if self.eat_punct('}') {
            return Ok(ScriptNode::ObjectInit(props));
        }
        loop {
            let name = match self.next() {
                Some(Token::Ident(n)) => ScriptNode::Str(n),
                Some(Token::Str(s)) => ScriptNode::Str(s),
                _ => return Err(()),
            };
            if !self.eat_punct(':') {
                return Err(());
            }
            let value = self.parse_assign()?;
            props.push(ScriptNode::PropertyInit {
                name: Box::new(name),
                value: Box::new(value),
            });
            if self.eat_punct(',') {
                continue;
            }
            if self.eat_punct('}') {
                break;
            }
            return Err(());
        }
        Ok(ScriptNode::ObjectInit(props))
    }
}

/// Parse a script into the reduced AST. Statements that do not fit the
/// grammar are dropped; the result is always a `Program`, possibly empty.
pub fn parse(src: &str) -> ScriptNode {
    let mut parser = Parser {
        tokens: tokenize(src),
        pos: 0,
    };
    parser.parse_program()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::ScriptNode::*;

    #[test]
    fn var_with_string_initializer() {
        let ast = parse("var url = \"http://x/\";");
        assert_eq!(
            ast,
            Program(vec![Var(vec![(
                "url".to_string(),
                Some(Str("http://x/".to_string()))
            )])])
        );
    }

    #[test]
    fn plus_chain_is_flattened() {
        let ast = parse("var u = \"a\" + \"b\" + 3;");
        match ast {
            Program(stmts) => match &stmts[0] {
                Var(decls) => {
                    assert!(matches!(&decls[0].1, Some(Plus(terms)) if terms.len() == 3))
                }
                other => panic!("unexpected {:?}", other),
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn member_assignment() {
        let ast = parse("document.location = \"/next\";");
        assert_eq!(
            ast,
            Program(vec![ExprStmt(Box::new(Assign {
                target: Box::new(Member("document.location".to_string())),
                value: Box::new(Str("/next".to_string())),
            }))])
        );
    }

    #[test]
    fn call_with_arguments() {
        let ast = parse("window.open(\"http://x/y\", \"w\");");
        match ast {
            Program(stmts) => match &stmts[0] {
                ExprStmt(e) => match e.as_ref() {
                    Call { callee, args } => {
                        assert_eq!(**callee, Member("window.open".to_string()));
                        assert_eq!(args.len(), 2);
                    }
                    other => panic!("unexpected {:?}", other),
                },
                other => panic!("unexpected {:?}", other),
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn unsupported_statement_does_not_hide_the_rest() {
        let src = "if (x > 3) return; document.location = \"/found\";";
        let ast = parse(src);
        match ast {
            Program(stmts) => {
                assert!(stmts.iter().any(|s| matches!(
                    s,
                    ExprStmt(e) if matches!(e.as_ref(), Assign { .. })
                )));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn function_body_is_kept() {
        let ast = parse("function go(a, b) { document.href = \"/f\"; }");
        match ast {
            Program(stmts) => match &stmts[0] {
                Function { name, body } => {
                    assert_eq!(name.as_deref(), Some("go"));
                    assert!(matches!(body.as_ref(), Program(inner) if inner.len() == 1));
                }
                other => panic!("unexpected {:?}", other),
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn comments_are_ignored() {
        let ast = parse("// nothing\n/* also\nnothing */ var a = 1;");
        assert_eq!(
            ast,
            Program(vec![Var(vec![("a".to_string(), Some(Number(1.0)))])])
        );
    }

    #[test]
    fn object_init_properties() {
        let ast = parse("var o = { url: \"/x\", n: 2 };");
        match ast {
            Program(stmts) => match &stmts[0] {
                Var(decls) => match &decls[0].1 {
                    Some(ObjectInit(props)) => assert_eq!(props.len(), 2),
                    other => panic!("unexpected {:?}", other),
                },
                other => panic!("unexpected {:?}", other),
            },
            other => panic!("unexpected {:?}", other),
        }
    }
}
