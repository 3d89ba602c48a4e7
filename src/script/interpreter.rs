//! Abstract evaluation of the reduced script AST.
//!
//! The interpreter tracks string and number bindings, folds `+` chains with
//! JavaScript-style coercion ("a" + 1 is "a1") and records every value that
//! reaches a navigation sink: assignments whose target ends with `.href`,
//! `.location`, `.action` or `.src`, calls to `window.open`, and calls to an
//! async-request helper where the first argument names an HTTP method.
//! Unbound identifiers flow through as their own name, which keeps partially
//! understood scripts producing usable relative links.

use std::collections::HashMap;

use crate::script::{parser, ScriptNode};

const SINK_SUFFIXES: [&str; 4] = [".href", ".location", ".action", ".src"];

#[derive(Debug, Clone, PartialEq)]
enum Value {
    Str(String),
    Num(f64),
}

impl Value {
    fn render(&self) -> String {
        match self {
            Value::Str(s) => s.clone(),
            Value::Num(n) => format_number(*n),
        }
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// Walks a parsed script and collects candidate link strings, in the order
/// their sinks are reached.
pub struct LinkInterpreter<'a> {
    env: HashMap<String, Value>,
    links: Vec<String>,
    async_suffix: &'a str,
}

impl<'a> LinkInterpreter<'a> {
    /// `async_suffix` is the dotted tail of the site's async-request helper,
    /// e.g. ".asyncRequest".
    pub fn new(async_suffix: &'a str) -> Self {
        LinkInterpreter {
            env: HashMap::new(),
            links: Vec::new(),
            async_suffix,
        }
    }

    pub fn run(mut self, ast: &ScriptNode) -> Vec<String> {
        self.eval(ast);
        self.links
    }

    fn eval(&mut self, node: &ScriptNode) -> Option<Value> {
        match node {
            ScriptNode::Program(stmts) | ScriptNode::With(stmts) => {
                for s in stmts {
                    self.eval(s);
                }
                None
            }
            ScriptNode::Var(decls) => {
                for (name, init) in decls {
                    if let Some(init) = init {
                        if let Some(v) = self.eval(init) {
                            self.env.insert(name.clone(), v);
                        }
                    }
                }
                None
            }
            ScriptNode::Identifier(name) => Some(
                self.env
                    .get(name)
                    .cloned()
                    .unwrap_or_else(|| Value::Str(name.clone())),
            ),
            ScriptNode::Number(n) => Some(Value::Num(*n)),
            ScriptNode::Str(s) => Some(Value::Str(s.clone())),
            ScriptNode::Plus(terms) => self.eval_plus(terms),
            ScriptNode::Function { body, .. } => {
                // bodies run as if called; links inside still count
                self.eval(body);
                None
            }
            ScriptNode::ExprStmt(e) => {
                self.eval(e);
                None
            }
            ScriptNode::ObjectInit(props) => {
                for p in props {
                    self.eval(p);
                }
                None
            }
            ScriptNode::PropertyInit { name, value } => {
                self.eval(value);
                self.eval(name)
            }
            ScriptNode::Member(path) => Some(Value::Str(path.clone())),
            ScriptNode::Assign { target, value } => self.eval_assign(target, value),
            ScriptNode::Call { callee, args } => self.eval_call(callee, args),
        }
    }

    fn eval_plus(&mut self, terms: &[ScriptNode]) -> Option<Value> {
        let mut acc: Option<Value> = None;
        for term in terms {
            let Some(v) = self.eval(term) else { continue };
            acc = Some(match (acc, v) {
                (None, v) => v,
                (Some(Value::Num(a)), Value::Num(b)) => Value::Num(a + b),
                (Some(a), b) => Value::Str(a.render() + &b.render()),
            });
        }
        acc
    }

    fn eval_assign(&mut self, target: &ScriptNode, value: &ScriptNode) -> Option<Value> {
        let v = self.eval(value)?;
        match target {
            ScriptNode::Member(path) => {
                if SINK_SUFFIXES.iter().any(|s| path.ends_with(s)) {
                    self.links.push(v.render());
                }
            }
            ScriptNode::Identifier(name) => {
                self.env.insert(name.clone(), v.clone());
            }
            _ => {}
        }
        Some(v)
    }

    fn eval_call(&mut self, callee: &ScriptNode, args: &[ScriptNode]) -> Option<Value> {
        let values: Vec<Option<Value>> = args.iter().map(|a| self.eval(a)).collect();
        let path = match callee {
            ScriptNode::Member(p) => p.as_str(),
            ScriptNode::Identifier(n) => n.as_str(),
            _ => return None,
        };
        if path == "window.open" {
            if let Some(Some(v)) = values.first() {
                self.links.push(v.render());
            }
        } else if path.ends_with(self.async_suffix) {
            if let (Some(Some(Value::Str(method))), Some(Some(target))) =
                (values.first(), values.get(1))
            {
                if method.eq_ignore_ascii_case("get") || method.eq_ignore_ascii_case("post") {
                    self.links.push(target.render());
                }
            }
        }
        None
    }
}

/// Parse `source` and return every link its sinks would receive.
/// Unsupported syntax degrades to fewer links, never to an error.
pub fn extract_script_links(source: &str, async_suffix: &str) -> Vec<String> {
    let ast = parser::parse(source);
    LinkInterpreter::new(async_suffix).run(&ast)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn links(src: &str) -> Vec<String> {
        extract_script_links(src, ".asyncRequest")
    }

    #[test]
    fn concatenation_coerces_numbers() {
        let got = links("var page = \"view.php?id=\" + 1; document.location = page;");
        assert_eq!(got, vec!["view.php?id=1"]);
    }

    #[test]
    fn window_open_reports_exactly_once() {
        let got = links("window.open(\"http://site.test/popup.php\");");
        assert_eq!(got, vec!["http://site.test/popup.php"]);
    }

    #[test]
    fn async_request_needs_http_method() {
        let got = links(
            "YAHOO.util.Connect.asyncRequest(\"GET\", \"/ajax/list.php\");\n\
             YAHOO.util.Connect.asyncRequest(\"frob\", \"/never.php\");",
        );
        assert_eq!(got, vec!["/ajax/list.php"]);
    }

    #[test]
    fn all_four_sink_suffixes_fire() {
        let got = links(
            "a.href = \"/one\"; document.location = \"/two\";\n\
             f.action = \"/three\"; img.src = \"/four\";",
        );
        assert_eq!(got, vec!["/one", "/two", "/three", "/four"]);
    }

    #[test]
    fn unbound_identifier_passes_through_as_name() {
        let got = links("document.location = mystery;");
        assert_eq!(got, vec!["mystery"]);
    }

    #[test]
    fn function_bodies_are_walked() {
        let got = links("function nav() { document.href = \"/inside\"; }");
        assert_eq!(got, vec!["/inside"]);
    }

    #[test]
    fn with_block_and_var_chain() {
        let got = links(
            "var base = \"/app/\";\n\
             with (document) { location = base + \"home.php\"; }",
        );
        // bare `location` inside with() is an identifier, not a member sink
        assert!(got.is_empty());
        let got = links(
            "var base = \"/app/\";\n\
             with (document) { document.location = base + \"home.php\"; }",
        );
        assert_eq!(got, vec!["/app/home.php"]);
    }

    #[test]
    fn broken_statement_does_not_suppress_later_links() {
        let got = links("foo ??!; window.open(\"/still-here\");");
        assert_eq!(got, vec!["/still-here"]);
    }

    #[test]
    fn numeric_addition_stays_numeric() {
        let got = links("var n = 1 + 2; document.location = \"/p?n=\" + n;");
        assert_eq!(got, vec!["/p?n=3"]);
    }
}
