//! Best-effort interpretation of in-page scripts for link discovery.
//!
//! The supported node set below is the contract: variable declarations,
//! string/number literals, `+` concatenation, function declarations,
//! statement wrappers (`with`, expression statements, object initializers),
//! member access, assignments to navigation sinks (`href`, `location`,
//! `action`, `src`) and calls to `window.open` or async-request helpers.
//! Unsupported syntax is skipped, never raised: extracting some dynamic
//! links beats failing the whole page.

pub mod interpreter;
pub mod parser;

pub use interpreter::extract_script_links;
pub use parser::parse;

/// Reduced script AST. Produced by [`parser::parse`], walked by
/// [`interpreter::LinkInterpreter`].
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptNode {
    Program(Vec<ScriptNode>),
    /// `var a = init, b;`
    Var(Vec<(String, Option<ScriptNode>)>),
    Identifier(String),
    Number(f64),
    Str(String),
    /// N-ary `+` chain, evaluated left to right with string/number coercion.
    Plus(Vec<ScriptNode>),
    /// Function declaration; the name is irrelevant for link discovery, the
    /// body is walked as if it executed.
    Function {
        name: Option<String>,
        body: Box<ScriptNode>,
    },
    ExprStmt(Box<ScriptNode>),
    With(Vec<ScriptNode>),
    ObjectInit(Vec<ScriptNode>),
    PropertyInit {
        name: Box<ScriptNode>,
        value: Box<ScriptNode>,
    },
    /// Member access as a textual dotted path, e.g. `document.location`.
    Member(String),
    Assign {
        target: Box<ScriptNode>,
        value: Box<ScriptNode>,
    },
    Call {
        callee: Box<ScriptNode>,
        args: Vec<ScriptNode>,
    },
}
