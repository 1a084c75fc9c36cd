//! Abstract Syntax Tree types for the template language

/// Byte range in source text
pub type Span = std::ops::Range<usize>;

/// AST node with source location
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned<T> {
    pub node: T,
    pub span: Span,
}

impl<T> Spanned<T> {
    pub fn new(node: T, span: Span) -> Self {
        Self { node, span }
    }
}

/// Field label or reference segment
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier(pub String);

impl Identifier {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Basic type constraints (`string`, `int`, ...)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    String,
    Int,
    Float,
    /// Either an int or a float
    Number,
    Bool,
}

impl Kind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::String => "string",
            Kind::Int => "int",
            Kind::Float => "float",
            Kind::Number => "number",
            Kind::Bool => "bool",
        }
    }
}

impl std::fmt::Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One parsed fragment
#[derive(Debug, Clone, PartialEq)]
pub struct File {
    /// Fragment name (`-`, `context`, `parameter`, ...)
    pub name: String,
    /// Top-level fields, always an [`Expr::Struct`]
    pub body: Spanned<Expr>,
}

impl File {
    /// Top-level fields of the fragment
    pub fn fields(&self) -> &[Spanned<Field>] {
        match &self.body.node {
            Expr::Struct(fields) => fields,
            _ => &[],
        }
    }
}

/// `label: value` or `label?: value`
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub label: Spanned<Identifier>,
    pub optional: bool,
    pub value: Spanned<Expr>,
}

/// One alternative of a disjunction
#[derive(Debug, Clone, PartialEq)]
pub struct Alternative {
    /// Marked with `*`
    pub default: bool,
    pub expr: Spanned<Expr>,
}

/// Piece of a string literal
#[derive(Debug, Clone, PartialEq)]
pub enum StringPart {
    Literal(String),
    /// `\(a.b.c)`
    Reference(Vec<Spanned<Identifier>>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// `_`
    Top,
    Kind(Kind),
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    /// String literal containing `\(...)`
    Interpolation(Vec<StringPart>),
    /// Dotted reference, e.g. `context.name`
    Reference(Vec<Spanned<Identifier>>),
    Struct(Vec<Spanned<Field>>),
    List(Vec<Spanned<Expr>>),
    /// `a & b & ...`
    Unify(Vec<Spanned<Expr>>),
    /// `a | *b | ...`
    Disjunction(Vec<Alternative>),
}

impl Expr {
    /// Dotted form of a reference, used in messages
    pub fn reference_name(segments: &[Spanned<Identifier>]) -> String {
        segments
            .iter()
            .map(|s| s.node.as_str())
            .collect::<Vec<_>>()
            .join(".")
    }
}
