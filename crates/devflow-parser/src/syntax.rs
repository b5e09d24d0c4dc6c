//! Recursive-descent parser building a [`Graph`] from tokenized lines.

use std::collections::HashMap;

use devflow_ir::{
    Block, Constant, Device, Dimension, Graph, Handle, NodeKind, ScalarType, TensorShape,
    TensorType, Type, Value,
};

use crate::ParseError;
use crate::lexer::{Token, tokenize};

struct Line {
    number: usize,
    tokens: Vec<Token>,
}

/// Cursor over the tokens of a single line.
struct Cursor<'a> {
    tokens: &'a [Token],
    pos: usize,
    line: usize,
}

impl<'a> Cursor<'a> {
    fn new(line: &'a Line) -> Self {
        Self {
            tokens: &line.tokens,
            pos: 0,
            line: line.number,
        }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::Syntax {
            line: self.line,
            message: message.into(),
        }
    }

    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<&'a Token> {
        let token = self.tokens.get(self.pos);
        self.pos += 1;
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &Token) -> Result<(), ParseError> {
        match self.next() {
            Some(token) if token == expected => Ok(()),
            Some(token) => Err(self.error(format!(
                "expected {}, found {}",
                expected.describe(),
                token.describe()
            ))),
            None => Err(self.error(format!(
                "expected {}, found end of line",
                expected.describe()
            ))),
        }
    }

    fn ident(&mut self) -> Result<&'a str, ParseError> {
        match self.next() {
            Some(Token::Ident(name)) => Ok(name),
            Some(token) => Err(self.error(format!(
                "expected identifier, found {}",
                token.describe()
            ))),
            None => Err(self.error("expected identifier, found end of line")),
        }
    }

    fn value_name(&mut self) -> Result<&'a str, ParseError> {
        match self.next() {
            Some(Token::Value(name)) => Ok(name),
            Some(token) => Err(self.error(format!(
                "expected value, found {}",
                token.describe()
            ))),
            None => Err(self.error("expected value, found end of line")),
        }
    }

    fn finish(&self) -> Result<(), ParseError> {
        match self.peek() {
            None => Ok(()),
            Some(token) => Err(self.error(format!(
                "unexpected {} at end of line",
                token.describe()
            ))),
        }
    }

    /// Parses `open item (, item)* close`, allowing an empty list.
    fn list<T>(
        &mut self,
        open: &Token,
        close: &Token,
        mut item: impl FnMut(&mut Self) -> Result<T, ParseError>,
    ) -> Result<Vec<T>, ParseError> {
        self.expect(open)?;
        let mut items = Vec::new();
        if self.eat(close) {
            return Ok(items);
        }
        loop {
            items.push(item(self)?);
            if self.eat(close) {
                return Ok(items);
            }
            self.expect(&Token::Comma)?;
        }
    }

    fn ty(&mut self) -> Result<Type, ParseError> {
        let name = self.ident()?;
        let mut ty = match name {
            "Tensor" => Type::Tensor(self.tensor_refinement()?),
            "int" => Type::Int,
            "float" => Type::Float,
            "number" => Type::Number,
            "bool" => Type::Bool,
            "str" => Type::Str,
            "Device" => Type::Device,
            "None" => Type::NoneType,
            "Any" => Type::Any,
            "List" => {
                self.expect(&Token::LBracket)?;
                let element = self.ty()?;
                self.expect(&Token::RBracket)?;
                Type::list(element)
            }
            "Union" => Type::Union(self.list(&Token::LBracket, &Token::RBracket, Self::ty)?),
            other => return Err(self.error(format!("unknown type '{other}'"))),
        };
        while self.eat(&Token::Question) {
            ty = Type::optional(ty);
        }
        Ok(ty)
    }

    /// Parses the optional `(dtype=.., shape=[..], device=..)` after `Tensor`.
    fn tensor_refinement(&mut self) -> Result<TensorType, ParseError> {
        let mut tensor = TensorType::default();
        if self.peek() != Some(&Token::LParen) {
            return Ok(tensor);
        }
        self.list(&Token::LParen, &Token::RParen, |c| {
            let field = c.ident()?;
            c.expect(&Token::Eq)?;
            match field {
                "dtype" => {
                    let name = c.ident()?;
                    let dtype = name
                        .parse::<ScalarType>()
                        .map_err(|()| c.error(format!("unknown dtype '{name}'")))?;
                    tensor.dtype = Some(dtype);
                }
                "shape" => {
                    let dims = c.list(&Token::LBracket, &Token::RBracket, |c| match c.next() {
                        Some(Token::Int(n)) if *n >= 0 => Ok(Dimension::Fixed(*n as u64)),
                        Some(Token::Question) => Ok(Dimension::Dynamic),
                        _ => Err(c.error("expected a dimension size or '?'")),
                    })?;
                    tensor.shape = Some(TensorShape { dims });
                }
                "device" => tensor.device = Some(c.device_spec()?),
                other => return Err(c.error(format!("unknown tensor field '{other}'"))),
            }
            Ok(())
        })?;
        Ok(tensor)
    }

    /// Parses `kind` or `kind:index` written without quotes.
    fn device_spec(&mut self) -> Result<Device, ParseError> {
        let mut spec = self.ident()?.to_string();
        if self.eat(&Token::Colon) {
            match self.next() {
                Some(Token::Int(index)) => spec.push_str(&format!(":{index}")),
                _ => return Err(self.error("expected a device index after ':'")),
            }
        }
        spec.parse().map_err(|source| ParseError::Ir {
            line: self.line,
            source,
        })
    }

    fn literal(&mut self) -> Result<Constant, ParseError> {
        match self.next() {
            Some(Token::Int(v)) => Ok(Constant::Int(*v)),
            Some(Token::Float(v)) => Ok(Constant::Float(*v)),
            Some(Token::Str(s)) => Ok(Constant::Str(s.clone())),
            Some(Token::Ident(name)) => match name.as_str() {
                "true" => Ok(Constant::Bool(true)),
                "false" => Ok(Constant::Bool(false)),
                "None" => Ok(Constant::None),
                "inf" => Ok(Constant::Float(f64::INFINITY)),
                "NaN" => Ok(Constant::Float(f64::NAN)),
                "device" => {
                    self.expect(&Token::LParen)?;
                    let Some(Token::Str(spec)) = self.next() else {
                        return Err(self.error("expected a quoted device string"));
                    };
                    self.expect(&Token::RParen)?;
                    spec.parse()
                        .map(Constant::Device)
                        .map_err(|source| ParseError::Ir {
                            line: self.line,
                            source,
                        })
                }
                other => Err(self.error(format!("unknown literal '{other}'"))),
            },
            Some(token) => Err(self.error(format!(
                "expected a literal, found {}",
                token.describe()
            ))),
            None => Err(self.error("expected a literal, found end of line")),
        }
    }
}

pub(crate) struct Parser {
    lines: Vec<Line>,
    pos: usize,
    graph: Graph,
    scope: HashMap<String, Handle<Value>>,
}

impl Parser {
    pub(crate) fn new(source: &str) -> Result<Self, ParseError> {
        let mut lines = Vec::new();
        for (i, text) in source.lines().enumerate() {
            let tokens = tokenize(text, i + 1)?;
            if !tokens.is_empty() {
                lines.push(Line {
                    number: i + 1,
                    tokens,
                });
            }
        }
        Ok(Self {
            lines,
            pos: 0,
            graph: Graph::new(),
            scope: HashMap::new(),
        })
    }

    pub(crate) fn parse_graph(mut self) -> Result<Graph, ParseError> {
        let root = self.graph.root();

        let line = self.next_line()?;
        let mut c = Cursor::new(line);
        if c.ident()? != "graph" {
            return Err(c.error("expected 'graph'"));
        }
        let params = c.list(&Token::LParen, &Token::RParen, |c| {
            let name = c.value_name()?;
            c.expect(&Token::Colon)?;
            Ok((name.to_string(), c.ty()?))
        })?;
        c.expect(&Token::Colon)?;
        c.finish()?;
        let number = c.line;
        for (name, ty) in params {
            let value = self.graph.add_block_param(root, Some(name.clone()), ty);
            self.define(number, name, value)?;
        }

        self.parse_nodes(root)?;

        let line = self.next_line()?;
        let mut c = Cursor::new(line);
        if c.ident()? != "return" {
            return Err(c.error("expected 'return'"));
        }
        let names = c.list(&Token::LParen, &Token::RParen, |c| {
            c.value_name().map(str::to_string)
        })?;
        c.finish()?;
        let number = c.line;
        let outputs = self.resolve_all(number, &names)?;
        self.graph.set_outputs(outputs);

        if let Some(extra) = self.lines.get(self.pos) {
            return Err(ParseError::Syntax {
                line: extra.number,
                message: "unexpected content after 'return'".into(),
            });
        }
        Ok(self.graph)
    }

    fn next_line(&mut self) -> Result<&Line, ParseError> {
        let line = self.lines.get(self.pos).ok_or(ParseError::UnexpectedEof)?;
        self.pos += 1;
        Ok(line)
    }

    fn peek_first(&self) -> Option<&Token> {
        self.lines.get(self.pos).and_then(|l| l.tokens.first())
    }

    fn is_block_header(&self) -> bool {
        let Some(line) = self.lines.get(self.pos) else {
            return false;
        };
        matches!(
            line.tokens.as_slice(),
            [Token::Ident(name), Token::LParen, ..]
                if name.strip_prefix("block").is_some_and(|n| n.parse::<usize>().is_ok())
        )
    }

    fn define(&mut self, line: usize, name: String, value: Handle<Value>) -> Result<(), ParseError> {
        if self.scope.contains_key(&name) {
            return Err(ParseError::Redefinition { line, name });
        }
        self.scope.insert(name, value);
        Ok(())
    }

    fn resolve_all(&self, line: usize, names: &[String]) -> Result<Vec<Handle<Value>>, ParseError> {
        names
            .iter()
            .map(|name| {
                self.scope
                    .get(name)
                    .copied()
                    .ok_or_else(|| ParseError::UndefinedValue {
                        line,
                        name: name.clone(),
                    })
            })
            .collect()
    }

    /// Parses node lines into `block` until a `->` or `return` line.
    fn parse_nodes(&mut self, block: Handle<Block>) -> Result<(), ParseError> {
        loop {
            match self.peek_first() {
                None => return Err(ParseError::UnexpectedEof),
                Some(Token::Arrow) => return Ok(()),
                Some(Token::Ident(name)) if name == "return" => return Ok(()),
                Some(_) => self.parse_node(block)?,
            }
        }
    }

    fn parse_node(&mut self, block: Handle<Block>) -> Result<(), ParseError> {
        let line = self.next_line()?;
        let number = line.number;
        let mut c = Cursor::new(line);

        let mut outputs = Vec::new();
        if matches!(c.peek(), Some(Token::Value(_))) {
            loop {
                let name = c.value_name()?.to_string();
                c.expect(&Token::Colon)?;
                outputs.push((name, c.ty()?));
                if !c.eat(&Token::Comma) {
                    break;
                }
            }
            c.expect(&Token::Eq)?;
        }

        let op = c.ident()?;
        let mut attrs = Vec::new();
        if c.peek() == Some(&Token::LBracket) {
            attrs = c.list(&Token::LBracket, &Token::RBracket, |c| {
                let key = c.ident()?.to_string();
                c.expect(&Token::Eq)?;
                Ok((key, c.literal()?))
            })?;
        }
        let inputs = c.list(&Token::LParen, &Token::RParen, |c| {
            c.value_name().map(str::to_string)
        })?;
        c.finish()?;
        let kind = node_kind(op, attrs).map_err(|message| c.error(message))?;

        let inputs = self.resolve_all(number, &inputs)?;
        let node = self.graph.append_node(
            block,
            kind,
            inputs,
            outputs
                .iter()
                .map(|(name, ty)| (Some(name.clone()), ty.clone()))
                .collect(),
        );
        while self.is_block_header() {
            let child = self.graph.add_block(node);
            self.parse_block(child)?;
        }

        // A node's results are not visible inside its own blocks.
        let values = self.graph.nodes[node].outputs.clone();
        for ((name, _), value) in outputs.into_iter().zip(values) {
            self.define(number, name, value)?;
        }
        Ok(())
    }

    /// Parses `blockN(params):`, its nodes, and the closing `-> (values)`.
    fn parse_block(&mut self, block: Handle<Block>) -> Result<(), ParseError> {
        let line = self.next_line()?;
        let number = line.number;
        let mut c = Cursor::new(line);
        c.ident()?;
        let params = c.list(&Token::LParen, &Token::RParen, |c| {
            let name = c.value_name()?;
            c.expect(&Token::Colon)?;
            Ok((name.to_string(), c.ty()?))
        })?;
        c.expect(&Token::Colon)?;
        c.finish()?;
        for (name, ty) in params {
            let value = self.graph.add_block_param(block, Some(name.clone()), ty);
            self.define(number, name, value)?;
        }

        self.parse_nodes(block)?;

        let line = self.next_line()?;
        let number = line.number;
        let mut c = Cursor::new(line);
        c.expect(&Token::Arrow)?;
        let names = c.list(&Token::LParen, &Token::RParen, |c| {
            c.value_name().map(str::to_string)
        })?;
        c.finish()?;
        let outputs = self.resolve_all(number, &names)?;
        self.graph.set_block_outputs(block, outputs);
        Ok(())
    }
}

/// Maps a qualified operator name and its attributes to a [`NodeKind`].
fn node_kind(name: &str, attrs: Vec<(String, Constant)>) -> Result<NodeKind, String> {
    let mut attrs = attrs.into_iter();
    let kind = match name {
        "prim::If" => NodeKind::If,
        "prim::Loop" => NodeKind::Loop,
        "prim::CallFunction" => NodeKind::CallFunction,
        "prim::ListConstruct" => NodeKind::ListConstruct,
        "prim::ListUnpack" => NodeKind::ListUnpack,
        "prim::Constant" => match attrs.next() {
            None => NodeKind::Constant(Constant::None),
            Some((key, value)) if key == "value" => NodeKind::Constant(value),
            Some((key, _)) => return Err(format!("unknown attribute '{key}' on {name}")),
        },
        "prim::CallMethod" => match attrs.next() {
            Some((key, Constant::Str(method))) if key == "name" => {
                NodeKind::CallMethod { name: method }
            }
            _ => return Err(format!("{name} requires a name=\"...\" attribute")),
        },
        op if op.starts_with("aten::") => NodeKind::Operator(op.to_string()),
        other => NodeKind::Other(other.to_string()),
    };
    match attrs.next() {
        Some((key, _)) => Err(format!("unexpected attribute '{key}' on {name}")),
        None => Ok(kind),
    }
}
