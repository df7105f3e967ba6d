//! Parses the query text carried in a typed-graph request envelope into an
//! [`Operation`] (§4.13, §3 Operation). Query validation against the merged
//! schema is out of scope (§1 Non-goals) — this module only turns tokens
//! into the shape the planner expects, rejecting text that isn't even
//! well-formed GraphQL.
//!
//! A hand-rolled recursive-descent parser rather than a generated one: the
//! executable-document grammar this crate accepts is a small, fixed subset
//! (no type system definitions, no schema extensions), and direct control
//! over error messages is worth more here than a general-purpose grammar.

use std::collections::HashMap;
use std::iter::Peekable;
use std::str::CharIndices;

use gateway_json::Value;

use crate::error::GatewayError;
use crate::operation::{Directive, Field, FragmentDefinition, FragmentSpread, InlineFragment, Operation, OperationKind, Selection, SelectionSet};

/// Parses `source` and lowers the operation named `operation_name` (or the
/// document's sole operation, if it has exactly one) into an [`Operation`],
/// applying `variables` over any declared defaults.
pub fn parse(source: &str, operation_name: Option<&str>, variables: HashMap<String, Value>) -> Result<Operation, GatewayError> {
    let definitions = Lexer::new(source).parse_document()?;

    let mut fragments = HashMap::new();
    let mut operations = Vec::new();
    for definition in definitions {
        match definition {
            RawDefinition::Operation(op) => operations.push(op),
            RawDefinition::Fragment(name, def) => {
                fragments.insert(name, def);
            }
        }
    }

    let chosen = match operation_name {
        Some(name) => operations
            .into_iter()
            .find(|op| op.name.as_deref() == Some(name))
            .ok_or_else(|| GatewayError::Planner(format!("no operation named `{name}` in the request document")))?,
        None => match operations.len() {
            1 => operations.into_iter().next().unwrap(),
            0 => return Err(GatewayError::Planner("request document contains no operations".into())),
            _ => return Err(GatewayError::Planner("operationName is required when a document defines more than one operation".into())),
        },
    };

    let mut resolved_variables = HashMap::new();
    for (name, default) in chosen.variable_defaults {
        resolved_variables.insert(name, default);
    }
    resolved_variables.extend(variables);

    Ok(Operation { kind: chosen.kind, name: chosen.name, selection_set: chosen.selection_set, fragments, variables: resolved_variables })
}

struct RawOperation {
    kind: OperationKind,
    name: Option<String>,
    variable_defaults: HashMap<String, Value>,
    selection_set: SelectionSet,
}

enum RawDefinition {
    Operation(RawOperation),
    Fragment(String, FragmentDefinition),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Name(String),
    IntValue(i64),
    FloatValue(f64),
    StringValue(String),
    Dollar,
    Bang,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Colon,
    Equals,
    At,
    Spread,
    Eof,
}

/// A thin char-level lexer feeding a single-token lookahead parser. GraphQL
/// has no keywords at the lexical level (`query`/`fragment`/`on` are plain
/// names); the parser distinguishes them positionally.
struct Lexer<'a> {
    source: &'a str,
    chars: Peekable<CharIndices<'a>>,
    lookahead: Option<Token>,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Lexer { source, chars: source.char_indices().peekable(), lookahead: None }
    }

    fn parse_document(mut self) -> Result<Vec<RawDefinition>, GatewayError> {
        let mut definitions = Vec::new();
        self.advance()?;
        while self.lookahead != Some(Token::Eof) {
            definitions.push(self.parse_definition()?);
        }
        Ok(definitions)
    }

    fn parse_definition(&mut self) -> Result<RawDefinition, GatewayError> {
        let keyword = self.peek_name().map(str::to_string);
        match keyword.as_deref() {
            Some("fragment") => {
                self.advance()?;
                let name = self.expect_name()?;
                self.expect_name_exact("on")?;
                let type_condition = self.expect_name()?;
                self.skip_directives()?;
                let selection_set = self.parse_selection_set()?;
                Ok(RawDefinition::Fragment(name.clone(), FragmentDefinition { name, type_condition, selection_set }))
            }
            Some(kw @ "query") | Some(kw @ "mutation") => {
                let kind = if kw == "query" { OperationKind::Query } else { OperationKind::Mutation };
                self.advance()?;
                let name = match self.lookahead {
                    Some(Token::Name(_)) => Some(self.expect_name()?),
                    _ => None,
                };
                let variable_defaults = self.parse_variable_definitions()?;
                self.skip_directives()?;
                let selection_set = self.parse_selection_set()?;
                Ok(RawDefinition::Operation(RawOperation { kind, name, variable_defaults, selection_set }))
            }
            Some(other) => Err(GatewayError::Planner(format!("unexpected top-level definition `{other}`"))),
            None if self.lookahead == Some(Token::LBrace) => {
                // Shorthand `{ ... }` query with no `query` keyword.
                let selection_set = self.parse_selection_set()?;
                Ok(RawDefinition::Operation(RawOperation { kind: OperationKind::Query, name: None, variable_defaults: HashMap::new(), selection_set }))
            }
            None => Err(GatewayError::Planner("expected a query, mutation, or fragment definition".into())),
        }
    }

    fn parse_variable_definitions(&mut self) -> Result<HashMap<String, Value>, GatewayError> {
        let mut defaults = HashMap::new();
        if self.lookahead != Some(Token::LParen) {
            return Ok(defaults);
        }
        self.advance()?;
        while self.lookahead != Some(Token::RParen) {
            self.expect(Token::Dollar)?;
            let name = self.expect_name()?;
            self.expect(Token::Colon)?;
            self.parse_type_reference()?;
            if self.lookahead == Some(Token::Equals) {
                self.advance()?;
                let default = self.parse_value()?;
                defaults.insert(name, default);
            }
        }
        self.advance()?; // consume `)`
        Ok(defaults)
    }

    /// Type references are only validated for shape (`Name`, `[Type]`,
    /// trailing `!`s) and discarded — the planner never consults a client
    /// document's declared variable types (§1 Non-goals: query validation).
    fn parse_type_reference(&mut self) -> Result<(), GatewayError> {
        match &self.lookahead {
            Some(Token::LBracket) => {
                self.advance()?;
                self.parse_type_reference()?;
                self.expect(Token::RBracket)?;
            }
            Some(Token::Name(_)) => {
                self.advance()?;
            }
            other => return Err(GatewayError::Planner(format!("expected a type reference, found {other:?}"))),
        }
        if self.lookahead == Some(Token::Bang) {
            self.advance()?;
        }
        Ok(())
    }

    fn parse_selection_set(&mut self) -> Result<SelectionSet, GatewayError> {
        self.expect(Token::LBrace)?;
        let mut selections = Vec::new();
        while self.lookahead != Some(Token::RBrace) {
            selections.push(self.parse_selection()?);
        }
        self.advance()?; // consume `}`
        Ok(SelectionSet { selections })
    }

    fn parse_selection(&mut self) -> Result<Selection, GatewayError> {
        if self.lookahead == Some(Token::Spread) {
            self.advance()?;
            if self.peek_name() == Some("on") {
                self.advance()?;
                let type_condition = Some(self.expect_name()?);
                let directives = self.parse_directives()?;
                let selection_set = self.parse_selection_set()?;
                return Ok(Selection::InlineFragment(InlineFragment { type_condition, directives, selection_set }));
            }
            if let Some(Token::Name(_)) = &self.lookahead {
                let fragment_name = self.expect_name()?;
                let directives = self.parse_directives()?;
                return Ok(Selection::FragmentSpread(FragmentSpread { fragment_name, directives }));
            }
            let directives = self.parse_directives()?;
            let selection_set = self.parse_selection_set()?;
            return Ok(Selection::InlineFragment(InlineFragment { type_condition: None, directives, selection_set }));
        }

        let first = self.expect_name()?;
        let (alias, name) = if self.lookahead == Some(Token::Colon) {
            self.advance()?;
            (first, self.expect_name()?)
        } else {
            (first.clone(), first)
        };
        let arguments = self.parse_arguments()?;
        let directives = self.parse_directives()?;
        let selection_set = if self.lookahead == Some(Token::LBrace) { self.parse_selection_set()? } else { SelectionSet::default() };
        Ok(Selection::Field(Field { alias, name, arguments, directives, selection_set }))
    }

    fn parse_arguments(&mut self) -> Result<HashMap<String, Value>, GatewayError> {
        let mut arguments = HashMap::new();
        if self.lookahead != Some(Token::LParen) {
            return Ok(arguments);
        }
        self.advance()?;
        while self.lookahead != Some(Token::RParen) {
            let name = self.expect_name()?;
            self.expect(Token::Colon)?;
            arguments.insert(name, self.parse_value()?);
        }
        self.advance()?; // consume `)`
        Ok(arguments)
    }

    fn parse_directives(&mut self) -> Result<Vec<Directive>, GatewayError> {
        let mut directives = Vec::new();
        while self.lookahead == Some(Token::At) {
            self.advance()?;
            let name = self.expect_name()?;
            let arguments = self.parse_arguments()?;
            directives.push(Directive { name, arguments });
        }
        Ok(directives)
    }

    fn skip_directives(&mut self) -> Result<(), GatewayError> {
        self.parse_directives().map(|_| ())
    }

    /// Variable references are lowered to `Value::String("$name")`, the
    /// sentinel the rewriter and document formatter already use for them
    /// (§4.1, §4.4).
    fn parse_value(&mut self) -> Result<Value, GatewayError> {
        match self.lookahead.clone() {
            Some(Token::Dollar) => {
                self.advance()?;
                let name = self.expect_name()?;
                Ok(Value::String(format!("${name}")))
            }
            Some(Token::IntValue(n)) => {
                self.advance()?;
                Ok(Value::Number(n.into()))
            }
            Some(Token::FloatValue(n)) => {
                self.advance()?;
                Ok(Value::Number(serde_json::Number::from_f64(n).ok_or_else(|| GatewayError::Planner("non-finite float literal".into()))?))
            }
            Some(Token::StringValue(s)) => {
                self.advance()?;
                Ok(Value::String(s))
            }
            Some(Token::Name(name)) => {
                self.advance()?;
                match name.as_str() {
                    "true" => Ok(Value::Bool(true)),
                    "false" => Ok(Value::Bool(false)),
                    "null" => Ok(Value::Null),
                    _ => Ok(Value::String(name)), // enum value
                }
            }
            Some(Token::LBracket) => {
                self.advance()?;
                let mut items = Vec::new();
                while self.lookahead != Some(Token::RBracket) {
                    items.push(self.parse_value()?);
                }
                self.advance()?;
                Ok(Value::List(items))
            }
            Some(Token::LBrace) => {
                self.advance()?;
                let mut object = indexmap::IndexMap::new();
                while self.lookahead != Some(Token::RBrace) {
                    let name = self.expect_name()?;
                    self.expect(Token::Colon)?;
                    object.insert(name, self.parse_value()?);
                }
                self.advance()?;
                Ok(Value::Object(object))
            }
            other => Err(GatewayError::Planner(format!("expected a value, found {other:?}"))),
        }
    }

    fn peek_name(&self) -> Option<&str> {
        match &self.lookahead {
            Some(Token::Name(n)) => Some(n.as_str()),
            _ => None,
        }
    }

    fn expect_name(&mut self) -> Result<String, GatewayError> {
        match self.lookahead.take() {
            Some(Token::Name(n)) => {
                self.advance()?;
                Ok(n)
            }
            other => Err(GatewayError::Planner(format!("expected a name, found {other:?}"))),
        }
    }

    fn expect_name_exact(&mut self, expected: &str) -> Result<(), GatewayError> {
        let name = self.expect_name()?;
        if name != expected {
            return Err(GatewayError::Planner(format!("expected `{expected}`, found `{name}`")));
        }
        Ok(())
    }

    fn expect(&mut self, token: Token) -> Result<(), GatewayError> {
        if self.lookahead.as_ref() != Some(&token) {
            return Err(GatewayError::Planner(format!("expected {token:?}, found {:?}", self.lookahead)));
        }
        self.advance()
    }

    fn advance(&mut self) -> Result<(), GatewayError> {
        self.lookahead = Some(self.next_token()?);
        Ok(())
    }

    fn next_token(&mut self) -> Result<Token, GatewayError> {
        loop {
            let Some(&(start, c)) = self.chars.peek() else { return Ok(Token::Eof) };
            if c.is_whitespace() || c == ',' {
                self.chars.next();
                continue;
            }
            if c == '#' {
                while let Some(&(_, c)) = self.chars.peek() {
                    self.chars.next();
                    if c == '\n' {
                        break;
                    }
                }
                continue;
            }
            return match c {
                '$' => self.bump_and(Token::Dollar),
                '!' => self.bump_and(Token::Bang),
                '(' => self.bump_and(Token::LParen),
                ')' => self.bump_and(Token::RParen),
                '[' => self.bump_and(Token::LBracket),
                ']' => self.bump_and(Token::RBracket),
                '{' => self.bump_and(Token::LBrace),
                '}' => self.bump_and(Token::RBrace),
                ':' => self.bump_and(Token::Colon),
                '=' => self.bump_and(Token::Equals),
                '@' => self.bump_and(Token::At),
                '.' => self.lex_spread(start),
                '"' => self.lex_string(),
                '-' | '0'..='9' => self.lex_number(start),
                c if c == '_' || c.is_alphabetic() => self.lex_name(start),
                other => Err(GatewayError::Planner(format!("unexpected character `{other}` in request document"))),
            };
        }
    }

    fn bump_and(&mut self, token: Token) -> Result<Token, GatewayError> {
        self.chars.next();
        Ok(token)
    }

    fn lex_spread(&mut self, start: usize) -> Result<Token, GatewayError> {
        for _ in 0..3 {
            match self.chars.peek() {
                Some(&(_, '.')) => {
                    self.chars.next();
                }
                _ => return Err(GatewayError::Planner(format!("malformed `...` at byte {start}"))),
            }
        }
        Ok(Token::Spread)
    }

    fn lex_name(&mut self, start: usize) -> Result<Token, GatewayError> {
        let mut end = start;
        while let Some(&(idx, c)) = self.chars.peek() {
            if c == '_' || c.is_alphanumeric() {
                end = idx + c.len_utf8();
                self.chars.next();
            } else {
                break;
            }
        }
        Ok(Token::Name(self.source[start..end].to_string()))
    }

    fn lex_number(&mut self, start: usize) -> Result<Token, GatewayError> {
        let mut end = start;
        let mut is_float = false;
        if self.chars.peek().map(|&(_, c)| c) == Some('-') {
            end += 1;
            self.chars.next();
        }
        while let Some(&(idx, c)) = self.chars.peek() {
            match c {
                '0'..='9' => {
                    end = idx + 1;
                    self.chars.next();
                }
                '.' | 'e' | 'E' | '+' | '-' => {
                    is_float = true;
                    end = idx + 1;
                    self.chars.next();
                }
                _ => break,
            }
        }
        let text = &self.source[start..end];
        if is_float {
            text.parse::<f64>().map(Token::FloatValue).map_err(|_| GatewayError::Planner(format!("malformed float literal `{text}`")))
        } else {
            text.parse::<i64>().map(Token::IntValue).map_err(|_| GatewayError::Planner(format!("malformed int literal `{text}`")))
        }
    }

    fn lex_string(&mut self) -> Result<Token, GatewayError> {
        self.chars.next(); // consume opening quote
        let mut out = String::new();
        loop {
            match self.chars.next() {
                Some((_, '"')) => return Ok(Token::StringValue(out)),
                Some((_, '\\')) => match self.chars.next() {
                    Some((_, 'n')) => out.push('\n'),
                    Some((_, 't')) => out.push('\t'),
                    Some((_, 'r')) => out.push('\r'),
                    Some((_, '"')) => out.push('"'),
                    Some((_, '\\')) => out.push('\\'),
                    Some((_, '/')) => out.push('/'),
                    Some((_, other)) => out.push(other),
                    None => return Err(GatewayError::Planner("unterminated escape in string literal".into())),
                },
                Some((_, c)) => out.push(c),
                None => return Err(GatewayError::Planner("unterminated string literal".into())),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_shorthand_anonymous_query() {
        let op = parse("{ name }", None, HashMap::new()).unwrap();
        assert_eq!(op.kind, OperationKind::Query);
        assert_eq!(op.selection_set.selections.len(), 1);
    }

    #[test]
    fn parses_named_query_with_alias_and_arguments() {
        let op = parse(r#"query Named { g: gizmo(id: "abc") { name } }"#, None, HashMap::new()).unwrap();
        let Selection::Field(field) = &op.selection_set.selections[0] else { panic!("expected field") };
        assert_eq!(field.alias, "g");
        assert_eq!(field.name, "gizmo");
        assert_eq!(field.arguments.get("id"), Some(&Value::String("abc".to_string())));
        assert_eq!(field.selection_set.selections.len(), 1);
    }

    #[test]
    fn variable_reference_becomes_dollar_sentinel_and_default_applies() {
        let op = parse("query($id: ID = \"fallback\") { gizmo(id: $id) { name } }", None, HashMap::new()).unwrap();
        assert_eq!(op.variables.get("id"), Some(&Value::String("fallback".to_string())));
        let Selection::Field(field) = &op.selection_set.selections[0] else { panic!() };
        assert_eq!(field.arguments.get("id"), Some(&Value::String("$id".to_string())));
    }

    #[test]
    fn supplied_variable_overrides_default() {
        let mut vars = HashMap::new();
        vars.insert("id".to_string(), Value::String("real".to_string()));
        let op = parse("query($id: ID = \"fallback\") { name }", None, vars).unwrap();
        assert_eq!(op.variables.get("id"), Some(&Value::String("real".to_string())));
    }

    #[test]
    fn parses_fragment_spread_and_inline_fragment() {
        let source = r#"
            query { gizmos { ...Named ... on Widget { weight } } }
            fragment Named on Gizmo { name }
        "#;
        let op = parse(source, None, HashMap::new()).unwrap();
        assert!(op.fragments.contains_key("Named"));
        let Selection::Field(gizmos) = &op.selection_set.selections[0] else { panic!() };
        assert_eq!(gizmos.selection_set.selections.len(), 2);
        assert!(matches!(gizmos.selection_set.selections[0], Selection::FragmentSpread(_)));
        assert!(matches!(gizmos.selection_set.selections[1], Selection::InlineFragment(_)));
    }

    #[test]
    fn named_operation_selection_requires_operation_name_when_ambiguous() {
        let source = "query A { name } query B { name }";
        let err = parse(source, None, HashMap::new()).unwrap_err();
        assert!(matches!(err, GatewayError::Planner(_)));
        let op = parse(source, Some("B"), HashMap::new()).unwrap();
        assert_eq!(op.name.as_deref(), Some("B"));
    }

    #[test]
    fn mutation_keyword_is_recognized() {
        let op = parse("mutation { createGizmo(name: \"x\") { name } }", None, HashMap::new()).unwrap();
        assert_eq!(op.kind, OperationKind::Mutation);
    }
}
