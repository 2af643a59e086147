//! Query grammar
//!
//! Parses an OData query path (`/<resource>?$filter=...&@alias=...`) into a
//! raw parse tree plus the [`BindTable`] holding every literal the tree
//! references. The transformer only depends on the [`QueryParser`] contract,
//! so [`ODataGrammar`] can be swapped for any other implementation.
//!
//! ## Expression grammar
//!
//! ```text
//! expression := or
//! or         := and ("or" and)*
//! and        := unary ("and" unary)*
//! unary      := "not"* primary
//! primary    := predicate | call | "(" expression ")"
//! predicate  := operand (cmp operand | ("in" | "eqany") list)
//! operand    := literal | @alias | call | member ("/" member)*
//! list       := "(" item, ... ")" | "[" literal, ... "]" | @alias
//! ```
//!
//! Chains of one operator fold into a single n-ary node, so
//! `a eq 1 and b eq 2 and c eq 3` is `["and", A, B, C]`.

use serde_json::{Map, Value as JsonValue, json};
use winnow::{
    ascii::{digit1, space0},
    combinator::{alt, delimited, eof, not, opt, preceded, repeat, separated, separated_pair, terminated},
    error::{ContextError, ParseError, StrContext},
    prelude::*,
    token::{literal, none_of, one_of, take_while},
};

use super::binds::{BindEntry, BindKind, BindRef, BindTable};
use super::error::GrammarError;
use super::types::{ComparisonOp, FieldReference, LogicalOp, StringFunction};
use crate::core::constants::{
    COLLECTION_BIND_KIND, FILTER_OPTION, MAX_GROUPING_DEPTH, MAX_PATH_SEGMENTS,
};
use crate::utils::string::{PREVIEW_MAX_LENGTH, truncate_preview};

/// Words that can never name a field
const RESERVED_WORDS: &[&str] = &[
    "and", "or", "not", "eq", "ne", "gt", "ge", "lt", "le", "in", "eqany", "true", "false", "null",
];

/// Functions the grammar accepts in call position
const KNOWN_FUNCTIONS: &[&str] = &[
    "contains",
    "startswith",
    "endswith",
    "substringof",
    "tolower",
    "toupper",
    "length",
    "indexof",
    "substring",
    "trim",
    "concat",
    "year",
    "month",
    "day",
    "hour",
    "minute",
    "second",
    "round",
    "floor",
    "ceiling",
];

// ============================================================================
// PARSER CONTRACT
// ============================================================================

/// Parsed query path: resource path plus its options
#[derive(Debug, Clone, PartialEq)]
pub struct QueryTree {
    pub path: String,
    /// `$filter` holds the raw tree; other options keep their text
    pub options: Map<String, JsonValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedQuery {
    pub tree: QueryTree,
    pub binds: BindTable,
}

/// Turns a query path into a raw tree and bind table
pub trait QueryParser: Send + Sync {
    fn parse(&self, query_path: &str) -> Result<ParsedQuery, GrammarError>;
}

/// Default OData grammar
#[derive(Debug, Clone, Copy, Default)]
pub struct ODataGrammar;

impl QueryParser for ODataGrammar {
    fn parse(&self, query_path: &str) -> Result<ParsedQuery, GrammarError> {
        let (path, query) = query_path.split_once('?').unwrap_or((query_path, ""));
        if !path.starts_with('/') {
            return Err(GrammarError::InvalidQuery(format!(
                "query path must start with '/': {}",
                truncate_preview(path, PREVIEW_MAX_LENGTH)
            )));
        }

        let mut binds = BindTable::new();
        let mut options = Map::new();

        for option in split_options(query) {
            let Some((name, value)) = option.split_once('=') else {
                return Err(GrammarError::InvalidQuery(format!(
                    "query option without value: {}",
                    truncate_preview(option, PREVIEW_MAX_LENGTH)
                )));
            };

            if name == FILTER_OPTION {
                let tree = parse_filter_expression(value, &mut binds)?;
                options.insert(name.to_string(), tree);
            } else if name.starts_with('@') {
                let entry = parse_alias_value(value)?;
                binds.insert_alias(name, entry);
            } else {
                options.insert(name.to_string(), JsonValue::String(value.to_string()));
            }
        }

        tracing::trace!(
            path,
            options = options.len(),
            binds = binds.len(),
            "Parsed query path"
        );

        Ok(ParsedQuery {
            tree: QueryTree {
                path: path.to_string(),
                options,
            },
            binds,
        })
    }
}

/// Split query options on `&` outside quoted strings
fn split_options(query: &str) -> Vec<&str> {
    let mut options = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    for (i, c) in query.char_indices() {
        match c {
            '\'' => in_quotes = !in_quotes,
            '&' if !in_quotes => {
                options.push(&query[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    options.push(&query[start..]);
    options.retain(|option| !option.is_empty());
    options
}

/// Byte offset of the first `&` outside quoted strings
pub(super) fn unquoted_option_separator(text: &str) -> Option<usize> {
    let mut in_quotes = false;
    for (i, c) in text.char_indices() {
        match c {
            '\'' => in_quotes = !in_quotes,
            '&' if !in_quotes => return Some(i),
            _ => {}
        }
    }
    None
}

/// Deepest bracket nesting outside quoted strings
fn grouping_depth(text: &str) -> usize {
    let mut depth = 0usize;
    let mut deepest = 0usize;
    let mut in_quotes = false;
    for c in text.chars() {
        match c {
            '\'' => in_quotes = !in_quotes,
            '(' | '[' if !in_quotes => {
                depth += 1;
                deepest = deepest.max(depth);
            }
            ')' | ']' if !in_quotes => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    deepest
}

fn parse_filter_expression(text: &str, binds: &mut BindTable) -> Result<JsonValue, GrammarError> {
    if grouping_depth(text) > MAX_GROUPING_DEPTH {
        return Err(GrammarError::InvalidQuery(format!(
            "expression nests deeper than {} groups",
            MAX_GROUPING_DEPTH
        )));
    }
    let expr = terminated(expression, eof).parse(text).map_err(syntax_error)?;
    lower_expr(expr, binds)
}

fn parse_alias_value(text: &str) -> Result<BindEntry, GrammarError> {
    terminated(delimited(space0, alias_value, space0), eof)
        .parse(text)
        .map_err(syntax_error)
}

fn syntax_error(err: ParseError<Input<'_>, ContextError>) -> GrammarError {
    let message = err.inner().to_string();
    GrammarError::Syntax {
        offset: err.offset(),
        message: if message.is_empty() {
            "unexpected input".to_string()
        } else {
            message
        },
    }
}

// ============================================================================
// SYNTAX TREE
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Literal {
    Text(String),
    Number(serde_json::Number),
    Boolean(bool),
    Null,
    Date(String),
    DateTime(String),
    Duration(String),
}

impl Literal {
    fn into_entry(self) -> BindEntry {
        let (kind, value) = match self {
            Self::Text(s) => (BindKind::Text, JsonValue::String(s)),
            Self::Number(n) => (BindKind::Real, JsonValue::Number(n)),
            Self::Boolean(b) => (BindKind::Boolean, JsonValue::Bool(b)),
            Self::Null => (BindKind::Null, JsonValue::Null),
            Self::Date(s) => (BindKind::Date, JsonValue::String(s)),
            Self::DateTime(s) => (BindKind::DateTime, JsonValue::String(s)),
            Self::Duration(s) => (BindKind::Duration, JsonValue::String(s)),
        };
        BindEntry::new(kind, value)
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Call<'s> {
    name: &'s str,
    args: Vec<Operand<'s>>,
}

#[derive(Debug, Clone, PartialEq)]
enum Operand<'s> {
    Member(Vec<&'s str>),
    Literal(Literal),
    Alias(&'s str),
    Call(Call<'s>),
}

#[derive(Debug, Clone, PartialEq)]
enum ValueList<'s> {
    Binds(Vec<Operand<'s>>),
    Collection(Vec<Literal>),
    Alias(&'s str),
}

#[derive(Debug, Clone, PartialEq)]
enum Expr<'s> {
    Logical(LogicalOp, Vec<Expr<'s>>),
    Not(Box<Expr<'s>>),
    Compare {
        operator: ComparisonOp,
        left: Operand<'s>,
        right: Operand<'s>,
    },
    Membership {
        operator: &'s str,
        operand: Operand<'s>,
        values: ValueList<'s>,
    },
    Call(Call<'s>),
}

/// What follows the left operand of a predicate
enum PredicateTail<'s> {
    Compare(ComparisonOp, Operand<'s>),
    Membership(&'s str, ValueList<'s>),
}

// ============================================================================
// PARSERS
// ============================================================================

type Input<'a> = &'a str;
type ParserResult<T> = winnow::Result<T>;

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn is_digit(c: char) -> bool {
    c.is_ascii_digit()
}

fn is_time_char(c: char) -> bool {
    c.is_ascii_digit() || matches!(c, ':' | '.' | 'Z' | '+' | '-')
}

fn ident<'a>(input: &mut Input<'a>) -> ParserResult<&'a str> {
    (one_of(|c: char| c.is_alphabetic() || c == '_'), take_while(0.., is_ident_char))
        .take()
        .parse_next(input)
}

/// A whole identifier equal to `expected`
fn word<'a>(expected: &'static str) -> impl Parser<Input<'a>, &'a str, ContextError> {
    ident.verify(move |w: &str| w == expected)
}

fn member_segment<'a>(input: &mut Input<'a>) -> ParserResult<&'a str> {
    let name = ident.parse_next(input)?;
    if RESERVED_WORDS.contains(&name) {
        let mut context = ContextError::new();
        context.push(StrContext::Label("keyword used as field name"));
        return Err(context);
    }
    Ok(name)
}

/// Field path of at most [`MAX_PATH_SEGMENTS`] segments
fn member<'a>(input: &mut Input<'a>) -> ParserResult<Vec<&'a str>> {
    terminated(separated(1..=MAX_PATH_SEGMENTS, member_segment, '/'), not('/'))
        .context(StrContext::Label("field path"))
        .parse_next(input)
}

/// Single-quoted string; `''` is an escaped quote
fn quoted(input: &mut Input<'_>) -> ParserResult<String> {
    delimited(
        '\'',
        repeat(0.., alt((literal("''").value('\''), none_of('\'')))).fold(String::new, |mut text, c| {
            text.push(c);
            text
        }),
        '\'',
    )
    .parse_next(input)
}

fn json_number(text: &str) -> Option<serde_json::Number> {
    if let Ok(integer) = text.parse::<i64>() {
        return Some(integer.into());
    }
    text.parse::<f64>().ok().and_then(serde_json::Number::from_f64)
}

fn number(input: &mut Input<'_>) -> ParserResult<Literal> {
    (
        opt(one_of(['+', '-'])),
        digit1,
        opt(('.', digit1)),
        opt((one_of(['e', 'E']), opt(one_of(['+', '-'])), digit1)),
    )
        .take()
        .verify_map(json_number)
        .map(Literal::Number)
        .parse_next(input)
}

/// `YYYY-MM-DD` or `YYYY-MM-DDThh:mm[:ss[.f]][Z|±hh:mm]`
fn temporal(input: &mut Input<'_>) -> ParserResult<Literal> {
    let text = (
        (
            take_while(4, is_digit),
            '-',
            take_while(2, is_digit),
            '-',
            take_while(2, is_digit),
        ),
        opt(('T', take_while(1.., is_time_char))),
    )
        .take()
        .parse_next(input)?;

    Ok(if text.contains('T') {
        Literal::DateTime(text.to_string())
    } else {
        Literal::Date(text.to_string())
    })
}

fn literal_value(input: &mut Input<'_>) -> ParserResult<Literal> {
    alt((
        quoted.map(Literal::Text),
        preceded(word("duration"), quoted).map(Literal::Duration),
        preceded(word("datetime"), quoted).map(Literal::DateTime),
        word("true").value(Literal::Boolean(true)),
        word("false").value(Literal::Boolean(false)),
        word("null").value(Literal::Null),
        temporal,
        number,
    ))
    .context(StrContext::Label("literal"))
    .parse_next(input)
}

fn alias<'a>(input: &mut Input<'a>) -> ParserResult<&'a str> {
    ('@', ident).take().parse_next(input)
}

fn list_separator(input: &mut Input<'_>) -> ParserResult<()> {
    (space0, ',', space0).void().parse_next(input)
}

fn call<'a>(input: &mut Input<'a>) -> ParserResult<Call<'a>> {
    let name = terminated(ident, (space0, '(', space0)).parse_next(input)?;
    let args = separated(0.., operand, list_separator).parse_next(input)?;
    (space0, ')').void().parse_next(input)?;
    Ok(Call { name, args })
}

fn operand<'a>(input: &mut Input<'a>) -> ParserResult<Operand<'a>> {
    alt((
        literal_value.map(Operand::Literal),
        alias.map(Operand::Alias),
        call.map(Operand::Call),
        member.map(Operand::Member),
    ))
    .context(StrContext::Label("operand"))
    .parse_next(input)
}

fn collection(input: &mut Input<'_>) -> ParserResult<Vec<Literal>> {
    delimited(
        ('[', space0),
        separated(0.., literal_value, list_separator),
        (space0, ']'),
    )
    .parse_next(input)
}

fn list_item<'a>(input: &mut Input<'a>) -> ParserResult<Operand<'a>> {
    alt((literal_value.map(Operand::Literal), alias.map(Operand::Alias))).parse_next(input)
}

fn value_list<'a>(input: &mut Input<'a>) -> ParserResult<ValueList<'a>> {
    alt((
        delimited(
            ('(', space0),
            separated(0.., list_item, list_separator),
            (space0, ')'),
        )
        .map(ValueList::Binds),
        collection.map(ValueList::Collection),
        alias.map(ValueList::Alias),
    ))
    .context(StrContext::Label("value list"))
    .parse_next(input)
}

fn alias_value(input: &mut Input<'_>) -> ParserResult<BindEntry> {
    alt((collection.map(collection_entry), literal_value.map(Literal::into_entry))).parse_next(input)
}

fn comparison_operator(input: &mut Input<'_>) -> ParserResult<ComparisonOp> {
    ident.verify_map(ComparisonOp::try_from_str).parse_next(input)
}

fn membership_operator<'a>(input: &mut Input<'a>) -> ParserResult<&'a str> {
    ident
        .verify(|w: &str| w == "in" || w == "eqany")
        .parse_next(input)
}

fn predicate<'a>(input: &mut Input<'a>) -> ParserResult<Expr<'a>> {
    let left = terminated(operand, space0).parse_next(input)?;
    let tail = alt((
        separated_pair(comparison_operator, space0, operand)
            .map(|(operator, right)| PredicateTail::Compare(operator, right)),
        separated_pair(membership_operator, space0, value_list)
            .map(|(operator, values)| PredicateTail::Membership(operator, values)),
    ))
    .parse_next(input)?;

    Ok(match tail {
        PredicateTail::Compare(operator, right) => Expr::Compare {
            operator,
            left,
            right,
        },
        PredicateTail::Membership(operator, values) => Expr::Membership {
            operator,
            operand: left,
            values,
        },
    })
}

fn primary<'a>(input: &mut Input<'a>) -> ParserResult<Expr<'a>> {
    alt((
        predicate,
        call.map(Expr::Call),
        delimited(('(', space0), expression, (space0, ')')),
    ))
    .context(StrContext::Label("expression"))
    .parse_next(input)
}

/// Negations are counted, not recursed, so `not not ... x` stays shallow
fn unary<'a>(input: &mut Input<'a>) -> ParserResult<Expr<'a>> {
    let negations = repeat(0.., terminated(word("not"), space0))
        .fold(|| 0usize, |count, _| count + 1)
        .parse_next(input)?;
    if negations > MAX_GROUPING_DEPTH {
        let mut context = ContextError::new();
        context.push(StrContext::Label("too many negations"));
        return Err(context);
    }
    let expr = primary.parse_next(input)?;
    Ok((0..negations).fold(expr, |expr, _| Expr::Not(Box::new(expr))))
}

/// `operand (op operand)*`, folded into one n-ary node
fn logical_chain<'a, P>(input: &mut Input<'a>, operator: LogicalOp, mut operand: P) -> ParserResult<Expr<'a>>
where
    P: Parser<Input<'a>, Expr<'a>, ContextError>,
{
    let first = operand.parse_next(input)?;
    let rest: Vec<Expr<'a>> = repeat(
        0..,
        preceded((space0, word(operator.as_str()), space0), operand.by_ref()),
    )
    .parse_next(input)?;

    if rest.is_empty() {
        return Ok(first);
    }
    let mut operands = Vec::with_capacity(rest.len() + 1);
    operands.push(first);
    operands.extend(rest);
    Ok(Expr::Logical(operator, operands))
}

fn and_expression<'a>(input: &mut Input<'a>) -> ParserResult<Expr<'a>> {
    logical_chain(input, LogicalOp::And, unary)
}

fn or_expression<'a>(input: &mut Input<'a>) -> ParserResult<Expr<'a>> {
    logical_chain(input, LogicalOp::Or, and_expression)
}

fn expression<'a>(input: &mut Input<'a>) -> ParserResult<Expr<'a>> {
    delimited(space0, or_expression, space0).parse_next(input)
}

// ============================================================================
// LOWERING
// ============================================================================

fn collection_entry(items: Vec<Literal>) -> BindEntry {
    let tuples = items
        .into_iter()
        .map(|item| item.into_entry().to_tuple())
        .collect();
    BindEntry::new(BindKind::from_tag(COLLECTION_BIND_KIND), JsonValue::Array(tuples))
}

/// Lower to the raw tree, pushing literals into `binds` in source order
fn lower_expr(expr: Expr<'_>, binds: &mut BindTable) -> Result<JsonValue, GrammarError> {
    match expr {
        Expr::Logical(operator, operands) => {
            let mut node = vec![JsonValue::String(operator.as_str().to_string())];
            for operand in operands {
                node.push(lower_expr(operand, binds)?);
            }
            Ok(JsonValue::Array(node))
        }
        Expr::Not(inner) => {
            let inner = lower_expr(*inner, binds)?;
            Ok(json!(["not", inner]))
        }
        Expr::Compare {
            operator,
            left,
            right,
        } => {
            let left = lower_operand(left, binds)?;
            let right = lower_operand(right, binds)?;
            Ok(json!([operator.as_str(), left, right]))
        }
        Expr::Membership {
            operator,
            operand,
            values,
        } => {
            let operand = lower_operand(operand, binds)?;
            let values = lower_list(values, binds)?;
            Ok(json!([operator, operand, values]))
        }
        Expr::Call(call) => lower_call(call, binds),
    }
}

fn lower_operand(operand: Operand<'_>, binds: &mut BindTable) -> Result<JsonValue, GrammarError> {
    match operand {
        Operand::Member(segments) => FieldReference::from_segments(&segments)
            .map(|field| field.to_node())
            .ok_or_else(|| GrammarError::InvalidQuery("empty field path".to_string())),
        Operand::Literal(literal) => Ok(binds.push(literal.into_entry()).to_node()),
        Operand::Alias(name) => Ok(BindRef::Alias(name.to_string()).to_node()),
        Operand::Call(call) => lower_call(call, binds),
    }
}

fn lower_list(values: ValueList<'_>, binds: &mut BindTable) -> Result<JsonValue, GrammarError> {
    match values {
        ValueList::Binds(items) => {
            let items = items
                .into_iter()
                .map(|item| lower_operand(item, binds))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(JsonValue::Array(items))
        }
        ValueList::Collection(items) => Ok(binds.push(collection_entry(items)).to_node()),
        ValueList::Alias(name) => Ok(BindRef::Alias(name.to_string()).to_node()),
    }
}

/// Two-argument string functions use the direct form; everything else the
/// call form
fn lower_call(call: Call<'_>, binds: &mut BindTable) -> Result<JsonValue, GrammarError> {
    if !KNOWN_FUNCTIONS.contains(&call.name) {
        return Err(GrammarError::UnknownFunction(call.name.to_string()));
    }

    let args = call
        .args
        .into_iter()
        .map(|arg| lower_operand(arg, binds))
        .collect::<Result<Vec<_>, _>>()?;

    if StringFunction::try_from_str(call.name).is_some() && args.len() == 2 {
        let mut node = vec![JsonValue::String(call.name.to_string())];
        node.extend(args);
        return Ok(JsonValue::Array(node));
    }

    Ok(json!(["call", { "method": call.name, "args": args }]))
}
