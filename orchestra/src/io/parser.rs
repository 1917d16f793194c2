//! A parser for exchange files.
//!
//! An exchange file declares peers and their relations, the mappings and
//! views between them and a batch of local updates:
//!
//! ```text
//! % comment
//! peer P1 schema S1.
//! relation Emp(id: integer, name: string).
//! outerunion relation Contact(id: integer, mail: string?).
//! mapping m1 bidirectional: EmpCopy(X, Y) :- Emp(X, Y).
//! view Contact(X, null) :- Emp(X, Y).
//! insert Emp(1, "Alice").
//! ```

use std::{fmt::Debug, path::Path};

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while},
    character::complete::{char, digit1, multispace1, not_line_ending, satisfy},
    combinator::{cut, map, map_res, not, opt, recognize, value, verify},
    multi::{many0, many0_count, separated_list0, separated_list1},
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};
use orchestra_physical::datavalues::DataValue;

use crate::{
    error::Error,
    execution::applier::{Update, UpdateKind},
    rule_model::{
        atom::{Annotation, Atom},
        relation::{FieldType, RelationField, RelationKind},
        rule::Rule,
        term::AtomArgument,
    },
    system::{
        catalog::Catalog,
        mapping::{Mapping, View},
        translation::ExchangeSystem,
    },
};

type IntermediateResult<'a, T> = IResult<&'a str, T>;

/// A combinator to add tracing to the parser.
/// [fun] is an identifier for the parser and [parser] is the actual parser.
#[inline(always)]
fn traced<'a, T, P>(fun: &'static str, mut parser: P) -> impl FnMut(&'a str) -> IntermediateResult<'a, T>
where
    T: Debug,
    P: FnMut(&'a str) -> IntermediateResult<'a, T>,
{
    move |input| {
        log::trace!(target: "parser", "{fun}({input:?})");
        let result = parser(input);
        log::trace!(target: "parser", "{fun}({input:?}) -> {result:?}");
        result
    }
}

/// Atom as written in the file, before relations are resolved
#[derive(Debug, Clone, PartialEq)]
struct ParsedAtom<'a> {
    relation: &'a str,
    arguments: Vec<AtomArgument>,
    annotations: Vec<Annotation>,
    negated: bool,
}

#[derive(Debug, Clone, PartialEq)]
enum Statement<'a> {
    Peer {
        name: &'a str,
        schema: &'a str,
    },
    Relation {
        kind: RelationKind,
        name: &'a str,
        fields: Vec<RelationField>,
    },
    Mapping {
        id: &'a str,
        bidirectional: bool,
        head: Vec<ParsedAtom<'a>>,
        body: Vec<ParsedAtom<'a>>,
    },
    View {
        head: ParsedAtom<'a>,
        body: Vec<ParsedAtom<'a>>,
    },
    Update {
        kind: UpdateKind,
        atom: ParsedAtom<'a>,
    },
}

/// Skip whitespace and `%` comments.
fn space(input: &str) -> IntermediateResult<()> {
    value(
        (),
        many0_count(alt((
            value((), multispace1),
            value((), pair(char('%'), not_line_ending)),
        ))),
    )(input)
}

/// Run `parser` after skipping whitespace and comments.
fn token<'a, T, P>(parser: P) -> impl FnMut(&'a str) -> IntermediateResult<'a, T>
where
    P: FnMut(&'a str) -> IntermediateResult<'a, T>,
{
    preceded(space, parser)
}

fn keyword<'a>(word: &'static str) -> impl FnMut(&'a str) -> IntermediateResult<'a, &'a str> {
    token(terminated(
        tag(word),
        not(satisfy(|c: char| c.is_alphanumeric() || c == '_')),
    ))
}

fn symbol<'a>(symbol: &'static str) -> impl FnMut(&'a str) -> IntermediateResult<'a, &'a str> {
    token(tag(symbol))
}

fn identifier(input: &str) -> IntermediateResult<&str> {
    recognize(pair(
        satisfy(|c: char| c.is_alphabetic() || c == '_'),
        take_while(|c: char| c.is_alphanumeric() || c == '_'),
    ))(input)
}

fn variable(input: &str) -> IntermediateResult<AtomArgument> {
    map(
        verify(identifier, |name: &str| {
            name.starts_with(|c: char| c.is_uppercase() || c == '_')
        }),
        AtomArgument::variable,
    )(input)
}

fn integer(input: &str) -> IntermediateResult<i64> {
    map_res(recognize(pair(opt(char('-')), digit1)), str::parse::<i64>)(input)
}

fn string(input: &str) -> IntermediateResult<&str> {
    delimited(char('"'), take_while(|c| c != '"'), char('"'))(input)
}

fn constant(input: &str) -> IntermediateResult<DataValue> {
    alt((
        map(string, DataValue::string),
        map(integer, DataValue::Integer),
        value(DataValue::Boolean(true), keyword("true")),
        value(DataValue::Boolean(false), keyword("false")),
        value(DataValue::Null, keyword("null")),
    ))(input)
}

fn skolem(input: &str) -> IntermediateResult<AtomArgument> {
    map(
        pair(
            verify(identifier, |name: &str| name.starts_with(char::is_lowercase)),
            delimited(
                symbol("("),
                separated_list0(symbol(","), token(argument)),
                symbol(")"),
            ),
        ),
        |(function, arguments)| AtomArgument::Skolem {
            function: function.to_string(),
            arguments,
        },
    )(input)
}

fn argument(input: &str) -> IntermediateResult<AtomArgument> {
    alt((map(constant, AtomArgument::Constant), skolem, variable))(input)
}

fn annotation(input: &str) -> IntermediateResult<Annotation> {
    preceded(
        char('@'),
        alt((
            map(
                preceded(tag("trust"), delimited(symbol("("), token(integer), symbol(")"))),
                Annotation::Trust,
            ),
            map(
                preceded(
                    tag("transaction"),
                    delimited(symbol("("), token(identifier), symbol(")")),
                ),
                |id| Annotation::Transaction(id.to_string()),
            ),
        )),
    )(input)
}

fn atom(input: &str) -> IntermediateResult<ParsedAtom> {
    traced(
        "atom",
        map(
            tuple((
                token(identifier),
                delimited(
                    symbol("("),
                    separated_list0(symbol(","), token(argument)),
                    cut(symbol(")")),
                ),
                many0(token(annotation)),
            )),
            |(relation, arguments, annotations)| ParsedAtom {
                relation,
                arguments,
                annotations,
                negated: false,
            },
        ),
    )(input)
}

fn literal(input: &str) -> IntermediateResult<ParsedAtom> {
    map(pair(opt(keyword("not")), atom), |(negation, atom)| ParsedAtom {
        negated: negation.is_some(),
        ..atom
    })(input)
}

fn field_type(input: &str) -> IntermediateResult<FieldType> {
    alt((
        value(FieldType::Integer, keyword("integer")),
        value(FieldType::String, keyword("string")),
        value(FieldType::Boolean, keyword("boolean")),
    ))(input)
}

fn field(input: &str) -> IntermediateResult<RelationField> {
    map(
        tuple((token(identifier), symbol(":"), field_type, opt(symbol("?")))),
        |(name, _, field_type, nullable)| match nullable {
            Some(_) => RelationField::nullable(name, field_type),
            None => RelationField::new(name, field_type),
        },
    )(input)
}

fn peer(input: &str) -> IntermediateResult<Statement> {
    map(
        preceded(
            keyword("peer"),
            cut(tuple((
                token(identifier),
                keyword("schema"),
                token(identifier),
                symbol("."),
            ))),
        ),
        |(name, _, schema, _)| Statement::Peer { name, schema },
    )(input)
}

fn relation(input: &str) -> IntermediateResult<Statement> {
    map(
        tuple((
            opt(alt((
                value(RelationKind::Join, keyword("join")),
                value(RelationKind::OuterUnion, keyword("outerunion")),
            ))),
            keyword("relation"),
            cut(tuple((
                token(identifier),
                delimited(
                    symbol("("),
                    separated_list1(symbol(","), field),
                    symbol(")"),
                ),
                symbol("."),
            ))),
        )),
        |(kind, _, (name, fields, _))| Statement::Relation {
            kind: kind.unwrap_or(RelationKind::Peer),
            name,
            fields,
        },
    )(input)
}

fn mapping(input: &str) -> IntermediateResult<Statement> {
    map(
        preceded(
            keyword("mapping"),
            cut(tuple((
                token(identifier),
                opt(keyword("bidirectional")),
                symbol(":"),
                separated_list1(symbol(","), atom),
                symbol(":-"),
                separated_list1(symbol(","), literal),
                symbol("."),
            ))),
        ),
        |(id, bidirectional, _, head, _, body, _)| Statement::Mapping {
            id,
            bidirectional: bidirectional.is_some(),
            head,
            body,
        },
    )(input)
}

fn view(input: &str) -> IntermediateResult<Statement> {
    map(
        preceded(
            keyword("view"),
            cut(tuple((
                atom,
                symbol(":-"),
                separated_list1(symbol(","), literal),
                symbol("."),
            ))),
        ),
        |(head, _, body, _)| Statement::View { head, body },
    )(input)
}

fn update(input: &str) -> IntermediateResult<Statement> {
    map(
        pair(
            alt((
                value(UpdateKind::Insert, keyword("insert")),
                value(UpdateKind::Delete, keyword("delete")),
                value(UpdateKind::Reject, keyword("reject")),
                value(UpdateKind::Unreject, keyword("unreject")),
            )),
            cut(terminated(atom, symbol("."))),
        ),
        |(kind, atom)| Statement::Update { kind, atom },
    )(input)
}

fn statement(input: &str) -> IntermediateResult<Statement> {
    traced("statement", alt((peer, relation, mapping, view, update)))(input)
}

/// Translate a byte offset into a line and column, both starting at 1.
fn position(input: &str, offset: usize) -> (usize, usize) {
    let consumed = &input[..offset.min(input.len())];
    let line = consumed.matches('\n').count() + 1;
    let column = consumed
        .rfind('\n')
        .map_or(consumed, |index| &consumed[index + 1..])
        .chars()
        .count()
        + 1;

    (line, column)
}

fn parse_error(input: &str, error: nom::Err<nom::error::Error<&str>>) -> Error {
    let (rest, message) = match error {
        nom::Err::Error(error) | nom::Err::Failure(error) => (
            error.input,
            format!("unexpected input, {}", error.code.description()),
        ),
        nom::Err::Incomplete(_) => ("", "unexpected end of input".to_string()),
    };
    let (line, column) = position(input, input.len() - rest.len());

    Error::Parse {
        line,
        column,
        message,
    }
}

/// Content of an exchange file
#[derive(Debug)]
pub struct ExchangeFile {
    /// Declared peers, relations, mappings and views
    pub system: ExchangeSystem,
    /// Local updates in the order of the file
    pub updates: Vec<Update>,
}

struct ExchangeBuilder {
    system: ExchangeSystem,
    updates: Vec<Update>,
    current_peer: Option<String>,
}

impl ExchangeBuilder {
    fn atom(&self, parsed: &ParsedAtom) -> Result<Atom, Error> {
        Atom::builder(self.system.catalog().relation(parsed.relation)?.clone())
            .values(parsed.arguments.iter().cloned())
            .annotations(parsed.annotations.clone())
            .negated(parsed.negated)
            .build()
    }

    fn atoms(&self, parsed: &[ParsedAtom]) -> Result<Vec<Atom>, Error> {
        parsed.iter().map(|atom| self.atom(atom)).collect()
    }

    fn add(&mut self, statement: Statement) -> Result<(), Error> {
        match statement {
            Statement::Peer { name, schema } => {
                self.system.catalog_mut().add_peer(name, schema);
                self.current_peer = Some(name.to_string());
            }
            Statement::Relation { kind, name, fields } => {
                let peer = self
                    .current_peer
                    .clone()
                    .ok_or_else(|| Error::UnknownPeer(String::new()))?;
                self.system
                    .catalog_mut()
                    .add_relation(&peer, name, fields, kind)?;
            }
            Statement::Mapping {
                id,
                bidirectional,
                head,
                body,
            } => {
                let mapping = Mapping::new(id, self.atoms(&head)?, self.atoms(&body)?, bidirectional)?;
                self.system.add_mapping(mapping)?;
            }
            Statement::View { head, body } => {
                let view = View::new(Rule::new(self.atom(&head)?, self.atoms(&body)?))?;
                self.system.add_view(view);
            }
            Statement::Update { kind, atom } => {
                let built = self.atom(&atom)?;
                let tuple = built
                    .values()
                    .iter()
                    .map(AtomArgument::to_value)
                    .collect::<Option<Vec<_>>>()
                    .ok_or_else(|| Error::MalformedRule {
                        rule: built.to_string(),
                        reason: "updates must be ground".to_string(),
                    })?;

                self.updates.push(Update::new(kind, atom.relation, tuple));
            }
        }

        Ok(())
    }
}

/// Parse the content of an exchange file.
pub fn parse_exchange(input: &str) -> Result<ExchangeFile, Error> {
    let mut builder = ExchangeBuilder {
        system: ExchangeSystem::new(Catalog::new()),
        updates: Vec::new(),
        current_peer: None,
    };

    let mut rest = input;
    loop {
        let (remaining, _) = space(rest).map_err(|error| parse_error(input, error))?;
        if remaining.is_empty() {
            break;
        }

        let (remaining, statement) =
            statement(remaining).map_err(|error| parse_error(input, error))?;
        log::trace!("parsed statement {statement:?}");
        builder.add(statement)?;
        rest = remaining;
    }

    log::info!(
        "parsed {} relations, {} mappings and {} updates",
        builder.system.catalog().num_relations(),
        builder.system.mappings().len(),
        builder.updates.len()
    );

    Ok(ExchangeFile {
        system: builder.system,
        updates: builder.updates,
    })
}

/// Read and parse an exchange file.
pub fn load_exchange(path: &Path) -> Result<ExchangeFile, Error> {
    let content = std::fs::read_to_string(path).map_err(|error| Error::IOReading {
        error,
        filename: path.to_path_buf(),
    })?;

    parse_exchange(&content)
}
