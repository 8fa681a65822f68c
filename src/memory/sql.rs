//! Nom parser for the INSERT statements found in seed scripts.
//!
//! Only the subset the catalog script uses is understood:
//! `INSERT INTO <table> (<columns>) VALUES (<literals>)[, (<literals>)]*`
//! where a literal is a single-quoted string (`''` escapes a quote), an
//! integer, `NULL`, `TRUE` or `FALSE`. Anything else is rejected, which the
//! store reports as a failed statement.

use nom::{
    branch::alt,
    bytes::complete::{is_not, tag, tag_no_case, take_while1},
    character::complete::{char, digit1, multispace0},
    combinator::{all_consuming, map, map_res, opt, recognize, value},
    multi::{many0, separated_list1},
    sequence::{delimited, pair, tuple},
    IResult,
};

use crate::error::{BootstrapError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Insert {
    pub table: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Literal>>,
}

/// Parse one statement, with or without its trailing semicolon.
pub fn parse_insert(statement: &str) -> Result<Insert> {
    match all_consuming(insert)(statement.trim()) {
        Ok((_, parsed)) => Ok(parsed),
        Err(_) => Err(BootstrapError::Unsupported(format!(
            "not a supported INSERT statement: {}",
            preview(statement)
        ))),
    }
}

fn preview(statement: &str) -> String {
    let line = statement.lines().next().unwrap_or_default().trim();
    match line.char_indices().nth(60) {
        Some((cut, _)) => format!("{}...", &line[..cut]),
        None => line.to_string(),
    }
}

// =============================================================================
// GRAMMAR
// =============================================================================

fn insert(input: &str) -> IResult<&str, Insert> {
    map(
        tuple((
            ws(tag_no_case("INSERT")),
            ws(tag_no_case("INTO")),
            ws(identifier),
            parenthesised(identifier),
            ws(tag_no_case("VALUES")),
            separated_list1(ws(char(',')), parenthesised(literal)),
            opt(ws(char(';'))),
        )),
        |(_, _, table, columns, _, rows, _)| Insert {
            table: table.to_ascii_lowercase(),
            columns: columns.into_iter().map(str::to_ascii_lowercase).collect(),
            rows,
        },
    )(input)
}

/// Surround a parser with optional whitespace.
fn ws<'a, O, F>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(multispace0, inner, multispace0)
}

fn parenthesised<'a, O, F>(item: F) -> impl FnMut(&'a str) -> IResult<&'a str, Vec<O>>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(
        ws(char('(')),
        separated_list1(ws(char(',')), ws(item)),
        ws(char(')')),
    )
}

fn identifier(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_')(input)
}

fn literal(input: &str) -> IResult<&str, Literal> {
    alt((
        map(string_literal, Literal::Text),
        map(integer, Literal::Int),
        value(Literal::Null, keyword("NULL")),
        value(Literal::Bool(true), keyword("TRUE")),
        value(Literal::Bool(false), keyword("FALSE")),
    ))(input)
}

/// A keyword that is not the prefix of a longer identifier.
fn keyword<'a>(word: &'static str) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str> {
    move |input: &'a str| {
        let (rest, matched) = tag_no_case(word)(input)?;
        match rest.chars().next() {
            Some(c) if c.is_ascii_alphanumeric() || c == '_' => Err(nom::Err::Error(
                nom::error::Error::new(input, nom::error::ErrorKind::Tag),
            )),
            _ => Ok((rest, matched)),
        }
    }
}

fn integer(input: &str) -> IResult<&str, i64> {
    map_res(recognize(pair(opt(char('-')), digit1)), |s: &str| s.parse::<i64>())(input)
}

fn string_literal(input: &str) -> IResult<&str, String> {
    delimited(
        char('\''),
        map(
            many0(alt((
                map(is_not("'"), str::to_string),
                value("'".to_string(), tag("''")),
            ))),
            |parts| parts.concat(),
        ),
        char('\''),
    )(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_catalog_style_insert() {
        let stmt = "INSERT INTO programs (title, capacity, status)\nVALUES ('Resume clinic; part 1', 30, 'OPEN')";
        let parsed = parse_insert(stmt).unwrap();
        assert_eq!(parsed.table, "programs");
        assert_eq!(parsed.columns, vec!["title", "capacity", "status"]);
        assert_eq!(
            parsed.rows,
            vec![vec![
                Literal::Text("Resume clinic; part 1".into()),
                Literal::Int(30),
                Literal::Text("OPEN".into()),
            ]]
        );
    }

    #[test]
    fn doubled_quote_and_keywords() {
        let parsed =
            parse_insert("insert into t (a, b, c, d) values ('it''s', NULL, true, -4);").unwrap();
        assert_eq!(
            parsed.rows[0],
            vec![
                Literal::Text("it's".into()),
                Literal::Null,
                Literal::Bool(true),
                Literal::Int(-4),
            ]
        );
    }

    #[test]
    fn empty_string_literal() {
        let parsed = parse_insert("INSERT INTO t (a) VALUES ('')").unwrap();
        assert_eq!(parsed.rows[0], vec![Literal::Text(String::new())]);
    }

    #[test]
    fn multi_row_values() {
        let parsed = parse_insert("INSERT INTO t (a) VALUES (1), (2)").unwrap();
        assert_eq!(parsed.rows.len(), 2);
    }

    #[test]
    fn rejects_other_statements() {
        assert!(parse_insert("UPDATE programs SET title = 'x'").is_err());
        assert!(parse_insert("INSERT INTO t (a) VALUES (nullable)").is_err());
        assert!(parse_insert("INSERT INTO t (a) VALUES ('unterminated)").is_err());
    }
}
