//! 查询文本解析（nom）。
//!
//! ```text
//! cond    := and ("||" and)*
//! and     := unary ("&&" unary)*
//! unary   := "!" unary | QUANT cond | primary
//! QUANT   := 由 A E F G X 组成的一或两个字母，如 EF、AG、X
//! primary := "(" cond "U" cond ")" | "(" cond ")" | "true" | "false"
//!          | "deadlock" | "bounds(" name ("," name)* ")" | expr CMP expr
//! expr    := term (("+" | "-") term)*
//! term    := factor ("*" factor)*
//! factor  := "-" factor | INT | "(" expr ")" | name
//! ```
use nom::branch::alt;
use nom::bytes::complete::tag;
use nom::character::complete::{char, digit1, multispace0, satisfy};
use nom::combinator::{all_consuming, map, map_res, not, recognize};
use nom::error::{Error, ErrorKind};
use nom::multi::{many0, many0_count, separated_list1};
use nom::sequence::{delimited, pair, preceded, terminated};
use nom::{IResult, Parser};

use crate::net::Weight;
use crate::query::{
    BoundedPlace, CompareOp, Condition, Expr, ExprKind, PlaceRef, Quantifier, QueryError,
};

/// 解析一条查询；库所以名字保存，需再调用 [`Condition::bind`]。
pub fn parse_query(text: &str) -> Result<Condition, QueryError> {
    match all_consuming(ws(condition)).parse(text) {
        Ok((_, cond)) => Ok(cond),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            let offset = text.len() - e.input.len();
            let message = if e.input.is_empty() {
                "unexpected end of input".to_string()
            } else {
                let snippet: String = e.input.chars().take(16).collect();
                format!("unexpected `{snippet}`")
            };
            Err(QueryError::Parse { offset, message })
        }
        Err(nom::Err::Incomplete(_)) => Err(QueryError::Parse {
            offset: text.len(),
            message: "incomplete input".to_string(),
        }),
    }
}

fn ws<'a, O, F>(inner: F) -> impl Parser<&'a str, Output = O, Error = Error<&'a str>>
where
    F: Parser<&'a str, Output = O, Error = Error<&'a str>>,
{
    delimited(multispace0, inner, multispace0)
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '.'
}

fn keyword<'a>(word: &'static str) -> impl Parser<&'a str, Output = &'a str, Error = Error<&'a str>> {
    terminated(tag(word), not(satisfy(is_ident_char)))
}

fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        satisfy(|c: char| c.is_ascii_alphabetic() || c == '_'),
        many0_count(satisfy(is_ident_char)),
    ))
    .parse(input)
}

fn condition(input: &str) -> IResult<&str, Condition> {
    map(
        separated_list1(ws(tag("||")), conjunction),
        |mut conds| {
            if conds.len() == 1 {
                conds.remove(0)
            } else {
                Condition::or(conds)
            }
        },
    )
    .parse(input)
}

fn conjunction(input: &str) -> IResult<&str, Condition> {
    map(separated_list1(ws(tag("&&")), unary), |mut conds| {
        if conds.len() == 1 {
            conds.remove(0)
        } else {
            Condition::and(conds)
        }
    })
    .parse(input)
}

fn unary(input: &str) -> IResult<&str, Condition> {
    alt((
        map(preceded(ws(char('!')), unary), Condition::not),
        quantified,
        primary,
    ))
    .parse(input)
}

fn quantifiers(input: &str) -> IResult<&str, Vec<Quantifier>> {
    let (rest, word) = identifier(input)?;
    let quantifiers = word
        .chars()
        .map(|c| match c {
            'A' => Some(Quantifier::A),
            'E' => Some(Quantifier::E),
            'F' => Some(Quantifier::F),
            'G' => Some(Quantifier::G),
            'X' => Some(Quantifier::X),
            _ => None,
        })
        .collect::<Option<Vec<_>>>();
    match quantifiers {
        Some(qs) if qs.len() <= 2 => Ok((rest, qs)),
        _ => Err(nom::Err::Error(Error::new(input, ErrorKind::Tag))),
    }
}

fn quantified(input: &str) -> IResult<&str, Condition> {
    map(pair(ws(quantifiers), condition), |(qs, body)| {
        qs.into_iter()
            .rev()
            .fold(body, |cond, q| Condition::quantified(q, cond))
    })
    .parse(input)
}

fn primary(input: &str) -> IResult<&str, Condition> {
    ws(alt((
        map(
            delimited(
                char('('),
                pair(terminated(condition, keyword("U")), condition),
                char(')'),
            ),
            |(hold, goal)| Condition::until(hold, goal),
        ),
        delimited(char('('), condition, char(')')),
        map(keyword("true"), |_| Condition::boolean(true)),
        map(keyword("false"), |_| Condition::boolean(false)),
        map(keyword("deadlock"), |_| Condition::deadlock()),
        bounds,
        comparison,
    )))
    .parse(input)
}

fn bounds(input: &str) -> IResult<&str, Condition> {
    map(
        preceded(
            pair(keyword("bounds"), ws(char('('))),
            terminated(separated_list1(ws(char(',')), ws(identifier)), char(')')),
        ),
        |names| {
            Condition::upper_bounds(
                names
                    .into_iter()
                    .map(|name| BoundedPlace::new(PlaceRef::Named(name.to_string()), Weight::MAX))
                    .collect(),
            )
        },
    )
    .parse(input)
}

fn compare_op(input: &str) -> IResult<&str, CompareOp> {
    ws(alt((
        map(tag("<="), |_| CompareOp::Le),
        map(tag(">="), |_| CompareOp::Ge),
        map(tag("=="), |_| CompareOp::Eq),
        map(tag("!="), |_| CompareOp::Ne),
        map(tag("<"), |_| CompareOp::Lt),
        map(tag(">"), |_| CompareOp::Gt),
    )))
    .parse(input)
}

fn comparison(input: &str) -> IResult<&str, Condition> {
    map((expr, compare_op, expr), |(lhs, op, rhs)| {
        Condition::compare(op, lhs, rhs)
    })
    .parse(input)
}

fn expr(input: &str) -> IResult<&str, Expr> {
    map(
        pair(term, many0(pair(ws(alt((char('+'), char('-')))), term))),
        |(first, rest)| {
            let mut positive = vec![first];
            let mut negative = Vec::new();
            for (op, e) in rest {
                if op == '+' {
                    positive.push(e);
                } else {
                    negative.push(e);
                }
            }
            let sum = if positive.len() == 1 {
                positive.remove(0)
            } else {
                Expr::plus(positive)
            };
            if negative.is_empty() {
                sum
            } else {
                let mut operands = vec![sum];
                operands.extend(negative);
                Expr::subtract(operands)
            }
        },
    )
    .parse(input)
}

fn term(input: &str) -> IResult<&str, Expr> {
    map(
        pair(factor, many0(preceded(ws(char('*')), factor))),
        |(first, rest)| {
            if rest.is_empty() {
                first
            } else {
                let mut operands = vec![first];
                operands.extend(rest);
                Expr::multiply(operands)
            }
        },
    )
    .parse(input)
}

fn factor(input: &str) -> IResult<&str, Expr> {
    ws(alt((
        map(preceded(char('-'), factor), |e| match e.kind {
            ExprKind::Literal(v) => Expr::literal(v.saturating_neg()),
            _ => Expr::minus(e),
        }),
        map_res(digit1, |digits: &str| digits.parse::<i64>().map(Expr::literal)),
        delimited(char('('), expr, char(')')),
        map(identifier, Expr::named),
    )))
    .parse(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::ConditionKind;

    #[test]
    fn reachability_query() {
        let cond = parse_query("EF (idle >= 2 && busy == 0)").unwrap();
        let expected = Condition::ef(Condition::and(vec![
            Condition::compare(CompareOp::Ge, Expr::named("idle"), Expr::literal(2)),
            Condition::compare(CompareOp::Eq, Expr::named("busy"), Expr::literal(0)),
        ]));
        assert_eq!(cond, expected);
    }

    #[test]
    fn precedence_and_arithmetic() {
        let cond = parse_query("AG !deadlock || a + 2 * b - c < -1").unwrap();
        let ConditionKind::Temporal(Quantifier::A, inner) = &cond.kind else {
            panic!("expected A, got {cond:?}");
        };
        let ConditionKind::Temporal(Quantifier::G, body) = &inner.kind else {
            panic!("expected G");
        };
        let ConditionKind::Or(cs) = &body.kind else {
            panic!("expected or, got {body:?}");
        };
        assert_eq!(cs[0], Condition::not(Condition::deadlock()));
        assert_eq!(
            cs[1],
            Condition::compare(
                CompareOp::Lt,
                Expr::subtract(vec![
                    Expr::plus(vec![
                        Expr::named("a"),
                        Expr::multiply(vec![Expr::literal(2), Expr::named("b")]),
                    ]),
                    Expr::named("c"),
                ]),
                Expr::literal(-1),
            )
        );
    }

    #[test]
    fn until_and_place_names_that_look_like_keywords() {
        let cond = parse_query("A (E1 > 0 U F == 3)").unwrap();
        let expected = Condition::quantified(
            Quantifier::A,
            Condition::until(
                Condition::compare(CompareOp::Gt, Expr::named("E1"), Expr::literal(0)),
                Condition::compare(CompareOp::Eq, Expr::named("F"), Expr::literal(3)),
            ),
        );
        assert_eq!(cond, expected);
    }

    #[test]
    fn bounds_and_booleans() {
        let cond = parse_query("bounds(a, b)").unwrap();
        assert!(matches!(cond.kind, ConditionKind::UpperBounds(ref u) if u.places.len() == 2));
        assert_eq!(parse_query(" true ").unwrap(), Condition::boolean(true));
        assert_eq!(
            parse_query("(-(x) <= 3)").unwrap(),
            Condition::compare(
                CompareOp::Le,
                Expr::minus(Expr::named("x")),
                Expr::literal(3)
            )
        );
    }

    #[test]
    fn errors_carry_offset() {
        let err = parse_query("EF (a >= )").unwrap_err();
        assert!(matches!(err, QueryError::Parse { .. }));
        let err = parse_query("a > 1 &&").unwrap_err();
        let QueryError::Parse { offset, .. } = err else {
            panic!("expected parse error");
        };
        assert!(offset >= 5);
    }
}
