//! Instruction script parser
//!
//! One instruction per line: `begin(T1)`, `beginRO(T2)`, `R(T1,x3)`,
//! `W(T1,x3,101)`, `end(T1)`, `fail(2)`, `recover(2)`, `dump`, `dump()`,
//! `dump(x3)`, `dump(2)`. Whitespace is ignored, names are case-insensitive
//! and anything after `//` or `#` is a comment.

use crate::error::{ParseError, Result};
use repdb_common::{DumpScope, Instruction, SiteId, TransactionId, Value, VariableId};

/// An instruction with the line it came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedLine {
    pub line: usize,
    pub instruction: Instruction,
}

/// Parse a whole script, skipping blank and comment-only lines
pub fn parse_script(source: &str) -> Vec<Result<ParsedLine>> {
    source
        .lines()
        .enumerate()
        .filter_map(|(index, text)| {
            let line = index + 1;
            parse_line(line, text)
                .map(|parsed| parsed.map(|instruction| ParsedLine { line, instruction }))
                .transpose()
        })
        .collect()
}

/// Parse one line; `Ok(None)` for blank or comment-only lines
pub fn parse_line(line: usize, text: &str) -> Result<Option<Instruction>> {
    let body = strip_comment(text).trim();
    if body.is_empty() {
        return Ok(None);
    }

    let (name, args) = split_call(line, body)?;
    let instruction = match name.to_ascii_lowercase().as_str() {
        "begin" => {
            let [txn] = arguments::<1>(line, body, &args)?;
            Instruction::Begin {
                txn: transaction(line, txn)?,
            }
        }
        "beginro" => {
            let [txn] = arguments::<1>(line, body, &args)?;
            Instruction::BeginReadOnly {
                txn: transaction(line, txn)?,
            }
        }
        "r" => {
            let [txn, var] = arguments::<2>(line, body, &args)?;
            Instruction::Read {
                txn: transaction(line, txn)?,
                variable: variable(line, var)?,
            }
        }
        "w" => {
            let [txn, var, value] = arguments::<3>(line, body, &args)?;
            Instruction::Write {
                txn: transaction(line, txn)?,
                variable: variable(line, var)?,
                value: number::<Value>(line, value, "value")?,
            }
        }
        "end" => {
            let [txn] = arguments::<1>(line, body, &args)?;
            Instruction::End {
                txn: transaction(line, txn)?,
            }
        }
        "fail" => {
            let [id] = arguments::<1>(line, body, &args)?;
            Instruction::Fail {
                site: site(line, id)?,
            }
        }
        "recover" => {
            let [id] = arguments::<1>(line, body, &args)?;
            Instruction::Recover {
                site: site(line, id)?,
            }
        }
        "dump" => Instruction::Dump(dump_scope(line, body, &args)?),
        _ => {
            return Err(ParseError::UnknownInstruction {
                line,
                text: body.to_string(),
            });
        }
    };

    Ok(Some(instruction))
}

fn strip_comment(text: &str) -> &str {
    let end = [text.find("//"), text.find('#')]
        .into_iter()
        .flatten()
        .min()
        .unwrap_or(text.len());
    &text[..end]
}

/// Split `name(a, b)` into its name and trimmed arguments
fn split_call(line: usize, body: &str) -> Result<(&str, Vec<&str>)> {
    let Some(open) = body.find('(') else {
        return Ok((body, Vec::new()));
    };
    let malformed = || ParseError::Malformed {
        line,
        text: body.to_string(),
    };

    let close = body.rfind(')').ok_or_else(malformed)?;
    if close < open || !body[close + 1..].trim().is_empty() {
        return Err(malformed());
    }

    let name = body[..open].trim();
    let inner = body[open + 1..close].trim();
    let args = if inner.is_empty() {
        Vec::new()
    } else {
        inner.split(',').map(str::trim).collect()
    };
    Ok((name, args))
}

fn arguments<'a, const N: usize>(line: usize, body: &str, args: &[&'a str]) -> Result<[&'a str; N]> {
    args.try_into().map_err(|_| ParseError::Arity {
        line,
        text: body.to_string(),
        expected: N,
    })
}

fn dump_scope(line: usize, body: &str, args: &[&str]) -> Result<DumpScope> {
    match args {
        [] => Ok(DumpScope::All),
        [arg] if arg.starts_with(['x', 'X']) => Ok(DumpScope::Variable(variable(line, arg)?)),
        [arg] => Ok(DumpScope::Site(site(line, arg)?)),
        _ => Err(ParseError::Arity {
            line,
            text: body.to_string(),
            expected: 1,
        }),
    }
}

fn transaction(line: usize, text: &str) -> Result<TransactionId> {
    TransactionId::parse(text).map_err(|reason| ParseError::InvalidArgument { line, reason })
}

fn variable(line: usize, text: &str) -> Result<VariableId> {
    VariableId::parse(text).map_err(|reason| ParseError::InvalidArgument { line, reason })
}

fn site(line: usize, text: &str) -> Result<SiteId> {
    number::<u32>(line, text, "site").map(SiteId::new)
}

fn number<T: std::str::FromStr>(line: usize, text: &str, what: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    text.parse().map_err(|e| ParseError::InvalidArgument {
        line,
        reason: format!("Invalid {} '{}': {}", what, text, e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Instruction {
        parse_line(1, text).unwrap().unwrap()
    }

    #[test]
    fn test_transaction_instructions() {
        assert_eq!(parse("begin(T1)"), Instruction::Begin { txn: TransactionId::new(1) });
        assert_eq!(
            parse("beginRO(T2)"),
            Instruction::BeginReadOnly { txn: TransactionId::new(2) }
        );
        assert_eq!(
            parse("R(T1, x3)"),
            Instruction::Read { txn: TransactionId::new(1), variable: VariableId::new(3) }
        );
        assert_eq!(
            parse("  W( T1 ,x3, -101 )  "),
            Instruction::Write {
                txn: TransactionId::new(1),
                variable: VariableId::new(3),
                value: -101,
            }
        );
        assert_eq!(parse("end(T1)"), Instruction::End { txn: TransactionId::new(1) });
    }

    #[test]
    fn test_site_instructions() {
        assert_eq!(parse("fail(2)"), Instruction::Fail { site: SiteId::new(2) });
        assert_eq!(parse("recover(10)"), Instruction::Recover { site: SiteId::new(10) });
    }

    #[test]
    fn test_dump_forms() {
        assert_eq!(parse("dump"), Instruction::Dump(DumpScope::All));
        assert_eq!(parse("dump()"), Instruction::Dump(DumpScope::All));
        assert_eq!(parse("dump(x4)"), Instruction::Dump(DumpScope::Variable(VariableId::new(4))));
        assert_eq!(parse("dump(3)"), Instruction::Dump(DumpScope::Site(SiteId::new(3))));
    }

    #[test]
    fn test_comments_and_blank_lines() {
        assert_eq!(parse_line(1, "").unwrap(), None);
        assert_eq!(parse_line(1, "   // just a note").unwrap(), None);
        assert_eq!(parse_line(1, "# another").unwrap(), None);
        assert_eq!(parse("end(T1) // done"), Instruction::End { txn: TransactionId::new(1) });
    }

    #[test]
    fn test_errors_carry_line_numbers() {
        assert!(matches!(
            parse_line(4, "commit(T1)"),
            Err(ParseError::UnknownInstruction { line: 4, .. })
        ));
        assert!(matches!(
            parse_line(5, "R(T1)"),
            Err(ParseError::Arity { line: 5, expected: 2, .. })
        ));
        assert!(matches!(
            parse_line(6, "W(T1,x2,abc)"),
            Err(ParseError::InvalidArgument { line: 6, .. })
        ));
        assert!(matches!(parse_line(7, "begin(T1"), Err(ParseError::Malformed { line: 7, .. })));
    }

    #[test]
    fn test_parse_script_skips_noise() {
        let script = "begin(T1)\n\n// comment\nW(T1,x2,5)\nbogus\nend(T1)\n";
        let parsed = parse_script(script);

        assert_eq!(parsed.len(), 4);
        assert_eq!(parsed[0].as_ref().unwrap().line, 1);
        assert_eq!(parsed[1].as_ref().unwrap().line, 4);
        assert_eq!(parsed[2].as_ref().unwrap_err().line(), 5);
        assert_eq!(parsed[3].as_ref().unwrap().line, 6);
    }
}
