//! DIMACS CNF reader.
//!
//! Accepts `c` comment lines, a single `p cnf <vars> <clauses>` problem line,
//! clause lines terminated by `0` and an optional `%` end marker. A clause may
//! span several lines; it ends at its `0`.

use std::io::BufRead;

use crate::formula::{Formula, FormulaError};

/// Parse DIMACS text into a validated [`Formula`].
pub fn parse_dimacs<R: BufRead>(reader: R) -> Result<Formula, FormulaError> {
    let mut header: Option<(usize, usize)> = None;
    let mut clauses: Vec<Vec<i32>> = Vec::new();
    let mut current: Vec<i32> = Vec::new();

    for (idx, line) in reader.lines().enumerate() {
        let line_no = idx + 1;
        let line = line.map_err(|e| parse_error(line_no, format!("read failed: {e}")))?;
        let mut tokens = line.split_whitespace().peekable();

        match tokens.peek() {
            None => continue,
            Some(&"%") => break,
            Some(t) if t.starts_with('c') => continue,
            Some(&"p") => {
                if header.is_some() {
                    return Err(parse_error(line_no, "duplicate problem line"));
                }
                header = Some(parse_header(line_no, tokens.skip(1))?);
            }
            Some(_) => {
                if header.is_none() {
                    return Err(parse_error(line_no, "clause before problem line"));
                }
                for token in tokens {
                    let literal: i32 = token
                        .parse()
                        .map_err(|_| parse_error(line_no, format!("invalid literal '{token}'")))?;
                    if literal == 0 {
                        clauses.push(std::mem::take(&mut current));
                    } else {
                        current.push(literal);
                    }
                }
            }
        }
    }

    let (num_variables, declared_clauses) =
        header.ok_or_else(|| parse_error(0, "missing 'p cnf' problem line"))?;

    // A trailing clause without its terminator is still a clause.
    if !current.is_empty() {
        clauses.push(current);
    }

    if clauses.len() != declared_clauses {
        tracing::warn!(
            declared = declared_clauses,
            found = clauses.len(),
            "DIMACS clause count does not match problem line"
        );
    }

    Formula::new(num_variables, clauses)
}

fn parse_header<'a>(
    line_no: usize,
    mut fields: impl Iterator<Item = &'a str>,
) -> Result<(usize, usize), FormulaError> {
    if fields.next() != Some("cnf") {
        return Err(parse_error(line_no, "problem line must be 'p cnf <vars> <clauses>'"));
    }
    let mut number = |what: &str| -> Result<usize, FormulaError> {
        fields
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| parse_error(line_no, format!("problem line has no valid {what} count")))
    };
    let vars = number("variable")?;
    let clauses = number("clause")?;
    Ok((vars, clauses))
}

fn parse_error(line: usize, message: impl Into<String>) -> FormulaError {
    FormulaError::Parse {
        line,
        message: message.into(),
    }
}
