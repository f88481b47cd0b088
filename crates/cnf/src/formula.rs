//! CNF formula model: a validated, immutable list of clauses over `1..=num_variables`.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Errors raised while building or evaluating a formula.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FormulaError {
    /// A clause contains the literal `0`, which is reserved as the DIMACS terminator.
    #[error("clause {clause} contains the literal 0")]
    ZeroLiteral { clause: usize },
    /// A literal references a variable outside `1..=num_variables`.
    #[error("literal {literal} in clause {clause} is out of range for {num_variables} variables")]
    LiteralOutOfRange {
        clause: usize,
        literal: i32,
        num_variables: usize,
    },
    /// An assignment does not cover every variable exactly once.
    #[error("assignment has {actual} values, expected {expected}")]
    AssignmentLength { expected: usize, actual: usize },
    /// An assignment contains something other than 0 or 1.
    #[error("assignment value {value} at variable {variable} is not binary")]
    NonBinaryValue { variable: usize, value: u8 },
    /// Malformed DIMACS input.
    #[error("DIMACS line {line}: {message}")]
    Parse { line: usize, message: String },
}

/// A formula in conjunctive normal form.
///
/// Literals are signed integers: the sign is the polarity and the magnitude is
/// the 1-based variable id. Construction validates every literal, so the rest
/// of the pipeline never re-checks ranges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Formula {
    num_variables: usize,
    clauses: Vec<Vec<i32>>,
}

impl Formula {
    /// Build a formula, rejecting zero literals and out-of-range variables.
    pub fn new(num_variables: usize, clauses: Vec<Vec<i32>>) -> Result<Self, FormulaError> {
        for (c, clause) in clauses.iter().enumerate() {
            for &literal in clause {
                if literal == 0 {
                    return Err(FormulaError::ZeroLiteral { clause: c });
                }
                if literal.unsigned_abs() as usize > num_variables {
                    return Err(FormulaError::LiteralOutOfRange {
                        clause: c,
                        literal,
                        num_variables,
                    });
                }
            }
        }
        Ok(Self {
            num_variables,
            clauses,
        })
    }

    /// Load a formula from a DIMACS CNF file.
    pub fn from_dimacs_file(path: &Path) -> anyhow::Result<Self> {
        let file = std::fs::File::open(path)
            .map_err(|e| anyhow::anyhow!("Failed to open {}: {e}", path.display()))?;
        let formula = crate::dimacs::parse_dimacs(std::io::BufReader::new(file))?;
        tracing::info!(
            path = %path.display(),
            num_variables = formula.num_variables(),
            num_clauses = formula.num_clauses(),
            "Loaded CNF formula"
        );
        Ok(formula)
    }

    /// Number of variables declared for this formula.
    pub fn num_variables(&self) -> usize {
        self.num_variables
    }

    /// Number of clauses.
    pub fn num_clauses(&self) -> usize {
        self.clauses.len()
    }

    /// The clauses, in load order.
    pub fn clauses(&self) -> &[Vec<i32>] {
        &self.clauses
    }

    /// Number of literal occurrences of each variable (0-based index), ignoring polarity.
    pub fn incidence_counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.num_variables];
        for literal in self.clauses.iter().flatten() {
            counts[literal.unsigned_abs() as usize - 1] += 1;
        }
        counts
    }
}
