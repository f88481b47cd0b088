//! Clause evaluation: how many clauses a 0/1 assignment satisfies.

use crate::formula::{Formula, FormulaError};

/// Outcome of evaluating one assignment against a formula.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClauseEvaluation {
    /// True iff every clause is satisfied.
    pub is_satisfied: bool,
    /// Number of satisfied clauses.
    pub num_satisfied: usize,
    /// Per-clause satisfaction, in formula order.
    pub clause_satisfied: Vec<bool>,
}

/// Evaluate a single assignment indexed by 0-based variable id.
///
/// Literal `v` is true when `assignment[v - 1] == 1`; literal `-v` is true when
/// it is `0`. An empty clause is never satisfied.
pub fn evaluate(formula: &Formula, assignment: &[u8]) -> Result<ClauseEvaluation, FormulaError> {
    check_assignment(formula, assignment)?;

    let clause_satisfied: Vec<bool> = formula
        .clauses()
        .iter()
        .map(|clause| clause.iter().any(|&lit| literal_value(lit, assignment)))
        .collect();
    let num_satisfied = clause_satisfied.iter().filter(|&&s| s).count();

    Ok(ClauseEvaluation {
        is_satisfied: num_satisfied == formula.num_clauses(),
        num_satisfied,
        clause_satisfied,
    })
}

/// Count satisfied clauses for each row of a batch of assignments.
pub fn count_satisfied(formula: &Formula, batch: &[Vec<u8>]) -> Result<Vec<usize>, FormulaError> {
    batch
        .iter()
        .map(|row| evaluate(formula, row).map(|e| e.num_satisfied))
        .collect()
}

fn literal_value(literal: i32, assignment: &[u8]) -> bool {
    let value = assignment[literal.unsigned_abs() as usize - 1] == 1;
    if literal < 0 {
        !value
    } else {
        value
    }
}

fn check_assignment(formula: &Formula, assignment: &[u8]) -> Result<(), FormulaError> {
    if assignment.len() != formula.num_variables() {
        return Err(FormulaError::AssignmentLength {
            expected: formula.num_variables(),
            actual: assignment.len(),
        });
    }
    if let Some((variable, &value)) = assignment.iter().enumerate().find(|(_, &v)| v > 1) {
        return Err(FormulaError::NonBinaryValue { variable, value });
    }
    Ok(())
}
