//! Stack-based evaluator — see `spec.md` §4.6.
//!
//! The compiler (`crate::compiler`) always emits a `KEY_LOOKUP`
//! immediately after the `CLUSTER_LOOKUP` it qualifies (the grammar
//! only ever attaches a `key` to a `cluster` production, with nothing
//! in between), and likewise `REV_LOOKUP_ATTR`/`REV_LOOKUP_HINT` always
//! trail their `REV_LOOKUP` directly. That means the peek-ahead skips
//! described below always fire when a qualifier is present: the
//! "wasted" forward/reverse call they elide can never actually occur
//! for compiler-produced bytecode, only the skip can.

use crate::bytecode::Instruction;
use crate::error::{RangeError, Result};
use crate::store::Store;

/// Outcome of evaluating a program: a possibly-partial result plus any
/// recoverable errors encountered along the way (`spec.md` §7
/// propagation policy — lookup/backend/data errors never abort
/// evaluation, they accumulate here).
#[derive(Debug, Default)]
pub struct EvalResult {
    pub values: Vec<String>,
    pub errors: Vec<RangeError>,
}

impl EvalResult {
    pub fn is_err(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Evaluate a compiled program against `store`.
///
/// Returns `Err` only for an evaluator invariant violation (malformed
/// bytecode producing a stack depth other than 0 or 1 at the end) —
/// this is the "internal error" class in `spec.md` §7, distinct from
/// the recoverable lookup/backend/data errors accumulated in
/// `EvalResult::errors`.
pub fn evaluate(program: &[Instruction], store: &dyn Store) -> Result<EvalResult> {
    let mut stack: Vec<Vec<String>> = Vec::new();
    let mut errors: Vec<RangeError> = Vec::new();
    let mut pc = 0usize;

    while pc < program.len() {
        match &program[pc] {
            Instruction::Data(v) => {
                stack.push(vec![v.clone()]);
            }

            Instruction::Union => binary(&mut stack, crate::setops::union)?,
            Instruction::Intersection => binary(&mut stack, crate::setops::intersection)?,
            Instruction::Difference => binary(&mut stack, crate::setops::difference)?,

            Instruction::ClusterLookup => {
                if matches!(program.get(pc + 1), Some(Instruction::KeyLookup(_))) {
                    pc += 1;
                    continue;
                }
                let top = top_mut(&mut stack)?;
                match store.cluster_lookup(top) {
                    Ok(r) => *top = r,
                    Err(e) => {
                        *top = Vec::new();
                        errors.push(e);
                    }
                }
            }

            Instruction::KeyLookup(key) => {
                let top = top_mut(&mut stack)?;
                let clusters = std::mem::take(top);
                match store.key_lookup(&clusters, key) {
                    Ok(mut r) => {
                        crate::setops::dedup(&mut r);
                        *top = r;
                    }
                    Err(e) => errors.push(e),
                }
            }

            Instruction::RevLookup => {
                if matches!(program.get(pc + 1), Some(Instruction::RevLookupAttr(_))) {
                    pc += 1;
                    continue;
                }
                let top = top_mut(&mut stack)?;
                let value = single_value(top)?;
                match store.key_reverse_lookup(&value) {
                    Ok(r) => *top = r,
                    Err(e) => {
                        *top = Vec::new();
                        errors.push(e);
                    }
                }
            }

            Instruction::RevLookupAttr(attr) => {
                if matches!(program.get(pc + 1), Some(Instruction::RevLookupHint(_))) {
                    pc += 1;
                    continue;
                }
                let top = top_mut(&mut stack)?;
                let value = single_value(top)?;
                match store.key_reverse_lookup_attr(&value, attr) {
                    Ok(r) => *top = r,
                    Err(e) => {
                        *top = Vec::new();
                        errors.push(e);
                    }
                }
            }

            Instruction::RevLookupHint(hint) => {
                // The attr this hint qualifies was parked on the
                // REV_LOOKUP_ATTR instruction immediately before this
                // one (it was skipped, not discarded — its payload is
                // still addressable by index).
                let attr = match pc.checked_sub(1).and_then(|i| program.get(i)) {
                    Some(Instruction::RevLookupAttr(a)) => a.clone(),
                    _ => {
                        return Err(RangeError::Internal(
                            "REV_LOOKUP_HINT with no preceding REV_LOOKUP_ATTR".to_string(),
                        ))
                    }
                };
                let top = top_mut(&mut stack)?;
                let value = single_value(top)?;
                match store.key_reverse_lookup_hint(&value, &attr, hint) {
                    Ok(r) => *top = r,
                    Err(e) => {
                        *top = Vec::new();
                        errors.push(e);
                    }
                }
            }
        }
        pc += 1;
    }

    match stack.len() {
        0 => Ok(EvalResult {
            values: Vec::new(),
            errors,
        }),
        1 => Ok(EvalResult {
            values: stack.into_iter().next().unwrap(),
            errors,
        }),
        n => Err(RangeError::Internal(format!(
            "evaluator terminated with {n} items on the stack, expected 0 or 1"
        ))),
    }
}

fn top_mut(stack: &mut [Vec<String>]) -> Result<&mut Vec<String>> {
    stack
        .last_mut()
        .ok_or_else(|| RangeError::Internal("stack underflow".to_string()))
}

fn single_value(seq: &[String]) -> Result<String> {
    seq.first()
        .cloned()
        .ok_or_else(|| RangeError::Internal("expected a single value on top of stack".to_string()))
}

fn binary(
    stack: &mut Vec<Vec<String>>,
    f: impl Fn(&[String], &[String]) -> Vec<String>,
) -> Result<()> {
    let b = stack
        .pop()
        .ok_or_else(|| RangeError::Internal("stack underflow (rhs)".to_string()))?;
    let a = stack
        .pop()
        .ok_or_else(|| RangeError::Internal("stack underflow (lhs)".to_string()))?;
    stack.push(f(&a, &b));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile;
    use crate::store::TestStore;

    fn run(expr: &str) -> EvalResult {
        let program = compile(expr).unwrap();
        evaluate(&program, &TestStore::new()).unwrap()
    }

    fn set(v: &[&str]) -> std::collections::BTreeSet<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn scenario_1_top_level_range() {
        let r = run("%RANGE");
        assert!(!r.is_err());
        assert_eq!(set(&r.values.iter().map(|s| s.as_str()).collect::<Vec<_>>()), set(&["ops", "data"]));
    }

    #[test]
    fn scenario_2_double_range() {
        let r = run("%%RANGE");
        assert!(!r.is_err());
        assert_eq!(
            set(&r.values.iter().map(|s| s.as_str()).collect::<Vec<_>>()),
            set(&["ops-prod", "data-prod", "data-qa"])
        );
    }

    #[test]
    fn scenario_3_cluster_key_peek_ahead_elides_cluster_lookup() {
        let r = run("%ops-prod-vpc1-range:AUTHORS");
        assert!(!r.is_err());
        assert_eq!(r.values, vec!["Vigith Maurice".to_string()]);
    }

    #[test]
    fn scenario_5_reverse_lookup_by_node() {
        let r = run("*range1001.ops.example.com");
        assert!(!r.is_err());
        assert_eq!(r.values, vec!["ops-prod-vpc1-range".to_string()]);
    }

    #[test]
    fn scenario_7_combined_union_and_intersection() {
        let r = run(
            "(*Ops;AUTHORS , *Vigith Maurice;AUTHORS) ,& (ops-prod-vpc1-range, ops-prod-vpc1-mon)",
        );
        assert!(!r.is_err());
        assert_eq!(
            set(&r.values.iter().map(|s| s.as_str()).collect::<Vec<_>>()),
            set(&["ops-prod-vpc1-range", "ops-prod-vpc1-mon"])
        );
    }

    #[test]
    fn scenario_8_malformed_expressions_are_parse_errors() {
        assert!(crate::compiler::compile("1").is_err());
        assert!(crate::compiler::compile("%a-b-%d").is_err());
        assert!(crate::compiler::compile("%a-b,%d,").is_err());
    }

    #[test]
    fn empty_expression_is_empty_result_no_error() {
        let r = run("");
        assert!(r.values.is_empty());
        assert!(!r.is_err());
    }

    #[test]
    fn missing_cluster_yields_lookup_error_with_partial_result() {
        let program = compile("%nope").unwrap();
        let result = evaluate(&program, &TestStore::new()).unwrap();
        assert!(result.is_err());
        assert!(result.values.is_empty());
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].code(), "CLUSTER_NOT_FOUND");
    }

    #[test]
    fn reverse_lookup_fast_vs_whole_tree_cardinality() {
        let mut fast = TestStore::new();
        assert!(fast.fast_lookup());
        let r = evaluate(&compile("*Ops;AUTHORS").unwrap(), &fast).unwrap();
        assert_eq!(r.values.len(), 1);

        fast.set_fast_lookup(false);
        let r = evaluate(&compile("*Ops;AUTHORS").unwrap(), &fast).unwrap();
        assert_eq!(r.values.len(), 2);
    }

    #[test]
    fn union_then_difference_is_left_biased_across_the_whole_program() {
        // "(%ops-prod ,& ops-prod-vpc2) , %data-prod ,- %data-qa" parses
        // as a flat left-to-right fold: ((bracket ∪ data-prod) \ data-qa).
        // The bracket intersects ops-prod's children with the literal
        // "ops-prod-vpc2", producing ["ops-prod-vpc2"] — a value that is
        // never a member of data-qa's children, so it survives the final
        // difference. This is the mathematically consistent result for
        // the algebra in spec.md §4.1/§9; it differs from the literal
        // worked example in spec.md §8 scenario 4, which is not
        // reproducible by any associativity of the stated operators
        // (see DESIGN.md).
        let r = run("(%ops-prod ,& ops-prod-vpc2) , %data-prod ,- %data-qa");
        assert!(!r.is_err());
        assert_eq!(
            set(&r.values.iter().map(|s| s.as_str()).collect::<Vec<_>>()),
            set(&[
                "data-prod-vpc1",
                "data-prod-vpc2",
                "data-prod-vpc3",
                "ops-prod-vpc2",
            ])
        );
    }
}
