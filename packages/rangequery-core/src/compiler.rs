//! Compiler — folds the parser's event stream into a flat bytecode
//! program. See `spec.md` §4.5 "The compiler maps this stream to
//! bytecode by the rule that each operator action emits its opcode,
//! and preceding `ADD_VALUE` actions emit `DATA` instructions."

use crate::bytecode::{Instruction, Program};
use crate::error::{RangeError, Result};
use crate::parser::ParseEvent;

/// Compile a range expression directly to bytecode (parse + compile).
pub fn compile(expr: &str) -> Result<Program> {
    let events = crate::parser::parse(expr)?;
    compile_events(&events)
}

/// Fold an already-parsed event stream into bytecode.
pub fn compile_events(events: &[ParseEvent]) -> Result<Program> {
    let mut program = Program::new();
    let mut pending_value: Option<String> = None;

    for event in events {
        match event {
            ParseEvent::Value(v) => {
                pending_value = Some(v.clone());
            }
            ParseEvent::AddValue => {
                let v = pending_value.take().ok_or_else(|| {
                    RangeError::Internal("ADD_VALUE with no preceding VALUE".to_string())
                })?;
                program.push(Instruction::Data(v));
            }
            ParseEvent::OpUnion => program.push(Instruction::Union),
            ParseEvent::OpInter => program.push(Instruction::Intersection),
            ParseEvent::OpDiff => program.push(Instruction::Difference),
            ParseEvent::OpCluster => program.push(Instruction::ClusterLookup),
            ParseEvent::OpKey(k) => program.push(Instruction::KeyLookup(k.clone())),
            ParseEvent::OpRev => program.push(Instruction::RevLookup),
            ParseEvent::OpRevAttr(a) => program.push(Instruction::RevLookupAttr(a.clone())),
            ParseEvent::OpRevHint(h) => program.push(Instruction::RevLookupHint(h.clone())),
        }
    }

    Ok(program)
}

#[cfg(test)]
mod tests {
    use super::*;
    use Instruction::*;

    #[test]
    fn cluster_lookup_with_key_compiles_inline() {
        let program = compile("%ops-prod-vpc1-range:AUTHORS").unwrap();
        assert_eq!(
            program,
            vec![
                Data("ops-prod-vpc1-range".into()),
                ClusterLookup,
                KeyLookup("AUTHORS".into()),
            ]
        );
    }

    #[test]
    fn nested_range_compiles_to_two_cluster_lookups() {
        let program = compile("%%RANGE").unwrap();
        assert_eq!(program, vec![Data("RANGE".into()), ClusterLookup, ClusterLookup]);
    }

    #[test]
    fn union_then_difference_folds_left_to_right() {
        let program = compile("a ,& b ,- c").unwrap();
        assert_eq!(
            program,
            vec![
                Data("a".into()),
                Data("b".into()),
                Intersection,
                Data("c".into()),
                Difference,
            ]
        );
    }

    #[test]
    fn reverse_lookup_chain() {
        let program = compile("*Ops;AUTHORS:ops-prod-vpc1-mon").unwrap();
        assert_eq!(
            program,
            vec![
                Data("Ops".into()),
                RevLookup,
                RevLookupAttr("AUTHORS".into()),
                RevLookupHint("ops-prod-vpc1-mon".into()),
            ]
        );
    }

    #[test]
    fn empty_expression_compiles_to_empty_program() {
        assert_eq!(compile("").unwrap(), Vec::<Instruction>::new());
    }
}
