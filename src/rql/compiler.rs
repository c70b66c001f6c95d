//! Read-plan compilation.
//!
//! Flattens a read-plan tree into an ordered list of independently timed
//! sub-queries. A multi plan divides its time budget among children in
//! proportion to their weights; integer division truncates, and the
//! dropped remainder is documented, accepted drift (at most one unit per
//! child), not corrected.

use crate::core::error::{ReaderError, Result};
use crate::core::filter::TagFilter;
use crate::core::op::TagOp;
use crate::core::plan::{ReadPlan, SimpleReadPlan};
use crate::core::tag::TagProtocol;
use crate::rql::query::{hex_literal, select};
use crate::rql::row::RowLayout;
use crate::rql::{TAG_DATA_TABLE, TAG_ID_TABLE};

/// One compiled sub-query with its share of the time budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledQuery {
    /// The rendered SELECT statement, `SET time_out` included.
    pub query: String,

    /// This sub-query's share of the total timeout, in milliseconds.
    pub timeout_ms: u64,

    /// Stop-after-N-tags trigger, when the plan requested one.
    pub stop_count: Option<u32>,

    /// Row layout this sub-query's responses arrive in.
    pub layout: RowLayout,
}

/// Compile a read plan into sub-queries.
///
/// `layout` is the model-negotiated basic row layout; plans embedding a
/// memory read switch to the embedded-op layout regardless.
pub fn compile(plan: &ReadPlan, timeout_ms: u64, layout: RowLayout) -> Result<Vec<CompiledQuery>> {
    let mut out = Vec::new();
    walk(plan, timeout_ms, layout, &mut out)?;
    Ok(out)
}

fn walk(
    plan: &ReadPlan,
    timeout_ms: u64,
    layout: RowLayout,
    out: &mut Vec<CompiledQuery>,
) -> Result<()> {
    match plan {
        ReadPlan::Simple(simple) => {
            out.push(compile_simple(simple, timeout_ms, layout, None)?);
            Ok(())
        }
        ReadPlan::StopTrigger(st) => {
            out.push(compile_simple(&st.plan, timeout_ms, layout, Some(st.stop_count))?);
            Ok(())
        }
        ReadPlan::Multi(multi) => {
            if multi.plans.is_empty() {
                return Ok(());
            }
            let total_weight: u64 = multi.plans.iter().map(|p| p.weight() as u64).sum();
            for child in &multi.plans {
                // Equal split avoids dividing by a zero total weight.
                let sub = if total_weight > 0 {
                    timeout_ms * child.weight() as u64 / total_weight
                } else {
                    timeout_ms / multi.plans.len() as u64
                };
                walk(child, sub, layout, out)?;
            }
            Ok(())
        }
    }
}

fn compile_simple(
    plan: &SimpleReadPlan,
    timeout_ms: u64,
    layout: RowLayout,
    stop_count: Option<u32>,
) -> Result<CompiledQuery> {
    let mut clauses = vec![protocol_clause(plan.protocol)];
    if let Some(clause) = antenna_clause(&plan.antennas) {
        clauses.push(clause);
    }
    if let Some(filter) = &plan.filter {
        clauses.extend(filter_clauses(filter, plan.protocol)?);
    }

    let (table, layout) = match &plan.op {
        None => (TAG_ID_TABLE, layout),
        Some(TagOp::ReadMemory {
            bank,
            word_address,
            word_count,
        }) => {
            super::memop::validate_bank_and_count(*bank, *word_count)?;
            clauses.push(format!("mem_bank={}", bank));
            clauses.push(format!("block_count={}", word_count));
            clauses.push(format!("block_number={}", word_address));
            (TAG_DATA_TABLE, RowLayout::EmbeddedOp)
        }
        Some(other) => {
            return Err(ReaderError::Unsupported(format!(
                "only memory reads can be embedded in a read plan, not {:?}",
                other
            )))
        }
    };

    Ok(CompiledQuery {
        query: select(layout.fields(), table, &clauses, Some(timeout_ms)),
        timeout_ms,
        stop_count,
        layout,
    })
}

/// `protocol_id='…'` clause.
pub(crate) fn protocol_clause(protocol: TagProtocol) -> String {
    format!("protocol_id='{}'", protocol.rql_token())
}

/// Antenna clause: bare equality for one antenna, a parenthesized OR chain
/// for several, nothing for automatic selection.
pub(crate) fn antenna_clause(antennas: &[u16]) -> Option<String> {
    match antennas {
        [] => None,
        [one] => Some(format!("antenna_id={}", one)),
        many => {
            let ors: Vec<String> = many.iter().map(|a| format!("antenna_id={}", a)).collect();
            Some(format!("({})", ors.join(" OR ")))
        }
    }
}

/// Translate a filter into WHERE fragments.
///
/// Each protocol only supports singulation by EPC or by its native select;
/// a filter kind from another protocol is an unsupported-filter error.
pub(crate) fn filter_clauses(filter: &TagFilter, protocol: TagProtocol) -> Result<Vec<String>> {
    match (filter, protocol) {
        (TagFilter::Identity(tag), _) => Ok(vec![format!("id=0x{}", tag.id_hex())]),
        (
            TagFilter::Gen2Select {
                invert,
                bank,
                bit_address,
                bit_length,
                mask,
            },
            TagProtocol::Gen2,
        ) => {
            let mut clauses = vec![
                format!("filter_invert={}", *invert as u8),
                format!("filter_bank={}", bank.number()),
                format!("filter_bit_address={}", bit_address),
                format!("filter_bit_length={}", bit_length),
            ];
            if !mask.is_empty() {
                clauses.push(format!("filter_mask={}", hex_literal(mask)));
            }
            Ok(clauses)
        }
        (
            TagFilter::Iso6bSelect {
                op,
                invert,
                address,
                data,
            },
            TagProtocol::Iso180006b | TagProtocol::Iso180006bUcode,
        ) => Ok(vec![
            format!("filter_command={}", op.command_code()),
            format!("filter_invert={}", *invert as u8),
            // the wire protocol fixes a 64-bit compare with a full byte mask
            String::from("filter_bit_length=64"),
            String::from("filter_mask=0xff"),
            format!("filter_byte_address={}", address),
            format!("filter_data={}", hex_literal(data)),
        ]),
        (filter, protocol) => Err(ReaderError::Unsupported(format!(
            "{} only supports singulation by EPC or by its native select, not {:?}",
            protocol, filter
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::plan::{MultiReadPlan, StopTriggerPlan};
    use crate::core::tag::{MemBank, TagIdentity};
    use pretty_assertions::assert_eq;

    fn simple(antennas: Vec<u16>, weight: u32) -> ReadPlan {
        SimpleReadPlan::new(antennas, TagProtocol::Gen2)
            .with_weight(weight)
            .into()
    }

    #[test]
    fn test_simple_plan_round_trip() {
        let plan = ReadPlan::Simple(SimpleReadPlan::new(vec![2, 5], TagProtocol::Gen2));
        let compiled = compile(&plan, 1000, RowLayout::Basic).unwrap();
        assert_eq!(compiled.len(), 1);
        assert_eq!(
            compiled[0].query,
            "SELECT antenna_id,read_count,id,frequency,dspmicros,protocol_id FROM tag_id \
             WHERE protocol_id='GEN2' AND (antenna_id=2 OR antenna_id=5) SET time_out=1000"
        );
        assert_eq!(compiled[0].timeout_ms, 1000);
    }

    #[test]
    fn test_single_antenna_bare_equality() {
        let plan = ReadPlan::Simple(SimpleReadPlan::new(vec![1], TagProtocol::Gen2));
        let compiled = compile(&plan, 500, RowLayout::Basic).unwrap();
        assert!(compiled[0].query.contains("WHERE protocol_id='GEN2' AND antenna_id=1 "));
        assert!(!compiled[0].query.contains("OR"));
    }

    #[test]
    fn test_auto_antennas_no_clause() {
        let plan = ReadPlan::Simple(SimpleReadPlan::new(vec![], TagProtocol::Gen2));
        let compiled = compile(&plan, 500, RowLayout::Basic).unwrap();
        assert!(!compiled[0].query.contains("antenna_id="));
    }

    #[test]
    fn test_weight_division_sums_within_truncation_bound() {
        let weights = [300u32, 333, 167, 200];
        let total: u32 = weights.iter().sum();
        let plans: Vec<ReadPlan> = weights.iter().map(|w| simple(vec![1], *w)).collect();
        let multi = ReadPlan::Multi(MultiReadPlan::new(plans));
        let timeout = 997u64;

        let compiled = compile(&multi, timeout, RowLayout::Basic).unwrap();
        assert_eq!(compiled.len(), weights.len());
        for (q, w) in compiled.iter().zip(weights.iter()) {
            assert_eq!(q.timeout_ms, timeout * *w as u64 / total as u64);
        }
        let sum: u64 = compiled.iter().map(|q| q.timeout_ms).sum();
        assert!(sum <= timeout);
        assert!(timeout - sum <= weights.len() as u64);
    }

    #[test]
    fn test_zero_total_weight_splits_equally() {
        let plans: Vec<ReadPlan> = (0..4).map(|i| simple(vec![i + 1], 0)).collect();
        let multi = ReadPlan::Multi(MultiReadPlan::new(plans));
        let compiled = compile(&multi, 1000, RowLayout::Basic).unwrap();
        assert!(compiled.iter().all(|q| q.timeout_ms == 250));
    }

    #[test]
    fn test_nested_multi_concatenates_in_child_order() {
        let inner = ReadPlan::Multi(MultiReadPlan::new(vec![
            simple(vec![1], 500),
            simple(vec![2], 500),
        ]));
        let multi = ReadPlan::Multi(MultiReadPlan::new(vec![inner, simple(vec![3], 1000)]));
        let compiled = compile(&multi, 2000, RowLayout::Basic).unwrap();
        assert_eq!(compiled.len(), 3);
        assert!(compiled[0].query.contains("antenna_id=1"));
        assert!(compiled[1].query.contains("antenna_id=2"));
        assert!(compiled[2].query.contains("antenna_id=3"));
        assert_eq!(compiled[0].timeout_ms, 500);
        assert_eq!(compiled[2].timeout_ms, 1000);
    }

    #[test]
    fn test_compile_is_idempotent() {
        let plan = ReadPlan::Multi(MultiReadPlan::new(vec![
            simple(vec![1, 2], 300),
            simple(vec![3], 700),
        ]));
        let a = compile(&plan, 777, RowLayout::BasicLqi).unwrap();
        let b = compile(&plan, 777, RowLayout::BasicLqi).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_identity_filter_clause() {
        let tag = TagIdentity::new(TagProtocol::Gen2, vec![0xE2, 0x00])
            .unwrap()
            .with_crc(vec![0xAA, 0xBB]);
        let plan = ReadPlan::Simple(
            SimpleReadPlan::new(vec![1], TagProtocol::Gen2).with_filter(TagFilter::identity(tag)),
        );
        let compiled = compile(&plan, 100, RowLayout::Basic).unwrap();
        assert!(compiled[0].query.contains("id=0xE200AABB"));
    }

    #[test]
    fn test_gen2_select_filter_fields() {
        let plan = ReadPlan::Simple(
            SimpleReadPlan::new(vec![1], TagProtocol::Gen2).with_filter(TagFilter::Gen2Select {
                invert: true,
                bank: MemBank::Epc,
                bit_address: 32,
                bit_length: 16,
                mask: vec![0xE2, 0x00],
            }),
        );
        let q = &compile(&plan, 100, RowLayout::Basic).unwrap()[0].query;
        assert!(q.contains("filter_invert=1"));
        assert!(q.contains("filter_bank=1"));
        assert!(q.contains("filter_bit_address=32"));
        assert!(q.contains("filter_bit_length=16"));
        assert!(q.contains("filter_mask=0xE200"));
    }

    #[test]
    fn test_iso_select_filter_fields() {
        let plan = ReadPlan::Simple(
            SimpleReadPlan::new(vec![1], TagProtocol::Iso180006b).with_filter(
                TagFilter::Iso6bSelect {
                    op: crate::core::filter::SelectOp::NotEquals,
                    invert: false,
                    address: 0x18,
                    data: [1, 2, 3, 4, 5, 6, 7, 8],
                },
            ),
        );
        let q = &compile(&plan, 100, RowLayout::Basic).unwrap()[0].query;
        assert!(q.contains("filter_command=1"));
        assert!(q.contains("filter_bit_length=64"));
        assert!(q.contains("filter_mask=0xff"));
        assert!(q.contains("filter_byte_address=24"));
        assert!(q.contains("filter_data=0x0102030405060708"));
    }

    #[test]
    fn test_foreign_filter_kind_unsupported() {
        let plan = ReadPlan::Simple(
            SimpleReadPlan::new(vec![1], TagProtocol::Iso180006b).with_filter(
                TagFilter::Gen2Select {
                    invert: false,
                    bank: MemBank::Epc,
                    bit_address: 0,
                    bit_length: 8,
                    mask: vec![],
                },
            ),
        );
        assert!(matches!(
            compile(&plan, 100, RowLayout::Basic),
            Err(ReaderError::Unsupported(_))
        ));
    }

    #[test]
    fn test_embedded_read_memory_switches_layout_and_table() {
        let plan = ReadPlan::Simple(
            SimpleReadPlan::new(vec![1], TagProtocol::Gen2).with_op(TagOp::ReadMemory {
                bank: 3,
                word_address: 2,
                word_count: 4,
            }),
        );
        let q = &compile(&plan, 100, RowLayout::Basic).unwrap()[0].query;
        assert!(q.starts_with(
            "SELECT antenna_id,read_count,id,metadata,data,protocol_id,phase FROM tag_data"
        ));
        assert!(q.contains("mem_bank=3"));
        assert!(q.contains("block_count=4"));
        assert!(q.contains("block_number=2"));
    }

    #[test]
    fn test_embedded_non_read_op_rejected() {
        let plan = ReadPlan::Simple(
            SimpleReadPlan::new(vec![1], TagProtocol::Gen2)
                .with_op(TagOp::Kill { password: 1234 }),
        );
        assert!(matches!(
            compile(&plan, 100, RowLayout::Basic),
            Err(ReaderError::Unsupported(_))
        ));
    }

    #[test]
    fn test_stop_trigger_carries_count() {
        let plan = ReadPlan::StopTrigger(StopTriggerPlan {
            plan: SimpleReadPlan::new(vec![1], TagProtocol::Gen2),
            stop_count: 5,
        });
        let compiled = compile(&plan, 100, RowLayout::Basic).unwrap();
        assert_eq!(compiled[0].stop_count, Some(5));
    }
}
