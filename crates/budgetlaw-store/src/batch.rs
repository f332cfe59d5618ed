//! Conversion between proposal records and Arrow record batches.

use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, FixedSizeListBuilder, Float32Array, Float32Builder, StringArray, UInt64Array,
};
use arrow::record_batch::RecordBatch;
use budgetlaw_core::proposals::{self, NAME_SEPARATOR};
use budgetlaw_core::{Action, EnrichedRecord, ProposalRecord};

use crate::StoreError;

/// Column added by LanceDB to vector-search results.
const DISTANCE_COLUMN: &str = "_distance";

/// One vector-search result.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub record: ProposalRecord,
    pub distance: Option<f32>,
}

fn join_names(names: &[String]) -> Option<String> {
    (!names.is_empty()).then(|| names.join(NAME_SEPARATOR))
}

fn split_names(joined: Option<&str>) -> Vec<String> {
    joined
        .map(|s| {
            s.split(NAME_SEPARATOR)
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Build one batch in the `proposals` schema. Missing vectors become null rows.
pub fn to_batch(records: &[EnrichedRecord], dim: i32) -> Result<RecordBatch, StoreError> {
    let strings = |f: &dyn Fn(&ProposalRecord) -> Option<String>| -> ArrayRef {
        Arc::new(StringArray::from(
            records.iter().map(|r| f(&r.record)).collect::<Vec<_>>(),
        ))
    };
    let amounts = |f: &dyn Fn(&ProposalRecord) -> Option<u64>| -> ArrayRef {
        Arc::new(UInt64Array::from(
            records.iter().map(|r| f(&r.record)).collect::<Vec<_>>(),
        ))
    };

    let mut vectors = FixedSizeListBuilder::new(Float32Builder::new(), dim);
    for r in records {
        match &r.vector {
            Some(v) if v.len() == dim as usize => {
                vectors.values().append_slice(v);
                vectors.append(true);
            }
            Some(v) => {
                return Err(StoreError::Other(format!(
                    "vector has {} dimensions, expected {dim}",
                    v.len()
                )));
            }
            None => {
                for _ in 0..dim {
                    vectors.values().append_null();
                }
                vectors.append(false);
            }
        }
    }

    let columns: Vec<ArrayRef> = vec![
        strings(&|r| Some(r.category.clone())),
        strings(&|r| Some(r.content.clone())),
        strings(&|r| Some(r.action.as_str().to_string())),
        strings(&|r| join_names(&r.proposer)),
        strings(&|r| join_names(&r.co_signers)),
        amounts(&|r| r.cost),
        amounts(&|r| r.frozen),
        amounts(&|r| r.deleted),
        amounts(&|r| r.added),
        strings(&|r| r.remarks.clone()),
        strings(&|r| Some(r.committee.clone())),
        Arc::new(vectors.finish()),
    ];

    Ok(RecordBatch::try_new(
        Arc::new(proposals::schema(dim)),
        columns,
    )?)
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray, StoreError> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| StoreError::Other(format!("missing or non-string column {name}")))
}

fn amount_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a UInt64Array, StoreError> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<UInt64Array>())
        .ok_or_else(|| StoreError::Other(format!("missing or non-u64 column {name}")))
}

fn opt_str(array: &StringArray, row: usize) -> Option<&str> {
    (!array.is_null(row)).then(|| array.value(row))
}

fn opt_u64(array: &UInt64Array, row: usize) -> Option<u64> {
    (!array.is_null(row)).then(|| array.value(row))
}

/// Read records (and the search distance, when present) back out of a batch.
pub fn from_batch(batch: &RecordBatch) -> Result<Vec<SearchHit>, StoreError> {
    let category = string_column(batch, "category")?;
    let content = string_column(batch, "content")?;
    let action = string_column(batch, "action")?;
    let proposer = string_column(batch, "proposer")?;
    let co_signers = string_column(batch, "co_signers")?;
    let cost = amount_column(batch, "cost")?;
    let frozen = amount_column(batch, "frozen")?;
    let deleted = amount_column(batch, "deleted")?;
    let added = amount_column(batch, "added")?;
    let remarks = string_column(batch, "remarks")?;
    let committee = string_column(batch, "committee")?;
    let distance = batch
        .column_by_name(DISTANCE_COLUMN)
        .and_then(|c| c.as_any().downcast_ref::<Float32Array>());

    (0..batch.num_rows())
        .map(|row| {
            let action: Action = action
                .value(row)
                .parse()
                .map_err(|a| StoreError::Other(format!("unknown action {a:?} in row {row}")))?;
            Ok(SearchHit {
                record: ProposalRecord {
                    category: category.value(row).to_string(),
                    content: content.value(row).to_string(),
                    action,
                    proposer: split_names(opt_str(proposer, row)),
                    co_signers: split_names(opt_str(co_signers, row)),
                    cost: opt_u64(cost, row),
                    frozen: opt_u64(frozen, row),
                    deleted: opt_u64(deleted, row),
                    added: opt_u64(added, row),
                    remarks: opt_str(remarks, row).map(str::to_string),
                    committee: committee.value(row).to_string(),
                },
                distance: distance.and_then(|d| (!d.is_null(row)).then(|| d.value(row))),
            })
        })
        .collect()
}
