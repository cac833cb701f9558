//! # Schema Reconciliation
//!
//! Workers infer table schemas from their own shard slice, so two workers can
//! disagree about the same label: a column that is empty locally infers as
//! `null`, a column with only whole numbers infers as `int64` where another
//! worker saw `double`. Before tables cross the shuffle every worker must hold
//! the same schema.
//!
//! ## Protocol (once per table, skipped for a single worker)
//!
//! 1. Every worker serializes its local schema, or proposes the empty
//!    sentinel when it holds zero rows, and gathers the byte length to the
//!    coordinator.
//! 2. The coordinator gathers the proposals (variable length) and computes
//!    the most common schema, matching columns by name.
//! 3. The coordinator broadcasts the outcome (length, then bytes). The
//!    outcome is always broadcast, including when it is a failure, so every
//!    worker leaves the phase with the same verdict.
//! 4. Every worker rebuilds or promotes its table to the agreed schema.

use crate::comm::{COORDINATOR, Communicator};
use crate::formats::{decode, encode};
use crate::table::{DataType, Field, Schema, Table};
use crate::LoadError;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::BTreeSet;
use tracing::debug;

/// What the coordinator tells every worker at the end of a sync.
#[derive(Debug, Serialize, Deserialize)]
enum SyncOutcome {
    Agreed(Schema),
    AllEmpty,
    Failed(String),
}

/// Owns the serialized proposal and drives one sync at a time.
#[derive(Debug, Default)]
pub struct SchemaReconciler {
    proposal: Vec<u8>,
}

impl SchemaReconciler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serialize the local proposal. `None` yields the empty sentinel.
    ///
    /// Metadata never takes part in reconciliation and is stripped.
    pub fn propose(&mut self, local: Option<&Schema>) -> Result<&[u8], LoadError> {
        self.proposal = match local {
            Some(schema) => encode(&Schema::new(schema.fields().to_vec()))?,
            None => Vec::new(),
        };
        Ok(&self.proposal)
    }

    /// Pick the modal field for every column name across the candidates.
    ///
    /// Columns are matched by name. The widest candidate fixes the column
    /// order (ties go to the lowest worker); names only seen in narrower
    /// candidates are appended in the order they were first seen. The
    /// candidates for one name are sorted by canonical type key and counted
    /// in runs; the longest run wins, ties going to the run that sorts first.
    /// `null` candidates only win a column when no candidate for that name
    /// has a concrete type. A column missing from some candidate is nullable.
    ///
    /// A candidate naming the same column twice is rejected.
    pub fn most_common_schema(candidates: &[Option<Schema>]) -> Result<Schema, LoadError> {
        let present: Vec<&Schema> = candidates.iter().flatten().collect();
        if present.is_empty() {
            return Err(LoadError::IoError("All schemas are empty".to_string()));
        }
        for schema in &present {
            if let Some(name) = duplicate_name(schema) {
                return Err(LoadError::InvalidSchema(format!(
                    "column '{name}' appears more than once in one schema"
                )));
            }
        }

        let mut by_width = present.clone();
        by_width.sort_by_key(|s| Reverse(s.num_fields()));
        let mut seen = BTreeSet::new();
        let names: Vec<&str> = by_width
            .iter()
            .copied()
            .flat_map(Schema::fields)
            .map(|f| f.name.as_str())
            .filter(|name| seen.insert(*name))
            .collect();

        let mut modal = Vec::with_capacity(names.len());
        for name in names {
            let mut fields: Vec<&Field> = present
                .iter()
                .filter_map(|s| s.index_of(name).and_then(|i| s.field(i)))
                .collect();
            let everywhere = fields.len() == present.len();
            if fields.iter().any(|f| f.data_type != DataType::Null) {
                fields.retain(|f| f.data_type != DataType::Null);
            }
            fields.sort_by_key(|f| f.data_type.type_key());
            let mut field = modal_field(&fields).clone();
            if !everywhere {
                field.nullable = true;
            }
            modal.push(field);
        }
        Ok(Schema::new(modal))
    }

    /// Run the collective protocol for one table and return it reconciled.
    ///
    /// Every worker must call this for the same table in the same order.
    #[tracing::instrument(skip_all, fields(rows = table.num_rows()))]
    pub fn sync<C: Communicator + ?Sized>(
        &mut self,
        table: Table,
        comm: &C,
    ) -> Result<Table, LoadError> {
        if comm.worker_num() == 1 {
            return Ok(table);
        }

        let has_rows = !table.is_empty();
        let size = self.propose(has_rows.then(|| table.schema()))?.len();
        debug!(worker = comm.worker_id(), bytes = size, "proposing schema");

        let sizes = comm.gather_u64(size as u64, COORDINATOR)?;
        let proposals = comm.gather(self.proposal.clone(), COORDINATOR)?;

        let outcome = match (sizes, proposals) {
            (Some(sizes), Some(proposals)) => {
                let outcome = coordinate(&sizes, &proposals);
                let bytes = encode(&outcome)?;
                comm.broadcast_u64(bytes.len() as u64, COORDINATOR)?;
                comm.broadcast(bytes, COORDINATOR)?;
                outcome
            }
            _ => {
                let expected = comm.broadcast_u64(0, COORDINATOR)?;
                let bytes = comm.broadcast(Vec::new(), COORDINATOR)?;
                if bytes.len() as u64 != expected {
                    return Err(LoadError::Communication(format!(
                        "schema broadcast announced {expected} bytes, received {}",
                        bytes.len()
                    )));
                }
                decode(&bytes)?
            }
        };

        let agreed = match outcome {
            SyncOutcome::Agreed(schema) => schema,
            SyncOutcome::AllEmpty => {
                return Err(LoadError::IoError("All schemas are empty".to_string()));
            }
            SyncOutcome::Failed(reason) => return Err(LoadError::InvalidSchema(reason)),
        };

        if has_rows {
            table.promote_to_schema(&agreed)
        } else {
            Ok(Table::empty(agreed))
        }
    }
}

/// First field of the longest run of equal types in `sorted`.
///
/// `sorted` is never empty: every merged column name has at least one
/// contributor.
fn modal_field<'a>(sorted: &[&'a Field]) -> &'a Field {
    let mut best = sorted[0];
    let mut best_count = 0;
    let mut run_start = 0;
    for j in 1..=sorted.len() {
        let run_ends = j == sorted.len() || sorted[j].data_type != sorted[j - 1].data_type;
        if run_ends {
            let count = j - run_start;
            if count > best_count {
                best_count = count;
                best = sorted[run_start];
            }
            run_start = j;
        }
    }
    best
}

fn duplicate_name(schema: &Schema) -> Option<&str> {
    let mut seen = BTreeSet::new();
    schema
        .fields()
        .iter()
        .map(|f| f.name.as_str())
        .find(|name| !seen.insert(*name))
}

/// Coordinator side: decode the proposals and settle on an outcome.
fn coordinate(sizes: &[u64], proposals: &[Vec<u8>]) -> SyncOutcome {
    if sizes.iter().all(|&s| s == 0) {
        return SyncOutcome::AllEmpty;
    }
    let mut schemas = Vec::with_capacity(proposals.len());
    for (worker, (size, bytes)) in sizes.iter().zip(proposals).enumerate() {
        if *size != bytes.len() as u64 {
            return SyncOutcome::Failed(format!(
                "worker {worker} announced {size} schema bytes but sent {}",
                bytes.len()
            ));
        }
        if bytes.is_empty() {
            schemas.push(None);
            continue;
        }
        match decode::<Schema>(bytes) {
            Ok(schema) => schemas.push(Some(schema)),
            Err(e) => return SyncOutcome::Failed(format!("worker {worker}: {e}")),
        }
    }
    match SchemaReconciler::most_common_schema(&schemas) {
        Ok(schema) => SyncOutcome::Agreed(schema),
        Err(e) => SyncOutcome::Failed(e.to_string()),
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::LocalCluster;
    use crate::table::{Column, Value};
    use std::thread;

    fn schema(types: &[(&str, DataType)]) -> Schema {
        Schema::new(types.iter().map(|(n, t)| Field::new(*n, *t)).collect())
    }

    #[test]
    fn uniform_schemas_are_returned_unchanged() {
        let s = schema(&[("id", DataType::Int64), ("name", DataType::Utf8)]);
        let agreed =
            SchemaReconciler::most_common_schema(&[Some(s.clone()), Some(s.clone()), Some(s.clone())])
                .expect("agree");
        assert_eq!(agreed, s);
    }

    #[test]
    fn majority_type_wins_each_position() {
        let a = schema(&[("id", DataType::Int64), ("w", DataType::Float64)]);
        let b = schema(&[("id", DataType::Int64), ("w", DataType::Int64)]);
        let agreed = SchemaReconciler::most_common_schema(&[
            Some(a.clone()),
            Some(b.clone()),
            Some(a.clone()),
        ])
        .expect("agree");
        assert_eq!(agreed, a);
    }

    #[test]
    fn ties_go_to_first_type_key_in_sort_order() {
        let a = schema(&[("w", DataType::Int64)]);
        let b = schema(&[("w", DataType::Float64)]);
        let agreed =
            SchemaReconciler::most_common_schema(&[Some(a), Some(b.clone())]).expect("agree");
        // "double" sorts before "int64"
        assert_eq!(agreed, b);
    }

    #[test]
    fn null_candidates_yield_to_observed_types() {
        let sparse = schema(&[("id", DataType::Int64), ("age", DataType::Null)]);
        let dense = schema(&[("id", DataType::Int64), ("age", DataType::Int64)]);
        let agreed = SchemaReconciler::most_common_schema(&[
            Some(sparse.clone()),
            Some(sparse),
            Some(dense.clone()),
        ])
        .expect("agree");
        assert_eq!(agreed, dense);
    }

    #[test]
    fn empty_workers_are_skipped() {
        let s = schema(&[("id", DataType::Int64)]);
        let agreed =
            SchemaReconciler::most_common_schema(&[None, Some(s.clone()), None]).expect("agree");
        assert_eq!(agreed, s);
    }

    #[test]
    fn columns_are_matched_by_name_not_position() {
        let wide = schema(&[
            ("id", DataType::Int64),
            ("name", DataType::Utf8),
            ("age", DataType::Int64),
        ]);
        let narrow = schema(&[("id", DataType::Int64), ("age", DataType::Int64)]);

        for candidates in [
            [Some(wide.clone()), Some(narrow.clone())],
            [Some(narrow.clone()), Some(wide.clone())],
        ] {
            let agreed = SchemaReconciler::most_common_schema(&candidates).expect("agree");
            let names: Vec<&str> = agreed.fields().iter().map(|f| f.name.as_str()).collect();
            assert_eq!(names, ["id", "name", "age"]);
            assert_eq!(agreed.fields()[2].data_type, DataType::Int64);
            assert!(agreed.fields()[1].nullable);
        }
    }

    #[test]
    fn names_missing_from_the_widest_schema_are_appended() {
        let a = schema(&[("id", DataType::Int64), ("name", DataType::Utf8)]);
        let b = schema(&[("id", DataType::Int64), ("age", DataType::Int64)]);
        let agreed = SchemaReconciler::most_common_schema(&[Some(a), Some(b)]).expect("agree");
        let names: Vec<&str> = agreed.fields().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["id", "name", "age"]);
    }

    #[test]
    fn duplicate_column_names_are_rejected() {
        let twice = schema(&[("id", DataType::Int64), ("id", DataType::Utf8)]);
        let ok = schema(&[("id", DataType::Int64)]);
        assert!(matches!(
            SchemaReconciler::most_common_schema(&[Some(ok), Some(twice)]),
            Err(LoadError::InvalidSchema(_))
        ));
    }

    #[test]
    fn all_empty_is_io_error() {
        assert!(matches!(
            SchemaReconciler::most_common_schema(&[None, None]),
            Err(LoadError::IoError(_))
        ));
    }

    #[test]
    fn propose_strips_metadata_and_empty_is_sentinel() {
        let mut reconciler = SchemaReconciler::new();
        assert!(reconciler.propose(None).expect("propose").is_empty());

        let s = schema(&[("id", DataType::Int64)])
            .with_metadata([("label".to_string(), "x".to_string())].into());
        let bytes = reconciler.propose(Some(&s)).expect("propose").to_vec();
        let decoded: Schema = decode(&bytes).expect("decode");
        assert!(decoded.metadata().is_empty());
        assert!(decoded.same_fields(&s));
    }

    fn run_sync(tables: Vec<Table>) -> Vec<Result<Table, LoadError>> {
        let comms = LocalCluster::connect(tables.len()).expect("cluster");
        thread::scope(|s| {
            let handles: Vec<_> = comms
                .into_iter()
                .zip(tables)
                .map(|(comm, table)| {
                    s.spawn(move || SchemaReconciler::new().sync(table, &comm))
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().expect("worker"))
                .collect()
        })
    }

    #[test]
    fn empty_worker_rebuilds_with_shared_schema() {
        let shared = schema(&[("id", DataType::Int64), ("name", DataType::Utf8)]);
        let full = Table::try_new(
            shared.clone(),
            vec![
                Column::new(vec![Value::Int64(1)]),
                Column::new(vec![Value::Utf8("a".into())]),
            ],
        )
        .expect("table");
        let empty = Table::empty(schema(&[("id", DataType::Null), ("name", DataType::Null)]));

        let results = run_sync(vec![full.clone(), empty, full]);
        let rebuilt = results[1].as_ref().expect("sync");
        assert_eq!(rebuilt.num_rows(), 0);
        assert!(rebuilt.schema().same_fields(&shared));
        for result in &results {
            assert!(result.as_ref().expect("sync").schema().same_fields(&shared));
        }
    }

    #[test]
    fn all_workers_fail_when_every_table_is_empty() {
        let s = schema(&[("id", DataType::Null)]);
        let results = run_sync(vec![Table::empty(s.clone()), Table::empty(s)]);
        for result in results {
            assert!(matches!(result, Err(LoadError::IoError(_))));
        }
    }

    #[test]
    fn irreconcilable_types_fail_the_minority_worker() {
        let text = Table::try_new(
            schema(&[("w", DataType::Utf8)]),
            vec![Column::new(vec![Value::Utf8("heavy".into())])],
        )
        .expect("table");
        let number = Table::try_new(
            schema(&[("w", DataType::Int64)]),
            vec![Column::new(vec![Value::Int64(3)])],
        )
        .expect("table");

        let results = run_sync(vec![number.clone(), text, number]);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(LoadError::InvalidSchema(_))));
    }

    #[test]
    fn worker_missing_a_column_agrees_and_gets_nulls() {
        let wide = Table::try_new(
            schema(&[
                ("id", DataType::Int64),
                ("name", DataType::Utf8),
                ("age", DataType::Int64),
            ]),
            vec![
                Column::new(vec![Value::Int64(1)]),
                Column::new(vec![Value::Utf8("ann".into())]),
                Column::new(vec![Value::Int64(30)]),
            ],
        )
        .expect("table");
        let narrow = Table::try_new(
            schema(&[("id", DataType::Int64), ("age", DataType::Int64)]),
            vec![
                Column::new(vec![Value::Int64(2)]),
                Column::new(vec![Value::Int64(41)]),
            ],
        )
        .expect("table");

        let results = run_sync(vec![wide, narrow]);
        let tables: Vec<&Table> = results.iter().map(|r| r.as_ref().expect("sync")).collect();
        assert!(tables[0].schema().same_fields(tables[1].schema()));

        let names: Vec<&str> = tables[1]
            .schema()
            .fields()
            .iter()
            .map(|f| f.name.as_str())
            .collect();
        assert_eq!(names, ["id", "name", "age"]);
        assert!(tables[1].column(1).expect("name").all_null());
        assert_eq!(tables[1].column(2).expect("age").get(0), Some(&Value::Int64(41)));
        assert_eq!(
            tables[0].column(1).expect("name").get(0),
            Some(&Value::Utf8("ann".into()))
        );
    }

    #[test]
    fn duplicate_names_fail_every_worker() {
        let twice = Table::try_new(
            schema(&[("id", DataType::Int64), ("id", DataType::Int64)]),
            vec![
                Column::new(vec![Value::Int64(1)]),
                Column::new(vec![Value::Int64(2)]),
            ],
        )
        .expect("table");
        let single = Table::try_new(
            schema(&[("id", DataType::Int64)]),
            vec![Column::new(vec![Value::Int64(3)])],
        )
        .expect("table");

        for result in run_sync(vec![single, twice]) {
            assert!(matches!(result, Err(LoadError::InvalidSchema(_))));
        }
    }

    #[test]
    fn single_worker_keeps_local_schema() {
        let local = Table::empty(schema(&[("id", DataType::Null)]));
        let results = run_sync(vec![local.clone()]);
        assert_eq!(results[0].as_ref().expect("sync"), &local);
    }
}
