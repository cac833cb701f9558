//! # Pipeline Tests
//!
//! Multi-worker loads over the in-process cluster, one thread per worker,
//! reading CSV shards from a temp directory.

use shardgraph_core::{
    Column, Communicator, CsvIoFactory, DataType, Field, Fragment, FragmentGroup, FragmentId,
    FragmentLoader, Gid, InstanceId, LabelId, LoadError, LoaderConfig, LocalCluster, LocalComm,
    MemoryObjectStore, ObjectId, ObjectStore, Oid, PartitionStrategy, Partitioner, Role, Schema,
    Sealable, Table, Value, VertexMap,
};
use std::fs;
use std::path::Path;
use std::thread;

// =============================================================================
// HELPERS
// =============================================================================

/// Odd ids to fragment 0, even ids to fragment 1.
struct Parity;

impl Partitioner for Parity {
    fn fnum(&self) -> usize {
        2
    }

    fn partition_id(&self, oid: &Oid) -> FragmentId {
        match oid {
            Oid::Int(v) => FragmentId(u32::from(v % 2 == 0)),
            Oid::Str(s) => FragmentId((s.len() % 2) as u32),
        }
    }
}

fn write(dir: &Path, name: &str, body: &str) {
    fs::write(dir.join(name), body).expect("write shard");
}

fn base(dir: &Path, name: &str) -> String {
    dir.join(name).to_string_lossy().into_owned()
}

/// Run `work` on every worker of `comms`, each connected to one shared store.
fn run_cluster<T, F>(comms: Vec<LocalComm>, work: F) -> (MemoryObjectStore, Vec<T>)
where
    T: Send,
    F: Fn(&LocalComm, &MemoryObjectStore) -> T + Sync,
{
    let root = MemoryObjectStore::new(InstanceId(0)).expect("store");
    let stores: Vec<_> = (0..comms.len())
        .map(|i| root.connect(InstanceId(i as u64)).expect("connect"))
        .collect();
    let results = thread::scope(|s| {
        let handles: Vec<_> = comms
            .into_iter()
            .zip(stores)
            .map(|(comm, store)| {
                let work = &work;
                s.spawn(move || work(&comm, &store))
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("worker thread"))
            .collect()
    });
    (root, results)
}

/// The two-worker graph: vertices 1..=4 with names, edges (1,2) and (3,4).
fn small_graph(dir: &Path) -> LoaderConfig {
    write(dir, "v_0", "id,name\n1,ann\n2,bo\n3,cy\n4,di\n");
    write(dir, "e_0", "src,dst,weight\n1,2,0.5\n3,4,1\n");
    LoaderConfig {
        vertex_files: base(dir, "v"),
        edge_files: base(dir, "e"),
        ..LoaderConfig::default()
    }
}

fn load_with_parity(comm: &LocalComm, store: &MemoryObjectStore, config: &LoaderConfig) -> Result<ObjectId, LoadError> {
    FragmentLoader::new(comm, store, &CsvIoFactory, config.clone())?
        .with_partitioner(Box::new(Parity))
        .load_fragment()
}

fn owned_oids(store: &MemoryObjectStore, fragment: &Fragment, label: LabelId) -> Vec<Oid> {
    let map = VertexMap::fetch(store, fragment.vertex_map_id()).expect("vertex map");
    (0..fragment.inner_vertex_num(label))
        .map(|row| {
            let gid = fragment.vertex_gid(label, row).expect("gid");
            map.get_oid(gid).cloned().expect("assigned")
        })
        .collect()
}

// =============================================================================
// END-TO-END
// =============================================================================

mod end_to_end {
    use super::*;

    #[test]
    fn two_workers_own_their_partition() {
        let dir = tempfile::tempdir().expect("temp dir");
        let config = small_graph(dir.path());

        let comms = LocalCluster::connect(2).expect("cluster");
        let (store, results) = run_cluster(comms, |comm, store| load_with_parity(comm, store, &config));
        let ids: Vec<ObjectId> = results.into_iter().map(|r| r.expect("load")).collect();

        let f0 = Fragment::fetch(&store, ids[0]).expect("fragment 0");
        let f1 = Fragment::fetch(&store, ids[1]).expect("fragment 1");
        assert_eq!(f0.fid(), FragmentId(0));
        assert_eq!(f1.fid(), FragmentId(1));
        assert_eq!(owned_oids(&store, &f0, LabelId(0)), vec![Oid::Int(1), Oid::Int(3)]);
        assert_eq!(owned_oids(&store, &f1, LabelId(0)), vec![Oid::Int(2), Oid::Int(4)]);

        // Both edges start at odd vertices, so fragment 0 owns them.
        assert_eq!(f0.edge_num(LabelId(0)), 2);
        assert_eq!(f1.edge_num(LabelId(0)), 0);

        let map = VertexMap::fetch(&store, f0.vertex_map_id()).expect("vertex map");
        let edges = f0.edge_table(LabelId(0)).expect("edges");
        let src = edges.column(0).expect("src").values()[0].clone();
        let dst = edges.column(1).expect("dst").values()[0].clone();
        assert_eq!(src, Value::UInt64(map.get_gid(FragmentId(0), &Oid::Int(1)).expect("gid").0));
        let expected_dst = map.get_gid(FragmentId(1), &Oid::Int(2)).expect("gid");
        assert_eq!(dst, Value::UInt64(expected_dst.0));
        assert_eq!(map.parser().fid(expected_dst), FragmentId(1));
        assert_eq!(map.parser().offset(expected_dst), 0);
    }

    #[test]
    fn properties_follow_their_vertices() {
        let dir = tempfile::tempdir().expect("temp dir");
        let config = small_graph(dir.path());

        let comms = LocalCluster::connect(2).expect("cluster");
        let (store, results) = run_cluster(comms, |comm, store| load_with_parity(comm, store, &config));
        let f1 = Fragment::fetch(&store, results[1].as_ref().copied().expect("load")).expect("f1");

        let people = f1.vertex_table(LabelId(0)).expect("vertices");
        assert_eq!(people.num_columns(), 1, "id column is carried by the vertex map");
        assert_eq!(
            people.column(0).expect("name").values(),
            &[Value::Utf8("bo".into()), Value::Utf8("di".into())]
        );

        let entry = f1
            .schema()
            .entry(Role::Edge, LabelId(0))
            .expect("edge entry");
        assert_eq!(entry.properties.len(), 1);
        // "0.5" and "1" tie; double sorts first and int64 promotes to it
        assert_eq!(entry.properties[0].data_type, DataType::Float64);
    }

    #[test]
    fn group_lists_every_fragment_once() {
        let dir = tempfile::tempdir().expect("temp dir");
        let config = small_graph(dir.path());

        let comms = LocalCluster::connect(2).expect("cluster");
        let (store, results) = run_cluster(comms, |comm, store| {
            FragmentLoader::new(comm, store, &CsvIoFactory, config.clone())?
                .with_partitioner(Box::new(Parity))
                .load_fragment_as_group()
        });
        let ids: Vec<ObjectId> = results.into_iter().map(|r| r.expect("load")).collect();
        assert_eq!(ids[0], ids[1], "every worker sees the same group id");

        let group = FragmentGroup::fetch(&store, ids[0]).expect("group");
        assert_eq!(group.total_frag_num(), 2);
        assert_eq!(group.vertex_label_num(), 1);
        assert_eq!(group.edge_label_num(), 1);
        assert_eq!(group.fragments().len(), 2);

        let locations: Vec<_> = group.fragments().values().copied().collect();
        assert_ne!(locations[0], locations[1]);
        for (fid, location) in group.fragments() {
            let fragment = Fragment::fetch(&store, location.object).expect("fragment");
            assert_eq!(fragment.fid(), *fid);
            assert_eq!(location.instance, InstanceId(u64::from(fid.0)));
        }
    }

    #[test]
    fn reversed_fragment_order_moves_ownership() {
        let dir = tempfile::tempdir().expect("temp dir");
        let config = small_graph(dir.path());

        let comms = LocalCluster::with_fragment_order(vec![1, 0]).expect("cluster");
        let (store, results) = run_cluster(comms, |comm, store| load_with_parity(comm, store, &config));

        let on_worker_0 = Fragment::fetch(&store, results[0].as_ref().copied().expect("load"))
            .expect("fragment");
        assert_eq!(on_worker_0.fid(), FragmentId(1));
        assert_eq!(
            owned_oids(&store, &on_worker_0, LabelId(0)),
            vec![Oid::Int(2), Oid::Int(4)]
        );
    }

    #[test]
    fn segmented_strategy_assigns_ranges() {
        let dir = tempfile::tempdir().expect("temp dir");
        let config = LoaderConfig {
            partition: PartitionStrategy::Segmented,
            ..small_graph(dir.path())
        };

        let comms = LocalCluster::connect(2).expect("cluster");
        let (store, results) = run_cluster(comms, |comm, store| {
            FragmentLoader::new(comm, store, &CsvIoFactory, config.clone())?.load_fragment()
        });
        let f0 = Fragment::fetch(&store, results[0].as_ref().copied().expect("load")).expect("f0");
        let f1 = Fragment::fetch(&store, results[1].as_ref().copied().expect("load")).expect("f1");
        assert_eq!(owned_oids(&store, &f0, LabelId(0)), vec![Oid::Int(1), Oid::Int(2)]);
        assert_eq!(owned_oids(&store, &f1, LabelId(0)), vec![Oid::Int(3), Oid::Int(4)]);
    }

    #[test]
    fn labelled_relations_resolve_in_their_vertex_label() {
        let dir = tempfile::tempdir().expect("temp dir");
        write(dir.path(), "v_0", "id,name\n1,ann\n2,bo\n");
        write(dir.path(), "v_1", "id,city\n10,oslo\n20,rome\n");
        write(dir.path(), "e_0", "person,city\n1,20\n2,10\n");
        let config = LoaderConfig {
            vertex_files: base(dir.path(), "v"),
            edge_files: base(dir.path(), "e"),
            vertex_label_num: 2,
            vertex_labels: vec!["person".to_string(), "city".to_string()],
            edge_labels: vec!["lives_in".to_string()],
            edge_relations: vec![(0, 1)],
            ..LoaderConfig::default()
        };

        let comms = LocalCluster::connect(2).expect("cluster");
        let (store, results) = run_cluster(comms, |comm, store| load_with_parity(comm, store, &config));
        let f0 = Fragment::fetch(&store, results[0].as_ref().copied().expect("load")).expect("f0");
        let map = VertexMap::fetch(&store, f0.vertex_map_id()).expect("map");

        let edges = f0.edge_table(LabelId(0)).expect("edges");
        assert_eq!(edges.num_rows(), 1, "only person 1 is odd");
        let Value::UInt64(dst) = edges.column(1).expect("dst").values()[0] else {
            unreachable!("GID columns are UInt64");
        };
        assert_eq!(map.parser().label(Gid(dst)), LabelId(1));
        assert_eq!(map.get_oid(Gid(dst)), Some(&Oid::Int(20)));

        let schema = f0.schema();
        assert_eq!(schema.label_id(Role::Vertex, "city"), Some(LabelId(1)));
        let relation = &schema
            .entry(Role::Edge, LabelId(0))
            .expect("edge entry")
            .relations;
        assert_eq!(relation, &vec![(LabelId(0), LabelId(1))]);
    }
}

// =============================================================================
// EDGE CASES
// =============================================================================

mod edge_cases {
    use super::*;

    #[test]
    fn worker_without_rows_still_builds_a_fragment() {
        let dir = tempfile::tempdir().expect("temp dir");
        write(dir.path(), "v_0", "id,name\n1,ann\n");
        write(dir.path(), "e_0", "src,dst\n1,1\n");
        let config = LoaderConfig {
            vertex_files: base(dir.path(), "v"),
            edge_files: base(dir.path(), "e"),
            ..LoaderConfig::default()
        };

        let comms = LocalCluster::connect(2).expect("cluster");
        let (store, results) = run_cluster(comms, |comm, store| load_with_parity(comm, store, &config));
        let f0 = Fragment::fetch(&store, results[0].as_ref().copied().expect("load")).expect("f0");
        let f1 = Fragment::fetch(&store, results[1].as_ref().copied().expect("load")).expect("f1");

        assert_eq!(f0.inner_vertex_num(LabelId(0)), 1);
        assert_eq!(f1.inner_vertex_num(LabelId(0)), 0);
        let names = |f: &Fragment| {
            f.vertex_table(LabelId(0))
                .expect("table")
                .schema()
                .fields()
                .to_vec()
        };
        assert_eq!(names(&f0), names(&f1));
    }

    #[test]
    fn every_worker_fails_when_a_label_has_no_rows() {
        let dir = tempfile::tempdir().expect("temp dir");
        write(dir.path(), "v_0", "id,name\n");
        write(dir.path(), "e_0", "src,dst\n");
        let config = LoaderConfig {
            vertex_files: base(dir.path(), "v"),
            edge_files: base(dir.path(), "e"),
            ..LoaderConfig::default()
        };

        let comms = LocalCluster::connect(2).expect("cluster");
        let (_, results) = run_cluster(comms, |comm, store| load_with_parity(comm, store, &config));
        for result in results {
            assert!(matches!(result, Err(LoadError::IoError(_))));
        }
    }

    #[test]
    fn unassigned_endpoint_aborts_the_load() {
        let dir = tempfile::tempdir().expect("temp dir");
        write(dir.path(), "v_0", "id\n1\n2\n");
        write(dir.path(), "e_0", "src,dst\n1,9\n2,1\n");
        let config = LoaderConfig {
            vertex_files: base(dir.path(), "v"),
            edge_files: base(dir.path(), "e"),
            ..LoaderConfig::default()
        };

        let comms = LocalCluster::connect(2).expect("cluster");
        let (_, results) = run_cluster(comms, |comm, store| load_with_parity(comm, store, &config));
        assert!(matches!(results[0], Err(LoadError::InvalidPartition(_))));
        assert!(matches!(results[1], Err(LoadError::Communication(_))));
    }

    #[test]
    fn persisting_a_fragment_twice_is_a_noop() {
        let dir = tempfile::tempdir().expect("temp dir");
        let config = small_graph(dir.path());

        let comms = LocalCluster::connect(2).expect("cluster");
        let (store, results) = run_cluster(comms, |comm, store| load_with_parity(comm, store, &config));
        let id = results[0].as_ref().copied().expect("load");

        let before = store.len();
        let owner = store.connect(InstanceId(0)).expect("connect");
        owner.persist(id).expect("persist again");
        assert_eq!(store.len(), before);
        assert!(owner.is_persisted(id).expect("persisted"));
    }

    #[test]
    fn worker_missing_a_property_column_still_agrees() {
        // worker 0 holds id,name,age; worker 1 never saw "name"
        let people = |worker: usize| {
            let mut fields = vec![Field::new("id", DataType::Int64)];
            let mut columns = Vec::new();
            if worker == 0 {
                fields.push(Field::new("name", DataType::Utf8));
                fields.push(Field::new("age", DataType::Int64));
                columns.push(Column::new(vec![Value::Int64(1), Value::Int64(2)]));
                columns.push(Column::new(vec![
                    Value::Utf8("ann".into()),
                    Value::Utf8("bo".into()),
                ]));
                columns.push(Column::new(vec![Value::Int64(30), Value::Int64(41)]));
            } else {
                fields.push(Field::new("age", DataType::Int64));
                columns.push(Column::new(vec![Value::Int64(3), Value::Int64(4)]));
                columns.push(Column::new(vec![Value::Int64(52), Value::Int64(63)]));
            }
            Table::try_new(Schema::new(fields), columns).expect("vertices")
        };
        let knows = |worker: usize| {
            let (src, dst) = if worker == 0 { (1, 2) } else { (3, 4) };
            Table::try_new(
                Schema::new(vec![
                    Field::new("src", DataType::Int64),
                    Field::new("dst", DataType::Int64),
                ]),
                vec![
                    Column::new(vec![Value::Int64(src)]),
                    Column::new(vec![Value::Int64(dst)]),
                ],
            )
            .expect("edges")
        };

        let comms = LocalCluster::connect(2).expect("cluster");
        let (store, results) = run_cluster(comms, |comm, store| {
            let worker = comm.worker_id();
            FragmentLoader::from_tables(
                comm,
                store,
                LoaderConfig::default(),
                vec![people(worker)],
                vec![knows(worker)],
            )?
            .with_partitioner(Box::new(Parity))
            .load_fragment()
        });
        let ids: Vec<ObjectId> = results.into_iter().map(|r| r.expect("load")).collect();
        let f0 = Fragment::fetch(&store, ids[0]).expect("f0");
        let f1 = Fragment::fetch(&store, ids[1]).expect("f1");

        let t0 = f0.vertex_table(LabelId(0)).expect("vertices");
        let t1 = f1.vertex_table(LabelId(0)).expect("vertices");
        assert!(t0.schema().same_fields(t1.schema()));
        let names: Vec<&str> = t0.schema().fields().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["name", "age"]);

        // every populated cell survives, "name" is null where it was never read
        let mut cells = Vec::new();
        for (fragment, table) in [(&f0, t0), (&f1, t1)] {
            for (row, oid) in owned_oids(&store, fragment, LabelId(0)).into_iter().enumerate() {
                let name = table.column(0).expect("name").values()[row].clone();
                let age = table.column(1).expect("age").values()[row].clone();
                cells.push((oid, name, age));
            }
        }
        cells.sort_by_key(|(oid, _, _)| oid.clone());
        assert_eq!(
            cells,
            vec![
                (Oid::Int(1), Value::Utf8("ann".into()), Value::Int64(30)),
                (Oid::Int(2), Value::Utf8("bo".into()), Value::Int64(41)),
                (Oid::Int(3), Value::Null, Value::Int64(52)),
                (Oid::Int(4), Value::Null, Value::Int64(63)),
            ]
        );
    }

    #[test]
    fn irreconcilable_column_types_abort_the_load() {
        let dir = tempfile::tempdir().expect("temp dir");
        // worker 0 sees only numbers in "age", worker 1 only text
        write(dir.path(), "v_0", "id,age\n1,30\n3,x\n");
        write(dir.path(), "e_0", "src,dst\n1,3\n");
        let config = LoaderConfig {
            vertex_files: base(dir.path(), "v"),
            edge_files: base(dir.path(), "e"),
            ..LoaderConfig::default()
        };

        let comms = LocalCluster::connect(2).expect("cluster");
        let (_, results) = run_cluster(comms, |comm, store| load_with_parity(comm, store, &config));
        assert!(results.iter().any(|r| matches!(r, Err(LoadError::InvalidSchema(_)))));
        assert!(results.iter().all(Result::is_err));
    }
}
