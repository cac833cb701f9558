//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use crate::config::{AppConfig, Backend};
use shardgraph_core::{
    CsvIoFactory, Fragment, FragmentGroup, FragmentLoader, InstanceId, LabelId, LoadError,
    LocalCluster, MemoryObjectStore, ObjectId, ObjectStore, RedbObjectStore, Sealable,
};
use std::path::Path;
use std::thread;

// =============================================================================
// LOCAL CLUSTER
// =============================================================================

/// Run one loader thread per store connection and return the group id.
///
/// `stores[i]` is worker `i`'s connection. When several workers fail, the
/// first failure that is not a peer departure is reported.
pub fn load_local<S: ObjectStore>(config: &AppConfig, stores: Vec<S>) -> Result<ObjectId, LoadError> {
    let comms = match &config.cluster.fragment_order {
        Some(order) => LocalCluster::with_fragment_order(order.clone())?,
        None => LocalCluster::connect(config.cluster.workers)?,
    };
    if comms.len() != stores.len() {
        return Err(LoadError::InvalidArgument(format!(
            "{} workers but {} store connections",
            comms.len(),
            stores.len()
        )));
    }

    let results: Vec<Result<ObjectId, LoadError>> = thread::scope(|s| {
        let handles: Vec<_> = comms
            .into_iter()
            .zip(stores)
            .map(|(comm, store)| {
                let loader = config.loader.clone();
                s.spawn(move || {
                    FragmentLoader::new(&comm, &store, &CsvIoFactory, loader)?
                        .load_fragment_as_group()
                })
            })
            .collect();
        handles
            .into_iter()
            .enumerate()
            .map(|(worker, handle)| {
                handle.join().unwrap_or_else(|_| {
                    Err(LoadError::Communication(format!("worker {worker} panicked")))
                })
            })
            .collect()
    });

    first_failure(results)
}

fn first_failure(results: Vec<Result<ObjectId, LoadError>>) -> Result<ObjectId, LoadError> {
    let mut group = None;
    let mut departure = None;
    for result in results {
        match result {
            Ok(id) => group = group.or(Some(id)),
            Err(LoadError::Communication(msg)) => {
                departure = departure.or(Some(LoadError::Communication(msg)));
            }
            Err(e) => return Err(e),
        }
    }
    if let Some(e) = departure {
        return Err(e);
    }
    group.ok_or_else(|| LoadError::InvalidArgument("cluster has no workers".to_string()))
}

fn connect_all<S>(
    workers: usize,
    connect: impl Fn(InstanceId) -> Result<S, LoadError>,
) -> Result<Vec<S>, LoadError> {
    (0..workers as u64).map(|i| connect(InstanceId(i))).collect()
}

// =============================================================================
// LOAD COMMAND
// =============================================================================

/// Load the configured shards and print the published group.
pub fn cmd_load(config: &AppConfig, json_mode: bool) -> Result<(), LoadError> {
    config.validate()?;
    let workers = config.worker_num();
    tracing::info!(workers, backend = ?config.store.backend, "starting local cluster");

    match config.store.backend {
        Backend::Memory => {
            let root = MemoryObjectStore::new(InstanceId(0))?;
            let stores = connect_all(workers, |i| root.connect(i))?;
            let group = load_local(config, stores)?;
            print_group(&root, group, json_mode)
        }
        Backend::Redb => {
            let root = RedbObjectStore::open(&config.store.path, InstanceId(0))?;
            let stores = connect_all(workers, |i| root.connect(i))?;
            let group = load_local(config, stores)?;
            if !json_mode {
                println!("Store: {}", config.store.path.display());
            }
            print_group(&root, group, json_mode)
        }
    }
}

// =============================================================================
// INSPECT COMMAND
// =============================================================================

/// Print one group, or every persisted object when `group` is `None`.
pub fn cmd_inspect(path: &Path, group: Option<ObjectId>, json_mode: bool) -> Result<(), LoadError> {
    if !path.is_file() {
        return Err(LoadError::IoError(format!(
            "no store at '{}'",
            path.display()
        )));
    }
    let store = RedbObjectStore::open(path, InstanceId(0))?;

    if let Some(group) = group {
        return print_group(&store, group, json_mode);
    }

    let mut objects = Vec::new();
    for id in store.persisted_ids()? {
        objects.push((id, store.get(id)?.kind()));
    }
    if json_mode {
        let output: Vec<_> = objects
            .iter()
            .map(|(id, kind)| serde_json::json!({ "id": id.to_string(), "kind": kind.as_str() }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&output).unwrap_or_default());
    } else {
        println!("Persisted objects: {}", objects.len());
        for (id, kind) in &objects {
            println!("  {}  {}", id, kind.as_str());
        }
    }
    Ok(())
}

// =============================================================================
// OUTPUT
// =============================================================================

struct FragmentSummary {
    fid: u32,
    instance: u64,
    object: ObjectId,
    vertices: usize,
    edges: usize,
}

fn summarize(store: &dyn ObjectStore, group: &FragmentGroup) -> Result<Vec<FragmentSummary>, LoadError> {
    let mut summaries = Vec::with_capacity(group.fragments().len());
    for (fid, location) in group.fragments() {
        let fragment = Fragment::fetch(store, location.object)?;
        let vertices = (0..fragment.vertex_label_num())
            .map(|l| fragment.inner_vertex_num(LabelId(l as u32)))
            .sum();
        let edges = (0..fragment.edge_label_num())
            .map(|l| fragment.edge_num(LabelId(l as u32)))
            .sum();
        summaries.push(FragmentSummary {
            fid: fid.0,
            instance: location.instance.0,
            object: location.object,
            vertices,
            edges,
        });
    }
    Ok(summaries)
}

fn print_group(store: &dyn ObjectStore, id: ObjectId, json_mode: bool) -> Result<(), LoadError> {
    let group = FragmentGroup::fetch(store, id)?;
    let fragments = summarize(store, &group)?;

    if json_mode {
        let output = serde_json::json!({
            "group": id.to_string(),
            "total_frag_num": group.total_frag_num(),
            "vertex_label_num": group.vertex_label_num(),
            "edge_label_num": group.edge_label_num(),
            "fragments": fragments.iter().map(|f| serde_json::json!({
                "fid": f.fid,
                "instance": f.instance,
                "object": f.object.to_string(),
                "vertices": f.vertices,
                "edges": f.edges,
            })).collect::<Vec<_>>(),
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
    } else {
        println!("Fragment group: {}", id);
        println!(
            "  Fragments: {}  Vertex labels: {}  Edge labels: {}",
            group.total_frag_num(),
            group.vertex_label_num(),
            group.edge_label_num()
        );
        for f in &fragments {
            println!(
                "  [{}] instance {} object {}  vertices {}  edges {}",
                f.fid, f.instance, f.object, f.vertices, f.edges
            );
        }
    }
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_departures_yield_to_the_root_cause() {
        let results = vec![
            Err(LoadError::Communication("worker 1 left the cluster".to_string())),
            Err(LoadError::InvalidPartition("unknown vertex 9".to_string())),
        ];
        assert!(matches!(
            first_failure(results),
            Err(LoadError::InvalidPartition(_))
        ));
    }

    #[test]
    fn agreeing_workers_return_the_group() {
        let results = vec![Ok(ObjectId(7)), Ok(ObjectId(7))];
        assert_eq!(first_failure(results).expect("group"), ObjectId(7));
    }
}
