//! Property tests for the dependency graph: any randomly generated DAG
//! builds, its cached order is topological and deterministic, and closing
//! a chain into a cycle is rejected with a named path.

use proptest::prelude::*;
use rill::DependencyGraph;
use std::collections::BTreeSet;
use std::sync::Arc;

fn node_name(index: usize) -> Arc<str> {
    Arc::from(format!("node_{index}"))
}

/// A random DAG: node `i` may only depend on field names or nodes `< i`,
/// which keeps the instance acyclic by construction. The dependency lists
/// intentionally allow duplicates.
fn arbitrary_dag() -> impl Strategy<Value = (Vec<Arc<str>>, Vec<(Arc<str>, Vec<Arc<str>>)>)> {
    (1usize..=3, 1usize..=20).prop_flat_map(|(field_count, node_count)| {
        let fields: Vec<Arc<str>> = (0..field_count)
            .map(|index| Arc::from(format!("field_{index}")))
            .collect();
        let dependency_lists = (0..node_count)
            .map(|index| {
                let candidates: Vec<Arc<str>> = fields
                    .iter()
                    .cloned()
                    .chain((0..index).map(node_name))
                    .collect();
                proptest::collection::vec(proptest::sample::select(candidates), 0..=4)
            })
            .collect::<Vec<_>>();
        (Just(fields), dependency_lists).prop_map(|(fields, lists)| {
            let derived = lists
                .into_iter()
                .enumerate()
                .map(|(index, dependencies)| (node_name(index), dependencies))
                .collect();
            (fields, derived)
        })
    })
}

proptest! {
    #[test]
    fn order_is_topological((fields, derived) in arbitrary_dag()) {
        let graph = DependencyGraph::build(
            fields,
            derived.clone(),
        ).unwrap();

        let order = graph.topological_order();
        prop_assert_eq!(order.len(), derived.len());

        let mut seen: BTreeSet<&str> = BTreeSet::new();
        for name in order {
            for dependency in graph.dependencies_of(name) {
                if graph.is_derived(dependency) {
                    prop_assert!(
                        seen.contains(dependency.as_ref()),
                        "{} placed before its dependency {}",
                        name,
                        dependency,
                    );
                }
            }
            seen.insert(name.as_ref());
        }
    }

    #[test]
    fn order_is_deterministic((fields, derived) in arbitrary_dag()) {
        let first = DependencyGraph::build(fields.clone(), derived.clone()).unwrap();
        let second = DependencyGraph::build(fields, derived).unwrap();
        prop_assert_eq!(first.topological_order(), second.topological_order());
    }

    #[test]
    fn transitive_dependents_are_closed((fields, derived) in arbitrary_dag()) {
        let graph = DependencyGraph::build(fields.clone(), derived).unwrap();
        for seed in &fields {
            let stale = graph.transitive_dependents([seed.clone()]);
            // every direct dependent of a stale node is itself stale
            for name in &stale {
                for dependent in graph.dependents_of(name) {
                    prop_assert!(stale.contains(dependent));
                }
            }
        }
    }

    #[test]
    fn closed_chain_is_rejected(length in 2usize..=10) {
        // node_0 <- node_1 <- ... <- node_{n-1} <- node_0
        let derived: Vec<(Arc<str>, Vec<Arc<str>>)> = (0..length)
            .map(|index| {
                let dependency = node_name((index + 1) % length);
                (node_name(index), vec![dependency])
            })
            .collect();
        let error = DependencyGraph::build(Vec::new(), derived).unwrap_err();
        let rill::BuildError::CyclicDependency { path } = error else {
            panic!("expected cycle, got {error:?}");
        };
        prop_assert_eq!(path.first(), path.last());
    }
}
