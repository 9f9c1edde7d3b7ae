//! Dependency resolver - Orders plugins so dependencies start first

use std::collections::{HashMap, HashSet};

use crate::application::errors::DependencyError;
use crate::plugins::trait_def::PluginDescriptor;

/// Order descriptors so every plugin comes after its dependencies.
///
/// Among plugins whose dependencies are all placed, the one declared
/// first goes next, so the result is the same on every run.
pub fn order(descriptors: &[PluginDescriptor]) -> Result<Vec<PluginDescriptor>, DependencyError> {
    let graph: Vec<(&str, Vec<&str>)> = descriptors
        .iter()
        .map(|d| {
            (
                d.name.as_str(),
                d.dependencies.iter().map(String::as_str).collect(),
            )
        })
        .collect();

    let names = order_names(&graph)?;
    let by_name: HashMap<&str, &PluginDescriptor> =
        descriptors.iter().map(|d| (d.name.as_str(), d)).collect();

    Ok(names
        .into_iter()
        .filter_map(|n| by_name.get(n.as_str()).map(|d| (*d).clone()))
        .collect())
}

/// Topological order over `(name, dependencies)` pairs
pub fn order_names(graph: &[(&str, Vec<&str>)]) -> Result<Vec<String>, DependencyError> {
    let mut known = HashSet::new();
    for (name, _) in graph {
        if !known.insert(*name) {
            return Err(DependencyError::Duplicate(name.to_string()));
        }
    }
    for (name, deps) in graph {
        if let Some(dep) = deps.iter().find(|d| !known.contains(*d)) {
            return Err(DependencyError::Unknown {
                plugin: name.to_string(),
                dependency: dep.to_string(),
            });
        }
    }

    let mut placed: HashSet<&str> = HashSet::new();
    let mut result = Vec::with_capacity(graph.len());

    while result.len() < graph.len() {
        let next = graph
            .iter()
            .find(|(name, deps)| !placed.contains(name) && deps.iter().all(|d| placed.contains(d)));

        match next {
            Some((name, _)) => {
                placed.insert(*name);
                result.push(name.to_string());
            }
            None => {
                return Err(DependencyError::Cycle {
                    cycle: find_cycle(graph, &placed),
                })
            }
        }
    }

    Ok(result)
}

/// Follow unplaced dependencies until a name repeats
fn find_cycle(graph: &[(&str, Vec<&str>)], placed: &HashSet<&str>) -> Vec<String> {
    let deps: HashMap<&str, &Vec<&str>> = graph.iter().map(|(n, d)| (*n, d)).collect();
    let Some((start, _)) = graph.iter().find(|(n, _)| !placed.contains(n)) else {
        return Vec::new();
    };

    let mut path: Vec<&str> = vec![*start];
    let mut current = *start;
    loop {
        let Some(next) = deps
            .get(current)
            .and_then(|d| d.iter().find(|n| !placed.contains(*n)))
        else {
            return path.into_iter().map(String::from).collect();
        };
        if let Some(pos) = path.iter().position(|n| n == next) {
            let mut cycle: Vec<String> = path[pos..].iter().map(|n| n.to_string()).collect();
            cycle.push(next.to_string());
            return cycle;
        }
        path.push(*next);
        current = *next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::errors::PluginError;
    use crate::plugins::trait_def::PluginDescriptor;

    fn descriptor(name: &str, deps: &[&str]) -> PluginDescriptor {
        deps.iter().fold(
            PluginDescriptor::new(name, |_| Err(PluginError::Unavailable("test".into()))),
            |d, dep| d.with_dependency(*dep),
        )
    }

    fn names(descriptors: &[PluginDescriptor]) -> Vec<String> {
        order(descriptors)
            .unwrap()
            .into_iter()
            .map(|d| d.name)
            .collect()
    }

    #[test]
    fn test_dependencies_first() {
        let list = vec![
            descriptor("help", &["catalog"]),
            descriptor("echo", &[]),
            descriptor("catalog", &["store"]),
            descriptor("store", &[]),
        ];
        assert_eq!(names(&list), vec!["echo", "store", "catalog", "help"]);
    }

    #[test]
    fn test_declaration_order_is_kept() {
        let list = vec![
            descriptor("c", &[]),
            descriptor("a", &[]),
            descriptor("b", &[]),
        ];
        assert_eq!(names(&list), vec!["c", "a", "b"]);
    }

    #[test]
    fn test_every_name_after_its_dependencies() {
        let list = vec![
            descriptor("e", &["d", "b"]),
            descriptor("d", &["c"]),
            descriptor("c", &["a"]),
            descriptor("b", &["a"]),
            descriptor("a", &[]),
        ];
        let ordered = names(&list);
        for d in &list {
            let pos = ordered.iter().position(|n| *n == d.name).unwrap();
            for dep in &d.dependencies {
                let dep_pos = ordered.iter().position(|n| n == dep).unwrap();
                assert!(dep_pos < pos, "{} before {}", dep, d.name);
            }
        }
    }

    #[test]
    fn test_cycle_is_named() {
        let list = vec![
            descriptor("a", &[]),
            descriptor("b", &["c"]),
            descriptor("c", &["d"]),
            descriptor("d", &["b"]),
        ];
        let err = order(&list).unwrap_err();
        assert_eq!(
            err,
            DependencyError::Cycle {
                cycle: vec!["b".into(), "c".into(), "d".into(), "b".into()]
            }
        );
        assert_eq!(err.to_string(), "Dependency cycle: b -> c -> d -> b");
    }

    #[test]
    fn test_self_dependency() {
        let err = order(&[descriptor("a", &["a"])]).unwrap_err();
        assert!(matches!(err, DependencyError::Cycle { .. }));
    }

    #[test]
    fn test_unknown_and_duplicate() {
        assert_eq!(
            order(&[descriptor("a", &["ghost"])]).unwrap_err(),
            DependencyError::Unknown {
                plugin: "a".into(),
                dependency: "ghost".into()
            }
        );
        assert_eq!(
            order(&[descriptor("a", &[]), descriptor("a", &[])]).unwrap_err(),
            DependencyError::Duplicate("a".into())
        );
    }
}
