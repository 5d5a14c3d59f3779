//! Shared fixtures for the evolution tests.

use std::sync::Arc;

use crate::system::{Component, Configuration, Goal, InlineSource};

const NAMES: [&str; 6] = ["alpha", "bravo", "charlie", "delta", "echo", "foxtrot"];

/// Start configuration with one component per entry of `counts`, each on its
/// first version and not installed, and the latest-version goal for it.
pub(crate) fn fixture(counts: &[usize]) -> (Arc<Configuration>, Arc<Goal>) {
    let components = counts
        .iter()
        .zip(NAMES)
        .map(|(&count, name)| {
            Component::new(Arc::new(InlineSource::numbered(count)), name, false).unwrap()
        })
        .collect();
    let start = Configuration::new(components);
    start.resolve().unwrap();
    let goal = Goal::latest_version(&start).unwrap();
    (Arc::new(start), Arc::new(goal))
}

/// Three components of five versions where the middle one starts and ends
/// on index 2.
pub(crate) fn pinned_fixture() -> (Arc<Configuration>, Arc<Goal>) {
    let (start, goal) = fixture(&[5, 5, 5]);

    let mut start = (*start).clone();
    start.component_mut(1).unwrap().set_version_index(2).unwrap();

    let mut target = goal.target().clone();
    target.component_mut(1).unwrap().set_version_index(2).unwrap();

    (Arc::new(start), Arc::new(Goal::new(target)))
}
