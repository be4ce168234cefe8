//! Shared tree-building helpers for the Trellis benchmarks.

use trellis_core::Router;

/// Attach a linear chain `node-0 → node-1 → … → node-(depth-1)` and return
/// the identities in attachment order.
pub fn linear_tree(router: &Router, depth: usize) -> Vec<String> {
    let ids: Vec<String> = (0..depth).map(|i| format!("node-{}", i)).collect();
    let mut parent: Option<&str> = None;
    for id in &ids {
        router.attach(id, parent).expect("attach");
        parent = Some(id);
    }
    ids
}

/// Attach a two-level tree: one root with `fanout` children, each with
/// `fanout` children of its own. Returns every identity, root first.
pub fn wide_tree(router: &Router, fanout: usize) -> Vec<String> {
    let mut ids = vec!["root".to_string()];
    router.attach("root", None).expect("attach");
    for i in 0..fanout {
        let branch = format!("branch-{}", i);
        router.attach(&branch, Some("root")).expect("attach");
        for j in 0..fanout {
            let leaf = format!("leaf-{}-{}", i, j);
            router.attach(&leaf, Some(&branch)).expect("attach");
            ids.push(leaf);
        }
        ids.push(branch);
    }
    ids
}

/// Register an accepting addressed handler for every identity.
pub fn accept_all<'a>(router: &Router, ids: impl IntoIterator<Item = &'a String>) {
    for id in ids {
        router
            .register_addressed_handler(id, |_| true)
            .expect("register");
    }
}
