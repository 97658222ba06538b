use confluence_core::prelude::*;
use confluence_test_utils::{
    assert_int, create_int_list, create_node, in_op, list_ints, setup_manager,
};
use std::thread;

#[test]
fn test_threads_branch_from_shared_entity() {
    let manager = setup_manager();
    let base = create_node(&manager, "Node", &[("a", 0)]);

    let views: Vec<(i64, Entity)> = thread::scope(|scope| {
        let handles: Vec<_> = (1..=8)
            .map(|n: i64| {
                let manager = manager.clone();
                let base = base.clone();
                scope.spawn(move || {
                    let view = in_op(&manager, |op| {
                        let view = op.enter(&base)?;
                        for step in 0..50 {
                            view.set("a", n * 1000 + step)?;
                        }
                        view.set("owner", n)?;
                        Ok(view)
                    });
                    (n, view)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_int(&base, "a", 0);
    for (n, view) in &views {
        assert!(view.same_identity(&base));
        assert_int(view, "a", n * 1000 + 49);
        assert_int(view, "owner", *n);
    }
}

#[test]
fn test_ambient_state_is_per_thread() {
    let manager = setup_manager();
    let op = manager.begin();

    let other = manager.clone();
    let seen = thread::spawn(move || (other.in_operation(), other.create("Node").is_err()))
        .join()
        .unwrap();
    assert_eq!(seen, (false, true));

    assert!(manager.in_operation());
    op.end().unwrap();
}

#[test]
fn test_threads_edit_shared_list() {
    let manager = setup_manager();
    let base = create_int_list(&manager, 0..16);

    let results: Vec<(i64, PersistentList)> = thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|n: i64| {
                let manager = manager.clone();
                let base = base.clone();
                scope.spawn(move || {
                    let list = in_op(&manager, |op| {
                        let list = op.enter(&base)?;
                        list.pop(n)?;
                        list.append(100 + n)?;
                        Ok(list)
                    });
                    (n, list)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(list_ints(&base), (0..16).collect::<Vec<_>>());
    for (n, list) in &results {
        let mut expected: Vec<i64> = (0..16).filter(|v| v != n).collect();
        expected.push(100 + n);
        assert_eq!(list_ints(list), expected);
    }
}
