use confluence_core::prelude::*;
use confluence_core::OperationMisuse;
use confluence_test_utils::{
    assert_int, assert_missing, create_node, follow_int, get_entity, get_int, in_op, mutate,
    setup_manager,
};
use pretty_assertions::assert_eq;

/// Values along a `value`/`next` chain, stopping at None
fn chain_values(head: &Entity) -> Vec<i64> {
    let mut values = Vec::new();
    let mut current = Some(head.clone());
    while let Some(node) = current {
        values.push(get_int(&node, "value"));
        assert!(values.len() < 64, "chain does not terminate");
        current = node.get("next").unwrap().into_entity();
    }
    values
}

#[test]
fn test_basic_confluence() {
    let manager = setup_manager();
    let base = create_node(&manager, "Node", &[("a", 1)]);

    let left = mutate(&manager, &base, |node| node.set("a", 2));
    let right = mutate(&manager, &base, |node| node.set("b", 3));

    assert_int(&base, "a", 1);
    assert_missing(&base, "b");
    assert_int(&left, "a", 2);
    assert_missing(&left, "b");
    assert_int(&right, "a", 1);
    assert_int(&right, "b", 3);
}

#[test]
fn test_independent_branches_share_identity() {
    let manager = setup_manager();
    let base = create_node(&manager, "Node", &[("a", 1)]);
    let left = mutate(&manager, &base, |node| node.set("a", 2));
    let right = mutate(&manager, &base, |node| node.set("a", 3));

    assert!(left.same_identity(&right));
    assert_ne!(left, right);
    assert!(base.path().is_prefix_of(left.path()));
    assert!(base.path().is_prefix_of(right.path()));
}

#[test]
fn test_round_trip_in_same_operation() {
    let manager = setup_manager();
    in_op(&manager, |op| {
        let node = op.create("Node")?;
        for value in [Value::from(7), Value::from("seven"), Value::from(true), Value::NONE] {
            node.set("slot", value.clone())?;
            assert_eq!(node.get("slot")?, value);
        }
        Ok(())
    });
}

#[test]
fn test_isolation_from_later_operations() {
    let manager = setup_manager();
    let v0 = create_node(&manager, "Node", &[("a", 1), ("b", 1)]);
    let v1 = mutate(&manager, &v0, |node| node.set("a", 10));
    let v2 = mutate(&manager, &v1, |node| node.set("b", 20));

    assert_int(&v0, "a", 1);
    assert_int(&v0, "b", 1);
    assert_int(&v1, "a", 10);
    assert_int(&v1, "b", 1);
    assert_int(&v2, "a", 10);
    assert_int(&v2, "b", 20);
}

#[test]
fn test_basic_reference() {
    let manager = setup_manager();
    let (a, b) = in_op(&manager, |op| {
        let a = op.create("Node")?;
        let b = op.create("Node")?;
        b.set("x", 1)?;
        a.set("b", &b)?;
        Ok((a, b))
    });

    let target = get_entity(&a, "b");
    assert!(target.same_identity(&b));
    assert_int(&target, "x", 1);
}

#[test]
fn test_reference_tracks_same_operation() {
    let manager = setup_manager();
    let x0 = create_node(&manager, "Node", &[]);
    let y0 = create_node(&manager, "Node", &[("g", 1)]);

    let x = in_op(&manager, |op| {
        let x = op.enter(&x0)?;
        let y = op.enter(&y0)?;
        x.set("f", &y)?;
        y.set("g", 2)?;
        // Visible inside the operation already
        assert_eq!(x.get("f")?.expect_entity()?.get("g")?.as_int(), Some(2));
        Ok(x)
    });

    assert_eq!(follow_int(&x, &["f"], "g"), 2);
    assert_int(&y0, "g", 1);
}

#[test]
fn test_indirect_mutation_through_reference() {
    let manager = setup_manager();
    let (a0, b0) = in_op(&manager, |op| {
        let a = op.create("Node")?;
        let b = op.create("Node")?;
        b.set("c", 1)?;
        a.set("b", &b)?;
        Ok((a, b))
    });

    let a1 = mutate(&manager, &a0, |a| {
        let b = a.get("b")?.expect_entity()?;
        b.set("c", 5)
    });

    assert_eq!(follow_int(&a1, &["b"], "c"), 5);
    assert_eq!(follow_int(&a0, &["b"], "c"), 1);
    assert_int(&b0, "c", 1);
}

#[test]
fn test_nested_mutation_across_operations() {
    let manager = setup_manager();
    let root = in_op(&manager, |op| {
        let root = op.create("Node")?;
        let mid = op.create("Node")?;
        let leaf = op.create("Node")?;
        leaf.set("v", 1)?;
        mid.set("leaf", &leaf)?;
        root.set("mid", &mid)?;
        Ok(root)
    });

    let v1 = mutate(&manager, &root, |root| {
        let mid = root.get("mid")?.expect_entity()?;
        let leaf = mid.get("leaf")?.expect_entity()?;
        leaf.set("v", 2)
    });
    let v2 = mutate(&manager, &v1, |root| {
        let mid = root.get("mid")?.expect_entity()?;
        mid.get("leaf")?.expect_entity()?.set("v", 3)
    });

    assert_eq!(follow_int(&root, &["mid", "leaf"], "v"), 1);
    assert_eq!(follow_int(&v1, &["mid", "leaf"], "v"), 2);
    assert_eq!(follow_int(&v2, &["mid", "leaf"], "v"), 3);
}

#[test]
fn test_snapshot_breaks_tracking() {
    let manager = setup_manager();
    let x0 = create_node(&manager, "Node", &[]);
    let y0 = create_node(&manager, "Node", &[("g", 1)]);

    let x = in_op(&manager, |op| {
        let x = op.enter(&x0)?;
        let y = op.enter(&y0)?;
        y.set("g", 4)?;
        x.set("f", snapshot(&y)?)?;
        y.set("g", 5)?;
        assert_eq!(y.get("g")?.as_int(), Some(5));
        Ok(x)
    });

    assert_eq!(follow_int(&x, &["f"], "g"), 4);
}

#[test]
fn test_snapshot_is_stable_across_later_operations() {
    let manager = setup_manager();
    let x0 = create_node(&manager, "Node", &[]);
    let y0 = create_node(&manager, "Node", &[("g", 1)]);

    let x1 = in_op(&manager, |op| {
        let x = op.enter(&x0)?;
        x.set("f", snapshot(&y0)?)?;
        Ok(x)
    });
    let _ = mutate(&manager, &y0, |y| y.set("g", 9));
    let x2 = mutate(&manager, &x1, |x| x.set("other", 0));

    assert_eq!(follow_int(&x1, &["f"], "g"), 1);
    assert_eq!(follow_int(&x2, &["f"], "g"), 1);
}

#[test]
fn test_self_reference_via_snapshot() {
    let manager = setup_manager();
    let c = in_op(&manager, |op| {
        let c = op.create("Node")?;
        c.set("a", 1)?;
        c.set("b", c.snapshot())?;
        Ok(c)
    });
    let c1 = mutate(&manager, &c, |c| c.set("a", 2));

    assert_int(&c1, "a", 2);
    assert_eq!(follow_int(&c1, &["b"], "a"), 1);
    assert_eq!(follow_int(&c, &["b"], "a"), 1);
}

#[test]
fn test_live_self_reference_tracks() {
    let manager = setup_manager();
    let c = in_op(&manager, |op| {
        let c = op.create("Node")?;
        c.set("a", 1)?;
        c.set("me", &c)?;
        Ok(c)
    });
    let c1 = mutate(&manager, &c, |c| c.set("a", 2));

    assert_eq!(follow_int(&c1, &["me"], "a"), 2);
    assert_eq!(follow_int(&c1, &["me", "me", "me"], "a"), 2);
    assert_eq!(follow_int(&c, &["me"], "a"), 1);
}

#[test]
fn test_self_appending_linked_list() {
    let manager = setup_manager();
    let h0 = in_op(&manager, |op| {
        let head = op.create("Link")?;
        head.set("value", 1)?;
        head.set("next", Value::NONE)?;
        Ok(head)
    });

    // Append a frozen copy of the whole list to its own tail
    let double = |head: &Entity| {
        mutate(&manager, head, |head| {
            let copy = snapshot(head)?;
            let mut tail = head.clone();
            while let Some(next) = tail.get("next")?.into_entity() {
                tail = next;
            }
            tail.set("next", copy)
        })
    };

    let h1 = double(&h0);
    let h2 = double(&h1);

    let h3 = in_op(&manager, |op| {
        let front = op.create("Link")?;
        front.set("value", 5)?;
        front.set("next", op.enter(&h2)?)?;
        Ok(front)
    });

    assert_eq!(chain_values(&h0), vec![1]);
    assert_eq!(chain_values(&h1), vec![1, 1]);
    assert_eq!(chain_values(&h2), vec![1, 1, 1, 1]);
    assert_eq!(chain_values(&h3), vec![5, 1, 1, 1, 1]);
}

#[test]
fn test_tuple_members_are_rebased() {
    let manager = setup_manager();
    let holder = in_op(&manager, |op| {
        let holder = op.create("Holder")?;
        let a = op.create("Node")?;
        let b = op.create("Node")?;
        a.set("x", 1)?;
        b.set("x", 2)?;
        holder.set("pair", Value::tuple([Value::from(&a), Value::from(&b), Value::from(3)]))?;
        Ok(holder)
    });

    let updated = in_op(&manager, |op| {
        let holder = op.enter(&holder)?;
        let pair = holder.get("pair")?;
        let items = pair.as_tuple().unwrap_or_default();
        let a = items[0].clone().expect_entity()?;
        a.set("x", 10)?;
        holder.set("frozen", Value::tuple([Value::from(snapshot(&a)?)]))?;
        a.set("x", 20)?;
        Ok(holder)
    });

    let read = |holder: &Entity, slot: &str| -> Vec<Option<i64>> {
        let value = holder.get(slot).unwrap();
        value
            .as_tuple()
            .unwrap()
            .iter()
            .map(|item| match item {
                Value::Entity(node) => node.get("x").unwrap().as_int(),
                other => other.as_int(),
            })
            .collect()
    };

    assert_eq!(read(&holder, "pair"), vec![Some(1), Some(2), Some(3)]);
    assert_eq!(read(&updated, "pair"), vec![Some(20), Some(2), Some(3)]);
    assert_eq!(read(&updated, "frozen"), vec![Some(10)]);
}

#[test]
fn test_nested_tuples() {
    let manager = setup_manager();
    let node = in_op(&manager, |op| {
        let node = op.create("Node")?;
        let inner = |a: i64, b: i64| Value::tuple([Value::from(a), Value::from(b)]);
        node.set("t", Value::tuple([inner(1, 2), inner(3, 4), inner(5, 6)]))?;
        Ok(node)
    });

    let t = node.get("t").unwrap();
    let flat: Vec<Vec<i64>> = t
        .as_tuple()
        .unwrap()
        .iter()
        .map(|pair| pair.as_tuple().unwrap().iter().filter_map(Value::as_int).collect())
        .collect();
    assert_eq!(flat, vec![vec![1, 2], vec![3, 4], vec![5, 6]]);
}

#[test]
fn test_attribute_not_found() {
    let manager = setup_manager();
    let node = create_node(&manager, "Node", &[("a", 1)]);

    let err = node.get("b").unwrap_err();
    assert!(matches!(
        &err,
        ConfluenceError::AttributeNotFound { kind, name } if kind == "Node" && name == "b"
    ));
}

#[test]
fn test_slot_added_later_is_invisible_to_earlier_views() {
    let manager = setup_manager();
    let v0 = create_node(&manager, "Node", &[("a", 1)]);
    let v1 = mutate(&manager, &v0, |node| node.set("late", 1));

    assert_missing(&v0, "late");
    assert_eq!(v0.attributes(), vec!["a".to_string()]);
    assert_eq!(v1.attributes(), vec!["a".to_string(), "late".to_string()]);
}

#[test]
fn test_write_outside_operation_fails() {
    let manager = setup_manager();
    let node = create_node(&manager, "Node", &[]);

    let err = node.set("a", 1).unwrap_err();
    assert!(err.is_misuse());
    assert_missing(&node, "a");
}

#[test]
fn test_write_through_unentered_view_fails() {
    let manager = setup_manager();
    let node = create_node(&manager, "Node", &[("a", 1)]);

    let err = manager.operation(|_| node.set("a", 2)).unwrap_err();
    assert!(matches!(
        err,
        ConfluenceError::IncorrectOperation(OperationMisuse::VersionMismatch { .. })
    ));
    assert_int(&node, "a", 1);
}

#[test]
fn test_snapshot_view_is_read_only() {
    let manager = setup_manager();
    let node = create_node(&manager, "Node", &[("a", 1)]);

    let err = manager
        .operation(|op| {
            let view = op.enter(&node)?;
            snapshot(&view)?.set("a", 2)
        })
        .unwrap_err();
    assert!(err.is_misuse());
}

#[test]
fn test_foreign_manager_reference_rejected() {
    let first = setup_manager();
    let second = setup_manager();
    let outsider = create_node(&second, "Node", &[]);

    let err = first
        .operation(|op| {
            let node = op.create("Node")?;
            node.set("other", &outsider)
        })
        .unwrap_err();
    assert!(matches!(
        err,
        ConfluenceError::IncorrectOperation(OperationMisuse::ForeignManager)
    ));
}

#[test]
fn test_unexpected_value_shape() {
    let manager = setup_manager();
    let node = create_node(&manager, "Node", &[("a", 1)]);

    let err = node.get("a").unwrap().expect_entity().unwrap_err();
    assert!(matches!(
        err,
        ConfluenceError::UnexpectedValue { expected: "entity", found: "int" }
    ));
}
