//! Property tests: bound sequences mirror each other under arbitrary edits.

use proptest::prelude::*;
use txbind::{AtomicBindable, AtomicBindableVar, Bindable, Binding, ListBindable, SequenceTx};

#[derive(Debug, Clone)]
enum Edit {
    Set(usize, i16),
    Delete(usize),
    Insert(usize, i16),
    Pop,
}

fn edit() -> impl Strategy<Value = Edit> {
    prop_oneof![
        (any::<usize>(), any::<i16>()).prop_map(|(i, v)| Edit::Set(i, v)),
        any::<usize>().prop_map(Edit::Delete),
        (any::<usize>(), any::<i16>()).prop_map(|(i, v)| Edit::Insert(i, v)),
        Just(Edit::Pop),
    ]
}

/// Apply `edit` to both `list` and the `shadow` vector, clamping indices to
/// the current length so every edit is valid.
fn apply(list: &ListBindable<i16>, shadow: &mut Vec<i16>, edit: &Edit) {
    let len = shadow.len();
    match *edit {
        Edit::Set(i, v) if len > 0 => {
            list.set_item(i % len, v).unwrap();
            shadow[i % len] = v;
        }
        Edit::Delete(i) if len > 0 => {
            list.delete_item(i % len).unwrap();
            shadow.remove(i % len);
        }
        Edit::Insert(i, v) => {
            list.insert(i % (len + 1), v).unwrap();
            shadow.insert(i % (len + 1), v);
        }
        Edit::Pop => {
            assert_eq!(list.pop().unwrap(), shadow.pop());
        }
        _ => {}
    }
}

proptest! {
    #[test]
    fn bound_lists_mirror_edits_from_either_side(
        initial in prop::collection::vec(any::<i16>(), 0..8),
        edits in prop::collection::vec((any::<bool>(), edit()), 0..40),
    ) {
        let left = ListBindable::from(initial.clone());
        let right = ListBindable::from(vec![7, 7, 7]);
        let _binding = Binding::new(&left, &right).unwrap();
        prop_assert_eq!(right.to_vec().unwrap(), initial.clone());

        let mut shadow = initial;
        for (on_left, e) in &edits {
            let side = if *on_left { &left } else { &right };
            apply(side, &mut shadow, e);
            prop_assert_eq!(left.to_vec().unwrap(), shadow.clone());
            prop_assert_eq!(right.to_vec().unwrap(), shadow.clone());
        }
    }

    #[test]
    fn export_replays_into_empty_list(items in prop::collection::vec(any::<i32>(), 0..32)) {
        let source = ListBindable::from(items.clone());
        let snapshot = source.export().unwrap();
        prop_assert_eq!(snapshot.step_count(), items.len());

        let fresh: ListBindable<i32> = ListBindable::new();
        fresh.raw_apply_tx(&snapshot).unwrap();
        prop_assert_eq!(fresh.to_vec().unwrap(), items);
    }

    #[test]
    fn grouped_applies_members_in_order(
        values in prop::collection::vec(any::<u8>(), 1..16),
    ) {
        // Insert everything at the front, then overwrite the front: the
        // result depends on member order.
        let steps = values
            .iter()
            .map(|v| SequenceTx::Insert { index: 0, value: *v })
            .chain(std::iter::once(SequenceTx::SetItem { index: 0, value: 0 }));
        let list: ListBindable<u8> = ListBindable::new();
        list.apply_tx(&SequenceTx::grouped(steps), &[]).unwrap();

        let mut expected: Vec<u8> = values.iter().rev().copied().collect();
        expected[0] = 0;
        prop_assert_eq!(list.to_vec().unwrap(), expected);
    }

    #[test]
    fn fan_out_converges_to_last_write(writes in prop::collection::vec((0usize..3, any::<i64>()), 1..20)) {
        let nodes = [
            AtomicBindableVar::new(0_i64),
            AtomicBindableVar::new(0_i64),
            AtomicBindableVar::new(0_i64),
        ];
        let _ab = Binding::new(&nodes[0], &nodes[1]).unwrap();
        let _ac = Binding::new(&nodes[0], &nodes[2]).unwrap();

        for (who, value) in &writes {
            nodes[*who].set(*value).unwrap();
        }
        let last = writes.last().map(|(_, v)| *v).unwrap();
        for node in &nodes {
            prop_assert_eq!(node.get().unwrap(), last);
        }
    }
}
