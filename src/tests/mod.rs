#[cfg(test)]
mod end_to_end_tests {
    use crate::config::ProfilerConfig;
    use crate::errors::err::{ProfileErr, Site};
    use crate::heap::kind::Kind;
    use crate::heap::{Heap, ObjId};
    use crate::profiler::RetainerProfiler;
    use crate::retainer_set::{Retainer, SetId};
    use fxhash::FxHashMap;
    use proptest::prelude::*;

    const R: Retainer = Retainer(1);
    const R1: Retainer = Retainer(11);
    const R2: Retainer = Retainer(12);

    fn checked() -> RetainerProfiler {
        RetainerProfiler::new(ProfilerConfig { chunk_frames: 2, check_sets: true })
    }

    fn members(profiler: &RetainerProfiler, heap: &Heap, obj: ObjId) -> Option<Vec<Retainer>> {
        profiler.current_retainer_set(heap, obj).unwrap().map(|s| s.iter().collect())
    }

    fn set_id(profiler: &RetainerProfiler, heap: &Heap, obj: ObjId) -> Option<SetId> {
        profiler.current_retainer_set(heap, obj).unwrap().map(|s| s.id())
    }

    #[test]
    fn chain_through_non_retainers() {
        let mut heap = Heap::default();
        let c = heap.thunk(Kind::Thunk0_1, Retainer(3), &[], None);
        let d = heap.data(Kind::Constr0_1, vec![4]);
        let b = heap.fields(Kind::Constr2_0, Retainer::SYSTEM, &[c, d]);
        let a = heap.fields(Kind::Constr1_0, Retainer::SYSTEM, &[b]);
        let r = heap.mut_var(R, a);
        heap.pin(r);

        let mut profiler = checked();
        profiler.profile(&mut heap).unwrap();
        for obj in [r, a, b, c, d] {
            assert_eq!(members(&profiler, &heap, obj), Some(vec![R]));
        }
    }

    #[test]
    fn below_a_retainer_only_the_retainer_counts() {
        let mut heap = Heap::default();
        let e = heap.data(Kind::ArrWords, vec![]);
        let c = heap.thunk(Kind::Thunk1_0, Retainer(3), &[e], None);
        let b = heap.fields(Kind::Constr1_0, Retainer::SYSTEM, &[c]);
        let r = heap.mut_var(R, b);
        heap.pin(r);

        let mut profiler = checked();
        profiler.profile(&mut heap).unwrap();
        assert_eq!(members(&profiler, &heap, c), Some(vec![R]));
        assert_eq!(members(&profiler, &heap, e), Some(vec![Retainer(3)]));
    }

    fn shared(r1_first: bool) -> (Heap, ObjId, ObjId) {
        let mut heap = Heap::default();
        let y = heap.data(Kind::ArrWords, vec![]);
        let x = heap.fields(Kind::Constr1_0, Retainer::SYSTEM, &[y]);
        let r1 = heap.mut_var(R1, x);
        let r2 = heap.mut_var(R2, x);
        if r1_first {
            heap.pin(r1);
            heap.pin(r2);
        } else {
            heap.pin(r2);
            heap.pin(r1);
        }
        (heap, x, y)
    }

    #[test]
    fn shared_object_collects_both_roots_in_either_order() {
        for r1_first in [true, false] {
            let (mut heap, x, y) = shared(r1_first);
            let mut profiler = checked();
            let stats = profiler.profile(&mut heap).unwrap();
            assert_eq!(members(&profiler, &heap, x), Some(vec![R1, R2]));
            assert_eq!(members(&profiler, &heap, y), Some(vec![R1, R2]));
            assert_eq!(set_id(&profiler, &heap, x), set_id(&profiler, &heap, y));
            // r1, r2, and x and y visited from both sides
            assert_eq!(stats.objects_visited, 4);
            assert_eq!(stats.visit_attempts, 6);
        }
    }

    #[test]
    fn repeat_retainer_does_not_walk_again() {
        let mut heap = Heap::default();
        let leaf = heap.data(Kind::ArrWords, vec![]);
        let mid = heap.fields(Kind::Constr1_0, Retainer::SYSTEM, &[leaf]);
        let arr = heap.fields(Kind::MutArrPtrsDirty, R, &[mid, mid, mid]);
        heap.pin(arr);

        let mut profiler = checked();
        let stats = profiler.profile(&mut heap).unwrap();
        assert_eq!(stats.objects_visited, 3);
        // mid three times, leaf once
        assert_eq!(stats.visit_attempts, 5);
        assert_eq!(members(&profiler, &heap, leaf), Some(vec![R]));
    }

    #[test]
    fn cycle_of_non_retainers() {
        let mut heap = Heap::default();
        let a = heap.fields(Kind::Constr2_0, Retainer::SYSTEM, &[ObjId(0), ObjId(0)]);
        let b = heap.fields(Kind::Constr1_0, Retainer::SYSTEM, &[a]);
        let c = heap.fields(Kind::Constr, Retainer::SYSTEM, &[a, b]);
        heap.set_ptr(a, 0, b).unwrap();
        heap.set_ptr(a, 1, c).unwrap();
        let r = heap.mut_var(R, a);
        heap.add_weak(0, r);

        let mut profiler = checked();
        profiler.profile(&mut heap).unwrap();
        for obj in [a, b, c] {
            assert_eq!(members(&profiler, &heap, obj), Some(vec![R]));
        }
    }

    #[test]
    fn passes_agree_whichever_way_the_bit_points() {
        let (mut heap, x, y) = shared(true);
        let mut profiler = checked();
        let first = profiler.profile(&mut heap).unwrap();
        let before: Vec<_> = heap.ids().map(|obj| members(&profiler, &heap, obj)).collect();
        for _ in 0..3 {
            let again = profiler.profile(&mut heap).unwrap();
            let after: Vec<_> = heap.ids().map(|obj| members(&profiler, &heap, obj)).collect();
            assert_eq!(before, after);
            assert_eq!(again.objects_visited, first.objects_visited);
            assert_eq!(again.visit_attempts, first.visit_attempts);
        }
        assert_eq!(members(&profiler, &heap, x), members(&profiler, &heap, y));
    }

    #[test]
    fn non_retainer_roots_are_attributed_to_the_system() {
        let mut heap = Heap::default();
        let leaf = heap.data(Kind::ArrWords, vec![]);
        let pair = heap.fields(Kind::Constr2_0, Retainer::SYSTEM, &[leaf, leaf]);
        heap.pin(pair);
        let var = heap.mut_var(R, pair);
        heap.pin(var);

        let mut profiler = checked();
        profiler.profile(&mut heap).unwrap();
        assert_eq!(members(&profiler, &heap, pair), Some(vec![Retainer::SYSTEM, R]));
        assert_eq!(members(&profiler, &heap, leaf), Some(vec![Retainer::SYSTEM, R]));
        assert_eq!(members(&profiler, &heap, var), Some(vec![R]));
    }

    #[test]
    fn frames_outside_a_stack_are_fatal() {
        let mut heap = Heap::default();
        let frame = heap.data(Kind::RetSmall, vec![]);
        let arr = heap.fields(Kind::MutArrPtrsClean, R, &[frame]);
        heap.pin(arr);

        let mut profiler = checked();
        assert_eq!(
            profiler.profile(&mut heap),
            Err(ProfileErr::InvalidObject { kind: Kind::RetSmall, site: Site::IsRetainer })
        );
    }

    #[test]
    fn dangling_pointers_are_reported() {
        let mut heap = Heap::default();
        let var = heap.mut_var(R, ObjId(40));
        heap.pin(var);

        let mut profiler = checked();
        assert_eq!(profiler.profile(&mut heap), Err(ProfileErr::DanglingPointer(ObjId(40))));
    }

    /// node shapes the generator picks from, each with a list of child indices
    fn build(nodes: &[(u8, Vec<usize>)], roots: &[usize]) -> Heap {
        let mut heap = Heap::default();
        for (i, (shape, children)) in nodes.iter().enumerate() {
            let ccs = Retainer(100 + i as u32);
            let arity = match shape {
                0 | 1 => 1,
                2 => 2,
                5 => 0,
                _ => children.len(),
            };
            let kind = match shape {
                0 => Kind::MutVarDirty,
                1 => Kind::Constr1_0,
                2 => Kind::Constr2_0,
                3 => Kind::Constr,
                4 => Kind::MutArrPtrsDirty,
                5 => Kind::ArrWords,
                _ => Kind::Thunk,
            };
            let ptrs: Vec<ObjId> = (0..arity).map(|k| ObjId(children.get(k).copied().unwrap_or(i))).collect();
            heap.fields(kind, ccs, &ptrs);
        }
        for &root in roots {
            heap.pin(ObjId(root));
        }
        heap
    }

    fn graph() -> impl Strategy<Value = (Vec<(u8, Vec<usize>)>, Vec<usize>)> {
        (1usize..40).prop_flat_map(|n| {
            let node = (0u8..7, prop::collection::vec(0..n, 0..4));
            (prop::collection::vec(node, n), prop::collection::vec(0..n, 1..4))
        })
    }

    fn reachable(heap: &Heap, roots: &[usize]) -> Vec<bool> {
        let mut seen = vec![false; heap.len()];
        let mut todo: Vec<usize> = roots.to_vec();
        while let Some(i) = todo.pop() {
            if std::mem::replace(&mut seen[i], true) {
                continue;
            }
            let obj = heap.get(ObjId(i)).unwrap();
            todo.extend(obj.fields().unwrap().ptrs.iter().map(|p| p.0));
        }
        seen
    }

    proptest! {
        #[test]
        fn reached_objects_get_sets_of_retainers((nodes, roots) in graph()) {
            let mut heap = build(&nodes, &roots);
            let mut profiler = checked();
            profiler.profile(&mut heap).unwrap();

            let seen = reachable(&heap, &roots);
            for obj in heap.ids() {
                let set = profiler.current_retainer_set(&heap, obj).unwrap();
                prop_assert_eq!(set.is_some(), seen[obj.0]);
                for r in set.into_iter().flat_map(|s| s.iter()) {
                    let is_retainer_id = r == Retainer::SYSTEM
                        || heap.ids().any(|o| {
                            let o = heap.get(o).unwrap();
                            o.ccs == r && o.kind().unwrap().is_retainer().unwrap()
                        });
                    prop_assert!(is_retainer_id, "{} is not a retainer", r);
                }
            }
        }

        #[test]
        fn equal_sets_are_one_set((nodes, roots) in graph()) {
            let mut heap = build(&nodes, &roots);
            let mut profiler = checked();
            profiler.profile(&mut heap).unwrap();

            let mut by_content: FxHashMap<Vec<Retainer>, SetId> = FxHashMap::default();
            for obj in heap.ids() {
                if let Some(set) = profiler.current_retainer_set(&heap, obj).unwrap() {
                    let id = *by_content.entry(set.iter().collect()).or_insert(set.id());
                    prop_assert_eq!(id, set.id());
                }
            }
            // sets outgrown during the pass stay in the store
            prop_assert!(by_content.len() <= profiler.store().len());
        }

        #[test]
        fn second_pass_reproduces_the_first((nodes, roots) in graph()) {
            let mut heap = build(&nodes, &roots);
            let mut profiler = checked();
            profiler.profile(&mut heap).unwrap();
            let first: Vec<_> = heap.ids().map(|obj| members(&profiler, &heap, obj)).collect();
            profiler.profile(&mut heap).unwrap();
            let second: Vec<_> = heap.ids().map(|obj| members(&profiler, &heap, obj)).collect();
            prop_assert_eq!(first, second);
        }
    }
}
