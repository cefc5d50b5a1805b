//! Tests for the optimization passes.

#[cfg(test)]
#[allow(clippy::module_inception)]
mod tests {
    use crate::instr::{BinOp, InstrKind, IntWidth, MethodBody, SlotId};
    use crate::optimizer::{
        eliminate_dead_stores, fold_constants, optimize_all, optimize_method, OptimizeError,
    };

    fn const_i(value: i64) -> InstrKind {
        InstrKind::LoadConstInt {
            value,
            width: IntWidth::smallest_for(value),
        }
    }

    fn load(slot: u16) -> InstrKind {
        InstrKind::LoadLocal(SlotId(slot))
    }

    fn store(slot: u16) -> InstrKind {
        InstrKind::StoreLocal(SlotId(slot))
    }

    fn arith(op: BinOp) -> InstrKind {
        InstrKind::Arith(op)
    }

    fn body_of(kinds: &[InstrKind]) -> MethodBody {
        let mut body = MethodBody::new();
        for &kind in kinds {
            body.push(kind);
        }
        body
    }

    #[test]
    fn test_fold_add() {
        let mut body = body_of(&[const_i(3), const_i(4), arith(BinOp::Add), InstrKind::Return]);

        let stats = fold_constants(&mut body).unwrap();

        assert_eq!(body.kinds(), vec![const_i(7), InstrKind::Return]);
        assert_eq!(stats.runs_folded, 1);
        assert_eq!(stats.instrs_removed, 2);
        assert_eq!(stats.total_folds(), 1);
    }

    #[test]
    fn test_fold_div_truncates_toward_zero() {
        let mut body = body_of(&[const_i(-7), const_i(2), arith(BinOp::Div), InstrKind::Return]);

        fold_constants(&mut body).unwrap();

        assert_eq!(body.kinds(), vec![const_i(-3), InstrKind::Return]);
    }

    #[test]
    fn test_fold_rem() {
        let mut body = body_of(&[const_i(10), const_i(3), arith(BinOp::Rem), InstrKind::Return]);

        fold_constants(&mut body).unwrap();

        assert_eq!(body.kinds(), vec![const_i(1), InstrKind::Return]);
    }

    #[test]
    fn test_division_by_zero_not_folded() {
        for op in [BinOp::Div, BinOp::Rem] {
            let kinds = [const_i(10), const_i(0), arith(op), InstrKind::Return];
            let mut body = body_of(&kinds);

            let stats = fold_constants(&mut body).unwrap();

            assert_eq!(body.kinds(), kinds.to_vec());
            assert_eq!(stats.total_folds(), 0);
        }
    }

    #[test]
    fn test_min_over_minus_one_not_folded() {
        for lhs in [i64::from(i32::MIN), i64::MIN] {
            let kinds = [const_i(lhs), const_i(-1), arith(BinOp::Div), InstrKind::Return];
            let mut body = body_of(&kinds);

            let stats = fold_constants(&mut body).unwrap();

            assert_eq!(body.kinds(), kinds.to_vec());
            assert_eq!(stats.total_folds(), 0);
        }
    }

    #[test]
    fn test_fold_wraps_at_32_bits() {
        let mut body = body_of(&[
            const_i(i64::from(i32::MAX)),
            const_i(1),
            arith(BinOp::Add),
            InstrKind::Return,
        ]);

        fold_constants(&mut body).unwrap();

        assert_eq!(
            body.kinds(),
            vec![const_i(i64::from(i32::MIN)), InstrKind::Return]
        );
    }

    #[test]
    fn test_fold_wide_operands_use_64_bit_math() {
        let mut body = body_of(&[const_i(1 << 40), const_i(3), arith(BinOp::Mul), InstrKind::Return]);

        fold_constants(&mut body).unwrap();

        assert_eq!(body.kinds(), vec![const_i(3 << 40), InstrKind::Return]);
    }

    #[test]
    fn test_fold_longer_run_folds_iteratively() {
        let mut body = body_of(&[
            const_i(2),
            const_i(3),
            const_i(4),
            arith(BinOp::Mul),
            arith(BinOp::Mul),
            InstrKind::Return,
        ]);

        let stats = fold_constants(&mut body).unwrap();

        assert_eq!(body.kinds(), vec![const_i(24), InstrKind::Return]);
        assert_eq!(stats.runs_folded, 2);
        assert_eq!(stats.chains_folded, 0);
        assert_eq!(stats.instrs_removed, 4);
    }

    #[test]
    fn test_chain_same_operator_folds_in_one_rewrite() {
        let mut body = body_of(&[
            const_i(2),
            const_i(3),
            arith(BinOp::Mul),
            const_i(4),
            arith(BinOp::Mul),
            InstrKind::Return,
        ]);

        let stats = fold_constants(&mut body).unwrap();

        assert_eq!(body.kinds(), vec![const_i(24), InstrKind::Return]);
        assert_eq!(stats.chains_folded, 1);
        assert_eq!(stats.runs_folded, 0);
        assert_eq!(stats.instrs_removed, 4);
    }

    #[test]
    fn test_chain_uses_operator_for_both_legs() {
        // 10 - 4, then - 3: a blanket addition here would give 17
        let mut body = body_of(&[
            const_i(10),
            const_i(4),
            arith(BinOp::Sub),
            const_i(3),
            arith(BinOp::Sub),
            InstrKind::Return,
        ]);

        fold_constants(&mut body).unwrap();

        assert_eq!(body.kinds(), vec![const_i(3), InstrKind::Return]);
    }

    #[test]
    fn test_chain_different_operator_folds_stepwise() {
        let mut body = body_of(&[
            const_i(2),
            const_i(3),
            arith(BinOp::Mul),
            const_i(4),
            arith(BinOp::Add),
            InstrKind::Return,
        ]);

        let stats = fold_constants(&mut body).unwrap();

        assert_eq!(body.kinds(), vec![const_i(10), InstrKind::Return]);
        assert_eq!(stats.runs_folded, 2);
        assert_eq!(stats.chains_folded, 0);
    }

    #[test]
    fn test_chain_with_faulting_second_leg_folds_first_only() {
        let mut body = body_of(&[
            const_i(8),
            const_i(2),
            arith(BinOp::Div),
            const_i(0),
            arith(BinOp::Div),
            InstrKind::Return,
        ]);

        let stats = fold_constants(&mut body).unwrap();

        // The divide-by-zero stays behind the folded first leg
        assert_eq!(
            body.kinds(),
            vec![const_i(4), const_i(0), arith(BinOp::Div), InstrKind::Return]
        );
        assert_eq!(stats.runs_folded, 1);
        assert_eq!(stats.chains_folded, 0);
    }

    #[test]
    fn test_propagation_resolves_later_load() {
        let mut body = body_of(&[
            const_i(5),
            store(0),
            load(0),
            const_i(2),
            arith(BinOp::Mul),
            InstrKind::Return,
        ]);

        let stats = fold_constants(&mut body).unwrap();

        assert_eq!(
            body.kinds(),
            vec![const_i(5), store(0), const_i(10), InstrKind::Return]
        );
        assert_eq!(stats.consts_tracked, 1);
        assert_eq!(stats.runs_folded, 1);
    }

    #[test]
    fn test_propagation_copies_between_slots() {
        let mut body = body_of(&[
            const_i(5),
            store(0),
            load(0),
            store(1),
            load(1),
            const_i(2),
            arith(BinOp::Mul),
            InstrKind::Return,
        ]);

        let stats = fold_constants(&mut body).unwrap();

        assert_eq!(
            body.kinds(),
            vec![
                const_i(5),
                store(0),
                load(0),
                store(1),
                const_i(10),
                InstrKind::Return
            ]
        );
        assert_eq!(stats.consts_tracked, 2);
    }

    #[test]
    fn test_unknown_assignment_invalidates_slot() {
        let kinds = [
            const_i(5),
            store(0),
            InstrKind::Opaque(1),
            store(0),
            load(0),
            const_i(2),
            arith(BinOp::Mul),
            InstrKind::Return,
        ];
        let mut body = body_of(&kinds);

        let stats = fold_constants(&mut body).unwrap();

        assert_eq!(body.kinds(), kinds.to_vec());
        assert_eq!(stats.consts_tracked, 1);
        assert_eq!(stats.total_folds(), 0);
    }

    #[test]
    fn test_unresolvable_operands_left_alone() {
        let kinds = [
            load(1),
            load(2),
            arith(BinOp::Add),
            store(0),
            load(0),
            const_i(5),
            arith(BinOp::Mul),
            InstrKind::Return,
        ];
        let mut body = body_of(&kinds);

        let stats = fold_constants(&mut body).unwrap();

        assert_eq!(body.kinds(), kinds.to_vec());
        assert_eq!(stats.total_folds(), 0);
    }

    #[test]
    fn test_orphan_store_is_an_error() {
        let mut body = body_of(&[store(0), InstrKind::Return]);

        let err = fold_constants(&mut body).unwrap_err();

        assert_eq!(err, OptimizeError::OrphanStore { index: 0 });
    }

    #[test]
    fn test_fold_skips_window_branched_into() {
        let mut body = body_of(&[const_i(1), const_i(2), arith(BinOp::Add), InstrKind::Return]);
        let br = body.push_branch();
        body.set_branch_target(br, body.at(1)).unwrap();

        let stats = fold_constants(&mut body).unwrap();

        assert_eq!(body.len(), 5);
        assert_eq!(stats.total_folds(), 0);
    }

    #[test]
    fn test_fold_allows_branch_to_literal_window_start() {
        let mut body = body_of(&[const_i(3), const_i(4), arith(BinOp::Add), InstrKind::Return]);
        let br = body.push_branch();
        body.set_branch_target(br, body.at(0)).unwrap();

        let stats = fold_constants(&mut body).unwrap();

        assert_eq!(stats.runs_folded, 1);
        assert_eq!(body.len(), 3);
        assert_eq!(body.kind(0), Some(const_i(7)));
        match body.kind(2) {
            Some(InstrKind::Branch(target)) => assert_eq!(body.index_of(target), Some(0)),
            other => panic!("expected branch, got {:?}", other),
        }
        assert!(body.validate().is_ok());
    }

    #[test]
    fn test_store_behind_branch_not_propagated_past_join() {
        let mut body = body_of(&[const_i(5), store(0)]);
        let br = body.push_branch();
        body.push(const_i(9));
        body.push(store(0));
        let landing = body.push(InstrKind::Opaque(1));
        body.push(load(0));
        body.push(const_i(2));
        body.push(arith(BinOp::Mul));
        body.push(InstrKind::Return);
        body.set_branch_target(br, landing).unwrap();
        let before = body.kinds();

        let stats = fold_constants(&mut body).unwrap();

        // Slot 0 holds 5 at the landing point, not the 9 the skipped
        // segment stored
        assert_eq!(body.kinds(), before);
        assert_eq!(stats.total_folds(), 0);
        assert_eq!(stats.instrs_removed, 0);
    }

    #[test]
    fn test_constants_stored_after_join_still_fold() {
        let mut body = body_of(&[const_i(5), store(0)]);
        let br = body.push_branch();
        body.push(const_i(9));
        body.push(store(0));
        let landing = body.push(const_i(3));
        body.push(store(0));
        body.push(load(0));
        body.push(const_i(2));
        body.push(arith(BinOp::Mul));
        body.push(InstrKind::Return);
        body.set_branch_target(br, landing).unwrap();

        let stats = fold_constants(&mut body).unwrap();

        assert_eq!(stats.runs_folded, 1);
        assert_eq!(body.kind(7), Some(const_i(6)));
        assert!(body.validate().is_ok());
    }

    #[test]
    fn test_run_scan_stops_at_a_join() {
        // Entry at the join reaches the load with slot 0 still 1, not
        // the 9 the table recorded from the skipped segment
        let mut body = body_of(&[const_i(1), store(0)]);
        let br = body.push_branch();
        body.push(const_i(9));
        body.push(store(0));
        body.push(const_i(3));
        let landing = body.push(const_i(4));
        body.push(const_i(5));
        body.push(load(0));
        body.push(arith(BinOp::Add));
        body.push(InstrKind::Return);
        body.set_branch_target(br, landing).unwrap();
        let before = body.kinds();

        let stats = fold_constants(&mut body).unwrap();

        assert_eq!(body.kinds(), before);
        assert_eq!(stats.total_folds(), 0);
    }

    #[test]
    fn test_store_at_join_leaves_slot_unknown() {
        // The branch enters at the store itself, so the producer feeding
        // it differs per path
        let mut body = body_of(&[const_i(5)]);
        let br = body.push_branch();
        body.push(const_i(9));
        let landing = body.push(store(0));
        body.push(load(0));
        body.push(const_i(2));
        body.push(arith(BinOp::Mul));
        body.push(InstrKind::Return);
        body.set_branch_target(br, landing).unwrap();
        let before = body.kinds();

        let stats = fold_constants(&mut body).unwrap();

        assert_eq!(body.kinds(), before);
        assert_eq!(stats.total_folds(), 0);
        assert_eq!(stats.consts_tracked, 0);
    }

    #[test]
    fn test_dead_store_pair_removed() {
        let mut body = body_of(&[
            const_i(1),
            store(0),
            const_i(2),
            store(0),
            load(0),
            InstrKind::Return,
        ]);

        let stats = eliminate_dead_stores(&mut body).unwrap();

        assert_eq!(
            body.kinds(),
            vec![const_i(2), store(0), load(0), InstrKind::Return]
        );
        assert_eq!(stats.dead_stores_removed, 1);
        assert_eq!(stats.instrs_removed, 2);
        assert_eq!(stats.bytes_saved, 2);
    }

    #[test]
    fn test_observed_store_kept() {
        let kinds = [
            const_i(1),
            store(0),
            load(0),
            store(1),
            const_i(2),
            store(0),
            load(0),
            InstrKind::Return,
        ];
        let mut body = body_of(&kinds);

        let stats = eliminate_dead_stores(&mut body).unwrap();

        assert_eq!(body.kinds(), kinds.to_vec());
        assert_eq!(stats.dead_stores_removed, 0);
    }

    #[test]
    fn test_dead_store_with_impure_producer_kept() {
        let kinds = [
            InstrKind::Opaque(3),
            store(0),
            const_i(2),
            store(0),
            load(0),
            InstrKind::Return,
        ];
        let mut body = body_of(&kinds);

        let stats = eliminate_dead_stores(&mut body).unwrap();

        assert_eq!(body.kinds(), kinds.to_vec());
        assert_eq!(stats.dead_stores_removed, 0);
        assert_eq!(stats.skipped_stores, 1);
    }

    #[test]
    fn test_repeated_dead_stores_all_removed() {
        let mut body = body_of(&[
            const_i(1),
            store(0),
            const_i(2),
            store(0),
            const_i(3),
            store(0),
            load(0),
            InstrKind::Return,
        ]);

        let stats = eliminate_dead_stores(&mut body).unwrap();

        assert_eq!(
            body.kinds(),
            vec![const_i(3), store(0), load(0), InstrKind::Return]
        );
        assert_eq!(stats.dead_stores_removed, 2);
        assert_eq!(stats.instrs_removed, 4);
    }

    #[test]
    fn test_branch_around_return_collapses() {
        let mut body = body_of(&[const_i(42), store(0)]);
        let br = body.push_branch();
        let landing = body.push(load(0));
        body.push(InstrKind::Return);
        body.set_branch_target(br, landing).unwrap();

        let stats = eliminate_dead_stores(&mut body).unwrap();

        assert_eq!(body.kinds(), vec![const_i(42), InstrKind::Return]);
        assert_eq!(stats.branch_arounds_removed, 1);
        assert_eq!(stats.unreachable_removed, 0);
        assert_eq!(stats.instrs_removed, 3);
        assert!(body.validate().is_ok());
    }

    #[test]
    fn test_branch_around_deletes_skipped_region() {
        let mut body = body_of(&[const_i(42), store(0)]);
        let br = body.push_branch();
        body.push(InstrKind::Opaque(1));
        body.push(InstrKind::Opaque(2));
        let landing = body.push(load(0));
        body.push(InstrKind::Return);
        body.set_branch_target(br, landing).unwrap();

        let stats = eliminate_dead_stores(&mut body).unwrap();

        assert_eq!(body.kinds(), vec![const_i(42), InstrKind::Return]);
        assert_eq!(stats.branch_arounds_removed, 1);
        assert_eq!(stats.unreachable_removed, 2);
        assert_eq!(stats.instrs_removed, 5);
    }

    #[test]
    fn test_branch_around_with_shared_landing_kept() {
        let mut body = body_of(&[const_i(42), store(0)]);
        let first = body.push_branch();
        let landing = body.push(load(0));
        body.push(InstrKind::Return);
        let second = body.push_branch();
        body.set_branch_target(first, landing).unwrap();
        body.set_branch_target(second, landing).unwrap();

        let stats = eliminate_dead_stores(&mut body).unwrap();

        assert_eq!(body.len(), 6);
        assert_eq!(stats.branch_arounds_removed, 0);
    }

    #[test]
    fn test_branch_around_wrong_slot_kept() {
        let mut body = body_of(&[const_i(42), store(0)]);
        let br = body.push_branch();
        let landing = body.push(load(1));
        body.push(InstrKind::Return);
        body.set_branch_target(br, landing).unwrap();

        let stats = eliminate_dead_stores(&mut body).unwrap();

        assert_eq!(body.len(), 5);
        assert_eq!(stats.branch_arounds_removed, 0);
    }

    #[test]
    fn test_backward_branch_not_an_idiom() {
        let mut body = MethodBody::new();
        let landing = body.push(load(0));
        body.push(InstrKind::Return);
        body.push(const_i(42));
        body.push(store(0));
        let br = body.push_branch();
        body.set_branch_target(br, landing).unwrap();

        let stats = eliminate_dead_stores(&mut body).unwrap();

        assert_eq!(body.len(), 5);
        assert_eq!(stats.branch_arounds_removed, 0);
        assert!(body.validate().is_ok());
    }

    #[test]
    fn test_branch_drops_pending_stores() {
        let mut body = body_of(&[const_i(1), store(0)]);
        let br = body.push_branch();
        let landing = body.push(const_i(2));
        body.push(store(0));
        body.push(load(0));
        body.push(InstrKind::Return);
        body.set_branch_target(br, landing).unwrap();

        let stats = eliminate_dead_stores(&mut body).unwrap();

        // Past a branch, linear order no longer proves the first store dead
        assert_eq!(body.len(), 7);
        assert_eq!(stats.dead_stores_removed, 0);
    }

    #[test]
    fn test_trailing_store_kept() {
        let kinds = [const_i(1), store(0), InstrKind::Return];
        let mut body = body_of(&kinds);

        let stats = eliminate_dead_stores(&mut body).unwrap();

        assert_eq!(body.kinds(), kinds.to_vec());
        assert_eq!(stats.instrs_removed, 0);
    }

    #[test]
    fn test_replacement_uses_smallest_encoding() {
        let wide = InstrKind::LoadConstInt {
            value: 50,
            width: IntWidth::W32,
        };
        let mut body = body_of(&[wide, wide, arith(BinOp::Add), InstrKind::Return]);

        let stats = fold_constants(&mut body).unwrap();

        assert_eq!(
            body.kind(0),
            Some(InstrKind::LoadConstInt {
                value: 100,
                width: IntWidth::W8,
            })
        );
        // Two five-byte loads and the add collapse to a two-byte load
        assert_eq!(stats.bytes_saved, 9);
    }

    #[test]
    fn test_optimize_method_runs_both_passes() {
        let mut body = body_of(&[const_i(3), const_i(4), arith(BinOp::Add), store(0)]);
        let br = body.push_branch();
        let landing = body.push(load(0));
        body.push(InstrKind::Return);
        body.set_branch_target(br, landing).unwrap();

        let stats = optimize_method(&mut body).unwrap();

        assert_eq!(body.kinds(), vec![const_i(7), InstrKind::Return]);
        assert_eq!(stats.fold.runs_folded, 1);
        assert_eq!(stats.dead.branch_arounds_removed, 1);
        assert_eq!(stats.instrs_removed(), 5);
        assert_eq!(stats.bytes_saved(), 9);
    }

    #[test]
    fn test_optimize_method_is_idempotent() {
        let mut body = body_of(&[const_i(3), const_i(4), arith(BinOp::Add), store(0)]);
        let br = body.push_branch();
        let landing = body.push(load(0));
        body.push(InstrKind::Return);
        body.set_branch_target(br, landing).unwrap();

        optimize_method(&mut body).unwrap();
        let first = body.kinds();
        let stats = optimize_method(&mut body).unwrap();

        assert_eq!(body.kinds(), first);
        assert_eq!(stats.instrs_removed(), 0);
        assert_eq!(stats.bytes_saved(), 0);
    }

    #[test]
    fn test_failed_optimization_leaves_body_intact() {
        let kinds = [store(0), InstrKind::Return];
        let mut body = body_of(&kinds);

        let err = optimize_method(&mut body).unwrap_err();

        assert_eq!(err, OptimizeError::OrphanStore { index: 0 });
        assert_eq!(body.kinds(), kinds.to_vec());
    }

    #[test]
    fn test_optimize_all_keeps_input_order() {
        let mut bodies = vec![
            body_of(&[const_i(3), const_i(4), arith(BinOp::Add), InstrKind::Return]),
            body_of(&[
                const_i(1),
                store(0),
                const_i(2),
                store(0),
                load(0),
                InstrKind::Return,
            ]),
            body_of(&[store(0), InstrKind::Return]),
        ];

        let results = optimize_all(&mut bodies);

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap().fold.runs_folded, 1);
        assert_eq!(results[1].as_ref().unwrap().dead.dead_stores_removed, 1);
        assert_eq!(
            results[2],
            Err(OptimizeError::OrphanStore { index: 0 })
        );
        assert_eq!(bodies[2].kinds(), vec![store(0), InstrKind::Return]);
    }
}
