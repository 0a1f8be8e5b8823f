use groupreduce::{AlgorithmChoice, ReduceConfig, ReduceError, ReduceOp};

use super::helpers::{collect_collective, collect_collective_with_config, run_collective};

#[tokio::test]
async fn test_sum_matches_arithmetic_sum_for_all_sizes() {
    for n in 1..=8u32 {
        let results = collect_collective(n, |engine| async move {
            let local = 7 * engine.rank() as i64 - 3;
            engine.allreduce(local, &ReduceOp::Sum).await.unwrap()
        })
        .await;
        let expected: i64 = (0..n as i64).map(|r| 7 * r - 3).sum();
        assert_eq!(results, vec![expected; n as usize], "group of {n}");
    }
}

#[tokio::test]
async fn test_four_ranks_sum_and_max() {
    const LOCAL: [i32; 4] = [3, 1, 4, 1];
    let results = collect_collective(4, |engine| async move {
        let x = LOCAL[engine.rank() as usize];
        let sum = engine.allreduce(x, &ReduceOp::Sum).await.unwrap();
        let max = engine.allreduce(x, &ReduceOp::Max).await.unwrap();
        (sum, max)
    })
    .await;
    assert_eq!(results, vec![(9, 4); 4]);
}

#[tokio::test]
async fn test_three_ranks_use_ring() {
    const LOCAL: [u32; 3] = [10, 20, 30];
    run_collective(3, |engine| async move {
        let mut buf = [LOCAL[engine.rank() as usize]];
        let stats = engine
            .allreduce_in_place(&mut buf, &ReduceOp::Sum)
            .await
            .unwrap();
        assert_eq!(buf, [60]);
        assert_eq!(stats.strategy, groupreduce::Strategy::Ring);
    })
    .await;
}

#[tokio::test]
async fn test_solo_returns_local_value() {
    run_collective(1, |engine| async move {
        let stats = engine.allreduce_in_place(&mut [-5i8], &ReduceOp::Min).await.unwrap();
        assert_eq!(stats.rounds, 0);
        assert_eq!(engine.allreduce(-5i8, &ReduceOp::Min).await.unwrap(), -5);
        assert_eq!(engine.channel().messages_sent(), 0);
    })
    .await;
}

#[tokio::test]
async fn test_identity_in_identity_out() {
    for n in [2u32, 3, 4, 7] {
        for op in [ReduceOp::Sum, ReduceOp::Prod, ReduceOp::Min, ReduceOp::Max] {
            let results = collect_collective(n, move |engine| async move {
                let id = groupreduce::ReductionOperator::<i32>::identity(&op);
                (id, engine.allreduce(id, &op).await.unwrap())
            })
            .await;
            for (id, out) in results {
                assert_eq!(out, id, "{op} over {n} ranks");
            }
        }
    }
}

#[tokio::test]
async fn test_vector_allreduce_elementwise() {
    for n in [2u32, 5, 8] {
        let results = collect_collective(n, |engine| async move {
            let r = engine.rank() as u64;
            let mut data: Vec<u64> = (0..33).map(|i| i * r + 1).collect();
            engine
                .allreduce_in_place(&mut data, &ReduceOp::Sum)
                .await
                .unwrap();
            data
        })
        .await;
        let rank_sum: u64 = (0..n as u64).sum();
        let expected: Vec<u64> = (0..33).map(|i| i * rank_sum + n as u64).collect();
        for data in results {
            assert_eq!(data, expected);
        }
    }
}

#[tokio::test]
async fn test_float_results_bit_identical_across_ranks() {
    for n in [3u32, 4, 6, 8] {
        let results = collect_collective(n, |engine| async move {
            // Values whose sum depends on the association order.
            let x = 0.1f64 * (engine.rank() as f64 + 1.0) + 1e16 * (engine.rank() % 2) as f64;
            engine.allreduce(x, &ReduceOp::Sum).await.unwrap().to_bits()
        })
        .await;
        assert!(
            results.windows(2).all(|w| w[0] == w[1]),
            "ranks disagree for n={n}: {results:?}"
        );
    }
}

#[tokio::test]
async fn test_forced_ring_on_power_of_two() {
    let config = ReduceConfig {
        algorithm: AlgorithmChoice::Ring,
        ..ReduceConfig::default()
    };
    let results = collect_collective_with_config(4, config, |engine| async move {
        let mut buf = [engine.rank() as i32 + 1];
        let stats = engine
            .allreduce_in_place(&mut buf, &ReduceOp::Prod)
            .await
            .unwrap();
        (buf[0], stats.strategy, stats.rounds)
    })
    .await;
    assert_eq!(
        results,
        vec![(24, groupreduce::Strategy::Ring, 6); 4]
    );
}

#[tokio::test]
async fn test_unsupported_operation() {
    run_collective(2, |engine| async move {
        let err = engine.allreduce(1.0f32, &ReduceOp::BitAnd).await.unwrap_err();
        assert!(matches!(
            err,
            ReduceError::UnsupportedOperation {
                op: ReduceOp::BitAnd,
                dtype: groupreduce::DataType::F32,
            }
        ));
        assert!(!engine.is_aborted());
    })
    .await;
}

#[tokio::test]
async fn test_mismatched_lengths_fail_on_every_rank() {
    let results = collect_collective(2, |engine| async move {
        let mut data = vec![1u8; 3 + engine.rank() as usize];
        let before = data.clone();
        let result = engine.allreduce_in_place(&mut data, &ReduceOp::Max).await;
        (result.map(|_| ()), data == before)
    })
    .await;
    for (result, untouched) in results {
        let err = result.unwrap_err();
        assert!(err.to_string().contains("wrong size"), "got {err}");
        assert!(untouched);
    }
}

#[tokio::test]
async fn test_many_calls_in_sequence() {
    run_collective(6, |engine| async move {
        for round in 0..20u32 {
            let out = engine
                .allreduce(round + engine.rank(), &ReduceOp::Max)
                .await
                .unwrap();
            assert_eq!(out, round + 5);
        }
        assert_eq!(engine.epoch(), 20);
    })
    .await;
}
