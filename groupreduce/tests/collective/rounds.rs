use groupreduce::{ReduceOp, Strategy};

use super::helpers::collect_collective;

#[tokio::test]
async fn test_power_of_two_takes_log2_rounds() {
    for (n, rounds) in [(1u32, 0u32), (2, 1), (4, 2), (8, 3)] {
        let stats = collect_collective(n, |engine| async move {
            let mut buf = [engine.rank() as i32];
            engine
                .allreduce_in_place(&mut buf, &ReduceOp::Sum)
                .await
                .unwrap()
        })
        .await;
        for s in stats {
            assert_eq!(s.rounds, rounds, "group of {n}");
            // One message per round per rank.
            assert_eq!(s.messages_sent, rounds, "group of {n}");
            if n > 1 {
                assert_eq!(s.strategy, Strategy::RecursiveDoubling);
            }
        }
    }
}

#[tokio::test]
async fn test_ring_message_counts() {
    for n in [3u32, 5, 6] {
        let stats = collect_collective(n, move |engine| async move {
            let mut buf = [1u32];
            let s = engine
                .allreduce_in_place(&mut buf, &ReduceOp::Sum)
                .await
                .unwrap();
            assert_eq!(buf, [n as u32]);
            (engine.rank(), s)
        })
        .await;
        let total: u32 = stats.iter().map(|(_, s)| s.messages_sent).sum();
        assert_eq!(total, 2 * (n - 1), "group of {n}");
        for (rank, s) in stats {
            assert_eq!(s.strategy, Strategy::Ring);
            assert_eq!(s.rounds, 2 * (n - 1));
            // Rank N-1 sends only the first broadcast hop, rank N-2 only
            // its accumulation; everyone else sends once per phase.
            let expected = if rank + 2 >= n { 1 } else { 2 };
            assert_eq!(s.messages_sent, expected, "rank {rank} of {n}");
        }
    }
}
