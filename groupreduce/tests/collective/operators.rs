use groupreduce::{CustomOp, ReduceOp};
use std::sync::Arc;

use super::helpers::collect_collective;

#[tokio::test]
async fn test_bitwise_ops() {
    let results = collect_collective(5, |engine| async move {
        let x = 1u32 << engine.rank() | 0x100;
        (
            engine.allreduce(x, &ReduceOp::BitOr).await.unwrap(),
            engine.allreduce(x, &ReduceOp::BitAnd).await.unwrap(),
            engine.allreduce(x, &ReduceOp::BitXor).await.unwrap(),
        )
    })
    .await;
    // 0x100 appears five times, so it survives AND and XOR.
    assert_eq!(results, vec![(0x11f, 0x100, 0x11f); 5]);
}

#[tokio::test]
async fn test_logical_ops_on_bool() {
    let results = collect_collective(4, |engine| async move {
        let vote = engine.rank() != 2;
        (
            engine.allreduce(vote, &ReduceOp::LogicalAnd).await.unwrap(),
            engine.allreduce(vote, &ReduceOp::LogicalOr).await.unwrap(),
        )
    })
    .await;
    assert_eq!(results, vec![(false, true); 4]);
}

#[tokio::test]
async fn test_float_min_max() {
    let results = collect_collective(6, |engine| async move {
        let x = (engine.rank() as f32 - 2.5) * 1.5;
        (
            engine.allreduce(x, &ReduceOp::Min).await.unwrap(),
            engine.allreduce(x, &ReduceOp::Max).await.unwrap(),
        )
    })
    .await;
    assert_eq!(results, vec![(-3.75, 3.75); 6]);
}

#[tokio::test]
async fn test_integer_sum_wraps() {
    let results = collect_collective(2, |engine| async move {
        engine.allreduce(200u8, &ReduceOp::Sum).await.unwrap()
    })
    .await;
    assert_eq!(results, vec![144, 144]);
}

#[tokio::test]
async fn test_custom_gcd() {
    let gcd = Arc::new(CustomOp::new("gcd", 0u64, |mut a: u64, mut b: u64| {
        while b != 0 {
            (a, b) = (b, a % b);
        }
        a
    }));
    let results = collect_collective(3, move |engine| {
        let gcd = Arc::clone(&gcd);
        async move {
            let x = [84u64, 126, 210][engine.rank() as usize];
            engine.allreduce(x, &*gcd).await.unwrap()
        }
    })
    .await;
    assert_eq!(results, vec![42; 3]);
}
