#![allow(dead_code)]

pub use procwatch_test_utils::*;

use std::time::Duration;

/// Poll `cond` every 10ms for up to 5 seconds.
pub async fn wait_until<F>(what: &str, mut cond: F)
where
    F: FnMut() -> bool,
{
    for _ in 0..500 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached: {what}");
}
