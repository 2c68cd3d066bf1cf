//! Property-based tests for connectivity debouncing

use pattern_sync::shared::clock::system_clock;
use pattern_sync::sync::ConnectivityMonitor;
use proptest::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

const WINDOW: Duration = Duration::from_millis(250);

fn paused_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .unwrap()
}

/// Flip the raw signal once per gap, then let the window elapse
///
/// Returns the number of emitted transitions and the final debounced value.
fn run_flips(initial: bool, gaps_ms: &[u64]) -> (usize, bool) {
    paused_runtime().block_on(async {
        let monitor = ConnectivityMonitor::new(initial, WINDOW, system_clock());
        let emitted = Arc::new(AtomicUsize::new(0));
        let sink = Arc::clone(&emitted);
        let _sub = monitor.on_change(move |_| {
            sink.fetch_add(1, Ordering::SeqCst);
        });

        let mut raw = initial;
        for gap in gaps_ms {
            raw = !raw;
            monitor.signal(raw);
            sleep(Duration::from_millis(*gap)).await;
        }
        sleep(WINDOW * 2).await;

        (emitted.load(Ordering::SeqCst), monitor.current())
    })
}

proptest! {
    #[test]
    fn test_flips_inside_window_emit_net_change_only(
        initial in any::<bool>(),
        gaps in prop::collection::vec(0u64..250, 1..20),
    ) {
        let (emitted, current) = run_flips(initial, &gaps);
        let changed = gaps.len() % 2 == 1;

        prop_assert_eq!(emitted, usize::from(changed));
        prop_assert_eq!(current, initial ^ changed);
    }

    #[test]
    fn test_settled_changes_each_emit_once(
        initial in any::<bool>(),
        gaps in prop::collection::vec(300u64..2_000, 1..8),
    ) {
        let (emitted, current) = run_flips(initial, &gaps);

        prop_assert_eq!(emitted, gaps.len());
        prop_assert_eq!(current, initial ^ (gaps.len() % 2 == 1));
    }
}
