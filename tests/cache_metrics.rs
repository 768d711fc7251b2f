mod support;

use std::collections::HashMap;

use metrics_util::debugging::{DebugValue, DebuggingRecorder};
use support::Harness;

#[tokio::test(start_paused = true)]
async fn cache_and_coalescing_counters_are_emitted() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");
    feedgate::infra::telemetry::describe_metrics();

    let harness = Harness::new(None);

    let _ = tokio::join!(
        harness.get("/ns/route"),
        harness.get("/ns/route"),
        harness.get("/ns/route")
    );
    harness.stored(1).await;
    let _ = harness.get("/ns/route").await;

    let counters: HashMap<String, u64> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .filter_map(|(composite_key, _, _, value)| match value {
            DebugValue::Counter(count) => Some((composite_key.key().name().to_string(), count)),
            _ => None,
        })
        .collect();

    assert_eq!(harness.calls(), 1);
    assert_eq!(counters.get("feedgate_cache_miss_total"), Some(&3));
    assert_eq!(counters.get("feedgate_coalesced_total"), Some(&2));
    assert_eq!(counters.get("feedgate_cache_hit_total"), Some(&1));
    assert_eq!(counters.get("feedgate_cache_error_total"), None);
}
