//! End-to-end tests for the mux/demux bridge
//!
//! Workers here are plain tokio tasks pulling from the exchange, standing in
//! for the out-of-process workers the bridge is normally paired with.

use futures::future::join_all;
use muxbridge::{
    CorrelationRecord, MuxDemuxConfig, MuxDemuxError, MuxDemuxManager, RouterState,
    SharedExchange,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn test_config() -> MuxDemuxConfig {
    MuxDemuxConfig::default()
        .with_poll_interval(Duration::from_millis(2))
        .with_result_timeout(Duration::from_secs(5))
        .with_router_name("test-router")
}

/// Poll the way a submitter would, without `wait_result`
async fn poll_until_ready(exchange: &SharedExchange<String>, identifier: &str) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while exchange.is_pending(identifier) {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("result never arrived");
}

// Test the single-request round trip through a worker and the router
#[tokio::test]
async fn test_end_to_end_single_request() {
    init_tracing();
    let manager = MuxDemuxManager::<String>::start(test_config()).unwrap();
    let exchange = manager.exchange();

    exchange.submit("id-1", "req-A".to_string()).unwrap();

    // Worker side
    let request = exchange.take_outbound().await.unwrap();
    assert_eq!(request, CorrelationRecord::new("id-1", "req-A".to_string()));
    assert!(exchange.try_take_outbound().is_none());
    assert!(exchange.is_pending("id-1"));
    exchange
        .publish(CorrelationRecord::new(request.identifier(), "resp-A".to_string()))
        .unwrap();

    // Submitter side
    poll_until_ready(&exchange, "id-1").await;
    assert!(!exchange.is_pending("id-1"));
    assert_eq!(exchange.take_result("id-1").unwrap(), "resp-A");

    // Taken exactly once
    assert!(exchange.is_pending("id-1"));
    assert!(matches!(
        exchange.take_result("id-1"),
        Err(MuxDemuxError::ResultNotFound { .. })
    ));

    manager.shutdown().await.unwrap();
}

// Test that 100 submitters each get their own answer back regardless of the
// order in which workers publish
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_submitters_get_their_own_results() {
    init_tracing();
    let manager = MuxDemuxManager::<Value>::start(test_config()).unwrap();
    let exchange = manager.exchange();

    let identifiers: Vec<String> = (0..100).map(|_| uuid::Uuid::new_v4().to_string()).collect();
    for (n, identifier) in identifiers.iter().enumerate() {
        exchange.submit(identifier.clone(), json!({ "n": n })).unwrap();
    }

    // Pull everything, then answer in shuffled order from several tasks
    let mut requests = Vec::new();
    while let Some(record) = exchange.try_take_outbound() {
        requests.push(record);
    }
    assert_eq!(requests.len(), 100);
    fastrand::shuffle(&mut requests);

    let publishers = requests.chunks(25).map(|chunk| {
        let exchange = Arc::clone(&exchange);
        let chunk = chunk.to_vec();
        tokio::spawn(async move {
            for record in chunk {
                let (identifier, payload) = record.into_parts();
                let answer = json!({ "echo": payload["n"] });
                exchange
                    .publish(CorrelationRecord::new(identifier, answer))
                    .unwrap();
                tokio::task::yield_now().await;
            }
        })
    });
    for joined in join_all(publishers.collect::<Vec<_>>()).await {
        joined.unwrap();
    }

    let waiters = identifiers.iter().enumerate().map(|(n, identifier)| {
        let exchange = Arc::clone(&exchange);
        let identifier = identifier.clone();
        async move {
            let result = exchange.wait_result(&identifier).await.unwrap();
            (n, result)
        }
    });
    for (n, result) in join_all(waiters).await {
        assert_eq!(result, json!({ "echo": n }));
    }

    let stats = exchange.stats();
    assert_eq!(stats.submitted, 100);
    assert_eq!(stats.routed, 100);
    assert_eq!(stats.retrieved, 100);
    assert_eq!(stats.results_held, 0);

    manager.shutdown().await.unwrap();
}

// Test several workers blocking on the outbound queue at once
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_workers_share_outbound_queue() {
    init_tracing();
    let manager = MuxDemuxManager::<String>::start(test_config()).unwrap();
    let exchange = manager.exchange();

    let workers: Vec<_> = (0..4)
        .map(|worker| {
            let exchange = Arc::clone(&exchange);
            tokio::spawn(async move {
                let mut handled = Vec::new();
                for _ in 0..10 {
                    let record = exchange.take_outbound().await.unwrap();
                    let reply = format!("{}:{}", worker, record.payload());
                    handled.push(record.identifier().to_string());
                    exchange
                        .publish(CorrelationRecord::new(record.identifier(), reply))
                        .unwrap();
                }
                handled
            })
        })
        .collect();

    for n in 0..40 {
        exchange.submit(format!("job-{}", n), format!("payload-{}", n)).unwrap();
    }

    let mut seen = HashSet::new();
    for worker in join_all(workers).await {
        for identifier in worker.unwrap() {
            assert!(seen.insert(identifier), "record delivered to two workers");
        }
    }
    assert_eq!(seen.len(), 40);

    for n in 0..40 {
        let identifier = format!("job-{}", n);
        let result = exchange.wait_result(&identifier).await.unwrap();
        assert!(result.ends_with(&format!(":payload-{}", n)));
    }

    manager.shutdown().await.unwrap();
}

// Test that a shut-down bridge stops routing and does not crash its callers
#[tokio::test]
async fn test_shutdown_stops_routing() {
    init_tracing();
    let manager = MuxDemuxManager::<String>::start(test_config()).unwrap();
    let exchange = manager.exchange();
    assert_eq!(manager.router_state(), RouterState::Running);

    let report = manager.shutdown().await.unwrap();
    assert_eq!(report.total(), 0);

    assert!(exchange.submit("late", "req".to_string()).is_err());
    assert!(exchange.publish(CorrelationRecord::new("late", "resp".to_string())).is_err());
    assert!(exchange.take_outbound().await.is_err());
    assert!(exchange.is_pending("late"));
}

// Test waiting on a result that no worker ever produces
#[tokio::test]
async fn test_wait_result_times_out_without_worker() {
    init_tracing();
    let config = test_config().with_result_timeout(Duration::from_millis(50));
    let manager = MuxDemuxManager::<String>::start(config).unwrap();
    let exchange = manager.exchange();

    exchange.submit("orphan", "req".to_string()).unwrap();
    let err = exchange.wait_result("orphan").await.unwrap_err();

    assert!(matches!(err, MuxDemuxError::Timeout { .. }));
    assert!(err.is_recoverable());

    let report = manager.shutdown().await.unwrap();
    assert_eq!(report.discarded_from(muxbridge::OUTBOUND_QUEUE), 1);
}

// Test loading the bridge configuration from YAML
#[tokio::test]
async fn test_start_from_yaml_config() {
    let config = MuxDemuxConfig::from_yaml_str(
        "poll_interval_ms: 1\nresult_timeout_ms: 1000\nrouter_name: yaml-router\n",
    )
    .unwrap();
    let manager = MuxDemuxManager::<String>::start(config).unwrap();
    assert_eq!(manager.config().router_name, "yaml-router");

    let exchange = manager.exchange();
    exchange.submit("cfg", "ping".to_string()).unwrap();
    let request = exchange.take_outbound().await.unwrap();
    exchange
        .publish(CorrelationRecord::new(request.identifier(), "pong".to_string()))
        .unwrap();
    assert_eq!(exchange.wait_result("cfg").await.unwrap(), "pong");

    manager.shutdown().await.unwrap();
}
