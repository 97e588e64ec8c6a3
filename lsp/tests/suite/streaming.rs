use crate::harness::Responder;
use crate::harness::Script;
use crate::harness::doc;
use crate::harness::full_capabilities;
use pretty_assertions::assert_eq;
use quorum_lsp::CapabilityFilter;
use quorum_lsp::LifecycleConfig;
use quorum_lsp::LifecycleError;
use quorum_lsp::MultiServerDispatcher;
use quorum_lsp::ServerId;
use quorum_lsp::ServerRegistry;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

async fn dispatcher_with_servers(names: &[&str]) -> (MultiServerDispatcher, lsp_types::Uri) {
    let registry = ServerRegistry::new();
    let document = doc("main.rs");
    for name in names {
        let id = ServerId::from(*name);
        registry.register_server(id.clone(), *name).await;
        registry.set_capabilities(&id, full_capabilities()).await;
        registry.bind(&document, id).await;
    }
    (
        MultiServerDispatcher::new(registry, LifecycleConfig::default()),
        document,
    )
}

#[tokio::test]
async fn results_arrive_in_completion_order_not_registration_order() {
    let (dispatcher, document) = dispatcher_with_servers(&["slow", "quick"]).await;
    let responder = Responder::new();
    responder.script(&ServerId::from("slow"), Script::reply_after(80, "slow answer"));
    responder.script(&ServerId::from("quick"), Script::reply_after(10, "quick answer"));

    let handle = dispatcher
        .dispatch(&document, &CapabilityFilter::any(), responder.request_fn())
        .await;

    let token = CancellationToken::new();
    let mut order = Vec::new();
    let summary = handle
        .drain(&token, || false, |_, payload| order.push(payload))
        .await
        .unwrap();

    assert_eq!(order, vec!["quick answer", "slow answer"]);
    assert_eq!(summary.dispatched, 2);
    assert_eq!(summary.delivered, 2);
    assert!(summary.failures.is_empty());
}

#[tokio::test]
async fn a_document_change_mid_stream_drops_the_remaining_results() {
    let (dispatcher, document) = dispatcher_with_servers(&["quick", "slow"]).await;
    let responder = Responder::new();
    responder.script(&ServerId::from("quick"), Script::reply_after(10, "delivered"));
    responder.script(&ServerId::from("slow"), Script::reply_after(400, "too late"));

    let handle = dispatcher
        .dispatch(&document, &CapabilityFilter::any(), responder.request_fn())
        .await;

    // The document counts as changed as soon as the first result lands.
    let token = CancellationToken::new();
    let seen: Arc<Mutex<Vec<String>>> = Arc::default();
    let seen_by_stale_check = Arc::clone(&seen);
    let seen_by_items = Arc::clone(&seen);
    let err = handle
        .drain(
            &token,
            move || !seen_by_stale_check.lock().unwrap().is_empty(),
            move |_, payload| seen_by_items.lock().unwrap().push(payload),
        )
        .await
        .unwrap_err();

    assert_eq!(err, LifecycleError::Superseded);
    assert_eq!(*seen.lock().unwrap(), vec!["delivered".to_string()]);
}

#[tokio::test]
async fn buffered_results_of_a_cancelled_dispatch_never_reach_the_consumer() {
    let (dispatcher, document) = dispatcher_with_servers(&["eager"]).await;
    let responder = Responder::new();
    responder.script(&ServerId::from("eager"), Script::reply("buffered"));

    let handle = dispatcher
        .dispatch(&document, &CapabilityFilter::any(), responder.request_fn())
        .await;

    // Let the result land in the queue before anyone consumes it.
    tokio::time::sleep(Duration::from_millis(100)).await;
    handle.cancel();

    let token = CancellationToken::new();
    let summary = handle
        .drain(&token, || false, |_, payload: String| {
            panic!("cancelled result was delivered: {payload}")
        })
        .await
        .unwrap();

    assert_eq!(summary.delivered, 0);
    assert_eq!(summary.skipped, 1);
}

#[tokio::test]
async fn an_external_cancel_ends_the_drain_and_the_request_tree() {
    let (dispatcher, document) = dispatcher_with_servers(&["stuck"]).await;
    let responder = Responder::new();
    responder.script(&ServerId::from("stuck"), Script::Hang);

    let handle = dispatcher
        .dispatch(&document, &CapabilityFilter::any(), responder.request_fn())
        .await;
    let tree = handle.cancel_handle().clone();

    let token = CancellationToken::new();
    {
        let token = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            token.cancel();
        });
    }

    let err = handle
        .drain(&token, || false, |_, _: String| {})
        .await
        .unwrap_err();

    assert_eq!(err, LifecycleError::Cancelled);
    assert!(tree.is_cancelled());
}

#[tokio::test]
async fn a_slow_consumer_still_receives_every_result() {
    let (dispatcher, document) = dispatcher_with_servers(&["a", "b", "c"]).await;
    let responder = Responder::new();
    responder.script(&ServerId::from("a"), Script::reply("from a"));
    responder.script(&ServerId::from("b"), Script::reply("from b"));
    responder.script(&ServerId::from("c"), Script::reply("from c"));

    let handle = dispatcher
        .dispatch(&document, &CapabilityFilter::any(), responder.request_fn())
        .await;

    // Everything settles and buffers while the consumer is elsewhere.
    tokio::time::sleep(Duration::from_millis(150)).await;

    let token = CancellationToken::new();
    let mut payloads = Vec::new();
    let summary = handle
        .drain(&token, || false, |_, payload| payloads.push(payload))
        .await
        .unwrap();

    payloads.sort_unstable();
    assert_eq!(payloads, vec!["from a", "from b", "from c"]);
    assert_eq!(summary.delivered, 3);
    assert_eq!(summary.skipped, 0);
}
