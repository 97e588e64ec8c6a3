use crate::harness::Responder;
use crate::harness::Script;
use crate::harness::TestHost;
use crate::harness::full_capabilities;
use crate::harness::publish;
use pretty_assertions::assert_eq;
use quorum_lsp::CapabilityFilter;
use quorum_lsp::OperationKind;
use std::time::Duration;

#[tokio::test]
async fn closing_a_document_cancels_requests_and_clears_its_state() {
    let host = TestHost::new();
    let server = host.start_server("analyzer", full_capabilities()).await;
    let document = host.open("main.rs", &[&server]).await;

    host.manager
        .diagnostics_published(&server, publish(&document, &["unused variable"]))
        .await;
    assert_eq!(host.manager.diagnostics().merged(&document).await.len(), 1);

    let pending = {
        let manager = host.manager.clone();
        let document = document.clone();
        tokio::spawn(async move {
            manager
                .request(
                    &document,
                    OperationKind::Hover,
                    CapabilityFilter::hover(),
                    |_| async {
                        tokio::time::sleep(Duration::from_secs(3600)).await;
                        Ok::<_, String>("never".to_string())
                    },
                )
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    host.manager.document_closed(&document).await;

    assert!(pending.await.unwrap().unwrap_err().is_cancellation());
    assert!(host.manager.diagnostics().merged(&document).await.is_empty());
    assert!(
        host.manager
            .registry()
            .bound_servers(&document)
            .await
            .is_empty()
    );
}

#[tokio::test]
async fn a_stopped_server_leaves_no_trace() {
    let host = TestHost::new();
    let keeper = host.start_server("keeper", full_capabilities()).await;
    let leaver = host.start_server("leaver", full_capabilities()).await;
    let document = host.open("main.rs", &[&keeper, &leaver]).await;

    host.manager
        .diagnostics_published(&keeper, publish(&document, &["from keeper"]))
        .await;
    host.manager
        .diagnostics_published(&leaver, publish(&document, &["from leaver"]))
        .await;

    host.manager.server_stopped(&leaver).await;

    let merged = host.manager.diagnostics().merged(&document).await;
    assert_eq!(merged.len(), 1);
    assert_eq!(merged[0].message, "from keeper");

    let responder = Responder::new();
    responder.script(&keeper, Script::reply("still here"));
    let collected = host
        .manager
        .request(
            &document,
            OperationKind::Hover,
            CapabilityFilter::hover(),
            responder.request_fn(),
        )
        .await
        .unwrap();

    assert_eq!(collected.summary.dispatched, 1);
    assert_eq!(responder.asked(), vec![keeper]);
}

#[tokio::test]
async fn republishing_replaces_only_that_servers_diagnostics() {
    let host = TestHost::new();
    let noisy = host.start_server("noisy", full_capabilities()).await;
    let steady = host.start_server("steady", full_capabilities()).await;
    let document = host.open("main.rs", &[&noisy, &steady]).await;

    host.manager
        .diagnostics_published(&noisy, publish(&document, &["one", "two"]))
        .await;
    host.manager
        .diagnostics_published(&steady, publish(&document, &["three"]))
        .await;
    assert_eq!(host.manager.diagnostics().merged(&document).await.len(), 3);

    host.manager
        .diagnostics_published(&noisy, publish(&document, &["four"]))
        .await;

    let per_server = host.manager.diagnostics().document(&document).await;
    let noisy_entry = per_server
        .iter()
        .find(|entry| entry.server == noisy)
        .unwrap();
    assert_eq!(noisy_entry.diagnostics.len(), 1);
    assert_eq!(noisy_entry.diagnostics[0].message, "four");
    let steady_entry = per_server
        .iter()
        .find(|entry| entry.server == steady)
        .unwrap();
    assert_eq!(steady_entry.diagnostics[0].message, "three");
}

#[tokio::test]
async fn a_server_joins_dispatch_only_after_it_initialized() {
    let host = TestHost::new();
    let warming = host.start_initializing_server("slowboot").await;
    let document = host.open("main.rs", &[&warming]).await;

    let responder = Responder::new();
    responder.script(&warming, Script::reply("ready"));

    // Still initializing: nothing to dispatch to, which is a success with
    // zero results rather than an error.
    let empty = host
        .manager
        .request(
            &document,
            OperationKind::Hover,
            CapabilityFilter::hover(),
            responder.request_fn(),
        )
        .await
        .unwrap();
    assert!(empty.results.is_empty());
    assert_eq!(empty.summary.dispatched, 0);
    assert_eq!(responder.times_asked(&warming), 0);

    host.manager
        .server_initialized(&warming, full_capabilities())
        .await;

    let after = host
        .manager
        .request(
            &document,
            OperationKind::Hover,
            CapabilityFilter::hover(),
            responder.request_fn(),
        )
        .await
        .unwrap();
    assert_eq!(after.results.len(), 1);
    assert_eq!(after.results[0].1, "ready");
}

#[tokio::test]
async fn an_edit_invalidates_only_that_document() {
    let host = TestHost::new();
    let server = host.start_server("analyzer", full_capabilities()).await;
    let edited = host.open("edited.rs", &[&server]).await;
    let untouched = host.open("untouched.rs", &[&server]).await;

    let on_edited = {
        let manager = host.manager.clone();
        let document = edited.clone();
        tokio::spawn(async move {
            manager
                .request(
                    &document,
                    OperationKind::Hover,
                    CapabilityFilter::hover(),
                    |_| async {
                        tokio::time::sleep(Duration::from_secs(3600)).await;
                        Ok::<_, String>("never".to_string())
                    },
                )
                .await
        })
    };
    let on_untouched = {
        let manager = host.manager.clone();
        let document = untouched.clone();
        tokio::spawn(async move {
            manager
                .request(
                    &document,
                    OperationKind::Hover,
                    CapabilityFilter::hover(),
                    |_| async {
                        tokio::time::sleep(Duration::from_millis(200)).await;
                        Ok::<_, String>("survived".to_string())
                    },
                )
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    host.manager.document_edited(&edited);

    assert!(on_edited.await.unwrap().unwrap_err().is_cancellation());
    let survived = on_untouched.await.unwrap().unwrap();
    assert_eq!(survived.results[0].1, "survived");
}
