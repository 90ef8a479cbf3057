use std::sync::Arc;
use std::time::Duration;

use voice_dialog::bridge::{
    run_bridged_call, BridgeEnd, BridgeOrchestrator, BridgeSettings, BridgedCallSettings,
    ControlPlane, EndpointDescriptor, InMemoryControlPlane, Subscription, LEG_APP_ARGS,
};
use voice_dialog::{CallToken, CancelReason};

const CALLER: &str = "caller-1";

fn settings(answer_timeout: Duration, leg_retries: u32) -> BridgedCallSettings {
    BridgedCallSettings {
        endpoint: EndpointDescriptor::new("audiosocket.voip", 8080),
        bridge: BridgeSettings {
            answer_timeout,
            leg_retries,
        },
        settle_delay: Duration::from_millis(10),
        max_call: Duration::from_secs(10),
    }
}

/// Wait until some bridge has exactly `count` members.
async fn wait_for_members(control: &InMemoryControlPlane, count: usize) -> String {
    for _ in 0..200 {
        for bridge in control.bridges() {
            if control.members(&bridge).len() == count {
                return bridge;
            }
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("no bridge reached {} members", count);
}

#[test]
fn test_dial_string() {
    let endpoint = EndpointDescriptor::new("audiosocket.voip", 8080);
    assert_eq!(
        endpoint.dial_string("1234"),
        "AudioSocket/audiosocket.voip:8080/1234"
    );
}

#[tokio::test]
async fn test_bridge_ends_when_leg_leaves_after_quorum() {
    let control = InMemoryControlPlane::new("audiosocket");
    let token = CallToken::new();
    let call = tokio::spawn({
        let control: Arc<dyn ControlPlane> = Arc::new(control.clone());
        let token = token.clone();
        async move { run_bridged_call(control, CALLER, &settings(Duration::from_secs(1), 0), &token).await }
    });

    let bridge = wait_for_members(&control, 2).await;
    let leg = control
        .members(&bridge)
        .into_iter()
        .find(|member| member != CALLER)
        .unwrap();
    control.hangup(&leg).await.unwrap();

    let end = call.await.unwrap().unwrap();
    assert_eq!(end, BridgeEnd::QuorumLost);
    assert_eq!(control.answered(), vec![CALLER.to_string()]);
    assert!(control.hung_up().contains(&CALLER.to_string()));
    assert!(control.members(&bridge).is_empty());
    assert_eq!(token.reason(), Some(CancelReason::Completed));

    let originated = control.originated();
    assert_eq!(originated.len(), 1);
    assert_eq!(originated[0].channel_id, leg);
    assert_eq!(originated[0].app_args, LEG_APP_ARGS);
    assert_eq!(originated[0].originator, CALLER);
    assert_eq!(originated[0].variables.get("AUDIOSOCKET_ID"), Some(&leg));
    assert_eq!(
        originated[0].endpoint,
        format!("AudioSocket/audiosocket.voip:8080/{}", leg)
    );
}

#[tokio::test]
async fn test_unanswered_leg_downgrades_until_caller_hangs_up() {
    let control = InMemoryControlPlane::new("audiosocket").without_leg_answer();
    let token = CallToken::new();
    let call = tokio::spawn({
        let control: Arc<dyn ControlPlane> = Arc::new(control.clone());
        let token = token.clone();
        async move {
            run_bridged_call(control, CALLER, &settings(Duration::from_millis(50), 0), &token).await
        }
    });

    let bridge = wait_for_members(&control, 1).await;
    tokio::time::sleep(Duration::from_millis(150)).await;

    // The unanswered leg was released; the caller stays bridged alone.
    let originated = control.originated();
    assert_eq!(originated.len(), 1);
    assert!(control.hung_up().contains(&originated[0].channel_id));
    assert_eq!(control.members(&bridge).len(), 1);
    assert!(!call.is_finished());

    control.hangup(CALLER).await.unwrap();

    let end = call.await.unwrap().unwrap();
    assert_eq!(end, BridgeEnd::Cancelled(CancelReason::Hangup));
}

#[tokio::test]
async fn test_unanswered_leg_is_retried() {
    let control = InMemoryControlPlane::new("audiosocket").without_leg_answer();
    let token = CallToken::new();
    let call = tokio::spawn({
        let control: Arc<dyn ControlPlane> = Arc::new(control.clone());
        let token = token.clone();
        async move {
            run_bridged_call(control, CALLER, &settings(Duration::from_millis(30), 2), &token).await
        }
    });

    tokio::time::sleep(Duration::from_millis(250)).await;
    token.cancel(CancelReason::Shutdown);

    let end = call.await.unwrap().unwrap();
    assert_eq!(end, BridgeEnd::Cancelled(CancelReason::Shutdown));

    let originated = control.originated();
    assert_eq!(originated.len(), 3);
    let hung_up = control.hung_up();
    for leg in &originated {
        assert!(hung_up.contains(&leg.channel_id));
    }
    assert_ne!(originated[0].channel_id, originated[1].channel_id);
}

#[tokio::test]
async fn test_deadline_ends_bridged_call() {
    let control = InMemoryControlPlane::new("audiosocket");
    let token = CallToken::new();
    let mut settings = settings(Duration::from_secs(1), 0);
    settings.max_call = Duration::from_millis(200);

    let end = run_bridged_call(Arc::new(control.clone()), CALLER, &settings, &token)
        .await
        .unwrap();

    assert_eq!(end, BridgeEnd::Cancelled(CancelReason::Deadline));
    assert!(control.hung_up().contains(&CALLER.to_string()));
    // Teardown hangs up the attached leg as well.
    assert_eq!(control.hung_up().len(), 2);
}

#[tokio::test]
async fn test_leg_joins_exactly_once() {
    let control = InMemoryControlPlane::new("audiosocket");
    let orchestrator = BridgeOrchestrator::new(
        Arc::new(control.clone()),
        BridgeSettings::default(),
    );
    let token = CallToken::new();

    let mut session = orchestrator
        .establish(&token, CALLER, &EndpointDescriptor::new("localhost", 8080))
        .await
        .unwrap();

    let first = session.next_snapshot().await.unwrap();
    assert_eq!(first.members.len(), 1);
    assert!(!first.has_quorum());

    let second = session.next_snapshot().await.unwrap();
    assert!(second.has_quorum());
    assert!(session.quorum_achieved());
    let leg = session.leg_id().unwrap();
    assert!(second.members.contains(&leg));
    assert_eq!(control.originated().len(), 1);

    session.teardown().await;
}

#[tokio::test]
async fn test_teardown_is_idempotent() {
    let control = InMemoryControlPlane::new("audiosocket");
    let orchestrator = BridgeOrchestrator::new(
        Arc::new(control.clone()),
        BridgeSettings::default(),
    );
    let token = CallToken::new();

    let mut session = orchestrator
        .establish(&token, CALLER, &EndpointDescriptor::new("localhost", 8080))
        .await
        .unwrap();
    let bridge = session.bridge_id().to_string();
    wait_for_members(&control, 2).await;

    session.teardown().await;
    assert!(control.members(&bridge).is_empty());
    assert_eq!(control.hung_up().len(), 1);

    let mut events = control
        .subscribe(Subscription::BridgeMembership(bridge.clone()))
        .await
        .unwrap();
    session.teardown().await;
    drop(session);
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(events.try_recv().is_err());
    assert_eq!(control.hung_up().len(), 1);
}

#[tokio::test]
async fn test_dropped_session_cleans_up() {
    let control = InMemoryControlPlane::new("audiosocket");
    let orchestrator = BridgeOrchestrator::new(
        Arc::new(control.clone()),
        BridgeSettings::default(),
    );
    let token = CallToken::new();

    let session = orchestrator
        .establish(&token, CALLER, &EndpointDescriptor::new("localhost", 8080))
        .await
        .unwrap();
    let bridge = session.bridge_id().to_string();
    wait_for_members(&control, 2).await;

    drop(session);
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(control.members(&bridge).is_empty());
    assert_eq!(control.hung_up().len(), 1);
}

#[tokio::test]
async fn test_cancelled_call_never_bridges() {
    let control = InMemoryControlPlane::new("audiosocket");
    let token = CallToken::new();
    token.cancel(CancelReason::Shutdown);

    let end = run_bridged_call(
        Arc::new(control.clone()),
        CALLER,
        &settings(Duration::from_secs(1), 0),
        &token,
    )
    .await
    .unwrap();

    assert_eq!(end, BridgeEnd::Cancelled(CancelReason::Shutdown));
    assert!(control.bridges().is_empty());
    assert!(control.originated().is_empty());
    assert!(control.hung_up().contains(&CALLER.to_string()));
}
