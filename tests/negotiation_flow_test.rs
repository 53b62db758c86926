mod common;

use common::*;
use smartnego::domain::{DraftState, DraftingOutcome, ItemStatus, MessageId, NegotiationError};
use smartnego::negotiation::NegotiationEngine;
use std::sync::Arc;

async fn drafted(engine: &NegotiationEngine, content: &str) -> MessageId {
    match engine.append(ITEM, BUYER, content, None).await.unwrap().drafting {
        DraftingOutcome::Drafted { draft_id } => draft_id,
        other => panic!("expected a draft, got {:?}", other),
    }
}

#[tokio::test]
async fn test_retry_then_approve_scenario() {
    let agent = Arc::new(ScriptedAgent::new(&[7_500, 8_500]));
    let engine = engine(agent.clone(), listing(10_000, Some(8_000))).await;

    let first = drafted(&engine, "Can you do ¥7000?").await;
    let seller_view = engine.view(ITEM, SELLER).await.unwrap();
    let draft = seller_view.messages.iter().find(|m| m.id == first).unwrap();
    assert_eq!(draft.suggested_price, Some(7_500));
    assert!(draft.ai_reasoning.is_some());

    let revised = engine
        .retry(ITEM, SELLER, Some("hold firmer"))
        .await
        .unwrap();
    assert_eq!(revised.superseded, vec![first]);
    assert_eq!(revised.draft.suggested_price, Some(8_500));
    assert_eq!(ids_in_state(&engine, DraftState::Superseded).await, vec![first]);
    assert_eq!(
        agent.instructions(),
        vec![None, Some("hold firmer".to_string())]
    );

    let approved = engine.approve(revised.draft.id, SELLER).await.unwrap();
    assert_eq!(approved.message.draft_state, Some(DraftState::Approved));
    assert_eq!(approved.item.price, 8_500);

    let buyer_view = engine.view(ITEM, BUYER).await.unwrap();
    assert_eq!(buyer_view.item.price, 8_500);
    let reply = buyer_view
        .messages
        .iter()
        .find(|m| m.id == revised.draft.id)
        .unwrap();
    assert!(reply.is_approved);
    assert!(reply.ai_reasoning.is_none());
}

#[tokio::test]
async fn test_approve_below_minimum_changes_nothing() {
    let engine = engine(
        Arc::new(ScriptedAgent::new(&[7_000])),
        listing(10_000, Some(8_000)),
    )
    .await;
    let draft_id = drafted(&engine, "¥7000, final offer").await;

    let result = engine.approve(draft_id, SELLER).await;
    assert!(matches!(result, Err(NegotiationError::InvalidPrice(_))));

    let view = engine.view(ITEM, SELLER).await.unwrap();
    assert_eq!(view.item.price, 10_000);
    assert_eq!(view.can.resolve_draft, Some(draft_id));
    assert_eq!(ids_in_state(&engine, DraftState::Draft).await, vec![draft_id]);
}

#[tokio::test]
async fn test_sold_between_retry_and_approve() {
    let engine = engine(
        Arc::new(ScriptedAgent::new(&[9_000, 9_200])),
        listing(10_000, Some(8_000)),
    )
    .await;
    drafted(&engine, "9000?").await;
    let revised = engine.retry(ITEM, SELLER, Some("a bit more")).await.unwrap();

    let sold = engine.purchase(ITEM, "other-buyer", None).await.unwrap();
    assert_eq!(sold.status, ItemStatus::Sold);

    let result = engine.approve(revised.draft.id, SELLER).await;
    assert!(matches!(result, Err(NegotiationError::ItemNotAvailable(_))));

    let view = engine.view(ITEM, BUYER).await.unwrap();
    assert_eq!(view.item.price, 10_000);
    assert_eq!(view.item.status, ItemStatus::Sold);
}

#[tokio::test]
async fn test_non_seller_transitions_are_no_ops() {
    let engine = engine(
        Arc::new(ScriptedAgent::new(&[9_000, 9_100])),
        listing(10_000, Some(8_000)),
    )
    .await;
    let draft_id = drafted(&engine, "9000?").await;
    let before = engine.view(ITEM, SELLER).await.unwrap();

    for actor in [BUYER, "stranger"] {
        assert!(matches!(
            engine.approve(draft_id, actor).await,
            Err(NegotiationError::Unauthorized(_))
        ));
        assert!(matches!(
            engine.reject(draft_id, actor).await,
            Err(NegotiationError::Unauthorized(_))
        ));
        assert!(matches!(
            engine.retry(ITEM, actor, Some("lower")).await,
            Err(NegotiationError::Unauthorized(_))
        ));
        assert!(matches!(
            engine.apply_price(ITEM, 9_000, actor).await,
            Err(NegotiationError::Unauthorized(_))
        ));
    }

    let after = engine.view(ITEM, SELLER).await.unwrap();
    assert_eq!(after.revision, before.revision);
    assert_eq!(after.item.price, 10_000);
    assert_eq!(after.can.resolve_draft, Some(draft_id));
}

#[tokio::test]
async fn test_append_then_list_round_trip() {
    let engine = engine(
        Arc::new(ScriptedAgent::new(&[])),
        listing(10_000, None),
    )
    .await;
    engine.configure_negotiation(ITEM, SELLER, false, None).await.unwrap();

    let mut ids = Vec::new();
    for (sender, text) in [(BUYER, "hi"), (SELLER, "hello"), (BUYER, "still available?")] {
        ids.push(engine.append(ITEM, sender, text, None).await.unwrap().message.id);
    }

    let listed = engine.list(ITEM, BUYER).await.unwrap();
    let listed_ids: Vec<MessageId> = listed.iter().map(|m| m.id).collect();
    assert_eq!(listed_ids, ids);
    assert!(listed.windows(2).all(|w| (w[0].created_at, w[0].seq) < (w[1].created_at, w[1].seq)));
}

#[tokio::test]
async fn test_request_id_deduplicates_append() {
    let agent = Arc::new(ScriptedAgent::new(&[9_000, 8_800]));
    let engine = engine(agent.clone(), listing(10_000, Some(8_000))).await;

    let first = engine
        .append(ITEM, BUYER, "9000?", Some("req-1".to_string()))
        .await
        .unwrap();
    let again = engine
        .append(ITEM, BUYER, "9000?", Some("req-1".to_string()))
        .await
        .unwrap();

    assert!(!first.duplicate);
    assert!(again.duplicate);
    assert_eq!(again.message.id, first.message.id);
    assert_eq!(again.drafting, DraftingOutcome::NotApplicable);
    assert_eq!(agent.requests.lock().unwrap().len(), 1);
    assert_eq!(engine.list(ITEM, BUYER).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_agent_timeout_keeps_draft_slot() {
    let engine = engine(Arc::new(StalledAgent), listing(10_000, Some(8_000))).await;

    let outcome = engine.append(ITEM, BUYER, "9000?", None).await.unwrap();
    assert!(matches!(
        outcome.drafting,
        DraftingOutcome::AgentUnavailable { .. }
    ));
    assert_eq!(engine.list(ITEM, SELLER).await.unwrap().len(), 1);

    let retry = engine.retry(ITEM, SELLER, None).await;
    assert!(matches!(retry, Err(NegotiationError::AgentUnavailable(_))));
    assert!(ids_in_state(&engine, DraftState::Draft).await.is_empty());
}

#[tokio::test]
async fn test_retry_requires_enabled_negotiation() {
    let engine = engine(
        Arc::new(ScriptedAgent::new(&[9_000])),
        listing(10_000, Some(8_000)),
    )
    .await;
    drafted(&engine, "9000?").await;
    engine.configure_negotiation(ITEM, SELLER, false, Some(8_000)).await.unwrap();

    let result = engine.retry(ITEM, SELLER, Some("lower")).await;
    assert!(matches!(result, Err(NegotiationError::NoActiveNegotiation(_))));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stale_triggered_draft_is_skipped() {
    let agent = Arc::new(GatedAgent::default());
    let engine = engine(agent.clone(), listing(10_000, Some(8_000))).await;

    let slow = tokio::spawn({
        let engine = engine.clone();
        async move { engine.append(ITEM, BUYER, "first offer", None).await }
    });
    agent.entered.notified().await;

    let newer = engine
        .append(ITEM, "buyer-2", "second offer", None)
        .await
        .unwrap();
    let DraftingOutcome::Drafted { draft_id } = newer.drafting else {
        panic!("expected the newer message to be drafted");
    };

    agent.release.notify_one();
    let stale = slow.await.unwrap().unwrap();
    assert!(matches!(stale.drafting, DraftingOutcome::Skipped { .. }));
    assert_eq!(ids_in_state(&engine, DraftState::Draft).await, vec![draft_id]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_newer_message_draft_supersedes_earlier_install() {
    let agent = Arc::new(SequencedAgent::new(2));
    let engine = engine(agent.clone(), listing(10_000, Some(8_000))).await;

    let first = tokio::spawn({
        let engine = engine.clone();
        async move { engine.append(ITEM, BUYER, "first offer", None).await }
    });
    agent.entered[0].notified().await;

    let second = tokio::spawn({
        let engine = engine.clone();
        async move { engine.append(ITEM, BUYER, "second, newer offer", None).await }
    });
    agent.entered[1].notified().await;

    agent.gates[0].notify_one();
    let first = first.await.unwrap().unwrap();
    let DraftingOutcome::Drafted { draft_id: older } = first.drafting else {
        panic!("expected the first message to be drafted, got {:?}", first.drafting);
    };

    agent.gates[1].notify_one();
    let second = second.await.unwrap().unwrap();
    let DraftingOutcome::Drafted { draft_id: newer } = second.drafting else {
        panic!("expected the newer message to be drafted, got {:?}", second.drafting);
    };

    assert_eq!(ids_in_state(&engine, DraftState::Draft).await, vec![newer]);
    assert_eq!(ids_in_state(&engine, DraftState::Superseded).await, vec![older]);

    let messages = engine.list(ITEM, SELLER).await.unwrap();
    let draft = messages.iter().find(|m| m.id == newer).unwrap();
    assert_eq!(draft.content, "reply to second, newer offer");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_approvals_apply_price_once() {
    for _ in 0..20 {
        let engine = engine(
            Arc::new(ScriptedAgent::new(&[9_000])),
            listing(10_000, Some(8_000)),
        )
        .await;
        let draft_id = drafted(&engine, "9000?").await;
        let before = engine.view(ITEM, SELLER).await.unwrap().revision;

        let approvals: Vec<_> = (0..2)
            .map(|_| {
                let engine = engine.clone();
                tokio::spawn(async move { engine.approve(draft_id, SELLER).await })
            })
            .collect();
        let mut results = Vec::new();
        for approval in approvals {
            results.push(approval.await.unwrap());
        }

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1, "exactly one must win");
        let loser = results.iter().find_map(|r| r.as_ref().err()).unwrap();
        assert!(matches!(loser, NegotiationError::InvalidState(_)));

        let view = engine.view(ITEM, SELLER).await.unwrap();
        assert_eq!(view.item.price, 9_000);
        assert_eq!(view.revision, before + 1);
        assert_eq!(ids_in_state(&engine, DraftState::Approved).await, vec![draft_id]);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_approve_and_reject() {
    for _ in 0..20 {
        let engine = engine(
            Arc::new(ScriptedAgent::new(&[9_000])),
            listing(10_000, Some(8_000)),
        )
        .await;
        let draft_id = drafted(&engine, "9000?").await;

        let approve = tokio::spawn({
            let engine = engine.clone();
            async move { engine.approve(draft_id, SELLER).await }
        });
        let reject = tokio::spawn({
            let engine = engine.clone();
            async move { engine.reject(draft_id, SELLER).await }
        });
        let approve = approve.await.unwrap();
        let reject = reject.await.unwrap();

        assert!(approve.is_ok() != reject.is_ok(), "exactly one must win");
        let loser = approve.as_ref().err().or(reject.as_ref().err()).unwrap();
        assert!(matches!(loser, NegotiationError::InvalidState(_)));

        let view = engine.view(ITEM, SELLER).await.unwrap();
        if approve.is_ok() {
            assert_eq!(view.item.price, 9_000);
            assert_eq!(ids_in_state(&engine, DraftState::Approved).await, vec![draft_id]);
        } else {
            assert_eq!(view.item.price, 10_000);
            assert_eq!(ids_in_state(&engine, DraftState::Rejected).await, vec![draft_id]);
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_approve_and_purchase() {
    for _ in 0..20 {
        let engine = engine(
            Arc::new(ScriptedAgent::new(&[9_000])),
            listing(10_000, Some(8_000)),
        )
        .await;
        let draft_id = drafted(&engine, "9000?").await;

        let approve = tokio::spawn({
            let engine = engine.clone();
            async move { engine.approve(draft_id, SELLER).await }
        });
        let purchase = tokio::spawn({
            let engine = engine.clone();
            async move { engine.purchase(ITEM, "other-buyer", None).await }
        });
        let approve = approve.await.unwrap();
        let sold = purchase.await.unwrap().unwrap();

        match approve {
            Ok(outcome) => {
                assert_eq!(outcome.item.price, 9_000);
                assert_eq!(sold.price, 9_000);
            }
            Err(e) => {
                assert!(matches!(e, NegotiationError::ItemNotAvailable(_)));
                assert_eq!(sold.price, 10_000);
                assert_eq!(ids_in_state(&engine, DraftState::Draft).await, vec![draft_id]);
            }
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_at_most_one_draft_under_contention() {
    let prices: Vec<i64> = (0..64).map(|i| 9_000 + i).collect();
    let engine = engine(
        Arc::new(ScriptedAgent::new(&prices)),
        listing(10_000, Some(8_000)),
    )
    .await;

    let observer = tokio::spawn({
        let engine = engine.clone();
        async move {
            for _ in 0..200 {
                let view = engine.view(ITEM, SELLER).await.unwrap();
                let drafts = view
                    .messages
                    .iter()
                    .filter(|m| m.state == Some(DraftState::Draft))
                    .count();
                assert!(drafts <= 1, "observed {} drafts", drafts);
                tokio::task::yield_now().await;
            }
        }
    });

    let mut writers = Vec::new();
    for i in 0..16 {
        let engine = engine.clone();
        writers.push(tokio::spawn(async move {
            let buyer = format!("buyer-{}", i);
            engine.append(ITEM, &buyer, "9000?", None).await.unwrap();
            let _ = engine.retry(ITEM, SELLER, Some("hold")).await;
        }));
    }
    for writer in writers {
        writer.await.unwrap();
    }
    observer.await.unwrap();

    assert!(ids_in_state(&engine, DraftState::Draft).await.len() <= 1);
}
