mod common;

use common::Harness;
use rentmesh::domain::money::Money;
use rentmesh::domain::order::{OrderStatus, SettlementOutcome};
use rentmesh::domain::party::UserId;
use rentmesh::domain::ports::OrderStore;
use rentmesh::infrastructure::recording::PaymentCall;

async fn two_vendor_checkout(h: &Harness) -> (u64, u64) {
    h.vendor("v1").await;
    h.vendor("v2").await;
    h.buyer("b1").await;
    h.product("a", "v1", 50).await;
    h.product("b", "v2", 30).await;
    h.add("b1", "a", 7).await;
    h.add("b1", "b", 3).await;

    let numbers = h.checkout("b1", 20).await;
    assert_eq!(numbers.len(), 2);
    (numbers[0], numbers[1])
}

#[tokio::test]
async fn test_checkout_splits_one_authorization_across_vendors() {
    let h = Harness::new();
    let (first, second) = two_vendor_checkout(&h).await;

    let v1 = h.store.order(first).await.unwrap().unwrap();
    let v2 = h.store.order(second).await.unwrap().unwrap();
    assert_eq!((v1.vendor.as_str(), v1.duration_days), ("v1", 7));
    assert_eq!((v1.price, v1.shipping), (Money::from(50), Money::from(10)));
    assert_eq!((v2.vendor.as_str(), v2.duration_days), ("v2", 3));
    assert_eq!((v2.price, v2.shipping), (Money::from(30), Money::from(10)));
    assert_eq!(v1.buyer_order_id, v2.buyer_order_id);
    assert_eq!(v1.status, OrderStatus::NewOrder);

    let parent = h.store.buyer_order(v1.buyer_order_id).await.unwrap().unwrap();
    assert_eq!(parent.price, Money::from(100));
    assert!(!parent.is_settled());
    assert_eq!(
        h.gateway.calls(),
        vec![PaymentCall::Authorize {
            payment_ref: parent.payment_ref.clone(),
            amount: Money::from(100),
        }]
    );

    // Both vendors hear about their order; the cart is gone.
    assert_eq!(h.sink.delivered().len(), 2);
    let cart = h.market.carts.cart(&UserId::from("b1")).await.unwrap();
    assert!(cart.lines.is_empty());
}

#[tokio::test]
async fn test_ship_then_reject_captures_only_the_shipped_share() {
    let h = Harness::new();
    let (first, second) = two_vendor_checkout(&h).await;
    let lifecycle = &h.market.lifecycle;

    lifecycle
        .ship(&UserId::from("v1"), first, "TRK-1")
        .await
        .unwrap();
    assert!(h.gateway.settlement_calls().is_empty());

    lifecycle
        .reject(&UserId::from("v2"), second, Some("out of stock".into()))
        .await
        .unwrap();

    let order = h.store.order(first).await.unwrap().unwrap();
    let parent = h.store.buyer_order(order.buyer_order_id).await.unwrap().unwrap();
    assert_eq!(
        parent.settlement,
        Some(SettlementOutcome::PartiallyCaptured(Money::from(60)))
    );
    assert!(parent.paid);
    assert_eq!(
        h.gateway.settlement_calls(),
        vec![PaymentCall::Capture {
            payment_ref: parent.payment_ref,
            amount: Money::from(60),
        }]
    );

    // The rejected product is back on the shelf.
    h.add("b1", "b", 2).await;
}

#[tokio::test]
async fn test_settle_twice_captures_once() {
    let h = Harness::new();
    let (first, second) = two_vendor_checkout(&h).await;
    let lifecycle = &h.market.lifecycle;

    lifecycle.ship(&UserId::from("v1"), first, "TRK-1").await.unwrap();
    lifecycle.ship(&UserId::from("v2"), second, "TRK-2").await.unwrap();

    let parent_id = h.store.order(first).await.unwrap().unwrap().buyer_order_id;
    let again = h.market.settlement.settle(parent_id).await.unwrap();
    let and_again = h.market.settlement.settle(parent_id).await.unwrap();

    assert_eq!(again, Some(SettlementOutcome::Captured(Money::from(100))));
    assert_eq!(again, and_again);
    assert_eq!(h.gateway.settlement_calls().len(), 1);
}

#[tokio::test]
async fn test_settle_is_a_no_op_while_a_vendor_is_deciding() {
    let h = Harness::new();
    let (first, _) = two_vendor_checkout(&h).await;

    let parent_id = h.store.order(first).await.unwrap().unwrap().buyer_order_id;
    assert_eq!(h.market.settlement.settle(parent_id).await.unwrap(), None);
    assert!(h.gateway.settlement_calls().is_empty());
}

#[tokio::test]
async fn test_all_rejected_releases_the_authorization() {
    let h = Harness::new();
    let (first, second) = two_vendor_checkout(&h).await;
    let lifecycle = &h.market.lifecycle;

    lifecycle.reject(&UserId::from("v1"), first, None).await.unwrap();
    lifecycle.reject(&UserId::from("b1"), second, None).await.unwrap();

    let parent_id = h.store.order(first).await.unwrap().unwrap().buyer_order_id;
    let parent = h.store.buyer_order(parent_id).await.unwrap().unwrap();
    assert_eq!(parent.settlement, Some(SettlementOutcome::Released));
    assert!(!parent.paid);
    assert!(matches!(
        h.gateway.settlement_calls().as_slice(),
        [PaymentCall::Release { .. }]
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_ship_and_reject_settle_exactly_once() {
    for _ in 0..25 {
        let h = Harness::new();
        let (first, second) = two_vendor_checkout(&h).await;

        let market = h.market.clone();
        let ship = tokio::spawn(async move {
            market
                .lifecycle
                .ship(&UserId::from("v1"), first, "TRK-1")
                .await
        });
        let market = h.market.clone();
        let reject = tokio::spawn(async move {
            market
                .lifecycle
                .reject(&UserId::from("v2"), second, None)
                .await
        });
        ship.await.unwrap().unwrap();
        reject.await.unwrap().unwrap();

        let order = h.store.order(first).await.unwrap().unwrap();
        let parent = h.store.buyer_order(order.buyer_order_id).await.unwrap().unwrap();
        assert_eq!(
            parent.settlement,
            Some(SettlementOutcome::PartiallyCaptured(Money::from(60)))
        );
        assert_eq!(
            h.gateway.settlement_calls(),
            vec![PaymentCall::Capture {
                payment_ref: parent.payment_ref,
                amount: Money::from(60),
            }]
        );
    }
}
