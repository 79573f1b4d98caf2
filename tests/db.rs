//! Query-level tests: stock reservation, order transitions, subscribers,
//! webhook event bookkeeping.

mod common;

use common::*;

// ============ Sellers ============

#[test]
fn test_seller_api_key_lookup() {
    let pool = create_test_pool();
    let conn = pool.get().unwrap();
    let (seller, api_key) = create_test_seller(&conn, "Owner@Example.com");

    assert_eq!(seller.email, "owner@example.com");
    assert!(api_key.starts_with(&seller.api_key_prefix));

    let found = queries::get_seller_by_api_key(&conn, &api_key).unwrap();
    assert_eq!(found.map(|s| s.id), Some(seller.id));
    assert!(queries::get_seller_by_api_key(&conn, "rs_not_a_real_key").unwrap().is_none());
}

#[test]
fn test_duplicate_seller_email_conflicts() {
    let pool = create_test_pool();
    let conn = pool.get().unwrap();
    create_test_seller(&conn, "owner@example.com");

    let result = queries::create_seller(
        &conn,
        &CreateSeller {
            email: "OWNER@example.com".into(),
            name: "Again".into(),
        },
    );
    assert!(matches!(result, Err(AppError::Conflict(_))));
}

#[test]
fn test_stripe_customer_is_linked_once() {
    let pool = create_test_pool();
    let conn = pool.get().unwrap();
    let (seller, _) = create_test_seller(&conn, "owner@example.com");

    assert!(queries::set_seller_stripe_customer(&conn, &seller.id, "cus_first").unwrap());
    assert!(!queries::set_seller_stripe_customer(&conn, &seller.id, "cus_second").unwrap());

    let found = queries::get_seller_by_stripe_customer(&conn, "cus_first").unwrap();
    assert_eq!(found.map(|s| s.id), Some(seller.id));
}

// ============ Stock ============

#[test]
fn test_reserve_stock_never_goes_negative() {
    let pool = create_test_pool();
    let conn = pool.get().unwrap();
    let (seller, _) = create_test_seller(&conn, "owner@example.com");
    let replay = create_test_replay(&conn, &seller.id, "Drop", hours_from_now(1));
    let product = create_test_product(&conn, &replay, "Mug", 1500, 2);

    assert!(queries::reserve_stock(&conn, &product.id, 2).unwrap());
    assert!(!queries::reserve_stock(&conn, &product.id, 1).unwrap());
    assert_eq!(product_counts(&conn, &product.id), (0, 0));

    queries::release_stock(&conn, &product.id, 1).unwrap();
    assert_eq!(product_counts(&conn, &product.id), (1, 0));
}

#[test]
fn test_take_stock_clamped_reports_oversell() {
    let pool = create_test_pool();
    let conn = pool.get().unwrap();
    let (seller, _) = create_test_seller(&conn, "owner@example.com");
    let replay = create_test_replay(&conn, &seller.id, "Drop", hours_from_now(1));
    let product = create_test_product(&conn, &replay, "Mug", 1500, 1);

    let oversold = queries::take_stock_clamped(&conn, &product.id, 3).unwrap();
    assert_eq!(oversold, 2);
    assert_eq!(product_counts(&conn, &product.id).0, 0);
}

#[test]
fn test_deleted_product_cannot_be_reserved() {
    let pool = create_test_pool();
    let conn = pool.get().unwrap();
    let (seller, _) = create_test_seller(&conn, "owner@example.com");
    let replay = create_test_replay(&conn, &seller.id, "Drop", hours_from_now(1));
    let product = create_test_product(&conn, &replay, "Mug", 1500, 5);

    assert!(queries::soft_delete_product(&conn, &product.id).unwrap());
    assert!(!queries::reserve_stock(&conn, &product.id, 1).unwrap());
    assert!(queries::get_product_by_id(&conn, &product.id).unwrap().is_none());
    assert!(queries::get_product_including_deleted(&conn, &product.id).unwrap().is_some());
}

// ============ Orders ============

#[test]
fn test_pending_order_reserves_stock() {
    let pool = create_test_pool();
    let mut conn = pool.get().unwrap();
    let (seller, _) = create_test_seller(&conn, "owner@example.com");
    let replay = create_test_replay(&conn, &seller.id, "Drop", hours_from_now(1));
    let product = create_test_product(&conn, &replay, "Mug", 1500, 5);

    let order = create_test_order(&mut conn, &product, 3);
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.total_cents, 4500);
    assert_eq!(product_counts(&conn, &product.id), (2, 0));
}

#[test]
fn test_out_of_stock_order_is_not_inserted() {
    let pool = create_test_pool();
    let mut conn = pool.get().unwrap();
    let (seller, _) = create_test_seller(&conn, "owner@example.com");
    let replay = create_test_replay(&conn, &seller.id, "Drop", hours_from_now(1));
    let product = create_test_product(&conn, &replay, "Mug", 1500, 1);

    let result = queries::create_pending_order(
        &mut conn,
        &CreateOrder {
            seller_id: seller.id.clone(),
            replay_id: replay.id.clone(),
            product_id: product.id.clone(),
            buyer_email: None,
            quantity: 2,
            unit_price_cents: 1500,
            currency: "usd".into(),
            connected_account_id: "acct_test".into(),
        },
    );
    assert!(matches!(result, Err(AppError::Conflict(ref m)) if m == msg::OUT_OF_STOCK));

    let (orders, total) =
        queries::list_orders_paginated(&conn, &seller.id, &OrderFilters::default(), 50, 0).unwrap();
    assert!(orders.is_empty());
    assert_eq!(total, 0);
    assert_eq!(product_counts(&conn, &product.id), (1, 0));
}

#[test]
fn test_order_total_overflow_is_rejected() {
    let pool = create_test_pool();
    let mut conn = pool.get().unwrap();
    let (seller, _) = create_test_seller(&conn, "owner@example.com");
    let replay = create_test_replay(&conn, &seller.id, "Drop", hours_from_now(1));
    let product = create_test_product(&conn, &replay, "Mug", 1500, 10);

    for (unit_price_cents, quantity) in [(i64::MAX / 4, 5), (MAX_PRICE_CENTS, 2)] {
        let result = queries::create_pending_order(
            &mut conn,
            &CreateOrder {
                seller_id: seller.id.clone(),
                replay_id: replay.id.clone(),
                product_id: product.id.clone(),
                buyer_email: None,
                quantity,
                unit_price_cents,
                currency: "usd".into(),
                connected_account_id: "acct_test".into(),
            },
        );
        assert!(matches!(result, Err(AppError::BadRequest(ref m)) if m == msg::ORDER_TOTAL_TOO_LARGE));
    }
    assert_eq!(product_counts(&conn, &product.id), (10, 0));
}

#[test]
fn test_release_pending_order_is_idempotent() {
    let pool = create_test_pool();
    let mut conn = pool.get().unwrap();
    let (seller, _) = create_test_seller(&conn, "owner@example.com");
    let replay = create_test_replay(&conn, &seller.id, "Drop", hours_from_now(1));
    let product = create_test_product(&conn, &replay, "Mug", 1500, 5);
    let order = create_test_order(&mut conn, &product, 2);

    assert!(queries::release_pending_order(&mut conn, &order.id).unwrap());
    assert!(!queries::release_pending_order(&mut conn, &order.id).unwrap());

    assert_eq!(product_counts(&conn, &product.id), (5, 0));
    let order = queries::get_order_by_id(&conn, &order.id).unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Expired);
}

#[test]
fn test_order_transitions_are_conditional() {
    let pool = create_test_pool();
    let mut conn = pool.get().unwrap();
    let (seller, _) = create_test_seller(&conn, "owner@example.com");
    let replay = create_test_replay(&conn, &seller.id, "Drop", hours_from_now(1));
    let product = create_test_product(&conn, &replay, "Mug", 1500, 5);
    let order = create_test_order(&mut conn, &product, 1);

    // Only paid orders can be refunded.
    assert!(!queries::try_mark_order_refunded(&conn, &order.id).unwrap());
    assert!(queries::try_mark_order_paid(&conn, &order.id, OrderStatus::Pending, Some("pi_1"), None).unwrap());
    assert!(!queries::try_mark_order_paid(&conn, &order.id, OrderStatus::Pending, Some("pi_1"), None).unwrap());
    assert!(!queries::try_mark_order_expired(&conn, &order.id).unwrap());
    assert!(queries::try_mark_order_refunded(&conn, &order.id).unwrap());

    let order = queries::get_order_by_payment_intent(&conn, "pi_1").unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Refunded);
    assert!(order.paid_at.is_some());
}

#[test]
fn test_sweeper_expires_only_stale_pending_orders() {
    let pool = create_test_pool();
    let mut conn = pool.get().unwrap();
    let (seller, _) = create_test_seller(&conn, "owner@example.com");
    let replay = create_test_replay(&conn, &seller.id, "Drop", hours_from_now(1));
    let product = create_test_product(&conn, &replay, "Mug", 1500, 10);

    let stale = create_test_order(&mut conn, &product, 2);
    let paid = create_test_order(&mut conn, &product, 3);
    queries::try_mark_order_paid(&conn, &paid.id, OrderStatus::Pending, Some("pi_paid"), None).unwrap();

    // Nothing is older than an hour ago.
    assert_eq!(queries::expire_stale_pending_orders(&mut conn, now() - 3600).unwrap(), 0);

    let expired = queries::expire_stale_pending_orders(&mut conn, now() + 60).unwrap();
    assert_eq!(expired, 1);

    let stale = queries::get_order_by_id(&conn, &stale.id).unwrap().unwrap();
    assert_eq!(stale.status, OrderStatus::Expired);
    let paid = queries::get_order_by_id(&conn, &paid.id).unwrap().unwrap();
    assert_eq!(paid.status, OrderStatus::Paid);
    // The paid order still holds its 3 units.
    assert_eq!(product_counts(&conn, &product.id).0, 7);
}

#[test]
fn test_order_list_filters() {
    let pool = create_test_pool();
    let mut conn = pool.get().unwrap();
    let (seller, _) = create_test_seller(&conn, "owner@example.com");
    let replay = create_test_replay(&conn, &seller.id, "Drop", hours_from_now(1));
    let product = create_test_product(&conn, &replay, "Mug", 1500, 10);
    let first = create_test_order(&mut conn, &product, 1);
    create_test_order(&mut conn, &product, 1);
    queries::try_mark_order_paid(&conn, &first.id, OrderStatus::Pending, None, None).unwrap();

    let filters = OrderFilters {
        status: Some(OrderStatus::Paid),
        replay_id: Some(replay.id.clone()),
    };
    let (orders, total) = queries::list_orders_paginated(&conn, &seller.id, &filters, 50, 0).unwrap();
    assert_eq!(total, 1);
    assert_eq!(orders[0].id, first.id);

    let (_, total) = queries::list_orders_paginated(&conn, "someone-else", &OrderFilters::default(), 50, 0).unwrap();
    assert_eq!(total, 0);
}

// ============ Replays ============

#[test]
fn test_replay_slugs_are_unique_and_url_safe() {
    let pool = create_test_pool();
    let conn = pool.get().unwrap();
    let (seller, _) = create_test_seller(&conn, "owner@example.com");

    let a = create_test_replay(&conn, &seller.id, "Friday Night Drop!", hours_from_now(1));
    let b = create_test_replay(&conn, &seller.id, "Friday Night Drop!", hours_from_now(1));

    assert_ne!(a.slug, b.slug);
    assert!(a.slug.starts_with("friday-night-drop-"));
    assert!(a.slug.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
}

#[test]
fn test_replay_list_status_filter() {
    let pool = create_test_pool();
    let conn = pool.get().unwrap();
    let (seller, _) = create_test_seller(&conn, "owner@example.com");
    create_test_replay(&conn, &seller.id, "Live", hours_from_now(5));
    create_test_replay(&conn, &seller.id, "Old", now() - 10);
    let archived = create_test_replay(&conn, &seller.id, "Gone", hours_from_now(5));
    assert!(queries::archive_replay(&conn, &archived.id).unwrap());
    assert!(!queries::archive_replay(&conn, &archived.id).unwrap());

    let at = now();
    let count = |status| {
        queries::list_replays_paginated(&conn, &seller.id, status, at, 50, 0)
            .unwrap()
            .1
    };
    assert_eq!(count(None), 3);
    assert_eq!(count(Some(ReplayStatus::Live)), 1);
    assert_eq!(count(Some(ReplayStatus::Expired)), 1);
    assert_eq!(count(Some(ReplayStatus::Archived)), 1);
}

#[test]
fn test_archived_replay_cannot_be_updated() {
    let pool = create_test_pool();
    let conn = pool.get().unwrap();
    let (seller, _) = create_test_seller(&conn, "owner@example.com");
    let replay = create_test_replay(&conn, &seller.id, "Drop", hours_from_now(1));

    let updated = queries::update_replay(&conn, &replay.id, Some("New title"), None)
        .unwrap()
        .unwrap();
    assert_eq!(updated.title, "New title");
    assert_eq!(updated.expires_at, replay.expires_at);

    queries::archive_replay(&conn, &replay.id).unwrap();
    assert!(queries::update_replay(&conn, &replay.id, Some("Again"), None).unwrap().is_none());
}

#[test]
fn test_alerts_are_claimed_once() {
    let pool = create_test_pool();
    let conn = pool.get().unwrap();
    let (seller, _) = create_test_seller(&conn, "owner@example.com");
    let replay = create_test_replay(&conn, &seller.id, "Drop", hours_from_now(1));

    assert!(queries::try_mark_alerts_sent(&conn, &replay.id).unwrap());
    assert!(!queries::try_mark_alerts_sent(&conn, &replay.id).unwrap());
}

// ============ Subscribers ============

#[test]
fn test_resubscribe_reactivates_and_keeps_token() {
    let pool = create_test_pool();
    let conn = pool.get().unwrap();
    let (seller, _) = create_test_seller(&conn, "owner@example.com");

    let first = queries::upsert_subscriber(&conn, &seller.id, "Fan@Example.com", None).unwrap();
    assert_eq!(first.email, "fan@example.com");

    let gone = queries::unsubscribe_by_token(&conn, &first.unsubscribe_token)
        .unwrap()
        .unwrap();
    assert!(gone.unsubscribed_at.is_some());
    assert!(queries::list_active_subscribers(&conn, &seller.id).unwrap().is_empty());

    let again = queries::upsert_subscriber(&conn, &seller.id, "fan@example.com", None).unwrap();
    assert_eq!(again.id, first.id);
    assert_eq!(again.unsubscribe_token, first.unsubscribe_token);
    assert!(again.unsubscribed_at.is_none());
    assert_eq!(queries::list_active_subscribers(&conn, &seller.id).unwrap().len(), 1);
}

#[test]
fn test_unknown_unsubscribe_token() {
    let pool = create_test_pool();
    let conn = pool.get().unwrap();
    assert!(queries::unsubscribe_by_token(&conn, "nope").unwrap().is_none());
}

// ============ Webhook events ============

#[test]
fn test_webhook_events_are_recorded_once_per_source() {
    let pool = create_test_pool();
    let conn = pool.get().unwrap();

    assert!(queries::try_record_webhook_event(&conn, WebhookSource::Stripe, "evt_1", "charge.refunded").unwrap());
    assert!(!queries::try_record_webhook_event(&conn, WebhookSource::Stripe, "evt_1", "charge.refunded").unwrap());
    assert!(
        queries::try_record_webhook_event(&conn, WebhookSource::StripeThin, "evt_1", "v2.core.account.updated")
            .unwrap()
    );

    let record = queries::get_webhook_event(&conn, WebhookSource::Stripe, "evt_1")
        .unwrap()
        .unwrap();
    assert_eq!(record.event_type, "charge.refunded");
}

#[test]
fn test_purge_keeps_recent_events() {
    let pool = create_test_pool();
    let conn = pool.get().unwrap();
    queries::try_record_webhook_event(&conn, WebhookSource::Stripe, "evt_recent", "invoice.paid").unwrap();

    assert_eq!(queries::purge_old_webhook_events(&conn, 30).unwrap(), 0);
    assert!(
        queries::get_webhook_event(&conn, WebhookSource::Stripe, "evt_recent")
            .unwrap()
            .is_some()
    );
}

// ============ Sweeper ============

#[test]
fn test_sweep_reports_work_done() {
    let pool = create_test_pool();
    {
        let mut conn = pool.get().unwrap();
        let (seller, _) = create_test_seller(&conn, "owner@example.com");
        let replay = create_test_replay(&conn, &seller.id, "Drop", hours_from_now(1));
        let product = create_test_product(&conn, &replay, "Mug", 1500, 4);
        create_test_order(&mut conn, &product, 4);
    }

    // A negative TTL puts the cutoff in the future, so the fresh order counts as stale.
    let report = replaysell::tasks::sweep(
        &pool,
        replaysell::tasks::SweepSettings {
            pending_order_ttl_minutes: -1,
            webhook_event_retention_days: 30,
        },
    )
    .unwrap();
    assert_eq!(report.orders_expired, 1);
    assert_eq!(report.webhook_events_purged, 0);
}
