//! End-to-end lifecycle tests against a real migrated sqlite store.

mod support;

use chrono::Duration;
use exchange_engine::{
    audit::AuditEntry,
    db_types::{ChatId, NewTransaction, ShiftSettings, TransactionStatus, TxNumber},
    helpers::{bali_now, bali_now_naive, MessageRef},
    ExchangerDatabase,
    InsertTransactionResult,
    OrderFlowApi,
    OrderFlowError,
    SettleOutcome,
};
use support::{admin, client, operator, origin, superadmin, RecordingNotifier, TEST_CHAT};
use xge_common::{Idr, Rub};

#[tokio::test]
async fn full_lifecycle_from_order_to_settlement() {
    let db = support::new_test_db().await;
    support::seed_desk(&db).await;
    let notifier = RecordingNotifier::new();
    let api = OrderFlowApi::new(db.clone(), notifier.clone());

    let created = api.create_order(&client(), &origin(11), Idr::from(700_000), None).await.unwrap();
    let number = created.transaction.transaction_number.clone();
    assert_eq!(created.transaction.status, TransactionStatus::Created);
    assert_eq!(created.transaction.rub_amount, Rub::from(47));
    assert_eq!(created.transaction.rate_used, 15_000.0);
    assert!(created.transaction.account_info.contains("MainBank"));
    assert_eq!(created.transaction.audit_trail().len(), 1);

    let tx = api.request_control(&client(), &origin(12), &number, Some("paid from Ivan")).await.unwrap();
    assert_eq!(tx.status, TransactionStatus::Control);
    assert_eq!(db.control_counter(TEST_CHAT).await.unwrap(), 1);
    assert!(notifier.contains("awaits review"));

    let tx = api.accept_order(&operator(), &origin(13), &number, Some("CRM-77")).await.unwrap();
    assert_eq!(tx.status, TransactionStatus::Accept);
    assert_eq!(db.control_counter(TEST_CHAT).await.unwrap(), 0);

    let outcome = api.batch_bill(&admin(), &origin(14), TEST_CHAT).await.unwrap();
    assert_eq!(outcome.transactions.len(), 1);
    assert_eq!(outcome.total_idr, Idr::from(700_000));
    assert_eq!(outcome.total_rub, Rub::from(47));

    let settle = api.confirm_transfer(&admin(), &origin(15), TEST_CHAT, outcome.total_idr).await.unwrap();
    let SettleOutcome::Settled { transactions, total_idr } = settle else {
        panic!("expected the invoice to settle");
    };
    assert_eq!(transactions.len(), 1);
    assert_eq!(total_idr, Idr::from(700_000));

    let final_tx = db.fetch_transaction(&number).await.unwrap().unwrap();
    assert_eq!(final_tx.status, TransactionStatus::Accounted);
    assert_eq!(final_tx.crm_number.as_deref(), Some("CRM-77"));
    assert_eq!(final_tx.note.as_deref(), Some("paid from Ivan"));
    let trail = final_tx.audit_trail();
    assert_eq!(trail.len(), 5);
    let events: Vec<_> = trail.iter().filter_map(AuditEntry::event).collect();
    assert_eq!(events, ["created", "control", "accept", "bill", "accounted"]);
}

#[tokio::test]
async fn orders_outside_shift_hours_become_night_enquiries() {
    let db = support::new_test_db().await;
    support::seed_desk(&db).await;
    // A zero-width window means the desk is never open.
    db.set_shift_settings(ShiftSettings::parse("12:00", "12:00").unwrap()).await.unwrap();
    let notifier = RecordingNotifier::new();
    let api = OrderFlowApi::new(db.clone(), notifier.clone());

    let created = api.create_order(&client(), &origin(21), Idr::from(700_000), None).await.unwrap();
    assert!(created.is_night_request());
    assert_eq!(created.transaction.account_info, "night request");
    assert!(notifier.contains("Night enquiry"));

    // Night is terminal: no review can start on it.
    let err = api.request_control(&client(), &origin(22), &created.transaction.transaction_number, None).await;
    assert!(matches!(err, Err(OrderFlowError::InvalidTransition { .. })));
}

#[tokio::test]
async fn refunds_price_at_the_back_rate() {
    let db = support::new_test_db().await;
    support::seed_desk(&db).await;
    let api = OrderFlowApi::new(db.clone(), RecordingNotifier::new());

    let created = api.create_order(&client(), &origin(31), Idr::from(-500_000), None).await.unwrap();
    assert_eq!(created.transaction.rub_amount, Rub::from(-34));
    assert_eq!(created.transaction.rate_used, 14_500.0);
    assert_eq!(created.transaction.account_info, "refund transfer");
    assert!(created.quote.is_refund());
}

#[tokio::test]
async fn large_orders_quote_the_special_account() {
    let db = support::new_test_db().await;
    support::seed_desk(&db).await;
    let api = OrderFlowApi::new(db.clone(), RecordingNotifier::new());

    let created = api.create_order(&client(), &origin(41), Idr::from(20_000_000), None).await.unwrap();
    assert!(created.quote.uses_special_accounts);
    assert!(created.transaction.account_info.contains("BigBank"));
    assert!(!created.transaction.account_info.contains("MainBank"));
}

#[tokio::test]
async fn control_counter_tracks_pending_reviews() {
    let db = support::new_test_db().await;
    support::seed_desk(&db).await;
    let api = OrderFlowApi::new(db.clone(), RecordingNotifier::new());

    let first = api.create_order(&client(), &origin(51), Idr::from(700_000), None).await.unwrap();
    let second = api.create_order(&client(), &origin(52), Idr::from(800_000), None).await.unwrap();
    api.request_control(&client(), &origin(53), &first.transaction.transaction_number, None).await.unwrap();
    api.request_control(&client(), &origin(54), &second.transaction.transaction_number, None).await.unwrap();
    assert_eq!(db.control_counter(TEST_CHAT).await.unwrap(), 2);

    api.accept_order(&operator(), &origin(55), &first.transaction.transaction_number, None).await.unwrap();
    assert_eq!(db.control_counter(TEST_CHAT).await.unwrap(), 1);

    // Cancelling an order under review releases its slot too.
    api.cancel_order(&superadmin(), &origin(56), &second.transaction.transaction_number).await.unwrap();
    assert_eq!(db.control_counter(TEST_CHAT).await.unwrap(), 0);
}

#[tokio::test]
async fn counter_never_goes_below_zero() {
    let db = support::new_test_db().await;

    let dec = db.decrement_control_counter(TEST_CHAT).await.unwrap();
    assert_eq!(dec.value, 0);
    assert!(dec.anomaly);

    db.increment_control_counter(TEST_CHAT).await.unwrap();
    let dec = db.decrement_control_counter(TEST_CHAT).await.unwrap();
    assert_eq!(dec.value, 0);
    assert!(!dec.anomaly);
}

#[tokio::test]
async fn invoice_mismatch_changes_nothing() {
    let db = support::new_test_db().await;
    support::seed_desk(&db).await;
    let api = OrderFlowApi::new(db.clone(), RecordingNotifier::new());

    let created = api.create_order(&client(), &origin(61), Idr::from(700_000), None).await.unwrap();
    let number = created.transaction.transaction_number.clone();
    api.request_control(&client(), &origin(62), &number, None).await.unwrap();
    api.accept_order(&operator(), &origin(63), &number, None).await.unwrap();
    api.batch_bill(&admin(), &origin(64), TEST_CHAT).await.unwrap();

    // Off by 2,000: beyond tolerance, nothing moves.
    let outcome = api.confirm_transfer(&admin(), &origin(65), TEST_CHAT, Idr::from(702_000)).await.unwrap();
    assert!(matches!(
        outcome,
        SettleOutcome::Mismatch { expected, reported }
            if expected == Idr::from(700_000) && reported == Idr::from(702_000)
    ));
    let tx = db.fetch_transaction(&number).await.unwrap().unwrap();
    assert_eq!(tx.status, TransactionStatus::Bill);

    // Off by exactly 1,000: within tolerance, settles.
    let outcome = api.confirm_transfer(&admin(), &origin(66), TEST_CHAT, Idr::from(701_000)).await.unwrap();
    assert!(matches!(outcome, SettleOutcome::Settled { .. }));
    let tx = db.fetch_transaction(&number).await.unwrap().unwrap();
    assert_eq!(tx.status, TransactionStatus::Accounted);
}

#[tokio::test]
async fn empty_invoice_batch_is_a_quiet_noop() {
    let db = support::new_test_db().await;
    support::seed_desk(&db).await;
    let notifier = RecordingNotifier::new();
    let api = OrderFlowApi::new(db.clone(), notifier.clone());

    let outcome = api.batch_bill(&admin(), &origin(71), TEST_CHAT).await.unwrap();
    assert!(outcome.is_empty());
    assert_eq!(outcome.total_idr, Idr::from(0));
    assert!(!notifier.contains("Invoice raised"));
}

#[tokio::test]
async fn role_gates_hold() {
    let db = support::new_test_db().await;
    support::seed_desk(&db).await;
    let api = OrderFlowApi::new(db.clone(), RecordingNotifier::new());

    let created = api.create_order(&client(), &origin(81), Idr::from(700_000), None).await.unwrap();
    let number = created.transaction.transaction_number.clone();
    api.request_control(&client(), &origin(82), &number, None).await.unwrap();

    let err = api.accept_order(&client(), &origin(83), &number, None).await;
    assert!(matches!(err, Err(OrderFlowError::Forbidden { .. })));
    let err = api.batch_bill(&operator(), &origin(84), TEST_CHAT).await;
    assert!(matches!(err, Err(OrderFlowError::Forbidden { .. })));
    let err = api.cancel_order(&admin(), &origin(85), &number).await;
    assert!(matches!(err, Err(OrderFlowError::Forbidden { .. })));

    // Nothing moved while the gates were refusing.
    let tx = db.fetch_transaction(&number).await.unwrap().unwrap();
    assert_eq!(tx.status, TransactionStatus::Control);
    assert_eq!(db.control_counter(TEST_CHAT).await.unwrap(), 1);
}

#[tokio::test]
async fn swept_orders_can_be_revived() {
    let db = support::new_test_db().await;
    support::seed_desk(&db).await;
    let api = OrderFlowApi::new(db.clone(), RecordingNotifier::new());

    let created = api.create_order(&client(), &origin(91), Idr::from(700_000), None).await.unwrap();
    let number = created.transaction.transaction_number.clone();

    let cutoff = bali_now().naive_local() + Duration::days(1);
    let entry = AuditEntry::new(bali_now_naive(), "@scheduler", "timeout", "-");
    let swept = db.sweep_stale(cutoff, &entry, bali_now_naive()).await.unwrap();
    assert_eq!(swept.swept, vec![number.clone()]);
    let tx = db.fetch_transaction(&number).await.unwrap().unwrap();
    assert_eq!(tx.status, TransactionStatus::Timeout);

    let tx = api.revive_order(&admin(), &origin(92), &number).await.unwrap();
    assert_eq!(tx.status, TransactionStatus::Created);
    let events: Vec<_> = tx.audit_trail().iter().filter_map(AuditEntry::event).map(str::to_string).collect();
    assert_eq!(events, ["created", "timeout", "created"]);
}

#[tokio::test]
async fn swept_orders_can_be_accepted_directly() {
    let db = support::new_test_db().await;
    support::seed_desk(&db).await;
    let api = OrderFlowApi::new(db.clone(), RecordingNotifier::new());

    let created = api.create_order(&client(), &origin(93), Idr::from(700_000), None).await.unwrap();
    let number = created.transaction.transaction_number.clone();

    let cutoff = bali_now().naive_local() + Duration::days(1);
    let entry = AuditEntry::new(bali_now_naive(), "@scheduler", "timeout", "-");
    db.sweep_stale(cutoff, &entry, bali_now_naive()).await.unwrap();

    // Payment evidence arrived after the sweep: one direct move, no revive step, no counter churn.
    let tx = api.accept_order_direct(&operator(), &origin(94), &number).await.unwrap();
    assert_eq!(tx.status, TransactionStatus::Accept);
    assert_eq!(db.control_counter(TEST_CHAT).await.unwrap(), 0);
    let events: Vec<_> = tx.audit_trail().iter().filter_map(AuditEntry::event).map(str::to_string).collect();
    assert_eq!(events, ["created", "timeout", "accept"]);
}

#[tokio::test]
async fn row_timestamps_share_the_bali_clock() {
    let db = support::new_test_db().await;
    support::seed_desk(&db).await;
    let api = OrderFlowApi::new(db.clone(), RecordingNotifier::new());

    let created = api.create_order(&client(), &origin(145), Idr::from(700_000), None).await.unwrap();
    let number = created.transaction.transaction_number.clone();
    api.request_control(&client(), &origin(146), &number, None).await.unwrap();

    // created_at, status_changed_at and the audit trail all read as Bali wall-clock time. A row
    // stamped from a different base would be hours off.
    let now = bali_now().naive_local();
    let tx = db.fetch_transaction(&number).await.unwrap().unwrap();
    assert!((now - tx.created_at).num_seconds().abs() < 10);
    assert!((now - tx.status_changed_at).num_seconds().abs() < 10);
    let trail = tx.audit_trail();
    let AuditEntry::Event { timestamp, .. } = &trail[0] else {
        panic!("expected a structured first entry");
    };
    assert!((now - *timestamp).num_seconds().abs() < 10);
}

#[tokio::test]
async fn duplicate_transaction_numbers_are_refused() {
    let db = support::new_test_db().await;
    support::seed_desk(&db).await;

    let number = TxNumber::from("1106321140321745".to_string());
    let entry = AuditEntry::new(bali_now_naive(), "@client", "created", "-");
    let new_tx = NewTransaction {
        transaction_number: number.clone(),
        user_id: 101,
        created_at: bali_now().naive_local(),
        idr_amount: Idr::from(700_000),
        rate_used: 15_000.0,
        rub_amount: Rub::from(47),
        account_info: "MainBank".into(),
        status: TransactionStatus::Created,
        history: entry.encode(),
        source_chat: TEST_CHAT,
    };
    let first = db.insert_transaction(new_tx.clone()).await.unwrap();
    assert!(matches!(first, InsertTransactionResult::Inserted(_)));
    let second = db.insert_transaction(new_tx).await.unwrap();
    assert!(matches!(second, InsertTransactionResult::AlreadyExists(_)));
}

#[tokio::test]
async fn superadmin_override_ignores_the_transition_table() {
    let db = support::new_test_db().await;
    support::seed_desk(&db).await;
    let api = OrderFlowApi::new(db.clone(), RecordingNotifier::new());

    let created = api.create_order(&client(), &origin(95), Idr::from(700_000), None).await.unwrap();
    let number = created.transaction.transaction_number.clone();

    // created -> accounted is not in the table, but an override may do it.
    let tx = api.change_status(&superadmin(), &origin(96), &number, TransactionStatus::Accounted).await.unwrap();
    assert_eq!(tx.status, TransactionStatus::Accounted);

    // Forcing into control keeps the counter honest.
    api.change_status(&superadmin(), &origin(97), &number, TransactionStatus::Control).await.unwrap();
    assert_eq!(db.control_counter(TEST_CHAT).await.unwrap(), 1);
    api.change_status(&superadmin(), &origin(98), &number, TransactionStatus::Cancel).await.unwrap();
    assert_eq!(db.control_counter(TEST_CHAT).await.unwrap(), 0);

    // Same-status override is refused.
    let err = api.change_status(&superadmin(), &origin(99), &number, TransactionStatus::Cancel).await;
    assert!(matches!(err, Err(OrderFlowError::InvalidTransition { .. })));
}

#[tokio::test]
async fn three_order_invoice_settles_within_tolerance() {
    let db = support::new_test_db().await;
    support::seed_desk(&db).await;
    let api = OrderFlowApi::new(db.clone(), RecordingNotifier::new());

    for (i, amount) in [800_000i64, 1_000_000, 1_200_000].into_iter().enumerate() {
        let msg = 110 + i as i64 * 3;
        let created = api.create_order(&client(), &origin(msg), Idr::from(amount), None).await.unwrap();
        let number = created.transaction.transaction_number;
        api.request_control(&client(), &origin(msg + 1), &number, None).await.unwrap();
        api.accept_order(&operator(), &origin(msg + 2), &number, None).await.unwrap();
    }
    let outcome = api.batch_bill(&admin(), &origin(120), TEST_CHAT).await.unwrap();
    assert_eq!(outcome.transactions.len(), 3);
    assert_eq!(outcome.total_idr, Idr::from(3_000_000));

    // Declared 500 over the sum: inside the 1,000 tolerance, everything settles.
    let settle = api.confirm_transfer(&admin(), &origin(121), TEST_CHAT, Idr::from(3_000_500)).await.unwrap();
    let SettleOutcome::Settled { transactions, .. } = settle else {
        panic!("expected the invoice to settle");
    };
    assert_eq!(transactions.len(), 3);
    assert!(transactions.iter().all(|t| t.status == TransactionStatus::Accounted));
}

#[tokio::test]
async fn billing_is_scoped_to_one_chat() {
    let db = support::new_test_db().await;
    support::seed_desk(&db).await;
    let api = OrderFlowApi::new(db.clone(), RecordingNotifier::new());
    let other_chat = ChatId(-424242);

    let ours = api.create_order(&client(), &origin(131), Idr::from(700_000), None).await.unwrap();
    let theirs = api
        .create_order(&client(), &MessageRef::new(other_chat, 132), Idr::from(900_000), None)
        .await
        .unwrap();
    for (created, msg) in [(&ours, 133i64), (&theirs, 135)] {
        let number = &created.transaction.transaction_number;
        let origin_ref = MessageRef::new(created.transaction.source_chat, msg);
        api.request_control(&client(), &origin_ref, number, None).await.unwrap();
        let origin_ref = MessageRef::new(created.transaction.source_chat, msg + 1);
        api.accept_order(&operator(), &origin_ref, number, None).await.unwrap();
    }

    let outcome = api.batch_bill(&admin(), &origin(140), TEST_CHAT).await.unwrap();
    assert_eq!(outcome.transactions.len(), 1);
    assert_eq!(outcome.total_idr, Idr::from(700_000));
    let report = db.fetch_chat_transactions_with_status(other_chat, TransactionStatus::Accept).await.unwrap();
    assert_eq!(report.len(), 1);

    // The other chat's order is untouched by our invoice and settlement.
    let settle = api.confirm_transfer(&admin(), &origin(141), TEST_CHAT, Idr::from(700_000)).await.unwrap();
    assert!(matches!(settle, SettleOutcome::Settled { .. }));
    let tx = db.fetch_transaction(&theirs.transaction.transaction_number).await.unwrap().unwrap();
    assert_eq!(tx.status, TransactionStatus::Accept);
}

#[tokio::test]
async fn boolean_settings_toggle_and_persist() {
    let db = support::new_test_db().await;

    assert!(db.setting("pause_quotes").await.unwrap().is_none());
    assert!(db.toggle_setting("pause_quotes").await.unwrap());
    assert!(!db.toggle_setting("pause_quotes").await.unwrap());
    assert_eq!(db.setting("pause_quotes").await.unwrap().as_deref(), Some("0"));

    db.set_setting("greeting", "selamat pagi").await.unwrap();
    assert_eq!(db.setting("greeting").await.unwrap().as_deref(), Some("selamat pagi"));
}
