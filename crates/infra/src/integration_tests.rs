//! Integration tests for the full submission pipeline.
//!
//! Tests: SubmitPayment → PaymentService → LedgerStore → OrderStore → summary
//!
//! Verifies:
//! - Receipts are allocated, numbered, rendered and written back to orders
//! - Supersedes and credit applications keep the ledger consistent
//! - Rejected requests leave the ledger untouched

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;

use wholesale_core::{DomainError, Money, SoNumber};
use wholesale_payments::{
    AllocationInput, CreditApplication, DocStatus, DocType, SubmitPayment, SummaryQuery,
    SupersedeAction,
};

use crate::config::Settings;
use crate::ledger_store::{InMemoryLedgerStore, LedgerStore};
use crate::orders::{OrderStore, SheetOrderStore};
use crate::renderer::FilesystemRenderer;
use crate::schema::{OrderColumns, Sheet};
use crate::sequence::InMemoryCounterStore;
use crate::service::{PaymentService, ServiceError};

type Service =
    PaymentService<Arc<InMemoryLedgerStore>, Arc<SheetOrderStore>, InMemoryCounterStore, FilesystemRenderer>;

fn cents(n: i64) -> Money {
    Money::from_cents(n)
}

fn so(s: &str) -> SoNumber {
    s.parse().unwrap()
}

fn orders_tab() -> Sheet {
    let mut tab = Sheet::new(
        "Orders",
        &["SO#", "Customer ID", "Product Description", "Order Total", "Paid-to-Date", "Remaining Balance"],
    );
    tab.push_row(&["SO1", "ACME", "Gold ring", "200", "0", "200"]);
    tab.push_row(&["SO2", "ACME", "Chain", "200", "0", "200"]);
    tab.push_row(&["SO3", "ACME", "Pendant", "200", "0", "200"]);
    tab.push_row(&["SO9", "ACME", "Bracelet", "1000", "0", "1000"]);
    tab
}

fn settings() -> Settings {
    let mut settings = Settings::default();
    for doc_type in DocType::SUBMITTABLE {
        settings
            .templates
            .insert(doc_type, format!("tpl-{}", doc_type.as_str().to_ascii_lowercase()));
    }
    settings
}

fn setup_with(tab: Sheet, settings: Settings) -> (Service, Arc<InMemoryLedgerStore>, Arc<SheetOrderStore>) {
    let ledger = Arc::new(InMemoryLedgerStore::new());
    let orders = Arc::new(SheetOrderStore::new(vec![tab], OrderColumns::default()));
    let out_dir = std::env::temp_dir().join(format!("wh-it-{}", uuid::Uuid::now_v7()));
    let service = PaymentService::new(
        ledger.clone(),
        orders.clone(),
        InMemoryCounterStore::new(),
        FilesystemRenderer::new(out_dir),
        settings,
    );
    (service, ledger, orders)
}

fn setup() -> (Service, Arc<InMemoryLedgerStore>, Arc<SheetOrderStore>) {
    setup_with(orders_tab(), settings())
}

fn receipt(primary: &str, orders: &[&str], amount: i64) -> SubmitPayment {
    let mut request = SubmitPayment::new(DocType::SalesReceipt, "ACME", primary, orders);
    request.company_name = "Acme Jewelers".to_string();
    request.payment.amount = cents(amount);
    request.payment.method = "Wire".to_string();
    request
}

#[test]
fn even_receipt_is_allocated_numbered_and_written_back() {
    let (service, ledger, orders) = setup();

    let outcome = service
        .submit(&receipt("SO1", &["SO1", "SO2", "SO3"], 50_000))
        .unwrap();

    let today = Utc::now().date_naive().format("%Y%m%d").to_string();
    assert_eq!(outcome.doc_number, format!("ADM-{today}-0001"));
    assert!(outcome.invoice_group_id.is_some());
    assert!(outcome.doc_url.as_deref().is_some_and(|u| u.starts_with("file://")));
    assert!(outcome.overage_credit.is_none());
    assert!(outcome.writeback_failures.is_empty());

    let shares: Vec<Money> = outcome.allocations.iter().map(|a| a.amount).collect();
    assert_eq!(shares, vec![cents(16_667), cents(16_667), cents(16_666)]);

    assert_eq!(ledger.len(), 1);
    let snapshot = orders.find(&so("SO3")).unwrap().unwrap();
    assert_eq!(snapshot.paid_to_date, Some(cents(16_666)));
    assert_eq!(snapshot.remaining_balance, Some(cents(3_334)));

    // The next document of the day continues the sequence.
    let next = service.submit(&receipt("SO9", &["SO9"], 10_000)).unwrap();
    assert_eq!(next.doc_number, format!("ADM-{today}-0002"));
    assert!(next.invoice_group_id.is_none());
}

#[test]
fn deposit_invoice_then_receipt_leaves_the_remaining_balance() {
    let (service, _ledger, orders) = setup();

    let mut invoice = SubmitPayment::new(DocType::DepositInvoice, "ACME", "SO9", &["SO9"]);
    invoice.payment.amount = cents(100_000);
    invoice.include_due_date = true;
    let issued = service.submit(&invoice).unwrap();
    assert!(issued.allocations.is_empty());

    service.submit(&receipt("SO9", &["SO9"], 40_000)).unwrap();

    let summary = service
        .summary(&SummaryQuery {
            so_number: Some("so9".to_string()),
            ..SummaryQuery::default()
        })
        .unwrap();
    assert_eq!(summary.totals.invoiced, cents(100_000));
    assert_eq!(summary.totals.receipts, cents(40_000));
    assert_eq!(summary.totals.balance, cents(60_000));

    let snapshot = orders.find(&so("SO9")).unwrap().unwrap();
    assert_eq!(snapshot.paid_to_date, Some(cents(40_000)));
    assert_eq!(snapshot.remaining_balance, Some(cents(60_000)));
}

#[test]
fn manual_allocation_to_unknown_order_becomes_credit() {
    let (service, ledger, _orders) = setup();

    let mut request = receipt("SO1", &["SO1", "SO2"], 30_000);
    request.even_split = false;
    request.allocations = vec![
        AllocationInput { so: "SO1".to_string(), amount: cents(15_000) },
        AllocationInput { so: "SO2".to_string(), amount: cents(5_000) },
        AllocationInput { so: "SO77".to_string(), amount: cents(10_000) },
    ];

    let outcome = service.submit(&request).unwrap();
    assert_eq!(outcome.allocations.total(), cents(20_000));
    assert!(!outcome.allocations.contains(&so("SO77")));

    let credit = outcome.overage_credit.expect("overage credit");
    assert_eq!(credit.amount, cents(10_000));
    assert!(credit.payment_id.as_str().starts_with("CRED-"));
    assert_eq!(ledger.len(), 2);
    assert_eq!(service.unapplied_credit("acme").unwrap(), cents(10_000));
}

#[test]
fn credit_applications_are_bounded_by_unapplied_credit() {
    let (service, ledger, _orders) = setup();
    service.submit(&receipt("SO1", &["SO1"], 30_000)).unwrap();

    assert_eq!(service.unapplied_credit("ACME").unwrap(), Money::ZERO);

    let mut request = receipt("SO1", &["SO1"], 25_000);
    request.even_split = false;
    request.allocations = vec![
        AllocationInput { so: "SO1".to_string(), amount: cents(5_000) },
        AllocationInput { so: "ELSEWHERE".to_string(), amount: cents(20_000) },
    ];
    service.submit(&request).unwrap();
    assert_eq!(service.unapplied_credit("ACME").unwrap(), cents(20_000));

    let too_much = [CreditApplication { so: "SO2".to_string(), amount: cents(20_001) }];
    let before = ledger.len();
    match service.apply_credit("ACME", &too_much).unwrap_err() {
        ServiceError::Domain(DomainError::Validation(msg)) => assert_eq!(msg, "Not enough credit."),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(ledger.len(), before);

    let record = service
        .apply_credit("ACME", &[CreditApplication { so: "SO2".to_string(), amount: cents(15_000) }])
        .unwrap();
    assert_eq!(record.doc_type, DocType::CreditApplied);
    assert_eq!(service.unapplied_credit("ACME").unwrap(), cents(5_000));
}

#[test]
fn replacing_a_receipt_drops_it_from_paid_to_date() {
    let (service, ledger, orders) = setup();
    let original = service.submit(&receipt("SO9", &["SO9"], 40_000)).unwrap();

    let mut amended = receipt("SO9", &["SO9"], 45_000);
    amended.supersedes_doc_number = Some(original.doc_number.clone());
    amended.supersede_action = Some(SupersedeAction::Replace);
    service.submit(&amended).unwrap();

    let records = ledger.scan().unwrap();
    let old = records
        .iter()
        .find(|r| r.payment_id == original.payment_id)
        .unwrap();
    assert_eq!(old.doc_status, DocStatus::Replaced);

    let paid = service.paid_to_date(&["SO9".to_string()]).unwrap();
    assert_eq!(paid.get(&so("SO9")), Some(cents(45_000)));
    let snapshot = orders.find(&so("SO9")).unwrap().unwrap();
    assert_eq!(snapshot.paid_to_date, Some(cents(45_000)));
}

#[test]
fn rejected_supersedes_append_nothing() {
    let (service, ledger, _orders) = setup();

    let mut unknown = receipt("SO1", &["SO1"], 1_000);
    unknown.supersedes_doc_number = Some("ADM-19990101-0001".to_string());
    let err = service.submit(&unknown).unwrap_err();
    assert!(matches!(err, ServiceError::Domain(DomainError::Validation(_))));
    assert!(ledger.is_empty());

    let original = service.submit(&receipt("SO1", &["SO1"], 1_000)).unwrap();
    let mut void = receipt("SO1", &["SO1"], 1_000);
    void.supersedes_doc_number = Some(original.doc_number.clone());
    void.supersede_action = Some(SupersedeAction::Void);
    service.submit(&void).unwrap();
    let count = ledger.len();

    let mut again = receipt("SO1", &["SO1"], 1_000);
    again.supersedes_doc_number = Some(original.doc_number);
    let err = service.submit(&again).unwrap_err();
    assert!(matches!(err, ServiceError::Domain(DomainError::Conflict(_))));
    assert_eq!(ledger.len(), count);
}

#[test]
fn writeback_failures_are_reported_not_raised() {
    let mut tab = Sheet::new("Orders", &["SO#", "Customer ID", "Order Total"]);
    tab.push_row(&["SO1", "ACME", "200"]);
    let (service, ledger, _orders) = setup_with(tab, settings());

    let outcome = service.submit(&receipt("SO1", &["SO1"], 5_000)).unwrap();
    assert_eq!(ledger.len(), 1);
    assert_eq!(outcome.writeback_failures.len(), 1);
    assert_eq!(outcome.writeback_failures[0].so, "SO1");
}

#[test]
fn documents_disabled_needs_no_templates() {
    let settings = Settings {
        docs_enabled: false,
        ..Settings::default()
    };
    let (service, ledger, _orders) = setup_with(orders_tab(), settings);

    let outcome = service.submit(&receipt("SO2", &["SO2"], 5_000)).unwrap();
    assert!(outcome.doc_url.is_none());
    assert!(outcome.pdf_url.is_none());
    assert!(outcome.doc_number.ends_with("-0001"));
    assert_eq!(ledger.len(), 1);
}

#[test]
fn reconcile_repairs_drifted_snapshots() {
    let (service, _ledger, orders) = setup();
    service.submit(&receipt("SO2", &["SO2"], 7_500)).unwrap();

    orders.write_snapshot(&so("SO2"), Money::ZERO, cents(20_000)).unwrap();
    let report = service.reconcile(&["SO2".to_string(), "SO404".to_string()]).unwrap();
    assert_eq!(report.written, vec!["SO2".to_string()]);
    assert_eq!(report.missing, vec!["SO404".to_string()]);

    let snapshot = orders.find(&so("SO2")).unwrap().unwrap();
    assert_eq!(snapshot.paid_to_date, Some(cents(7_500)));
    assert_eq!(snapshot.remaining_balance, Some(cents(12_500)));
}

#[test]
fn concurrent_submissions_are_serialized() {
    const SUBMITTERS: usize = 8;
    let (service, ledger, orders) = setup();

    let doc_numbers: Vec<String> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..SUBMITTERS)
            .map(|i| {
                let service = &service;
                scope.spawn(move || {
                    service
                        .submit(&receipt("SO9", &["SO9"], 1_000 + i as i64))
                        .unwrap()
                        .doc_number
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let distinct: HashSet<&String> = doc_numbers.iter().collect();
    assert_eq!(distinct.len(), SUBMITTERS);
    assert_eq!(ledger.len(), SUBMITTERS);

    let expected: Money = (0..SUBMITTERS).map(|i| cents(1_000 + i as i64)).sum();
    let paid = service.paid_to_date(&["SO9".to_string()]).unwrap();
    assert_eq!(paid.get(&so("SO9")), Some(expected));
    let snapshot = orders.find(&so("SO9")).unwrap().unwrap();
    assert_eq!(snapshot.paid_to_date, Some(expected));
}

#[test]
fn doc_number_override_cannot_reuse_an_active_number() {
    let (service, ledger, _orders) = setup();
    let first = service.submit(&receipt("SO1", &["SO1"], 1_000)).unwrap();

    let mut clash = receipt("SO2", &["SO2"], 2_000);
    clash.doc_number_override = Some(first.doc_number.clone());
    let err = service.submit(&clash).unwrap_err();
    assert!(matches!(err, ServiceError::Domain(DomainError::Conflict(_))));
    assert_eq!(ledger.len(), 1);

    // Reissuing under the same number is fine when that document is replaced.
    let mut reissue = receipt("SO1", &["SO1"], 1_500);
    reissue.doc_number_override = Some(first.doc_number.clone());
    reissue.supersedes_doc_number = Some(first.doc_number.clone());
    reissue.supersede_action = Some(SupersedeAction::Replace);
    let outcome = service.submit(&reissue).unwrap();
    assert_eq!(outcome.doc_number, first.doc_number);

    let active: Vec<_> = ledger
        .scan()
        .unwrap()
        .into_iter()
        .filter(|r| r.is_active() && r.doc_number.as_deref() == Some(first.doc_number.as_str()))
        .collect();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].payment_id, outcome.payment_id);
}
