/// plan lifecycle - create, pay, suspend, resume and cancel through the ledger
use std::sync::Arc;

use chrono::{Duration, NaiveDate, TimeZone, Utc};
use installment_plan_rs::{
    AccountType, CancelPlanRequest, CreatePlanRequest, EngineConfig, InMemoryAccounts, Money,
    PayInstallmentRequest, PlanLedger, PlanView, PreviewRequest, SafeTimeProvider, TimeSource,
};
use rust_decimal_macros::dec;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    println!("=== plan lifecycle ===\n");

    let accounts = Arc::new(InMemoryAccounts::new());
    accounts.open_card("card-1", Money::from_major(300_000));
    accounts.open_account("acc-1", AccountType::Checking, Money::from_major(150_000));

    // the ledger owns the clock; the controller moves it
    let time = SafeTimeProvider::new(TimeSource::Test(Utc.with_ymd_and_hms(2025, 1, 15, 10, 0, 0).unwrap()));
    let ledger = PlanLedger::new(EngineConfig::default(), accounts.clone(), time)?;
    let controller = ledger.time_provider().test_control().unwrap();

    let created = ledger.create_plan(&CreatePlanRequest {
        terms: PreviewRequest::new(dec!(90000), 6, NaiveDate::from_ymd_opt(2025, 2, 1).ok_or("bad date")?),
        card_id: "card-1".into(),
        user_id: "user-1".into(),
        description: "laptop".into(),
        merchant_name: Some("tech store".into()),
        merchant_id: None,
        reference: Some("order-1001".into()),
    })?;
    let plan = created.plan;
    println!("plan {} created, total to pay {}", plan.id, plan.total_to_pay);
    println!("card used credit: {:?}", accounts.used_credit("card-1"));

    // pay the first two installments on their due dates
    for number in 1..=2 {
        let installment = plan.installment_by_number(number).ok_or("missing installment")?;
        controller.set(Utc.from_utc_datetime(&installment.due_date.and_hms_opt(9, 0, 0).ok_or("bad time")?));
        let paid = ledger.pay_installment(&PayInstallmentRequest {
            installment_id: installment.id,
            amount: installment.amount.as_decimal(),
            payment_method: "debit".into(),
            reference: format!("pay-{}", number),
            account_id: "acc-1".into(),
            account_type: AccountType::Checking,
        })?;
        println!("installment #{} -> {}, plan has {} paid", number, paid.installment.status, paid.plan.paid_installments);
    }

    ledger.suspend(plan.id, "chargeback review")?;
    println!("\nsuspended: {}", ledger.get(plan.id)?.status);
    ledger.resume(plan.id, "review closed")?;

    // let installment #3 slip past its due date
    controller.advance(Duration::days(45));
    for overdue in ledger.overdue_installments("user-1") {
        println!("overdue: #{} due {} ({} days)", overdue.number, overdue.due_date, overdue.days_overdue);
    }

    let cancelled = ledger.cancel(&CancelPlanRequest {
        plan_id: plan.id,
        reason: "merchandise returned".into(),
    })?;
    println!("\ncancelled, remaining {}", cancelled.remaining_amount);

    let view = PlanView::from_plan(&cancelled, ledger.time_provider().now().date_naive());
    println!("{}", view.to_json_pretty()?);

    println!("\naudit trail:");
    for event in ledger.events(plan.id)? {
        println!("  {}", event.action());
    }

    Ok(())
}
