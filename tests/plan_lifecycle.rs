use std::sync::Arc;

use chrono::{Duration, NaiveDate, TimeZone, Utc};
use installment_plan_rs::payments::amortization::{AmortizationCalculator, ScheduleTerms};
use installment_plan_rs::{
    AccountType, AllocatePaymentRequest, AllocationStrategy, CancelPlanRequest, CreatePlanRequest,
    EngineConfig, EngineError, InMemoryAccounts, InstallmentPlan, InstallmentStatus, Money,
    PayInstallmentRequest, PlanLedger, PlanStatus, PreviewRequest, Rate, SafeTimeProvider,
    ScheduleClassifier, TimeSource,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn clock() -> SafeTimeProvider {
    SafeTimeProvider::new(TimeSource::Test(Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap()))
}

fn ledger() -> (PlanLedger, Arc<InMemoryAccounts>) {
    let accounts = Arc::new(InMemoryAccounts::new());
    accounts.open_card("card-1", Money::from_major(400_000));
    accounts.open_account("acc-1", AccountType::Checking, Money::from_major(400_000));
    let ledger = PlanLedger::new(EngineConfig::default(), accounts.clone(), clock()).unwrap();
    (ledger, accounts)
}

fn purchase(amount: Decimal, count: u32, start: NaiveDate) -> CreatePlanRequest {
    CreatePlanRequest {
        terms: PreviewRequest::new(amount, count, start)
            .with_interest_rate(dec!(15.5))
            .with_admin_fee(dec!(2250)),
        card_id: "card-1".into(),
        user_id: "user-1".into(),
        description: "appliance".into(),
        merchant_name: None,
        merchant_id: None,
        reference: None,
    }
}

fn pay(installment_id: uuid::Uuid, amount: Money, reference: &str) -> PayInstallmentRequest {
    PayInstallmentRequest {
        installment_id,
        amount: amount.as_decimal(),
        payment_method: "transfer".into(),
        reference: reference.into(),
        account_id: "acc-1".into(),
        account_type: AccountType::Checking,
    }
}

fn schedule_terms(amount: Decimal, count: u32, rate: Decimal, fee: Decimal) -> ScheduleTerms {
    ScheduleTerms {
        amount: Money::from_decimal(amount),
        installments_count: count,
        interest_rate: Rate::from_percentage(rate),
        admin_fee: Money::from_decimal(fee),
        start_date: date(2025, 2, 1),
    }
}

#[test]
fn three_installment_purchase_totals() {
    let (ledger, _) = ledger();
    let preview = ledger
        .preview(&PreviewRequest::new(dec!(90000), 3, date(2025, 2, 1))
            .with_interest_rate(dec!(15.5))
            .with_admin_fee(dec!(2250)))
        .unwrap();

    assert_eq!(preview.total_interest, Money::from_decimal(dec!(3487.5)));
    assert_eq!(preview.total_to_pay, Money::from_decimal(dec!(95737.5)));
    assert_eq!(preview.installment_amount, Money::from_decimal(dec!(31912.50)));
    let sum: Money = preview.installments.iter().map(|i| i.amount).sum();
    assert_eq!(sum, preview.total_to_pay);
    assert_eq!(
        preview.installments.iter().map(|i| i.due_date).collect::<Vec<_>>(),
        vec![date(2025, 2, 1), date(2025, 3, 1), date(2025, 4, 1)]
    );
}

#[test]
fn schedule_columns_sum_exactly() {
    let calculator = AmortizationCalculator::new();
    let today = date(2025, 1, 15);
    let cases = [
        (dec!(1000), 3, dec!(12.5), dec!(50)),
        (dec!(99999.99), 7, dec!(21.5), dec!(2500)),
        (dec!(12345.67), 24, dec!(18), dec!(308.64)),
        (dec!(100.01), 9, dec!(0), dec!(0)),
        (dec!(500000), 11, dec!(33.3), dec!(0.01)),
    ];

    for (amount, count, rate, fee) in cases {
        let schedule = calculator
            .compute_as_of(&schedule_terms(amount, count, rate, fee), today)
            .unwrap();
        let amounts: Money = schedule.installments.iter().map(|i| i.amount).sum();
        let principal: Money = schedule.installments.iter().map(|i| i.principal).sum();
        let interest: Money = schedule.installments.iter().map(|i| i.interest).sum();
        let fees: Money = schedule.installments.iter().map(|i| i.fee).sum();

        assert_eq!(amounts, schedule.total_to_pay, "amounts for {} x {}", amount, count);
        assert_eq!(principal, schedule.principal);
        assert_eq!(interest, schedule.total_interest);
        assert_eq!(fees, schedule.admin_fee);

        // only the last line carries the rounding remainder
        let level = schedule.total_to_pay / Decimal::from(count);
        let (last, rest) = schedule.installments.split_last().unwrap();
        assert!(rest.iter().all(|i| i.amount == level));
        assert_eq!(last.amount, schedule.total_to_pay - level * Decimal::from(count - 1));
    }
}

#[test]
fn month_end_start_date_clamps() {
    let (ledger, _) = ledger();
    let preview = ledger
        .preview(&PreviewRequest::new(dec!(10000), 3, date(2025, 1, 31)))
        .unwrap();
    assert_eq!(preview.installments[0].due_date, date(2025, 1, 31));
    assert_eq!(preview.installments[1].due_date, date(2025, 2, 28));
    assert_eq!(preview.installments[2].due_date, date(2025, 3, 31));
}

#[test]
fn twelve_installments_five_paid() {
    let (ledger, _) = ledger();
    let plan = ledger.create_plan(&purchase(dec!(120000), 12, date(2025, 2, 1))).unwrap().plan;

    let mut paid_sum = Money::ZERO;
    for number in 1..=5 {
        let inst = plan.installment_by_number(number).unwrap();
        ledger.pay_installment(&pay(inst.id, inst.amount, &format!("p-{}", number))).unwrap();
        paid_sum += inst.amount;
    }

    let plan = ledger.get(plan.id).unwrap();
    assert_eq!(plan.paid_installments, 5);
    assert_eq!(plan.remaining_amount, plan.total_to_pay - paid_sum);
    assert_eq!(plan.status, PlanStatus::Active);
}

#[test]
fn paying_first_installment_on_its_due_date() {
    let (ledger, _) = ledger();
    let plan = ledger.create_plan(&purchase(dec!(90000), 3, date(2025, 2, 1))).unwrap().plan;
    let first = plan.installment_by_number(1).unwrap();

    ledger.time_provider().test_control().unwrap().set(Utc.with_ymd_and_hms(2025, 2, 1, 9, 0, 0).unwrap());
    let paid = ledger.pay_installment(&pay(first.id, first.remaining_amount, "p-1")).unwrap();

    assert_eq!(paid.installment.status, InstallmentStatus::Paid);
    assert_eq!(paid.installment.paid_date, Some(date(2025, 2, 1)));
    assert_eq!(paid.plan.status, PlanStatus::Active);
    assert_eq!(paid.plan.paid_installments, 1);

    let cancelled = ledger
        .cancel(&CancelPlanRequest {
            plan_id: plan.id,
            reason: "returned".into(),
        })
        .unwrap();
    assert_eq!(cancelled.status, PlanStatus::Cancelled);
    assert!(cancelled.remaining_amount.is_zero());
    assert_eq!(cancelled.installment_by_number(1).unwrap().status, InstallmentStatus::Paid);
    assert_eq!(cancelled.installment_by_number(2).unwrap().status, InstallmentStatus::Cancelled);
    assert_eq!(cancelled.installment_by_number(3).unwrap().status, InstallmentStatus::Cancelled);
}

#[test]
fn repeated_payment_reference_applies_once() {
    let (ledger, accounts) = ledger();
    let plan = ledger.create_plan(&purchase(dec!(90000), 3, date(2025, 2, 1))).unwrap().plan;
    let first = plan.installment_by_number(1).unwrap();
    let request = pay(first.id, first.amount, "same-key");

    let once = ledger.pay_installment(&request).unwrap();
    let twice = ledger.pay_installment(&request).unwrap();

    assert_eq!(once, twice);
    assert_eq!(accounts.balance("acc-1"), Some(Money::from_major(400_000) - first.amount));
    assert_eq!(ledger.get(plan.id).unwrap().paid_installments, 1);
    assert_eq!(accounts.movements().len(), 2);
}

#[test]
fn cancel_leaves_paid_and_cancels_the_rest() {
    let (ledger, _) = ledger();
    let plan = ledger.create_plan(&purchase(dec!(90000), 3, date(2025, 2, 1))).unwrap().plan;
    let first = plan.installment_by_number(1).unwrap();
    let second = plan.installment_by_number(2).unwrap();

    ledger.pay_installment(&pay(first.id, first.amount, "p-1")).unwrap();
    ledger.pay_installment(&pay(second.id, Money::from_major(5_000), "p-2")).unwrap();

    let before = ledger.get(plan.id).unwrap();
    assert_eq!(before.installment_by_number(2).unwrap().status, InstallmentStatus::Partial);

    let cancelled = ledger
        .cancel(&CancelPlanRequest {
            plan_id: plan.id,
            reason: "dispute lost".into(),
        })
        .unwrap();
    assert_eq!(cancelled.installment_by_number(1).unwrap(), before.installment_by_number(1).unwrap());
    assert_eq!(cancelled.installment_by_number(2).unwrap().status, InstallmentStatus::Cancelled);
    assert_eq!(cancelled.installment_by_number(3).unwrap().status, InstallmentStatus::Cancelled);
    assert!(cancelled.remaining_amount.is_zero());

    let err = ledger
        .pay_installment(&pay(plan.installment_by_number(3).unwrap().id, Money::ONE, "p-3"))
        .unwrap_err();
    assert!(matches!(err, EngineError::PlanNotActive { status: PlanStatus::Cancelled }));
}

#[test]
fn completion_happens_on_the_last_payment() {
    let (ledger, _) = ledger();
    let plan = ledger.create_plan(&purchase(dec!(30000), 3, date(2025, 2, 1))).unwrap().plan;

    for inst in plan.installments() {
        assert_eq!(ledger.get(plan.id).unwrap().status, PlanStatus::Active);
        // pay in two halves so the plan sees a partial state first
        let half = inst.amount / dec!(2);
        ledger.pay_installment(&pay(inst.id, half, &format!("{}-a", inst.number))).unwrap();
        assert_eq!(ledger.get(plan.id).unwrap().status, PlanStatus::Active);
        ledger
            .pay_installment(&pay(inst.id, inst.amount - half, &format!("{}-b", inst.number)))
            .unwrap();
    }

    let plan = ledger.get(plan.id).unwrap();
    assert_eq!(plan.status, PlanStatus::Completed);
    assert!(plan.completed_at.is_some());
    assert!(plan.remaining_amount.is_zero());
    assert!(matches!(
        ledger.cancel(&CancelPlanRequest { plan_id: plan.id, reason: "late".into() }),
        Err(EngineError::PlanNotCancellable { .. })
    ));
}

#[test]
fn overdue_is_derived_and_cleared_by_payment() {
    let time = clock();
    let terms = schedule_terms(dec!(9000), 3, dec!(12.5), dec!(0));
    let schedule = AmortizationCalculator::new().compute(&terms, &time).unwrap();
    let mut plan = InstallmentPlan::create(
        &schedule,
        installment_plan_rs::PlanMetadata::new("card-1", "user-1", "chair"),
        &time,
    )
    .unwrap();
    let classifier = ScheduleClassifier::default();
    let first = plan.installment_by_number(1).unwrap().clone();

    let late = date(2025, 2, 10);
    assert_eq!(classifier.overdue(plan.installments(), late).len(), 1);
    assert_eq!(classifier.classify(&first, late).status, InstallmentStatus::Overdue);
    // stored status still says pending
    assert_eq!(plan.installment_by_number(1).unwrap().status, InstallmentStatus::Pending);

    time.test_control().unwrap().advance(Duration::days(26));
    plan.mark_paid(first.id, first.amount, late, &time).unwrap();
    assert!(classifier.overdue(plan.installments(), late).is_empty());

    plan.cancel("closed", &time).unwrap();
    assert!(classifier.overdue(plan.installments(), date(2025, 6, 1)).is_empty());
}

#[test]
fn allocation_overflow_is_returned() {
    let (ledger, _) = ledger();
    let plan = ledger.create_plan(&purchase(dec!(90000), 3, date(2025, 2, 1))).unwrap().plan;
    let last = plan.installment_by_number(3).unwrap();

    let result = ledger
        .allocate(&AllocatePaymentRequest::new(
            plan.id,
            dec!(40000),
            AllocationStrategy::Selected(vec![last.id]),
        ))
        .unwrap();
    assert_eq!(result.total_applied, last.amount);
    assert_eq!(result.unallocated_amount, Money::from_major(40_000) - last.amount);
    assert_eq!(ledger.get(plan.id).unwrap().paid_installments, 1);
}

#[test]
fn credit_is_checked_before_the_card_is_charged() {
    let (ledger, accounts) = ledger();
    accounts.open_card("card-1", Money::from_major(50_000));

    let err = ledger.create_plan(&purchase(dec!(90000), 3, date(2025, 2, 1))).unwrap_err();
    assert!(matches!(err, EngineError::InsufficientCredit { .. }));
    assert!(ledger.is_empty());
    assert!(accounts.movements().is_empty());
}

#[test]
fn past_start_date_is_rejected() {
    let (ledger, _) = ledger();
    let err = ledger.create_plan(&purchase(dec!(90000), 3, date(2025, 1, 15))).unwrap_err();
    assert_eq!(err.field(), Some("start_date"));
}
