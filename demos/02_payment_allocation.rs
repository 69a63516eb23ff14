/// payment allocation - spread one payment over several installments
use chrono::{Duration, NaiveDate, TimeZone, Utc};
use installment_plan_rs::payments::amortization::{AmortizationCalculator, ScheduleTerms};
use installment_plan_rs::{
    AllocationStrategy, InstallmentPlan, Money, PaymentAllocator, PlanMetadata, Rate, SafeTimeProvider,
    TimeSource,
};
use rust_decimal_macros::dec;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== payment allocation ===\n");

    let time = SafeTimeProvider::new(TimeSource::Test(Utc.with_ymd_and_hms(2025, 1, 10, 0, 0, 0).unwrap()));
    let terms = ScheduleTerms {
        amount: Money::from_major(24_000),
        installments_count: 6,
        interest_rate: Rate::from_percentage(dec!(12.5)),
        admin_fee: Money::from_major(600),
        start_date: NaiveDate::from_ymd_opt(2025, 2, 1).ok_or("bad date")?,
    };
    let schedule = AmortizationCalculator::new().compute(&terms, &time)?;
    let mut plan = InstallmentPlan::create(&schedule, PlanMetadata::new("card-9", "user-9", "sofa"), &time)?;
    println!("installment amount: {}", plan.installment_amount);

    // two months later the first installment is overdue
    time.test_control().unwrap().advance(Duration::days(60));
    let allocator = PaymentAllocator::new();

    let result = allocator.allocate(&mut plan, Money::from_major(6_000), &AllocationStrategy::OldestDueFirst, &time)?;
    for line in &result.lines {
        println!("  #{} <- {} ({})", line.number, line.amount, line.status);
    }
    println!("unallocated: {}", result.unallocated_amount);

    // paying chosen installments; more than they owe comes back unallocated
    let chosen: Vec<_> = plan.installments().iter().skip(4).map(|i| i.id).collect();
    let result = allocator.allocate(&mut plan, Money::from_major(20_000), &AllocationStrategy::Selected(chosen), &time)?;
    println!("\nselected: applied {}, unallocated {}", result.total_applied, result.unallocated_amount);
    println!("plan: {} paid, {} remaining", plan.paid_installments, plan.remaining_amount);

    Ok(())
}
