/// quick start - preview a purchase and print its schedule
use installment_plan_rs::{Decimal, PreviewRequest, PricingPolicy};
use chrono::{Duration, Utc};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let today = Utc::now().date_naive();

    // 90,000 in 3 installments starting next week, default rate and fee
    let request = PreviewRequest::new(Decimal::from(90_000), 3, today + Duration::days(7));
    let schedule = PricingPolicy::default().preview(&request, today)?;

    println!("rate: {}  fee: {}  total: {}", schedule.interest_rate, schedule.admin_fee, schedule.total_to_pay);
    for line in &schedule.installments {
        println!("  #{:<2} {}  {:>10}", line.number, line.due_date, line.amount);
    }

    Ok(())
}
