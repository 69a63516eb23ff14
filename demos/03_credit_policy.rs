/// credit policy - minimum payment, tiered rate, billing dates and plan options
use chrono::{NaiveDate, Utc};
use installment_plan_rs::{CreditPolicy, Decimal, EngineConfig, Money, PricingPolicy};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = EngineConfig::default();
    let credit = CreditPolicy::new(config.credit.clone());

    println!("=== credit policy ===\n");
    for used in [1_000, 10_000, 80_000] {
        println!("used {:>6} -> minimum payment {}", used, credit.minimum_payment(Money::from_major(used)));
    }

    for (limit, score) in [(20_000, None), (60_000, Some(650)), (150_000, Some(820))] {
        let rate = credit.interest_rate(Money::from_major(limit), score);
        println!("limit {:>7}, score {:?} -> {}", limit, score, rate);
    }

    let today = NaiveDate::from_ymd_opt(2025, 3, 10).ok_or("bad date")?;
    let closing = credit.next_closing_date(NaiveDate::from_ymd_opt(2025, 2, 25), today)?;
    let due = credit.next_due_date(closing);
    println!("\nnext closing {}, due {}", closing, due);
    credit.validate_billing_dates(Some(closing), Some(due), today)?;

    println!("\n=== plan options for 50,000 ===");
    let pricing = PricingPolicy::new(config.pricing.clone());
    let start = Utc::now().date_naive() + chrono::Duration::days(10);
    let options = pricing.installment_options(
        Decimal::from(50_000),
        &config.installments.allowed_counts,
        start,
        Utc::now().date_naive(),
    )?;
    for option in options {
        println!(
            "{:>2} x {:>10}  rate {:>5}%  total {}",
            option.installments_count, option.installment_amount, option.interest_rate, option.total_to_pay
        );
    }

    Ok(())
}
