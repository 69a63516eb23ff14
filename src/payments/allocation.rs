use std::collections::HashSet;

use hourglass_rs::SafeTimeProvider;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::decimal::Money;
use crate::errors::{EngineError, Result};
use crate::events::Event;
use crate::plan::{InstallmentPlan, PaymentTag, PlanSnapshot};
use crate::types::{AllocationStrategy, InstallmentId, InstallmentStatus, PlanId};

/// amount applied to one installment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationLine {
    pub installment_id: InstallmentId,
    pub number: u32,
    pub amount: Money,
    pub status: InstallmentStatus,
}

/// allocation result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationResult {
    pub plan_id: PlanId,
    pub requested: Money,
    pub lines: Vec<AllocationLine>,
    pub total_applied: Money,
    /// money left over once every candidate was paid off; never applied elsewhere
    pub unallocated_amount: Money,
    pub plan: PlanSnapshot,
}

impl AllocationResult {
    pub fn is_fully_allocated(&self) -> bool {
        self.unallocated_amount.is_zero()
    }

    pub fn amount_for(&self, installment_id: InstallmentId) -> Money {
        self.lines
            .iter()
            .filter(|l| l.installment_id == installment_id)
            .map(|l| l.amount)
            .sum()
    }
}

/// distributes a payment across the installments of one plan
///
/// Candidates are retired greedily: overdue installments first, then by
/// ascending due date. Every application goes through the plan's own payment
/// transition and the whole allocation commits or fails as one mutation.
#[derive(Debug, Clone, Copy, Default)]
pub struct PaymentAllocator;

impl PaymentAllocator {
    pub fn new() -> Self {
        Self
    }

    pub fn allocate(
        &self,
        plan: &mut InstallmentPlan,
        amount: Money,
        strategy: &AllocationStrategy,
        time_provider: &SafeTimeProvider,
    ) -> Result<AllocationResult> {
        self.allocate_tagged(plan, amount, strategy, PaymentTag::default(), time_provider)
    }

    /// `allocate`, stamping method and reference onto every installment touched
    pub fn allocate_tagged(
        &self,
        plan: &mut InstallmentPlan,
        amount: Money,
        strategy: &AllocationStrategy,
        tag: PaymentTag,
        time_provider: &SafeTimeProvider,
    ) -> Result<AllocationResult> {
        let now = time_provider.now();
        let today = now.date_naive();

        plan.atomically("allocate", |plan| {
            if !amount.is_positive() {
                return Err(EngineError::validation("amount", "payment amount must be greater than 0"));
            }
            if !plan.is_active() {
                return Err(EngineError::PlanNotActive { status: plan.status });
            }

            let candidates = candidates(plan, strategy, today)?;

            let mut remaining = amount;
            let mut lines = Vec::new();
            for id in candidates {
                if remaining.is_zero() {
                    break;
                }
                let owed = plan
                    .installment(id)
                    .map(|i| i.remaining_amount)
                    .ok_or(EngineError::InstallmentNotFound { id })?;
                let portion = remaining.min(owed);
                let outcome = plan.apply_installment_payment(id, portion, today, &tag, now)?;
                remaining -= outcome.applied;

                let number = plan.installment(id).map(|i| i.number).unwrap_or_default();
                debug!(plan_id = %plan.id, installment = number, applied = %outcome.applied, "allocated to installment");
                lines.push(AllocationLine {
                    installment_id: id,
                    number,
                    amount: outcome.applied,
                    status: outcome.status,
                });
            }

            let total_applied: Money = lines.iter().map(|l| l.amount).sum();
            plan.events.emit(Event::PaymentAllocated {
                plan_id: plan.id,
                reference: tag.reference.clone(),
                amount,
                allocated: total_applied,
                unallocated: remaining,
                installments_touched: lines.len() as u32,
                timestamp: now,
            });

            info!(
                plan_id = %plan.id,
                amount = %amount,
                applied = %total_applied,
                unallocated = %remaining,
                installments = lines.len(),
                "payment allocated"
            );

            Ok(AllocationResult {
                plan_id: plan.id,
                requested: amount,
                lines,
                total_applied,
                unallocated_amount: remaining,
                plan: plan.snapshot(),
            })
        })
    }
}

/// installment ids in the order they get paid
fn candidates(
    plan: &InstallmentPlan,
    strategy: &AllocationStrategy,
    today: chrono::NaiveDate,
) -> Result<Vec<InstallmentId>> {
    let mut picked = match strategy {
        AllocationStrategy::OldestDueFirst => plan.open_installments().collect::<Vec<_>>(),
        AllocationStrategy::Selected(ids) => {
            if ids.is_empty() {
                return Err(EngineError::validation("installment_ids", "select at least one installment"));
            }
            let mut seen = HashSet::new();
            let mut picked = Vec::with_capacity(ids.len());
            for id in ids {
                if !seen.insert(*id) {
                    return Err(EngineError::validation(
                        "installment_ids",
                        format!("installment {} selected twice", id),
                    ));
                }
                let inst = plan.installment(*id).ok_or(EngineError::InstallmentNotInPlan {
                    plan_id: plan.id,
                    installment_id: *id,
                })?;
                // paid or cancelled members are an error, not a silent skip
                if !inst.can_pay() {
                    return Err(EngineError::InstallmentNotPayable {
                        id: inst.id,
                        status: inst.status,
                    });
                }
                picked.push(inst);
            }
            picked
        }
    };

    picked.sort_by_key(|i| (!i.is_overdue_on(today), i.due_date, i.number));
    Ok(picked.into_iter().map(|i| i.id).collect())
}
