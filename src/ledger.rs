use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::NaiveDate;
use hourglass_rs::SafeTimeProvider;
use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::accounts::AccountGateway;
use crate::classification::{ClassifiedInstallment, MonthlyLoad, PortfolioSummary, ScheduleClassifier};
use crate::config::EngineConfig;
use crate::errors::{EngineError, Result};
use crate::events::Event;
use crate::installment::Installment;
use crate::payments::amortization::{AmortizationCalculator, ScheduleTerms};
use crate::payments::{
    ensure_minor_units, AllocatePaymentRequest, AllocationResult, CancelPlanRequest,
    CreatePlanRequest, CreatePlanResponse, PayInstallmentRequest, PayInstallmentResponse,
    PaymentAllocator, PreviewRequest, PreviewResponse,
};
use crate::plan::{InstallmentPlan, PaymentTag};
use crate::policy::{InstallmentOption, PricingPolicy};
use crate::types::{InstallmentId, PlanId};

/// window used for the "upcoming" list of a portfolio summary
pub const SUMMARY_HORIZON_DAYS: i64 = 30;

/// keyed purchases remembered for replay; the oldest are forgotten first
pub const PURCHASE_RECEIPT_CAPACITY: usize = 4096;

/// keyed payments remembered per plan
pub const PLAN_RECEIPT_CAPACITY: usize = 256;

/// bounded map of request references to their outcomes
///
/// Once full, recording a new reference evicts the oldest one, so a retry
/// arriving after that many newer requests is treated as a fresh request.
#[derive(Debug)]
struct ReceiptBook<V> {
    capacity: usize,
    entries: HashMap<String, V>,
    order: VecDeque<String>,
}

impl<V> ReceiptBook<V> {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    fn get(&self, reference: &str) -> Option<&V> {
        self.entries.get(reference)
    }

    fn record(&mut self, reference: String, value: V) {
        if self.entries.insert(reference.clone(), value).is_none() {
            self.order.push_back(reference);
        }
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// stored outcome of a keyed request, replayed on retries
#[derive(Debug, Clone)]
enum Receipt {
    Payment {
        request: PayInstallmentRequest,
        response: PayInstallmentResponse,
    },
    Allocation {
        request: AllocatePaymentRequest,
        result: AllocationResult,
    },
}

#[derive(Debug)]
struct PlanSlot {
    plan: InstallmentPlan,
    version: u64,
    receipts: ReceiptBook<Receipt>,
}

impl PlanSlot {
    fn check_version(&self, expected: Option<u64>) -> Result<()> {
        match expected {
            Some(expected) if expected != self.version => Err(EngineError::VersionMismatch {
                plan_id: self.plan.id,
                expected,
                found: self.version,
            }),
            _ => Ok(()),
        }
    }

    fn commit(&mut self, plan: InstallmentPlan) {
        self.plan = plan;
        self.version += 1;
    }
}

#[derive(Debug, Clone)]
struct PurchaseReceipt {
    request: CreatePlanRequest,
    response: CreatePlanResponse,
}

/// plan with the version it was read at
#[derive(Debug, Clone, PartialEq)]
pub struct VersionedPlan {
    pub plan: InstallmentPlan,
    pub version: u64,
}

/// in-memory home of installment plans
///
/// Plans are independent: every mutation locks exactly one plan slot, so
/// payments against different plans never wait on each other. Each committed
/// mutation bumps the slot version for optimistic writers, and requests
/// carrying a reference are replayed instead of applied twice.
pub struct PlanLedger {
    config: EngineConfig,
    time_provider: SafeTimeProvider,
    gateway: Arc<dyn AccountGateway>,
    calculator: AmortizationCalculator,
    pricing: PricingPolicy,
    classifier: ScheduleClassifier,
    allocator: PaymentAllocator,
    plans: RwLock<HashMap<PlanId, Arc<Mutex<PlanSlot>>>>,
    installment_index: RwLock<HashMap<InstallmentId, PlanId>>,
    purchases: Mutex<ReceiptBook<PurchaseReceipt>>,
}

impl PlanLedger {
    pub fn new(config: EngineConfig, gateway: Arc<dyn AccountGateway>, time_provider: SafeTimeProvider) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            pricing: PricingPolicy::new(config.pricing.clone()),
            classifier: ScheduleClassifier::new(config.urgency),
            calculator: AmortizationCalculator::new(),
            allocator: PaymentAllocator::new(),
            config,
            time_provider,
            gateway,
            plans: RwLock::new(HashMap::new()),
            installment_index: RwLock::new(HashMap::new()),
            purchases: Mutex::new(ReceiptBook::with_capacity(PURCHASE_RECEIPT_CAPACITY)),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn time_provider(&self) -> &SafeTimeProvider {
        &self.time_provider
    }

    // previews

    /// compute a schedule without storing anything
    pub fn preview(&self, request: &PreviewRequest) -> Result<PreviewResponse> {
        let terms = self.purchase_terms(request)?;
        let schedule = self.calculator.compute(&terms, &self.time_provider)?;
        Ok(PreviewResponse::from(&schedule))
    }

    /// price `amount` at every allowed installment count
    pub fn installment_options(&self, amount: Decimal, start_date: NaiveDate) -> Result<Vec<InstallmentOption>> {
        ensure_minor_units("amount", amount)?;
        self.pricing.installment_options(
            amount,
            &self.config.installments.allowed_counts,
            start_date,
            self.today(),
        )
    }

    // plan lifecycle

    /// charge the card and store a new plan
    ///
    /// The plan is built and checked first, then the card is charged; if the
    /// charge fails nothing is stored.
    pub fn create_plan(&self, request: &CreatePlanRequest) -> Result<CreatePlanResponse> {
        request.validate()?;
        let terms = self.purchase_terms(&request.terms)?;

        // keyed purchases hold the receipt book for the whole creation
        let mut purchases = match &request.reference {
            Some(_) => Some(self.purchases.lock()),
            None => None,
        };
        if let (Some(reference), Some(book)) = (&request.reference, purchases.as_ref()) {
            if let Some(receipt) = book.get(reference) {
                if receipt.request != *request {
                    return Err(EngineError::IdempotencyKeyReused {
                        reference: reference.clone(),
                    });
                }
                debug!(reference = %reference, plan_id = %receipt.response.plan.id, "replaying plan creation");
                return Ok(receipt.response.clone());
            }
        }

        let schedule = self.calculator.compute(&terms, &self.time_provider)?;

        let available = self.gateway.available_credit(&request.card_id)?;
        if terms.amount > available {
            warn!(card_id = %request.card_id, requested = %terms.amount, available = %available, "insufficient credit for plan");
            return Err(EngineError::InsufficientCredit {
                available,
                requested: terms.amount,
            });
        }

        let metadata = request.metadata().with_currency(self.config.installments.currency.clone());
        let draft = InstallmentPlan::create(&schedule, metadata, &self.time_provider)?;

        let description = format!(
            "purchase in {} installments - {}",
            schedule.installments_count, request.description
        );
        let transaction_id = self.gateway.charge_card(&request.card_id, terms.amount, &description)?;

        let mut plan = draft;
        plan.attach_transaction(transaction_id);

        let response = CreatePlanResponse {
            plan: plan.clone(),
            first_installment_charged: true,
            transaction_id,
        };
        self.insert(plan);

        if let (Some(reference), Some(book)) = (&request.reference, purchases.as_mut()) {
            book.record(
                reference.clone(),
                PurchaseReceipt {
                    request: request.clone(),
                    response: response.clone(),
                },
            );
        }

        info!(
            plan_id = %response.plan.id,
            card_id = %request.card_id,
            transaction_id = %transaction_id,
            "plan stored"
        );
        Ok(response)
    }

    pub fn cancel(&self, request: &CancelPlanRequest) -> Result<InstallmentPlan> {
        self.cancel_inner(request, None)
    }

    pub fn cancel_if_version(&self, request: &CancelPlanRequest, expected_version: u64) -> Result<InstallmentPlan> {
        self.cancel_inner(request, Some(expected_version))
    }

    fn cancel_inner(&self, request: &CancelPlanRequest, expected: Option<u64>) -> Result<InstallmentPlan> {
        request.validate()?;
        self.with_slot(request.plan_id, expected, |slot| {
            slot.plan.cancel(&request.reason, &self.time_provider)?;
            slot.version += 1;
            Ok(slot.plan.clone())
        })
    }

    pub fn suspend(&self, plan_id: PlanId, reason: &str) -> Result<InstallmentPlan> {
        self.suspend_inner(plan_id, reason, None)
    }

    pub fn suspend_if_version(&self, plan_id: PlanId, reason: &str, expected_version: u64) -> Result<InstallmentPlan> {
        self.suspend_inner(plan_id, reason, Some(expected_version))
    }

    fn suspend_inner(&self, plan_id: PlanId, reason: &str, expected: Option<u64>) -> Result<InstallmentPlan> {
        self.with_slot(plan_id, expected, |slot| {
            slot.plan.suspend(reason, &self.time_provider)?;
            slot.version += 1;
            Ok(slot.plan.clone())
        })
    }

    pub fn resume(&self, plan_id: PlanId, reason: &str) -> Result<InstallmentPlan> {
        self.resume_inner(plan_id, reason, None)
    }

    pub fn resume_if_version(&self, plan_id: PlanId, reason: &str, expected_version: u64) -> Result<InstallmentPlan> {
        self.resume_inner(plan_id, reason, Some(expected_version))
    }

    fn resume_inner(&self, plan_id: PlanId, reason: &str, expected: Option<u64>) -> Result<InstallmentPlan> {
        self.with_slot(plan_id, expected, |slot| {
            slot.plan.resume(reason, &self.time_provider)?;
            slot.version += 1;
            Ok(slot.plan.clone())
        })
    }

    // payments

    /// pay one installment from the caller's account
    ///
    /// The amount may not exceed what the installment still owes. The account
    /// is debited while the plan is locked and the payment is committed only if
    /// the debit succeeds.
    pub fn pay_installment(&self, request: &PayInstallmentRequest) -> Result<PayInstallmentResponse> {
        self.pay_installment_inner(request, None)
    }

    pub fn pay_installment_if_version(
        &self,
        request: &PayInstallmentRequest,
        expected_version: u64,
    ) -> Result<PayInstallmentResponse> {
        self.pay_installment_inner(request, Some(expected_version))
    }

    fn pay_installment_inner(
        &self,
        request: &PayInstallmentRequest,
        expected: Option<u64>,
    ) -> Result<PayInstallmentResponse> {
        let amount = request.validate()?;
        let plan_id = self.plan_id_for(request.installment_id)?;

        self.with_slot(plan_id, expected, |slot| {
            if let Some(receipt) = slot.receipts.get(&request.reference) {
                return match receipt {
                    Receipt::Payment { request: stored, response } if stored == request => {
                        debug!(plan_id = %plan_id, reference = %request.reference, "replaying installment payment");
                        Ok(response.clone())
                    }
                    _ => Err(EngineError::IdempotencyKeyReused {
                        reference: request.reference.clone(),
                    }),
                };
            }

            let installment = slot
                .plan
                .installment(request.installment_id)
                .ok_or(EngineError::InstallmentNotFound { id: request.installment_id })?;
            if !slot.plan.is_active() {
                return Err(EngineError::PlanNotActive { status: slot.plan.status });
            }
            if installment.can_pay() && amount > installment.remaining_amount {
                return Err(EngineError::validation(
                    "amount",
                    format!("payment {} exceeds the {} still owed", amount, installment.remaining_amount),
                ));
            }

            let mut draft = slot.plan.clone();
            let tag = PaymentTag {
                method: Some(request.payment_method.clone()),
                reference: Some(request.reference.clone()),
            };
            let payment = draft.mark_paid_tagged(
                request.installment_id,
                amount,
                self.today(),
                tag,
                &self.time_provider,
            )?;

            let debit_transaction_id = self.gateway.debit_account(
                &request.account_id,
                request.account_type,
                amount,
                &request.reference,
            )?;

            slot.commit(draft);
            let response = PayInstallmentResponse {
                installment: payment.installment,
                applied: payment.applied,
                plan: payment.plan,
                debit_transaction_id,
            };
            slot.receipts.record(
                request.reference.clone(),
                Receipt::Payment {
                    request: request.clone(),
                    response: response.clone(),
                },
            );

            info!(
                plan_id = %plan_id,
                installment = response.installment.number,
                amount = %amount,
                status = %response.installment.status,
                "installment paid"
            );
            Ok(response)
        })
    }

    /// distribute a payment over a plan's open installments
    pub fn allocate(&self, request: &AllocatePaymentRequest) -> Result<AllocationResult> {
        self.allocate_inner(request, None)
    }

    pub fn allocate_if_version(&self, request: &AllocatePaymentRequest, expected_version: u64) -> Result<AllocationResult> {
        self.allocate_inner(request, Some(expected_version))
    }

    fn allocate_inner(&self, request: &AllocatePaymentRequest, expected: Option<u64>) -> Result<AllocationResult> {
        let amount = ensure_minor_units("amount", request.amount)?;

        self.with_slot(request.plan_id, expected, |slot| {
            if let Some(reference) = &request.reference {
                if let Some(receipt) = slot.receipts.get(reference) {
                    return match receipt {
                        Receipt::Allocation { request: stored, result } if stored == request => {
                            debug!(plan_id = %request.plan_id, reference = %reference, "replaying allocation");
                            Ok(result.clone())
                        }
                        _ => Err(EngineError::IdempotencyKeyReused {
                            reference: reference.clone(),
                        }),
                    };
                }
            }

            let tag = PaymentTag {
                method: request.payment_method.clone(),
                reference: request.reference.clone(),
            };
            let result = self
                .allocator
                .allocate_tagged(&mut slot.plan, amount, &request.strategy, tag, &self.time_provider)?;
            slot.version += 1;

            if let Some(reference) = &request.reference {
                slot.receipts.record(
                    reference.clone(),
                    Receipt::Allocation {
                        request: request.clone(),
                        result: result.clone(),
                    },
                );
            }
            Ok(result)
        })
    }

    /// persist the overdue flag across every plan; returns installments flagged
    pub fn materialize_overdue(&self) -> Result<u32> {
        let mut flagged = 0;
        for slot in self.slots() {
            let mut slot = slot.lock();
            let count = slot.plan.materialize_overdue(&self.time_provider)?;
            if count > 0 {
                slot.version += 1;
                flagged += count;
            }
        }
        if flagged > 0 {
            info!(flagged, "overdue installments flagged");
        }
        Ok(flagged)
    }

    // reads

    pub fn get(&self, plan_id: PlanId) -> Result<InstallmentPlan> {
        self.get_versioned(plan_id).map(|v| v.plan)
    }

    pub fn get_versioned(&self, plan_id: PlanId) -> Result<VersionedPlan> {
        let slot = self.slot(plan_id)?;
        let slot = slot.lock();
        Ok(VersionedPlan {
            plan: slot.plan.clone(),
            version: slot.version,
        })
    }

    pub fn installment(&self, installment_id: InstallmentId) -> Result<Installment> {
        let plan_id = self.plan_id_for(installment_id)?;
        let slot = self.slot(plan_id)?;
        let slot = slot.lock();
        slot.plan
            .installment(installment_id)
            .cloned()
            .ok_or(EngineError::InstallmentNotFound { id: installment_id })
    }

    /// audit trail of a plan, oldest first
    pub fn events(&self, plan_id: PlanId) -> Result<Vec<Event>> {
        let slot = self.slot(plan_id)?;
        let slot = slot.lock();
        Ok(slot.plan.events.events().to_vec())
    }

    pub fn installment_history(&self, installment_id: InstallmentId) -> Result<Vec<Event>> {
        let plan_id = self.plan_id_for(installment_id)?;
        let slot = self.slot(plan_id)?;
        let slot = slot.lock();
        Ok(slot.plan.events.for_installment(installment_id).into_iter().cloned().collect())
    }

    pub fn plans_for_user(&self, user_id: &str) -> Vec<InstallmentPlan> {
        self.collect_plans(|p| p.user_id == user_id)
    }

    pub fn plans_for_card(&self, card_id: &str) -> Vec<InstallmentPlan> {
        self.collect_plans(|p| p.card_id == card_id)
    }

    /// a user's overdue installments, oldest first
    pub fn overdue_installments(&self, user_id: &str) -> Vec<ClassifiedInstallment> {
        let today = self.today();
        let plans = self.plans_for_user(user_id);
        self.classifier
            .overdue(plans.iter().flat_map(|p| p.installments()), today)
            .into_iter()
            .map(|i| self.classifier.classify(i, today))
            .collect()
    }

    /// a user's open installments due within `days`
    pub fn upcoming_installments(&self, user_id: &str, days: i64) -> Vec<ClassifiedInstallment> {
        let today = self.today();
        let plans = self.plans_for_user(user_id);
        self.classifier
            .upcoming(plans.iter().flat_map(|p| p.installments()), today, days)
            .into_iter()
            .map(|i| self.classifier.classify(i, today))
            .collect()
    }

    pub fn summary(&self, user_id: &str) -> PortfolioSummary {
        let plans = self.plans_for_user(user_id);
        PortfolioSummary::build(user_id, &plans, &self.classifier, self.today(), SUMMARY_HORIZON_DAYS)
    }

    pub fn monthly_load(&self, user_id: &str, year: i32, month: u32) -> Result<MonthlyLoad> {
        let plans = self.plans_for_user(user_id);
        MonthlyLoad::build(&plans, year, month, self.today())
    }

    pub fn len(&self) -> usize {
        self.plans.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.read().is_empty()
    }

    // internals

    fn today(&self) -> NaiveDate {
        self.time_provider.now().date_naive()
    }

    /// calculator inputs with pricing defaults, checked against configured limits
    fn purchase_terms(&self, request: &PreviewRequest) -> Result<ScheduleTerms> {
        let terms = self.pricing.terms_for(request)?;
        let limits = &self.config.installments;

        if !limits.allowed_counts.contains(&terms.installments_count) {
            return Err(EngineError::validation(
                "installments_count",
                format!(
                    "{} installments not offered; allowed: {:?}",
                    terms.installments_count, limits.allowed_counts
                ),
            ));
        }
        if terms.amount.is_positive() && (terms.amount < limits.min_amount || terms.amount > limits.max_amount) {
            return Err(EngineError::validation(
                "amount",
                format!("amount must be between {} and {}", limits.min_amount, limits.max_amount),
            ));
        }
        Ok(terms)
    }

    fn insert(&self, plan: InstallmentPlan) {
        let plan_id = plan.id;
        let installment_ids: Vec<InstallmentId> = plan.installments().iter().map(|i| i.id).collect();
        let slot = PlanSlot {
            plan,
            version: 1,
            receipts: ReceiptBook::with_capacity(PLAN_RECEIPT_CAPACITY),
        };

        // index first so a reader that finds the plan can resolve its installments
        {
            let mut index = self.installment_index.write();
            for id in installment_ids {
                index.insert(id, plan_id);
            }
        }
        self.plans.write().insert(plan_id, Arc::new(Mutex::new(slot)));
    }

    fn slot(&self, plan_id: PlanId) -> Result<Arc<Mutex<PlanSlot>>> {
        self.plans
            .read()
            .get(&plan_id)
            .cloned()
            .ok_or(EngineError::PlanNotFound { id: plan_id })
    }

    fn slots(&self) -> Vec<Arc<Mutex<PlanSlot>>> {
        self.plans.read().values().cloned().collect()
    }

    fn plan_id_for(&self, installment_id: InstallmentId) -> Result<PlanId> {
        self.installment_index
            .read()
            .get(&installment_id)
            .copied()
            .ok_or(EngineError::InstallmentNotFound { id: installment_id })
    }

    /// run `op` with the plan slot locked, after the optional version check
    fn with_slot<T, F>(&self, plan_id: PlanId, expected: Option<u64>, op: F) -> Result<T>
    where
        F: FnOnce(&mut PlanSlot) -> Result<T>,
    {
        let slot = self.slot(plan_id)?;
        let mut slot = slot.lock();
        slot.check_version(expected)?;
        op(&mut slot)
    }

    fn collect_plans<F>(&self, keep: F) -> Vec<InstallmentPlan>
    where
        F: Fn(&InstallmentPlan) -> bool,
    {
        let mut plans: Vec<InstallmentPlan> = self
            .slots()
            .into_iter()
            .filter_map(|slot| {
                let slot = slot.lock();
                keep(&slot.plan).then(|| slot.plan.clone())
            })
            .collect();
        plans.sort_by_key(|p| (p.created_at, p.id));
        plans
    }
}

impl std::fmt::Debug for PlanLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlanLedger")
            .field("plans", &self.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::InMemoryAccounts;
    use crate::decimal::Money;
    use crate::types::{AccountType, AllocationStrategy, InstallmentStatus, PlanStatus};
    use chrono::{Duration, TimeZone, Utc};
    use hourglass_rs::TimeSource;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn setup() -> (PlanLedger, Arc<InMemoryAccounts>) {
        let accounts = Arc::new(InMemoryAccounts::new());
        accounts.open_card("card-1", Money::from_major(200_000));
        accounts.open_account("acc-1", AccountType::Checking, Money::from_major(100_000));
        let time = SafeTimeProvider::new(TimeSource::Test(Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap()));
        let ledger = PlanLedger::new(EngineConfig::default(), accounts.clone(), time).unwrap();
        (ledger, accounts)
    }

    fn purchase(amount: Decimal, count: u32) -> CreatePlanRequest {
        CreatePlanRequest {
            terms: PreviewRequest::new(amount, count, date(2025, 2, 1))
                .with_interest_rate(dec!(15.5))
                .with_admin_fee(dec!(2250)),
            card_id: "card-1".into(),
            user_id: "user-1".into(),
            description: "television".into(),
            merchant_name: Some("electro".into()),
            merchant_id: None,
            reference: None,
        }
    }

    fn payment(installment_id: InstallmentId, amount: Decimal, reference: &str) -> PayInstallmentRequest {
        PayInstallmentRequest {
            installment_id,
            amount,
            payment_method: "debit".into(),
            reference: reference.into(),
            account_id: "acc-1".into(),
            account_type: AccountType::Checking,
        }
    }

    #[test]
    fn test_create_charges_card() {
        let (ledger, accounts) = setup();
        let response = ledger.create_plan(&purchase(dec!(90000), 3)).unwrap();

        assert!(response.first_installment_charged);
        assert_eq!(response.plan.transaction_id, Some(response.transaction_id));
        assert_eq!(response.plan.total_to_pay, Money::from_decimal(dec!(95737.50)));
        assert_eq!(accounts.used_credit("card-1"), Some(Money::from_major(90_000)));
        assert_eq!(ledger.get_versioned(response.plan.id).unwrap().version, 1);
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_create_rejects_insufficient_credit_without_storing() {
        let (ledger, accounts) = setup();
        accounts.open_card("card-1", Money::from_major(50_000));

        let err = ledger.create_plan(&purchase(dec!(90000), 3)).unwrap_err();
        assert!(matches!(err, EngineError::InsufficientCredit { .. }));
        assert!(ledger.is_empty());
        assert_eq!(accounts.used_credit("card-1"), Some(Money::ZERO));
    }

    #[test]
    fn test_create_enforces_configured_limits() {
        let (ledger, _) = setup();
        let err = ledger.create_plan(&purchase(dec!(90000), 4)).unwrap_err();
        assert_eq!(err.field(), Some("installments_count"));

        let err = ledger.create_plan(&purchase(dec!(900000), 3)).unwrap_err();
        assert_eq!(err.field(), Some("amount"));

        let err = ledger.create_plan(&purchase(dec!(90000.001), 3)).unwrap_err();
        assert_eq!(err.field(), Some("amount"));
    }

    #[test]
    fn test_keyed_creation_is_replayed() {
        let (ledger, accounts) = setup();
        let mut request = purchase(dec!(90000), 3);
        request.reference = Some("order-77".into());

        let first = ledger.create_plan(&request).unwrap();
        let again = ledger.create_plan(&request).unwrap();
        assert_eq!(first.plan.id, again.plan.id);
        assert_eq!(ledger.len(), 1);
        assert_eq!(accounts.used_credit("card-1"), Some(Money::from_major(90_000)));

        request.description = "something else".into();
        let err = ledger.create_plan(&request).unwrap_err();
        assert!(matches!(err, EngineError::IdempotencyKeyReused { .. }));
    }

    #[test]
    fn test_responses_use_camel_case_keys() {
        let (ledger, _) = setup();
        let response = ledger.create_plan(&purchase(dec!(90000), 3)).unwrap();
        let first = response.plan.installment_by_number(1).unwrap().clone();

        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("firstInstallmentCharged").is_some());
        let plan = &json["plan"];
        for key in ["totalToPay", "paidInstallments", "installmentAmount", "remainingAmount", "cardId"] {
            assert!(plan.get(key).is_some(), "plan is missing {}", key);
        }
        assert!(plan.get("total_to_pay").is_none());
        let installment = &plan["installments"][0];
        assert!(installment.get("remainingAmount").is_some());
        assert!(installment.get("dueDate").is_some());

        let paid = ledger.pay_installment(&payment(first.id, dec!(31912.50), "pay-1")).unwrap();
        let json = serde_json::to_value(&paid).unwrap();
        assert!(json["installment"].get("paidAmount").is_some());
        assert!(json["installment"].get("paymentReference").is_some());
        assert!(json["plan"].get("paidInstallments").is_some());
        assert!(json.get("debitTransactionId").is_some());
    }

    #[test]
    fn test_pay_installment_and_replay() {
        let (ledger, accounts) = setup();
        let plan = ledger.create_plan(&purchase(dec!(90000), 3)).unwrap().plan;
        let first = plan.installment_by_number(1).unwrap();

        let request = payment(first.id, dec!(31912.50), "pay-1");
        let paid = ledger.pay_installment(&request).unwrap();
        assert_eq!(paid.installment.status, InstallmentStatus::Paid);
        assert_eq!(paid.plan.paid_installments, 1);

        let replay = ledger.pay_installment(&request).unwrap();
        assert_eq!(replay, paid);
        assert_eq!(accounts.balance("acc-1"), Some(Money::from_decimal(dec!(68087.50))));
        assert_eq!(ledger.get_versioned(plan.id).unwrap().version, 2);

        let err = ledger.pay_installment(&payment(first.id, dec!(10), "pay-1")).unwrap_err();
        assert!(matches!(err, EngineError::IdempotencyKeyReused { .. }));

        let err = ledger.pay_installment(&payment(first.id, dec!(10), "pay-2")).unwrap_err();
        assert!(matches!(err, EngineError::InstallmentNotPayable { .. }));
    }

    #[test]
    fn test_overpaying_an_installment_is_rejected() {
        let (ledger, accounts) = setup();
        let plan = ledger.create_plan(&purchase(dec!(90000), 3)).unwrap().plan;
        let first = plan.installment_by_number(1).unwrap();

        let err = ledger.pay_installment(&payment(first.id, dec!(40000), "pay-1")).unwrap_err();
        assert_eq!(err.field(), Some("amount"));
        assert_eq!(accounts.balance("acc-1"), Some(Money::from_major(100_000)));
    }

    #[test]
    fn test_paying_a_suspended_plan_reports_status_first() {
        let (ledger, accounts) = setup();
        let plan = ledger.create_plan(&purchase(dec!(90000), 3)).unwrap().plan;
        let first = plan.installment_by_number(1).unwrap();
        ledger.suspend(plan.id, "fraud review").unwrap();

        // more than #1 owes, but the plan status wins
        let err = ledger.pay_installment(&payment(first.id, dec!(40000), "pay-1")).unwrap_err();
        assert!(matches!(err, EngineError::PlanNotActive { status: PlanStatus::Suspended }));
        let err = ledger.pay_installment(&payment(first.id, dec!(100), "pay-2")).unwrap_err();
        assert!(matches!(err, EngineError::PlanNotActive { status: PlanStatus::Suspended }));
        assert_eq!(accounts.balance("acc-1"), Some(Money::from_major(100_000)));
    }

    #[test]
    fn test_receipt_book_forgets_oldest_when_full() {
        let mut book = ReceiptBook::with_capacity(3);
        for n in 0..5 {
            book.record(format!("ref-{}", n), n);
        }
        assert_eq!(book.len(), 3);
        assert!(book.get("ref-0").is_none());
        assert!(book.get("ref-1").is_none());
        assert_eq!(book.get("ref-4"), Some(&4));

        // re-recording a known reference does not grow the book
        book.record("ref-4".into(), 40);
        assert_eq!(book.len(), 3);
        assert_eq!(book.get("ref-2"), Some(&2));
        assert_eq!(book.get("ref-4"), Some(&40));
    }

    #[test]
    fn test_plan_receipts_stay_bounded() {
        let (ledger, _) = setup();
        let plan = ledger.create_plan(&purchase(dec!(90000), 3)).unwrap().plan;

        // each allocation of a cent is a distinct keyed request
        for n in 0..(PLAN_RECEIPT_CAPACITY + 10) {
            let request = AllocatePaymentRequest::new(plan.id, dec!(0.01), AllocationStrategy::OldestDueFirst)
                .with_reference(format!("cent-{}", n));
            ledger.allocate(&request).unwrap();
        }

        let slot = ledger.slot(plan.id).unwrap();
        let slot = slot.lock();
        assert_eq!(slot.receipts.len(), PLAN_RECEIPT_CAPACITY);
        assert!(slot.receipts.get("cent-0").is_none());
        assert!(slot.receipts.get(&format!("cent-{}", PLAN_RECEIPT_CAPACITY + 9)).is_some());
    }

    #[test]
    fn test_failed_debit_leaves_plan_untouched() {
        let (ledger, _) = setup();
        let plan = ledger.create_plan(&purchase(dec!(90000), 3)).unwrap().plan;
        let first = plan.installment_by_number(1).unwrap();

        let mut request = payment(first.id, dec!(31912.50), "pay-1");
        request.account_type = AccountType::Savings;
        assert!(ledger.pay_installment(&request).is_err());

        let stored = ledger.get_versioned(plan.id).unwrap();
        assert_eq!(stored.version, 1);
        assert_eq!(stored.plan.paid_installments, 0);
        assert_eq!(stored.plan.installment_by_number(1).unwrap().status, InstallmentStatus::Pending);
    }

    #[test]
    fn test_stale_version_is_rejected() {
        let (ledger, _) = setup();
        let plan = ledger.create_plan(&purchase(dec!(90000), 3)).unwrap().plan;
        let read = ledger.get_versioned(plan.id).unwrap();

        ledger.suspend_if_version(plan.id, "review", read.version).unwrap();
        let err = ledger.resume_if_version(plan.id, "ok", read.version).unwrap_err();
        assert!(matches!(err, EngineError::VersionMismatch { expected: 1, found: 2, .. }));
        assert!(err.is_retryable());

        ledger.resume_if_version(plan.id, "ok", 2).unwrap();
        assert_eq!(ledger.get(plan.id).unwrap().status, PlanStatus::Active);
    }

    #[test]
    fn test_allocation_replay_and_cancel() {
        let (ledger, _) = setup();
        let plan = ledger.create_plan(&purchase(dec!(90000), 3)).unwrap().plan;

        let request = AllocatePaymentRequest::new(plan.id, dec!(40000), AllocationStrategy::OldestDueFirst)
            .with_reference("alloc-1");
        let result = ledger.allocate(&request).unwrap();
        assert_eq!(result.lines.len(), 2);
        let replay = ledger.allocate(&request).unwrap();
        assert_eq!(replay, result);
        assert_eq!(ledger.get_versioned(plan.id).unwrap().version, 2);

        let cancelled = ledger
            .cancel(&CancelPlanRequest {
                plan_id: plan.id,
                reason: "returned".into(),
            })
            .unwrap();
        assert_eq!(cancelled.status, PlanStatus::Cancelled);
        assert!(cancelled.remaining_amount.is_zero());

        let history = ledger.installment_history(plan.installment_by_number(2).unwrap().id).unwrap();
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_queries_follow_the_clock() {
        let (ledger, _) = setup();
        let plan = ledger.create_plan(&purchase(dec!(90000), 3)).unwrap().plan;

        assert!(ledger.overdue_installments("user-1").is_empty());
        assert_eq!(ledger.upcoming_installments("user-1", 30).len(), 1);

        ledger.time_provider().test_control().unwrap().advance(Duration::days(30));
        let overdue = ledger.overdue_installments("user-1");
        assert_eq!(overdue.len(), 1);
        assert_eq!(overdue[0].plan_id, plan.id);
        assert_eq!(overdue[0].status, InstallmentStatus::Overdue);

        let summary = ledger.summary("user-1");
        assert_eq!(summary.overdue_installments, 1);
        assert_eq!(ledger.materialize_overdue().unwrap(), 1);
        assert_eq!(ledger.materialize_overdue().unwrap(), 0);

        let load = ledger.monthly_load("user-1", 2025, 3).unwrap();
        assert_eq!(load.total_installments, 1);
        assert!(ledger.plans_for_user("someone-else").is_empty());
        assert_eq!(ledger.plans_for_card("card-1").len(), 1);
    }

    #[test]
    fn test_unknown_ids() {
        let (ledger, _) = setup();
        let missing = uuid::Uuid::new_v4();
        assert!(matches!(ledger.get(missing), Err(EngineError::PlanNotFound { .. })));
        assert!(matches!(ledger.installment(missing), Err(EngineError::InstallmentNotFound { .. })));
        let err = ledger.pay_installment(&payment(missing, dec!(10), "x")).unwrap_err();
        assert!(matches!(err, EngineError::InstallmentNotFound { .. }));
    }
}
