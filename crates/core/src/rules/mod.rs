//! Organization approval-rule evaluation.
//!
//! `RuleEngine::evaluate` is a pure function of the organization's rule set and
//! the requested amount. It never falls back to default thresholds: an
//! organization without a complete rule set cannot be routed.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::organization::{OrganizationId, OrganizationRules, RuleNumber, RuleThreshold};
use crate::errors::DomainError;

/// Lowest approver authority able to sign off an amount.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApproverLevel {
    Finance,
    Senior,
    Executive,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Decision {
    pub requires_dual_approval: bool,
    pub approver_level: ApproverLevel,
    pub min_quotes_required: u32,
    pub min_unique_approvers: u32,
    pub allowed_variance_up: Decimal,
    pub allowed_variance_down: Decimal,
    pub currency: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VarianceCheck {
    Within { variance_pct: Decimal },
    AboveAllowed { variance_pct: Decimal, allowed_pct: Decimal },
    BelowAllowed { variance_pct: Decimal, allowed_pct: Decimal },
}

impl VarianceCheck {
    pub fn is_within(&self) -> bool {
        matches!(self, Self::Within { .. })
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Within { variance_pct } => format!("final amount within tolerance ({variance_pct}%)"),
            Self::AboveAllowed { variance_pct, allowed_pct } => {
                format!("final amount {variance_pct}% above quote exceeds allowed +{allowed_pct}%")
            }
            Self::BelowAllowed { variance_pct, allowed_pct } => {
                format!("final amount {variance_pct}% below quote exceeds allowed -{allowed_pct}%")
            }
        }
    }
}

/// A purchase request carries two approver slots, so rule5 can ask for at most two people.
pub const MAX_UNIQUE_APPROVERS: u32 = 2;

#[derive(Clone, Copy, Debug, Default)]
pub struct RuleEngine;

impl RuleEngine {
    /// Resolves a possibly-absent rule set, surfacing absence as a configuration error.
    pub fn evaluate_for(
        &self,
        organization_id: &OrganizationId,
        rules: Option<&OrganizationRules>,
        amount: Decimal,
        currency: &str,
    ) -> Result<Decision, DomainError> {
        match rules {
            Some(rules) => self.evaluate(rules, amount, currency),
            None => Err(DomainError::RulesNotInitialized {
                organization_id: organization_id.clone(),
                missing: RuleNumber::ALL.to_vec(),
            }),
        }
    }

    pub fn evaluate(
        &self,
        rules: &OrganizationRules,
        amount: Decimal,
        currency: &str,
    ) -> Result<Decision, DomainError> {
        let missing = rules.missing();
        if !missing.is_empty() {
            return Err(DomainError::RulesNotInitialized {
                organization_id: rules.organization_id.clone(),
                missing,
            });
        }
        let rule = |number: RuleNumber| require(rules, number);

        let finance_ceiling = rule(RuleNumber::Rule1)?;
        let senior_ceiling = rule(RuleNumber::Rule3)?;
        ensure_currency(finance_ceiling, currency)?;
        ensure_currency(senior_ceiling, currency)?;

        let dual_threshold = finance_ceiling.threshold * rule(RuleNumber::Rule2)?.threshold;
        let requires_dual_approval = amount >= dual_threshold;

        let approver_level = if amount <= finance_ceiling.threshold {
            ApproverLevel::Finance
        } else if amount <= senior_ceiling.threshold {
            ApproverLevel::Senior
        } else {
            ApproverLevel::Executive
        };

        let min_quotes_required = if amount > senior_ceiling.threshold {
            whole_count(rule(RuleNumber::Rule4)?.threshold)
        } else {
            1
        };

        let min_unique_approvers = whole_count(rule(RuleNumber::Rule5)?.threshold);
        if min_unique_approvers > MAX_UNIQUE_APPROVERS {
            return Err(DomainError::RuleOutOfRange {
                organization_id: rules.organization_id.clone(),
                rule: RuleNumber::Rule5,
                reason: format!(
                    "requires {min_unique_approvers} distinct approvers but a request has {MAX_UNIQUE_APPROVERS} approver slots"
                ),
            });
        }

        Ok(Decision {
            requires_dual_approval,
            approver_level,
            min_quotes_required,
            min_unique_approvers,
            allowed_variance_up: rule(RuleNumber::Rule6)?.threshold,
            allowed_variance_down: rule(RuleNumber::Rule7)?.threshold,
            currency: currency.trim().to_ascii_uppercase(),
        })
    }

    /// Compares an actual amount against the quoted amount using the decision's variance band.
    pub fn check_variance(&self, decision: &Decision, quoted: Decimal, actual: Decimal) -> VarianceCheck {
        if quoted.is_zero() {
            return if actual.is_zero() {
                VarianceCheck::Within { variance_pct: Decimal::ZERO }
            } else {
                VarianceCheck::AboveAllowed {
                    variance_pct: Decimal::ONE_HUNDRED,
                    allowed_pct: decision.allowed_variance_up,
                }
            };
        }

        let variance_pct = ((actual - quoted) / quoted * Decimal::ONE_HUNDRED).round_dp(2);
        if variance_pct > decision.allowed_variance_up {
            VarianceCheck::AboveAllowed { variance_pct, allowed_pct: decision.allowed_variance_up }
        } else if -variance_pct > decision.allowed_variance_down {
            VarianceCheck::BelowAllowed {
                variance_pct: -variance_pct,
                allowed_pct: decision.allowed_variance_down,
            }
        } else {
            VarianceCheck::Within { variance_pct }
        }
    }
}

fn require(rules: &OrganizationRules, number: RuleNumber) -> Result<&RuleThreshold, DomainError> {
    rules.get(number).ok_or_else(|| DomainError::RulesNotInitialized {
        organization_id: rules.organization_id.clone(),
        missing: vec![number],
    })
}

fn ensure_currency(rule: &RuleThreshold, currency: &str) -> Result<(), DomainError> {
    match rule.uom.as_deref() {
        Some(uom) if !uom.trim().eq_ignore_ascii_case(currency.trim()) => {
            Err(DomainError::CurrencyMismatch {
                currency: currency.to_string(),
                rule_currency: uom.to_string(),
            })
        }
        _ => Ok(()),
    }
}

fn whole_count(value: Decimal) -> u32 {
    use rust_decimal::prelude::ToPrimitive;

    value.ceil().to_u32().unwrap_or(u32::MAX).max(1)
}
