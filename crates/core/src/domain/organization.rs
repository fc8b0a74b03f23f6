use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrganizationId(pub String);

impl std::fmt::Display for OrganizationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Organization reference document. Durations are whole months.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Organization {
    pub id: OrganizationId,
    pub name: String,
    #[serde(default)]
    pub procurement_email: Option<String>,
    #[serde(default)]
    pub finance_email: Option<String>,
    #[serde(default)]
    pub asset_management_email: Option<String>,
    pub vendor_approval_3quote_duration: u32,
    pub vendor_approval_completed_duration: u32,
    pub vendor_approval_manual_duration: u32,
    pub high_value_vendor_max_duration: u32,
    pub high_value_vendor_multiplier: Decimal,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RuleNumber {
    Rule1,
    Rule2,
    Rule3,
    Rule4,
    Rule5,
    Rule6,
    Rule7,
}

impl RuleNumber {
    pub const ALL: [RuleNumber; 7] = [
        RuleNumber::Rule1,
        RuleNumber::Rule2,
        RuleNumber::Rule3,
        RuleNumber::Rule4,
        RuleNumber::Rule5,
        RuleNumber::Rule6,
        RuleNumber::Rule7,
    ];

    pub fn number(self) -> u8 {
        match self {
            Self::Rule1 => 1,
            Self::Rule2 => 2,
            Self::Rule3 => 3,
            Self::Rule4 => 4,
            Self::Rule5 => 5,
            Self::Rule6 => 6,
            Self::Rule7 => 7,
        }
    }

    pub fn from_number(number: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|rule| rule.number() == number)
    }

    /// Document id convention for per-rule documents: `{orgId}_rule_{n}`.
    pub fn document_id(self, organization_id: &OrganizationId) -> String {
        format!("{}_rule_{}", organization_id.0, self.number())
    }
}

impl std::fmt::Display for RuleNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "rule{}", self.number())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RuleThreshold {
    pub threshold: Decimal,
    #[serde(default)]
    pub uom: Option<String>,
}

impl RuleThreshold {
    pub fn new(threshold: Decimal) -> Self {
        Self { threshold, uom: None }
    }

    pub fn with_uom(threshold: Decimal, uom: impl Into<String>) -> Self {
        Self { threshold, uom: Some(uom.into()) }
    }
}

/// Per-organization approval thresholds, assembled from the per-rule documents.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationRules {
    pub organization_id: OrganizationId,
    /// Finance-approver ceiling.
    pub rule1: Option<RuleThreshold>,
    /// Dual-approval multiplier applied to rule1.
    pub rule2: Option<RuleThreshold>,
    /// Senior-approval ceiling.
    pub rule3: Option<RuleThreshold>,
    /// Minimum quotes required above rule3.
    pub rule4: Option<RuleThreshold>,
    /// Minimum unique approvers.
    pub rule5: Option<RuleThreshold>,
    /// Allowed upward price variance, percent.
    pub rule6: Option<RuleThreshold>,
    /// Allowed downward price variance, percent.
    pub rule7: Option<RuleThreshold>,
}

impl OrganizationRules {
    pub fn empty(organization_id: OrganizationId) -> Self {
        Self {
            organization_id,
            rule1: None,
            rule2: None,
            rule3: None,
            rule4: None,
            rule5: None,
            rule6: None,
            rule7: None,
        }
    }

    pub fn get(&self, rule: RuleNumber) -> Option<&RuleThreshold> {
        match rule {
            RuleNumber::Rule1 => self.rule1.as_ref(),
            RuleNumber::Rule2 => self.rule2.as_ref(),
            RuleNumber::Rule3 => self.rule3.as_ref(),
            RuleNumber::Rule4 => self.rule4.as_ref(),
            RuleNumber::Rule5 => self.rule5.as_ref(),
            RuleNumber::Rule6 => self.rule6.as_ref(),
            RuleNumber::Rule7 => self.rule7.as_ref(),
        }
    }

    pub fn set(&mut self, rule: RuleNumber, threshold: RuleThreshold) {
        let slot = match rule {
            RuleNumber::Rule1 => &mut self.rule1,
            RuleNumber::Rule2 => &mut self.rule2,
            RuleNumber::Rule3 => &mut self.rule3,
            RuleNumber::Rule4 => &mut self.rule4,
            RuleNumber::Rule5 => &mut self.rule5,
            RuleNumber::Rule6 => &mut self.rule6,
            RuleNumber::Rule7 => &mut self.rule7,
        };
        *slot = Some(threshold);
    }

    pub fn missing(&self) -> Vec<RuleNumber> {
        RuleNumber::ALL.into_iter().filter(|rule| self.get(*rule).is_none()).collect()
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{OrganizationId, OrganizationRules, RuleNumber, RuleThreshold};

    #[test]
    fn rule_documents_follow_org_prefixed_ids() {
        let org = OrganizationId("acme".to_string());
        assert_eq!(RuleNumber::Rule3.document_id(&org), "acme_rule_3");
        assert_eq!(RuleNumber::from_number(7), Some(RuleNumber::Rule7));
        assert_eq!(RuleNumber::from_number(8), None);
    }

    #[test]
    fn missing_lists_unset_rules_in_order() {
        let mut rules = OrganizationRules::empty(OrganizationId("acme".to_string()));
        rules.set(RuleNumber::Rule2, RuleThreshold::new(Decimal::TWO));
        let missing = rules.missing();
        assert_eq!(missing.len(), 6);
        assert_eq!(missing[0], RuleNumber::Rule1);
        assert!(!missing.contains(&RuleNumber::Rule2));
    }
}
