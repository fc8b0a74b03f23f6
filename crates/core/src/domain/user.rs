use serde::{Deserialize, Serialize};

use crate::domain::organization::OrganizationId;
use crate::rules::ApproverLevel;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn system() -> Self {
        Self("system".to_string())
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Numeric permission levels as stored on user documents (lower is broader).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum PermissionLevel {
    Admin,
    SeniorApprover,
    Procurement,
    FinanceApprover,
    Requester,
}

impl PermissionLevel {
    pub fn can_approve(self, level: ApproverLevel) -> bool {
        match self {
            Self::Admin => true,
            Self::SeniorApprover => matches!(level, ApproverLevel::Finance | ApproverLevel::Senior),
            Self::FinanceApprover => level == ApproverLevel::Finance,
            Self::Procurement | Self::Requester => false,
        }
    }

    pub fn is_procurement_or_admin(self) -> bool {
        matches!(self, Self::Admin | Self::Procurement)
    }
}

impl TryFrom<u8> for PermissionLevel {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Admin),
            2 => Ok(Self::SeniorApprover),
            3 => Ok(Self::Procurement),
            4 => Ok(Self::FinanceApprover),
            5 => Ok(Self::Requester),
            other => Err(format!("unknown permission level {other}")),
        }
    }
}

impl From<PermissionLevel> for u8 {
    fn from(value: PermissionLevel) -> Self {
        match value {
            PermissionLevel::Admin => 1,
            PermissionLevel::SeniorApprover => 2,
            PermissionLevel::Procurement => 3,
            PermissionLevel::FinanceApprover => 4,
            PermissionLevel::Requester => 5,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct User {
    pub id: UserId,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    pub permission_level: PermissionLevel,
    pub organization_id: OrganizationId,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl User {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.email)
    }
}

#[cfg(test)]
mod tests {
    use super::PermissionLevel;
    use crate::rules::ApproverLevel;

    #[test]
    fn approval_authority_narrows_with_level() {
        assert!(PermissionLevel::Admin.can_approve(ApproverLevel::Executive));
        assert!(PermissionLevel::SeniorApprover.can_approve(ApproverLevel::Senior));
        assert!(!PermissionLevel::SeniorApprover.can_approve(ApproverLevel::Executive));
        assert!(PermissionLevel::FinanceApprover.can_approve(ApproverLevel::Finance));
        assert!(!PermissionLevel::FinanceApprover.can_approve(ApproverLevel::Senior));
        assert!(!PermissionLevel::Procurement.can_approve(ApproverLevel::Finance));
    }

    #[test]
    fn levels_use_numeric_wire_format() {
        let level: PermissionLevel = serde_json::from_str("3").expect("deserialize");
        assert_eq!(level, PermissionLevel::Procurement);
        assert_eq!(serde_json::to_string(&PermissionLevel::Admin).expect("serialize"), "1");
        assert!(serde_json::from_str::<PermissionLevel>("9").is_err());
    }
}
