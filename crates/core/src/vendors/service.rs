use tracing::info;

use crate::domain::organization::Organization;
use crate::domain::user::User;
use crate::domain::vendor::{ApprovalReason, Vendor, VendorId};
use crate::errors::{ApplicationError, DomainError};
use crate::ports::Ports;
use crate::vendors::VendorApprovalLifecycle;
use crate::workflow::service::Invocation;

/// Procurement-facing vendor approval actions.
#[derive(Clone)]
pub struct VendorService {
    ports: Ports,
    lifecycle: VendorApprovalLifecycle,
}

impl VendorService {
    pub fn new(ports: Ports, lifecycle: VendorApprovalLifecycle) -> Self {
        Self { ports, lifecycle }
    }

    pub async fn approve_manually(
        &self,
        vendor_id: &VendorId,
        justification: Option<&str>,
        call: &Invocation,
    ) -> Result<Vendor, ApplicationError> {
        let (vendor, organization, caller) = self.load(vendor_id, call).await?;
        let approved = self.lifecycle.approve(
            &vendor,
            ApprovalReason::Manual,
            &organization,
            &caller.id,
            justification,
            call.at,
        )?;
        self.save(approved, "vendor.approved", call).await
    }

    pub async fn deapprove(
        &self,
        vendor_id: &VendorId,
        justification: &str,
        call: &Invocation,
    ) -> Result<Vendor, ApplicationError> {
        let (vendor, _, caller) = self.load(vendor_id, call).await?;
        let revoked = self.lifecycle.deapprove(&vendor, &caller.id, justification, call.at)?;
        self.save(revoked, "vendor.deapproved", call).await
    }

    pub async fn record_three_quote_process(
        &self,
        vendor_id: &VendorId,
        call: &Invocation,
    ) -> Result<Vendor, ApplicationError> {
        let (vendor, organization, _) = self.load(vendor_id, call).await?;
        let approved = self.lifecycle.record_three_quote_process(&vendor, &organization, call.at)?;
        self.save(approved, "vendor.three_quote_recorded", call).await
    }

    async fn load(
        &self,
        vendor_id: &VendorId,
        call: &Invocation,
    ) -> Result<(Vendor, Organization, User), ApplicationError> {
        let caller = self
            .ports
            .users
            .get_user(&call.caller)
            .await?
            .ok_or_else(|| ApplicationError::not_found("user", call.caller.0.clone()))?;
        if !caller.active || !caller.permission_level.is_procurement_or_admin() {
            return Err(DomainError::Permission(format!(
                "user `{}` cannot change vendor approvals",
                caller.id
            ))
            .into());
        }

        let vendor = self
            .ports
            .vendors
            .get(vendor_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("vendor", vendor_id.0.clone()))?;
        if caller.organization_id != vendor.organization_id
            && caller.permission_level != crate::domain::user::PermissionLevel::Admin
        {
            return Err(DomainError::Permission(format!(
                "user `{}` does not belong to organization `{}`",
                caller.id, vendor.organization_id
            ))
            .into());
        }
        let organization = self
            .ports
            .organizations
            .get(&vendor.organization_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("organization", vendor.organization_id.0.clone()))?;
        Ok((vendor, organization, caller))
    }

    async fn save(
        &self,
        vendor: Vendor,
        event_name: &'static str,
        call: &Invocation,
    ) -> Result<Vendor, ApplicationError> {
        let stored = self.ports.vendors.update(vendor).await?;
        info!(
            event_name,
            correlation_id = %call.correlation_id,
            vendor_id = %stored.id,
            approved = stored.is_approved,
            "vendor approval changed"
        );
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;

    use super::VendorService;
    use crate::domain::organization::{Organization, OrganizationId};
    use crate::domain::user::{PermissionLevel, User, UserId};
    use crate::domain::vendor::{ApprovalReason, Vendor, VendorId};
    use crate::errors::ErrorKind;
    use crate::ports::memory::MemoryPorts;
    use crate::ports::{OrganizationStore, UserDirectory, VendorStore};
    use crate::vendors::VendorApprovalLifecycle;
    use crate::workflow::service::Invocation;

    async fn setup() -> (MemoryPorts, VendorService) {
        let memory = MemoryPorts::default();
        let org = OrganizationId("org-1".to_string());
        memory
            .organizations
            .save(Organization {
                id: org.clone(),
                name: "Org One".to_string(),
                procurement_email: None,
                finance_email: None,
                asset_management_email: None,
                vendor_approval_3quote_duration: 12,
                vendor_approval_completed_duration: 12,
                vendor_approval_manual_duration: 6,
                high_value_vendor_max_duration: 24,
                high_value_vendor_multiplier: Decimal::from(2),
                active: true,
            })
            .await
            .expect("org");
        for (id, level) in [("buyer", PermissionLevel::Procurement), ("requestor", PermissionLevel::Requester)] {
            memory
                .users
                .save_user(User {
                    id: UserId(id.to_string()),
                    email: format!("{id}@org.test"),
                    name: None,
                    permission_level: level,
                    organization_id: org.clone(),
                    active: true,
                })
                .await
                .expect("user");
        }
        memory
            .vendors
            .insert(Vendor::new(VendorId("v-1".to_string()), org, "Acme", Utc::now()))
            .await
            .expect("vendor");
        let service = VendorService::new(memory.ports(), VendorApprovalLifecycle::default());
        (memory, service)
    }

    fn call(caller: &str) -> Invocation {
        Invocation::new(UserId(caller.to_string()))
            .at(Utc.with_ymd_and_hms(2026, 1, 15, 9, 0, 0).unwrap())
    }

    #[tokio::test]
    async fn manual_approval_without_history_needs_justification() {
        let (_memory, service) = setup().await;
        let vendor_id = VendorId("v-1".to_string());

        let error = service.approve_manually(&vendor_id, None, &call("buyer")).await.expect_err("no reason");
        assert_eq!(error.kind(), ErrorKind::Validation);

        let vendor = service
            .approve_manually(&vendor_id, Some("sole local supplier"), &call("buyer"))
            .await
            .expect("approve");
        assert!(vendor.is_approved);
        assert_eq!(vendor.approval_reason, Some(ApprovalReason::Manual));
        assert_eq!(
            vendor.approval_expiry_date,
            Some(Utc.with_ymd_and_hms(2026, 7, 15, 9, 0, 0).unwrap())
        );
        assert_eq!(vendor.version, 1);
    }

    #[tokio::test]
    async fn deapproval_requires_procurement_and_a_reason() {
        let (_memory, service) = setup().await;
        let vendor_id = VendorId("v-1".to_string());
        service.record_three_quote_process(&vendor_id, &call("buyer")).await.expect("approve");

        let error = service.deapprove(&vendor_id, "late deliveries", &call("requestor")).await.expect_err("requestor");
        assert_eq!(error.kind(), ErrorKind::Permission);

        let error = service.deapprove(&vendor_id, "  ", &call("buyer")).await.expect_err("blank");
        assert_eq!(error.kind(), ErrorKind::Validation);

        let vendor = service.deapprove(&vendor_id, "late deliveries", &call("buyer")).await.expect("deapprove");
        assert!(!vendor.is_approved);
        assert_eq!(vendor.approval_history.len(), 2);
    }
}
