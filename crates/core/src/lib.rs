pub mod approvals;
pub mod audit;
pub mod calendar;
pub mod config;
pub mod domain;
pub mod errors;
pub mod notifications;
pub mod ports;
pub mod reminders;
pub mod rules;
pub mod scheduler;
pub mod vendors;
pub mod workflow;

pub use approvals::{ConflictResolution, QuoteConflictResolver};
pub use calendar::BusinessCalendar;
pub use domain::purchase_request::{PrStatus, PurchaseRequest, PurchaseRequestId, QuoteId};
pub use domain::vendor::{Vendor, VendorId};
pub use errors::{ApplicationError, DomainError, ErrorKind, InterfaceError};
pub use notifications::Notifier;
pub use ports::Ports;
pub use reminders::{ReminderScheduler, SweepReport, SweepStats};
pub use rules::{ApproverLevel, Decision, RuleEngine};
pub use scheduler::{CronSchedule, JobName};
pub use vendors::{VendorApprovalLifecycle, VendorService};
pub use workflow::{Invocation, StatusStateMachine, WorkflowService};
