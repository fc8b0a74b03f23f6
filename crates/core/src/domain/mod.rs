pub mod notification;
pub mod organization;
pub mod purchase_request;
pub mod user;
pub mod vendor;
