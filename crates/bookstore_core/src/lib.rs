pub mod domain;
pub mod notify;
pub mod ports;
pub mod purchase;

pub use domain::{
    AuthUser, Book, BookStatus, EntitlementRecord, Notification, NotificationKind, Order,
    PurchaseInput, Role, User,
};
pub use ports::{DatabaseService, NotificationPush, PaymentGatewayService, PortError, PortResult};
pub use purchase::{complete_purchase, PurchaseOutcome};
