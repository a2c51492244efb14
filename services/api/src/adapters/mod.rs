pub mod db;
pub mod razorpay;
pub mod receipt;

pub use db::DbAdapter;
pub use razorpay::RazorpayAdapter;
