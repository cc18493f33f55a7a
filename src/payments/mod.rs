pub mod confirmation;
pub mod gateway;

pub use confirmation::{ConfirmedPayment, PaymentConfirmation, confirm_payment};
pub use gateway::{GatewayError, PaystackClient, VerifiedTransaction};
