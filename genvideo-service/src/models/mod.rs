pub mod payment;
pub mod user;
pub mod video;

pub use payment::{
    subscription_expiry_for, CompletionOutcome, NewPaymentOrder, OrderCompletion, OrderStatus,
    Payment, PaymentOrder,
};
pub use user::{NewUser, SanitizedUser, User, DEFAULT_SUBSCRIPTION};
pub use video::{NewVideo, Video};
