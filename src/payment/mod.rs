//! Payment-gated request admission

pub mod gate;
pub mod request;

pub use gate::{Admission, PaymentConfig, PaymentGate};
pub use request::{decode_payment_request, encode_payment_request, PaymentRequest};
