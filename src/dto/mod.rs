pub mod health;
pub mod sse;
pub mod transport;
pub mod validation;
