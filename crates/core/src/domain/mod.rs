pub mod invoke;
pub mod session;
pub mod token;
