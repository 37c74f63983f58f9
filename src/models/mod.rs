pub mod account;
pub mod business_hours;
pub mod campaign;
pub mod client;
pub mod phone_number;

pub use account::*;
pub use business_hours::*;
pub use campaign::*;
pub use client::*;
pub use phone_number::*;
