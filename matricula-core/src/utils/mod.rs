pub mod clock;
pub mod phone;
