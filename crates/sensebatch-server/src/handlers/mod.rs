pub mod health;
pub mod units;
