pub mod inventory;
pub mod sales;
