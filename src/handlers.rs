pub mod sales;
pub mod webhook;
