pub mod gateway;
pub mod notification;
pub mod sales_service;
pub mod stock;
