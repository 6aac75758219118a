pub mod store;
pub mod order_repo;
pub use order_repo::OrderRepository;
pub mod inventory_repo;
pub use inventory_repo::InventoryRepository;
pub mod pg_store;
pub use pg_store::PgSalesStore;

#[cfg(test)]
pub mod memory;
