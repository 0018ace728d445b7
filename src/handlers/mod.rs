// handlers/mod.rs
//
// public   - no tenant required (/, /health)
// products - tenant-scoped CRUD (/api/products)
pub mod products;
pub mod public;
