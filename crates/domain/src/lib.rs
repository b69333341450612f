//! Domain layer for the retail back office.
//!
//! This crate provides:
//! - Customer, Product and Order entities stored through `table-store`
//! - The order placement workflow, which prices lines from stored products
//! - Relocation of entities whose partition attribute changed
//! - Contact and product-name uniqueness checks
//! - Contract documents on a named file share

pub mod contract;
pub mod customer;
pub mod error;
pub mod order;
pub mod product;
pub mod relocation;
pub mod uniqueness;

pub use contract::{ContractService, MAX_LISTED_CONTRACTS};
pub use customer::{Customer, CustomerChanges, CustomerService, NewCustomer};
pub use error::{DomainError, Result};
pub use order::{NewOrder, Order, OrderLine, OrderLineRequest, OrderService, OrderStatus};
pub use product::{Attachment, NewProduct, Product, ProductChanges, ProductService};
pub use relocation::{RelocationStrategy, save_relocating};
pub use uniqueness::{ContactField, ContactIndex, ScanContactIndex, ensure_unique_contact};

/// Table holding customers, partitioned by city.
pub const CUSTOMERS_TABLE: &str = "Customers";

/// Table holding products, partitioned by category.
pub const PRODUCTS_TABLE: &str = "Products";

/// Table holding orders, partitioned by customer.
pub const ORDERS_TABLE: &str = "Orders";
