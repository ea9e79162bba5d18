pub mod customer;
pub mod money;
pub mod product;
pub mod purchase;
