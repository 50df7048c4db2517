pub mod orders;
pub mod popup;
pub mod products;
pub mod system;
