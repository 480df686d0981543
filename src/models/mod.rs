mod business;
mod coupon;
mod featured_listing;
mod reconciliation;

pub use business::*;
pub use coupon::*;
pub use featured_listing::*;
pub use reconciliation::*;
