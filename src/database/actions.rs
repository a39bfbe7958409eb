pub mod ingredients;
pub mod memberships;
pub mod recipes;
pub mod shopping;
pub mod tags;
pub mod users;

pub use ingredients::*;
pub use memberships::*;
pub use recipes::*;
pub use shopping::*;
pub use tags::*;
pub use users::*;
