pub mod courier;
pub mod delivery;
pub mod order;
pub mod restaurant;
