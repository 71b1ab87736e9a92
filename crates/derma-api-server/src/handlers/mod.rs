pub mod assistant;
pub mod events;
pub mod health;
