pub mod health;
pub mod script;
