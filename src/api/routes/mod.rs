pub mod health;
pub mod notificators;
pub mod notify;
