pub mod public;
pub mod sellers;
pub mod webhooks;
