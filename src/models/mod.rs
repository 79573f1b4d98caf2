mod connected_account;
mod order;
mod product;
mod replay;
mod seller;
mod subscriber;
mod subscription;
mod webhook_event;

pub use connected_account::*;
pub use order::*;
pub use product::*;
pub use replay::*;
pub use seller::*;
pub use subscriber::*;
pub use subscription::*;
pub use webhook_event::*;
