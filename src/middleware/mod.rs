mod seller_auth;

pub use seller_auth::*;
