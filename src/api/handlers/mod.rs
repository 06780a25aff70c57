//! HTTP request handlers organized by resource type

pub mod auth;
pub mod health;
pub mod principals;

pub use auth::{
    change_password_handler, forgot_password_handler, login_handler, logout_handler, me_handler,
    reset_password_handler, validate_reset_token_handler,
};
pub use health::health_handler;
pub use principals::{
    create_principal_handler, delete_principal_handler, get_principal_handler,
    list_principals_handler, update_principal_handler,
};
