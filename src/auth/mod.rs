//! Authentication module
//!
//! Username/password accounts:
//! - bcrypt password hashing
//! - JWT access and refresh token generation and validation

mod jwt;
mod password;
mod service;

pub use jwt::{
    generate_access_token, generate_refresh_token, verify_token, Claims, JwtError, TokenType,
};
pub use service::{AuthError, AuthService, AuthSettings};
