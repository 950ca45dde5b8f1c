pub mod movie;
pub mod permission;
pub mod token;
pub mod user;

pub use movie::{validate_movie, Movie, Runtime};
pub use permission::{Permissions, MOVIES_READ, MOVIES_WRITE};
pub use token::{Token, TokenScope};
pub use user::{validate_email, validate_name, validate_password_plaintext, validate_user, Password, PasswordError, User};
