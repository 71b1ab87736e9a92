pub mod extractor;
pub mod jwt;

pub use extractor::{AuthUser, JwtKeys, OptionalUser};
pub use jwt::JwtManager;
