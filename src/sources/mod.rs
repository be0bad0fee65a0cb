pub mod discovery;
pub mod jwk;
pub mod oauth2;
pub mod signing;
